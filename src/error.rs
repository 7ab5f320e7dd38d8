//! Error taxonomy for registry and pool operations.

use crate::store::StoreError;

/// Result type for IPAM operations
pub type Result<T> = std::result::Result<T, IpamError>;

/// Errors surfaced by the subnet registry and the allocation pool.
///
/// Every variant carries enough detail to reconstruct the cause: the offending
/// input text, the subnet id involved, or the conflicting record.
#[derive(Debug, thiserror::Error)]
pub enum IpamError {
    #[error("bad format attribute: {input:?}")]
    InvalidFormat { input: String },

    #[error("subnet {cidr} overlaps with existing subnet {existing_id} ({existing_cidr})")]
    OverlapConflict {
        cidr: String,
        existing_id: String,
        existing_cidr: String,
    },

    #[error("subnet not found: {id}")]
    NotFound { id: String },

    #[error("no address pool for subnet {id}")]
    NoSuchPool { id: String },

    #[error("address pool of subnet {id} ({cidr}) is exhausted")]
    PoolExhausted { id: String, cidr: String },

    #[error("missing address")]
    MissingAddress,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IpamError {
    pub(crate) fn invalid_format(input: impl Into<String>) -> Self {
        IpamError::InvalidFormat {
            input: input.into(),
        }
    }
}
