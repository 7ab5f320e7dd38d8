//! Durable INI-style record store.
//!
//! The whole file is held in memory behind a reader/writer lock and rewritten
//! on every mutation. Writes go to a sibling `.tmp` file which is then renamed
//! over the previous file, so readers of the file never observe a torn write.
//!
//! Several processes may share one file. Every operation runs under an
//! exclusive advisory lock on the sibling `.lock` file and reloads the file
//! when it takes that lock, so no handle ever writes back a stale image.
//! Callers that span several operations hold a [`StoreLease`] across them.
//!
//! File layout:
//!
//! ```text
//! [globals]
//! next_id = 3
//!
//! [1]
//! cidr = 10.0.0.0/8
//! family = 4
//! ```

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use fs2::FileExt;
use log::{debug, warn};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};
use regex::Regex;

use super::{
    remove_key, sections_to_lines, RecordStore, Sections, StoreError, StoreLease, StoreLine,
};

/// Compiled patterns for the store file format
struct IniPatterns {
    /// Match: "[section]"
    section: Regex,
    /// Match: "key = value"
    entry: Regex,
    /// Match: blank lines and "#" / ";" comments
    skip: Regex,
}

impl IniPatterns {
    fn new() -> Self {
        Self {
            section: Regex::new(r"^\s*\[\s*([^\]]+?)\s*\]\s*$").expect("Invalid section regex"),
            entry: Regex::new(r"^\s*([^=\s]+)\s*=\s*(.*?)\s*$").expect("Invalid entry regex"),
            skip: Regex::new(r"^\s*([#;].*)?$").expect("Invalid skip regex"),
        }
    }
}

static PATTERNS: LazyLock<IniPatterns> = LazyLock::new(IniPatterns::new);

/// Parse the textual store format into sections
fn parse_sections(content: &str) -> Result<Sections, StoreError> {
    let mut sections = Sections::new();
    let mut current: Option<String> = None;

    for (index, line) in content.lines().enumerate() {
        if PATTERNS.skip.is_match(line) {
            continue;
        }
        if let Some(caps) = PATTERNS.section.captures(line) {
            let name = caps[1].to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        match (PATTERNS.entry.captures(line), current.as_ref()) {
            (Some(caps), Some(section)) => {
                sections
                    .entry(section.clone())
                    .or_default()
                    .insert(caps[1].to_string(), caps[2].to_string());
            }
            _ => {
                return Err(StoreError::Corrupt {
                    line: index + 1,
                    content: line.to_string(),
                })
            }
        }
    }

    // empty section headers carry no records
    sections.retain(|_, entries| !entries.is_empty());
    Ok(sections)
}

/// Render sections back into the textual store format
fn render_sections(sections: &Sections) -> String {
    let mut out = String::new();
    for (name, entries) in sections {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("[{}]\n", name));
        for (key, value) in entries {
            out.push_str(&format!("{} = {}\n", key, value));
        }
    }
    out
}

/// Read the store file, treating a missing file as empty
fn read_sections(path: &Path) -> Result<Sections, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => parse_sections(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Sections::new()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// `path` with `suffix` appended to its file name
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// File lock held by this handle and how many leases share it
#[derive(Debug, Default)]
struct LockState {
    depth: usize,
    file: Option<File>,
}

/// One (possibly nested) lease on an [`IniFileStore`]
struct FileLease<'a> {
    state: ReentrantMutexGuard<'a, RefCell<LockState>>,
}

impl Drop for FileLease<'_> {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.depth -= 1;
        if state.depth > 0 {
            return;
        }
        if let Some(file) = state.file.take() {
            // closing the file releases the lock as well
            if let Err(e) = FileExt::unlock(&file) {
                warn!("Failed to unlock record store lock file: {}", e);
            }
        }
    }
}

/// Record store persisted to a single INI-style file
#[derive(Debug)]
pub struct IniFileStore {
    path: PathBuf,
    lock_path: PathBuf,
    sections: RwLock<Sections>,
    lock: ReentrantMutex<RefCell<LockState>>,
}

impl IniFileStore {
    /// Open the store at `path`, starting empty if the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let sections = read_sections(&path)?;
        debug!("Opened record store {:?} with {} sections", path, sections.len());

        Ok(Self {
            lock_path: sibling(&path, ".lock"),
            path,
            sections: RwLock::new(sections),
            lock: ReentrantMutex::new(RefCell::new(LockState::default())),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn create_parent(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Self::io_error(&self.path, e))?;
        }
        Ok(())
    }

    /// Take the file lock unless this thread already holds it through this
    /// handle. The outermost lease reloads the file from disk.
    fn acquire(&self) -> Result<FileLease<'_>, StoreError> {
        let state = self.lock.lock();
        {
            let mut inner = state.borrow_mut();
            if inner.depth == 0 {
                let file = self.lock_file()?;
                *self.sections.write() = read_sections(&self.path)?;
                inner.file = Some(file);
            }
            inner.depth += 1;
        }
        Ok(FileLease { state })
    }

    fn lock_file(&self) -> Result<File, StoreError> {
        self.create_parent()?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| Self::io_error(&self.lock_path, e))?;
        file.lock_exclusive()
            .map_err(|e| Self::io_error(&self.lock_path, e))?;
        Ok(file)
    }

    fn persist(&self, sections: &Sections) -> Result<(), StoreError> {
        self.create_parent()?;
        let tmp = sibling(&self.path, ".tmp");

        fs::write(&tmp, render_sections(sections)).map_err(|e| Self::io_error(&self.path, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| Self::io_error(&self.path, e))?;
        Ok(())
    }

    /// Apply `change` to a copy of the sections, persist it, then publish it.
    /// `change` returns false when it left the sections untouched.
    fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Sections) -> bool,
    {
        let _lease = self.acquire()?;
        let mut guard = self.sections.write();
        let mut next = guard.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }
}

impl RecordStore for IniFileStore {
    fn lease(&self) -> Result<StoreLease<'_>, StoreError> {
        Ok(StoreLease::holding(self.acquire()?))
    }

    fn get(&self, section: &str, key: &str) -> Result<Option<String>, StoreError> {
        let _lease = self.acquire()?;
        Ok(self
            .sections
            .read()
            .get(section)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn set(&self, section: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|sections| {
            sections
                .entry(section.to_string())
                .or_default()
                .insert(key.to_string(), value.to_string());
            true
        })
    }

    fn delete(&self, section: &str) -> Result<(), StoreError> {
        self.update(|sections| sections.remove(section).is_some())
    }

    fn remove(&self, section: &str, key: &str) -> Result<(), StoreError> {
        self.update(|sections| remove_key(sections, section, key))
    }

    fn list_lines(&self, section: Option<&str>) -> Result<Vec<StoreLine>, StoreError> {
        let _lease = self.acquire()?;
        Ok(sections_to_lines(&self.sections.read(), section))
    }
}
