//! Subnet overlap detection.
//!
//! Existing ranges are kept as one sorted flat sequence of alternating
//! start/end ordinals. A candidate fits if both of its ends land on the same
//! insertion point and that point sits between recorded ranges (even index)
//! rather than inside one (odd index).

use super::types::AddressRange;

/// Sorted, non-overlapping ranges encoded as `[start0, end0, start1, end1, ...]`
#[derive(Debug, Default, Clone)]
pub struct RangeSet {
    bounds: Vec<u128>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ranges recorded
    pub fn len(&self) -> usize {
        self.bounds.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Leftmost position not less than `first`, rightmost position not greater than `last`
    fn insertion_points(&self, range: &AddressRange) -> (usize, usize) {
        let lo = self.bounds.partition_point(|&b| b < range.first);
        let hi = self.bounds.partition_point(|&b| b <= range.last);
        (lo, hi)
    }

    /// Whether `range` shares at least one address with a recorded range
    pub fn conflicts(&self, range: &AddressRange) -> bool {
        let (lo, hi) = self.insertion_points(range);
        lo != hi || lo % 2 == 1
    }

    /// Record `range`; returns false and leaves the set untouched on conflict
    pub fn insert(&mut self, range: AddressRange) -> bool {
        let (lo, hi) = self.insertion_points(&range);
        if lo != hi || lo % 2 == 1 {
            return false;
        }
        self.bounds.insert(lo, range.last);
        self.bounds.insert(lo, range.first);
        true
    }
}

/// Whether `candidate` intersects any of `existing` (all of one family)
pub fn overlaps<I>(candidate: &AddressRange, existing: I) -> bool
where
    I: IntoIterator<Item = AddressRange>,
{
    let mut set = RangeSet::new();
    for range in existing {
        // a stored range clashing with another stored range cannot join the
        // flat sequence, so check it against the candidate on its own
        if !set.insert(range) && range.intersects(candidate) {
            return true;
        }
    }
    set.conflicts(candidate)
}

/// First item of `existing` whose range intersects `candidate`
pub fn first_conflict<'a, T, F>(
    candidate: &AddressRange,
    existing: &'a [T],
    range_of: F,
) -> Option<&'a T>
where
    F: Fn(&T) -> AddressRange,
{
    if !overlaps(candidate, existing.iter().map(&range_of)) {
        return None;
    }
    existing
        .iter()
        .find(|item| range_of(*item).intersects(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(first: u128, last: u128) -> AddressRange {
        AddressRange { first, last }
    }

    #[test]
    fn test_empty_set_never_conflicts() {
        assert!(!overlaps(&r(0, u128::MAX), std::iter::empty()));
    }

    #[test]
    fn test_adjacent_ranges_do_not_overlap() {
        let existing = [r(256, 511)];
        assert!(!overlaps(&r(0, 255), existing));
        assert!(!overlaps(&r(512, 1023), existing));
    }

    #[test]
    fn test_identical_and_contained_ranges_overlap() {
        let existing = [r(256, 511)];
        assert!(overlaps(&r(256, 511), existing));
        assert!(overlaps(&r(384, 511), existing));
        assert!(overlaps(&r(300, 300), existing));
    }

    #[test]
    fn test_enclosing_and_edge_touching_ranges_overlap() {
        let existing = [r(256, 511)];
        assert!(overlaps(&r(0, 1023), existing));
        assert!(overlaps(&r(0, 256), existing));
        assert!(overlaps(&r(511, 600), existing));
    }

    #[test]
    fn test_gap_between_ranges() {
        let existing = [r(0, 9), r(20, 29), r(40, 49)];
        assert!(!overlaps(&r(10, 19), existing));
        assert!(!overlaps(&r(30, 39), existing));
        assert!(overlaps(&r(10, 20), existing));
        assert!(overlaps(&r(5, 45), existing));
    }

    #[test]
    fn test_insert_keeps_sequence_sorted() {
        let mut set = RangeSet::new();
        assert!(set.insert(r(40, 49)));
        assert!(set.insert(r(0, 9)));
        assert!(set.insert(r(20, 29)));
        assert!(!set.insert(r(25, 30)));
        assert_eq!(set.len(), 3);
        assert_eq!(set.bounds, vec![0, 9, 20, 29, 40, 49]);
    }

    #[test]
    fn test_single_address_ranges() {
        let mut set = RangeSet::new();
        assert!(set.insert(r(7, 7)));
        assert!(set.insert(r(8, 8)));
        assert!(set.conflicts(&r(7, 7)));
        assert!(!set.conflicts(&r(6, 6)));
    }

    #[test]
    fn test_clashing_stored_ranges_still_checked() {
        // 10..=19 cannot join the set after 0..=15, but must still be compared
        let existing = [r(0, 15), r(10, 19)];
        assert!(overlaps(&r(18, 25), existing));
        assert!(!overlaps(&r(20, 25), existing));
    }

    #[test]
    fn test_first_conflict_names_the_offender() {
        let existing = vec![("a", r(0, 9)), ("b", r(20, 29))];
        let hit = first_conflict(&r(25, 26), &existing, |(_, range)| *range);
        assert_eq!(hit.map(|(name, _)| *name), Some("b"));
        assert!(first_conflict(&r(10, 19), &existing, |(_, range)| *range).is_none());
    }
}
