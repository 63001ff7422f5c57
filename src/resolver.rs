//! Per-process registries of function/instruction resolvers, keyed by
//! address range. DWARF/ELF/perf-map lookups happen wherever a [`Resolver`]
//! handle ends up; this module only holds the registration and
//! fork-inheritance bookkeeping.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Half-open `[start, end)` range over process address space, ordered so a
/// `BTreeMap<Range, _>` supports point-in-range lookup in O(log n).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
    pub start: u64,
    pub end: u64,
}

impl Range {
    pub fn new(start: u64, end: u64) -> Self {
        assert!(start <= end, "range start must not exceed end");
        Self { start, end }
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end
    }
}

/// Ranges are ordered by their end point, so a lookup for `addr` finds the
/// first range whose end exceeds `addr` via `BTreeMap::range(addr..)`; that
/// candidate is then checked with [`Range::contains`].
impl Ord for Range {
    fn cmp(&self, other: &Self) -> Ordering {
        self.end.cmp(&other.end).then(self.start.cmp(&other.start))
    }
}

impl PartialOrd for Range {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Opaque identifier for a registered resolver; resolution itself happens
/// wherever this handle is passed to.
#[derive(Clone, Debug)]
pub struct Resolver(pub Arc<str>);

/// Per-process map of address range to resolver. Registration is idempotent
/// on `(process, range)`: registering the same range twice keeps the first
/// resolver.
type ProcessMap = BTreeMap<Range, Resolver>;

/// Holds every observed process's resolver map, with fork handled as an
/// `Arc::clone` handle copy and first-write-wins copy-on-write mutation.
#[derive(Default)]
pub struct Registry {
    processes: HashMap<i64, Arc<ProcessMap>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resolver` for `range` under `pid`. A no-op if `(pid,
    /// range)` is already registered.
    pub fn register(&mut self, pid: i64, range: Range, resolver: Resolver) {
        let map = Arc::make_mut(self.processes.entry(pid).or_default());
        map.entry(range).or_insert(resolver);
    }

    /// Looks up the resolver covering `addr` in `pid`'s map, if any.
    pub fn lookup(&self, pid: i64, addr: u64) -> Option<&Resolver> {
        let map = self.processes.get(&pid)?;
        map.range(Range::new(0, addr)..)
            .find(|(range, _)| range.contains(addr))
            .map(|(_, resolver)| resolver)
    }

    /// Copies `parent`'s resolver map into `child` as an O(1) `Arc::clone`
    /// handle, per the fork-inherited-resolvers invariant.
    pub fn inherit(&mut self, parent: i64, child: i64) {
        if let Some(map) = self.processes.get(&parent).cloned() {
            self.processes.insert(child, map);
        }
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_containing_range() {
        let mut reg = Registry::new();
        reg.register(1, Range::new(0x1000, 0x2000), Resolver(Arc::from("libfoo")));
        reg.register(1, Range::new(0x2000, 0x3000), Resolver(Arc::from("libbar")));

        assert_eq!(reg.lookup(1, 0x1500).unwrap().0.as_ref(), "libfoo");
        assert_eq!(reg.lookup(1, 0x2500).unwrap().0.as_ref(), "libbar");
        assert!(reg.lookup(1, 0x3500).is_none());
    }

    #[test]
    fn registration_is_idempotent() {
        let mut reg = Registry::new();
        let range = Range::new(0x1000, 0x2000);
        reg.register(1, range, Resolver(Arc::from("first")));
        reg.register(1, range, Resolver(Arc::from("second")));
        assert_eq!(reg.lookup(1, 0x1000).unwrap().0.as_ref(), "first");
    }

    #[test]
    fn fork_inherits_exact_parent_snapshot() {
        let mut reg = Registry::new();
        reg.register(1, Range::new(0x1000, 0x2000), Resolver(Arc::from("libfoo")));
        reg.inherit(1, 2);

        assert_eq!(reg.lookup(2, 0x1500).unwrap().0.as_ref(), "libfoo");

        // Mutating the parent after fork must not affect the child's snapshot.
        reg.register(1, Range::new(0x3000, 0x4000), Resolver(Arc::from("libbaz")));
        assert!(reg.lookup(2, 0x3500).is_none());
    }
}
