//! Execution scopes, measurement scopes, and scope groups.
//!
//! An [`ExecutionScope`] names the thing being observed (a thread, a process,
//! or a CPU); a [`MeasurementScope`] additionally names what kind of
//! measurement is keyed to that scope. [`ScopeGroup`] tracks which process a
//! thread belongs to, built up as fork/comm records arrive.

use std::collections::HashMap;

use log::warn;

/// A thread, process, or CPU being observed.
///
/// Ordered first by variant, then by id, so `BTreeMap<ExecutionScope, _>`
/// groups scopes by kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExecutionScope {
    Thread(i64),
    Process(i64),
    Cpu(i64),
}

impl ExecutionScope {
    /// The sentinel scope used when a lookup has nothing better to report.
    pub const INVALID: ExecutionScope = ExecutionScope::Process(-1);

    pub fn id(&self) -> i64 {
        match self {
            ExecutionScope::Thread(id) | ExecutionScope::Process(id) | ExecutionScope::Cpu(id) => {
                *id
            }
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.id() < 0
    }
}

/// What kind of thing is being measured at a given [`ExecutionScope`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeasurementKind {
    Sample,
    Metric,
    Switch,
    Syscall,
    BlockIo,
    Openmp,
    Cuda,
    Nvme,
    Posixio,
    UserspaceMetric,
}

/// Key for writer lookup: `(kind, scope)`, ordered lexicographically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeasurementScope {
    pub kind: MeasurementKind,
    pub scope: ExecutionScope,
}

impl MeasurementScope {
    pub fn new(kind: MeasurementKind, scope: ExecutionScope) -> Self {
        Self { kind, scope }
    }
}

/// Maps each observed [`ExecutionScope`] to the scope that groups it: a
/// thread maps to its process, a process or CPU maps to itself.
#[derive(Default)]
pub struct ScopeGroup {
    thread_to_process: HashMap<i64, i64>,
}

impl ScopeGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `tid` belongs to `pid`.
    pub fn add_thread(&mut self, tid: i64, pid: i64) {
        self.thread_to_process.insert(tid, pid);
    }

    /// Records a thread whose owning process is not yet known. The thread is
    /// grouped under itself, creating a phantom process scope with the same
    /// id — logged since it is a compatibility quirk rather than an intended
    /// behavior.
    pub fn add_orphan_thread(&mut self, tid: i64) {
        warn!("thread {tid} observed with unknown parent process; grouping under itself");
        self.thread_to_process.insert(tid, tid);
    }

    /// Returns the group scope for `scope`: a thread's process, or the scope
    /// itself for processes and CPUs. Unknown threads resolve to the
    /// sentinel `Process(0)`.
    pub fn group_of(&self, scope: ExecutionScope) -> ExecutionScope {
        match scope {
            ExecutionScope::Thread(tid) => match self.thread_to_process.get(&tid) {
                Some(&pid) => ExecutionScope::Process(pid),
                None => ExecutionScope::Process(0),
            },
            ExecutionScope::Process(_) | ExecutionScope::Cpu(_) => scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_groups_under_its_process() {
        let mut g = ScopeGroup::new();
        g.add_thread(42, 7);
        assert_eq!(g.group_of(ExecutionScope::Thread(42)), ExecutionScope::Process(7));
    }

    #[test]
    fn unknown_thread_groups_under_sentinel() {
        let g = ScopeGroup::new();
        assert_eq!(g.group_of(ExecutionScope::Thread(99)), ExecutionScope::Process(0));
    }

    #[test]
    fn orphan_thread_groups_under_itself() {
        let mut g = ScopeGroup::new();
        g.add_orphan_thread(13);
        assert_eq!(g.group_of(ExecutionScope::Thread(13)), ExecutionScope::Process(13));
    }

    #[test]
    fn process_and_cpu_group_under_themselves() {
        let g = ScopeGroup::new();
        assert_eq!(g.group_of(ExecutionScope::Process(5)), ExecutionScope::Process(5));
        assert_eq!(g.group_of(ExecutionScope::Cpu(2)), ExecutionScope::Cpu(2));
    }

    #[test]
    fn ordering_is_by_variant_then_id() {
        assert!(ExecutionScope::Thread(100) < ExecutionScope::Process(0));
        assert!(ExecutionScope::Process(100) < ExecutionScope::Cpu(0));
        assert!(ExecutionScope::Thread(1) < ExecutionScope::Thread(2));
    }
}
