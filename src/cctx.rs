//! Per-writer calling-context tree.
//!
//! Each sample writer owns one [`Tree`]: flat, index-based arena storage
//! instead of heap nodes linked by raw pointers, so a tree can be walked,
//! serialized, and merged without pointer chasing.
//! Refs are dense `u64`s handed out in allocation order, matching what the
//! trace façade's finalize-time merge expects.

use std::collections::HashMap;

/// Kernel sentinel IPs marking a transition between kernel/user/guest frames
/// in a callchain. Per `include/uapi/linux/perf_event.h`, anything at or
/// below `PERF_CONTEXT_MAX` (interpreted as a small negative `i64`) is a
/// marker rather than a real instruction pointer.
const PERF_CONTEXT_MAX: i64 = -4095;

fn is_context_marker(ip: u64) -> bool {
    (ip as i64) <= PERF_CONTEXT_MAX
}

/// What a calling-context node represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallingContext {
    Root,
    Sample(u64),
    Process(i64),
    Thread(i64),
    Cuda(u64),
    Openmp(u64),
    Syscall(i64),
}

struct Node {
    ctx: CallingContext,
    parent: Option<usize>,
    children: HashMap<CallingContext, usize>,
}

/// An arena-backed calling-context tree, local to one writer.
pub struct Tree {
    nodes: Vec<Node>,
    /// Currently open path, root-first; `path[0]` is always the root.
    path: Vec<usize>,
}

impl Tree {
    pub fn new() -> Self {
        let root = Node {
            ctx: CallingContext::Root,
            parent: None,
            children: HashMap::new(),
        };
        Self {
            nodes: vec![root],
            path: vec![0],
        }
    }

    pub fn root_ref(&self) -> u64 {
        0
    }

    fn child_of(&mut self, parent: usize, ctx: CallingContext) -> usize {
        if let Some(&idx) = self.nodes[parent].children.get(&ctx) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(Node {
            ctx,
            parent: Some(parent),
            children: HashMap::new(),
        });
        self.nodes[parent].children.insert(ctx, idx);
        idx
    }

    /// Navigates from the currently open path toward a node tagged `ctx` at
    /// depth `level` (root is depth 0). If the node already open at `level`
    /// differs from `ctx`, the path is first closed down to `level` and the
    /// caller's `unwind_distance` is reset to 1, since the reopen is itself
    /// one unwind step. Otherwise a nonzero `unwind_distance` is carried
    /// forward incremented by one, matching a re-entry further up an
    /// already-unwound stack. Returns `(ctx_ref, resolved_unwind_distance)`:
    /// the ref of the (possibly newly allocated) node now open at `level`,
    /// and the unwind distance to archive alongside the enter event.
    pub fn enter(&mut self, level: usize, unwind_distance: u64, ctx: CallingContext) -> (u64, u64) {
        let reopened = self.path.len() > level && self.nodes[self.path[level]].ctx != ctx;
        if reopened {
            self.leave(level);
        }
        if self.path.len() <= level {
            let parent = *self.path.last().expect("root is always open");
            let idx = self.child_of(parent, ctx);
            self.path.push(idx);
        }
        let resolved_unwind_distance = if reopened {
            1
        } else if unwind_distance != 0 {
            unwind_distance + 1
        } else {
            0
        };
        (self.path[level] as u64, resolved_unwind_distance)
    }

    /// Closes the path down to `level`, returning the refs of every node
    /// popped, deepest first — one `leave` event per popped level.
    pub fn leave(&mut self, level: usize) -> Vec<u64> {
        let mut left = Vec::new();
        while self.path.len() > level.max(1) {
            left.push(self.path.pop().unwrap() as u64);
        }
        left
    }

    /// Descends into the tree for each real (non-marker) instruction pointer
    /// in `ips`, processed from the outermost frame to the innermost — the
    /// reverse of the kernel's callchain order, which lists the current IP
    /// first. Returns the ref of the deepest node, the one a
    /// calling-context-sample event should reference.
    pub fn sample(&mut self, ips: &[u64]) -> u64 {
        let mut current = 0;
        for &ip in ips.iter().rev().filter(|&&ip| !is_context_marker(ip)) {
            current = self.child_of(current, CallingContext::Sample(ip));
        }
        current as u64
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Path from root (exclusive) to `node_ref`, root-first.
    pub fn path_to(&self, node_ref: u64) -> Vec<CallingContext> {
        let mut ctxs = Vec::new();
        let mut cur = Some(node_ref as usize);
        while let Some(idx) = cur {
            if idx == 0 {
                break;
            }
            ctxs.push(self.nodes[idx].ctx);
            cur = self.nodes[idx].parent;
        }
        ctxs.reverse();
        ctxs
    }

    /// Every local ref paired with its context, in allocation order — what a
    /// finalize-time merge consumes.
    pub fn contexts(&self) -> impl Iterator<Item = (u64, CallingContext)> + '_ {
        self.nodes.iter().enumerate().map(|(i, n)| (i as u64, n.ctx))
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

/// Merges a set of per-writer local trees into a global ref space.
///
/// The global ref of a context equals the global ref assigned to the first
/// local tree (in iteration order) that contained it.
#[derive(Default)]
pub struct Merger {
    global: HashMap<CallingContext, u64>,
    next: u64,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one local tree's contexts in and returns its local→global ref
    /// mapping.
    pub fn merge(&mut self, tree: &Tree) -> HashMap<u64, u64> {
        let mut mapping = HashMap::new();
        for (local_ref, ctx) in tree.contexts() {
            let global_ref = *self.global.entry(ctx).or_insert_with(|| {
                let r = self.next;
                self.next += 1;
                r
            });
            mapping.insert(local_ref, global_ref);
        }
        mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_tree_example() {
        const KERNEL: u64 = 0xffff_ffff_ffff_ff80; // PERF_CONTEXT_KERNEL
        const USER: u64 = 0xffff_ffff_ffff_fe00; // PERF_CONTEXT_USER
        let mut tree = Tree::new();
        let leaf = tree.sample(&[KERNEL, 0xB, 0xA, USER, 0xC]);
        assert_eq!(
            tree.path_to(leaf),
            vec![
                CallingContext::Sample(0xC),
                CallingContext::Sample(0xA),
                CallingContext::Sample(0xB),
            ]
        );
    }

    #[test]
    fn determinism_same_input_same_refs() {
        let ops = [vec![1u64, 2, 3], vec![1, 2, 4], vec![1, 5]];
        let run = || {
            let mut tree = Tree::new();
            ops.iter().map(|ips| tree.sample(ips)).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn enter_leave_reuses_existing_child() {
        let mut tree = Tree::new();
        let (a, _) = tree.enter(1, 0, CallingContext::Thread(1));
        tree.leave(0);
        let (b, _) = tree.enter(1, 0, CallingContext::Thread(1));
        assert_eq!(a, b);
    }

    #[test]
    fn enter_unwind_distance_increments_then_resets_on_reopen() {
        let mut tree = Tree::new();
        let (_, d1) = tree.enter(1, 0, CallingContext::Thread(1));
        assert_eq!(d1, 0);

        // Same context held open: a nonzero caller-supplied distance is
        // carried forward incremented by one.
        let (_, d2) = tree.enter(1, 1, CallingContext::Thread(1));
        assert_eq!(d2, 2);

        // A different context at the same level forces a reopen: distance
        // resets to 1 regardless of what was passed in.
        let (_, d3) = tree.enter(1, 0, CallingContext::Thread(2));
        assert_eq!(d3, 1);
    }

    #[test]
    fn merge_assigns_global_ref_from_first_tree() {
        let mut t1 = Tree::new();
        t1.sample(&[0xA]);
        let mut t2 = Tree::new();
        t2.sample(&[0xA]);

        let mut merger = Merger::new();
        let map1 = merger.merge(&t1);
        let map2 = merger.merge(&t2);

        let ctx_a_local_t1 = t1.contexts().find(|(_, c)| *c == CallingContext::Sample(0xA)).unwrap().0;
        let ctx_a_local_t2 = t2.contexts().find(|(_, c)| *c == CallingContext::Sample(0xA)).unwrap().0;
        assert_eq!(map1[&ctx_a_local_t1], map2[&ctx_a_local_t2]);
    }
}
