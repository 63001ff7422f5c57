//! Trace archive façade.
//!
//! `Trace` writes a directory of newline-delimited-JSON event logs (one per
//! location) plus a `definitions.json` global table, using `serde`/
//! `serde_json`. A real OTF2-style backend could replace this storage layer
//! later without touching any caller, since every writer only ever talks to
//! `Trace` through `LocationWriter`/`TraceEvent`.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Result, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;

use crate::cctx;
use crate::scope::MeasurementScope;

/// One event written to a location's NDJSON log. Tagged by `kind` so the
/// archive reader can dispatch without a schema registry.
#[derive(Serialize)]
#[serde(tag = "kind")]
pub enum TraceEvent {
    CctxEnter { ts: u64, ctx_ref: u64, unwind_distance: u64 },
    CctxLeave { ts: u64, ctx_ref: u64 },
    CctxSample { ts: u64, ctx_ref: u64 },
    Metric { ts: u64, class: u64, value: u64 },
    IoBegin { ts: u64, device: u64, offset: u64, size: u64 },
    IoIssued { ts: u64, device: u64, offset: u64 },
    IoComplete { ts: u64, device: u64, offset: u64, size: u64 },
    RegionEnter { ts: u64, region: u64 },
    RegionLeave { ts: u64, region: u64 },
}

/// A single-producer handle onto one location's event log. Acquired through
/// [`Trace`], which serializes the definition lookup/creation but hands back
/// an unshared writer.
pub struct LocationWriter {
    id: u64,
    file: BufWriter<File>,
}

impl LocationWriter {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn emit(&mut self, event: &TraceEvent) -> Result<()> {
        serde_json::to_writer(&mut self.file, event)?;
        self.file.write_all(b"\n")
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()
    }
}

#[derive(Default, Serialize)]
struct Definitions {
    locations: HashMap<String, u64>,
    metric_classes: HashMap<String, u64>,
    regions: HashMap<String, u64>,
}

struct Inner {
    defs: Definitions,
    next_id: u64,
    cctx_merger: cctx::Merger,
    syscall_next: u64,
    syscall_global: HashMap<i64, u64>,
    tid_next: u64,
    tid_global: HashMap<i64, u64>,
}

impl Inner {
    fn intern(&mut self, table: impl Fn(&mut Definitions) -> &mut HashMap<String, u64>, name: &str) -> u64 {
        if let Some(&id) = table(&mut self.defs).get(name) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        table(&mut self.defs).insert(name.to_owned(), id);
        id
    }
}

/// Mutex-guarded archive handle. Definition creation is serialized; acquired
/// writers are not shared further.
pub struct Trace {
    dir: PathBuf,
    inner: Mutex<Inner>,
}

/// A dense metric-class/writer-location/scope-location triple, the key a
/// metric sample is recorded against.
#[derive(Clone, Copy, Debug)]
pub struct MetricInstance {
    pub class: u64,
    pub writer_loc: u64,
    pub scope_loc: u64,
}

impl Trace {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            inner: Mutex::new(Inner {
                defs: Definitions::default(),
                next_id: 0,
                cctx_merger: cctx::Merger::new(),
                syscall_next: 0,
                syscall_global: HashMap::new(),
                tid_next: 0,
                tid_global: HashMap::new(),
            }),
        })
    }

    fn open_location(&self, id: u64) -> Result<LocationWriter> {
        let path = self.dir.join(format!("loc-{id}.ndjson"));
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(LocationWriter {
            id,
            file: BufWriter::new(file),
        })
    }

    pub fn create_metric_writer(&self, name: &str) -> Result<LocationWriter> {
        let id = {
            let mut inner = self.inner.lock().unwrap();
            inner.intern(|d| &mut d.locations, name)
        };
        self.open_location(id)
    }

    pub fn sample_writer_for(&self, scope: MeasurementScope) -> Result<LocationWriter> {
        let name = format!("sample/{:?}", scope.scope);
        self.create_metric_writer(&name)
    }

    pub fn bio_writer(&self, device: u64) -> Result<LocationWriter> {
        self.create_metric_writer(&format!("bio/{device}"))
    }

    pub fn metric_instance(&self, class_name: &str, writer_loc: u64, scope_loc: u64) -> MetricInstance {
        let class = {
            let mut inner = self.inner.lock().unwrap();
            inner.intern(|d| &mut d.metric_classes, class_name)
        };
        MetricInstance {
            class,
            writer_loc,
            scope_loc,
        }
    }

    pub fn create_local_cctx_tree(&self, _scope: MeasurementScope) -> cctx::Tree {
        cctx::Tree::new()
    }

    /// Merges a writer's local calling-context tree into the global ref
    /// space at finalize, returning its local→global mapping.
    pub fn merge_tids(&self, local: &cctx::Tree) -> HashMap<u64, u64> {
        self.inner.lock().unwrap().cctx_merger.merge(local)
    }

    /// Merges a set of syscall numbers observed by a syscall writer into the
    /// trace-global syscall region mapping.
    pub fn merge_syscall_contexts(&self, syscalls: impl IntoIterator<Item = i64>) -> HashMap<i64, u64> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let mut mapping = HashMap::new();
        for nr in syscalls {
            let id = *inner.syscall_global.entry(nr).or_insert_with(|| {
                let id = inner.syscall_next;
                inner.syscall_next += 1;
                id
            });
            mapping.insert(nr, id);
        }
        mapping
    }

    /// Interns a thread id into the trace-global region mapping used for
    /// per-thread regions (context-switch and syscall writers key on this).
    pub fn merge_tid(&self, tid: i64) -> u64 {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        *inner.tid_global.entry(tid).or_insert_with(|| {
            let id = inner.tid_next;
            inner.tid_next += 1;
            id
        })
    }

    /// Writes `definitions.json` at finalize. Left marked incomplete (by
    /// simply not calling this) if a writer failed to flush.
    pub fn finalize(&self) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        let path = self.dir.join("definitions.json");
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, &inner.defs)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_are_deduplicated_by_value() {
        let dir = std::env::temp_dir().join(format!("nodetrace-test-{}", std::process::id()));
        let trace = Trace::create(&dir).unwrap();
        let a = trace.create_metric_writer("cycles").unwrap();
        let b = trace.create_metric_writer("cycles").unwrap();
        assert_eq!(a.id(), b.id());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn syscall_merge_is_idempotent_across_writers() {
        let dir = std::env::temp_dir().join(format!("nodetrace-test2-{}", std::process::id()));
        let trace = Trace::create(&dir).unwrap();
        let m1 = trace.merge_syscall_contexts([1, 2, 3]);
        let m2 = trace.merge_syscall_contexts([2, 3, 4]);
        assert_eq!(m1[&2], m2[&2]);
        assert_eq!(m1[&3], m2[&3]);
        let _ = fs::remove_dir_all(&dir);
    }
}
