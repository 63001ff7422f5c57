//! Fleet coordinator: owns every monitor thread for one trace run and
//! sequences their startup and shutdown.

use std::collections::HashMap;

use crate::config::tracer::TraceMode;
use crate::error::Result;
use crate::ffi::syscall;
use crate::monitor::{self, Handle, MonitorCapability};
use crate::process::{NullProcessController, ProcessEvents};
use crate::scope::ExecutionScope;

/// Enumerates online CPUs from `pid 0`'s affinity mask, the system-mode
/// monitor set.
pub fn system_wide_scopes() -> Result<Vec<ExecutionScope>> {
    Ok(syscall::sched_getaffinity(0)?
        .into_iter()
        .map(|cpu| ExecutionScope::Cpu(cpu as i64))
        .collect())
}

/// Owns every monitor thread for one trace run, plus (in process mode) the
/// controller observing the target's fork/exec/exit events.
///
/// Monitors are stopped in the reverse of their creation order: stop
/// signals are broadcast first so every thread drains concurrently, then
/// each is joined in that reverse order, so a monitor that depends on
/// another's output (a device-wide writer reading a per-CPU monitor's ring
/// buffer) always outlives its dependency.
pub struct Fleet<P: ProcessEvents = NullProcessController> {
    mode: TraceMode,
    controller: P,
    order: Vec<ExecutionScope>,
    monitors: HashMap<ExecutionScope, Handle>,
}

impl Fleet<NullProcessController> {
    pub fn system_wide() -> Self {
        Self::with_controller(TraceMode::SystemWide, NullProcessController)
    }
}

impl<P: ProcessEvents> Fleet<P> {
    pub fn with_controller(mode: TraceMode, controller: P) -> Self {
        Self {
            mode,
            controller,
            order: Vec::new(),
            monitors: HashMap::new(),
        }
    }

    pub fn mode(&self) -> &TraceMode {
        &self.mode
    }

    pub fn controller_mut(&mut self) -> &mut P {
        &mut self.controller
    }

    /// Starts one monitor for `scope`. Spawning an already-monitored scope
    /// stops the prior monitor for it first and keeps its original position
    /// in the shutdown order.
    pub fn spawn<C: MonitorCapability + 'static>(&mut self, scope: ExecutionScope, capability: C) -> Result<()> {
        let handle = monitor::start(scope, capability)?;
        if let Some(mut old) = self.monitors.insert(scope, handle) {
            old.stop();
        } else {
            self.order.push(scope);
        }
        Ok(())
    }

    pub fn scopes(&self) -> impl Iterator<Item = &ExecutionScope> {
        self.order.iter()
    }

    pub fn is_monitoring(&self, scope: ExecutionScope) -> bool {
        self.monitors.contains_key(&scope)
    }

    /// Removes and stops the monitor for `scope`, if any. Used by
    /// process-mode fleets on thread exit.
    pub fn stop_scope(&mut self, scope: ExecutionScope) {
        if let Some(mut handle) = self.monitors.remove(&scope) {
            handle.stop();
        }
        self.order.retain(|s| *s != scope);
    }

    /// Stops every monitor in the reverse of its creation order.
    pub fn shutdown(&mut self) {
        for scope in self.order.drain(..).rev() {
            if let Some(mut handle) = self.monitors.remove(&scope) {
                handle.stop();
            }
        }
    }
}

impl<P: ProcessEvents> Drop for Fleet<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct RecordingCapability {
        scope: ExecutionScope,
        log: Arc<Mutex<Vec<ExecutionScope>>>,
    }

    impl MonitorCapability for RecordingCapability {
        fn interval(&self) -> Option<Duration> {
            Some(Duration::from_millis(1000))
        }

        fn finalize_thread(&mut self) -> Result<()> {
            self.log.lock().unwrap().push(self.scope);
            Ok(())
        }
    }

    #[test]
    fn shutdown_stops_in_reverse_creation_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut fleet = Fleet::system_wide();

        let scopes = [
            ExecutionScope::Cpu(0),
            ExecutionScope::Cpu(1),
            ExecutionScope::Cpu(2),
        ];
        for &scope in &scopes {
            fleet
                .spawn(
                    scope,
                    RecordingCapability {
                        scope,
                        log: log.clone(),
                    },
                )
                .unwrap();
        }

        fleet.shutdown();

        let recorded = log.lock().unwrap().clone();
        let mut expected = scopes.to_vec();
        expected.reverse();
        assert_eq!(recorded, expected);
    }

    #[test]
    fn respawning_a_scope_keeps_its_shutdown_position() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut fleet = Fleet::system_wide();
        let a = ExecutionScope::Cpu(0);
        let b = ExecutionScope::Cpu(1);

        fleet
            .spawn(a, RecordingCapability { scope: a, log: log.clone() })
            .unwrap();
        fleet
            .spawn(b, RecordingCapability { scope: b, log: log.clone() })
            .unwrap();
        fleet
            .spawn(a, RecordingCapability { scope: a, log: log.clone() })
            .unwrap();

        assert_eq!(fleet.scopes().copied().collect::<Vec<_>>(), vec![a, b]);
    }
}
