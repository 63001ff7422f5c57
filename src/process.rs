//! Process-tree observation boundary.
//!
//! This module holds only the trait a process-mode fleet calls into as it
//! observes fork, exec, and exit, plus a no-op double for system-mode runs
//! and tests; driving the ptrace session that feeds those calls lives
//! wherever the fleet is wired up.

/// Callbacks invoked as a process-mode fleet observes process lifecycle
/// events, typically from a ptrace event loop owned elsewhere.
pub trait ProcessEvents {
    fn insert_process(&mut self, pid: i32);
    fn insert_thread(&mut self, pid: i32, tid: i32);
    fn exit_thread(&mut self, tid: i32);
    fn update_process_name(&mut self, pid: i32, name: &str);
}

/// Does nothing. Used by system-mode fleets, which have no process
/// controller, and by tests that don't exercise process-mode bookkeeping.
#[derive(Default)]
pub struct NullProcessController;

impl ProcessEvents for NullProcessController {
    fn insert_process(&mut self, _pid: i32) {}
    fn insert_thread(&mut self, _pid: i32, _tid: i32) {}
    fn exit_thread(&mut self, _tid: i32) {}
    fn update_process_name(&mut self, _pid: i32, _name: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_controller_accepts_every_callback() {
        let mut c = NullProcessController;
        c.insert_process(1);
        c.insert_thread(1, 2);
        c.update_process_name(1, "init");
        c.exit_thread(2);
    }
}
