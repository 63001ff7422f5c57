//! Whole-node performance tracer built on `perf_event_open(2)`.
//!
//! ## Example
//!
//! Count retired instructions for a process and sample its user stack at 1kHz.
//!
//! ```rust
//! use nodetrace::config::{Cpu, Opts, Proc, SampleOn};
//! use nodetrace::count::Counter;
//! use nodetrace::event::hw::Hardware;
//!
//! let event = Hardware::Instr;
//! let target = (Proc::CURRENT, Cpu::ALL);
//!
//! let mut opts = Opts::default();
//! opts.sample_on = SampleOn::Freq(1000);
//!
//! let counter = Counter::new(event, target, opts).unwrap();
//! let sampler = counter.sampler(10).unwrap();
//!
//! counter.enable().unwrap();
//! fn fib(n: usize) -> usize {
//!     match n {
//!         0 => 0,
//!         1 => 1,
//!         n => fib(n - 1) + fib(n - 2),
//!     }
//! }
//! std::hint::black_box(fib(30));
//! counter.disable().unwrap();
//!
//! let instrs = counter.stat().unwrap().count;
//! println!("{} instructions retired", instrs);
//!
//! for it in sampler.iter() {
//!     println!("{:-?}", it);
//! }
//! ```

pub mod cctx;
pub mod config;
pub mod count;
pub mod demux;
pub mod error;
pub mod event;
mod ffi;
pub mod fleet;
pub mod monitor;
pub mod multireader;
pub mod process;
pub mod resolver;
pub mod sample;
pub mod scope;
pub mod shmrb;
pub mod time;
pub mod trace;
pub mod tracepoint;
pub mod writer;
