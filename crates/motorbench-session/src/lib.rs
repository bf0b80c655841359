//! Session orchestration for the motor test bench.
//!
//! Glues one device id to one poll loop and one set of latch flags per UI
//! session, enforces the bench-wide session cap, and owns the slot table
//! that guarantees no two active sessions address the same physical device.

pub mod allocator;
pub mod bench;
pub mod session;

pub use allocator::SlotAllocator;
pub use bench::{BenchConfig, TestBench, DEFAULT_MAX_SESSIONS, DEFAULT_POLL_PERIOD};
pub use session::{MotorSession, SessionRequest, SessionState, SnapshotSink};
