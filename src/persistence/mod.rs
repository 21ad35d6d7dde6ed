//! Durable state shared between the supervisor and the scheduled jobs
//!
//! - Atomic JSON files (write-to-temp, fsync, rename)
//! - Status store read by external dashboards
//! - PID files for single-instance locks

pub mod atomic;
pub mod pidfile;
pub mod status_store;

pub use atomic::{read_json, write_json_atomic, write_private};
pub use pidfile::{is_process_alive, read_pid, PidLock};
pub use status_store::{StatusRecord, StatusStore};
