//! Supervisor Layer for System Monitoring and Recovery
//!
//! - Supervisor loop for worker liveness, broker state and host resources
//! - Alert dispatcher with hourly rate limiting
//! - Playbook for classifying findings

pub mod alert_manager;
pub mod playbook;
pub mod resources;
pub mod watchdog;

pub use alert_manager::{AlertDispatcher, AlertDispatcherConfig, AlertRateBucket, DispatchOutcome};
pub use playbook::Finding;
pub use resources::{ResourceProbe, ResourceUsage, SystemResources};
pub use watchdog::{Supervisor, SupervisorParts, TickReport};
