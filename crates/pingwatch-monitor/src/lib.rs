//! Target registry, state classification, publishing and scheduling.

pub mod classifier;
pub mod publisher;
pub mod registry;
pub mod scheduler;

pub use classifier::{classify, next_state, ProbeOutcome, Transition};
pub use publisher::{target_variables, MemoryStore, PublishError, Publisher, VariableStore};
pub use registry::{ConfigError, TargetRegistry};
pub use scheduler::{Scheduler, SchedulerError, SchedulerSettings, TargetReport, TickReport};
