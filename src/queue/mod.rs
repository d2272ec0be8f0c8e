//! Background job queue — record schema, lifecycle transitions, and the
//! dispatch contract.

pub mod dispatch;
pub mod lifecycle;
pub mod record;
pub mod tasks;

pub use dispatch::{LocalQueue, Operation, TaskContext, TaskHandler, TaskPayload, TaskQueue};
pub use lifecycle::TaskLifecycle;
pub use record::{GeneralStatus, JobRecord, QueueResponse, TaskStatus};
pub use tasks::{EmbedDocTask, HealthCheckTask};
