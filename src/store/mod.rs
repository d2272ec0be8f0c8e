//! Task record store — key-value persistence for job records, the kill
//! list, and embedded document bodies.

pub mod libsql_backend;
pub mod memory;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use memory::MemoryStore;
pub use traits::RecordStore;

/// Store key for a job record.
pub fn task_key(task_id: &str) -> String {
    format!("task:{task_id}")
}

/// Store key for an embedded document body.
pub fn doc_key(data_id: &str) -> String {
    format!("doc:{data_id}")
}

/// Store key holding the kill list (JSON array of task_ids).
pub const KILL_LIST_KEY: &str = "tasks_removed";
