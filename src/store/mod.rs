//! Task persistence — folder-as-status documents on the filesystem.

pub mod fs;
pub mod task;

pub use fs::{FsTaskStore, TaskStore};
pub use task::{
    Attempt, FIND_ORDER, PriorityEstimates, ResourceCost, Task, TaskFolder, TaskPatch,
    TaskWithStatus, Urgency,
};
