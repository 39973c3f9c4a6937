//! Background task queue: state machine, priority scheduling, result retention.

mod results;
mod scheduler;
pub mod task;

pub use scheduler::{QueueStatus, Scheduler};
pub use task::{EnqueueOptions, ProcessingTask, TaskStatus, TaskStatusView, TaskType};
