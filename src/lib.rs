// Task lifecycle wrapper for preemptive threads, plus the status
// display activity built on it

pub mod kernel;
pub mod status;

pub use kernel::{Activity, Context, FOREVER, StartError, Task, TaskConfig};
