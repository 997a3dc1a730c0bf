// Task abstraction over native threads
// Preemptive, one OS thread per task. Each task owns its flag register,
// notification slot and lock for the length of one run; one global lock
// is shared by the whole process.
//
// start() is a synchronous handshake; stop() is a request the task
// honors at its next iteration or inside any Context wait.

pub mod config;
pub mod event;
pub mod global;
pub mod semaphore;
pub mod task;
pub mod timeout;

pub use config::{CoreAffinity, DEFAULT_STACK_SIZE, MIN_STACK_SIZE, Priority, TaskConfig};
pub use event::{FLAG_DESTROY, FLAG_LIMIT, FLAG_MASK, FLAG_START, FLAG_USER, flag_bit};
pub use global::{GlobalGuard, global_guard, global_lock, global_unlock};
pub use semaphore::{BinarySemaphore, SemaphoreGuard};
pub use task::{Activity, Context, StartError, Task, TaskLockGuard};
pub use timeout::FOREVER;
