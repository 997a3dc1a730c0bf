// Process-wide lock shared by every task
//
// Const-initialized static, so it exists before the first task is
// built and before any thread is spawned. Guards cross-task state that
// is not tied to one task's lifetime; usable with no task running.

use super::semaphore::{BinarySemaphore, SemaphoreGuard};

static GLOBAL_MUTEX: BinarySemaphore = BinarySemaphore::new();

/// Take the global lock. `timeout_ms` of [`FOREVER`](super::FOREVER) blocks.
pub fn global_lock(timeout_ms: u32) -> bool {
    GLOBAL_MUTEX.take(timeout_ms)
}

pub fn global_unlock() {
    GLOBAL_MUTEX.give();
}

/// Scoped form of [`global_lock`]: unlocks when the guard drops.
pub fn global_guard(timeout_ms: u32) -> Option<GlobalGuard> {
    SemaphoreGuard::acquire(&GLOBAL_MUTEX, timeout_ms).map(|guard| GlobalGuard { _guard: guard })
}

pub struct GlobalGuard {
    _guard: SemaphoreGuard<'static>,
}
