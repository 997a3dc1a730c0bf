// Per-run event state of one task
//
// Flag register, notification slot, suspend gate and liveness marker
// share one lock and one condvar, so a single waiter can wake on any
// mix of them ("notification OR destroy requested"). Every mutation
// wakes all waiters; each waiter re-checks its own predicate.
//
// Bits 0 and 1 are reserved for the run loop. The register is 24 bits
// wide, matching an RTOS event group with 32-bit ticks.

use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use super::timeout;

/// Stop requested (set by `stop()`, or by the run loop when setup fails).
pub const FLAG_DESTROY: u8 = 0;
/// Setup hook finished; the repeating action is live.
pub const FLAG_START: u8 = 1;
/// First index free for application flags.
pub const FLAG_USER: u8 = 2;
/// Width of the flag register. Indices at or above this are ignored.
pub const FLAG_LIMIT: u8 = 24;

/// All usable bits of the register.
pub const FLAG_MASK: u32 = (1 << FLAG_LIMIT) - 1;

pub(crate) const DESTROY_BIT: u32 = 1 << FLAG_DESTROY;
pub(crate) const START_BIT: u32 = 1 << FLAG_START;

/// Bit for a flag index, 0 for indices outside the register.
#[inline]
pub const fn flag_bit(flag: u8) -> u32 {
    if flag < FLAG_LIMIT { 1 << flag } else { 0 }
}

struct State {
    bits: u32,
    // setup outcome, written once per run
    started: Option<bool>,
    notified: Option<u32>,
    suspended: bool,
    alive: bool,
}

impl State {
    #[inline]
    fn destroying(&self) -> bool {
        self.bits & DESTROY_BIT != 0
    }

    #[inline]
    fn matches(&self, mask: u32, all: bool) -> bool {
        if all {
            self.bits & mask == mask
        } else {
            self.bits & mask != 0
        }
    }
}

pub(crate) struct EventGroup {
    state: Mutex<State>,
    changed: Condvar,
}

impl EventGroup {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                bits: 0,
                started: None,
                notified: None,
                suspended: false,
                alive: true,
            }),
            changed: Condvar::new(),
        }
    }

    fn update<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock();
        let out = f(&mut state);
        self.changed.notify_all();
        out
    }

    // Block until `ready` yields a value or the timeout elapses. `ready`
    // gets one last look after the deadline so a change racing the
    // timeout is not lost.
    fn wait_until<T>(
        &self,
        timeout_ms: u32,
        mut ready: impl FnMut(&mut State) -> Option<T>,
    ) -> Option<T> {
        let deadline: Option<Instant> = timeout::deadline(timeout_ms);
        let mut state = self.state.lock();
        loop {
            if let Some(out) = ready(&mut state) {
                return Some(out);
            }
            match deadline {
                None => self.changed.wait(&mut state),
                Some(at) => {
                    if self.changed.wait_until(&mut state, at).timed_out() {
                        return ready(&mut state);
                    }
                }
            }
        }
    }

    // ── flag register ───────────────────────────────────────────────

    pub fn bits(&self) -> u32 {
        self.state.lock().bits
    }

    pub fn set(&self, mask: u32) {
        self.update(|s| s.bits |= mask & FLAG_MASK);
    }

    pub fn clear(&self, mask: u32) {
        self.update(|s| s.bits &= !mask);
    }

    pub fn is_destroying(&self) -> bool {
        self.state.lock().destroying()
    }

    /// Alive with no stop requested.
    pub fn is_running(&self) -> bool {
        let s = self.state.lock();
        s.alive && !s.destroying()
    }

    /// Wait for all/any of `mask` without clearing. Returns the register
    /// as it was when the wait was satisfied. Empty masks fail.
    pub fn wait_bits(&self, mask: u32, all: bool, timeout_ms: u32) -> Option<u32> {
        let mask = mask & FLAG_MASK;
        if mask == 0 {
            return None;
        }
        self.wait_until(timeout_ms, |s| s.matches(mask, all).then_some(s.bits))
    }

    /// Like [`wait_bits`](Self::wait_bits) but gives up early once a
    /// stop has been requested.
    pub fn wait_bits_or_destroy(&self, mask: u32, all: bool, timeout_ms: u32) -> bool {
        let mask = mask & FLAG_MASK;
        if mask == 0 {
            return false;
        }
        self.wait_until(timeout_ms, |s| {
            if s.matches(mask, all) {
                Some(true)
            } else if s.destroying() {
                Some(false)
            } else {
                None
            }
        })
        .unwrap_or(false)
    }

    /// Sleep for the timeout unless a stop arrives first. Returns true
    /// if the full delay elapsed.
    pub fn delay(&self, timeout_ms: u32) -> bool {
        self.wait_until(timeout_ms, |s| s.destroying().then_some(()))
            .is_none()
    }

    // ── start handshake ─────────────────────────────────────────────

    /// Record the setup outcome: START on success, DESTROY on failure.
    /// Only the first call counts.
    pub fn settle_start(&self, ok: bool) {
        self.update(|s| {
            if s.started.is_none() {
                s.bits |= if ok { START_BIT } else { DESTROY_BIT };
                s.started = Some(ok);
            }
        });
    }

    /// Block until the setup outcome is known. Later bit changes (a
    /// step that ends the task at once) do not affect the answer.
    pub fn wait_started(&self) -> bool {
        self.wait_until(timeout::FOREVER, |s| s.started)
            .unwrap_or(false)
    }

    // ── notification slot ───────────────────────────────────────────

    /// Overwrite the pending value.
    pub fn notify(&self, value: u32) {
        self.update(|s| s.notified = Some(value));
    }

    /// Consume the pending value, blocking up to the timeout. With
    /// `cancellable` a stop request ends the wait with `None`.
    pub fn take_notification(&self, timeout_ms: u32, cancellable: bool) -> Option<u32> {
        self.wait_until(timeout_ms, |s| {
            if let Some(value) = s.notified.take() {
                Some(Some(value))
            } else if cancellable && s.destroying() {
                Some(None)
            } else {
                None
            }
        })
        .flatten()
    }

    // ── suspend gate ────────────────────────────────────────────────

    pub fn suspend(&self) {
        self.update(|s| s.suspended = true);
    }

    pub fn resume(&self) {
        self.update(|s| s.suspended = false);
    }

    pub fn is_suspended(&self) -> bool {
        self.state.lock().suspended
    }

    /// Park while suspended. A stop request always opens the gate.
    pub fn wait_resumed(&self) {
        self.wait_until(timeout::FOREVER, |s| {
            (!s.suspended || s.destroying()).then_some(())
        });
    }

    // ── liveness ────────────────────────────────────────────────────

    pub fn is_alive(&self) -> bool {
        self.state.lock().alive
    }

    /// Final transition of the run loop: destroy set, start cleared,
    /// no longer alive. A run that never settled its start (setup
    /// panicked) counts as failed.
    pub fn retire(&self) {
        self.update(|s| {
            if s.started.is_none() {
                s.started = Some(false);
            }
            s.bits = (s.bits | DESTROY_BIT) & !START_BIT;
            s.alive = false;
        });
    }

    pub fn wait_retired(&self, timeout_ms: u32) -> bool {
        self.wait_until(timeout_ms, |s| (!s.alive).then_some(()))
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn flag_bit_ignores_out_of_range() {
        assert_eq!(flag_bit(FLAG_USER), 0b100);
        assert_eq!(flag_bit(FLAG_LIMIT - 1), 1 << 23);
        assert_eq!(flag_bit(FLAG_LIMIT), 0);
        assert_eq!(flag_bit(31), 0);
    }

    #[test]
    fn set_and_clear_touch_only_their_bits() {
        let ev = EventGroup::new();
        ev.set(START_BIT);
        ev.set(flag_bit(FLAG_USER) | flag_bit(5));
        ev.clear(flag_bit(FLAG_USER));
        assert_eq!(ev.bits(), START_BIT | flag_bit(5));
    }

    #[test]
    fn set_drops_bits_above_register() {
        let ev = EventGroup::new();
        ev.set(0xFF00_0000 | flag_bit(3));
        assert_eq!(ev.bits(), flag_bit(3));
    }

    #[test]
    fn wait_all_needs_every_bit() {
        let ev = EventGroup::new();
        ev.set(flag_bit(2));
        let mask = flag_bit(2) | flag_bit(3);
        assert!(ev.wait_bits(mask, true, 20).is_none());
        assert_eq!(ev.wait_bits(mask, false, 0), Some(flag_bit(2)));
        ev.set(flag_bit(3));
        assert!(ev.wait_bits(mask, true, 0).is_some());
    }

    #[test]
    fn wait_does_not_clear() {
        let ev = EventGroup::new();
        ev.set(flag_bit(4));
        assert!(ev.wait_bits(flag_bit(4), true, 0).is_some());
        assert!(ev.wait_bits(flag_bit(4), true, 0).is_some());
    }

    #[test]
    fn empty_mask_fails_immediately() {
        let ev = EventGroup::new();
        let start = Instant::now();
        assert!(ev.wait_bits(0, true, 1000).is_none());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn wait_wakes_on_set_from_other_thread() {
        let ev = Arc::new(EventGroup::new());
        let setter = {
            let ev = ev.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ev.set(flag_bit(7));
            })
        };
        assert!(ev.wait_bits(flag_bit(7), true, timeout::FOREVER).is_some());
        setter.join().unwrap();
    }

    #[test]
    fn notification_overwrites() {
        let ev = EventGroup::new();
        ev.notify(1);
        ev.notify(2);
        assert_eq!(ev.take_notification(0, false), Some(2));
        assert_eq!(ev.take_notification(10, false), None);
    }

    #[test]
    fn cancellable_waits_end_on_destroy() {
        let ev = Arc::new(EventGroup::new());
        let stopper = {
            let ev = ev.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ev.set(DESTROY_BIT);
            })
        };
        assert_eq!(ev.take_notification(timeout::FOREVER, true), None);
        assert!(!ev.wait_bits_or_destroy(flag_bit(9), true, timeout::FOREVER));
        assert!(!ev.delay(timeout::FOREVER));
        stopper.join().unwrap();
    }

    #[test]
    fn start_outcome_survives_later_teardown() {
        let ev = EventGroup::new();
        ev.settle_start(true);
        ev.settle_start(false);
        assert_eq!(ev.bits(), START_BIT);
        ev.set(DESTROY_BIT);
        ev.retire();
        assert_eq!(ev.bits() & START_BIT, 0);
        assert!(ev.wait_started());
    }

    #[test]
    fn failed_setup_sets_destroy() {
        let ev = EventGroup::new();
        ev.settle_start(false);
        assert_eq!(ev.bits(), DESTROY_BIT);
        assert!(!ev.wait_started());
    }

    #[test]
    fn retire_before_settle_counts_as_failure() {
        let ev = Arc::new(EventGroup::new());
        let runner = {
            let ev = ev.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ev.retire();
            })
        };
        assert!(!ev.wait_started());
        runner.join().unwrap();
    }

    #[test]
    fn delay_runs_out_without_stop() {
        let ev = EventGroup::new();
        let start = Instant::now();
        assert!(ev.delay(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn gate_opens_on_destroy() {
        let ev = EventGroup::new();
        ev.suspend();
        assert!(ev.is_suspended());
        ev.set(DESTROY_BIT);
        ev.wait_resumed();
    }

    #[test]
    fn retire_marks_dead_and_sets_destroy() {
        let ev = EventGroup::new();
        ev.set(START_BIT | flag_bit(FLAG_USER));
        assert!(ev.is_alive());
        assert!(ev.is_running());
        ev.retire();
        assert!(!ev.is_running());
        assert!(!ev.is_alive());
        assert_eq!(ev.bits(), DESTROY_BIT | flag_bit(FLAG_USER));
        assert!(ev.wait_retired(0));
    }
}
