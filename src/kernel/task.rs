// Task lifecycle: start handshake, run loop, cooperative stop
//
// One Task = one OS thread running an Activity:
//
//   start()  create per-run resources -> spawn -> block until the
//            thread records its setup outcome (START or DESTROY)
//   thread   setup -> [gate -> DESTROY? -> step]* -> teardown -> retire
//   stop()   set DESTROY and return; the thread tears itself down
//
// Per-run resources (flags, notification slot, lock, liveness) sit in
// one Arc<Control> shared by the Task and its thread; whoever drops it
// last releases it. stop() never destroys anything itself.
//
// The Activity comes back out of the thread when it ends, so a stopped
// task can be started again.

use core::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use super::config::{CoreAffinity, TaskConfig};
use super::event::{DESTROY_BIT, EventGroup, START_BIT, flag_bit};
use super::semaphore::BinarySemaphore;

/// A repeating unit of work driven by a [`Task`].
///
/// `step` is called back to back with no forced yield in between, so it
/// must do its own pacing (block on [`Context::wait_notify`],
/// [`Context::delay`], ...). Those waits end early when a stop is
/// requested; an activity that blocks elsewhere is only stopped once it
/// returns from `step`.
pub trait Activity: Send + 'static {
    /// Runs once on the task's thread before the first `step`.
    /// Returning false aborts the start.
    fn setup(&mut self, _ctx: &Context) -> bool {
        true
    }

    fn step(&mut self, ctx: &Context);

    /// Runs once on the task's thread after the last `step`.
    fn teardown(&mut self, _ctx: &Context) {}
}

#[derive(Debug)]
pub enum StartError {
    /// The OS refused to create the thread.
    Spawn(io::Error),
    /// The activity's setup hook returned false or panicked.
    SetupFailed,
    /// The activity was lost to a panic on an earlier run.
    ActivityLost,
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::Spawn(e) => write!(f, "thread spawn failed: {}", e),
            StartError::SetupFailed => write!(f, "activity setup failed"),
            StartError::ActivityLost => write!(f, "activity lost to an earlier panic"),
        }
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

// Resources of one run, created by start()
struct Control {
    name: String,
    events: EventGroup,
    mutex: BinarySemaphore,
}

impl Control {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            events: EventGroup::new(),
            mutex: BinarySemaphore::new(),
        }
    }
}

/// Holds the task's lock; unlocks on drop.
pub struct TaskLockGuard {
    control: Arc<Control>,
}

impl Drop for TaskLockGuard {
    fn drop(&mut self) {
        self.control.mutex.give();
    }
}

/// The running task as seen from inside its own hooks.
///
/// Waits here also end when a stop is requested.
pub struct Context {
    control: Arc<Control>,
}

impl Context {
    pub fn name(&self) -> &str {
        &self.control.name
    }

    pub fn stop_requested(&self) -> bool {
        self.control.events.is_destroying()
    }

    /// Take the pending notification, waiting up to `timeout_ms`.
    /// `None` on timeout or when a stop is requested.
    pub fn wait_notify(&self, timeout_ms: u32) -> Option<u32> {
        self.control.events.take_notification(timeout_ms, true)
    }

    /// Sleep, cut short by a stop request. True if the full time passed.
    pub fn delay(&self, timeout_ms: u32) -> bool {
        self.control.events.delay(timeout_ms)
    }

    pub fn flags(&self) -> u32 {
        self.control.events.bits()
    }

    pub fn flag(&self, flag: u8) -> bool {
        let bit = flag_bit(flag);
        bit != 0 && self.control.events.bits() & bit != 0
    }

    pub fn set_flag(&self, flag: u8) {
        self.control.events.set(flag_bit(flag));
    }

    pub fn clear_flag(&self, flag: u8) {
        self.control.events.clear(flag_bit(flag));
    }

    /// False on timeout, or when a stop arrives before the bits do.
    pub fn wait_flags(&self, mask: u32, all: bool, timeout_ms: u32) -> bool {
        self.control.events.wait_bits_or_destroy(mask, all, timeout_ms)
    }

    pub fn lock(&self, timeout_ms: u32) -> bool {
        self.control.mutex.take(timeout_ms)
    }

    pub fn unlock(&self) {
        self.control.mutex.give();
    }

    pub fn locked(&self, timeout_ms: u32) -> Option<TaskLockGuard> {
        self.lock(timeout_ms).then(|| TaskLockGuard {
            control: self.control.clone(),
        })
    }
}

struct Lifecycle<A> {
    // parked here while no thread owns it
    activity: Option<A>,
    // resources of the current (or last) run
    control: Option<Arc<Control>>,
    worker: Option<JoinHandle<Option<A>>>,
}

/// A named, prioritized activity with its own thread and sync state.
///
/// Every method takes `&self`; share a task between threads with `Arc`.
/// Calls that need a running task quietly return `false`/`0`/`None`
/// when it is not running.
pub struct Task<A: Activity> {
    config: TaskConfig,
    // held for the whole of start(), never by anything else
    starting: Mutex<()>,
    life: Mutex<Lifecycle<A>>,
}

impl<A: Activity> Task<A> {
    pub fn new(config: TaskConfig, activity: A) -> Self {
        Self {
            config,
            starting: Mutex::new(()),
            life: Mutex::new(Lifecycle {
                activity: Some(activity),
                control: None,
                worker: None,
            }),
        }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn running(&self) -> Option<Arc<Control>> {
        let life = self.life.lock();
        life.control
            .as_ref()
            .filter(|c| c.events.is_running())
            .cloned()
    }

    /// Start the thread and wait until its setup hook has finished.
    ///
    /// Ok once setup succeeded, even if the activity ended itself right
    /// after. Already-running tasks return Ok at once. A task that is
    /// still tearing down from a previous stop is waited for first.
    ///
    /// Concurrent starts queue up behind each other; every other method
    /// stays usable while a start waits, including from inside setup.
    pub fn start(&self) -> Result<(), StartError> {
        let _starting = self.starting.lock();

        let previous = {
            let mut life = self.life.lock();
            if life.control.as_ref().is_some_and(|c| c.events.is_running()) {
                return Ok(());
            }
            life.worker.take()
        };
        if let Some(worker) = previous {
            self.reclaim(worker);
        }

        let control = Arc::new(Control::new(&self.config.name));
        let activity = {
            let mut life = self.life.lock();
            let activity = life.activity.take().ok_or(StartError::ActivityLost)?;
            // visible before the thread exists, so setup can be driven
            // from outside
            life.control = Some(control.clone());
            activity
        };
        let handoff = Arc::new(Mutex::new(Some(activity)));

        let spawned = thread::Builder::new()
            .name(self.config.name.clone())
            .stack_size(self.config.thread_stack())
            .spawn({
                let control = control.clone();
                let handoff = handoff.clone();
                let core = self.config.core;
                move || run(control, handoff, core)
            });

        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                let mut life = self.life.lock();
                life.control = None;
                life.activity = handoff.lock().take();
                error!("[task:{}] error creating thread: {}", self.config.name, e);
                return Err(StartError::Spawn(e));
            }
        };
        self.life.lock().worker = Some(worker);

        if !control.events.wait_started() {
            // the thread is already on its way out
            let worker = self.life.lock().worker.take();
            if let Some(worker) = worker {
                self.reclaim(worker);
            }
            return Err(StartError::SetupFailed);
        }

        debug!(
            "[task:{}] priority {} recorded; host threads run at OS default",
            self.config.name, self.config.priority
        );
        info!("[task:{}] started", self.config);
        Ok(())
    }

    // Join a finished (or finishing) thread and park its activity.
    fn reclaim(&self, worker: JoinHandle<Option<A>>) {
        match worker.join() {
            Ok(Some(activity)) => self.life.lock().activity = Some(activity),
            Ok(None) => {}
            Err(_) => error!("[task:{}] activity panicked", self.config.name),
        }
    }

    /// Request the thread to tear down. Does not wait; see
    /// [`wait_stopped`](Self::wait_stopped).
    pub fn stop(&self) {
        let life = self.life.lock();
        if let Some(control) = life.control.as_ref() {
            if control.events.is_running() {
                debug!("[task:{}] stop requested", self.config.name);
                control.events.set(DESTROY_BIT);
            }
        }
    }

    /// Started, and no stop requested or self-termination seen yet.
    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    /// The thread still exists, possibly in teardown.
    pub fn is_alive(&self) -> bool {
        let life = self.life.lock();
        life.control.as_ref().is_some_and(|c| c.events.is_alive())
    }

    /// Wait for the thread to finish its teardown. True when no thread
    /// is left, false on timeout.
    pub fn wait_stopped(&self, timeout_ms: u32) -> bool {
        let control = self.life.lock().control.clone();
        match control {
            Some(control) => control.events.wait_retired(timeout_ms),
            None => true,
        }
    }

    /// Hold the activity before its next step.
    pub fn pause(&self) {
        if let Some(control) = self.running() {
            debug!("[task:{}] paused", self.config.name);
            control.events.suspend();
        }
    }

    pub fn resume(&self) {
        if let Some(control) = self.running() {
            if control.events.is_suspended() {
                debug!("[task:{}] resumed", self.config.name);
                control.events.resume();
            }
        }
    }

    pub fn is_paused(&self) -> bool {
        self.running().is_some_and(|c| c.events.is_suspended())
    }

    pub fn lock(&self, timeout_ms: u32) -> bool {
        self.running().is_some_and(|c| c.mutex.take(timeout_ms))
    }

    pub fn unlock(&self) {
        if let Some(control) = self.running() {
            control.mutex.give();
        }
    }

    pub fn locked(&self, timeout_ms: u32) -> Option<TaskLockGuard> {
        let control = self.running()?;
        control
            .mutex
            .take(timeout_ms)
            .then(|| TaskLockGuard { control })
    }

    /// Overwrite the task's pending notification.
    pub fn notify(&self, value: u32) -> bool {
        match self.running() {
            Some(control) => {
                control.events.notify(value);
                true
            }
            None => false,
        }
    }

    pub fn flags(&self) -> u32 {
        self.running().map_or(0, |c| c.events.bits())
    }

    pub fn flag(&self, flag: u8) -> bool {
        let bit = flag_bit(flag);
        bit != 0 && self.flags() & bit != 0
    }

    pub fn set_flag(&self, flag: u8) {
        if let Some(control) = self.running() {
            control.events.set(flag_bit(flag));
        }
    }

    pub fn clear_flag(&self, flag: u8) {
        if let Some(control) = self.running() {
            control.events.clear(flag_bit(flag));
        }
    }

    /// Wait until all (or any) bits of `mask` are set, without clearing.
    pub fn wait_flags(&self, mask: u32, all: bool, timeout_ms: u32) -> bool {
        self.running()
            .is_some_and(|c| c.events.wait_bits(mask, all, timeout_ms).is_some())
    }
}

impl<A: Activity> Drop for Task<A> {
    fn drop(&mut self) {
        self.stop();
    }
}

// Clears liveness when the thread leaves run(), also on unwind.
struct Retire<'a>(&'a Control);

impl Drop for Retire<'_> {
    fn drop(&mut self) {
        self.0.events.retire();
    }
}

fn pin_to(core: CoreAffinity, name: &str) {
    let CoreAffinity::Core(id) = core else {
        return;
    };
    let pinned = core_affinity::get_core_ids()
        .and_then(|ids| ids.into_iter().find(|c| c.id == id))
        .is_some_and(core_affinity::set_for_current);
    if !pinned {
        warn!("[task:{}] core {} unavailable, running unpinned", name, id);
    }
}

fn run<A: Activity>(
    control: Arc<Control>,
    handoff: Arc<Mutex<Option<A>>>,
    core: CoreAffinity,
) -> Option<A> {
    let _retire = Retire(&control);
    let mut activity = handoff.lock().take()?;
    pin_to(core, &control.name);

    let ctx = Context {
        control: control.clone(),
    };

    // Initializing
    let ok = activity.setup(&ctx);
    control.events.settle_start(ok);
    if !ok {
        error!("[task:{}] setup failed", control.name);
        return Some(activity);
    }

    // Running
    loop {
        control.events.wait_resumed();
        if control.events.is_destroying() {
            break;
        }
        activity.step(&ctx);
    }

    // Destroying
    control.events.clear(START_BIT);
    activity.teardown(&ctx);
    info!("[task:{}] stopped", control.name);
    Some(activity)
}
