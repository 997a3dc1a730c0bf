// Status display activity
//
// Four symbol slots and a brightness level, redrawn once per frame and
// handed to a StatusSink (the panel driver lives behind the sink).
//
// Symbols travel through the task's notification slot as one packed
// u32, so the newest set always wins. Brightness requests go through a
// Signal and are picked up on the next frame. With auto-dim the panel
// steps Normal -> Dim -> Off while nothing changes; new symbols bring
// it back to Normal.

pub mod symbol;

use core::cell::Cell;
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant};
use log::{error, info};

use crate::kernel::{Activity, Context, StartError, Task, TaskConfig};

pub use symbol::{Brightness, Frame, SLOTS, SYMBOL_BLINK, Slot, Symbol, Symbols};

/// Task name of the status activity.
pub const STATUS_TASK_NAME: &str = "status";

/// Stack budget of the status activity, in bytes.
pub const STATUS_STACK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusConfig {
    /// Redraw period; also the blink half-period.
    pub frame: Duration,
    /// Idle time before Normal drops to Dim.
    pub dim_after: Duration,
    /// Further idle time before Dim drops to Off.
    pub off_after: Duration,
    pub auto_dim: bool,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            frame: Duration::from_millis(250),
            dim_after: Duration::from_secs(5),
            off_after: Duration::from_secs(5),
            auto_dim: true,
        }
    }
}

/// Display backend driven by the status activity.
pub trait StatusSink: Send + 'static {
    /// Bring the panel up. Returning false fails the task start.
    fn open(&mut self) -> bool {
        true
    }

    fn show(&mut self, frame: &Frame);

    fn close(&mut self) {}
}

struct Shared {
    requested: Signal<CriticalSectionRawMutex, Brightness>,
    // level of the last frame handed to the sink
    shown: critical_section::Mutex<Cell<Brightness>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            requested: Signal::new(),
            shown: critical_section::Mutex::new(Cell::new(Brightness::Off)),
        }
    }

    fn publish(&self, level: Brightness) {
        critical_section::with(|cs| self.shown.borrow(cs).set(level));
    }

    fn shown(&self) -> Brightness {
        critical_section::with(|cs| self.shown.borrow(cs).get())
    }
}

pub struct StatusActivity<S> {
    sink: S,
    config: StatusConfig,
    shared: Arc<Shared>,
    symbols: Symbols,
    brightness: Brightness,
    frames: u8,
    last_change: Instant,
}

impl<S: StatusSink> StatusActivity<S> {
    fn frame_ms(&self) -> u32 {
        self.config.frame.as_millis().min(u32::MAX as u64 - 1) as u32
    }

    fn set_level(&mut self, level: Brightness, now: Instant) {
        self.brightness = level;
        self.last_change = now;
    }

    // auto-dim: Normal -> Dim -> Off as idle time grows
    fn settle(&mut self, now: Instant) {
        if !self.config.auto_dim {
            return;
        }
        let idle = now.saturating_duration_since(self.last_change);
        self.brightness = match self.brightness {
            Brightness::Normal if idle >= self.config.dim_after => Brightness::Dim,
            Brightness::Dim if idle >= self.config.dim_after + self.config.off_after => {
                Brightness::Off
            }
            level => level,
        };
    }
}

impl<S: StatusSink> Activity for StatusActivity<S> {
    fn setup(&mut self, ctx: &Context) -> bool {
        if !self.sink.open() {
            error!("[{}] error initializing display", ctx.name());
            return false;
        }
        self.frames = 0;
        self.set_level(Brightness::Normal, Instant::now());
        self.shared.publish(self.brightness);
        true
    }

    fn step(&mut self, ctx: &Context) {
        let update = ctx.wait_notify(self.frame_ms());
        if ctx.stop_requested() {
            return;
        }

        let now = Instant::now();
        if let Some(packed) = update {
            self.symbols = Symbols::unpack(packed);
            self.set_level(Brightness::Normal, now);
        }
        if let Some(level) = self.shared.requested.try_take() {
            self.set_level(level, now);
        }
        self.settle(now);

        self.frames = self.frames.wrapping_add(1);
        self.shared.publish(self.brightness);
        self.sink
            .show(&Frame::render(&self.symbols, self.brightness, self.frames));
    }

    fn teardown(&mut self, ctx: &Context) {
        self.sink.show(&Frame::BLANK);
        self.sink.close();
        self.shared.publish(Brightness::Off);
        info!("[{}] display off", ctx.name());
    }
}

/// The status display as a task.
pub struct StatusTask<S: StatusSink> {
    task: Task<StatusActivity<S>>,
    shared: Arc<Shared>,
}

impl<S: StatusSink> StatusTask<S> {
    pub fn new(sink: S) -> Self {
        Self::with_config(sink, StatusConfig::default())
    }

    pub fn with_config(sink: S, config: StatusConfig) -> Self {
        let shared = Arc::new(Shared::new());
        let activity = StatusActivity {
            sink,
            config,
            shared: shared.clone(),
            symbols: Symbols::NONE,
            brightness: Brightness::Off,
            frames: 0,
            last_change: Instant::now(),
        };
        Self {
            task: Task::new(
                TaskConfig::new(STATUS_TASK_NAME, STATUS_STACK_SIZE),
                activity,
            ),
            shared,
        }
    }

    pub fn task(&self) -> &Task<StatusActivity<S>> {
        &self.task
    }

    pub fn start(&self) -> Result<(), StartError> {
        self.task.start()
    }

    pub fn stop(&self) {
        self.task.stop();
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Replace all four slots. False if the task is not running.
    pub fn set_symbols(&self, symbols: Symbols) -> bool {
        self.task.notify(symbols.pack())
    }

    pub fn set_brightness(&self, level: Brightness) {
        self.shared.requested.signal(level);
    }

    pub fn sleep(&self) {
        self.set_brightness(Brightness::Off);
    }

    pub fn wakeup(&self) {
        self.set_brightness(Brightness::Normal);
    }

    /// Brightness of the last frame drawn.
    pub fn brightness(&self) -> Brightness {
        self.shared.shown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::FOREVER;
    use parking_lot::Mutex;
    use std::thread;

    #[derive(Clone, Default)]
    struct Recorder {
        frames: Arc<Mutex<Vec<Frame>>>,
        closed: Arc<Mutex<bool>>,
        refuse_open: bool,
    }

    impl Recorder {
        fn saw(&self, pred: impl Fn(&Frame) -> bool) -> bool {
            self.frames.lock().iter().any(pred)
        }

        fn last(&self) -> Option<Frame> {
            self.frames.lock().last().copied()
        }
    }

    impl StatusSink for Recorder {
        fn open(&mut self) -> bool {
            !self.refuse_open
        }

        fn show(&mut self, frame: &Frame) {
            self.frames.lock().push(*frame);
        }

        fn close(&mut self) {
            *self.closed.lock() = true;
        }
    }

    fn fast() -> StatusConfig {
        StatusConfig {
            frame: Duration::from_millis(5),
            dim_after: Duration::from_secs(60),
            off_after: Duration::from_secs(60),
            auto_dim: true,
        }
    }

    fn eventually(cond: impl Fn() -> bool) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < std::time::Duration::from_secs(5) {
            if cond() {
                return true;
            }
            thread::sleep(std::time::Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn shows_symbols_then_blanks_on_stop() {
        let rec = Recorder::default();
        let status = StatusTask::with_config(rec.clone(), fast());
        status.start().unwrap();
        assert_eq!(status.brightness(), Brightness::Normal);

        let set = Symbols::from_slots(&[Slot::steady(Symbol::Wifi), Slot::steady(Symbol::Cloud)]);
        assert!(status.set_symbols(set));
        assert!(eventually(|| rec.saw(|f| {
            f.symbols == [Some(Symbol::Wifi), Some(Symbol::Cloud), None, None]
        })));

        status.stop();
        assert!(status.task().wait_stopped(FOREVER));
        assert_eq!(rec.last(), Some(Frame::BLANK));
        assert!(*rec.closed.lock());
        assert_eq!(status.brightness(), Brightness::Off);
    }

    #[test]
    fn blinking_slot_alternates() {
        let rec = Recorder::default();
        let status = StatusTask::with_config(rec.clone(), fast());
        status.start().unwrap();
        status.set_symbols(Symbols::from_slots(&[Slot::blinking(Symbol::Progress)]));

        assert!(eventually(|| rec.saw(|f| f.symbols[0] == Some(Symbol::Progress))));
        let lit = rec.frames.lock().len();
        assert!(eventually(|| {
            rec.frames.lock()[lit..].iter().any(|f| f.symbols[0].is_none())
        }));
        status.stop();
    }

    #[test]
    fn sleep_and_wakeup() {
        let rec = Recorder::default();
        let status = StatusTask::with_config(rec.clone(), fast());
        status.start().unwrap();

        status.sleep();
        assert!(eventually(|| status.brightness() == Brightness::Off));
        status.wakeup();
        assert!(eventually(|| status.brightness() == Brightness::Normal));
        status.stop();
    }

    #[test]
    fn auto_dim_steps_down_and_symbols_wake() {
        let rec = Recorder::default();
        let config = StatusConfig {
            dim_after: Duration::from_millis(40),
            off_after: Duration::from_millis(40),
            ..fast()
        };
        let status = StatusTask::with_config(rec.clone(), config);
        status.start().unwrap();

        assert!(eventually(|| rec.saw(|f| f.brightness == Brightness::Dim)));
        assert!(eventually(|| status.brightness() == Brightness::Off));

        status.set_symbols(Symbols::from_slots(&[Slot::steady(Symbol::Ok)]));
        assert!(eventually(|| rec.saw(|f| {
            f.brightness == Brightness::Normal && f.symbols[0] == Some(Symbol::Ok)
        })));
        status.stop();
    }

    #[test]
    fn no_auto_dim_stays_normal() {
        let rec = Recorder::default();
        let config = StatusConfig {
            dim_after: Duration::from_millis(1),
            off_after: Duration::from_millis(1),
            auto_dim: false,
            ..fast()
        };
        let status = StatusTask::with_config(rec.clone(), config);
        status.start().unwrap();
        assert!(eventually(|| rec.frames.lock().len() >= 10));
        assert!(!rec.saw(|f| f.brightness != Brightness::Normal));
        status.stop();
    }

    #[test]
    fn refused_panel_fails_start() {
        let rec = Recorder {
            refuse_open: true,
            ..Recorder::default()
        };
        let status = StatusTask::with_config(rec.clone(), fast());
        assert!(matches!(status.start(), Err(StartError::SetupFailed)));
        assert!(!status.is_running());
        assert!(!status.set_symbols(Symbols::NONE));
        assert!(rec.frames.lock().is_empty());
    }
}
