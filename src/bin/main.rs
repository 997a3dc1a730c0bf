// rtask-status: host bring-up for the status display
//
// Boot sequence: logger -> status task -> symbol program loop.
// The sink logs what a panel would show instead of driving one.
// Program: WiFi blinking 8s, WiFi + Cloud blinking 8s, WiFi + Cloud 12s.

use std::process;
use std::thread;
use std::time::Duration;

use log::{LevelFilter, Log, Metadata, Record, debug, error, info};

use rtask::status::{Frame, Slot, StatusSink, StatusTask, Symbol, Symbols};

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let current = thread::current();
            eprintln!(
                "{:<5} ({}) {}",
                record.level(),
                current.name().unwrap_or("-"),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

// level from RUST_LOG ("info", "debug", ...), info if unset
fn init_logger_from_env() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

#[derive(Default)]
struct LogPanel {
    last: Option<Frame>,
}

impl StatusSink for LogPanel {
    fn show(&mut self, frame: &Frame) {
        if self.last.as_ref() == Some(frame) {
            return;
        }
        if self.last.map(|f| f.brightness) != Some(frame.brightness) {
            info!("[panel] brightness {}", frame.brightness);
        }
        if frame.is_blank() {
            debug!("[panel] blank");
        } else {
            debug!("[panel] {:?}", frame.symbols);
        }
        self.last = Some(*frame);
    }

    fn close(&mut self) {
        info!("[panel] closed");
    }
}

fn halt(msg: &str) -> ! {
    error!("{}", msg);
    process::exit(1);
}

fn show_for(status: &StatusTask<LogPanel>, slots: &[Slot], secs: u64) {
    let symbols = Symbols::from_slots(slots);
    info!("status: {}", symbols);
    if !status.set_symbols(symbols) {
        halt("status task is not running!");
    }
    thread::sleep(Duration::from_secs(secs));
}

fn main() {
    init_logger_from_env();
    info!("booting...");

    let status = StatusTask::new(LogPanel::default());
    if let Err(e) = status.start() {
        halt(&format!("error creating status task: {}", e));
    }
    info!("status task ready: {}", status.task().config());

    loop {
        show_for(&status, &[Slot::blinking(Symbol::Wifi)], 8);
        show_for(
            &status,
            &[Slot::steady(Symbol::Wifi), Slot::blinking(Symbol::Cloud)],
            8,
        );
        show_for(
            &status,
            &[Slot::steady(Symbol::Wifi), Slot::steady(Symbol::Cloud)],
            12,
        );
    }
}
