/*
 * logger.rs - `log` backend on the serial console
 *
 * The console is moved into a global once it is initialized; from then on
 * log records and the serial_print!/serial_println! macros share it.
 *
 * Line format:  LEVEL [target] message   (level in ANSI color)
 */

use core::fmt::{self, Write};

use log::{Level, Metadata, Record, SetLoggerError};

use crate::config::LOG_LEVEL;
use crate::drivers::Console;
use crate::drivers::mmio::Mmio;
use crate::utils::locked::Locked;

static CONSOLE: Locked<Option<Console<Mmio>>> = Locked::new(None);
static LOGGER: SerialLogger = SerialLogger;

/*
 * Installs the serial logger
 *
 * `console` must already be initialized. Fails only if a logger was
 * installed before.
 */
pub fn init(console: Console<Mmio>) -> Result<(), SetLoggerError> {
    *CONSOLE.lock() = Some(console);
    log::set_logger(&LOGGER)?;
    log::set_max_level(LOG_LEVEL);
    Ok(())
}

pub struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= LOG_LEVEL
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(console) = CONSOLE.lock().as_mut() {
            let _ = write_record(console, record);
        }
    }

    fn flush(&self) {}
}

fn level_color(level: Level) -> &'static str {
    match level {
        Level::Error => "\x1b[1;31m",
        Level::Warn => "\x1b[1;33m",
        Level::Info => "\x1b[1;94m",
        Level::Debug => "\x1b[1;30m",
        Level::Trace => "\x1b[1;90m",
    }
}

fn write_record(out: &mut impl Write, record: &Record) -> fmt::Result {
    writeln!(
        out,
        "{}{:5}\x1b[0m [{}] {}",
        level_color(record.level()),
        record.level(),
        record.target(),
        record.args()
    )
}

#[doc(hidden)]
pub fn internal_print(args: fmt::Arguments) {
    if let Some(console) = CONSOLE.lock().as_mut() {
        let _ = console.write_fmt(args);
    }
}

/*
 * Panic-safe print
 *
 * If the panic happened while the console lock was held, the message is
 * dropped rather than spinning forever on our own lock.
 */
pub fn panic_print(args: fmt::Arguments) {
    if let Some(mut guard) = CONSOLE.try_lock() {
        if let Some(console) = guard.as_mut() {
            let _ = console.write_fmt(args);
        }
    }
}

/// Prints to the serial console.
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => ($crate::logger::internal_print(format_args!($($arg)*)));
}

/// Prints to the serial console, appending a newline.
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(
        concat!($fmt, "\n"), $($arg)*));
}
