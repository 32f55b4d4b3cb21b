//! Log sink setup.
//!
//! Library code logs through the `log` facade. [`init`] installs a backend:
//! the browser console on wasm, `env_logger` elsewhere (`RUST_LOG`).

pub const LOG_PREFIX: &str = "[Ethers Client Library]";

/// Message as written to the console.
pub fn format_message(level: log::Level, message: &str) -> String {
    format!("{LOG_PREFIX} [{level}] {message}")
}

#[cfg(target_arch = "wasm32")]
mod console {
    use log::{Level, Log, Metadata, Record};
    use web_sys::console;

    use super::format_message;

    pub struct ConsoleLogger {
        pub debug_enabled: bool,
    }

    impl Log for ConsoleLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            self.debug_enabled || metadata.level() <= Level::Info
        }

        fn log(&self, record: &Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            let line = format_message(record.level(), &record.args().to_string());
            match record.level() {
                Level::Error => console::error_1(&line.into()),
                Level::Warn => console::warn_1(&line.into()),
                Level::Info => console::info_1(&line.into()),
                Level::Debug | Level::Trace => console::debug_1(&line.into()),
            }
        }

        fn flush(&self) {}
    }

    pub static LOGGER: ConsoleLogger = ConsoleLogger { debug_enabled: true };
}

#[cfg(target_arch = "wasm32")]
pub use console::ConsoleLogger;

/// Install the console logger. Calling it again is a no-op.
#[cfg(target_arch = "wasm32")]
pub fn init() {
    if log::set_logger(&console::LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Debug);
    }
}

/// Install `env_logger`. Calling it again is a no-op.
#[cfg(not(target_arch = "wasm32"))]
pub fn init() {
    use std::io::Write;

    let _ = env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(buf, "{}", format_message(record.level(), &record.args().to_string()))
        })
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message() {
        assert_eq!(
            format_message(log::Level::Info, "Connected Default Provider: network=homestead"),
            "[Ethers Client Library] [INFO] Connected Default Provider: network=homestead"
        );
    }

    #[test]
    fn test_init_twice() {
        init();
        init();
    }
}
