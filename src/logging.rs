use simplelog::*;
use std::fs::{self, File, OpenOptions};
use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static INIT: Once = Once::new();
static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// `$HOME/.local/share/netmidirec/logs`
pub fn log_dir() -> Result<PathBuf, Error> {
    let home = std::env::var("HOME")
        .map_err(|_| Error::new(ErrorKind::NotFound, "HOME environment variable not set"))?;

    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join(env!("CARGO_PKG_NAME"))
        .join("logs"))
}

fn open_log_file() -> Result<File, Error> {
    let log_dir = log_dir()?;
    fs::create_dir_all(&log_dir)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(concat!(env!("CARGO_PKG_NAME"), ".log")))
}

/// Logs to the terminal, and with debug detail to the log file when it can be opened.
pub fn init_logger(verbose: bool) -> Result<(), Error> {
    let terminal_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    INIT.call_once(|| {
        let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
            terminal_level,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        )];

        let file_error = match open_log_file() {
            Ok(file) => {
                loggers.push(WriteLogger::new(LevelFilter::Debug, Config::default(), file));
                None
            }
            Err(e) => Some(e),
        };

        if CombinedLogger::init(loggers).is_ok() {
            LOGGER_INITIALIZED.store(true, Ordering::SeqCst);
            if let Some(e) = file_error {
                log::warn!("Logging to the terminal only: {}", e);
            }
        }
    });

    if LOGGER_INITIALIZED.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Other, "Logger initialization failed"))
    }
}
