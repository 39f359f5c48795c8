//! Logging setup with `log` + `fern`.
//!
//! Records always go to stderr; stdout belongs to the job and the daemon.
//! The optional `SUPERVISOR_LOG` file is a separate sink that stays closed
//! until [`LogFileSink::open`] is called, so a start that fails the config
//! gate leaves nothing behind on disk.

use common::Settings;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A log file that may not be open yet. Records written before it is
/// opened are dropped.
#[derive(Clone, Default)]
pub struct LogFileSink {
    file: Arc<Mutex<Option<File>>>,
}

impl LogFileSink {
    pub fn open(&self, path: &Path) -> io::Result<()> {
        let file = fern::log_file(path)?;
        *self.file.lock().unwrap_or_else(|e| e.into_inner()) = Some(file);
        Ok(())
    }
}

impl Write for LogFileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.lock().unwrap_or_else(|e| e.into_inner()).as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.lock().unwrap_or_else(|e| e.into_inner()).as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Installs the global logger. The returned sink is wired in but closed.
pub fn setup_logging(settings: &Settings) -> anyhow::Result<LogFileSink> {
    let level: log::LevelFilter = settings
        .log_level
        .parse()
        .map_err(|_| anyhow::anyhow!("Unknown log level {:?}", settings.log_level))?;

    let sink = LogFileSink::default();
    let file_output: Box<dyn Write + Send> = Box::new(sink.clone());

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .chain(file_output)
        .apply()?;

    Ok(sink)
}
