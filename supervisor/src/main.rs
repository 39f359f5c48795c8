mod crontab;
mod dispatcher;
mod error;
mod gate;
mod handoff;
mod logging;
mod relay;
mod snapshot;

use common::Settings;
use dispatcher::Supervisor;
use error::SupervisorError;
use handoff::SystemHost;
use snapshot::EnvSnapshot;
use std::ffi::OsString;

/// Everything after the program name, untouched. No option parsing here:
/// a leading `--` or `--help` belongs to the pass-through command.
fn pass_through_args<I: IntoIterator<Item = OsString>>(argv: I) -> Vec<OsString> {
    argv.into_iter().skip(1).collect()
}

fn main() {
    let command = pass_through_args(std::env::args_os());

    let settings = match Settings::load().map_err(SupervisorError::from) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("cronguard-init: {}", e);
            std::process::exit(1);
        }
    };

    let log_file = match logging::setup_logging(&settings) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("cronguard-init: failed to set up logging: {:#}", e);
            std::process::exit(1);
        }
    };
    log::info!(
        "Starting cronguard-init {} as pid {}",
        env!("CARGO_PKG_VERSION"),
        nix::unistd::getpid()
    );

    let env = EnvSnapshot::capture();
    if env.is_empty() {
        log::warn!("Started with an empty environment");
    } else {
        log::debug!("Captured {} environment variables", env.len());
    }
    let host = SystemHost::new(env.clone(), settings.handoff);
    let log_path = settings.log_file.clone();
    let mut supervisor = Supervisor::new(settings, env, host);

    if let Err(e) = supervisor.check() {
        log::error!("{}", e);
        std::process::exit(1);
    }

    if let Some(path) = log_path {
        if let Err(e) = log_file.open(&path) {
            log::error!("Cannot open log file {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }

    match supervisor.dispatch(command) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}
