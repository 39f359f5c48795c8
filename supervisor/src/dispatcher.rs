use crate::crontab;
use crate::error::Result;
use crate::gate;
use crate::handoff::{HandoffTarget, ProcessHost};
use crate::snapshot::EnvSnapshot;
use common::{JobCommand, RunMode, Settings};
use std::ffi::OsString;

/// One container start: gate, snapshot, then exactly one of the three
/// run-mode paths. Every path ends in a handoff or an error.
pub struct Supervisor<H: ProcessHost> {
    settings: Settings,
    env: EnvSnapshot,
    host: H,
}

impl<H: ProcessHost> Supervisor<H> {
    pub fn new(settings: Settings, env: EnvSnapshot, host: H) -> Self {
        Self { settings, env, host }
    }

    pub fn run(&mut self, args: Vec<OsString>) -> Result<i32> {
        self.check()?;
        self.dispatch(args)
    }

    /// The config gate. Nothing touches the filesystem before this passes.
    pub fn check(&self) -> Result<()> {
        gate::require_artifacts(&self.settings.required_artifacts())
    }

    /// Everything after the gate. Callers must have run [`Self::check`].
    pub fn dispatch(&mut self, args: Vec<OsString>) -> Result<i32> {
        self.snapshot_environment();

        for warning in self.settings.warnings() {
            log::warn!("{}", warning);
        }

        let mode = self.settings.run_mode();
        log::info!("Run mode: {}", mode);

        match mode {
            RunMode::Once => self.host.handoff(HandoffTarget::Job(self.settings.job_command())),
            RunMode::Cron => self.run_scheduled(),
            RunMode::PassThrough => self.host.handoff(HandoffTarget::Command(args)),
        }
    }

    fn snapshot_environment(&self) {
        let path = &self.settings.env_snapshot_path;
        match self.env.append_to(path) {
            Ok(count) => log::info!("Saved {} environment variables to {}", count, path.display()),
            Err(e) => log::warn!("Could not save environment to {}: {}", path.display(), e),
        }
    }

    fn run_scheduled(&mut self) -> Result<i32> {
        let spec = self.settings.schedule_spec();
        log::info!("Schedule: {}", spec.expression());

        match self.settings.timezone() {
            Ok(tz) => crontab::log_preview(&spec, tz),
            Err(e) => log::warn!("{:#}", e),
        }

        crontab::compile_and_validate(
            &spec,
            &self.settings.cron_binary,
            &self.settings.crontab_path,
            &self.env,
        )?;

        if self.settings.immediate_run {
            self.warm_start(spec.command());
        }

        self.host.handoff(HandoffTarget::Daemon {
            binary: self.settings.cron_binary.clone(),
            flags: self.settings.daemon_flags.clone(),
            artifact: self.settings.crontab_path.clone(),
        })
    }

    // The daemon starts regardless of how this goes.
    fn warm_start(&mut self, job: &JobCommand) {
        log::info!("Running job once before handing over to the schedule");
        match self.host.run_job(job) {
            Ok(status) if status.success() => log::info!("Startup run finished"),
            Ok(status) => log::warn!("Startup run failed ({}); continuing", status),
            Err(e) => log::warn!("Startup run could not start: {}; continuing", e),
        }
    }
}
