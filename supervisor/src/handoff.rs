use crate::error::{Result, SupervisorError};
use crate::relay;
use crate::snapshot::EnvSnapshot;
use common::{HandoffStrategy, JobCommand};
use std::ffi::OsString;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

/// What the supervisor turns into once it is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffTarget {
    /// The job itself, run a single time.
    Job(JobCommand),
    /// The recurring-job daemon, reading a validated crontab.
    Daemon {
        binary: PathBuf,
        flags: Vec<String>,
        artifact: PathBuf,
    },
    /// The container's own command line, verbatim.
    Command(Vec<OsString>),
}

impl HandoffTarget {
    pub fn program(&self) -> String {
        match self {
            HandoffTarget::Job(job) => job.program.clone(),
            HandoffTarget::Daemon { binary, .. } => binary.display().to_string(),
            HandoffTarget::Command(argv) => argv
                .first()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|| "<empty command>".to_string()),
        }
    }

    /// Builds the command with exactly the snapshotted environment.
    pub fn command(&self, env: &EnvSnapshot) -> io::Result<Command> {
        let mut cmd = match self {
            HandoffTarget::Job(job) => job_command(job),
            HandoffTarget::Daemon { binary, flags, artifact } => {
                let mut cmd = Command::new(binary);
                cmd.args(flags).arg(artifact);
                cmd
            }
            HandoffTarget::Command(argv) => {
                let (program, args) = argv.split_first().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "no command supplied")
                })?;
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        };
        cmd.env_clear().envs(env.vars());
        Ok(cmd)
    }
}

fn job_command(job: &JobCommand) -> Command {
    let mut cmd = Command::new(&job.program);
    cmd.args(&job.args).current_dir(&job.workdir);
    cmd
}

/// Everything the dispatcher needs from the operating system.
pub trait ProcessHost {
    /// Run the job to completion in the foreground.
    fn run_job(&mut self, job: &JobCommand) -> io::Result<ExitStatus>;

    /// Give up control to `target`. Returns the exit code the supervisor
    /// should leave with; with image replacement it only returns on error.
    fn handoff(&mut self, target: HandoffTarget) -> Result<i32>;
}

pub struct SystemHost {
    env: EnvSnapshot,
    strategy: HandoffStrategy,
}

impl SystemHost {
    pub fn new(env: EnvSnapshot, strategy: HandoffStrategy) -> Self {
        Self { env, strategy }
    }
}

impl ProcessHost for SystemHost {
    fn run_job(&mut self, job: &JobCommand) -> io::Result<ExitStatus> {
        let mut cmd = job_command(job);
        cmd.env_clear().envs(self.env.vars());
        cmd.status()
    }

    fn handoff(&mut self, target: HandoffTarget) -> Result<i32> {
        let program = target.program();
        let failure = |source: io::Error| SupervisorError::HandoffFailure {
            target: program.clone(),
            source,
        };

        let cmd = target.command(&self.env).map_err(failure)?;
        log::info!("Handing off to {} ({})", program, self.strategy);

        match self.strategy {
            HandoffStrategy::Exec => {
                let mut cmd = cmd;
                // exec() only returns if there's an error
                let err = cmd.exec();
                Err(failure(err))
            }
            HandoffStrategy::Relay => relay::run(cmd).map_err(failure),
        }
    }
}
