pub mod gate;
pub mod mode;
pub mod schedule;
pub mod settings;

pub use gate::missing_artifacts;
pub use mode::{NearMiss, RunMode};
pub use schedule::{shell_quote, JobCommand, ScheduleSpec};
pub use settings::{HandoffStrategy, Settings};

// Container paths (the job image installs everything under /app)
pub const DEFAULT_CONFIG_FILE: &str = "/app/config/config.yaml";
pub const DEFAULT_FREQUENCY_WORDS_FILE: &str = "/app/config/frequency_words.txt";
pub const DEFAULT_CRONTAB_PATH: &str = "/tmp/crontab";
pub const DEFAULT_ENV_SNAPSHOT_PATH: &str = "/etc/environment";
pub const DEFAULT_CRON_BINARY: &str = "/usr/local/bin/supercronic";
pub const DEFAULT_JOB_WORKDIR: &str = "/app";
pub const DEFAULT_JOB_PROGRAM: &str = "/usr/local/bin/python";
pub const DEFAULT_JOB_ARGS: &str = "main.py";

pub const DEFAULT_SCHEDULE: &str = "*/30 * * * *";
pub const DEFAULT_TIMEZONE: &str = "UTC";

// Flags understood by the recurring-job daemon
pub const DAEMON_TEST_FLAG: &str = "-test";
pub const DAEMON_PASSTHROUGH_FLAG: &str = "-passthrough-logs";
