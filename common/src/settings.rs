use crate::mode::RunMode;
use crate::schedule::{JobCommand, ScheduleSpec};
use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How the supervisor gives up control to the next stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffStrategy {
    /// Replace the process image; the target inherits our PID.
    #[default]
    Exec,
    /// Stay resident as PID 1, forward signals and reap children.
    Relay,
}

impl FromStr for HandoffStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "exec" => Ok(HandoffStrategy::Exec),
            "relay" => Ok(HandoffStrategy::Relay),
            other => Err(anyhow!("Unknown handoff strategy {:?}. Use exec or relay", other)),
        }
    }
}

impl std::fmt::Display for HandoffStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandoffStrategy::Exec => write!(f, "exec"),
            HandoffStrategy::Relay => write!(f, "relay"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Raw mode selector, kept as given so typos can be reported.
    #[serde(default)]
    pub run_mode: Option<String>,
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default)]
    pub immediate_run: bool,
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_config_file")]
    pub config_file: PathBuf,
    #[serde(default = "default_frequency_words_file")]
    pub frequency_words_file: PathBuf,

    #[serde(default = "default_cron_binary")]
    pub cron_binary: PathBuf,
    #[serde(default = "default_daemon_flags")]
    pub daemon_flags: Vec<String>,
    #[serde(default = "default_crontab_path")]
    pub crontab_path: PathBuf,
    #[serde(default = "default_env_snapshot_path")]
    pub env_snapshot_path: PathBuf,

    #[serde(default = "default_job_workdir")]
    pub job_workdir: PathBuf,
    #[serde(default = "default_job_program")]
    pub job_program: String,
    #[serde(default = "default_job_args")]
    pub job_args: Vec<String>,

    #[serde(default)]
    pub handoff: HandoffStrategy,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub log_file: Option<PathBuf>,

    #[serde(skip)]
    immediate_run_raw: Option<String>,
}

fn default_schedule() -> String { crate::DEFAULT_SCHEDULE.to_string() }
fn default_timezone() -> String { crate::DEFAULT_TIMEZONE.to_string() }
fn default_config_file() -> PathBuf { PathBuf::from(crate::DEFAULT_CONFIG_FILE) }
fn default_frequency_words_file() -> PathBuf { PathBuf::from(crate::DEFAULT_FREQUENCY_WORDS_FILE) }
fn default_cron_binary() -> PathBuf { PathBuf::from(crate::DEFAULT_CRON_BINARY) }
fn default_daemon_flags() -> Vec<String> { vec![crate::DAEMON_PASSTHROUGH_FLAG.to_string()] }
fn default_crontab_path() -> PathBuf { PathBuf::from(crate::DEFAULT_CRONTAB_PATH) }
fn default_env_snapshot_path() -> PathBuf { PathBuf::from(crate::DEFAULT_ENV_SNAPSHOT_PATH) }
fn default_job_workdir() -> PathBuf { PathBuf::from(crate::DEFAULT_JOB_WORKDIR) }
fn default_job_program() -> String { crate::DEFAULT_JOB_PROGRAM.to_string() }
fn default_job_args() -> Vec<String> { split_words(crate::DEFAULT_JOB_ARGS) }
fn default_log_level() -> String { "info".to_string() }

fn split_words(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            run_mode: None,
            schedule: default_schedule(),
            immediate_run: false,
            timezone: default_timezone(),
            config_file: default_config_file(),
            frequency_words_file: default_frequency_words_file(),
            cron_binary: default_cron_binary(),
            daemon_flags: default_daemon_flags(),
            crontab_path: default_crontab_path(),
            env_snapshot_path: default_env_snapshot_path(),
            job_workdir: default_job_workdir(),
            job_program: default_job_program(),
            job_args: default_job_args(),
            handoff: HandoffStrategy::default(),
            log_level: default_log_level(),
            log_file: None,
            immediate_run_raw: None,
        }
    }
}

impl Settings {
    /// Resolve settings from the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Defaults, then the optional `SUPERVISOR_CONFIG` file, then the
    /// environment. Empty variables count as unset.
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut settings = match lookup("SUPERVISOR_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        settings.apply_env(lookup)?;
        Ok(settings)
    }

    /// Load settings from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path))?;
        Ok(settings)
    }

    /// Load settings from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path))?;
        Ok(settings)
    }

    /// Detect file type by extension and load
    pub fn from_file(path: &Path) -> Result<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "toml" => Self::from_toml_file(path),
            _ => bail!("Unsupported settings file format {:?}. Use .yaml, .yml, or .toml", path),
        }
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("RUN_MODE") {
            self.run_mode = Some(mode);
        }
        if let Some(schedule) = lookup("CRON_SCHEDULE") {
            self.schedule = schedule;
        }
        if let Some(flag) = lookup("IMMEDIATE_RUN") {
            self.immediate_run = flag == "true";
            self.immediate_run_raw = Some(flag);
        }
        if let Some(tz) = lookup("TZ") {
            self.timezone = tz;
        }

        if let Some(path) = lookup("CONFIG_PATH") {
            self.config_file = PathBuf::from(path);
        }
        if let Some(path) = lookup("FREQUENCY_WORDS_PATH") {
            self.frequency_words_file = PathBuf::from(path);
        }

        if let Some(path) = lookup("CRON_BINARY") {
            self.cron_binary = PathBuf::from(path);
        }
        if let Some(path) = lookup("CRONTAB_PATH") {
            self.crontab_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("ENV_SNAPSHOT_PATH") {
            self.env_snapshot_path = PathBuf::from(path);
        }

        if let Some(dir) = lookup("JOB_WORKDIR") {
            self.job_workdir = PathBuf::from(dir);
        }
        if let Some(program) = lookup("JOB_PROGRAM") {
            self.job_program = program;
        }
        if let Some(args) = lookup("JOB_ARGS") {
            self.job_args = split_words(&args);
        }

        if let Some(strategy) = lookup("SUPERVISOR_HANDOFF") {
            self.handoff = strategy.parse().context("Invalid SUPERVISOR_HANDOFF")?;
        }
        if let Some(level) = lookup("SUPERVISOR_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(path) = lookup("SUPERVISOR_LOG") {
            self.log_file = Some(PathBuf::from(path));
        }

        Ok(())
    }

    pub fn run_mode(&self) -> RunMode {
        RunMode::from_selector(self.run_mode.as_deref())
    }

    pub fn job_command(&self) -> JobCommand {
        JobCommand {
            workdir: self.job_workdir.clone(),
            program: self.job_program.clone(),
            args: self.job_args.clone(),
        }
    }

    pub fn schedule_spec(&self) -> ScheduleSpec {
        ScheduleSpec::new(self.schedule.clone(), self.job_command())
    }

    pub fn required_artifacts(&self) -> Vec<PathBuf> {
        vec![self.config_file.clone(), self.frequency_words_file.clone()]
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Unknown time zone {:?}: {}", self.timezone, e))
    }

    /// Settings that are accepted but probably not what the operator meant.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(miss) = RunMode::near_miss(self.run_mode.as_deref()) {
            warnings.push(miss.to_string());
        }

        if let Some(raw) = &self.immediate_run_raw {
            let folded = raw.trim().to_lowercase();
            if raw != "true" && matches!(folded.as_str(), "true" | "1" | "yes" | "on") {
                warnings.push(format!(
                    "IMMEDIATE_RUN={:?} is not \"true\"; the startup run is skipped",
                    raw
                ));
            }
        }

        if self.run_mode() != RunMode::Cron && self.immediate_run {
            warnings.push(format!(
                "IMMEDIATE_RUN only applies to cron mode (current mode: {})",
                self.run_mode()
            ));
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn load(pairs: &[(&str, &str)]) -> Result<Settings> {
        let vars = env(pairs);
        Settings::load_with(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = load(&[]).unwrap();
        assert_eq!(settings.run_mode(), RunMode::Cron);
        assert_eq!(settings.schedule, "*/30 * * * *");
        assert!(!settings.immediate_run);
        assert_eq!(settings.handoff, HandoffStrategy::Exec);
        assert_eq!(settings.daemon_flags, vec!["-passthrough-logs".to_string()]);
        assert_eq!(
            settings.required_artifacts(),
            vec![
                PathBuf::from("/app/config/config.yaml"),
                PathBuf::from("/app/config/frequency_words.txt"),
            ]
        );
        assert_eq!(
            settings.schedule_spec().render(),
            "*/30 * * * * cd /app && /usr/local/bin/python main.py"
        );
        assert!(settings.warnings().is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let settings = load(&[
            ("RUN_MODE", "once"),
            ("CRON_SCHEDULE", "0 */2 * * *"),
            ("CONFIG_PATH", "/data/config.yaml"),
            ("JOB_ARGS", "main.py --verbose"),
            ("SUPERVISOR_HANDOFF", "Relay"),
        ])
        .unwrap();

        assert_eq!(settings.run_mode(), RunMode::Once);
        assert_eq!(settings.schedule, "0 */2 * * *");
        assert_eq!(settings.config_file, PathBuf::from("/data/config.yaml"));
        assert_eq!(settings.job_args, vec!["main.py", "--verbose"]);
        assert_eq!(settings.handoff, HandoffStrategy::Relay);
    }

    #[test]
    fn test_empty_values_count_as_unset() {
        let settings = load(&[("RUN_MODE", ""), ("CRON_SCHEDULE", "  "), ("IMMEDIATE_RUN", "")]).unwrap();
        assert_eq!(settings.run_mode(), RunMode::Cron);
        assert_eq!(settings.schedule, "*/30 * * * *");
        assert!(!settings.immediate_run);
    }

    #[test]
    fn test_immediate_run_needs_exact_true() {
        assert!(load(&[("IMMEDIATE_RUN", "true")]).unwrap().immediate_run);

        for raw in ["TRUE", "True", "1", "yes", "false", "no"] {
            assert!(!load(&[("IMMEDIATE_RUN", raw)]).unwrap().immediate_run, "{}", raw);
        }
    }

    #[test]
    fn test_warnings() {
        let settings = load(&[("RUN_MODE", "Cron"), ("IMMEDIATE_RUN", "1")]).unwrap();
        let warnings = settings.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("did you mean \"cron\""));
        assert!(warnings[1].contains("IMMEDIATE_RUN=\"1\""));

        let settings = load(&[("RUN_MODE", "once"), ("IMMEDIATE_RUN", "true")]).unwrap();
        assert_eq!(settings.warnings().len(), 1);
        assert!(settings.warnings()[0].contains("only applies to cron mode"));

        assert!(load(&[("IMMEDIATE_RUN", "false")]).unwrap().warnings().is_empty());
    }

    #[test]
    fn test_bad_handoff_strategy() {
        assert!(load(&[("SUPERVISOR_HANDOFF", "fork")]).is_err());
    }

    #[test]
    fn test_timezone() {
        assert_eq!(load(&[]).unwrap().timezone().unwrap(), chrono_tz::UTC);
        assert!(load(&[("TZ", "Asia/Shanghai")]).unwrap().timezone().is_ok());
        assert!(load(&[("TZ", "Mars/Olympus")]).unwrap().timezone().is_err());
    }

    #[test]
    fn test_yaml_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisor.yaml");
        fs::write(
            &path,
            "run_mode: once\nschedule: \"0 6 * * *\"\nimmediate_run: true\njob_args: [\"run.py\"]\n",
        )
        .unwrap();
        let path_str = path.to_str().unwrap();

        let settings = load(&[("SUPERVISOR_CONFIG", path_str)]).unwrap();
        assert_eq!(settings.run_mode(), RunMode::Once);
        assert_eq!(settings.schedule, "0 6 * * *");
        assert!(settings.immediate_run);
        assert_eq!(settings.job_args, vec!["run.py"]);
        assert_eq!(settings.job_program, "/usr/local/bin/python");

        let settings = load(&[("SUPERVISOR_CONFIG", path_str), ("RUN_MODE", "cron")]).unwrap();
        assert_eq!(settings.run_mode(), RunMode::Cron);
        assert_eq!(settings.schedule, "0 6 * * *");
    }

    #[test]
    fn test_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisor.toml");
        fs::write(&path, "schedule = \"15 * * * *\"\nhandoff = \"relay\"\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.schedule, "15 * * * *");
        assert_eq!(settings.handoff, HandoffStrategy::Relay);
        assert_eq!(settings.crontab_path, PathBuf::from("/tmp/crontab"));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisor.ini");
        fs::write(&path, "").unwrap();
        assert!(Settings::from_file(&path).is_err());
    }
}
