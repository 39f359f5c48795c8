use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use common::{RunMode, Settings};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Inspect what the container entrypoint would do with the current
/// environment, without handing off to anything.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check required files, settings and (optionally) the schedule syntax
    Check {
        /// Also run the daemon's syntax check on the rendered crontab
        #[arg(long)]
        validate: bool,
        /// Keep the validated crontab at this path (default: a scratch file)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the crontab line the entrypoint would install
    Render,
    /// Show the next scheduled runs
    Next {
        /// Number of runs to show
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
}

#[derive(Debug, Serialize)]
struct FileStatus {
    path: PathBuf,
    present: bool,
}

#[derive(Debug, Serialize)]
struct Validation {
    /// `None` when a scratch file was validated and thrown away.
    artifact: Option<PathBuf>,
    accepted: bool,
    detail: Option<String>,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    mode: RunMode,
    selector: Option<String>,
    schedule: String,
    crontab: String,
    immediate_run: bool,
    handoff: String,
    timezone: String,
    files: Vec<FileStatus>,
    warnings: Vec<String>,
    validation: Option<Validation>,
}

impl CheckReport {
    fn build(settings: &Settings) -> Self {
        let required = settings.required_artifacts();
        let missing = common::missing_artifacts(&required);
        let files = required
            .into_iter()
            .map(|path| FileStatus {
                present: !missing.contains(&path),
                path,
            })
            .collect();

        let mut warnings = settings.warnings();
        if let Err(e) = settings.timezone() {
            warnings.push(format!("{:#}", e));
        }

        Self {
            mode: settings.run_mode(),
            selector: settings.run_mode.clone(),
            schedule: settings.schedule.clone(),
            crontab: settings.schedule_spec().render(),
            immediate_run: settings.immediate_run,
            handoff: settings.handoff.to_string(),
            timezone: settings.timezone.clone(),
            files,
            warnings,
            validation: None,
        }
    }

    /// Problems that would stop the entrypoint. Warnings don't count.
    fn ok(&self) -> bool {
        self.files.iter().all(|f| f.present)
            && self.validation.as_ref().map_or(true, |v| v.accepted)
    }

    fn print_table(&self) {
        let mut table = Table::new();
        table.set_header(vec!["Setting", "Value"]);
        table.add_row(vec!["Run mode".to_string(), self.mode.to_string()]);
        table.add_row(vec![
            "RUN_MODE".to_string(),
            self.selector.clone().unwrap_or_else(|| "(unset)".to_string()),
        ]);
        if self.mode == RunMode::Cron {
            table.add_row(vec!["Schedule".to_string(), self.schedule.clone()]);
            table.add_row(vec!["Crontab".to_string(), self.crontab.clone()]);
            table.add_row(vec!["Immediate run".to_string(), self.immediate_run.to_string()]);
        }
        table.add_row(vec!["Handoff".to_string(), self.handoff.clone()]);
        table.add_row(vec!["Time zone".to_string(), self.timezone.clone()]);
        for file in &self.files {
            let status = if file.present { "present" } else { "MISSING" };
            table.add_row(vec![file.path.display().to_string(), status.to_string()]);
        }
        if let Some(v) = &self.validation {
            let status = if v.accepted { "accepted".to_string() } else { "REJECTED".to_string() };
            let detail = v.detail.as_deref().map(|d| format!(" ({})", d)).unwrap_or_default();
            let label = match &v.artifact {
                Some(path) => format!("Validation {}", path.display()),
                None => "Validation (scratch)".to_string(),
            };
            table.add_row(vec![label, status + &detail]);
        }
        println!("{table}");

        for warning in &self.warnings {
            eprintln!("Warning: {}", warning);
        }
    }
}

fn validate(settings: &Settings, artifact: &Path) -> Result<Validation> {
    std::fs::write(artifact, format!("{}\n", settings.schedule_spec().render()))?;
    log::debug!("Running {} {} {}", settings.cron_binary.display(), common::DAEMON_TEST_FLAG, artifact.display());

    let (accepted, detail) = match Command::new(&settings.cron_binary)
        .arg(common::DAEMON_TEST_FLAG)
        .arg(artifact)
        .output()
    {
        Ok(output) if output.status.success() => (true, None),
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("exited with {}", output.status));
            (false, Some(detail))
        }
        Err(e) => (false, Some(format!("could not run {}: {}", settings.cron_binary.display(), e))),
    };

    Ok(Validation {
        artifact: Some(artifact.to_path_buf()),
        accepted,
        detail,
    })
}

/// Validates into `output` when given, otherwise into a scratch file, so a
/// check never clobbers the crontab a running daemon is using.
fn run_validation(settings: &Settings, output: Option<&Path>) -> Result<Validation> {
    match output {
        Some(path) => validate(settings, path),
        None => {
            let scratch = tempfile::Builder::new().prefix("crontab-").tempfile()?;
            let mut validation = validate(settings, scratch.path())?;
            validation.artifact = None;
            Ok(validation)
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let settings = Settings::load()?;

    match cli.command {
        Commands::Check { validate: run_validator, output, json } => {
            let mut report = CheckReport::build(&settings);
            if run_validator {
                report.validation = Some(run_validation(&settings, output.as_deref())?);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                report.print_table();
            }

            if !report.ok() {
                std::process::exit(1);
            }
        }
        Commands::Render => println!("{}", settings.schedule_spec().render()),
        Commands::Next { count } => {
            let tz = settings.timezone()?;
            let spec = settings.schedule_spec();
            let runs = spec
                .upcoming(tz, count)
                .map_err(|e| anyhow!("{:#}\nThe daemon may still accept this schedule; run `cronguard check --validate`.", e))?;

            let mut table = Table::new();
            table.set_header(vec!["#", "Run at"]);
            for (i, at) in runs.iter().enumerate() {
                table.add_row(vec![(i + 1).to_string(), at.format("%Y-%m-%d %H:%M %Z").to_string()]);
            }
            println!("{}", spec.expression());
            println!("{table}");
        }
    }

    Ok(())
}
