use crate::error::{Result, SupervisorError};
use crate::snapshot::EnvSnapshot;
use chrono_tz::Tz;
use common::ScheduleSpec;
use std::fs;
use std::path::Path;
use std::process::Command;

const PREVIEW_RUNS: usize = 3;

/// Writes the crontab line for `spec` to `artifact`, replacing whatever a
/// previous start left there. Returns the rendered content.
pub fn compile(spec: &ScheduleSpec, artifact: &Path) -> Result<String> {
    if spec.expression().contains(|c: char| c == '\n' || c == '\r') {
        return Err(SupervisorError::ScheduleSyntaxInvalid {
            expression: spec.expression().to_string(),
            reason: "schedule must fit on a single line".to_string(),
        });
    }

    let content = format!("{}\n", spec.render());
    fs::write(artifact, &content)?;
    log::debug!("Wrote schedule definition to {}", artifact.display());
    Ok(content)
}

/// Asks the daemon to syntax-check `artifact` without running anything.
///
/// Any failure, including not being able to start the validator at all,
/// rejects the schedule.
pub fn validate(
    spec: &ScheduleSpec,
    validator: &Path,
    artifact: &Path,
    env: &EnvSnapshot,
) -> Result<()> {
    let invalid = |reason: String| SupervisorError::ScheduleSyntaxInvalid {
        expression: spec.expression().to_string(),
        reason,
    };

    let output = Command::new(validator)
        .arg(common::DAEMON_TEST_FLAG)
        .arg(artifact)
        .env_clear()
        .envs(env.vars())
        .output()
        .map_err(|e| invalid(format!("could not run validator {}: {}", validator.display(), e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stdout.lines().chain(stderr.lines()) {
        log::debug!(target: "validator", "{}", line);
    }

    if !output.status.success() {
        let detail = stderr
            .lines()
            .chain(stdout.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("validator exited with {}", output.status));
        return Err(invalid(detail));
    }

    Ok(())
}

/// Renders, writes and validates the schedule definition. The content is
/// only logged once the validator has accepted it.
pub fn compile_and_validate(
    spec: &ScheduleSpec,
    validator: &Path,
    artifact: &Path,
    env: &EnvSnapshot,
) -> Result<String> {
    let content = compile(spec, artifact)?;
    validate(spec, validator, artifact, env)?;
    log::info!("Schedule definition ({}): {}", artifact.display(), content.trim_end());
    Ok(content)
}

/// Logs the next few fire times. The local parser is stricter than the
/// daemon in places, so failures here are only worth a warning.
pub fn log_preview(spec: &ScheduleSpec, tz: Tz) {
    match spec.upcoming(tz, PREVIEW_RUNS) {
        Ok(times) => {
            let times: Vec<String> = times
                .iter()
                .map(|t| t.format("%Y-%m-%d %H:%M %Z").to_string())
                .collect();
            log::info!("Next runs: {}", times.join(", "));
        }
        Err(e) => log::warn!("Cannot preview schedule: {:#}", e),
    }
}
