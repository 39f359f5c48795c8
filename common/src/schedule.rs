use anyhow::{anyhow, bail, Result};
use chrono::DateTime;
use chrono_tz::Tz;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// How the job is started: from `workdir`, run `program` with `args`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCommand {
    pub workdir: PathBuf,
    pub program: String,
    pub args: Vec<String>,
}

impl JobCommand {
    /// Shell form used inside the crontab line.
    pub fn shell_line(&self) -> String {
        let mut words = vec![shell_quote(&self.program)];
        words.extend(self.args.iter().map(|a| shell_quote(a)));
        format!(
            "cd {} && {}",
            shell_quote(&self.workdir.to_string_lossy()),
            words.join(" ")
        )
    }
}

/// A schedule expression together with the command it fires.
///
/// The expression is kept as written; the external validator is the
/// authority on whether it is acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleSpec {
    expression: String,
    command: JobCommand,
}

impl ScheduleSpec {
    pub fn new(expression: impl Into<String>, command: JobCommand) -> Self {
        Self {
            expression: expression.into().trim().to_string(),
            command,
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn command(&self) -> &JobCommand {
        &self.command
    }

    /// Renders the single crontab line, `<expression> <shell-command>`.
    pub fn render(&self) -> String {
        format!("{} {}", self.expression, self.command.shell_line())
    }

    /// Next `count` fire times in `tz`, computed locally.
    ///
    /// Used for previews only. Fails on anything that is not a plain
    /// five-field expression or an `@` macro, and on numeric day-of-week
    /// values, which the local parser numbers differently (1 = Sunday).
    pub fn upcoming(&self, tz: Tz, count: usize) -> Result<Vec<DateTime<Tz>>> {
        let schedule = self.local_schedule()?;
        Ok(schedule.upcoming(tz).take(count).collect())
    }

    fn local_schedule(&self) -> Result<Schedule> {
        let expr = self.expression.as_str();
        if expr.starts_with('@') {
            return Schedule::from_str(expr)
                .map_err(|e| anyhow!("unsupported schedule macro {:?}: {}", expr, e));
        }

        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            bail!(
                "schedule {:?} has {} fields, expected 5 (minute hour day-of-month month day-of-week)",
                expr,
                fields.len()
            );
        }
        if fields[4].chars().any(|c| c.is_ascii_digit()) {
            bail!("numeric day-of-week {:?} cannot be previewed", fields[4]);
        }

        // The local parser wants a leading seconds field.
        Schedule::from_str(&format!("0 {}", fields.join(" ")))
            .map_err(|e| anyhow!("invalid schedule {:?}: {}", expr, e))
    }
}

/// Quotes a word for POSIX sh, leaving plain words untouched.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn job() -> JobCommand {
        JobCommand {
            workdir: PathBuf::from("/app"),
            program: "/usr/local/bin/python".to_string(),
            args: vec!["main.py".to_string()],
        }
    }

    #[test]
    fn test_render_default_line() {
        let spec = ScheduleSpec::new("*/30 * * * *", job());
        assert_eq!(spec.render(), "*/30 * * * * cd /app && /usr/local/bin/python main.py");
    }

    #[test]
    fn test_expression_is_trimmed() {
        let spec = ScheduleSpec::new("  0 9 * * *\n", job());
        assert_eq!(spec.expression(), "0 9 * * *");
        assert!(!spec.render().contains('\n'));
    }

    #[test]
    fn test_render_quotes_awkward_words() {
        let cmd = JobCommand {
            workdir: PathBuf::from("/srv/my app"),
            program: "python".to_string(),
            args: vec!["main.py".to_string(), "--tag".to_string(), "it's".to_string()],
        };
        let spec = ScheduleSpec::new("0 * * * *", cmd);
        assert_eq!(
            spec.render(),
            r"0 * * * * cd '/srv/my app' && python main.py --tag 'it'\''s'"
        );
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("main.py"), "main.py");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn test_upcoming_every_thirty_minutes() {
        let spec = ScheduleSpec::new("*/30 * * * *", job());
        let times = spec.upcoming(chrono_tz::UTC, 3).unwrap();
        assert_eq!(times.len(), 3);
        for t in &times {
            assert!(t.minute() == 0 || t.minute() == 30);
            assert_eq!(t.second(), 0);
        }
        assert_eq!((times[1] - times[0]).num_minutes(), 30);
        assert_eq!((times[2] - times[1]).num_minutes(), 30);
    }

    #[test]
    fn test_upcoming_respects_timezone() {
        let spec = ScheduleSpec::new("0 9 * * *", job());
        let tz: Tz = "Asia/Shanghai".parse().unwrap();
        let times = spec.upcoming(tz, 2).unwrap();
        assert!(times.iter().all(|t| t.hour() == 9 && t.minute() == 0));
    }

    #[test]
    fn test_upcoming_rejects_bad_expressions() {
        assert!(ScheduleSpec::new("not-a-cron-string", job()).upcoming(chrono_tz::UTC, 1).is_err());
        assert!(ScheduleSpec::new("* * * *", job()).upcoming(chrono_tz::UTC, 1).is_err());
        assert!(ScheduleSpec::new("61 * * * *", job()).upcoming(chrono_tz::UTC, 1).is_err());
        assert!(ScheduleSpec::new("0 0 * * 1", job()).upcoming(chrono_tz::UTC, 1).is_err());
    }

    #[test]
    fn test_upcoming_accepts_named_weekdays() {
        let spec = ScheduleSpec::new("0 8 * * Mon-Fri", job());
        assert_eq!(spec.upcoming(chrono_tz::UTC, 5).unwrap().len(), 5);
    }
}
