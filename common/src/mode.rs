use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Run the job a single time, in place of the supervisor.
    Once,
    /// Validate the schedule and hand over to the recurring daemon.
    Cron,
    /// Run whatever command line the container was started with.
    PassThrough,
}

impl RunMode {
    pub const ONCE: &'static str = "once";
    pub const CRON: &'static str = "cron";

    /// Maps the raw `RUN_MODE` value to a mode.
    ///
    /// Unset and empty both mean `Cron`. Anything other than the exact
    /// lowercase keywords falls through to `PassThrough`, typos included.
    pub fn from_selector(selector: Option<&str>) -> Self {
        match selector {
            None | Some("") => RunMode::Cron,
            Some(Self::ONCE) => RunMode::Once,
            Some(Self::CRON) => RunMode::Cron,
            Some(_) => RunMode::PassThrough,
        }
    }

    /// Detects selectors that fall through to pass-through but were
    /// probably meant as one of the keywords.
    pub fn near_miss(selector: Option<&str>) -> Option<NearMiss> {
        let raw = selector?;
        if Self::from_selector(Some(raw)) != RunMode::PassThrough {
            return None;
        }

        let folded = raw.trim().to_lowercase();
        [(Self::ONCE, RunMode::Once), (Self::CRON, RunMode::Cron)]
            .into_iter()
            .find(|(keyword, _)| within_one_edit(&folded, keyword))
            .map(|(_, suggestion)| NearMiss {
                selector: raw.to_string(),
                suggestion,
            })
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Once => write!(f, "once"),
            RunMode::Cron => write!(f, "cron"),
            RunMode::PassThrough => write!(f, "pass-through"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NearMiss {
    pub selector: String,
    pub suggestion: RunMode,
}

impl std::fmt::Display for NearMiss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RUN_MODE={:?} is treated as a pass-through command; did you mean {:?}?",
            self.selector,
            self.suggestion.to_string()
        )
    }
}

// Levenshtein distance <= 1, on chars.
fn within_one_edit(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };

    match long.len() - short.len() {
        0 => short.iter().zip(long.iter()).filter(|(x, y)| x != y).count() <= 1,
        1 => {
            let prefix = short
                .iter()
                .zip(long.iter())
                .take_while(|(x, y)| x == y)
                .count();
            short[prefix..] == long[prefix + 1..]
        }
        _ => false,
    }
}
