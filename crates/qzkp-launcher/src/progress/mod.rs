//! Percentage extraction from simulation output lines.
//!
//! The simulations print free-text lines such as `Iteration 12/200 ... 6.00%`.
//! The first decimal number immediately followed by a percent sign is taken as
//! the current progress. No match is not an error: most lines carry no
//! progress at all.

use crate::model::MAX_REGEX_PATTERN_LEN;
use crate::runner::{RunnerError, RunnerResult};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Digits, a decimal point, digits, then `%`.
pub const DEFAULT_PROGRESS_PATTERN: &str = r"([0-9]+\.[0-9]+)%";

fn default_regex() -> Option<&'static Regex> {
    static DEFAULT: OnceLock<Option<Regex>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| Regex::new(DEFAULT_PROGRESS_PATTERN).ok())
        .as_ref()
}

/// Extract a progress percentage with the default pattern.
#[must_use]
pub fn try_parse(line: &str) -> Option<f64> {
    ProgressExtractor::default().try_parse(line)
}

/// Progress reported by the child, clamped to `[0, 100]`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProgressEvent {
    percent: f64,
    text: String,
}

impl ProgressEvent {
    #[must_use]
    pub fn new(percent: f64) -> Self {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        Self {
            percent,
            text: format!("{percent:.1}%"),
        }
    }

    fn with_text(percent: f64, matched: &str) -> Self {
        let mut event = Self::new(percent);
        event.text = format!("{matched}%");
        event
    }

    #[must_use]
    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// Label as printed by the child, e.g. `"37.50%"`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.text
    }

    /// Whole percent for gauges.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn whole_percent(&self) -> u16 {
        // Clamped to [0, 100] on construction.
        self.percent.floor() as u16
    }
}

/// Pattern-based progress matcher.
///
/// Cheap to clone; the default instance shares one compiled pattern.
#[derive(Clone, Debug, Default)]
pub struct ProgressExtractor {
    custom: Option<Regex>,
}

impl ProgressExtractor {
    /// Build an extractor from a custom pattern.
    ///
    /// # Errors
    /// Returns `E_CONFIG` if the pattern is too long, does not compile, or
    /// does not have exactly one capture group.
    pub fn new(pattern: &str) -> RunnerResult<Self> {
        if pattern.len() > MAX_REGEX_PATTERN_LEN {
            return Err(RunnerError::config(
                "progress pattern is too long",
                serde_json::json!({ "max_len": MAX_REGEX_PATTERN_LEN }),
            ));
        }
        let regex = Regex::new(pattern).map_err(|err| {
            RunnerError::config(
                "progress pattern is not a valid regex",
                serde_json::json!({ "pattern": pattern, "source": err.to_string() }),
            )
        })?;
        // captures_len counts the implicit whole-match group.
        if regex.captures_len() != 2 {
            return Err(RunnerError::config(
                "progress pattern must have exactly one capture group",
                serde_json::json!({ "pattern": pattern }),
            ));
        }
        Ok(Self {
            custom: Some(regex),
        })
    }

    /// Build from an optional pattern, falling back to the default.
    pub fn from_config(pattern: Option<&str>) -> RunnerResult<Self> {
        pattern.map_or_else(|| Ok(Self::default()), Self::new)
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        self.custom
            .as_ref()
            .map_or(DEFAULT_PROGRESS_PATTERN, Regex::as_str)
    }

    fn matched<'a>(&self, line: &'a str) -> Option<&'a str> {
        let regex = match &self.custom {
            Some(regex) => regex,
            None => default_regex()?,
        };
        regex.captures(line)?.get(1).map(|m| m.as_str())
    }

    /// The first percentage in `line`, exactly as written.
    #[must_use]
    pub fn try_parse(&self, line: &str) -> Option<f64> {
        self.matched(line)?
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
    }

    #[must_use]
    pub fn extract(&self, line: &str) -> Option<ProgressEvent> {
        let matched = self.matched(line)?;
        let value = matched.parse::<f64>().ok().filter(|v| v.is_finite())?;
        Some(ProgressEvent::with_text(value, matched))
    }
}
