pub mod config;
pub mod ids;
pub mod params;
pub mod run;

pub use config::*;
pub use ids::{RunId, SessionId};
pub use params::*;
pub use run::*;

/// Maximum length for user-supplied regex patterns to prevent `ReDoS` attacks.
pub const MAX_REGEX_PATTERN_LEN: usize = 1000;
