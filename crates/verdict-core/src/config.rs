//! Engine configuration
//!
//! One environment input selects the active policy document path; a second
//! optionally bounds each solver check. Resolution happens once at startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Environment variable selecting the active policy path (file or directory)
pub const POLICY_PATH_ENV: &str = "VERDICT_POLICY_PATH";

/// Environment variable bounding each solver check, in milliseconds
pub const SOLVER_TIMEOUT_ENV: &str = "VERDICT_SOLVER_TIMEOUT_MS";

/// Default policy directory, relative to the working directory
pub const DEFAULT_POLICY_DIR: &str = "policies";

/// Engine configuration resolved from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Policy document file, or directory of documents
    pub policy_path: PathBuf,
    /// Per-check solver deadline; expiry is treated as unsatisfiable
    pub solver_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy_path: PathBuf::from(DEFAULT_POLICY_DIR),
            solver_timeout: None,
        }
    }
}

impl EngineConfig {
    /// Resolve configuration from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let policy_path = env::var_os(POLICY_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_POLICY_DIR));

        let solver_timeout = env::var(SOLVER_TIMEOUT_ENV).ok().and_then(|raw| {
            match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
                _ => {
                    warn!(value = %raw, "ignoring unparsable solver timeout");
                    None
                },
            }
        });

        Self { policy_path, solver_timeout }
    }
}
