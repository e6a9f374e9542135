use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;

/// Default share of a caller's progress range handed to a prerequisite stage.
pub const DEFAULT_PREREQUISITE_SHARE: f64 = 0.75;

/// Default auto-dismiss delay for error alerts, in seconds.
pub const DEFAULT_ALERT_DISMISS_SECS: u64 = 5;

/// Orchestrator configuration loaded from environment variables.
///
/// All fields have defaults matching the interactive tool's behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Fraction of a caller's progress range given to an automatically
    /// invoked prerequisite stage; the caller keeps the remainder.
    pub prerequisite_share: f64,
    /// How long an error alert stays visible before it is dismissed.
    pub alert_dismiss: Duration,
    /// Show a transient "Rendering" alert while results are materialised.
    pub work_alerts: bool,
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `KILN_PREREQUISITE_SHARE` | `0.75`  |
    /// | `KILN_ALERT_DISMISS_SECS` | `5`     |
    /// | `KILN_WORK_ALERTS`        | `false` |
    pub fn from_env() -> Result<Self, CoreError> {
        let prerequisite_share: f64 =
            parse_env("KILN_PREREQUISITE_SHARE", DEFAULT_PREREQUISITE_SHARE)?;
        let alert_dismiss_secs: u64 =
            parse_env("KILN_ALERT_DISMISS_SECS", DEFAULT_ALERT_DISMISS_SECS)?;
        let work_alerts: bool = parse_env("KILN_WORK_ALERTS", false)?;

        let config = Self {
            prerequisite_share,
            alert_dismiss: Duration::from_secs(alert_dismiss_secs),
            work_alerts,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the prerequisite share leaves both stages a non-empty range.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.prerequisite_share > 0.0 && self.prerequisite_share < 1.0) {
            return Err(CoreError::Validation(format!(
                "KILN_PREREQUISITE_SHARE must be in (0, 1), got {}",
                self.prerequisite_share
            )));
        }
        Ok(())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            prerequisite_share: DEFAULT_PREREQUISITE_SHARE,
            alert_dismiss: Duration::from_secs(DEFAULT_ALERT_DISMISS_SECS),
            work_alerts: false,
        }
    }
}

fn parse_env<T: FromStr>(name: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{name} has an invalid value: {raw:?}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(OrchestratorConfig::default().validate().is_ok());
    }

    #[test]
    fn share_outside_open_interval_is_rejected() {
        for share in [0.0, 1.0, -0.5, 1.5] {
            let config = OrchestratorConfig {
                prerequisite_share: share,
                ..Default::default()
            };
            assert_matches!(config.validate(), Err(CoreError::Validation(_)));
        }
    }

    #[test]
    fn unset_variable_uses_default() {
        let value: u64 = parse_env("KILN_TEST_SURELY_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
