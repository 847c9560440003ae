//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default width of the `Datetime` gate's output.
pub const DEFAULT_DATETIME_WIDTH: usize = 64;

/// Knobs that change how a project evaluates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Evaluate gates that cannot reach the sink when ticking a definition
    /// directly, so the editor sees live values everywhere.
    pub tick_unrooted: bool,
    /// Output width of newly created `Datetime` gates.
    pub datetime_width: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_unrooted: true,
            datetime_width: DEFAULT_DATETIME_WIDTH,
        }
    }
}

impl EngineConfig {
    /// Parse a config, filling missing fields with defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.datetime_width == 0 {
            return Err(Error::InvalidWidth(self.datetime_width));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = EngineConfig::from_json_str(r#"{"datetime_width": 32}"#).unwrap();
        assert_eq!(config.datetime_width, 32);
        assert!(config.tick_unrooted);
    }

    #[test]
    fn zero_width_is_rejected() {
        assert_eq!(
            EngineConfig::from_json_str(r#"{"datetime_width": 0}"#),
            Err(Error::InvalidWidth(0))
        );
    }
}
