use crate::gateway::GatewayError;
use crate::strategy::TrackerError;
use std::fmt;
use thiserror::Error;

/// Every problem found while validating a bot's configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationError {
    pub violations: Vec<String>,
}

impl ConfigurationError {
    pub fn new(violations: Vec<String>) -> Self {
        Self { violations }
    }

    pub fn single(violation: impl Into<String>) -> Self {
        Self {
            violations: vec![violation.into()],
        }
    }

    /// `Ok` when nothing was collected
    pub fn check(violations: Vec<String>) -> Result<(), Self> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Self::new(violations))
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration: {}", self.violations.join("; "))
    }
}

impl std::error::Error for ConfigurationError {}

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("gateway: {0}")]
    Gateway(#[from] GatewayError),
    #[error("trailing stop: {0}")]
    Tracker(#[from] TrackerError),
}

impl BotError {
    /// Errors that need an operator; the bot halts on these
    pub fn is_fatal(&self) -> bool {
        match self {
            BotError::Configuration(_) => true,
            BotError::Gateway(e) => e.is_fatal(),
            BotError::Tracker(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_every_violation() {
        let err = ConfigurationError::new(vec![
            "direction is required".to_string(),
            "exit conditions must not be empty".to_string(),
        ]);

        let message = err.to_string();
        assert!(message.contains("direction is required"));
        assert!(message.contains("exit conditions"));
    }

    #[test]
    fn test_check_passes_when_empty() {
        assert!(ConfigurationError::check(Vec::new()).is_ok());
        assert!(ConfigurationError::check(vec!["bad".into()]).is_err());
    }

    #[test]
    fn test_fatal_classification() {
        let unauthorized = BotError::from(GatewayError::Unauthorized("bad key".into()));
        let transient = BotError::from(GatewayError::Transient("timeout".into()));

        assert!(unauthorized.is_fatal());
        assert!(!transient.is_fatal());
        assert!(!BotError::from(TrackerError::NotOpen).is_fatal());
    }
}
