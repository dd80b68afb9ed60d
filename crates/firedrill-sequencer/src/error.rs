use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while loading or validating a scenario
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Scenario file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error reading scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Package '{package}' (#{index}) is invalid: {reason}")]
    InvalidPackage {
        index: usize,
        package: String,
        reason: String,
    },

    #[error("Invalid {component} settings: {reason}")]
    InvalidComponent {
        component: &'static str,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn package(index: usize, package: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidPackage {
            index,
            package: package.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn component(component: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidComponent {
            component,
            reason: reason.into(),
        }
    }
}

/// Check that a configured number of seconds is usable as a duration
pub(crate) fn check_seconds(value: f32) -> Result<(), String> {
    if !value.is_finite() {
        Err(format!("{} is not a finite number of seconds", value))
    } else if value < 0.0 {
        Err(format!("{} seconds is negative", value))
    } else if Duration::try_from_secs_f32(value).is_err() {
        Err(format!("{} seconds is too long", value))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_seconds_agrees_with_duration_conversion() {
        assert!(check_seconds(0.0).is_ok());
        assert!(check_seconds(3600.0).is_ok());
        assert!(check_seconds(-0.5).is_err());
        assert!(check_seconds(f32::NAN).is_err());
        assert!(check_seconds(f32::INFINITY).is_err());
        assert!(check_seconds(1e20).is_err());
        assert!(check_seconds(f32::MAX).is_err());
    }
}
