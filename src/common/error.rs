//! Error types for se2_planner

use thiserror::Error;

/// Main error type for the planning pipeline
///
/// Ordinary search outcomes ("no path", "iterations exceeded") are not errors;
/// they are reported through [`crate::path_planning::smac::PlanFailure`].
#[derive(Error, Debug)]
pub enum PlannerError {
    /// Invalid planner configuration, detected at setup
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Pipeline used out of order or with out-of-range inputs
    #[error("Invalid use: {0}")]
    InvalidUse(String),
    /// Smoothing or upsampling could not produce a usable solution
    #[error("Optimization error: {0}")]
    Optimization(String),
    /// Invalid parameter passed to a data-structure constructor
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Failed to parse a configuration document
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlannerError {
    /// Configuration-class errors are the only ones allowed to escape a planning call.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PlannerError::Configuration(_) | PlannerError::ConfigParse(_)
        )
    }
}

/// Result type alias for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlannerError::InvalidUse("start is outside the map".to_string());
        assert_eq!(format!("{}", err), "Invalid use: start is outside the map");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PlannerError = io_err.into();
        assert!(matches!(err, PlannerError::Io(_)));
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_configuration_class() {
        assert!(PlannerError::Configuration("bad scale".into()).is_configuration());
        assert!(!PlannerError::Optimization("diverged".into()).is_configuration());
        assert!(!PlannerError::InvalidParameter("zero width".into()).is_configuration());
    }
}
