//! Typed errors for controller construction and configuration

use thiserror::Error;

/// Errors raised while building or validating the controller.
///
/// Runtime faults at the external boundaries (forecasting service, monitor)
/// are carried as `anyhow::Error` and never surface here: a failed forecast
/// only skips that model's update.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("model catalog is empty")]
    EmptyCatalog,

    #[error("model '{0}' is not in the catalog")]
    UnknownModel(String),

    #[error("model '{0}' appears more than once in the catalog")]
    DuplicateModel(String),

    #[error("probability table '{0}' has no bands")]
    EmptyTable(String),
}

pub type ControllerResult<T> = std::result::Result<T, ControllerError>;
