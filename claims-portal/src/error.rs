use portal_flow::GraphError;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::backend::BackendError;

/// Field path to message, ordered so responses are stable
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Validation failed on {} field(s)", .0.len())]
    Validation(FieldErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Flow(#[from] GraphError),
}

pub type PortalResult<T> = std::result::Result<T, PortalError>;
