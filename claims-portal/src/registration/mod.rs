//! Service-provider registration: the wizard's form maps, progress, validation, draft autosave
//! and admin review.

pub mod autosave;
pub mod form;
pub mod luhn;
pub mod progress;
pub mod service;
mod types;
pub mod validation;

pub use crate::error::FieldErrors;
pub use autosave::{AutosaveStatus, DraftAutosaver};
pub use form::{FormStep, Subsection, steps_for};
pub use progress::{ProgressReport, SubsectionStatus, compute_progress};
pub use service::{DraftState, RegistrationService};
pub use types::{Registration, RegistrationKind, RegistrationStatus, ReviewDecision};
