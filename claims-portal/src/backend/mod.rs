//! Remote collaborators: the portal GraphQL API and private document storage.
//!
//! Everything the claim flow and the registration screens need from outside goes through the
//! traits in this module, so sessions receive their backends explicitly and tests can swap in
//! the in-memory implementations.

mod documents;
mod graphql;
mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{
    AddClaimRequest, BankDetails, ClaimReceipt, ClaimType, ClaimVerificationResult, DocumentKey,
    PolicyHolder, VerifyClaimRequest,
};
use crate::registration::{Registration, RegistrationKind, RegistrationStatus, ReviewDecision};

pub use documents::{HttpDocumentStore, InMemoryDocumentStore};
pub use graphql::GraphQlBackend;
pub use memory::InMemoryBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected by backend: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Decode(e.to_string())
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Policy holder, benefit and claim operations used by the claim sheet
#[async_trait]
pub trait ClaimsBackend: Send + Sync {
    /// `Ok(None)` when no policy holder matches the employee number
    async fn find_policy_holder(&self, employee_number: &str) -> BackendResult<Option<PolicyHolder>>;

    async fn claim_types(&self) -> BackendResult<Vec<ClaimType>>;

    async fn verify_claim(&self, request: &VerifyClaimRequest) -> BackendResult<ClaimVerificationResult>;

    async fn add_claim(&self, request: &AddClaimRequest) -> BackendResult<ClaimReceipt>;

    async fn add_bank(&self, details: &BankDetails) -> BackendResult<()>;
}

/// Private, per-user object storage for claim attachments
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn upload(&self, key: &DocumentKey, content: Vec<u8>, mime_type: &str) -> BackendResult<()>;
}

/// Registration drafts, submission and admin review
#[async_trait]
pub trait RegistrationBackend: Send + Sync {
    async fn create_draft(
        &self,
        owner_id: &str,
        kind: RegistrationKind,
        values: &Value,
    ) -> BackendResult<Registration>;

    async fn update_draft(&self, id: &str, values: &Value) -> BackendResult<Registration>;

    async fn get_registration(&self, id: &str) -> BackendResult<Option<Registration>>;

    async fn list_registrations(
        &self,
        status: Option<RegistrationStatus>,
    ) -> BackendResult<Vec<Registration>>;

    async fn submit_registration(&self, id: &str) -> BackendResult<Registration>;

    async fn review_registration(
        &self,
        id: &str,
        decision: &ReviewDecision,
    ) -> BackendResult<Registration>;
}
