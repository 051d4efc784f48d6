use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{BackendError, BackendResult, ClaimsBackend, RegistrationBackend};
use crate::models::{
    AddClaimRequest, BankDetails, ClaimReceipt, ClaimType, ClaimVerificationResult, PolicyHolder,
    VerifyClaimRequest,
};
use crate::registration::{Registration, RegistrationKind, RegistrationStatus, ReviewDecision};

/// Claims older than this are not reported as duplicates
const DUPLICATE_WINDOW_DAYS: i64 = 90;

#[derive(Debug, Clone)]
pub struct StoredClaim {
    pub id: i64,
    pub user_id: String,
    pub employee_no: String,
    pub claim_code: String,
    pub amount: f64,
    pub description: String,
    pub status: String,
    pub documents: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    policy_holders: DashMap<String, PolicyHolder>,
    banks: DashMap<String, BankDetails>,
    claim_types: Vec<ClaimType>,
    claims: DashMap<i64, StoredClaim>,
    next_claim_id: AtomicI64,
    registrations: DashMap<String, Registration>,
    verification_latency: DashMap<String, Duration>,
    failing: DashSet<String>,
    calls: DashMap<String, usize>,
}

/// Self-contained backend for local runs and tests.
///
/// Operation names accepted by [`InMemoryBackend::fail`] and [`InMemoryBackend::calls`]:
/// `find_policy_holder`, `claim_types`, `verify_claim`, `add_claim`, `add_bank`, `create_draft`,
/// `update_draft`.
#[derive(Clone)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_claim_types(default_claim_types())
    }

    pub fn with_claim_types(claim_types: Vec<ClaimType>) -> Self {
        Self {
            inner: Arc::new(Inner {
                claim_types,
                next_claim_id: AtomicI64::new(1000),
                ..Default::default()
            }),
        }
    }

    pub fn add_policy_holder(&self, employee_number: impl Into<String>, holder: PolicyHolder) -> &Self {
        self.inner.policy_holders.insert(employee_number.into(), holder);
        self
    }

    /// Seed an earlier claim, as if filed at `created_at`
    pub fn add_previous_claim(
        &self,
        employee_number: &str,
        claim_code: &str,
        amount: f64,
        description: &str,
        created_at: DateTime<Utc>,
    ) -> i64 {
        let id = self.inner.next_claim_id.fetch_add(1, Ordering::SeqCst);
        self.inner.claims.insert(
            id,
            StoredClaim {
                id,
                user_id: "seed".to_string(),
                employee_no: employee_number.to_string(),
                claim_code: claim_code.to_string(),
                amount,
                description: description.to_string(),
                status: "Approved".to_string(),
                documents: String::new(),
                created_at,
            },
        );
        id
    }

    /// Delay verification answers for one claim code
    pub fn set_verification_latency(&self, claim_code: impl Into<String>, latency: Duration) {
        self.inner.verification_latency.insert(claim_code.into(), latency);
    }

    pub fn fail(&self, operation: &str) {
        self.inner.failing.insert(operation.to_string());
    }

    pub fn recover(&self, operation: &str) {
        self.inner.failing.remove(operation);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.inner.calls.get(operation).map(|count| *count).unwrap_or(0)
    }

    pub fn claims(&self) -> Vec<StoredClaim> {
        let mut claims: Vec<StoredClaim> =
            self.inner.claims.iter().map(|entry| entry.value().clone()).collect();
        claims.sort_by_key(|claim| claim.id);
        claims
    }

    pub fn bank_details(&self, policy_holder_id: &str) -> Option<BankDetails> {
        self.inner.banks.get(policy_holder_id).map(|entry| entry.clone())
    }

    fn record_call(&self, operation: &str) -> BackendResult<()> {
        *self.inner.calls.entry(operation.to_string()).or_insert(0) += 1;
        if self.inner.failing.contains(operation) {
            debug!(operation = %operation, "Injected backend failure");
            return Err(BackendError::Transport(format!("{operation} unavailable")));
        }
        Ok(())
    }

    fn claim_label(&self, code: &str) -> Option<String> {
        self.inner
            .claim_types
            .iter()
            .find(|claim_type| claim_type.id == code)
            .map(|claim_type| claim_type.label.clone())
    }

    fn latest_claim_within_window(&self, employee_no: &str, claim_code: &str) -> Option<StoredClaim> {
        let cutoff = Utc::now() - ChronoDuration::days(DUPLICATE_WINDOW_DAYS);
        self.inner
            .claims
            .iter()
            .filter(|entry| {
                entry.employee_no == employee_no
                    && entry.claim_code == claim_code
                    && entry.created_at >= cutoff
            })
            .max_by_key(|entry| entry.created_at)
            .map(|entry| entry.value().clone())
    }

    fn registration(&self, id: &str) -> BackendResult<Registration> {
        self.inner
            .registrations
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| BackendError::NotFound(format!("registration {id}")))
    }

    fn store_registration(&self, mut registration: Registration) -> Registration {
        registration.updated_at = Utc::now();
        self.inner
            .registrations
            .insert(registration.id.clone(), registration.clone());
        registration
    }
}

fn default_claim_types() -> Vec<ClaimType> {
    [
        ("1", "Medical", "Specialist Consultation"),
        ("2", "Medical", "Pathology"),
        ("3", "Medical", "GP Consultation"),
        ("4", "Dental", "Dental Check-up"),
        ("5", "Optical", "Eye Examination"),
        ("6", "Pharmacy", "Prescription Medicines"),
    ]
    .into_iter()
    .map(|(id, group, label)| ClaimType {
        id: id.to_string(),
        group: group.to_string(),
        label: label.to_string(),
    })
    .collect()
}

#[async_trait]
impl ClaimsBackend for InMemoryBackend {
    async fn find_policy_holder(&self, employee_number: &str) -> BackendResult<Option<PolicyHolder>> {
        self.record_call("find_policy_holder")?;
        Ok(self
            .inner
            .policy_holders
            .get(employee_number)
            .map(|entry| entry.clone()))
    }

    async fn claim_types(&self) -> BackendResult<Vec<ClaimType>> {
        self.record_call("claim_types")?;
        Ok(self.inner.claim_types.clone())
    }

    async fn verify_claim(&self, request: &VerifyClaimRequest) -> BackendResult<ClaimVerificationResult> {
        self.record_call("verify_claim")?;

        let latency = self
            .inner
            .verification_latency
            .get(&request.claim_code)
            .map(|entry| *entry);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let claim_label = self.claim_label(&request.claim_code);
        let result = match self.latest_claim_within_window(&request.employee_no, &request.claim_code) {
            Some(previous) => ClaimVerificationResult {
                claim_label,
                previous_claim_id: Some(previous.id),
                previous_claim_amount: Some(previous.amount),
                previous_claim_date_time: Some(previous.created_at.to_rfc3339()),
                previous_claim_description: Some(previous.description),
            },
            None => ClaimVerificationResult {
                claim_label,
                previous_claim_id: Some(0),
                ..Default::default()
            },
        };
        Ok(result)
    }

    async fn add_claim(&self, request: &AddClaimRequest) -> BackendResult<ClaimReceipt> {
        self.record_call("add_claim")?;
        if self.claim_label(&request.claim_code).is_none() {
            return Err(BackendError::Rejected(format!(
                "unknown claim code {}",
                request.claim_code
            )));
        }

        let id = self.inner.next_claim_id.fetch_add(1, Ordering::SeqCst);
        self.inner.claims.insert(
            id,
            StoredClaim {
                id,
                user_id: request.user_id.clone(),
                employee_no: request.employee_no.clone(),
                claim_code: request.claim_code.clone(),
                amount: request.amount,
                description: request.description.clone(),
                status: request.status.clone(),
                documents: request.documents.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(ClaimReceipt { id })
    }

    async fn add_bank(&self, details: &BankDetails) -> BackendResult<()> {
        self.record_call("add_bank")?;

        let mut holder = self
            .inner
            .policy_holders
            .iter_mut()
            .find(|entry| entry.id == details.policy_holder_id)
            .ok_or_else(|| BackendError::NotFound(format!("policy holder {}", details.policy_holder_id)))?;
        holder.has_bank_details = Some(true);
        drop(holder);

        self.inner
            .banks
            .insert(details.policy_holder_id.clone(), details.clone());
        Ok(())
    }
}

#[async_trait]
impl RegistrationBackend for InMemoryBackend {
    async fn create_draft(
        &self,
        owner_id: &str,
        kind: RegistrationKind,
        values: &Value,
    ) -> BackendResult<Registration> {
        self.record_call("create_draft")?;
        let now = Utc::now();
        let registration = Registration {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            kind,
            status: RegistrationStatus::Draft,
            values: values.clone(),
            registration_number: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };
        Ok(self.store_registration(registration))
    }

    async fn update_draft(&self, id: &str, values: &Value) -> BackendResult<Registration> {
        self.record_call("update_draft")?;
        let mut registration = self.registration(id)?;
        if !matches!(
            registration.status,
            RegistrationStatus::Draft | RegistrationStatus::Rejected
        ) {
            return Err(BackendError::Rejected(format!(
                "registration {id} is {} and can no longer be edited",
                registration.status
            )));
        }
        registration.values = values.clone();
        Ok(self.store_registration(registration))
    }

    async fn get_registration(&self, id: &str) -> BackendResult<Option<Registration>> {
        Ok(self.inner.registrations.get(id).map(|entry| entry.clone()))
    }

    async fn list_registrations(
        &self,
        status: Option<RegistrationStatus>,
    ) -> BackendResult<Vec<Registration>> {
        let mut registrations: Vec<Registration> = self
            .inner
            .registrations
            .iter()
            .filter(|entry| status.is_none_or(|status| entry.status == status))
            .map(|entry| entry.value().clone())
            .collect();
        registrations.sort_by_key(|registration| registration.created_at);
        Ok(registrations)
    }

    async fn submit_registration(&self, id: &str) -> BackendResult<Registration> {
        let mut registration = self.registration(id)?;
        if !matches!(
            registration.status,
            RegistrationStatus::Draft | RegistrationStatus::Rejected
        ) {
            return Err(BackendError::Rejected(format!(
                "registration {id} is already {}",
                registration.status
            )));
        }
        registration.status = RegistrationStatus::Submitted;
        registration.rejection_reason = None;
        Ok(self.store_registration(registration))
    }

    async fn review_registration(
        &self,
        id: &str,
        decision: &ReviewDecision,
    ) -> BackendResult<Registration> {
        let mut registration = self.registration(id)?;
        if registration.status != RegistrationStatus::Submitted {
            return Err(BackendError::Rejected(format!(
                "registration {id} is {} and cannot be reviewed",
                registration.status
            )));
        }
        match decision {
            ReviewDecision::Approve {
                registration_number,
            } => {
                registration.status = RegistrationStatus::Approved;
                registration.registration_number = Some(registration_number.clone());
            }
            ReviewDecision::Reject { reason } => {
                registration.status = RegistrationStatus::Rejected;
                registration.rejection_reason = Some(reason.clone());
            }
        }
        Ok(self.store_registration(registration))
    }
}
