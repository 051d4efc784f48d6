use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::autosave::{AutosaveStatus, DEFAULT_IDLE_TIMEOUT, DraftAutosaver};
use super::form::steps_for;
use super::luhn;
use super::progress::{ProgressReport, compute_progress};
use super::validation::{format_errors, validate};
use super::{Registration, RegistrationKind, RegistrationStatus, ReviewDecision};
use crate::backend::RegistrationBackend;
use crate::error::{FieldErrors, PortalError, PortalResult};

/// Random digits between the prefix and the check digit of a registration number
const REGISTRATION_NUMBER_DIGITS: usize = 8;

pub fn registration_number_prefix(kind: RegistrationKind) -> &'static str {
    match kind {
        RegistrationKind::PrivatePractice => "41",
        RegistrationKind::HealthAuthority => "42",
    }
}

/// The wizard's view of a draft after an edit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftState {
    pub registration_id: String,
    pub autosave: AutosaveStatus,
    pub field_errors: FieldErrors,
    pub progress: ProgressReport,
}

pub struct RegistrationService {
    backend: Arc<dyn RegistrationBackend>,
    autosavers: DashMap<String, DraftAutosaver>,
    debounce: Duration,
    idle_timeout: Duration,
}

impl RegistrationService {
    pub fn new(backend: Arc<dyn RegistrationBackend>, debounce: Duration) -> Self {
        Self {
            backend,
            autosavers: DashMap::new(),
            debounce,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Drafts with a live autosave worker
    pub fn open_drafts(&self) -> usize {
        self.autosavers.len()
    }

    /// Close the autosave of every draft left alone for the idle timeout; returns how many closed
    pub async fn evict_idle(&self) -> usize {
        let idle: Vec<String> = self
            .autosavers
            .iter()
            .filter(|entry| entry.value().is_idle(self.idle_timeout))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for id in idle {
            // An edit may have landed since the scan
            let Some((_, autosaver)) = self
                .autosavers
                .remove_if(&id, |_, autosaver| autosaver.is_idle(self.idle_timeout))
            else {
                continue;
            };
            if let AutosaveStatus::Failed { error } = autosaver.shutdown().await {
                warn!(registration_id = %id, error = %error, "Idle draft closed with unsaved changes");
            }
            evicted += 1;
        }

        if evicted > 0 {
            debug!(evicted, open = self.autosavers.len(), "Closed idle draft autosaves");
        }
        evicted
    }

    /// Periodically evict idle autosaves until the service is dropped
    pub fn spawn_idle_sweep(service: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let service: Weak<Self> = Arc::downgrade(service);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(service) = service.upgrade() else {
                    break;
                };
                service.evict_idle().await;
            }
        })
    }

    pub async fn create(
        &self,
        owner_id: &str,
        kind: RegistrationKind,
        values: Value,
    ) -> PortalResult<Registration> {
        let registration = self.backend.create_draft(owner_id, kind, &values).await?;
        info!(
            registration_id = %registration.id,
            owner_id = %owner_id,
            kind = ?kind,
            "Registration draft created"
        );
        Ok(registration)
    }

    pub async fn get(&self, id: &str, user_id: &str) -> PortalResult<Registration> {
        let mut registration = self.owned(id, user_id).await?;
        if let Some(autosaver) = self.autosavers.get(id) {
            registration.values = autosaver.latest();
        }
        Ok(registration)
    }

    /// Record the wizard's current values; the backend sees them once the autosave settles
    pub async fn save_draft(&self, id: &str, user_id: &str, values: Value) -> PortalResult<DraftState> {
        let registration = self.owned(id, user_id).await?;
        ensure_editable(&registration)?;

        let field_errors = format_errors(registration.kind, &values);
        let progress = compute_progress(&values, &field_errors, steps_for(registration.kind));

        let mut autosaver = self
            .autosavers
            .entry(id.to_string())
            .or_insert_with(|| {
                DraftAutosaver::for_existing(self.backend.clone(), &registration, self.debounce)
            });
        autosaver.update(values);
        let autosave = autosaver.status();

        Ok(DraftState {
            registration_id: registration.id,
            autosave,
            field_errors,
            progress,
        })
    }

    /// Progress with warning badges for the wizard's current step and the subsections it opened
    pub async fn progress(
        &self,
        id: &str,
        user_id: &str,
        current_step: usize,
        visited: &HashSet<String>,
    ) -> PortalResult<ProgressReport> {
        let registration = self.get(id, user_id).await?;
        let errors = format_errors(registration.kind, &registration.values);
        Ok(compute_progress(
            &registration.values,
            &errors,
            steps_for(registration.kind),
        )
        .with_badges(visited, current_step))
    }

    /// Validate everything, flush the autosave, then hand the registration to review
    pub async fn submit(&self, id: &str, user_id: &str) -> PortalResult<Registration> {
        let registration = self.get(id, user_id).await?;
        ensure_editable(&registration)?;

        let errors = validate(registration.kind, &registration.values);
        if !errors.is_empty() {
            info!(registration_id = %id, errors = errors.len(), "Registration failed validation");
            return Err(PortalError::Validation(errors));
        }

        if let Some((_, autosaver)) = self.autosavers.remove(id) {
            if let AutosaveStatus::Failed { error } = autosaver.shutdown().await {
                warn!(registration_id = %id, error = %error, "Final draft save failed");
                return Err(PortalError::Conflict(format!(
                    "latest changes could not be saved: {error}"
                )));
            }
        }

        let submitted = self.backend.submit_registration(id).await?;
        info!(registration_id = %id, "Registration submitted for review");
        Ok(submitted)
    }

    pub async fn list(&self, status: Option<RegistrationStatus>) -> PortalResult<Vec<Registration>> {
        Ok(self.backend.list_registrations(status).await?)
    }

    pub async fn approve(&self, id: &str) -> PortalResult<Registration> {
        let registration = self.submitted(id).await?;
        let prefix = registration_number_prefix(registration.kind);
        let registration_number = luhn::generate(prefix, REGISTRATION_NUMBER_DIGITS)
            .ok_or_else(|| PortalError::Conflict(format!("invalid number prefix {prefix}")))?;

        let approved = self
            .backend
            .review_registration(
                id,
                &ReviewDecision::Approve {
                    registration_number: registration_number.clone(),
                },
            )
            .await?;
        info!(registration_id = %id, registration_number = %registration_number, "Registration approved");
        Ok(approved)
    }

    pub async fn reject(&self, id: &str, reason: &str) -> PortalResult<Registration> {
        let reason = reason.trim();
        if reason.is_empty() {
            let mut errors = FieldErrors::new();
            errors.insert("reason".to_string(), "Required".to_string());
            return Err(PortalError::Validation(errors));
        }
        self.submitted(id).await?;

        let rejected = self
            .backend
            .review_registration(
                id,
                &ReviewDecision::Reject {
                    reason: reason.to_string(),
                },
            )
            .await?;
        info!(registration_id = %id, "Registration rejected");
        Ok(rejected)
    }

    async fn find(&self, id: &str) -> PortalResult<Registration> {
        self.backend
            .get_registration(id)
            .await?
            .ok_or_else(|| PortalError::NotFound(format!("registration {id}")))
    }

    async fn owned(&self, id: &str, user_id: &str) -> PortalResult<Registration> {
        let registration = self.find(id).await?;
        if registration.owner_id != user_id {
            return Err(PortalError::Forbidden(format!(
                "registration {id} belongs to another provider"
            )));
        }
        Ok(registration)
    }

    async fn submitted(&self, id: &str) -> PortalResult<Registration> {
        let registration = self.find(id).await?;
        if registration.status != RegistrationStatus::Submitted {
            return Err(PortalError::Conflict(format!(
                "registration {id} is {} and cannot be reviewed",
                registration.status
            )));
        }
        Ok(registration)
    }
}

fn ensure_editable(registration: &Registration) -> PortalResult<()> {
    match registration.status {
        RegistrationStatus::Draft | RegistrationStatus::Rejected => Ok(()),
        status => Err(PortalError::Conflict(format!(
            "registration {} is {status}",
            registration.id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use serde_json::json;

    fn service() -> RegistrationService {
        RegistrationService::new(Arc::new(InMemoryBackend::new()), Duration::from_millis(20))
    }

    fn complete_authority() -> Value {
        let mut values = json!({});
        for path in steps_for(RegistrationKind::HealthAuthority)
            .iter()
            .flat_map(|step| step.fields())
        {
            let leaf = path.rsplit('.').next().unwrap_or(path);
            let value = match leaf {
                "phone" => json!("+675 7000 1234"),
                "email" => json!("admin@morobe.health"),
                "postalCode" | "branchNumber" | "accountNumber" | "tin" | "medicalBoardNumber" => {
                    json!("411")
                }
                "yearsOfPractice" | "count" | "bedCount" => json!(12),
                _ => json!("Morobe"),
            };
            set_path(&mut values, path, value);
        }
        values
    }

    fn set_path(values: &mut Value, path: &str, value: Value) {
        let mut current = values;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let object = current.as_object_mut().unwrap();
            if segments.peek().is_none() {
                object.insert(segment.to_string(), value);
                return;
            }
            current = object.entry(segment).or_insert_with(|| json!({}));
        }
    }

    #[tokio::test]
    async fn incomplete_registration_is_not_submitted() {
        let service = service();
        let draft = service
            .create("prov-1", RegistrationKind::HealthAuthority, json!({ "authorityName": "Morobe PHA" }))
            .await
            .unwrap();

        let Err(PortalError::Validation(errors)) = service.submit(&draft.id, "prov-1").await else {
            panic!("expected validation errors");
        };
        assert!(errors.contains_key("province"));
        assert_eq!(service.get(&draft.id, "prov-1").await.unwrap().status, RegistrationStatus::Draft);
    }

    #[tokio::test]
    async fn submit_flushes_autosave_then_approve_assigns_luhn_number() {
        let service = service();
        let draft = service
            .create("prov-1", RegistrationKind::HealthAuthority, json!({}))
            .await
            .unwrap();

        let state = service
            .save_draft(&draft.id, "prov-1", complete_authority())
            .await
            .unwrap();
        assert!(state.field_errors.is_empty(), "{:?}", state.field_errors);
        assert_eq!(state.progress.percent, 100);

        let submitted = service.submit(&draft.id, "prov-1").await.unwrap();
        assert_eq!(submitted.status, RegistrationStatus::Submitted);
        assert_eq!(submitted.values, complete_authority());

        let approved = service.approve(&draft.id).await.unwrap();
        let number = approved.registration_number.unwrap();
        assert!(number.starts_with("42"));
        assert_eq!(number.len(), 11);
        assert!(luhn::is_valid(&number));
    }

    #[tokio::test]
    async fn review_rules() {
        let service = service();
        let draft = service
            .create("prov-1", RegistrationKind::HealthAuthority, complete_authority())
            .await
            .unwrap();

        assert!(matches!(service.approve(&draft.id).await, Err(PortalError::Conflict(_))));

        service.submit(&draft.id, "prov-1").await.unwrap();
        assert!(matches!(
            service.reject(&draft.id, "   ").await,
            Err(PortalError::Validation(_))
        ));

        let rejected = service.reject(&draft.id, "Missing licence").await.unwrap();
        assert_eq!(rejected.status, RegistrationStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Missing licence"));

        let listed = service.list(Some(RegistrationStatus::Rejected)).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn idle_autosave_is_closed_and_values_kept() {
        let service = service().with_idle_timeout(Duration::from_millis(100));
        let draft = service
            .create("prov-1", RegistrationKind::PrivatePractice, json!({}))
            .await
            .unwrap();

        service
            .save_draft(&draft.id, "prov-1", json!({ "practiceName": "Kila Clinic" }))
            .await
            .unwrap();
        assert_eq!(service.open_drafts(), 1);
        assert_eq!(service.evict_idle().await, 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(service.evict_idle().await, 1);
        assert_eq!(service.open_drafts(), 0);

        let stored = service.get(&draft.id, "prov-1").await.unwrap();
        assert_eq!(stored.values, json!({ "practiceName": "Kila Clinic" }));
    }

    #[tokio::test]
    async fn recent_edit_keeps_autosave_open() {
        let service = service().with_idle_timeout(Duration::from_millis(150));
        let draft = service
            .create("prov-1", RegistrationKind::PrivatePractice, json!({}))
            .await
            .unwrap();

        service
            .save_draft(&draft.id, "prov-1", json!({ "practiceName": "Kila" }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        service
            .save_draft(&draft.id, "prov-1", json!({ "practiceName": "Kila Clinic" }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(service.evict_idle().await, 0);
        assert_eq!(service.open_drafts(), 1);
    }

    #[tokio::test]
    async fn sweep_evicts_in_the_background() {
        let service = Arc::new(service().with_idle_timeout(Duration::from_millis(50)));
        let draft = service
            .create("prov-1", RegistrationKind::PrivatePractice, json!({}))
            .await
            .unwrap();
        service
            .save_draft(&draft.id, "prov-1", json!({ "practiceName": "Kila" }))
            .await
            .unwrap();

        let sweep = RegistrationService::spawn_idle_sweep(&service, Duration::from_millis(25));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(service.open_drafts(), 0);

        drop(service);
        tokio::time::timeout(Duration::from_secs(1), sweep)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn progress_badges_follow_the_wizard_position() {
        let service = service();
        let draft = service
            .create("prov-1", RegistrationKind::HealthAuthority, json!({}))
            .await
            .unwrap();
        let steps = steps_for(RegistrationKind::HealthAuthority);
        let first = steps[0].subsections[0].id;

        let report = service
            .progress(&draft.id, "prov-1", 0, &HashSet::new())
            .await
            .unwrap();
        assert!(!report.subsection(first).unwrap().show_warning);

        let report = service
            .progress(&draft.id, "prov-1", 1, &HashSet::new())
            .await
            .unwrap();
        assert!(report.subsection(first).unwrap().show_warning);
    }

    #[tokio::test]
    async fn drafts_belong_to_their_owner() {
        let service = service();
        let draft = service
            .create("prov-1", RegistrationKind::PrivatePractice, json!({}))
            .await
            .unwrap();

        assert!(matches!(
            service.save_draft(&draft.id, "prov-2", json!({})).await,
            Err(PortalError::Forbidden(_))
        ));
        assert!(matches!(
            service.get("missing", "prov-1").await,
            Err(PortalError::NotFound(_))
        ));
    }
}
