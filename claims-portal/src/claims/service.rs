//! Session-level entry points for the claim sheet.
//!
//! Every user action becomes one [`ClaimEvent`] dispatched against a stored session. Dispatch
//! starts a new request generation first, so an answer still in flight for an older action can
//! no longer land in the session.

use portal_flow::{Context, ExecutionStatus, FlowRunner, GraphError, Session};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::events::ClaimEvent;
use super::keys::session_keys;
use super::stage::{ClaimFacts, ClaimStage, EmployeeLookup};
use super::tasks::warning_text;
use crate::backend::ClaimsBackend;
use crate::error::{FieldErrors, PortalError, PortalResult};
use crate::models::{
    ClaimDraft, ClaimType, ClaimVerificationResult, ProviderProfile, SubmittedClaim,
};

/// What the claim sheet shows for a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimView {
    pub session_id: String,
    pub stage: ClaimStage,
    /// Set while a lookup, verification or submission is in flight
    pub loading: Option<ClaimStage>,
    pub employee_lookup: EmployeeLookup,
    pub draft: ClaimDraft,
    pub claim_types: Option<Vec<ClaimType>>,
    pub verification: Option<ClaimVerificationResult>,
    pub duplicate_warning: Option<String>,
    pub warning_acknowledged: bool,
    pub final_verification: Option<ClaimVerificationResult>,
    pub bank_details_added: bool,
    pub field_errors: FieldErrors,
    pub notice: Option<String>,
    pub status_message: Option<String>,
    pub last_submitted: Option<SubmittedClaim>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimOutcome {
    pub view: ClaimView,
    pub response: Option<String>,
    /// The sheet closed, either after a submission or a cancel
    pub closed: bool,
    /// A newer action replaced this one; `view` shows the newer state
    pub superseded: bool,
    pub submitted: Option<SubmittedClaim>,
}

#[derive(Clone)]
pub struct ClaimService {
    runner: FlowRunner,
    backend: Arc<dyn ClaimsBackend>,
}

impl ClaimService {
    pub fn new(runner: FlowRunner, backend: Arc<dyn ClaimsBackend>) -> Self {
        Self { runner, backend }
    }

    /// Open a fresh claim sheet for `provider`
    pub async fn start(&self, provider: ProviderProfile) -> PortalResult<ClaimView> {
        let session_id = Uuid::new_v4().to_string();
        let session = Session::new_from_task(session_id.clone(), ClaimStage::NoEmployee.as_str());
        session
            .context
            .set(session_keys::SESSION_ID, session_id.clone())
            .await;
        session.context.set(session_keys::PROVIDER, &provider).await;

        info!(
            session_id = %session_id,
            user_id = %provider.user_id,
            is_psna = provider.is_psna,
            "Claim sheet opened"
        );

        let view = build_view(&session);
        self.runner.storage().save(session).await?;
        Ok(view)
    }

    pub async fn view(&self, session_id: &str, user_id: &str) -> PortalResult<ClaimView> {
        let session = self.load(session_id, user_id).await?;
        Ok(build_view(&session))
    }

    /// Apply one user action and run the claim graph until it needs the user again
    pub async fn dispatch(
        &self,
        session_id: &str,
        user_id: &str,
        event: ClaimEvent,
    ) -> PortalResult<ClaimOutcome> {
        if event == ClaimEvent::Cancel {
            let view = self.cancel(session_id, user_id).await?;
            return Ok(ClaimOutcome {
                view,
                response: None,
                closed: true,
                superseded: false,
                submitted: None,
            });
        }

        let session = self.load(session_id, user_id).await?;
        let generation = session.context.next_generation();
        session
            .context
            .clear_keys(&[session_keys::NOTICE, session_keys::FIELD_ERRORS])
            .await;
        session
            .context
            .set(session_keys::event_key(generation), &event)
            .await;
        info!(
            session_id = %session_id,
            event = event.name(),
            stage = %session.current_task_id,
            generation,
            "Dispatching claim event"
        );
        self.runner.storage().save(session).await?;

        let result = self.runner.run_for(session_id, generation).await?;
        match result.status {
            ExecutionStatus::WaitingForInput => {
                let session = self.load(session_id, user_id).await?;
                Ok(ClaimOutcome {
                    view: build_view(&session),
                    response: result.response,
                    closed: false,
                    superseded: false,
                    submitted: None,
                })
            }
            ExecutionStatus::Superseded => {
                let session = self.load(session_id, user_id).await?;
                Ok(ClaimOutcome {
                    view: build_view(&session),
                    response: None,
                    closed: false,
                    superseded: true,
                    submitted: None,
                })
            }
            ExecutionStatus::Completed => {
                let mut session = self.load(session_id, user_id).await?;
                session.current_task_id = ClaimStage::NoEmployee.as_str().to_string();
                session.status_message = Some("Claim submitted".to_string());
                let submitted = session.context.get(session_keys::LAST_SUBMITTED).await;
                let view = build_view(&session);
                self.runner.storage().save(session).await?;
                Ok(ClaimOutcome {
                    view,
                    response: result.response,
                    closed: true,
                    superseded: false,
                    submitted,
                })
            }
            ExecutionStatus::Error(message) => {
                warn!(session_id = %session_id, error = %message, "Claim step failed");
                Err(GraphError::TaskExecutionFailed(message).into())
            }
        }
    }

    /// Close the sheet: every claim fact is dropped and in-flight answers are discarded
    pub async fn cancel(&self, session_id: &str, user_id: &str) -> PortalResult<ClaimView> {
        let mut session = self.load(session_id, user_id).await?;
        session.context.next_generation();
        session.context.clear_keys(session_keys::CLAIM_FACTS).await;
        session.context.clear_prefix(session_keys::EVENT_PREFIX).await;
        session.current_task_id = ClaimStage::NoEmployee.as_str().to_string();
        session.status_message = Some("Claim cancelled".to_string());

        info!(session_id = %session_id, "Claim sheet cancelled");

        let view = build_view(&session);
        self.runner.storage().save(session).await?;
        Ok(view)
    }

    pub async fn claim_types(&self) -> PortalResult<Vec<ClaimType>> {
        Ok(self.backend.claim_types().await?)
    }

    async fn load(&self, session_id: &str, user_id: &str) -> PortalResult<Session> {
        let session = self
            .runner
            .storage()
            .get(session_id)
            .await?
            .ok_or_else(|| PortalError::NotFound(format!("claim session {session_id}")))?;

        let owner: Option<ProviderProfile> = session.context.get(session_keys::PROVIDER).await;
        match owner {
            Some(owner) if owner.user_id == user_id => Ok(session),
            _ => Err(PortalError::Forbidden(format!(
                "claim session {session_id} belongs to another provider"
            ))),
        }
    }
}

fn build_view(session: &Session) -> ClaimView {
    let context: &Context = &session.context;
    let facts = ClaimFacts::from_context(context);
    let verification: Option<ClaimVerificationResult> =
        context.get_sync(session_keys::VERIFICATION);
    let duplicate_warning = verification
        .as_ref()
        .filter(|v| v.is_duplicate() && facts.stage() == ClaimStage::DuplicateWarning)
        .map(warning_text);

    ClaimView {
        session_id: session.id.clone(),
        stage: session
            .current_task_id
            .parse()
            .unwrap_or(ClaimStage::NoEmployee),
        loading: context.get_sync(session_keys::LOADING),
        employee_lookup: context.get_sync(session_keys::LOOKUP).unwrap_or_default(),
        draft: context.get_sync(session_keys::DRAFT).unwrap_or_default(),
        claim_types: context.get_sync(session_keys::CLAIM_TYPES),
        verification,
        duplicate_warning,
        warning_acknowledged: facts.warning_acknowledged,
        final_verification: facts.final_verification,
        bank_details_added: context
            .get_sync(session_keys::BANK_DETAILS_ADDED)
            .unwrap_or(false),
        field_errors: context
            .get_sync(session_keys::FIELD_ERRORS)
            .unwrap_or_default(),
        notice: context.get_sync(session_keys::NOTICE),
        status_message: session.status_message.clone(),
        last_submitted: context.get_sync(session_keys::LAST_SUBMITTED),
    }
}
