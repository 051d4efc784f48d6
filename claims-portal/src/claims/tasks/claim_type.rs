use async_trait::async_trait;
use portal_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, warn};

use super::common::{
    choose_claim_type, claim_label, claim_types, clear_claim_type_results, clear_loading, draft,
    employee, handle_employee_change, notify, present, provider, save_draft, session_id,
    set_loading, superseded, take_event, unavailable,
};
use crate::backend::ClaimsBackend;
use crate::claims::events::ClaimEvent;
use crate::claims::keys::session_keys;
use crate::claims::stage::ClaimStage;
use crate::models::VerifyClaimRequest;

/// Shows the benefit catalog and waits for a claim type
pub struct ClaimTypeSelectionTask {
    backend: Arc<dyn ClaimsBackend>,
}

impl ClaimTypeSelectionTask {
    pub fn new(backend: Arc<dyn ClaimsBackend>) -> Self {
        Self { backend }
    }

    async fn ensure_catalog(&self, context: &Context) {
        if claim_types(context).await.is_some() {
            return;
        }
        match self.backend.claim_types().await {
            Ok(types) => context.set(session_keys::CLAIM_TYPES, types).await,
            Err(e) => {
                let session_id = session_id(context).await;
                warn!(session_id = %session_id, error = %e, "Loading claim types failed");
                notify(context, format!("Could not load claim types: {e}")).await;
            }
        }
    }
}

#[async_trait]
impl Task for ClaimTypeSelectionTask {
    fn id(&self) -> &str {
        ClaimStage::SelectingClaimType.as_str()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        self.ensure_catalog(&context).await;

        let Some(event) = take_event(&context).await else {
            let employee = employee(&context).await?;
            return Ok(present(
                format!("Select a claim type for {}", employee.name),
                "Waiting for claim type",
            ));
        };

        if let Some(result) = handle_employee_change(&context, &event).await {
            return Ok(result);
        }

        match event {
            ClaimEvent::ChooseClaimType { code } => choose_claim_type(&context, &code).await,
            other => Ok(unavailable(&other, ClaimStage::SelectingClaimType)),
        }
    }
}

/// Duplicate check fired as soon as a claim type is chosen
pub struct ClaimTypeVerificationTask {
    backend: Arc<dyn ClaimsBackend>,
}

impl ClaimTypeVerificationTask {
    pub fn new(backend: Arc<dyn ClaimsBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Task for ClaimTypeVerificationTask {
    fn id(&self) -> &str {
        ClaimStage::VerifyingClaimType.as_str()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let session_id = session_id(&context).await;
        let provider = provider(&context).await?;
        let mut draft = draft(&context).await;

        let Some(claim_code) = draft.claim_type_code.clone() else {
            return Ok(TaskResult::new(
                None,
                NextAction::GoToAndExecute(ClaimStage::SelectingClaimType.as_str().to_string()),
            ));
        };

        let request = VerifyClaimRequest {
            user_id: provider.user_id,
            employee_no: draft.employee_number.clone(),
            claim_code: claim_code.clone(),
            amount: None,
            description: None,
        };

        info!(
            session_id = %session_id,
            task_id = %self.id(),
            claim_code = %claim_code,
            "Verifying claim type"
        );
        set_loading(&context, ClaimStage::VerifyingClaimType).await;

        let generation = context.run_generation();
        let outcome = self.backend.verify_claim(&request).await;
        if !context.is_current(generation) {
            info!(session_id = %session_id, claim_code = %claim_code, "Dropping stale verification");
            return Ok(superseded());
        }
        clear_loading(&context).await;

        match outcome {
            Ok(verification) => {
                let duplicate = verification.is_duplicate();
                info!(
                    session_id = %session_id,
                    task_id = %self.id(),
                    claim_code = %claim_code,
                    duplicate,
                    previous_claim_id = ?verification.previous_claim_id,
                    "Claim type verified"
                );
                context.set(session_keys::VERIFICATION, verification).await;
                context.set(session_keys::WARNING_ACKNOWLEDGED, false).await;

                let status_message = if duplicate {
                    format!("Claim type {claim_code} has a claim in the last 90 days")
                } else {
                    format!("Claim type {claim_code} verified")
                };
                Ok(TaskResult::new_with_status(
                    None,
                    NextAction::ContinueAndExecute,
                    Some(status_message),
                ))
            }
            Err(e) => {
                warn!(session_id = %session_id, claim_code = %claim_code, error = %e, "Claim type verification failed");
                let label = claim_label(&context, &claim_code).await;
                clear_claim_type_results(&context).await;
                draft.claim_type_code = None;
                save_draft(&context, &draft).await;
                notify(&context, format!("Could not verify {label}: {e}")).await;

                Ok(TaskResult::new_with_status(
                    None,
                    NextAction::GoToAndExecute(ClaimStage::SelectingClaimType.as_str().to_string()),
                    Some("Claim type verification failed".to_string()),
                ))
            }
        }
    }
}
