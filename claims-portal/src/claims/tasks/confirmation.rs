use async_trait::async_trait;
use portal_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, warn};

use super::common::{
    claim_label, clear_loading, draft, employee, handle_employee_change, notify, present,
    provider, session_id, set_loading, superseded, take_event, unavailable,
};
use crate::backend::ClaimsBackend;
use crate::claims::events::ClaimEvent;
use crate::claims::keys::session_keys;
use crate::claims::stage::ClaimStage;
use crate::models::{ClaimDraft, EmployeeRecord, VerifyClaimRequest};

/// Read-only summary shown before the claim is filed
pub fn summary(employee: &EmployeeRecord, draft: &ClaimDraft, claim_label: &str) -> String {
    let documents = if draft.supporting_documents.is_empty() {
        "none".to_string()
    } else {
        draft
            .supporting_documents
            .iter()
            .map(|doc| doc.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "Employee: {} ({})\nClaim type: {}\nAmount: {:.2}\nDescription: {}\nDocuments: {}",
        employee.name, draft.employee_number, claim_label, draft.amount, draft.description, documents
    )
}

/// Re-verifies the full claim once the details are in
pub struct FinalVerificationTask {
    backend: Arc<dyn ClaimsBackend>,
}

impl FinalVerificationTask {
    pub fn new(backend: Arc<dyn ClaimsBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Task for FinalVerificationTask {
    fn id(&self) -> &str {
        ClaimStage::FinalVerifying.as_str()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let session_id = session_id(&context).await;
        let provider = provider(&context).await?;
        let draft = draft(&context).await;
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
            amount: Some(draft.amount),
            description: Some(draft.description.clone()),
        };
        set_loading(&context, ClaimStage::FinalVerifying).await;

        let generation = context.run_generation();
        let outcome = self.backend.verify_claim(&request).await;
        if !context.is_current(generation) {
            return Ok(superseded());
        }
        clear_loading(&context).await;

        match outcome {
            Ok(verification) => {
                info!(
                    session_id = %session_id,
                    task_id = %self.id(),
                    claim_code = %claim_code,
                    amount = draft.amount,
                    "Claim verified for confirmation"
                );
                context.set(session_keys::FINAL_VERIFICATION, verification).await;
                Ok(TaskResult::new_with_status(
                    None,
                    NextAction::ContinueAndExecute,
                    Some("Claim verified - awaiting confirmation".to_string()),
                ))
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Final claim verification failed");
                notify(&context, format!("Could not verify the claim: {e}")).await;
                Ok(TaskResult::new_with_status(
                    None,
                    NextAction::GoTo(ClaimStage::MainForm.as_str().to_string()),
                    Some("Final verification failed".to_string()),
                ))
            }
        }
    }
}

/// Waits for "Add Claim" or "Back" on the summary
pub struct ConfirmationTask;

#[async_trait]
impl Task for ConfirmationTask {
    fn id(&self) -> &str {
        ClaimStage::FinalConfirmation.as_str()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let Some(event) = take_event(&context).await else {
            let employee = employee(&context).await?;
            let draft = draft(&context).await;
            let label = match &draft.claim_type_code {
                Some(code) => claim_label(&context, code).await,
                None => "unknown".to_string(),
            };
            return Ok(present(
                summary(&employee, &draft, &label),
                "Waiting for claim confirmation",
            ));
        };

        if let Some(result) = handle_employee_change(&context, &event).await {
            return Ok(result);
        }

        match event {
            ClaimEvent::Back => {
                context.remove(session_keys::FINAL_VERIFICATION).await;
                Ok(TaskResult::new_with_status(
                    None,
                    NextAction::GoToAndExecute(ClaimStage::MainForm.as_str().to_string()),
                    Some("Back to claim details".to_string()),
                ))
            }
            ClaimEvent::AddClaim => {
                context.set(session_keys::SUBMITTING, true).await;
                Ok(TaskResult::new_with_status(
                    None,
                    NextAction::ContinueAndExecute,
                    Some("Submitting claim".to_string()),
                ))
            }
            other => Ok(unavailable(&other, ClaimStage::FinalConfirmation)),
        }
    }
}
