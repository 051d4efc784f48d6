use async_trait::async_trait;
use portal_flow::{Context, NextAction, Result, Task, TaskResult};
use tracing::info;

use super::common::{
    choose_claim_type, handle_employee_change, present, session_id, take_event, unavailable,
};
use crate::claims::events::ClaimEvent;
use crate::claims::keys::session_keys;
use crate::claims::stage::ClaimStage;
use crate::models::ClaimVerificationResult;

pub fn warning_text(verification: &ClaimVerificationResult) -> String {
    format!(
        "A {} claim (#{}) of {:.2} was filed on {}: {}. Proceed?",
        verification.claim_label.as_deref().unwrap_or("similar"),
        verification.previous_claim_id.unwrap_or_default(),
        verification.previous_claim_amount.unwrap_or_default(),
        verification
            .previous_claim_date_time
            .as_deref()
            .unwrap_or("an earlier date"),
        verification
            .previous_claim_description
            .as_deref()
            .unwrap_or("no description"),
    )
}

/// Blocks the claim until the user acknowledges a claim filed within the last 90 days
pub struct DuplicateWarningTask;

#[async_trait]
impl Task for DuplicateWarningTask {
    fn id(&self) -> &str {
        ClaimStage::DuplicateWarning.as_str()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let Some(event) = take_event(&context).await else {
            let verification: ClaimVerificationResult = context
                .get(session_keys::VERIFICATION)
                .await
                .unwrap_or_default();
            return Ok(present(
                warning_text(&verification),
                "Waiting for duplicate claim acknowledgment",
            ));
        };

        if let Some(result) = handle_employee_change(&context, &event).await {
            return Ok(result);
        }

        match event {
            ClaimEvent::AcknowledgeWarning => {
                let session_id = session_id(&context).await;
                info!(
                    session_id = %session_id,
                    task_id = %self.id(),
                    "Duplicate claim warning acknowledged"
                );
                context.set(session_keys::WARNING_ACKNOWLEDGED, true).await;
                Ok(TaskResult::new_with_status(
                    None,
                    NextAction::ContinueAndExecute,
                    Some("Duplicate warning acknowledged".to_string()),
                ))
            }
            ClaimEvent::ChooseClaimType { code } => choose_claim_type(&context, &code).await,
            other => Ok(unavailable(&other, ClaimStage::DuplicateWarning)),
        }
    }
}
