use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use portal_flow::{Context, NextAction, Result, Task, TaskResult};
use std::collections::BTreeMap;
use tracing::info;

use super::common::{
    choose_claim_type, draft, field_error, handle_employee_change, present, save_draft,
    session_id, set_field_errors, stay, take_event, unavailable,
};
use crate::claims::events::ClaimEvent;
use crate::claims::keys::session_keys;
use crate::claims::stage::ClaimStage;
use crate::error::FieldErrors;
use crate::models::{ClaimDraft, FileRef, is_safe_file_name};

/// Attachment bytes by file name, base64 encoded
pub type Attachments = BTreeMap<String, String>;

pub fn validate_details(draft: &ClaimDraft) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if !draft.amount.is_finite() || draft.amount <= 0.0 {
        errors.insert(
            "amount".to_string(),
            "Enter an amount greater than zero".to_string(),
        );
    }
    if draft.description.trim().is_empty() {
        errors.insert("description".to_string(), "Required".to_string());
    }
    errors
}

/// Amount, description and attachments for the chosen claim type
pub struct ClaimDetailsTask;

impl ClaimDetailsTask {
    async fn attach(
        &self,
        context: &Context,
        name: String,
        mime_type: String,
        content_base64: String,
    ) -> TaskResult {
        let name = name.trim().to_string();
        if name.is_empty() {
            field_error(context, "supportingDocuments", "File name is required").await;
            return stay(None);
        }
        if !is_safe_file_name(&name) {
            field_error(
                context,
                "supportingDocuments",
                "File names cannot contain path separators",
            )
            .await;
            return stay(None);
        }
        let Ok(bytes) = STANDARD.decode(content_base64.as_bytes()) else {
            field_error(context, "supportingDocuments", &format!("Could not read {name}")).await;
            return stay(None);
        };

        let mut draft = draft(context).await;
        let mut attachments: Attachments = context
            .get(session_keys::ATTACHMENTS)
            .await
            .unwrap_or_default();

        draft.supporting_documents.retain(|doc| doc.name != name);
        draft.supporting_documents.push(FileRef {
            name: name.clone(),
            size: bytes.len() as u64,
            mime_type,
        });
        attachments.insert(name, content_base64);

        save_draft(context, &draft).await;
        context.set(session_keys::ATTACHMENTS, attachments).await;
        stay(None)
    }

    async fn remove(&self, context: &Context, name: &str) -> TaskResult {
        let mut draft = draft(context).await;
        let mut attachments: Attachments = context
            .get(session_keys::ATTACHMENTS)
            .await
            .unwrap_or_default();

        draft.supporting_documents.retain(|doc| doc.name != name);
        attachments.remove(name);

        save_draft(context, &draft).await;
        context.set(session_keys::ATTACHMENTS, attachments).await;
        stay(None)
    }
}

#[async_trait]
impl Task for ClaimDetailsTask {
    fn id(&self) -> &str {
        ClaimStage::MainForm.as_str()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let Some(event) = take_event(&context).await else {
            return Ok(present(
                "Enter the claim amount, a description and any supporting documents",
                "Waiting for claim details",
            ));
        };

        if let Some(result) = handle_employee_change(&context, &event).await {
            return Ok(result);
        }

        match event {
            ClaimEvent::UpdateDetails {
                amount,
                description,
            } => {
                let mut draft = draft(&context).await;
                if let Some(amount) = amount {
                    draft.amount = amount;
                }
                if let Some(description) = description {
                    draft.description = description;
                }
                save_draft(&context, &draft).await;
                Ok(stay(None))
            }
            ClaimEvent::AttachDocument {
                name,
                mime_type,
                content_base64,
            } => Ok(self.attach(&context, name, mime_type, content_base64).await),
            ClaimEvent::RemoveDocument { name } => Ok(self.remove(&context, &name).await),
            ClaimEvent::ChooseClaimType { code } => choose_claim_type(&context, &code).await,
            ClaimEvent::Next => {
                let draft = draft(&context).await;
                let errors = validate_details(&draft);
                if !errors.is_empty() {
                    set_field_errors(&context, &errors).await;
                    return Ok(stay(Some("Fix the highlighted fields".to_string())));
                }

                let session_id = session_id(&context).await;
                info!(
                    session_id = %session_id,
                    task_id = %self.id(),
                    amount = draft.amount,
                    documents = draft.supporting_documents.len(),
                    "Claim details complete"
                );
                Ok(TaskResult::new_with_status(
                    None,
                    NextAction::ContinueAndExecute,
                    Some("Claim details entered - verifying".to_string()),
                ))
            }
            other => Ok(unavailable(&other, ClaimStage::MainForm)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_need_positive_amount_and_description() {
        let mut draft = ClaimDraft::default();
        let errors = validate_details(&draft);
        assert!(errors.contains_key("amount"));
        assert!(errors.contains_key("description"));

        draft.amount = f64::NAN;
        draft.description = "checkup".to_string();
        assert_eq!(validate_details(&draft).len(), 1);

        draft.amount = 150.0;
        assert!(validate_details(&draft).is_empty());
    }
}
