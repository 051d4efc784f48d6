use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use portal_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::common::{clear_loading, draft, notify, provider, session_id, set_loading, superseded};
use super::main_form::Attachments;
use crate::backend::{ClaimsBackend, DocumentStore};
use crate::claims::keys::session_keys;
use crate::claims::stage::ClaimStage;
use crate::models::{
    AddClaimRequest, DocumentKey, FailedUpload, FileRef, SubmittedClaim, UploadReport,
};

const PENDING: &str = "Pending";

/// Files the claim and then pushes its attachments to private storage
pub struct SubmitClaimTask {
    backend: Arc<dyn ClaimsBackend>,
    documents: Arc<dyn DocumentStore>,
}

impl SubmitClaimTask {
    pub fn new(backend: Arc<dyn ClaimsBackend>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { backend, documents }
    }

    /// Uploads run concurrently; one failing file never blocks the others
    async fn upload_all(
        &self,
        user_id: &str,
        claim_id: i64,
        files: &[FileRef],
        attachments: &Attachments,
    ) -> UploadReport {
        let mut report = UploadReport::default();
        let mut uploads = JoinSet::new();

        for file in files {
            let content = attachments
                .get(&file.name)
                .and_then(|encoded| STANDARD.decode(encoded.as_bytes()).ok());
            let Some(content) = content else {
                report.failed.push(FailedUpload {
                    name: file.name.clone(),
                    error: "file content missing".to_string(),
                });
                continue;
            };

            let key = DocumentKey {
                user_id: user_id.to_string(),
                claim_id,
                file_name: file.name.clone(),
            };
            let mime_type = file.mime_type.clone();
            let store = Arc::clone(&self.documents);
            uploads.spawn(async move {
                let outcome = store.upload(&key, content, &mime_type).await;
                (key.file_name, outcome)
            });
        }

        while let Some(joined) = uploads.join_next().await {
            match joined {
                Ok((name, Ok(()))) => report.uploaded.push(name),
                Ok((name, Err(e))) => report.failed.push(FailedUpload {
                    name,
                    error: e.to_string(),
                }),
                Err(e) => error!(error = %e, "Upload task panicked"),
            }
        }

        report.uploaded.sort();
        report.failed.sort_by(|a, b| a.name.cmp(&b.name));
        report
    }
}

#[async_trait]
impl Task for SubmitClaimTask {
    fn id(&self) -> &str {
        ClaimStage::Submitting.as_str()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let session_id = session_id(&context).await;
        let provider = provider(&context).await?;
        let draft = draft(&context).await;
        let claim_code = draft.claim_type_code.clone().unwrap_or_default();

        let request = AddClaimRequest {
            user_id: provider.user_id.clone(),
            employee_no: draft.employee_number.clone(),
            claim_code: claim_code.clone(),
            amount: draft.amount,
            description: draft.description.clone(),
            status: PENDING.to_string(),
            documents: draft.document_names(),
        };
        set_loading(&context, ClaimStage::Submitting).await;

        info!(
            session_id = %session_id,
            task_id = %self.id(),
            claim_code = %claim_code,
            amount = draft.amount,
            "Submitting claim"
        );

        let generation = context.run_generation();
        let outcome = self.backend.add_claim(&request).await;
        if !context.is_current(generation) {
            // The claim may already exist remotely; only the UI update is dropped
            warn!(session_id = %session_id, "Claim submission answered after the sheet moved on");
            return Ok(superseded());
        }

        let receipt = match outcome {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Claim submission failed");
                clear_loading(&context).await;
                context.set(session_keys::SUBMITTING, false).await;
                notify(&context, format!("Could not submit the claim: {e}")).await;
                return Ok(TaskResult::new_with_status(
                    None,
                    NextAction::GoTo(ClaimStage::FinalConfirmation.as_str().to_string()),
                    Some("Claim submission failed".to_string()),
                ));
            }
        };

        let attachments: Attachments = context
            .get(session_keys::ATTACHMENTS)
            .await
            .unwrap_or_default();
        let uploads = self
            .upload_all(
                &provider.user_id,
                receipt.id,
                &draft.supporting_documents,
                &attachments,
            )
            .await;
        if !context.is_current(generation) {
            warn!(
                session_id = %session_id,
                claim_id = receipt.id,
                "Claim filed and uploaded after the sheet moved on"
            );
            return Ok(superseded());
        }

        if uploads.all_succeeded() {
            notify(&context, format!("Claim {} submitted", receipt.id)).await;
        } else {
            let names = uploads
                .failed
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            warn!(
                session_id = %session_id,
                claim_id = receipt.id,
                failed = uploads.failed.len(),
                "Some claim documents failed to upload"
            );
            notify(
                &context,
                format!("Claim {} submitted, but these documents failed to upload: {names}", receipt.id),
            )
            .await;
        }

        info!(
            session_id = %session_id,
            claim_id = receipt.id,
            uploaded = uploads.uploaded.len(),
            "Claim submitted"
        );

        let submitted = SubmittedClaim {
            claim_id: receipt.id,
            employee_number: draft.employee_number,
            claim_type_code: claim_code,
            amount: draft.amount,
            uploads,
        };
        let notice: Option<String> = context.get(session_keys::NOTICE).await;
        context.clear_keys(session_keys::CLAIM_FACTS).await;
        context.clear_prefix(session_keys::EVENT_PREFIX).await;
        if let Some(notice) = notice {
            notify(&context, notice).await;
        }
        context.set(session_keys::LAST_SUBMITTED, submitted).await;

        Ok(TaskResult::new_with_status(
            Some(format!("Claim {} submitted", receipt.id)),
            NextAction::End,
            Some("Claim submitted".to_string()),
        ))
    }
}
