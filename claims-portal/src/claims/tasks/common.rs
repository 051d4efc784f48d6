use portal_flow::{Context, GraphError, NextAction, Result, TaskResult};
use tracing::info;

use crate::claims::events::ClaimEvent;
use crate::claims::keys::session_keys;
use crate::claims::stage::{ClaimFacts, ClaimStage, EmployeeLookup};
use crate::error::FieldErrors;
use crate::models::{ClaimDraft, ClaimType, EmployeeRecord, ProviderProfile};

pub async fn session_id(context: &Context) -> String {
    context
        .get::<String>(session_keys::SESSION_ID)
        .await
        .unwrap_or_else(|| "unknown".to_string())
}

/// Event of the request this run belongs to; only the first task of a run sees it
pub async fn take_event(context: &Context) -> Option<ClaimEvent> {
    context
        .take(&session_keys::event_key(context.run_generation()))
        .await
}

pub async fn provider(context: &Context) -> Result<ProviderProfile> {
    context
        .get(session_keys::PROVIDER)
        .await
        .ok_or_else(|| GraphError::ContextError("provider not found".to_string()))
}

pub async fn draft(context: &Context) -> ClaimDraft {
    context.get(session_keys::DRAFT).await.unwrap_or_default()
}

pub async fn save_draft(context: &Context, draft: &ClaimDraft) {
    context.set(session_keys::DRAFT, draft).await;
}

pub async fn employee(context: &Context) -> Result<EmployeeRecord> {
    ClaimFacts::from_context(context)
        .employee
        .ok_or_else(|| GraphError::ContextError("employee record not found".to_string()))
}

pub async fn claim_types(context: &Context) -> Option<Vec<ClaimType>> {
    context.get(session_keys::CLAIM_TYPES).await
}

pub async fn claim_label(context: &Context, code: &str) -> String {
    claim_types(context)
        .await
        .and_then(|types| types.into_iter().find(|t| t.id == code))
        .map(|t| t.label)
        .unwrap_or_else(|| code.to_string())
}

pub async fn set_loading(context: &Context, stage: ClaimStage) {
    context.set(session_keys::LOADING, stage).await;
}

pub async fn clear_loading(context: &Context) {
    context.remove(session_keys::LOADING).await;
}

/// Toast-style message for the next response
pub async fn notify(context: &Context, message: impl Into<String>) {
    context.set(session_keys::NOTICE, message.into()).await;
}

pub async fn set_field_errors(context: &Context, errors: &FieldErrors) {
    context.set(session_keys::FIELD_ERRORS, errors).await;
}

pub async fn field_error(context: &Context, field: &str, message: &str) {
    let mut errors = FieldErrors::new();
    errors.insert(field.to_string(), message.to_string());
    set_field_errors(context, &errors).await;
}

/// Show the current stage and wait for the user
pub fn present(response: impl Into<String>, status: impl Into<String>) -> TaskResult {
    TaskResult::new_with_status(
        Some(response.into()),
        NextAction::WaitForInput,
        Some(status.into()),
    )
}

pub fn stay(response: Option<String>) -> TaskResult {
    TaskResult::new(response, NextAction::WaitForInput)
}

/// Outcome of a step whose remote answer arrived after a newer request; the runner drops it
pub fn superseded() -> TaskResult {
    TaskResult::new(None, NextAction::WaitForInput)
}

pub fn unavailable(event: &ClaimEvent, stage: ClaimStage) -> TaskResult {
    stay(Some(format!(
        "{} is not available on {}",
        event.name(),
        stage.as_str()
    )))
}

/// Drop everything derived from the claim type: verification results and acknowledgment
pub async fn clear_claim_type_results(context: &Context) {
    context
        .clear_keys(&[
            session_keys::VERIFICATION,
            session_keys::WARNING_ACKNOWLEDGED,
            session_keys::FINAL_VERIFICATION,
            session_keys::SUBMITTING,
        ])
        .await;
}

/// Forget the resolved employee and everything that depended on it
pub async fn reset_employee(context: &Context, employee_number: String) {
    clear_claim_type_results(context).await;
    context
        .clear_keys(&[
            session_keys::ATTACHMENTS,
            session_keys::BANK_DETAILS_ADDED,
            session_keys::LOADING,
            session_keys::FIELD_ERRORS,
        ])
        .await;
    context
        .set(session_keys::LOOKUP, EmployeeLookup::NeverSearched)
        .await;
    save_draft(
        context,
        &ClaimDraft {
            employee_number,
            ..Default::default()
        },
    )
    .await;
}

/// Employee-number edits are accepted on every stage past the lookup
pub async fn handle_employee_change(context: &Context, event: &ClaimEvent) -> Option<TaskResult> {
    // The resolved record is reused for the number it was fetched for
    if let ClaimEvent::SearchEmployee { employee_number } = event {
        let employee_number = employee_number.trim();
        if employee_number == draft(context).await.employee_number {
            return Some(stay(None));
        }

        // Another number: forget the record and hand the search back to the lookup stage
        let session_id = session_id(context).await;
        info!(
            session_id = %session_id,
            employee_number = %employee_number,
            "Searching a different employee, returning to lookup"
        );
        reset_employee(context, employee_number.to_string()).await;
        context
            .set(session_keys::event_key(context.run_generation()), event)
            .await;
        return Some(TaskResult::new_with_status(
            None,
            NextAction::GoToAndExecute(ClaimStage::NoEmployee.as_str().to_string()),
            Some("Searching for another employee".to_string()),
        ));
    }

    let employee_number = match event {
        ClaimEvent::EditEmployeeNumber { employee_number } => {
            let current = draft(context).await.employee_number;
            if *employee_number == current {
                return Some(stay(None));
            }
            employee_number.clone()
        }
        ClaimEvent::ResetEmployee => String::new(),
        _ => return None,
    };

    let session_id = session_id(context).await;
    info!(
        session_id = %session_id,
        event = event.name(),
        "Employee changed, returning to lookup"
    );
    reset_employee(context, employee_number).await;
    Some(TaskResult::new_with_status(
        None,
        NextAction::GoTo(ClaimStage::NoEmployee.as_str().to_string()),
        Some("Employee cleared".to_string()),
    ))
}

/// Record the chosen claim type and hand over to verification.
///
/// Choosing always starts from a clean slate so repeating a choice repeats the outcome.
pub async fn choose_claim_type(context: &Context, code: &str) -> Result<TaskResult> {
    if let Some(types) = claim_types(context).await {
        if !types.iter().any(|t| t.id == code) {
            field_error(context, "claimTypeCode", "Unknown claim type").await;
            return Ok(stay(Some(format!("Unknown claim type {code}"))));
        }
    }

    clear_claim_type_results(context).await;
    let mut draft = draft(context).await;
    draft.claim_type_code = Some(code.to_string());
    save_draft(context, &draft).await;

    Ok(TaskResult::new_with_status(
        None,
        NextAction::GoToAndExecute(ClaimStage::VerifyingClaimType.as_str().to_string()),
        Some(format!("Claim type {code} chosen - verifying")),
    ))
}
