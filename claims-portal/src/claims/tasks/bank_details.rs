use async_trait::async_trait;
use portal_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, warn};

use super::common::{
    clear_loading, draft, employee, handle_employee_change, notify, present, session_id,
    set_field_errors, set_loading, stay, superseded, take_event, unavailable,
};
use crate::backend::ClaimsBackend;
use crate::claims::events::ClaimEvent;
use crate::claims::keys::session_keys;
use crate::claims::stage::{ClaimStage, EmployeeLookup};
use crate::error::FieldErrors;
use crate::models::{BankDetails, BankDetailsInput, EmployeeRecord};

pub fn validate_bank_details(input: &BankDetailsInput) -> FieldErrors {
    let mut errors = FieldErrors::new();
    let required = [
        ("bank.bankName", &input.bank_name),
        ("bank.branchNumber", &input.branch_number),
        ("bank.branchName", &input.branch_name),
        ("bank.accountNumber", &input.account_number),
        ("bank.accountName", &input.account_name),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            errors.insert(field.to_string(), "Required".to_string());
        }
    }
    for (field, value) in [
        ("bank.branchNumber", &input.branch_number),
        ("bank.accountNumber", &input.account_number),
    ] {
        let value = value.trim();
        if !value.is_empty() && !value.chars().all(|c| c.is_ascii_digit()) {
            errors.insert(field.to_string(), "Digits only".to_string());
        }
    }
    errors
}

/// Captures bank details for PSNA policy holders that have none on file
pub struct BankDetailsTask {
    backend: Arc<dyn ClaimsBackend>,
}

impl BankDetailsTask {
    pub fn new(backend: Arc<dyn ClaimsBackend>) -> Self {
        Self { backend }
    }

    async fn submit(&self, context: Context, input: BankDetailsInput) -> Result<TaskResult> {
        let session_id = session_id(&context).await;

        let errors = validate_bank_details(&input);
        if !errors.is_empty() {
            set_field_errors(&context, &errors).await;
            return Ok(stay(Some("Check the highlighted bank details".to_string())));
        }

        let employee = employee(&context).await?;
        let details = BankDetails::for_policy_holder(input, employee.id.clone());
        set_loading(&context, ClaimStage::BankDetailsRequired).await;

        let generation = context.run_generation();
        let saved = self.backend.add_bank(&details).await;
        if !context.is_current(generation) {
            return Ok(superseded());
        }

        if let Err(e) = saved {
            clear_loading(&context).await;
            warn!(session_id = %session_id, error = %e, "Adding bank details failed");
            notify(&context, format!("Could not save bank details: {e}")).await;
            return Ok(stay(None));
        }
        context.set(session_keys::BANK_DETAILS_ADDED, true).await;

        // Refetch so the gate opens on what the backend now reports
        let employee_number = draft(&context).await.employee_number;
        let refreshed = self.backend.find_policy_holder(&employee_number).await;
        if !context.is_current(generation) {
            return Ok(superseded());
        }
        clear_loading(&context).await;

        let record = match refreshed {
            Ok(Some(holder)) => EmployeeRecord::from_lookup(holder),
            Ok(None) => None,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Refetching employee failed");
                None
            }
        };

        match record {
            Some(record) if record.has_bank_details => {
                info!(
                    session_id = %session_id,
                    task_id = %self.id(),
                    policy_holder_id = %record.id,
                    "Bank details added, gate open"
                );
                context.set(session_keys::LOOKUP, EmployeeLookup::Valid(record)).await;
                Ok(TaskResult::new_with_status(
                    None,
                    NextAction::ContinueAndExecute,
                    Some("Bank details added".to_string()),
                ))
            }
            _ => Ok(present(
                "Bank details were saved but are not on the policy holder yet. Try again shortly.",
                "Waiting for bank details to appear",
            )),
        }
    }
}

#[async_trait]
impl Task for BankDetailsTask {
    fn id(&self) -> &str {
        ClaimStage::BankDetailsRequired.as_str()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let Some(event) = take_event(&context).await else {
            let employee = employee(&context).await?;
            return Ok(present(
                format!(
                    "{} has no bank details on file. Add them before filing a claim.",
                    employee.name
                ),
                "Bank details required",
            ));
        };

        if let Some(result) = handle_employee_change(&context, &event).await {
            return Ok(result);
        }

        match event {
            ClaimEvent::SubmitBankDetails { details } => self.submit(context, details).await,
            other => Ok(unavailable(&other, ClaimStage::BankDetailsRequired)),
        }
    }
}
