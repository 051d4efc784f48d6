use async_trait::async_trait;
use portal_flow::{Context, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::{info, warn};

use super::common::{
    clear_loading, draft, field_error, present, reset_employee, save_draft, session_id,
    set_loading, stay, superseded, take_event, unavailable,
};
use crate::backend::ClaimsBackend;
use crate::claims::events::ClaimEvent;
use crate::claims::keys::session_keys;
use crate::claims::stage::{ClaimStage, EmployeeLookup};
use crate::models::EmployeeRecord;

/// Shortest employee number the search accepts
pub const MIN_EMPLOYEE_NUMBER_LEN: usize = 3;

const INVALID_EMPLOYEE: &str = "Invalid Employee ID";

pub fn can_search(employee_number: &str) -> bool {
    employee_number.trim().chars().count() >= MIN_EMPLOYEE_NUMBER_LEN
}

/// Resolves the employee number to a policy holder
pub struct EmployeeLookupTask {
    backend: Arc<dyn ClaimsBackend>,
}

impl EmployeeLookupTask {
    pub fn new(backend: Arc<dyn ClaimsBackend>) -> Self {
        Self { backend }
    }

    async fn search(&self, context: Context, employee_number: String) -> Result<TaskResult> {
        let session_id = session_id(&context).await;
        let employee_number = employee_number.trim().to_string();

        if !can_search(&employee_number) {
            field_error(
                &context,
                "employeeNumber",
                "Enter at least 3 characters to search",
            )
            .await;
            return Ok(stay(None));
        }

        let mut draft = draft(&context).await;
        draft.employee_number = employee_number.clone();
        save_draft(&context, &draft).await;
        context.set(session_keys::LOOKUP, EmployeeLookup::Loading).await;
        set_loading(&context, ClaimStage::NoEmployee).await;

        info!(
            session_id = %session_id,
            task_id = %self.id(),
            employee_number = %employee_number,
            "Looking up employee"
        );

        let generation = context.run_generation();
        let outcome = self.backend.find_policy_holder(&employee_number).await;
        if !context.is_current(generation) {
            return Ok(superseded());
        }
        clear_loading(&context).await;

        let record = match outcome {
            Ok(Some(holder)) => EmployeeRecord::from_lookup(holder),
            Ok(None) => None,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Employee lookup failed");
                None
            }
        };

        let Some(record) = record else {
            context.set(session_keys::LOOKUP, EmployeeLookup::Invalid).await;
            return Ok(present(INVALID_EMPLOYEE, "Employee lookup returned no usable record"));
        };

        let status_message = format!(
            "Employee {} resolved to {} (bank details on file: {})",
            employee_number, record.name, record.has_bank_details
        );
        info!(
            session_id = %session_id,
            task_id = %self.id(),
            policy_holder_id = %record.id,
            has_bank_details = record.has_bank_details,
            "Employee resolved"
        );
        context.set(session_keys::LOOKUP, EmployeeLookup::Valid(record)).await;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(status_message),
        ))
    }
}

#[async_trait]
impl Task for EmployeeLookupTask {
    fn id(&self) -> &str {
        ClaimStage::NoEmployee.as_str()
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        let Some(event) = take_event(&context).await else {
            return Ok(present(
                "Enter the employee number to start a claim",
                "Waiting for employee number",
            ));
        };

        match event {
            ClaimEvent::SearchEmployee { employee_number } => {
                self.search(context, employee_number).await
            }
            ClaimEvent::EditEmployeeNumber { employee_number } => {
                reset_employee(&context, employee_number).await;
                Ok(stay(None))
            }
            ClaimEvent::ResetEmployee => {
                reset_employee(&context, String::new()).await;
                Ok(stay(None))
            }
            other => Ok(unavailable(&other, ClaimStage::NoEmployee)),
        }
    }
}
