mod bank_details;
mod claim_type;
mod common;
mod confirmation;
mod duplicate_warning;
mod employee_lookup;
mod main_form;
mod submit;

pub use bank_details::{BankDetailsTask, validate_bank_details};
pub use claim_type::{ClaimTypeSelectionTask, ClaimTypeVerificationTask};
pub use confirmation::{ConfirmationTask, FinalVerificationTask, summary};
pub use duplicate_warning::{DuplicateWarningTask, warning_text};
pub use employee_lookup::{EmployeeLookupTask, MIN_EMPLOYEE_NUMBER_LEN, can_search};
pub use main_form::{Attachments, ClaimDetailsTask, validate_details};
pub use submit::SubmitClaimTask;
