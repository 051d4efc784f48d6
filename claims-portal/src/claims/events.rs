use serde::{Deserialize, Serialize};

use crate::models::BankDetailsInput;

/// User actions on the claim sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaimEvent {
    SearchEmployee {
        employee_number: String,
    },
    /// The employee number field changed; any resolved record is dropped
    EditEmployeeNumber {
        employee_number: String,
    },
    ResetEmployee,
    SubmitBankDetails {
        details: BankDetailsInput,
    },
    ChooseClaimType {
        code: String,
    },
    AcknowledgeWarning,
    UpdateDetails {
        amount: Option<f64>,
        description: Option<String>,
    },
    AttachDocument {
        name: String,
        mime_type: String,
        content_base64: String,
    },
    RemoveDocument {
        name: String,
    },
    Next,
    Back,
    AddClaim,
    Cancel,
}

impl ClaimEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchEmployee { .. } => "search_employee",
            Self::EditEmployeeNumber { .. } => "edit_employee_number",
            Self::ResetEmployee => "reset_employee",
            Self::SubmitBankDetails { .. } => "submit_bank_details",
            Self::ChooseClaimType { .. } => "choose_claim_type",
            Self::AcknowledgeWarning => "acknowledge_warning",
            Self::UpdateDetails { .. } => "update_details",
            Self::AttachDocument { .. } => "attach_document",
            Self::RemoveDocument { .. } => "remove_document",
            Self::Next => "next",
            Self::Back => "back",
            Self::AddClaim => "add_claim",
            Self::Cancel => "cancel",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_are_tagged_by_type() {
        let event: ClaimEvent =
            serde_json::from_value(json!({ "type": "choose_claim_type", "code": "3" })).unwrap();
        assert_eq!(event, ClaimEvent::ChooseClaimType { code: "3".to_string() });

        let event: ClaimEvent = serde_json::from_value(json!({ "type": "next" })).unwrap();
        assert_eq!(event.name(), "next");
    }
}
