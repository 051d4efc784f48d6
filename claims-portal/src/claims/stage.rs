use portal_flow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::keys::session_keys;
use crate::models::{ClaimDraft, ClaimVerificationResult, EmployeeRecord, ProviderProfile};

/// The single step the claim sheet is on. Each variant is one task in the claim graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStage {
    NoEmployee,
    BankDetailsRequired,
    SelectingClaimType,
    VerifyingClaimType,
    DuplicateWarning,
    MainForm,
    FinalVerifying,
    FinalConfirmation,
    Submitting,
}

impl ClaimStage {
    pub const ALL: [ClaimStage; 9] = [
        ClaimStage::NoEmployee,
        ClaimStage::BankDetailsRequired,
        ClaimStage::SelectingClaimType,
        ClaimStage::VerifyingClaimType,
        ClaimStage::DuplicateWarning,
        ClaimStage::MainForm,
        ClaimStage::FinalVerifying,
        ClaimStage::FinalConfirmation,
        ClaimStage::Submitting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoEmployee => "no_employee",
            Self::BankDetailsRequired => "bank_details_required",
            Self::SelectingClaimType => "selecting_claim_type",
            Self::VerifyingClaimType => "verifying_claim_type",
            Self::DuplicateWarning => "duplicate_warning",
            Self::MainForm => "main_form",
            Self::FinalVerifying => "final_verifying",
            Self::FinalConfirmation => "final_confirmation",
            Self::Submitting => "submitting",
        }
    }

    /// Stages that only exist while a remote call is in flight
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::VerifyingClaimType | Self::FinalVerifying | Self::Submitting
        )
    }
}

impl fmt::Display for ClaimStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown claim stage: {s}"))
    }
}

/// Where the employee number search stands
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "record", rename_all = "snake_case")]
pub enum EmployeeLookup {
    #[default]
    NeverSearched,
    Loading,
    Valid(EmployeeRecord),
    Invalid,
}

impl EmployeeLookup {
    pub fn record(&self) -> Option<&EmployeeRecord> {
        match self {
            Self::Valid(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }
}

/// Facts the claim sheet knows at a point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimFacts {
    pub employee: Option<EmployeeRecord>,
    pub provider_is_psna: bool,
    pub claim_type_code: Option<String>,
    pub verification: Option<ClaimVerificationResult>,
    pub warning_acknowledged: bool,
    pub final_verification: Option<ClaimVerificationResult>,
    pub submitting: bool,
}

impl ClaimFacts {
    pub fn from_context(context: &Context) -> Self {
        let provider: Option<ProviderProfile> = context.get_sync(session_keys::PROVIDER);
        let lookup: EmployeeLookup = context.get_sync(session_keys::LOOKUP).unwrap_or_default();
        let draft: ClaimDraft = context.get_sync(session_keys::DRAFT).unwrap_or_default();

        Self {
            employee: lookup.record().cloned(),
            provider_is_psna: provider.is_some_and(|provider| provider.is_psna),
            claim_type_code: draft.claim_type_code,
            verification: context.get_sync(session_keys::VERIFICATION),
            warning_acknowledged: context
                .get_sync(session_keys::WARNING_ACKNOWLEDGED)
                .unwrap_or(false),
            final_verification: context.get_sync(session_keys::FINAL_VERIFICATION),
            submitting: context.get_sync(session_keys::SUBMITTING).unwrap_or(false),
        }
    }

    /// The stage these facts imply. Graph edges route with this, so the stored stage and the
    /// facts cannot disagree.
    pub fn stage(&self) -> ClaimStage {
        let Some(employee) = &self.employee else {
            return ClaimStage::NoEmployee;
        };
        if self.provider_is_psna && !employee.has_bank_details {
            return ClaimStage::BankDetailsRequired;
        }
        if self.claim_type_code.is_none() {
            return ClaimStage::SelectingClaimType;
        }
        if self.submitting {
            return ClaimStage::Submitting;
        }
        let Some(verification) = &self.verification else {
            return ClaimStage::VerifyingClaimType;
        };
        if verification.is_duplicate() && !self.warning_acknowledged {
            return ClaimStage::DuplicateWarning;
        }
        if self.final_verification.is_some() {
            return ClaimStage::FinalConfirmation;
        }
        ClaimStage::MainForm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee(has_bank_details: bool) -> EmployeeRecord {
        EmployeeRecord {
            id: "ph-1".to_string(),
            name: "Mary Kila".to_string(),
            gender: Some("F".to_string()),
            date_of_birth: Some("1988-02-14".to_string()),
            has_bank_details,
        }
    }

    fn verification(id: Option<i64>, amount: Option<f64>) -> ClaimVerificationResult {
        ClaimVerificationResult {
            claim_label: Some("GP Consultation".to_string()),
            previous_claim_id: id,
            previous_claim_amount: amount,
            ..Default::default()
        }
    }

    fn chosen(verification: Option<ClaimVerificationResult>) -> ClaimFacts {
        ClaimFacts {
            employee: Some(employee(true)),
            claim_type_code: Some("3".to_string()),
            verification,
            ..Default::default()
        }
    }

    #[test]
    fn stage_names_round_trip() {
        for stage in ClaimStage::ALL {
            assert_eq!(stage.as_str().parse::<ClaimStage>(), Ok(stage));
        }
        assert!("sheet_closed".parse::<ClaimStage>().is_err());
    }

    #[test]
    fn psna_provider_without_bank_details_is_gated() {
        let mut facts = ClaimFacts {
            employee: Some(employee(false)),
            provider_is_psna: true,
            ..Default::default()
        };
        assert_eq!(facts.stage(), ClaimStage::BankDetailsRequired);

        facts.provider_is_psna = false;
        assert_eq!(facts.stage(), ClaimStage::SelectingClaimType);

        facts.provider_is_psna = true;
        facts.employee = Some(employee(true));
        assert_eq!(facts.stage(), ClaimStage::SelectingClaimType);
    }

    #[test]
    fn duplicate_result_requires_acknowledgment() {
        let mut facts = chosen(Some(verification(Some(7), Some(150.0))));
        assert_eq!(facts.stage(), ClaimStage::DuplicateWarning);

        facts.warning_acknowledged = true;
        assert_eq!(facts.stage(), ClaimStage::MainForm);
    }

    #[test]
    fn clean_result_goes_straight_to_main_form() {
        let facts = chosen(Some(verification(Some(0), None)));
        assert_eq!(facts.stage(), ClaimStage::MainForm);
    }

    #[test]
    fn in_flight_and_confirmation_stages() {
        assert_eq!(chosen(None).stage(), ClaimStage::VerifyingClaimType);

        let mut facts = chosen(Some(verification(Some(0), None)));
        facts.final_verification = Some(verification(Some(0), None));
        assert_eq!(facts.stage(), ClaimStage::FinalConfirmation);

        facts.submitting = true;
        assert_eq!(facts.stage(), ClaimStage::Submitting);
        assert!(facts.stage().is_transient());
    }

    #[test]
    fn empty_facts_mean_no_employee() {
        assert_eq!(ClaimFacts::default().stage(), ClaimStage::NoEmployee);
    }
}
