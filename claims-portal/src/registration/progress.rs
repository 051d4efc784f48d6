//! Completion tracking for the registration wizard.
//!
//! A field counts as complete when it holds a filled value and carries no validation error.
//! Percentages are computed over every step of the form, not only the one on screen.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

use super::FieldErrors;
use super::form::FormStep;

/// Value at a possibly nested `parent.child` path
pub fn field_value<'a>(values: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(values, |current, key| current.as_object()?.get(key))
}

/// JavaScript truthiness, except that an empty list does not count as filled
pub fn is_filled(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(_)) => true,
    }
}

fn is_complete(values: &Value, errors: &FieldErrors, path: &str) -> bool {
    is_filled(field_value(values, path)) && !errors.contains_key(path)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsectionStatus {
    pub step_id: &'static str,
    pub subsection_id: &'static str,
    pub step_index: usize,
    pub is_valid: bool,
    pub invalid_count: usize,
    pub is_started: bool,
    /// Warning badge visible for the wizard position the report was built for
    pub show_warning: bool,
}

impl SubsectionStatus {
    /// Warning badge: incomplete, and the user has touched it or already moved past its step
    pub fn needs_badge(&self, visited: bool, current_step: usize) -> bool {
        !self.is_valid && (self.is_started || visited || self.step_index < current_step)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub percent: u8,
    pub completed: usize,
    pub total: usize,
    pub subsections: Vec<SubsectionStatus>,
}

impl ProgressReport {
    pub fn subsection(&self, subsection_id: &str) -> Option<&SubsectionStatus> {
        self.subsections
            .iter()
            .find(|status| status.subsection_id == subsection_id)
    }

    /// Recompute the warning badges for the step on screen and the subsections already opened
    pub fn with_badges(mut self, visited: &HashSet<String>, current_step: usize) -> Self {
        for status in &mut self.subsections {
            let opened = visited.contains(status.subsection_id);
            status.show_warning = status.needs_badge(opened, current_step);
        }
        self
    }
}

pub fn compute_progress(values: &Value, errors: &FieldErrors, steps: &[FormStep]) -> ProgressReport {
    let mut completed = 0;
    let mut total = 0;
    let mut subsections = Vec::new();

    for (step_index, step) in steps.iter().enumerate() {
        for subsection in step.subsections {
            let done = subsection
                .fields
                .iter()
                .filter(|path| is_complete(values, errors, path))
                .count();
            let started = subsection
                .fields
                .iter()
                .any(|path| is_filled(field_value(values, path)));

            completed += done;
            total += subsection.fields.len();
            let is_valid = done == subsection.fields.len();
            subsections.push(SubsectionStatus {
                step_id: step.id,
                subsection_id: subsection.id,
                step_index,
                is_valid,
                invalid_count: subsection.fields.len() - done,
                is_started: started,
                show_warning: !is_valid && started,
            });
        }
    }

    let percent = if total == 0 {
        0
    } else {
        ((completed as f64 / total as f64) * 100.0).round() as u8
    };

    ProgressReport {
        percent,
        completed,
        total,
        subsections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::form::Subsection;
    use serde_json::json;

    const STEPS: &[FormStep] = &[
        FormStep {
            id: "one",
            title: "One",
            subsections: &[Subsection {
                id: "identity",
                title: "Identity",
                fields: &["name", "contact.phone"],
            }],
        },
        FormStep {
            id: "two",
            title: "Two",
            subsections: &[Subsection {
                id: "bank",
                title: "Bank",
                fields: &["bank.accountNumber", "bank.accountName", "documents"],
            }],
        },
    ];

    #[test]
    fn nested_paths_resolve_through_parent() {
        let values = json!({ "contact": { "phone": "+675 7000 1234" } });
        assert_eq!(
            field_value(&values, "contact.phone"),
            Some(&json!("+675 7000 1234"))
        );
        assert_eq!(field_value(&values, "contact.email"), None);
        assert_eq!(field_value(&values, "name.first"), None);
    }

    #[test]
    fn truthiness_matches_form_semantics() {
        assert!(!is_filled(Some(&json!(""))));
        assert!(!is_filled(Some(&json!(0))));
        assert!(!is_filled(Some(&json!(false))));
        assert!(!is_filled(Some(&json!([]))));
        assert!(is_filled(Some(&json!("x"))));
        assert!(is_filled(Some(&json!(3))));
        assert!(is_filled(Some(&json!({}))));
    }

    #[test]
    fn percent_counts_every_step_and_skips_errored_fields() {
        let values = json!({
            "name": "Kila Clinic",
            "contact": { "phone": "bad" },
            "bank": { "accountNumber": "1000234" }
        });
        let mut errors = FieldErrors::new();
        errors.insert("contact.phone".to_string(), "Invalid phone number".to_string());

        let report = compute_progress(&values, &errors, STEPS);
        assert_eq!(report.total, 5);
        assert_eq!(report.completed, 2);
        assert_eq!(report.percent, 40);

        let identity = report.subsection("identity").unwrap();
        assert!(!identity.is_valid);
        assert_eq!(identity.invalid_count, 1);
        assert!(identity.is_started);
    }

    #[test]
    fn filling_a_field_never_lowers_progress() {
        let before = json!({ "name": "Kila Clinic" });
        let after = json!({ "name": "Kila Clinic", "bank": { "accountName": "Kila" } });
        let errors = FieldErrors::new();

        let a = compute_progress(&before, &errors, STEPS);
        let b = compute_progress(&after, &errors, STEPS);
        assert!(b.percent >= a.percent);
        assert_eq!(compute_progress(&after, &errors, STEPS), b);
    }

    #[test]
    fn empty_form_is_zero_percent() {
        let report = compute_progress(&json!({}), &FieldErrors::new(), &[]);
        assert_eq!(report.percent, 0);
        assert!(report.subsections.is_empty());
    }

    #[test]
    fn warning_badges_need_a_visit_or_progress_past_the_step() {
        let report = compute_progress(&json!({}), &FieldErrors::new(), STEPS);
        let mut visited = HashSet::new();
        let badges = |report: ProgressReport| -> Vec<&'static str> {
            report
                .subsections
                .iter()
                .filter(|status| status.show_warning)
                .map(|status| status.subsection_id)
                .collect()
        };

        assert!(badges(report.clone().with_badges(&visited, 0)).is_empty());
        assert_eq!(badges(report.clone().with_badges(&visited, 1)), vec!["identity"]);

        visited.insert("bank".to_string());
        assert_eq!(badges(report.with_badges(&visited, 1)), vec!["identity", "bank"]);
    }

    #[test]
    fn started_subsection_warns_before_any_visit() {
        let values = json!({ "bank": { "accountName": "Kila" } });
        let report = compute_progress(&values, &FieldErrors::new(), STEPS);

        assert!(report.subsection("bank").unwrap().show_warning);
        assert!(!report.subsection("identity").unwrap().show_warning);
    }
}
