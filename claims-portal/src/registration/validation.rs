use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::progress::{field_value, is_filled};
use super::{FieldErrors, RegistrationKind, form::steps_for};

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 ]{6,14}$").expect("phone pattern"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern"));
static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("digit pattern"));

enum Rule {
    Phone,
    Email,
    Digits,
    Count,
}

/// Format rule for a field, chosen by the last segment of its path
fn rule_for(path: &str) -> Option<Rule> {
    let leaf = path.rsplit('.').next().unwrap_or(path);
    match leaf {
        "phone" => Some(Rule::Phone),
        "email" => Some(Rule::Email),
        "postalCode" | "branchNumber" | "accountNumber" | "tin" | "medicalBoardNumber" => {
            Some(Rule::Digits)
        }
        "yearsOfPractice" | "count" | "bedCount" => Some(Rule::Count),
        _ => None,
    }
}

fn check(rule: &Rule, value: &Value) -> Option<&'static str> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return Some("Unexpected value"),
    };

    match rule {
        Rule::Phone if !PHONE.is_match(&text) => Some("Invalid phone number"),
        Rule::Email if !EMAIL.is_match(&text) => Some("Invalid email address"),
        Rule::Digits if !DIGITS.is_match(&text) => Some("Digits only"),
        Rule::Count if text.parse::<u32>().is_err() => Some("Must be a whole number"),
        _ => None,
    }
}

/// Format errors only; empty fields are left alone so a draft in progress stays quiet
pub fn format_errors(kind: RegistrationKind, values: &Value) -> FieldErrors {
    let mut errors = FieldErrors::new();
    for path in steps_for(kind).iter().flat_map(|step| step.fields()) {
        let value = field_value(values, path);
        if !is_filled(value) {
            continue;
        }
        if let (Some(rule), Some(value)) = (rule_for(path), value) {
            if let Some(message) = check(&rule, value) {
                errors.insert(path.to_string(), message.to_string());
            }
        }
    }
    errors
}

/// Full validation run before submission: every field required, formats enforced
pub fn validate(kind: RegistrationKind, values: &Value) -> FieldErrors {
    let mut errors = format_errors(kind, values);
    for path in steps_for(kind).iter().flat_map(|step| step.fields()) {
        if !is_filled(field_value(values, path)) {
            errors.insert(path.to_string(), "Required".to_string());
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn format_errors_ignore_empty_fields() {
        let values = json!({
            "contact": { "phone": "call me", "email": "" },
            "bank": { "branchNumber": "08-8950" }
        });
        let errors = format_errors(RegistrationKind::PrivatePractice, &values);

        assert_eq!(errors.get("contact.phone").map(String::as_str), Some("Invalid phone number"));
        assert_eq!(errors.get("bank.branchNumber").map(String::as_str), Some("Digits only"));
        assert!(!errors.contains_key("contact.email"));
    }

    #[test]
    fn full_validation_requires_every_field() {
        let errors = validate(RegistrationKind::HealthAuthority, &json!({ "authorityName": "Morobe PHA" }));

        assert!(!errors.contains_key("authorityName"));
        assert_eq!(errors.get("province").map(String::as_str), Some("Required"));
        assert_eq!(errors.get("bank.accountName").map(String::as_str), Some("Required"));
    }

    #[test]
    fn accepts_well_formed_values() {
        let values = json!({
            "contact": { "phone": "+675 7000 1234", "email": "admin@kila.health" },
            "facilities": { "count": 4, "bedCount": "120" }
        });
        assert!(format_errors(RegistrationKind::HealthAuthority, &values).is_empty());
    }
}
