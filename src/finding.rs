use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::category::Category;

pub const NO_VIOLATIONS_TEXT: &str = "No specific violations found";
pub const NO_SUGGESTIONS_TEXT: &str = "Ensure compliance with policy requirements";
pub const NO_RULES_TEXT: &str = "Policy rules";

fn unknown_outcome() -> String {
    "UNKNOWN".to_string()
}

/// One evaluation unit reported by the guardrail validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Raw outcome string, e.g. `INVALID` or `NO_DATA`.
    #[serde(rename = "result", default = "unknown_outcome")]
    pub outcome: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub applied_rules: Vec<String>,
    #[serde(default)]
    pub violations: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl Finding {
    pub fn category(&self) -> Option<Category> {
        Category::from_outcome(&self.outcome)
    }
}

/// All findings of one category.
#[derive(Debug, Clone)]
pub struct CategoryGroup<'a> {
    pub category: Category,
    pub findings: Vec<&'a Finding>,
}

/// Rendering fields pooled from a [`CategoryGroup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingFields {
    pub violations: String,
    pub suggestions: String,
    pub applied_rules: String,
}

impl<'a> CategoryGroup<'a> {
    pub fn new(category: Category, findings: Vec<&'a Finding>) -> Self {
        Self { category, findings }
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Flatten every finding's violations, suggestions and applied rules.
    ///
    /// Empty lists render to fixed fallback text so templates never show a
    /// blank section. Rules are not de-duplicated.
    pub fn aggregate(&self) -> FindingFields {
        let violations: Vec<&str> = self
            .findings
            .iter()
            .flat_map(|f| f.violations.iter().map(String::as_str))
            .collect();
        let suggestions: Vec<&str> = self
            .findings
            .iter()
            .flat_map(|f| f.suggestions.iter().map(String::as_str))
            .collect();
        let rules: Vec<&str> = self
            .findings
            .iter()
            .flat_map(|f| f.applied_rules.iter().map(String::as_str))
            .collect();

        FindingFields {
            violations: bullets(&violations).unwrap_or_else(|| NO_VIOLATIONS_TEXT.to_string()),
            suggestions: bullets(&suggestions).unwrap_or_else(|| NO_SUGGESTIONS_TEXT.to_string()),
            applied_rules: if rules.is_empty() {
                NO_RULES_TEXT.to_string()
            } else {
                rules.join(", ")
            },
        }
    }
}

fn bullets(items: &[&str]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    Some(
        items
            .iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::make_finding;

    #[test]
    fn test_deserialize_validator_shape() {
        let json = r#"{
            "result": "INVALID",
            "explanation": "Dose exceeds limit",
            "variables": {"dose_mg": 500, "patient_age": "adult"},
            "appliedRules": ["R1", "R2"],
            "violations": ["max dose is 400mg"],
            "suggestions": ["lower the dose"]
        }"#;
        let finding: Finding = serde_json::from_str(json).unwrap();
        assert_eq!(finding.outcome, "INVALID");
        assert_eq!(finding.category(), Some(Category::PolicyViolation));
        assert_eq!(finding.applied_rules, vec!["R1", "R2"]);
        assert_eq!(finding.variables["dose_mg"], serde_json::json!(500));
    }

    #[test]
    fn test_deserialize_missing_fields() {
        let finding: Finding = serde_json::from_str("{}").unwrap();
        assert_eq!(finding.outcome, "UNKNOWN");
        assert_eq!(finding.category(), None);
        assert!(finding.violations.is_empty());
        assert!(finding.variables.is_empty());
    }

    #[test]
    fn test_aggregate_flattens_in_order() {
        let mut a = make_finding("INVALID");
        a.violations = vec!["v1".into(), "v2".into()];
        a.suggestions = vec!["s1".into()];
        a.applied_rules = vec!["R1".into()];
        let mut b = make_finding("INVALID");
        b.violations = vec!["v3".into()];
        b.suggestions = vec!["s2".into()];
        b.applied_rules = vec!["R2".into(), "R1".into()];

        let group = CategoryGroup::new(Category::PolicyViolation, vec![&a, &b]);
        let fields = group.aggregate();
        assert_eq!(fields.violations, "- v1\n- v2\n- v3");
        assert_eq!(fields.suggestions, "- s1\n- s2");
        assert_eq!(fields.applied_rules, "R1, R2, R1");
    }

    #[test]
    fn test_aggregate_fallbacks() {
        let a = make_finding("NO_DATA");
        let group = CategoryGroup::new(Category::InsufficientData, vec![&a]);
        let fields = group.aggregate();
        assert_eq!(fields.violations, NO_VIOLATIONS_TEXT);
        assert_eq!(fields.suggestions, NO_SUGGESTIONS_TEXT);
        assert_eq!(fields.applied_rules, NO_RULES_TEXT);
    }

    #[test]
    fn test_aggregate_is_stable() {
        let mut a = make_finding("SATISFIABLE");
        a.violations = vec!["x".into()];
        let group = CategoryGroup::new(Category::SatisfiableButUnderspecified, vec![&a]);
        assert_eq!(group.aggregate(), group.aggregate());
        assert_eq!(group.len(), 1);
        assert!(!group.is_empty());
    }
}
