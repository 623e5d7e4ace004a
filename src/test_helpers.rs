use crate::finding::Finding;

/// Create a `Finding` with the given outcome and empty details.
pub fn make_finding(outcome: &str) -> Finding {
    Finding {
        outcome: outcome.to_string(),
        explanation: format!("{outcome} explanation"),
        variables: Default::default(),
        applied_rules: vec![],
        violations: vec![],
        suggestions: vec![],
    }
}

/// Create a `Finding` carrying one violation and one suggestion.
pub fn make_detailed_finding(outcome: &str, violation: &str, suggestion: &str) -> Finding {
    Finding {
        violations: vec![violation.to_string()],
        suggestions: vec![suggestion.to_string()],
        applied_rules: vec![format!("{outcome}-rule")],
        ..make_finding(outcome)
    }
}
