mod common;

use arc_rewrite::category::Category;
use arc_rewrite::handler::{DEFAULT_DOMAIN, RewriteInvocation, SummarizeOutcome, summarize};
use arc_rewrite::prompts::PromptEngine;
use arc_rewrite::rewriter::{RewriteState, Rewriter};
use arc_rewrite::validation::{ContentSource, PolicyRef};
use serde_json::json;

use common::{MockValidator, RecordingGenerator, guardrail_response};

fn invocation(domain: Option<&str>) -> RewriteInvocation {
    RewriteInvocation {
        question: "Is a 6% rate allowed?".to_string(),
        answer: "Yes, any rate is allowed.".to_string(),
        policy: PolicyRef::parse("abc123xyz", "DRAFT").unwrap(),
        model: "test-model".to_string(),
        domain: domain.map(str::to_string),
        policy_definition: None,
    }
}

#[tokio::test]
async fn violation_is_rewritten_and_reported() {
    let validator = MockValidator::responding(guardrail_response(json!([
        {
            "result": "INVALID",
            "explanation": "rate exceeds cap",
            "violations": ["Rates above 5% are not allowed"],
            "suggestions": ["Cap the rate at 5%"],
            "appliedRules": ["rate-cap"]
        }
    ])));
    let rewriter = Rewriter::new(
        RecordingGenerator::new(|_: &str| Ok("No, the cap is 5%.".to_string())),
        PromptEngine::new(None),
    );

    let outcome = summarize(&validator, &rewriter, invocation(Some("Finance")))
        .await
        .unwrap();

    let SummarizeOutcome::Report(report) = outcome else {
        panic!("expected a report");
    };
    assert!(report.rewritten);
    assert_eq!(report.state, RewriteState::Single);
    assert_eq!(report.rewritten_response.as_deref(), Some("No, the cap is 5%."));
    assert_eq!(report.original_response, "Yes, any rate is allowed.");
    assert_eq!(report.query, "Is a 6% rate allowed?");
    assert_eq!(report.domain, "Finance");
    assert_eq!(report.finding_types, vec![Category::PolicyViolation]);
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].applied_rules, vec!["rate-cap"]);
    assert_eq!(report.guardrail_id, "abc123xyz");
    assert_eq!(report.guardrail_version, "DRAFT");
    assert_eq!(report.usage.unwrap().automated_reasoning_policy_units, 2);

    let prompt = &rewriter.generator().prompts()[0];
    assert!(prompt.contains("**Finance** domain"));
    assert!(prompt.contains("- Rates above 5% are not allowed"));
}

#[tokio::test]
async fn question_and_answer_sent_with_qualifiers() {
    let validator = MockValidator::responding(guardrail_response(json!([])));
    let rewriter = Rewriter::new(
        RecordingGenerator::new(|_: &str| Ok("unused".to_string())),
        PromptEngine::new(None),
    );

    summarize(&validator, &rewriter, invocation(None))
        .await
        .unwrap();

    let calls = validator.calls();
    assert_eq!(calls.len(), 1);
    let (source, content) = &calls[0];
    assert_eq!(*source, ContentSource::Output);
    assert_eq!(
        content[0],
        json!({ "text": { "text": "Is a 6% rate allowed?", "qualifiers": ["query"] } })
    );
    assert_eq!(
        content[1],
        json!({ "text": { "text": "Yes, any rate is allowed.", "qualifiers": ["guard_content"] } })
    );
}

#[tokio::test]
async fn empty_findings_use_default_domain() {
    let validator = MockValidator::responding(guardrail_response(json!([])));
    let rewriter = Rewriter::new(
        RecordingGenerator::new(|_: &str| Ok("unused".to_string())),
        PromptEngine::new(None),
    );

    let outcome = summarize(&validator, &rewriter, invocation(None))
        .await
        .unwrap();

    let SummarizeOutcome::Report(report) = outcome else {
        panic!("expected a report");
    };
    assert_eq!(report.domain, DEFAULT_DOMAIN);
    assert_eq!(report.state, RewriteState::NoFindings);
    assert!(!report.rewritten);
    assert_eq!(rewriter.generator().calls(), 0);
}

#[tokio::test]
async fn response_without_reasoning_assessment_has_no_findings() {
    let validator = MockValidator::responding(json!({ "action": "NONE", "assessments": [{}] }));
    let rewriter = Rewriter::new(
        RecordingGenerator::new(|_: &str| Ok("unused".to_string())),
        PromptEngine::new(None),
    );

    let outcome = summarize(&validator, &rewriter, invocation(None))
        .await
        .unwrap();

    let SummarizeOutcome::Report(report) = outcome else {
        panic!("expected a report");
    };
    assert_eq!(report.state, RewriteState::NoFindings);
    assert!(report.findings.is_empty());
    assert!(report.usage.is_none());
}

#[tokio::test]
async fn validator_failure_becomes_error_report() {
    let validator = MockValidator::failing("AccessDeniedException", "not authorized");
    let rewriter = Rewriter::new(
        RecordingGenerator::new(|_: &str| Ok("unused".to_string())),
        PromptEngine::new(None),
    );

    let outcome = summarize(&validator, &rewriter, invocation(None))
        .await
        .unwrap();

    assert!(outcome.is_error());
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["error"], true);
    assert_eq!(json["error_type"], "AccessDeniedException");
    assert_eq!(json["error_message"], "not authorized");
    assert_eq!(json["original_response"], "Yes, any rate is allowed.");
    assert_eq!(json["guardrail_id"], "abc123xyz");
    assert_eq!(rewriter.generator().calls(), 0);
}

#[tokio::test]
async fn report_serializes_category_names() {
    let validator = MockValidator::responding(guardrail_response(json!([
        { "result": "VALID" },
        { "result": "VALID" }
    ])));
    let rewriter = Rewriter::new(
        RecordingGenerator::new(|_: &str| Ok("unused".to_string())),
        PromptEngine::new(None),
    );

    let outcome = summarize(&validator, &rewriter, invocation(None))
        .await
        .unwrap();

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["finding_types"], json!(["NO_ISSUE"]));
    assert_eq!(json["findings_count"], 2);
    assert_eq!(json["state"], "no_rewrite_needed");
    assert_eq!(json["rewritten_response"], serde_json::Value::Null);
}
