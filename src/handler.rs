use serde::Serialize;
use tracing::{error, info};

use crate::category::Category;
use crate::error::Result;
use crate::finding::Finding;
use crate::prompts::TemplateStore;
use crate::rewriter::{RewriteRequest, RewriteState, Rewriter};
use crate::runner::TextGenerator;
use crate::validation::{ContentSource, GuardContent, GuardrailUsage, PolicyRef, Validator};

pub const DEFAULT_DOMAIN: &str = "General";

/// Everything the outer transport passes to one validate-and-rewrite call.
#[derive(Debug, Clone)]
pub struct RewriteInvocation {
    pub question: String,
    pub answer: String,
    pub policy: PolicyRef,
    pub model: String,
    pub domain: Option<String>,
    pub policy_definition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewriteReport {
    pub query: String,
    pub original_response: String,
    pub rewritten_response: Option<String>,
    pub rewritten: bool,
    pub findings: Vec<Finding>,
    pub finding_types: Vec<Category>,
    pub findings_count: usize,
    pub domain: String,
    pub message: String,
    pub state: RewriteState,
    pub guardrail_id: String,
    pub guardrail_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<GuardrailUsage>,
}

/// Upstream failure of a validate-and-rewrite call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteErrorReport {
    pub error: bool,
    pub error_type: String,
    pub error_message: String,
    pub query: String,
    pub original_response: String,
    pub guardrail_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SummarizeOutcome {
    Report(RewriteReport),
    Error(RewriteErrorReport),
}

impl SummarizeOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, SummarizeOutcome::Error(_))
    }
}

/// Validate `invocation.answer` against the guardrail and rewrite it on violation.
///
/// A validator failure becomes an error report. A composition error is
/// returned as `Err` since it means a template and its fields disagree.
pub async fn summarize<V, G, T>(
    validator: &V,
    rewriter: &Rewriter<G, T>,
    invocation: RewriteInvocation,
) -> Result<SummarizeOutcome>
where
    V: Validator,
    G: TextGenerator,
    T: TemplateStore,
{
    let domain = invocation
        .domain
        .unwrap_or_else(|| DEFAULT_DOMAIN.to_string());
    info!(policy = %invocation.policy, %domain, "validating and rewriting response");

    let content = [
        GuardContent::query(invocation.question.clone()),
        GuardContent::guarded(invocation.answer.clone()),
    ];
    let response = match validator.validate(&invocation.policy, ContentSource::Output, &content) {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "validation failed");
            return Ok(SummarizeOutcome::Error(RewriteErrorReport {
                error: true,
                error_type: e.error_type(),
                error_message: e.detail(),
                query: invocation.question,
                original_response: invocation.answer,
                guardrail_id: invocation.policy.id,
            }));
        }
    };

    let request = RewriteRequest {
        question: invocation.question,
        answer: invocation.answer,
        domain,
        model: invocation.model,
        policy_definition: invocation.policy_definition,
    };
    let result = rewriter
        .rewrite(&request, response.primary_findings())
        .await?;

    Ok(SummarizeOutcome::Report(RewriteReport {
        query: request.question,
        original_response: result.original_response,
        rewritten_response: result.rewritten_response,
        rewritten: result.rewritten,
        findings: response.all_findings(),
        finding_types: result.finding_types,
        findings_count: result.findings_count,
        domain: request.domain,
        message: result.message,
        state: result.state,
        guardrail_id: invocation.policy.id,
        guardrail_version: invocation.policy.version,
        usage: response.usage,
    }))
}
