use serde::Serialize;
use tracing::{error, info, warn};

use crate::category::{Category, classify, prioritize};
use crate::error::{Error, Result};
use crate::finding::{CategoryGroup, Finding};
use crate::merge::{RewriteOutcome, compose_merge};
use crate::prompts::{RewriteContext, TemplateStore, compose};
use crate::runner::TextGenerator;

/// Canned reply used when the only finding says the input is too complex.
pub const TOO_COMPLEX_RESPONSE: &str = "This question contains too much information to process accurately. \
Please break it down into simpler, more focused questions.";

pub const MSG_NO_FINDINGS: &str = "no findings to process";
pub const MSG_NO_ACTIONABLE: &str = "no actionable findings";
pub const MSG_NO_REWRITES: &str = "no rewrites generated";
pub const MSG_MERGE_FAILED: &str = "error combining rewrites";
pub const MSG_TOO_COMPLEX: &str = "replaced with generic over-complex input message";

/// Terminal state reached by one rewrite invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteState {
    NoFindings,
    NoActionableFindings,
    TooComplex,
    NoRewriteNeeded,
    NoRewritesGenerated,
    Single,
    Merged,
    MergeFailed,
}

/// A category that was attempted but produced no rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryFailure {
    pub category: Category,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteResult {
    pub original_response: String,
    pub rewritten: bool,
    pub finding_types: Vec<Category>,
    pub findings_count: usize,
    pub rewritten_response: Option<String>,
    pub message: String,
    pub state: RewriteState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<CategoryFailure>,
}

impl RewriteResult {
    fn unchanged(original: &str, state: RewriteState, message: impl Into<String>) -> Self {
        Self {
            original_response: original.to_string(),
            rewritten: false,
            finding_types: vec![],
            findings_count: 0,
            rewritten_response: None,
            message: message.into(),
            state,
            failures: vec![],
        }
    }
}

/// Inputs of one rewrite.
#[derive(Debug, Clone)]
pub struct RewriteRequest {
    pub question: String,
    pub answer: String,
    pub domain: String,
    pub model: String,
    pub policy_definition: Option<String>,
}

impl RewriteRequest {
    fn context(&self) -> RewriteContext {
        RewriteContext {
            domain: self.domain.clone(),
            question: self.question.clone(),
            original_answer: self.answer.clone(),
            policy: self.policy_definition.clone(),
        }
    }
}

/// Turns validation findings into a corrected answer.
pub struct Rewriter<G, T> {
    generator: G,
    templates: T,
}

impl<G: TextGenerator, T: TemplateStore> Rewriter<G, T> {
    pub fn new(generator: G, templates: T) -> Self {
        Self {
            generator,
            templates,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Rewrite `request.answer` so that it resolves `findings`.
    ///
    /// Upstream failures are absorbed into the result. Only a template that
    /// cannot be composed returns `Err`.
    pub async fn rewrite(
        &self,
        request: &RewriteRequest,
        findings: Option<&[Finding]>,
    ) -> Result<RewriteResult> {
        let original = request.answer.as_str();

        let Some(findings) = findings.filter(|f| !f.is_empty()) else {
            return Ok(RewriteResult::unchanged(
                original,
                RewriteState::NoFindings,
                MSG_NO_FINDINGS,
            ));
        };

        let grouped = classify(findings);
        let priority = prioritize(&grouped);
        info!(
            findings = findings.len(),
            categories = ?priority,
            "classified findings"
        );

        match priority.as_slice() {
            [] => {
                return Ok(RewriteResult::unchanged(
                    original,
                    RewriteState::NoActionableFindings,
                    MSG_NO_ACTIONABLE,
                ));
            }
            [Category::OverComplexInput] => {
                return Ok(RewriteResult {
                    rewritten: true,
                    finding_types: vec![Category::OverComplexInput],
                    findings_count: grouped[&Category::OverComplexInput].len(),
                    rewritten_response: Some(TOO_COMPLEX_RESPONSE.to_string()),
                    ..RewriteResult::unchanged(original, RewriteState::TooComplex, MSG_TOO_COMPLEX)
                });
            }
            [Category::NoIssue] => {
                return Ok(RewriteResult {
                    finding_types: vec![Category::NoIssue],
                    findings_count: grouped[&Category::NoIssue].len(),
                    ..RewriteResult::unchanged(
                        original,
                        RewriteState::NoRewriteNeeded,
                        format!("no rewrite needed; finding type: {}", Category::NoIssue),
                    )
                });
            }
            _ => {}
        }

        let context = request.context();
        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        for category in priority {
            if !category.is_rewritable() {
                continue;
            }
            let group = CategoryGroup::new(category, grouped[&category].clone());
            let fields = group.aggregate();
            let prompt = compose(&self.templates, category, &context, &fields)
                .inspect_err(|e| error!(%category, error = %e, "failed to compose rewrite prompt"))?;
            let Some(prompt) = prompt else {
                warn!(%category, "no template, skipping category");
                failures.push(CategoryFailure {
                    category,
                    reason: "no template".to_string(),
                });
                continue;
            };

            match self.generate_outcome(&group, &prompt, &request.model).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(%category, error = %e, "error rewriting, skipping category");
                    failures.push(CategoryFailure {
                        category,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let mut result = RewriteResult {
            finding_types: outcomes.iter().map(|o| o.category).collect(),
            findings_count: outcomes.iter().map(|o| o.findings_count).sum(),
            failures,
            ..RewriteResult::unchanged(original, RewriteState::NoRewritesGenerated, MSG_NO_REWRITES)
        };

        match outcomes.len() {
            0 => {}
            1 => {
                let outcome = outcomes.remove(0);
                result.state = RewriteState::Single;
                result.rewritten = true;
                result.message = format!("rewrote response for {}", outcome.category);
                result.rewritten_response = Some(outcome.text);
            }
            _ => match self.merge(&context, &outcomes, &request.model).await? {
                Some(text) => {
                    result.state = RewriteState::Merged;
                    result.rewritten = true;
                    result.message = format!("rewrote response for: {}", join(&result.finding_types));
                    result.rewritten_response = Some(text);
                }
                None => {
                    result.state = RewriteState::MergeFailed;
                    result.message = MSG_MERGE_FAILED.to_string();
                }
            },
        }

        info!(
            state = ?result.state,
            rewritten = result.rewritten,
            finding_types = ?result.finding_types,
            findings_count = result.findings_count,
            "rewrite complete"
        );
        Ok(result)
    }

    async fn generate_outcome(
        &self,
        group: &CategoryGroup<'_>,
        prompt: &str,
        model: &str,
    ) -> Result<RewriteOutcome> {
        info!(category = %group.category, findings = group.len(), "rewriting for category");
        let text = self.generator.generate(prompt, model).await?;
        if text.trim().is_empty() {
            return Err(Error::Generation("generator returned no text".to_string()));
        }
        Ok(RewriteOutcome {
            category: group.category,
            findings_count: group.len(),
            text,
        })
    }

    /// Fuse several outcomes. `Ok(None)` means the generator failed or returned nothing.
    async fn merge(
        &self,
        context: &RewriteContext,
        outcomes: &[RewriteOutcome],
        model: &str,
    ) -> Result<Option<String>> {
        let prompt = compose_merge(context, outcomes)?;
        info!(count = outcomes.len(), "combining rewrites");
        match self.generator.generate(&prompt, model).await {
            Ok(text) if !text.trim().is_empty() => Ok(Some(text)),
            Ok(_) => {
                warn!("merge returned no text");
                Ok(None)
            }
            Err(e) => {
                error!(error = %e, "error combining rewrites");
                Ok(None)
            }
        }
    }
}

fn join(categories: &[Category]) -> String {
    categories
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::PromptEngine;
    use crate::runner::CallbackGenerator;
    use crate::test_helpers::{make_detailed_finding, make_finding};
    use std::sync::Mutex;

    fn request() -> RewriteRequest {
        RewriteRequest {
            question: "Q?".to_string(),
            answer: "A.".to_string(),
            domain: "General".to_string(),
            model: "test-model".to_string(),
            policy_definition: None,
        }
    }

    #[tokio::test]
    async fn test_absent_findings() {
        let rewriter = Rewriter::new(
            CallbackGenerator::new(|_: &str, _: &str| panic!("no generation expected")),
            PromptEngine::new(None),
        );
        let result = rewriter.rewrite(&request(), None).await.unwrap();
        assert_eq!(result.state, RewriteState::NoFindings);
        assert_eq!(result.message, MSG_NO_FINDINGS);
        assert!(!result.rewritten);
        assert!(result.rewritten_response.is_none());
    }

    #[tokio::test]
    async fn test_mixed_no_issue_is_not_counted() {
        let calls = Mutex::new(0usize);
        let rewriter = Rewriter::new(
            CallbackGenerator::new(|_: &str, _: &str| {
                *calls.lock().unwrap() += 1;
                Ok("fixed".to_string())
            }),
            PromptEngine::new(None),
        );
        let findings = vec![
            make_finding("VALID"),
            make_finding("VALID"),
            make_detailed_finding("INVALID", "x", "y"),
        ];
        let result = rewriter.rewrite(&request(), Some(&findings)).await.unwrap();
        assert_eq!(result.state, RewriteState::Single);
        assert_eq!(result.finding_types, vec![Category::PolicyViolation]);
        assert_eq!(result.findings_count, 1);
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_too_complex_mixed_with_actionable_is_skipped() {
        let rewriter = Rewriter::new(
            CallbackGenerator::new(|_: &str, _: &str| Ok("fixed".to_string())),
            PromptEngine::new(None),
        );
        let findings = vec![make_finding("TOO_COMPLEX"), make_finding("NO_DATA")];
        let result = rewriter.rewrite(&request(), Some(&findings)).await.unwrap();
        assert_eq!(result.finding_types, vec![Category::InsufficientData]);
        assert_eq!(result.rewritten_response.as_deref(), Some("fixed"));
    }

    #[tokio::test]
    async fn test_blank_generation_is_a_failure() {
        let rewriter = Rewriter::new(
            CallbackGenerator::new(|_: &str, _: &str| Ok("   \n".to_string())),
            PromptEngine::new(None),
        );
        let findings = vec![make_finding("SATISFIABLE")];
        let result = rewriter.rewrite(&request(), Some(&findings)).await.unwrap();
        assert_eq!(result.state, RewriteState::NoRewritesGenerated);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(
            result.failures[0].category,
            Category::SatisfiableButUnderspecified
        );
        assert!(result.failures[0].reason.contains("no text"));
    }

    #[tokio::test]
    async fn test_result_serializes_category_names() {
        let rewriter = Rewriter::new(
            CallbackGenerator::new(|_: &str, _: &str| Ok("fixed".to_string())),
            PromptEngine::new(None),
        );
        let findings = vec![make_finding("TRANSLATION_AMBIGUOUS")];
        let result = rewriter.rewrite(&request(), Some(&findings)).await.unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["finding_types"][0], "AMBIGUOUS_TRANSLATION");
        assert_eq!(json["state"], "single");
        assert!(json.get("failures").is_none());
    }
}
