use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::api::{ApiClient, url_segment};
use crate::error::{Error, Result};
use crate::finding::Finding;

pub const DRAFT_VERSION: &str = "DRAFT";

static GUARDRAIL_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:arn:aws(?:-[a-z]+)*:bedrock:[a-z0-9-]{1,20}:[0-9]{12}:guardrail/)?[a-z0-9]+$")
        .unwrap()
});
static GUARDRAIL_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:DRAFT|[1-9][0-9]{0,7})$").unwrap());

/// Identity of the guardrail policy to validate against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyRef {
    pub id: String,
    pub version: String,
}

impl PolicyRef {
    /// Validate a guardrail identifier (bare id or ARN) and version.
    pub fn parse(id: &str, version: &str) -> Result<Self> {
        if id.len() > 2048 || !GUARDRAIL_ID_RE.is_match(id) {
            return Err(Error::ConfigValidation(format!(
                "invalid guardrail identifier: {id}"
            )));
        }
        if !GUARDRAIL_VERSION_RE.is_match(version) {
            return Err(Error::ConfigValidation(format!(
                "invalid guardrail version: {version} (expected DRAFT or a positive number)"
            )));
        }
        Ok(Self {
            id: id.to_string(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.id, self.version)
    }
}

/// Whether the validated text is user input or model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentSource {
    Input,
    Output,
}

impl ContentSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentSource::Input => "INPUT",
            ContentSource::Output => "OUTPUT",
        }
    }
}

/// One text block submitted for validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardContent {
    pub text: String,
    pub qualifiers: Vec<String>,
}

impl GuardContent {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            qualifiers: vec![],
        }
    }

    pub fn query(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            qualifiers: vec!["query".to_string()],
        }
    }

    pub fn guarded(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            qualifiers: vec!["guard_content".to_string()],
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut text = serde_json::json!({ "text": self.text });
        if !self.qualifiers.is_empty() {
            text["qualifiers"] = serde_json::json!(self.qualifiers);
        }
        serde_json::json!({ "text": text })
    }
}

// ---------------------------------------------------------------------------
// Guardrail response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyGuardrailResponse {
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub assessments: Vec<Assessment>,
    #[serde(default)]
    pub usage: Option<GuardrailUsage>,
}

fn default_action() -> String {
    "NONE".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    #[serde(default)]
    pub automated_reasoning_policy: Option<ReasoningAssessment>,
    #[serde(default)]
    pub invocation_metrics: Option<InvocationMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReasoningAssessment {
    #[serde(default)]
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationMetrics {
    /// Seconds.
    #[serde(default)]
    pub guardrail_processing_latency: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailUsage {
    #[serde(default)]
    pub automated_reasoning_policies: u64,
    #[serde(default)]
    pub automated_reasoning_policy_units: u64,
}

impl ApplyGuardrailResponse {
    /// Findings of the first assessment that carries an automated-reasoning block.
    pub fn primary_findings(&self) -> Option<&[Finding]> {
        self.assessments
            .iter()
            .find_map(|a| a.automated_reasoning_policy.as_ref())
            .map(|p| p.findings.as_slice())
    }

    /// Findings of every automated-reasoning assessment, in order.
    pub fn all_findings(&self) -> Vec<Finding> {
        self.assessments
            .iter()
            .filter_map(|a| a.automated_reasoning_policy.as_ref())
            .flat_map(|p| p.findings.iter().cloned())
            .collect()
    }

    pub fn processing_time_ms(&self) -> Option<u64> {
        self.assessments
            .first()
            .and_then(|a| a.invocation_metrics.as_ref())
            .map(|m| (m.guardrail_processing_latency * 1000.0) as u64)
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Evaluates text against a guardrail policy.
pub trait Validator {
    fn validate(
        &self,
        policy: &PolicyRef,
        source: ContentSource,
        content: &[GuardContent],
    ) -> Result<ApplyGuardrailResponse>;
}

/// Validator that calls the guardrail runtime's apply endpoint.
pub struct GuardrailValidator<C> {
    client: C,
}

impl<C: ApiClient> GuardrailValidator<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: ApiClient> Validator for GuardrailValidator<C> {
    fn validate(
        &self,
        policy: &PolicyRef,
        source: ContentSource,
        content: &[GuardContent],
    ) -> Result<ApplyGuardrailResponse> {
        let path = format!(
            "/guardrail/{}/version/{}/apply",
            url_segment(&policy.id),
            url_segment(&policy.version)
        );
        let body = serde_json::json!({
            "source": source.as_str(),
            "content": content.iter().map(GuardContent::to_json).collect::<Vec<_>>(),
        });
        let json = self.client.post_json(&path, &body)?;
        serde_json::from_value(json)
            .map_err(|e| Error::Validation(format!("failed to parse guardrail response: {e}")))
    }
}

// ---------------------------------------------------------------------------
// validate operation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub automated_reasoning_policies: u64,
    pub automated_reasoning_policy_units: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub action: String,
    pub valid: bool,
    pub guardrail_id: String,
    pub guardrail_version: String,
    pub content_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<Finding>>,
    pub usage: UsageReport,
}

/// Outcome of the `validate` operation: a report or an upstream error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ValidateOutcome {
    Report(ValidationReport),
    Error(ErrorReport),
}

/// Upstream failure as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub error: bool,
    pub error_type: String,
    pub error_message: String,
    pub guardrail_id: String,
}

impl ErrorReport {
    pub fn new(err: &Error, guardrail_id: &str) -> Self {
        Self {
            error: true,
            error_type: err.error_type(),
            error_message: err.detail(),
            guardrail_id: guardrail_id.to_string(),
        }
    }
}

/// Validate a single piece of content and summarize the guardrail's verdict.
pub fn validate_content(
    validator: &impl Validator,
    policy: &PolicyRef,
    content: &str,
    source: ContentSource,
) -> ValidateOutcome {
    info!(%policy, "validating content");
    match validator.validate(policy, source, &[GuardContent::plain(content)]) {
        Ok(response) => {
            let usage = response.usage.unwrap_or_default();
            let findings = response
                .assessments
                .first()
                .and_then(|a| a.automated_reasoning_policy.as_ref())
                .filter(|p| !p.findings.is_empty())
                .map(|p| p.findings.clone());
            let report = ValidationReport {
                valid: response.action == "NONE",
                action: response.action.clone(),
                guardrail_id: policy.id.clone(),
                guardrail_version: policy.version.clone(),
                content_length: content.chars().count(),
                findings,
                usage: UsageReport {
                    automated_reasoning_policies: usage.automated_reasoning_policies,
                    automated_reasoning_policy_units: usage.automated_reasoning_policy_units,
                    processing_time_ms: response.processing_time_ms(),
                },
            };
            info!(
                action = %report.action,
                units = report.usage.automated_reasoning_policy_units,
                "validation complete"
            );
            ValidateOutcome::Report(report)
        }
        Err(e) => {
            error!(error = %e, "validation failed");
            ValidateOutcome::Error(ErrorReport::new(&e, &policy.id))
        }
    }
}
