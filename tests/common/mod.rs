#![allow(dead_code)]

use std::sync::Mutex;

use arc_rewrite::error::{Error, Result};
use arc_rewrite::runner::TextGenerator;
use arc_rewrite::validation::{
    ApplyGuardrailResponse, ContentSource, GuardContent, PolicyRef, Validator,
};

/// Marker present in every merge prompt.
pub const MERGE_MARKER: &str = "combine multiple corrected answers";

/// Generator that records every prompt and answers through `reply`.
pub struct RecordingGenerator<F> {
    reply: F,
    prompts: Mutex<Vec<String>>,
}

impl<F> RecordingGenerator<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    pub fn new(reply: F) -> Self {
        Self {
            reply,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl<F> TextGenerator for RecordingGenerator<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    async fn generate(&self, prompt: &str, _model: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.reply)(prompt)
    }
}

/// Validator returning a canned guardrail response, or an API error.
pub struct MockValidator {
    response: std::result::Result<serde_json::Value, (String, String)>,
    calls: Mutex<Vec<(ContentSource, Vec<serde_json::Value>)>>,
}

impl MockValidator {
    pub fn responding(json: serde_json::Value) -> Self {
        Self {
            response: Ok(json),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(code: &str, message: &str) -> Self {
        Self {
            response: Err((code.to_string(), message.to_string())),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(ContentSource, Vec<serde_json::Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Validator for MockValidator {
    fn validate(
        &self,
        _policy: &PolicyRef,
        source: ContentSource,
        content: &[GuardContent],
    ) -> Result<ApplyGuardrailResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((source, content.iter().map(GuardContent::to_json).collect()));
        match &self.response {
            Ok(json) => Ok(serde_json::from_value(json.clone()).unwrap()),
            Err((code, message)) => Err(Error::Api {
                code: code.clone(),
                message: message.clone(),
            }),
        }
    }
}

/// Guardrail response JSON carrying `findings` in a single assessment.
pub fn guardrail_response(findings: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "action": "GUARDRAIL_INTERVENED",
        "assessments": [
            {
                "automatedReasoningPolicy": { "findings": findings },
                "invocationMetrics": { "guardrailProcessingLatency": 0.25 }
            }
        ],
        "usage": {
            "automatedReasoningPolicies": 1,
            "automatedReasoningPolicyUnits": 2
        }
    })
}

/// Write an executable bash script into a fresh temp dir.
///
/// Returns the `TempDir` so the caller keeps it alive for the duration of the test.
pub fn write_script(name: &str, body: &str) -> (String, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join(name);
    std::fs::write(&path, format!("#!/bin/bash\n{body}")).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    (path.to_string_lossy().to_string(), tmp)
}
