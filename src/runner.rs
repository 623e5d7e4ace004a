use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::api::{ApiClient, url_segment};
use crate::error::{Error, Result};
use crate::process::{CommandOutput, CommandSpec, run_command};

/// Which backend produces rewritten text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    Converse,
    Claude,
    Codex,
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorKind::Converse => write!(f, "converse"),
            GeneratorKind::Claude => write!(f, "claude"),
            GeneratorKind::Codex => write!(f, "codex"),
        }
    }
}

impl std::str::FromStr for GeneratorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "converse" => Ok(GeneratorKind::Converse),
            "claude" => Ok(GeneratorKind::Claude),
            "codex" => Ok(GeneratorKind::Codex),
            other => Err(Error::ConfigValidation(format!(
                "unknown generator: {other} (expected: converse, claude, codex)"
            ))),
        }
    }
}

pub trait TextGenerator {
    /// Generate text for `prompt` with the model named by `model`.
    fn generate(
        &self,
        prompt: &str,
        model: &str,
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// Converse API
// ---------------------------------------------------------------------------

/// Generator that calls the runtime's Converse endpoint.
pub struct ConverseGenerator<C> {
    client: C,
}

impl<C: ApiClient> ConverseGenerator<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn build_body(prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "messages": [{
                "role": "user",
                "content": [{ "text": prompt }],
            }]
        })
    }
}

/// Extract the first text block of a Converse response.
pub fn parse_converse_output(response: &serde_json::Value) -> Result<String> {
    response
        .pointer("/output/message/content")
        .and_then(|c| c.as_array())
        .and_then(|blocks| blocks.iter().find_map(|b| b.get("text")?.as_str()))
        .map(str::to_string)
        .ok_or_else(|| Error::Generation("converse response contains no text".to_string()))
}

impl<C: ApiClient + Sync> TextGenerator for ConverseGenerator<C> {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
        let path = format!("/model/{}/converse", url_segment(model));
        let response = self.client.post_json(&path, &Self::build_body(prompt))?;
        parse_converse_output(&response)
    }
}

// ---------------------------------------------------------------------------
// Claude CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ClaudeResult {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    is_error: bool,
}

/// Generator that invokes the claude CLI in print mode.
pub struct ClaudeRunner {
    agent_binary: String,
    working_dir: PathBuf,
    timeout: Option<Duration>,
}

impl ClaudeRunner {
    pub fn new(agent_binary: String, working_dir: PathBuf, timeout: Option<Duration>) -> Self {
        Self {
            agent_binary,
            working_dir,
            timeout,
        }
    }

    /// Build the command and arguments for a prompt.
    pub fn build_command(&self, prompt: &str, model: &str) -> (String, Vec<String>) {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
        ];
        if !model.is_empty() {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        args.push("-p".to_string());
        args.push(prompt.to_string());

        (self.agent_binary.clone(), args)
    }
}

/// Parse the final JSON result line the claude CLI prints on stdout.
pub fn parse_claude_output(stdout_lines: &[String]) -> Result<String> {
    let parsed = stdout_lines
        .iter()
        .rev()
        .find_map(|line| serde_json::from_str::<ClaudeResult>(line.trim()).ok())
        .ok_or_else(|| Error::Generation("claude printed no JSON result".to_string()))?;
    if parsed.is_error {
        return Err(Error::Generation(format!(
            "claude reported an error: {}",
            parsed.result.unwrap_or_default()
        )));
    }
    parsed
        .result
        .ok_or_else(|| Error::Generation("claude result has no text".to_string()))
}

impl TextGenerator for ClaudeRunner {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
        let (program, args) = self.build_command(prompt, model);

        let spec = CommandSpec {
            program,
            args,
            working_dir: self.working_dir.clone(),
            timeout: self.timeout,
            log_prefix: "generate:claude".to_string(),
            env: vec![],
            stdin: None,
        };

        let output = run_command(spec).await?;

        ensure_exited_cleanly("claude", &output)?;
        parse_claude_output(&output.stdout_lines)
    }
}

fn ensure_exited_cleanly(name: &str, output: &CommandOutput) -> Result<()> {
    if let Some(sig) = output.signal {
        return Err(Error::Generation(format!("{name} killed by signal {sig}")));
    }
    if output.exit_code != 0 {
        return Err(Error::Generation(format!(
            "{name} exited with code {}",
            output.exit_code
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Codex CLI
// ---------------------------------------------------------------------------

/// Generator that invokes the Codex CLI non-interactively, prompt on stdin.
pub struct CodexRunner {
    agent_binary: String,
    working_dir: PathBuf,
    timeout: Option<Duration>,
}

impl CodexRunner {
    pub fn new(agent_binary: String, working_dir: PathBuf, timeout: Option<Duration>) -> Self {
        Self {
            agent_binary,
            working_dir,
            timeout,
        }
    }

    /// Build the command and arguments for codex invocation.
    pub fn build_command(&self, model: &str) -> (String, Vec<String>) {
        let mut args = vec!["exec".to_string(), "--skip-git-repo-check".to_string()];
        if !model.is_empty() {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        args.push("-".to_string());

        (self.agent_binary.clone(), args)
    }
}

impl TextGenerator for CodexRunner {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
        let (program, args) = self.build_command(model);

        let spec = CommandSpec {
            program,
            args,
            working_dir: self.working_dir.clone(),
            timeout: self.timeout,
            log_prefix: "generate:codex".to_string(),
            env: vec![],
            stdin: Some(prompt.to_string()),
        };

        let output = run_command(spec).await?;

        ensure_exited_cleanly("codex", &output)?;
        Ok(output.stdout_lines.join("\n").trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Enum dispatching to the configured generator.
pub enum AnyGenerator<C> {
    Converse(ConverseGenerator<C>),
    Claude(ClaudeRunner),
    Codex(CodexRunner),
}

impl<C: ApiClient + Sync> TextGenerator for AnyGenerator<C> {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
        debug!(prompt_len = prompt.len(), model, "generating text");
        match self {
            AnyGenerator::Converse(g) => g.generate(prompt, model).await,
            AnyGenerator::Claude(g) => g.generate(prompt, model).await,
            AnyGenerator::Codex(g) => g.generate(prompt, model).await,
        }
    }
}

/// Build a generator of the given kind. `client` is only used by `Converse`.
pub fn build_generator<C: ApiClient>(
    kind: GeneratorKind,
    client: C,
    agent_binary: Option<&str>,
    timeout: Option<Duration>,
) -> AnyGenerator<C> {
    let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match kind {
        GeneratorKind::Converse => AnyGenerator::Converse(ConverseGenerator::new(client)),
        GeneratorKind::Claude => AnyGenerator::Claude(ClaudeRunner::new(
            agent_binary.unwrap_or("claude").to_string(),
            working_dir,
            timeout,
        )),
        GeneratorKind::Codex => AnyGenerator::Codex(CodexRunner::new(
            agent_binary.unwrap_or("codex").to_string(),
            working_dir,
            timeout,
        )),
    }
}

/// Generator backed by a closure; useful for embedding and tests.
pub struct CallbackGenerator<F> {
    callback: F,
}

impl<F> CallbackGenerator<F>
where
    F: Fn(&str, &str) -> Result<String> + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> TextGenerator for CallbackGenerator<F>
where
    F: Fn(&str, &str) -> Result<String> + Send + Sync,
{
    async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
        (self.callback)(prompt, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_kind_parse_and_display() {
        assert_eq!("claude".parse::<GeneratorKind>().unwrap(), GeneratorKind::Claude);
        assert_eq!(GeneratorKind::Converse.to_string(), "converse");
        let err = "gpt".parse::<GeneratorKind>().unwrap_err();
        assert!(err.to_string().contains("unknown generator"));
    }

    #[test]
    fn test_claude_build_command() {
        let runner = ClaudeRunner::new("claude".to_string(), PathBuf::from("."), None);
        let (cmd, args) = runner.build_command("fix this", "sonnet");
        assert_eq!(cmd, "claude");
        assert!(args.contains(&"--print".to_string()));
        assert!(args.contains(&"json".to_string()));
        assert!(args.contains(&"--model".to_string()));
        assert!(args.contains(&"sonnet".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("fix this"));
    }

    #[test]
    fn test_claude_build_command_without_model() {
        let runner = ClaudeRunner::new("/opt/claude".to_string(), PathBuf::from("."), None);
        let (cmd, args) = runner.build_command("x", "");
        assert_eq!(cmd, "/opt/claude");
        assert!(!args.contains(&"--model".to_string()));
    }

    #[test]
    fn test_codex_build_command() {
        let runner = CodexRunner::new("codex".to_string(), PathBuf::from("."), None);
        let (cmd, args) = runner.build_command("o3");
        assert_eq!(cmd, "codex");
        assert_eq!(args[0], "exec");
        assert!(args.contains(&"o3".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn test_parse_claude_output() {
        let lines = vec![
            "warming up".to_string(),
            r#"{"type":"result","subtype":"success","is_error":false,"result":"Fixed answer."}"#
                .to_string(),
        ];
        assert_eq!(parse_claude_output(&lines).unwrap(), "Fixed answer.");
    }

    #[test]
    fn test_parse_claude_output_error() {
        let lines = vec![r#"{"type":"result","is_error":true,"result":"rate limited"}"#.to_string()];
        let err = parse_claude_output(&lines).unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        assert!(parse_claude_output(&["plain text".to_string()]).is_err());
    }

    #[test]
    fn test_parse_converse_output() {
        let response = serde_json::json!({
            "output": {"message": {"role": "assistant", "content": [{"text": "Rewritten."}]}},
            "stopReason": "end_turn"
        });
        assert_eq!(parse_converse_output(&response).unwrap(), "Rewritten.");
        let empty = serde_json::json!({"output": {"message": {"content": []}}});
        assert!(parse_converse_output(&empty).is_err());
    }

    #[test]
    fn test_converse_body() {
        let body = ConverseGenerator::<crate::api::HttpClient>::build_body("hi");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn test_callback_generator() {
        let generator = CallbackGenerator::new(|prompt: &str, model: &str| Ok(format!("{model}:{prompt}")));
        assert_eq!(generator.generate("p", "m").await.unwrap(), "m:p");
    }

    struct PathRecorder {
        paths: std::sync::Mutex<Vec<String>>,
    }

    impl ApiClient for PathRecorder {
        fn get_json(&self, _path: &str, _query: &[(&str, String)]) -> Result<serde_json::Value> {
            unreachable!("converse never issues GET")
        }

        fn post_json(&self, path: &str, _body: &serde_json::Value) -> Result<serde_json::Value> {
            self.paths.lock().unwrap().push(path.to_string());
            Ok(serde_json::json!({
                "output": {"message": {"content": [{"text": "ok"}]}}
            }))
        }
    }

    #[tokio::test]
    async fn test_converse_model_id_is_escaped() {
        let generator = ConverseGenerator::new(PathRecorder {
            paths: std::sync::Mutex::new(vec![]),
        });
        generator.generate("p", "anthropic.claude-v2:0").await.unwrap();
        generator
            .generate("p", "arn:aws:bedrock:us-east-1:1:inference-profile/x%y")
            .await
            .unwrap();
        let paths = generator.client.paths.lock().unwrap();
        assert_eq!(paths[0], "/model/anthropic.claude-v2%3A0/converse");
        assert_eq!(
            paths[1],
            "/model/arn%3Aaws%3Abedrock%3Aus-east-1%3A1%3Ainference-profile%2Fx%25y/converse"
        );
    }
}
