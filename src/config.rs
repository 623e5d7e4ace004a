use std::path::Path;

use serde::Deserialize;

use crate::catalog::MAX_LIST_RESULTS;
use crate::cli::Cli;
use crate::error::{Error, Result};
use crate::runner::GeneratorKind;
use crate::validation::DRAFT_VERSION;

pub const DEFAULT_CONFIG_PATH: &str = ".arc-rewrite.toml";
pub const DEFAULT_API_KEY_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub region: Option<String>,
    pub runtime_endpoint: Option<String>,
    pub control_endpoint: Option<String>,
    pub api_key_env: Option<String>,
    pub generator: Option<String>,
    pub generator_binary: Option<String>,
    pub model: Option<String>,
    pub generator_timeout: Option<u64>,
    pub request_timeout: Option<u64>,
    pub max_retries: Option<u32>,
    pub domain: Option<String>,
    pub template_dir: Option<String>,
    pub guardrail_version: Option<String>,
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub region: String,
    pub runtime_endpoint: String,
    pub control_endpoint: String,
    pub api_key_env: String,
    pub generator: GeneratorKind,
    pub generator_binary: Option<String>,
    pub model: String,
    /// Seconds; applies to CLI generators.
    pub generator_timeout: Option<u64>,
    /// Seconds; applies to HTTP requests.
    pub request_timeout: u64,
    pub max_retries: u32,
    pub domain: Option<String>,
    pub template_dir: Option<String>,
    pub guardrail_version: String,
    pub max_results: u32,
}

impl Config {
    /// Load the config file (if any) and merge CLI overrides on top.
    ///
    /// An explicitly named config file must exist; the default one is optional.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file_config = match cli.config.as_deref() {
            Some(path) => {
                let path = Path::new(path);
                if !path.exists() {
                    return Err(Error::ConfigNotFound(path.to_path_buf()));
                }
                parse_config(&std::fs::read_to_string(path)?)?
            }
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    parse_config(&std::fs::read_to_string(path)?)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        merge(file_config, cli)
    }
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ConfigFile) -> Result<()> {
    if let Some(ref generator) = config.generator {
        generator.parse::<GeneratorKind>()?;
    }
    if let Some(timeout) = config.generator_timeout
        && timeout == 0
    {
        return Err(Error::ConfigValidation(
            "generator_timeout must be > 0".to_string(),
        ));
    }
    if let Some(timeout) = config.request_timeout
        && timeout == 0
    {
        return Err(Error::ConfigValidation(
            "request_timeout must be > 0".to_string(),
        ));
    }
    if let Some(retries) = config.max_retries
        && retries == 0
    {
        return Err(Error::ConfigValidation(
            "max_retries must be > 0".to_string(),
        ));
    }
    if let Some(max) = config.max_results
        && !(1..=MAX_LIST_RESULTS).contains(&max)
    {
        return Err(Error::ConfigValidation(format!(
            "max_results must be between 1 and {MAX_LIST_RESULTS}"
        )));
    }
    if let Some(ref model) = config.model
        && model.trim().is_empty()
    {
        return Err(Error::ConfigValidation("model must not be empty".to_string()));
    }
    Ok(())
}

fn default_model(generator: GeneratorKind) -> &'static str {
    match generator {
        GeneratorKind::Converse => "anthropic.claude-3-5-sonnet-20241022-v2:0",
        GeneratorKind::Claude => "sonnet",
        GeneratorKind::Codex => "o3",
    }
}

pub fn merge(file: ConfigFile, cli: &Cli) -> Result<Config> {
    let generator = match (cli.generator, file.generator.as_deref()) {
        (Some(kind), _) => kind,
        (None, Some(name)) => name.parse()?,
        (None, None) => GeneratorKind::Converse,
    };
    let region = cli
        .region
        .clone()
        .or(file.region)
        .unwrap_or_else(|| "us-east-1".to_string());

    Ok(Config {
        runtime_endpoint: file
            .runtime_endpoint
            .unwrap_or_else(|| format!("https://bedrock-runtime.{region}.amazonaws.com")),
        control_endpoint: file
            .control_endpoint
            .unwrap_or_else(|| format!("https://bedrock.{region}.amazonaws.com")),
        region,
        api_key_env: file
            .api_key_env
            .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
        generator,
        generator_binary: file.generator_binary,
        model: cli
            .model
            .clone()
            .or(file.model)
            .unwrap_or_else(|| default_model(generator).to_string()),
        generator_timeout: file.generator_timeout,
        request_timeout: file.request_timeout.unwrap_or(60),
        max_retries: file.max_retries.unwrap_or(3),
        domain: file.domain,
        template_dir: file.template_dir,
        guardrail_version: file
            .guardrail_version
            .unwrap_or_else(|| DRAFT_VERSION.to_string()),
        max_results: file.max_results.unwrap_or(20),
    })
}
