use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use arc_rewrite::api::{HttpClient, resolve_api_key};
use arc_rewrite::catalog::{GuardrailCatalog, guardrail_info, list_policy_catalog};
use arc_rewrite::cli::{Cli, CliCommand, GuardrailArgs};
use arc_rewrite::config::Config;
use arc_rewrite::error::{Error, Result};
use arc_rewrite::handler::{RewriteInvocation, summarize};
use arc_rewrite::prompts::PromptEngine;
use arc_rewrite::rewriter::Rewriter;
use arc_rewrite::runner::build_generator;
use arc_rewrite::validation::{GuardrailValidator, PolicyRef, ValidateOutcome, validate_content};

/// Exit code when an upstream service reported an error.
const EXIT_UPSTREAM: i32 = 2;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    info!(?config, "config loaded");

    match run(cli.command, &config).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(command: CliCommand, config: &Config) -> Result<i32> {
    match command {
        CliCommand::Rewrite {
            guardrail,
            question,
            answer,
            answer_file,
            domain,
            policy_file,
            template_dir,
        } => {
            let policy = policy_ref(&guardrail, config)?;
            let answer = read_text(answer, answer_file)?;
            let policy_definition = policy_file.map(std::fs::read_to_string).transpose()?;

            let validator = GuardrailValidator::new(runtime_client(config)?);
            let generator = build_generator(
                config.generator,
                runtime_client(config)?,
                config.generator_binary.as_deref(),
                config.generator_timeout.map(Duration::from_secs),
            );
            let templates =
                PromptEngine::new(template_dir.or(config.template_dir.clone()).map(PathBuf::from));
            let rewriter = Rewriter::new(generator, templates);

            let invocation = RewriteInvocation {
                question,
                answer,
                policy,
                model: config.model.clone(),
                domain: domain.or(config.domain.clone()),
                policy_definition,
            };
            let outcome = summarize(&validator, &rewriter, invocation)
                .await
                .inspect_err(|e| error!(error = %e, "rewrite aborted"))?;
            print_json(&outcome)?;
            Ok(if outcome.is_error() { EXIT_UPSTREAM } else { 0 })
        }
        CliCommand::Validate {
            guardrail,
            content,
            content_file,
            source,
        } => {
            let policy = policy_ref(&guardrail, config)?;
            let content = read_text(content, content_file)?;
            let validator = GuardrailValidator::new(runtime_client(config)?);
            let outcome = validate_content(&validator, &policy, &content, source);
            print_json(&outcome)?;
            Ok(match outcome {
                ValidateOutcome::Report(_) => 0,
                ValidateOutcome::Error(_) => EXIT_UPSTREAM,
            })
        }
        CliCommand::List { max_results } => {
            let catalog = GuardrailCatalog::new(control_client(config)?);
            let listing = list_policy_catalog(&catalog, max_results.unwrap_or(config.max_results))?;
            print_json(&listing)?;
            Ok(0)
        }
        CliCommand::Info { guardrail } => {
            let policy = policy_ref(&guardrail, config)?;
            let catalog = GuardrailCatalog::new(control_client(config)?);
            let info = guardrail_info(&catalog, &policy)?;
            print_json(&info)?;
            Ok(0)
        }
    }
}

fn policy_ref(args: &GuardrailArgs, config: &Config) -> Result<PolicyRef> {
    let version = args
        .guardrail_version
        .as_deref()
        .unwrap_or(&config.guardrail_version);
    PolicyRef::parse(&args.guardrail_id, version)
}

fn runtime_client(config: &Config) -> Result<HttpClient> {
    http_client(&config.runtime_endpoint, config)
}

fn control_client(config: &Config) -> Result<HttpClient> {
    http_client(&config.control_endpoint, config)
}

fn http_client(endpoint: &str, config: &Config) -> Result<HttpClient> {
    Ok(HttpClient::new(
        endpoint,
        resolve_api_key(&config.api_key_env)?,
        config.max_retries,
        Duration::from_secs(config.request_timeout),
    ))
}

fn read_text(inline: Option<String>, file: Option<String>) -> Result<String> {
    match (inline, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => Ok(std::fs::read_to_string(path)?),
        (None, None) => Err(Error::ConfigValidation(
            "no text given (use the inline flag or its file variant)".to_string(),
        )),
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{json}");
    Ok(())
}
