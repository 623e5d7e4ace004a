use clap::{Args, Parser, Subcommand};

use crate::runner::GeneratorKind;
use crate::validation::ContentSource;

/// arc-rewrite: validate answers against automated-reasoning guardrails and rewrite violations
#[derive(Parser, Debug, Clone)]
#[command(name = "arc-rewrite", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,

    /// Path to config file (default: .arc-rewrite.toml if present)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// AWS region of the guardrail and model endpoints
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Text generator to use (converse, claude, codex)
    #[arg(long, global = true, value_enum)]
    pub generator: Option<GeneratorKind>,

    /// Model used for rewriting
    #[arg(long, global = true)]
    pub model: Option<String>,
}

/// Guardrail identity shared by several subcommands.
#[derive(Args, Debug, Clone)]
pub struct GuardrailArgs {
    /// Guardrail identifier (ID or ARN)
    #[arg(long = "guardrail", short = 'g')]
    pub guardrail_id: String,

    /// Guardrail version number or DRAFT
    #[arg(long)]
    pub guardrail_version: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Validate an answer and rewrite it to resolve any policy findings
    Rewrite {
        #[command(flatten)]
        guardrail: GuardrailArgs,

        /// The user's original question
        #[arg(long, short = 'q')]
        question: String,

        /// The answer to validate
        #[arg(long, short = 'a', required_unless_present = "answer_file")]
        answer: Option<String>,

        /// Read the answer from a file
        #[arg(long, conflicts_with = "answer")]
        answer_file: Option<String>,

        /// Domain label used in prompts (e.g. Healthcare, Finance)
        #[arg(long)]
        domain: Option<String>,

        /// File with the policy definition text to include in prompts
        #[arg(long)]
        policy_file: Option<String>,

        /// Directory with prompt template overrides
        #[arg(long)]
        template_dir: Option<String>,
    },

    /// Validate content against a guardrail without rewriting
    Validate {
        #[command(flatten)]
        guardrail: GuardrailArgs,

        /// Content to validate
        #[arg(long, short = 'c', required_unless_present = "content_file")]
        content: Option<String>,

        /// Read the content from a file
        #[arg(long, conflicts_with = "content")]
        content_file: Option<String>,

        /// Whether the content is model input or output
        #[arg(long, value_enum, default_value = "output")]
        source: ContentSource,
    },

    /// List guardrails that carry automated-reasoning policies
    List {
        /// Maximum number of guardrails to inspect (1-100)
        #[arg(long)]
        max_results: Option<u32>,
    },

    /// Show details of one guardrail
    Info {
        #[command(flatten)]
        guardrail: GuardrailArgs,
    },
}
