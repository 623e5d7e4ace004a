use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::category::Category;
use crate::error::{Error, Result};
use crate::finding::FindingFields;

const DEFAULT_POLICY_VIOLATION: &str = include_str!("default_prompts/policy-violation.md");
const DEFAULT_SATISFIABLE: &str = include_str!("default_prompts/satisfiable-but-underspecified.md");
const DEFAULT_INSUFFICIENT_DATA: &str = include_str!("default_prompts/insufficient-data.md");
const DEFAULT_AMBIGUOUS_TRANSLATION: &str =
    include_str!("default_prompts/ambiguous-translation.md");

/// Variables a rewrite template may reference.
pub const KNOWN_VARIABLES: &[&str] = &[
    "domain",
    "question",
    "original_answer",
    "violations",
    "suggestions",
    "applied_rules",
    "policy",
];

fn default_template(category: Category) -> Option<&'static str> {
    match category {
        Category::PolicyViolation => Some(DEFAULT_POLICY_VIOLATION),
        Category::SatisfiableButUnderspecified => Some(DEFAULT_SATISFIABLE),
        Category::InsufficientData => Some(DEFAULT_INSUFFICIENT_DATA),
        Category::AmbiguousTranslation => Some(DEFAULT_AMBIGUOUS_TRANSLATION),
        Category::NoIssue | Category::OverComplexInput => None,
    }
}

fn template_filename(category: Category) -> String {
    format!("{}.md", category.slug())
}

/// Source of per-category rewrite templates.
pub trait TemplateStore {
    /// The template for `category`, or `None` when the category has none.
    fn lookup(&self, category: Category) -> Result<Option<String>>;
}

/// Template store backed by embedded defaults with optional user overrides.
pub struct PromptEngine {
    override_dir: Option<PathBuf>,
}

impl PromptEngine {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }

    /// Load the template for `category`.
    /// A file named `<slug>.md` in `override_dir` takes precedence over the default.
    pub fn load_template(&self, category: Category) -> Result<Option<String>> {
        if !category.is_rewritable() {
            return Ok(None);
        }

        if let Some(ref dir) = self.override_dir {
            let path = dir.join(template_filename(category));
            if path.exists() {
                debug!(path = %path.display(), %category, "using override template");
                return std::fs::read_to_string(&path).map(Some).map_err(|e| {
                    Error::Prompt(format!(
                        "failed to read override template {}: {e}",
                        path.display()
                    ))
                });
            }
        }

        Ok(default_template(category).map(str::to_string))
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.override_dir.as_deref()
    }
}

impl TemplateStore for PromptEngine {
    fn lookup(&self, category: Category) -> Result<Option<String>> {
        self.load_template(category)
    }
}

/// Request-level values shared by every category prompt.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    pub domain: String,
    pub question: String,
    pub original_answer: String,
    pub policy: Option<String>,
}

/// The full substitution set for one category template.
#[derive(Debug, Serialize)]
pub struct RewriteVars<'a> {
    pub domain: &'a str,
    pub question: &'a str,
    pub original_answer: &'a str,
    pub violations: &'a str,
    pub suggestions: &'a str,
    pub applied_rules: &'a str,
    pub policy: Option<&'a str>,
}

impl<'a> RewriteVars<'a> {
    pub fn new(context: &'a RewriteContext, fields: &'a FindingFields) -> Self {
        Self {
            domain: &context.domain,
            question: &context.question,
            original_answer: &context.original_answer,
            violations: &fields.violations,
            suggestions: &fields.suggestions,
            applied_rules: &fields.applied_rules,
            policy: context.policy.as_deref(),
        }
    }
}

/// Build the rewrite prompt for one category.
///
/// Returns `Ok(None)` when the store has no template for `category`. A
/// template that references an unknown variable is an error.
pub fn compose(
    store: &impl TemplateStore,
    category: Category,
    context: &RewriteContext,
    fields: &FindingFields,
) -> Result<Option<String>> {
    let Some(template) = store.lookup(category)? else {
        return Ok(None);
    };
    render_template(&template, &RewriteVars::new(context, fields)).map(Some)
}

/// Render `template` strictly: every `{{ variable }}` must be present in `vars`.
pub fn render_template(template: &str, vars: &impl Serialize) -> Result<String> {
    let engine = upon::Engine::new();
    let compiled = engine
        .compile(template)
        .map_err(|e| Error::Prompt(format!("invalid template: {e}")))?;
    compiled
        .render(&engine, vars)
        .to_string()
        .map_err(|e| Error::Prompt(format!("template rendering failed: {e}")))
}
