use serde::Serialize;

use crate::category::Category;
use crate::error::Result;
use crate::prompts::{RewriteContext, render_template};

const MERGE_TEMPLATE: &str = include_str!("default_prompts/merge-rewrites.md");

/// Corrected text produced for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteOutcome {
    pub category: Category,
    pub findings_count: usize,
    pub text: String,
}

#[derive(Serialize)]
struct Correction<'a> {
    number: usize,
    category: &'static str,
    text: &'a str,
}

#[derive(Serialize)]
struct MergeVars<'a> {
    question: &'a str,
    original_answer: &'a str,
    corrections: Vec<Correction<'a>>,
}

/// Build the prompt that fuses several per-category rewrites into one answer.
///
/// `outcomes` must already be in priority order; corrections are numbered in
/// that order. The instruction block is fixed and not overridable.
pub fn compose_merge(context: &RewriteContext, outcomes: &[RewriteOutcome]) -> Result<String> {
    let vars = MergeVars {
        question: &context.question,
        original_answer: &context.original_answer,
        corrections: outcomes
            .iter()
            .enumerate()
            .map(|(i, outcome)| Correction {
                number: i + 1,
                category: outcome.category.as_str(),
                text: &outcome.text,
            })
            .collect(),
    };
    render_template(MERGE_TEMPLATE, &vars)
}
