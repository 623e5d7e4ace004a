use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::finding::Finding;

/// Canonical classification of a validator finding.
///
/// Variants are declared in ascending priority so the derived `Ord` agrees
/// with [`Category::priority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    NoIssue,
    OverComplexInput,
    AmbiguousTranslation,
    InsufficientData,
    SatisfiableButUnderspecified,
    PolicyViolation,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::NoIssue,
        Category::OverComplexInput,
        Category::AmbiguousTranslation,
        Category::InsufficientData,
        Category::SatisfiableButUnderspecified,
        Category::PolicyViolation,
    ];

    /// Urgency rank; higher ranks are fixed first and dominate a merge.
    pub const fn priority(self) -> u8 {
        match self {
            Category::PolicyViolation => 10,
            Category::SatisfiableButUnderspecified => 8,
            Category::InsufficientData => 7,
            Category::AmbiguousTranslation => 6,
            Category::OverComplexInput => 5,
            Category::NoIssue => 0,
        }
    }

    /// Map a validator outcome string to its category.
    pub fn from_outcome(outcome: &str) -> Option<Self> {
        match outcome {
            "VALID" => Some(Category::NoIssue),
            "INVALID" => Some(Category::PolicyViolation),
            "SATISFIABLE" => Some(Category::SatisfiableButUnderspecified),
            "NO_DATA" => Some(Category::InsufficientData),
            "TRANSLATION_AMBIGUOUS" => Some(Category::AmbiguousTranslation),
            "TOO_COMPLEX" => Some(Category::OverComplexInput),
            _ => None,
        }
    }

    /// The validator outcome string that maps to this category.
    pub const fn outcome(self) -> &'static str {
        match self {
            Category::NoIssue => "VALID",
            Category::PolicyViolation => "INVALID",
            Category::SatisfiableButUnderspecified => "SATISFIABLE",
            Category::InsufficientData => "NO_DATA",
            Category::AmbiguousTranslation => "TRANSLATION_AMBIGUOUS",
            Category::OverComplexInput => "TOO_COMPLEX",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Category::NoIssue => "NO_ISSUE",
            Category::PolicyViolation => "POLICY_VIOLATION",
            Category::SatisfiableButUnderspecified => "SATISFIABLE_BUT_UNDERSPECIFIED",
            Category::InsufficientData => "INSUFFICIENT_DATA",
            Category::AmbiguousTranslation => "AMBIGUOUS_TRANSLATION",
            Category::OverComplexInput => "OVER_COMPLEX_INPUT",
        }
    }

    /// File-name stem used for this category's prompt template.
    pub const fn slug(self) -> &'static str {
        match self {
            Category::NoIssue => "no-issue",
            Category::PolicyViolation => "policy-violation",
            Category::SatisfiableButUnderspecified => "satisfiable-but-underspecified",
            Category::InsufficientData => "insufficient-data",
            Category::AmbiguousTranslation => "ambiguous-translation",
            Category::OverComplexInput => "over-complex-input",
        }
    }

    /// Whether a per-category rewrite prompt is ever composed for this category.
    ///
    /// `NoIssue` needs no fix and `OverComplexInput` gets a canned reply, so
    /// neither has a template.
    pub const fn is_rewritable(self) -> bool {
        !matches!(self, Category::NoIssue | Category::OverComplexInput)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Findings grouped by category, in input order within each group.
pub type Classified<'a> = BTreeMap<Category, Vec<&'a Finding>>;

/// Group findings by category. Findings with an unrecognized outcome are dropped.
pub fn classify(findings: &[Finding]) -> Classified<'_> {
    let mut grouped: Classified<'_> = BTreeMap::new();
    for finding in findings {
        match Category::from_outcome(&finding.outcome) {
            Some(category) => grouped.entry(category).or_default().push(finding),
            None => debug!(outcome = %finding.outcome, "dropping unrecognized finding outcome"),
        }
    }
    grouped
}

/// Categories present in `grouped`, most urgent first.
pub fn prioritize(grouped: &Classified<'_>) -> Vec<Category> {
    let mut categories: Vec<Category> = grouped.keys().copied().collect();
    categories.sort_by_key(|c| std::cmp::Reverse(c.priority()));
    categories
}
