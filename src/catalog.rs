use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{ApiClient, url_segment};
use crate::error::{Error, Result};
use crate::validation::{DRAFT_VERSION, PolicyRef};

pub const MAX_LIST_RESULTS: u32 = 100;
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

// ---------------------------------------------------------------------------
// Control-plane response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arn: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningPolicyConfig {
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailDetail {
    pub guardrail_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub guardrail_arn: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub automated_reasoning_policy_config: Option<ReasoningPolicyConfig>,
}

impl GuardrailDetail {
    /// Number of automated-reasoning policies attached to this guardrail.
    pub fn policy_count(&self) -> usize {
        self.automated_reasoning_policy_config
            .as_ref()
            .map_or(0, |c| c.policies.len())
    }
}

// ---------------------------------------------------------------------------
// Source abstraction
// ---------------------------------------------------------------------------

pub trait CatalogSource {
    /// List guardrails, at most `max_results`.
    fn list(&self, max_results: u32) -> Result<Vec<GuardrailSummary>>;

    /// Full detail of one guardrail version.
    fn get(&self, policy: &PolicyRef) -> Result<GuardrailDetail>;
}

/// Catalog backed by the guardrail control-plane API.
pub struct GuardrailCatalog<C> {
    client: C,
}

impl<C: ApiClient> GuardrailCatalog<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    guardrails: Vec<GuardrailSummary>,
}

impl<C: ApiClient> CatalogSource for GuardrailCatalog<C> {
    fn list(&self, max_results: u32) -> Result<Vec<GuardrailSummary>> {
        let json = self
            .client
            .get_json("/guardrails", &[("maxResults", max_results.to_string())])?;
        let response: ListResponse = serde_json::from_value(json)
            .map_err(|e| Error::Catalog(format!("failed to parse guardrail list: {e}")))?;
        Ok(response.guardrails)
    }

    fn get(&self, policy: &PolicyRef) -> Result<GuardrailDetail> {
        let path = format!("/guardrails/{}", url_segment(&policy.id));
        let json = self
            .client
            .get_json(&path, &[("guardrailVersion", policy.version.clone())])?;
        serde_json::from_value(json)
            .map_err(|e| Error::Catalog(format!("failed to parse guardrail detail: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub arn: String,
    pub description: String,
    pub status: String,
    pub has_arc_policies: bool,
    pub arc_policy_count: usize,
    pub latest_version: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogListing {
    pub guardrails: Vec<CatalogEntry>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArcPolicies {
    pub count: usize,
    pub policy_arns: Vec<String>,
    pub confidence_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardrailInfo {
    pub id: String,
    pub name: String,
    pub arn: String,
    pub description: String,
    pub status: String,
    pub version: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub arc_policies: Option<ArcPolicies>,
}

/// List guardrails that have at least one automated-reasoning policy attached.
///
/// Each listed guardrail's DRAFT detail is fetched to count its policies;
/// guardrails whose detail cannot be read are skipped.
pub fn list_policy_catalog(source: &impl CatalogSource, max_results: u32) -> Result<CatalogListing> {
    let max_results = max_results.clamp(1, MAX_LIST_RESULTS);
    info!(max_results, "listing guardrails");

    let mut guardrails = Vec::new();
    for item in source.list(max_results)? {
        let draft = PolicyRef {
            id: item.id.clone(),
            version: DRAFT_VERSION.to_string(),
        };
        let detail = match source.get(&draft) {
            Ok(detail) => detail,
            Err(e) => {
                warn!(id = %item.id, error = %e, "could not retrieve guardrail details");
                continue;
            }
        };

        let policy_count = detail.policy_count();
        if policy_count == 0 {
            continue;
        }
        guardrails.push(CatalogEntry {
            id: item.id,
            name: item.name,
            arn: item.arn,
            description: item.description,
            status: item.status,
            has_arc_policies: true,
            arc_policy_count: policy_count,
            latest_version: item.version.unwrap_or_else(|| DRAFT_VERSION.to_string()),
            created_at: item.created_at,
            updated_at: item.updated_at,
        });
    }

    info!(count = guardrails.len(), "found guardrails with ARC policies");
    Ok(CatalogListing {
        count: guardrails.len(),
        guardrails,
    })
}

/// Describe one guardrail version, including its automated-reasoning configuration.
pub fn guardrail_info(source: &impl CatalogSource, policy: &PolicyRef) -> Result<GuardrailInfo> {
    info!(%policy, "fetching guardrail info");
    let detail = source.get(policy)?;

    let arc_policies = detail
        .automated_reasoning_policy_config
        .map(|config| ArcPolicies {
            count: config.policies.len(),
            confidence_threshold: config
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            policy_arns: config.policies,
        });

    Ok(GuardrailInfo {
        id: detail.guardrail_id,
        name: detail.name,
        arn: detail.guardrail_arn,
        description: detail.description,
        status: detail.status,
        version: detail.version,
        created_at: detail.created_at,
        updated_at: detail.updated_at,
        arc_policies,
    })
}
