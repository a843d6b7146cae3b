// SPDX-License-Identifier: MIT

//! Collaboration lead search
//!
//! Searches the web for Instagram accounts in a niche and collects their
//! handles together with any contact hints found in the result snippets.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

use crate::engine::{step_fn, Graph, GraphError, StepContext, StepError, WorkflowState, END};
use crate::waypoint::config::CollaborationSettings;

pub const NAME: &str = "collaboration";

/// Brave returns at most 20 results per request and 10 pages per query
const MAX_PAGE_SIZE: usize = 20;
const MAX_PAGES: usize = 10;

const IGNORED_HANDLES: [&str; 3] = ["instagram", "explore", "p"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

/// Web search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Fetch page `page` (0-based) of `count` results for `query`
    async fn search(&self, query: &str, count: usize, page: usize) -> Result<Vec<SearchHit>, StepError>;
}

pub struct BraveSearchProvider {
    client: Client,
    api_key: Option<String>,
}

impl BraveSearchProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl SearchProvider for BraveSearchProvider {
    async fn search(&self, query: &str, count: usize, page: usize) -> Result<Vec<SearchHit>, StepError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| StepError::failed("BRAVE_API_KEY must be set"))?;

        let mut url = reqwest::Url::parse("https://api.search.brave.com/res/v1/web/search")
            .map_err(|e| StepError::failed(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("count", &count.min(MAX_PAGE_SIZE).to_string())
            .append_pair("offset", &page.to_string());

        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            let text = resp.text().await?;
            return Err(StepError::failed(format!("Brave API error: {}", text)));
        }

        let body: Value = resp.json().await?;
        let results = match body.get("web").and_then(|w| w.get("results")) {
            Some(results) => results.clone(),
            // no web section means no hits for this page
            None => return Ok(Vec::new()),
        };
        Ok(serde_json::from_value(results)?)
    }
}

/// Search parameters parsed from the run input
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub niche: String,
    pub location: String,
    pub max_results: usize,
    pub max_pages: usize,
}

impl SearchParams {
    /// Parse `niche: ...; location: ...; max_results: N; max_pages: N`
    pub fn parse(input: &str, settings: &CollaborationSettings) -> Result<Self, StepError> {
        let mut niche = None;
        let mut params = Self {
            niche: String::new(),
            location: String::new(),
            max_results: settings.max_results,
            max_pages: settings.max_pages,
        };

        for line in input.split([';', '\n']) {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim().to_lowercase().as_str() {
                "niche" => niche = Some(value.to_string()),
                "location" => params.location = value.to_string(),
                "max_results" => params.max_results = value.parse().unwrap_or(10),
                "max_pages" => params.max_pages = value.parse().unwrap_or(10),
                _ => {}
            }
        }

        params.niche = niche.ok_or_else(|| StepError::failed("Niche is required"))?;
        Ok(params)
    }

    pub fn queries(&self) -> [String; 2] {
        [
            format!(
                "site:instagram.com \"{}\" \"www.\" \"{}\" -inurl:/reel/ -inurl:/p/",
                self.niche, self.location
            ),
            format!(
                "site:instagram.com \"official account\" \"{}\" \"{}\" -inurl:/reel/ -inurl:/p/",
                self.niche, self.location
            ),
        ]
    }
}

/// Handles linked from `text`, in order of appearance
pub fn extract_handles(text: &str) -> Vec<String> {
    const MARKER: &str = "instagram.com/";
    let mut handles = Vec::new();
    let mut rest = text;
    while let Some(idx) = rest.find(MARKER) {
        rest = &rest[idx + MARKER.len()..];
        let handle: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '.')
            .collect();
        if !handle.is_empty() && !IGNORED_HANDLES.contains(&handle.as_str()) {
            handles.push(handle);
        }
    }
    handles
}

fn is_email_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '-'
}

/// First email address in `text`
pub fn extract_email(text: &str) -> Option<String> {
    for (at, _) in text.match_indices('@') {
        let Some((local_start, _)) = text[..at]
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_email_char(*c))
            .last()
        else {
            continue;
        };
        let domain: String = text[at + 1..].chars().take_while(|c| is_email_char(*c)).collect();
        let domain = domain.trim_end_matches(|c: char| !c.is_ascii_alphabetic());

        let Some((host, tld)) = domain.rsplit_once('.') else {
            continue;
        };
        if host.is_empty() || tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
            continue;
        }
        return Some(format!("{}@{}", &text[local_start..at], domain));
    }
    None
}

/// Contact hints found in a result snippet
pub fn extract_contact_info(text: &str) -> Value {
    let mut info = serde_json::Map::new();
    if let Some(email) = extract_email(text) {
        info.insert("email".to_string(), json!(email));
    }

    let lower = text.to_lowercase();
    let method = if lower.contains("dm") || lower.contains("direct message") {
        Some("DM on Instagram")
    } else if lower.contains("email") {
        Some("Email")
    } else if lower.contains("link in bio") {
        Some("Link in bio")
    } else {
        None
    };
    if let Some(method) = method {
        info.insert("method".to_string(), json!(method));
    }
    Value::Object(info)
}

/// Unique opportunities from `hits`, first occurrence wins
pub fn collect_opportunities(hits: &[SearchHit]) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut opportunities = Vec::new();
    for hit in hits {
        for handle in extract_handles(&hit.url) {
            if !seen.insert(handle.clone()) {
                continue;
            }
            opportunities.push(json!({
                "handle": handle,
                "profile_url": format!("https://instagram.com/{}", handle),
                "source": hit.title,
                "description": hit.description,
                "contact_info": extract_contact_info(&hit.description),
            }));
        }
    }
    opportunities
}

async fn search_all(
    provider: &dyn SearchProvider,
    params: &SearchParams,
    ctx: &StepContext,
) -> Result<Vec<SearchHit>, StepError> {
    let per_page = params.max_results.clamp(1, MAX_PAGE_SIZE);
    let pages = params.max_pages.min(MAX_PAGES);
    let mut hits = Vec::new();

    for query in params.queries() {
        for page in 0..pages {
            ctx.check_cancelled()?;
            log::info!(
                "[{}] fetching page {}/{} for {}",
                ctx.thread_id(),
                page + 1,
                pages,
                query
            );
            let results = provider.search(&query, per_page, page).await?;
            let done = results.len() < per_page;
            hits.extend(results);
            if done {
                break;
            }
        }
    }
    Ok(hits)
}

/// Build the collaboration search graph
pub fn build(settings: &CollaborationSettings, provider: Arc<dyn SearchProvider>) -> Result<Graph, GraphError> {
    let settings = settings.clone();

    Graph::builder()
        .step(
            "extract_parameters",
            step_fn(move |mut state: WorkflowState, _ctx: StepContext| {
                let parsed = SearchParams::parse(&state.input, &settings);
                async move {
                    let params = parsed?;
                    log::info!("Searching '{}' in '{}'", params.niche, params.location);
                    state.update("niche", json!(params.niche))?;
                    state.update("location", json!(params.location))?;
                    state.update("max_results", json!(params.max_results))?;
                    state.update("max_pages", json!(params.max_pages))?;
                    Ok(state)
                }
            }),
        )
        .step(
            "find_collaborations",
            step_fn(move |state: WorkflowState, ctx: StepContext| {
                let provider = provider.clone();
                async move { find_collaborations(state, ctx, provider.as_ref()).await }
            }),
        )
        .entry("extract_parameters")
        .edge("extract_parameters", "find_collaborations")
        .edge("find_collaborations", END)
        .build()
}

async fn find_collaborations(
    mut state: WorkflowState,
    ctx: StepContext,
    provider: &dyn SearchProvider,
) -> Result<WorkflowState, StepError> {
    let as_count = |key: &str| state.get_i64(key).unwrap_or(10).max(0) as usize;
    let params = SearchParams {
        niche: state.get_str("niche").unwrap_or_default().to_string(),
        location: state.get_str("location").unwrap_or_default().to_string(),
        max_results: as_count("max_results"),
        max_pages: as_count("max_pages"),
    };

    let hits = match search_all(provider, &params, &ctx).await {
        Ok(hits) => hits,
        Err(StepError::Failed(message)) => {
            return Err(StepError::failed(format!(
                "Error finding collaborations: {}",
                message
            )))
        }
        Err(other) => return Err(other),
    };

    let profiles = collect_opportunities(&hits);
    log::info!(
        "[{}] found {} collaboration opportunities",
        ctx.thread_id(),
        profiles.len()
    );
    state.update(
        "collaboration_result",
        json!({ "success": true, "profiles": profiles }),
    )?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(title: &str, url: &str, description: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            url: url.to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_parse_params() {
        let params = SearchParams::parse(
            "Niche: vegan baking; location: Berlin\nmax_results: 5;max_pages: lots",
            &CollaborationSettings::default(),
        )
        .unwrap();
        assert_eq!(params.niche, "vegan baking");
        assert_eq!(params.location, "Berlin");
        assert_eq!(params.max_results, 5);
        assert_eq!(params.max_pages, 10);
    }

    #[test]
    fn test_niche_is_required() {
        let err = SearchParams::parse("location: Berlin", &CollaborationSettings::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "Niche is required");
    }

    #[test]
    fn test_queries() {
        let params = SearchParams {
            niche: "yoga".into(),
            location: "Lisbon".into(),
            max_results: 10,
            max_pages: 1,
        };
        let [first, second] = params.queries();
        assert_eq!(
            first,
            "site:instagram.com \"yoga\" \"www.\" \"Lisbon\" -inurl:/reel/ -inurl:/p/"
        );
        assert!(second.contains("\"official account\""));
    }

    #[test]
    fn test_extract_handles_skips_reserved_paths() {
        assert_eq!(
            extract_handles("https://www.instagram.com/bake.with_me/"),
            vec!["bake.with_me"]
        );
        assert!(extract_handles("https://instagram.com/explore/tags/x").is_empty());
        assert!(extract_handles("https://example.com/about").is_empty());
    }

    #[test]
    fn test_extract_email() {
        assert_eq!(
            extract_email("Collabs: hello.world@studio-x.com. DM for rates"),
            Some("hello.world@studio-x.com".to_string())
        );
        assert_eq!(extract_email("follow @yoga.daily"), None);
        assert_eq!(
            extract_email("@yoga.daily, bookings: team@yoga.io"),
            Some("team@yoga.io".to_string())
        );
        assert_eq!(extract_email("mail me at a@b"), None);
    }

    #[test]
    fn test_contact_method_precedence() {
        assert_eq!(
            extract_contact_info("Send a direct message or email")["method"],
            json!("DM on Instagram")
        );
        assert_eq!(
            extract_contact_info("Business email below")["method"],
            json!("Email")
        );
        assert_eq!(
            extract_contact_info("Shop via link in bio")["method"],
            json!("Link in bio")
        );
        assert_eq!(extract_contact_info("Nothing here"), json!({}));
    }

    #[test]
    fn test_collect_dedupes_by_handle() {
        let hits = vec![
            hit("Bakes", "https://instagram.com/bakes", "email bakes@mail.com"),
            hit("Bakes again", "https://instagram.com/bakes/", "other"),
            hit("Home", "https://instagram.com/p/abc", ""),
        ];
        let found = collect_opportunities(&hits);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["source"], json!("Bakes"));
        assert_eq!(found[0]["contact_info"]["email"], json!("bakes@mail.com"));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let provider = BraveSearchProvider::new(None);
        let err = provider.search("x", 10, 0).await.unwrap_err();
        assert_eq!(err.to_string(), "BRAVE_API_KEY must be set");
    }
}
