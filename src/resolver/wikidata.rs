//! Wikidata resolver implementation
//!
//! Searches `wbsearchentities` for the candidate's name, filters hits through a
//! relevance strategy and optionally checks the publication year (P577) over
//! SPARQL before accepting a hit.

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::domain::{Candidate, ResolutionError, ResolutionOutcome};
use crate::error::{LinkerError, Result};
use crate::resolver::client::Resolver;
use crate::resolver::relevance::{DescriptionKeywords, RelevanceStrategy, SearchHit};
use crate::scheduler::AuthMode;

/// Wikidata action API endpoint
pub const DEFAULT_SEARCH_URL: &str = "https://www.wikidata.org/w/api.php";

/// Wikidata query service endpoint
pub const DEFAULT_SPARQL_URL: &str = "https://query.wikidata.org/sparql";

/// Prefix of the entity URIs written into `same_as`
pub const ENTITY_URI_PREFIX: &str = "http://www.wikidata.org/entity/";

const DEFAULT_USER_AGENT: &str = concat!("idlinker/", env!("CARGO_PKG_VERSION"), " (video game linker)");

static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)").expect("parenthesized-fragment pattern is valid"));

static ENTITY_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Q[0-9]+$").expect("entity id pattern is valid"));

/// Configuration for the Wikidata resolver
#[derive(Debug, Clone)]
pub struct WikidataConfig {
    pub search_url: String,
    pub sparql_url: String,
    pub user_agent: String,
    pub language: String,
    /// Hits requested per search
    pub search_limit: u32,
    /// Per-request HTTP timeout
    pub timeout: Duration,
    /// Bearer token sent in authenticated mode
    pub auth_token: Option<String>,
    /// Accept a hit only if its publication year is within this many years
    pub year_tolerance: Option<i32>,
    /// Most year lookups made for one candidate; each one is an extra request
    pub max_year_checks: usize,
}

impl Default for WikidataConfig {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_SEARCH_URL.to_string(),
            sparql_url: DEFAULT_SPARQL_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            language: "en".to_string(),
            search_limit: 5,
            timeout: Duration::from_secs(15),
            auth_token: None,
            year_tolerance: Some(1),
            max_year_checks: 3,
        }
    }
}

/// Wikidata lookup client
pub struct WikidataResolver {
    client: Client,
    config: WikidataConfig,
    relevance: Box<dyn RelevanceStrategy>,
}

impl WikidataResolver {
    /// Create a resolver with the default description-keyword relevance check
    pub fn new(config: WikidataConfig) -> Result<Self> {
        Self::with_strategy(config, Box::new(DescriptionKeywords::default()))
    }

    pub fn with_strategy(config: WikidataConfig, relevance: Box<dyn RelevanceStrategy>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| LinkerError::Resolver(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            relevance,
        })
    }

    pub fn config(&self) -> &WikidataConfig {
        &self.config
    }

    /// Resolve to a bare entity id ("Q123"), or None when nothing relevant matched
    async fn lookup(
        &self,
        candidate: &Candidate,
        auth_mode: AuthMode,
    ) -> std::result::Result<Option<String>, ResolutionError> {
        let query = clean_name(&candidate.name);
        if query.is_empty() {
            return Ok(None);
        }

        let hits = self.search(&query, auth_mode).await?;
        let year_check = match (self.config.year_tolerance, candidate.year) {
            (Some(tolerance), Some(expected)) => Some(YearCheck {
                expected,
                tolerance,
                max_checks: self.config.max_year_checks,
            }),
            _ => None,
        };

        let hit = choose_hit(candidate, &hits, self.relevance.as_ref(), year_check, |id| {
            self.publication_year(id, auth_mode)
        })
        .await;
        Ok(hit.map(|h| h.id.clone()))
    }

    async fn search(&self, query: &str, auth_mode: AuthMode) -> std::result::Result<Vec<SearchHit>, ResolutionError> {
        let limit = self.config.search_limit.to_string();
        let request = self.client.get(&self.config.search_url).query(&[
            ("action", "wbsearchentities"),
            ("format", "json"),
            ("language", self.config.language.as_str()),
            ("type", "item"),
            ("search", query),
            ("limit", limit.as_str()),
        ]);

        let body = self.send(request, auth_mode).await?;
        parse_search_body(&body)
    }

    async fn publication_year(
        &self,
        entity_id: &str,
        auth_mode: AuthMode,
    ) -> std::result::Result<Option<i32>, ResolutionError> {
        if !ENTITY_ID.is_match(entity_id) {
            return Err(ResolutionError::Malformed(format!("unexpected entity id {}", entity_id)));
        }
        let sparql = format!(
            "SELECT ?year WHERE {{ wd:{} wdt:P577 ?publicationDate . BIND(YEAR(?publicationDate) AS ?year) }}",
            entity_id
        );
        let request = self
            .client
            .get(&self.config.sparql_url)
            .query(&[("query", sparql.as_str()), ("format", "json")]);

        let body = self.send(request, auth_mode).await?;
        parse_sparql_year(&body)
    }

    /// Attach auth, send, and map transport/status failures
    async fn send(&self, mut request: RequestBuilder, auth_mode: AuthMode) -> std::result::Result<String, ResolutionError> {
        if auth_mode.is_authenticated()
            && let Some(token) = &self.config.auth_token
        {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let response = check_status(response)?;
        response.text().await.map_err(|e| self.map_transport(e))
    }

    fn map_transport(&self, error: reqwest::Error) -> ResolutionError {
        if error.is_timeout() {
            ResolutionError::Timeout(self.config.timeout)
        } else {
            ResolutionError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl Resolver for WikidataResolver {
    async fn resolve(&self, candidate: &Candidate, auth_mode: AuthMode) -> ResolutionOutcome {
        match self.lookup(candidate, auth_mode).await {
            Ok(Some(id)) => ResolutionOutcome::Matched(entity_uri(&id)),
            Ok(None) => ResolutionOutcome::NotFound,
            Err(e) => {
                log::debug!("Lookup for '{}' failed: {}", candidate.name, e);
                ResolutionOutcome::Error(e)
            }
        }
    }
}

/// Strip parenthesized qualifiers: "Tetris (1989)" becomes "Tetris".
pub fn clean_name(name: &str) -> String {
    PARENTHESIZED.replace_all(name, "").trim().to_string()
}

pub fn entity_uri(entity_id: &str) -> String {
    format!("{}{}", ENTITY_URI_PREFIX, entity_id)
}

fn year_within(published: i32, expected: i32, tolerance: i32) -> bool {
    (published - expected).abs() <= tolerance
}

/// Publication year a hit must match.
#[derive(Debug, Clone, Copy)]
struct YearCheck {
    expected: i32,
    tolerance: i32,
    max_checks: usize,
}

/// First relevant hit that passes the year check.
///
/// A hit whose year is out of range is skipped; a hit whose year cannot be
/// looked up is accepted. After `max_checks` lookups the candidate is missed.
async fn choose_hit<'a, F, Fut>(
    candidate: &Candidate,
    hits: &'a [SearchHit],
    relevance: &dyn RelevanceStrategy,
    year_check: Option<YearCheck>,
    mut year_of: F,
) -> Option<&'a SearchHit>
where
    F: FnMut(&'a str) -> Fut,
    Fut: Future<Output = std::result::Result<Option<i32>, ResolutionError>>,
{
    let mut checks = 0;
    for hit in hits.iter().filter(|h| relevance.is_relevant(candidate, h)) {
        let Some(check) = year_check else {
            return Some(hit);
        };
        if checks >= check.max_checks {
            log::debug!("Giving up on '{}' after {} year checks", candidate.name, checks);
            return None;
        }
        checks += 1;

        match year_of(&hit.id).await {
            Ok(Some(published)) if !year_within(published, check.expected, check.tolerance) => {
                log::debug!(
                    "Skipping {} for '{}': published {}, expected {}",
                    hit.id,
                    candidate.name,
                    published,
                    check.expected
                );
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                log::debug!("Year check for {} failed ({}), accepting hit", hit.id, e);
            }
        }
        return Some(hit);
    }
    None
}

fn check_status(response: Response) -> std::result::Result<Response, ResolutionError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(ResolutionError::Throttled { retry_after });
    }
    if !status.is_success() {
        return Err(ResolutionError::Http(status.as_u16()));
    }
    Ok(response)
}

/// Retry-After in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchHit>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    info: String,
}

fn parse_search_body(body: &str) -> std::result::Result<Vec<SearchHit>, ResolutionError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| ResolutionError::Malformed(e.to_string()))?;
    if let Some(error) = response.error {
        if error.code == "maxlag" || error.code == "ratelimited" {
            return Err(ResolutionError::Throttled { retry_after: None });
        }
        return Err(ResolutionError::Malformed(format!("{}: {}", error.code, error.info)));
    }
    Ok(response.search)
}

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<SparqlBinding>,
}

#[derive(Debug, Deserialize)]
struct SparqlBinding {
    year: Option<SparqlValue>,
}

#[derive(Debug, Deserialize)]
struct SparqlValue {
    value: String,
}

/// First publication year in a SPARQL result, if any
fn parse_sparql_year(body: &str) -> std::result::Result<Option<i32>, ResolutionError> {
    let response: SparqlResponse =
        serde_json::from_str(body).map_err(|e| ResolutionError::Malformed(e.to_string()))?;
    let Some(value) = response.results.bindings.into_iter().find_map(|b| b.year) else {
        return Ok(None);
    };
    value
        .value
        .parse::<i32>()
        .map(Some)
        .map_err(|e| ResolutionError::Malformed(format!("year '{}': {}", value.value, e)))
}
