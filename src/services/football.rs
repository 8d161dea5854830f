use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::FootballConfig;
use crate::error::{AppError, AppResult};

const API_HOST: &str = "v3.football.api-sports.io";

/// Broader queries (team schedules) may take a while upstream.
const TEAM_FIXTURES_TIMEOUT: Duration = Duration::from_secs(15);
const FIXTURES_BY_IDS_TIMEOUT: Duration = Duration::from_secs(10);

/// Upstream rejects `ids=` lists longer than this.
const MAX_IDS_PER_REQUEST: usize = 20;

// ============================================================================
// Fixture Types
// ============================================================================

/// One match, validated at the ingestion boundary.
///
/// The field layout mirrors the upstream wire format so the same JSON can be
/// stored verbatim and re-read later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub fixture: MatchInfo,
    pub league: LeagueInfo,
    pub teams: Teams,
    #[serde(default)]
    pub goals: Goals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchInfo {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub status: MatchStatus,
    #[serde(default)]
    pub venue: Venue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStatus {
    pub short: String,
    #[serde(default)]
    pub long: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueInfo {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    /// `League` or `Cup` upstream.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub season: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teams {
    pub home: TeamInfo,
    pub away: TeamInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamInfo {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Goals {
    pub home: Option<i32>,
    pub away: Option<i32>,
}

impl Fixture {
    pub fn id(&self) -> i64 {
        self.fixture.id
    }

    pub fn involves_team(&self, team_id: i64) -> bool {
        self.teams.home.id == team_id || self.teams.away.id == team_id
    }
}

// ============================================================================
// Provider Interface
// ============================================================================

/// Which slice of a team's schedule to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureWindow {
    Next(u32),
    Last(u32),
    Season(i32),
}

impl FixtureWindow {
    fn query(&self, team_id: i64) -> Vec<(&'static str, String)> {
        let mut query = vec![("team", team_id.to_string())];
        match self {
            FixtureWindow::Next(n) => query.push(("next", n.to_string())),
            FixtureWindow::Last(n) => query.push(("last", n.to_string())),
            FixtureWindow::Season(year) => query.push(("season", year.to_string())),
        }
        query
    }
}

/// Where a provider result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadOrigin {
    /// Real upstream data.
    Live,
    /// No credential configured (or demo forced); deterministic demo data.
    Demo,
    /// The upstream call failed; the payload is the fixed fallback and carries
    /// no information about the requested fixtures.
    Fallback,
}

#[derive(Debug, Clone)]
pub struct UpstreamFixtures {
    pub fixtures: Vec<Fixture>,
    pub origin: PayloadOrigin,
}

impl UpstreamFixtures {
    pub fn live(fixtures: Vec<Fixture>) -> Self {
        Self {
            fixtures,
            origin: PayloadOrigin::Live,
        }
    }

    pub fn demo(fixtures: Vec<Fixture>) -> Self {
        Self {
            fixtures,
            origin: PayloadOrigin::Demo,
        }
    }

    pub fn fallback() -> Self {
        Self {
            fixtures: demo_fixtures(),
            origin: PayloadOrigin::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == PayloadOrigin::Fallback
    }
}

/// Source of live fixture data. Implementations never fail: every error is
/// logged and turned into a [`PayloadOrigin::Fallback`] result.
#[async_trait]
pub trait FixtureProvider: Send + Sync {
    async fn fixtures_for_team(&self, team_id: i64, window: FixtureWindow) -> UpstreamFixtures;

    async fn fixtures_by_ids(&self, ids: &[i64]) -> UpstreamFixtures;
}

// ============================================================================
// HTTP Provider
// ============================================================================

#[derive(Debug, Clone)]
pub struct FootballService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    demo: bool,
}

impl FootballService {
    pub fn new(config: &FootballConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(TEAM_FIXTURES_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        let service = Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            demo: config.is_demo(),
        };

        if service.is_demo() {
            info!("Football provider running in demo mode; serving fixed demo fixtures");
        }

        Ok(service)
    }

    pub fn is_demo(&self) -> bool {
        self.demo
    }

    async fn request_fixtures(
        &self,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> AppResult<Vec<Fixture>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("FOOTBALL_API_KEY is not set".to_string()))?;

        let response = self
            .client
            .get(format!("{}/fixtures", self.base_url))
            .header("x-apisports-key", api_key)
            .header("x-apisports-host", API_HOST)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Fixtures request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Fixtures request returned {}: {}",
                status, error_text
            )));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse fixtures response: {}", e)))?;

        parse_envelope(envelope)
    }
}

#[async_trait]
impl FixtureProvider for FootballService {
    async fn fixtures_for_team(&self, team_id: i64, window: FixtureWindow) -> UpstreamFixtures {
        if self.is_demo() {
            return UpstreamFixtures::demo(demo_fixtures());
        }

        match self
            .request_fixtures(&window.query(team_id), TEAM_FIXTURES_TIMEOUT)
            .await
        {
            Ok(fixtures) => {
                debug!(
                    "Fetched {} fixture(s) for team {} ({:?})",
                    fixtures.len(),
                    team_id,
                    window
                );
                UpstreamFixtures::live(fixtures)
            }
            Err(e) => {
                warn!(
                    "Failed to fetch fixtures for team {}: {}. Using fallback payload.",
                    team_id, e
                );
                UpstreamFixtures::fallback()
            }
        }
    }

    async fn fixtures_by_ids(&self, ids: &[i64]) -> UpstreamFixtures {
        if ids.is_empty() {
            return UpstreamFixtures::live(Vec::new());
        }

        if self.is_demo() {
            let fixtures = demo_fixtures()
                .into_iter()
                .filter(|f| ids.contains(&f.id()))
                .collect();
            return UpstreamFixtures::demo(fixtures);
        }

        let mut fixtures = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            let joined = chunk
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join("-");

            match self
                .request_fixtures(&[("ids", joined)], FIXTURES_BY_IDS_TIMEOUT)
                .await
            {
                Ok(batch) => fixtures.extend(batch),
                Err(e) => {
                    warn!(
                        "Failed to fetch {} fixture(s) by id: {}. Using fallback payload.",
                        ids.len(),
                        e
                    );
                    return UpstreamFixtures::fallback();
                }
            }
        }

        UpstreamFixtures::live(fixtures)
    }
}

/// Validate an upstream `{ "errors": ..., "response": [...] }` envelope.
///
/// Items that do not match [`Fixture`] are dropped with a warning; the rest of
/// the batch is kept.
fn parse_envelope(envelope: Value) -> AppResult<Vec<Fixture>> {
    let has_errors = match envelope.get("errors") {
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        _ => false,
    };
    if has_errors {
        return Err(AppError::Upstream(format!(
            "Upstream reported errors: {}",
            envelope["errors"]
        )));
    }

    let items = match envelope.get("response") {
        Some(Value::Array(items)) => items,
        _ => {
            return Err(AppError::Upstream(
                "Upstream response has no fixture list".to_string(),
            ))
        }
    };

    let mut fixtures = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match serde_json::from_value::<Fixture>(item.clone()) {
            Ok(fixture) => fixtures.push(fixture),
            Err(e) => warn!("Discarding malformed upstream fixture #{}: {}", index, e),
        }
    }

    Ok(fixtures)
}

/// The fixed payload served in demo mode and when upstream is unreachable.
pub fn demo_fixtures() -> Vec<Fixture> {
    vec![Fixture {
        fixture: MatchInfo {
            id: 1001,
            date: Utc
                .with_ymd_and_hms(2026, 2, 1, 15, 0, 0)
                .single()
                .unwrap_or_default(),
            status: MatchStatus {
                short: "NS".to_string(),
                long: Some("Not Started".to_string()),
            },
            venue: Venue {
                name: Some("Old Trafford".to_string()),
                city: Some("Manchester".to_string()),
            },
        },
        league: LeagueInfo {
            id: Some(39),
            name: "Premier League".to_string(),
            kind: Some("League".to_string()),
            season: Some(2025),
        },
        teams: Teams {
            home: TeamInfo {
                id: 604,
                name: "Manchester United".to_string(),
                logo: Some("https://media.api-sports.io/teams/604.png".to_string()),
            },
            away: TeamInfo {
                id: 33,
                name: "Manchester City".to_string(),
                logo: Some("https://media.api-sports.io/teams/33.png".to_string()),
            },
        },
        goals: Goals::default(),
    }]
}
