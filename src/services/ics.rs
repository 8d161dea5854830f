//! Calendar feed rendering.

use chrono::{DateTime, Duration, Utc};
use icalendar::{Calendar, Component, EventLike, Property};
use tracing::warn;

use crate::services::football::Fixture;

const ICS_DATETIME: &str = "%Y%m%dT%H%M%SZ";
const UNKNOWN_VENUE: &str = "TBA";
const POSTPONED: &str = "PST";
/// Status codes for which the score is meaningful.
const SCORED_STATUSES: &[&str] = &["1H", "HT", "2H", "ET", "BT", "P", "LIVE", "FT", "AET", "PEN"];

/// A record handed to the renderer: either a fixture that is already
/// validated, or a stored payload that still has to be parsed.
#[derive(Debug, Clone)]
pub enum FeedEntry {
    Parsed(Fixture),
    Stored { record_id: String, payload: String },
}

/// Turns fixtures into an iCalendar document.
#[derive(Debug, Clone)]
pub struct IcsRenderer {
    app_name: String,
    uid_namespace: String,
    event_duration: Duration,
}

impl IcsRenderer {
    pub fn new(app_name: &str, event_duration: Duration) -> Self {
        Self {
            app_name: app_name.to_string(),
            uid_namespace: app_name.to_lowercase(),
            event_duration,
        }
    }

    /// Render every usable entry. Entries that fail to parse or lack required
    /// fields are skipped with a warning.
    pub fn render(&self, entries: &[FeedEntry], now: DateTime<Utc>) -> String {
        let mut cal = self.calendar();
        let dtstamp = now.format(ICS_DATETIME).to_string();

        for entry in entries {
            let parsed;
            let fixture = match entry {
                FeedEntry::Parsed(f) => f,
                FeedEntry::Stored { record_id, payload } => {
                    match serde_json::from_str::<Fixture>(payload) {
                        Ok(f) => {
                            parsed = f;
                            &parsed
                        }
                        Err(e) => {
                            warn!("Skipping saved fixture {}: unreadable payload: {}", record_id, e);
                            continue;
                        }
                    }
                }
            };

            if let Some(missing) = missing_field(fixture) {
                warn!("Skipping fixture {}: missing {}", fixture.id(), missing);
                continue;
            }

            cal.push(self.event(fixture, &dtstamp));
        }

        self.finish(cal.done())
    }

    /// Header and footer only.
    pub fn render_empty(&self) -> String {
        self.finish(self.calendar().done())
    }

    fn calendar(&self) -> Calendar {
        let mut cal = Calendar::new();
        cal.append_property(Property::new("X-WR-CALNAME", &self.app_name));
        cal.append_property(Property::new("METHOD", "PUBLISH"));
        cal
    }

    fn event(&self, fixture: &Fixture, dtstamp: &str) -> icalendar::Event {
        let start = fixture.fixture.date;
        let end = start + self.event_duration;
        let status = fixture.fixture.status.short.as_str();
        let location = location(fixture);

        let mut ics_event = icalendar::Event::new();
        ics_event.uid(&format!("{}@{}", fixture.id(), self.uid_namespace));
        ics_event.add_property("DTSTAMP", dtstamp);
        ics_event.add_property("DTSTART", start.format(ICS_DATETIME).to_string());
        ics_event.add_property("DTEND", end.format(ICS_DATETIME).to_string());
        ics_event.summary(&summary(fixture));
        ics_event.description(&format!("{} - {}", fixture.league.name, location));
        ics_event.location(&location);
        ics_event.add_property(
            "STATUS",
            if status == POSTPONED {
                "CANCELLED"
            } else {
                "CONFIRMED"
            },
        );
        ics_event.done()
    }

    /// Pin the product id and calendar scale; the crate emits its own defaults.
    fn finish(&self, cal: Calendar) -> String {
        let raw = cal.to_string();
        let mut output = String::with_capacity(raw.len());

        for line in raw.lines() {
            if line.starts_with("PRODID:") {
                output.push_str(&format!("PRODID:-//Match Calendar//{}//EN\r\n", self.app_name));
                output.push_str("CALSCALE:GREGORIAN\r\n");
                continue;
            }
            if line.starts_with("CALSCALE:") {
                continue;
            }
            output.push_str(line);
            output.push_str("\r\n");
        }

        output
    }
}

fn missing_field(fixture: &Fixture) -> Option<&'static str> {
    if fixture.teams.home.name.trim().is_empty() {
        Some("home team name")
    } else if fixture.teams.away.name.trim().is_empty() {
        Some("away team name")
    } else if fixture.fixture.status.short.trim().is_empty() {
        Some("status")
    } else {
        None
    }
}

fn summary(fixture: &Fixture) -> String {
    let status = fixture.fixture.status.short.as_str();
    let prefix = if status == POSTPONED {
        "⚠️ POSTPONED: "
    } else {
        ""
    };

    let score = match (fixture.goals.home, fixture.goals.away) {
        (Some(home), Some(away)) if status != POSTPONED && SCORED_STATUSES.contains(&status) => {
            format!(" [{}-{}]", home, away)
        }
        _ => String::new(),
    };

    format!(
        "{}⚽ {} vs {}{}",
        prefix, fixture.teams.home.name, fixture.teams.away.name, score
    )
}

fn location(fixture: &Fixture) -> String {
    let venue = fixture
        .fixture
        .venue
        .name
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_VENUE);
    let city = fixture
        .fixture
        .venue
        .city
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    match city {
        Some(city) if venue != UNKNOWN_VENUE => format!("{}, {}", venue, city),
        _ => venue.to_string(),
    }
}
