//! Keyword filters attached to team subscriptions.
//!
//! A filter is a list of keywords OR-ed together. `All`, `League` and `Cup`
//! are reserved; any other keyword must appear in the league name. Matching is
//! case-sensitive.

use crate::services::football::Fixture;

const ALL: &str = "All";
const LEAGUE: &str = "League";
const CUP: &str = "Cup";

/// Decide whether `fixture` passes `filters`. `None` or an empty list lets
/// everything through.
pub fn include(fixture: &Fixture, filters: Option<&[String]>) -> bool {
    let filters = match filters {
        Some(f) if !f.is_empty() => f,
        _ => return true,
    };

    let kind = fixture.league.kind.as_deref();

    filters.iter().any(|keyword| match keyword.as_str() {
        ALL => true,
        LEAGUE => kind == Some(LEAGUE),
        CUP => kind == Some(CUP),
        other => fixture.league.name.contains(other),
    })
}
