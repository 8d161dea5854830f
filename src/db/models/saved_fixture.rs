use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};
use crate::services::football::Fixture;

// ============================================================================
// Saved Fixture Models (matches on a user's calendar)
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SavedFixture {
    pub id: String,
    pub user_id: String,
    pub fixture_id: i64,
    /// JSON-encoded [`Fixture`], refreshed whenever the feed sees newer data.
    pub fixture_data: String,
    pub added_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl SavedFixture {
    pub fn payload(&self) -> AppResult<Fixture> {
        serde_json::from_str(&self.fixture_data).map_err(|e| {
            AppError::MalformedRecord(format!(
                "saved fixture {} (match {}): {}",
                self.id, self.fixture_id, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::football::demo_fixtures;
    use chrono::Utc;

    fn saved(data: String) -> SavedFixture {
        let now = Utc::now().naive_utc();
        SavedFixture {
            id: "s1".to_string(),
            user_id: "u1".to_string(),
            fixture_id: 1001,
            fixture_data: data,
            added_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn payload_round_trips_stored_json() {
        let fixture = demo_fixtures().remove(0);
        let row = saved(serde_json::to_string(&fixture).unwrap());
        assert_eq!(row.payload().unwrap(), fixture);
    }

    #[test]
    fn unreadable_payload_is_a_malformed_record() {
        let row = saved("not json".to_string());
        assert!(matches!(row.payload(), Err(AppError::MalformedRecord(_))));
    }
}
