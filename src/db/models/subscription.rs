use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};

// ============================================================================
// Subscription Models (teams a user follows)
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub team_id: i64,
    pub team_name: String,
    pub team_logo: Option<String>,
    /// JSON array of filter keywords; `NULL` means every fixture.
    pub filters: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Subscription {
    pub fn filter_spec(&self) -> AppResult<Option<Vec<String>>> {
        match self.filters.as_deref() {
            None => Ok(None),
            Some(raw) => serde_json::from_str(raw).map(Some).map_err(|e| {
                AppError::MalformedRecord(format!(
                    "filters of subscription {} (team {}): {}",
                    self.id, self.team_id, e
                ))
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscription {
    pub team_id: i64,
    pub team_name: String,
    pub team_logo: Option<String>,
    pub filters: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn subscription(filters: Option<&str>) -> Subscription {
        let now = Utc::now().naive_utc();
        Subscription {
            id: "sub".to_string(),
            user_id: "u1".to_string(),
            team_id: 604,
            team_name: "Manchester United".to_string(),
            team_logo: None,
            filters: filters.map(str::to_string),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn filter_spec_parses_keyword_list() {
        let sub = subscription(Some(r#"["League","Champions League"]"#));
        assert_eq!(
            sub.filter_spec().unwrap(),
            Some(vec!["League".to_string(), "Champions League".to_string()])
        );
        assert_eq!(subscription(None).filter_spec().unwrap(), None);
    }

    #[test]
    fn broken_filter_json_is_reported() {
        let sub = subscription(Some("[League"));
        assert!(matches!(sub.filter_spec(), Err(AppError::MalformedRecord(_))));
    }
}
