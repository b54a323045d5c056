use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

/// Scopes requested at login
pub const TWITCH_SCOPES: [&str; 2] = ["user:read:moderated_channels", "moderator:read:chatters"];

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SavedSession {
    pub id: i64,
    pub session_uuid: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>
}

/// Channel a capture can be started for
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Channel {
    pub broadcaster_id: String,
    pub broadcaster_login: String,
    pub broadcaster_name: String
}

/// One captured account, aggregated over a session
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ExportAccount {
    pub twitch_user_id: String,
    pub login: String,
    pub display_name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub seen_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ExportData {
    pub session_uuid: String,
    pub exported_at: DateTime<Utc>,
    pub accounts: Vec<ExportAccount>
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json
}

impl ExportFormat {
    /// Anything but `csv` falls back to json
    pub fn parse(raw: Option<&str>) -> ExportFormat {
        match raw {
            Some("csv") => ExportFormat::Csv,
            _ => ExportFormat::Json
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json"
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json"
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct NameChange {
    pub changed_at: DateTime<Utc>,
    pub old_login: String,
    pub new_login: String,
    pub old_display_name: String,
    pub new_display_name: String
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct AccountHistory {
    pub twitch_user_id: String,
    pub login: String,
    pub display_name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub history: Vec<NameChange>
}

/// Body of Twitch's `/oauth2/token`. `scope` is a list there, unlike the
/// space separated string most providers send.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct TwitchTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub token_type: String
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_format_fallback() {
        assert_eq!(ExportFormat::parse(Some("csv")), ExportFormat::Csv);
        assert_eq!(ExportFormat::parse(Some("xml")), ExportFormat::Json);
        assert_eq!(ExportFormat::parse(None), ExportFormat::Json);
        assert_eq!(ExportFormat::Csv.extension(), "csv");
    }

    #[test]
    fn token_scope_is_a_list() {
        let token: TwitchTokenResponse = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_in":100,"scope":["moderator:read:chatters"],"token_type":"bearer"}"#).unwrap();
        assert_eq!(token.scope, vec!["moderator:read:chatters".to_string()]);
        assert_eq!(token.refresh_token.as_deref(), Some("r"));
    }
}
