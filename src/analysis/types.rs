use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

/// Accounts with at least this many recorded renames are flagged
pub const SUSPICIOUS_RENAME_THRESHOLD: i64 = 3;
pub const SUSPICIOUS_ACCOUNTS_LIMIT: i64 = 50;
pub const TOP_DAYS_LIMIT: i64 = 10;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SessionSummary {
    pub session_uuid: String,
    pub total_accounts: i64,
    #[serde(default)]
    pub top_days: Vec<TopDay>,
    #[serde(default)]
    pub broadcasters: Vec<Broadcaster>,
    pub suspicious_renames_count: i64,
    #[serde(default)]
    pub suspicious_accounts: Vec<SuspiciousAccount>,
    pub generated_at: DateTime<Utc>
}

/// Account creation date shared by `count` chatters
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TopDay {
    pub date: String, // YYYY-MM-DD
    pub count: i64,
    #[serde(default)]
    pub logins: Vec<String>
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Broadcaster {
    pub broadcaster_id: String,
    pub broadcaster_login: String,
    pub capture_count: i64
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SuspiciousAccount {
    pub twitch_user_id: String,
    pub login: String,
    pub display_name: String,
    pub rename_count: i64
}

#[derive(Deserialize)]
pub struct SummaryParams {
    pub broadcaster_id: Option<String>,
    pub logins: Option<bool>
}

/// `"1, 2,,3"` -> `["1", "2", "3"]`. Blank input means no filter.
pub fn parse_broadcaster_filter(raw: Option<&str>) -> Option<Vec<String>> {
    let ids: Vec<String> = raw.unwrap_or("")
        .split(',')
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
        .collect();
    if ids.is_empty() { None } else { Some(ids) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcaster_filter() {
        assert_eq!(parse_broadcaster_filter(None), None);
        assert_eq!(parse_broadcaster_filter(Some(" , ")), None);
        assert_eq!(parse_broadcaster_filter(Some("1, 2,,3")),
            Some(vec!["1".to_string(), "2".to_string(), "3".to_string()]));
    }

    #[test]
    fn summary_json_shape() {
        let summary = SessionSummary {
            session_uuid: "abc".to_string(),
            total_accounts: 2,
            top_days: vec![TopDay { date: "2020-01-02".to_string(), count: 2, logins: vec!["a".to_string(), "b".to_string()] }],
            broadcasters: vec![Broadcaster { broadcaster_id: "42".to_string(), broadcaster_login: "chan".to_string(), capture_count: 1 }],
            suspicious_renames_count: 0,
            suspicious_accounts: Vec::new(),
            generated_at: Utc::now()
        };
        let value = serde_json::to_value(&summary).unwrap();
        for key in ["session_uuid", "total_accounts", "top_days", "broadcasters",
                "suspicious_renames_count", "suspicious_accounts", "generated_at"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["top_days"][0]["logins"][1], "b");

        let back: SessionSummary = serde_json::from_value(value).unwrap();
        assert_eq!(back, summary);
    }
}
