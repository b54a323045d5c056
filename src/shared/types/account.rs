//! Logged-in gateway user + Twitch identity types shared by the services

use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

/// Twitch numeric user id, kept as text like Helix does
pub type TwitchUserId = str;

/// A gateway user resolved from the login cookie
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct CurrentUser {
    pub id: i64,
    pub twitch_user_id: String,
    pub login: String,
    pub display_name: String,
    #[serde(skip)]
    pub web_session_id: String,
    #[serde(skip)]
    pub access_token: String
}

/// Identity as returned by Helix `/users`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct HelixUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(default, rename = "type")]
    pub user_type: String,
    #[serde(default)]
    pub broadcaster_type: String,
    #[serde(default)]
    pub profile_image_url: String,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub created_at: String
}

impl HelixUser {
    /// `created_at` is RFC 3339 when present; anything else is treated as unknown
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at).ok().map(|t| t.with_timezone(&Utc))
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct HelixUsersResponse {
    #[serde(default)]
    pub data: Vec<HelixUser>
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct HelixChatter {
    pub user_id: String,
    #[serde(default)]
    pub user_login: String,
    #[serde(default)]
    pub user_name: String
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct HelixPagination {
    #[serde(default)]
    pub cursor: Option<String>
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct HelixChattersResponse {
    #[serde(default)]
    pub data: Vec<HelixChatter>,
    #[serde(default)]
    pub pagination: HelixPagination
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ModeratedChannel {
    pub broadcaster_id: String,
    pub broadcaster_login: String,
    pub broadcaster_name: String
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct HelixModeratedChannelsResponse {
    #[serde(default)]
    pub data: Vec<ModeratedChannel>
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helix_user_created_at() {
        let mut user = HelixUser { created_at: "2016-12-14T20:32:28Z".to_string(), ..Default::default() };
        assert_eq!(user.created_at().unwrap().to_rfc3339(), "2016-12-14T20:32:28+00:00");

        user.created_at = "yesterday".to_string();
        assert!(user.created_at().is_none(), "unparsable dates are unknown");
    }

    #[test]
    fn chatters_page_without_cursor() {
        let page: HelixChattersResponse = serde_json::from_str(
            r#"{"data":[{"user_id":"1","user_login":"a","user_name":"A"}],"pagination":{},"total":1}"#).unwrap();
        assert_eq!(page.data.len(), 1);
        assert!(page.pagination.cursor.is_none());
    }
}
