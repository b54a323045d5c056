use crate::shared::types::account::HelixUser;

use serde::{Serialize, Deserialize};

/// Recorded on jobs failed by the stale sweep
pub const STALE_JOB_MESSAGE: &str = "abandoned: worker did not finish the job";

/// Names currently stored for a Twitch account
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct StoredNames {
    pub login: String,
    pub display_name: String
}

/// One appended row of the rename history
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct RenameRecord {
    pub twitch_user_id: String,
    pub old_login: String,
    pub new_login: String,
    pub old_display_name: String,
    pub new_display_name: String
}

impl RenameRecord {
    /// `None` for a user seen for the first time or with unchanged names
    pub fn detect(previous: Option<&StoredNames>, fetched: &HelixUser) -> Option<RenameRecord> {
        let previous = previous?;
        if previous.login == fetched.login && previous.display_name == fetched.display_name {
            return None;
        }
        Some(RenameRecord {
            twitch_user_id: fetched.id.clone(),
            old_login: previous.login.clone(),
            new_login: fetched.login.clone(),
            old_display_name: previous.display_name.clone(),
            new_display_name: fetched.display_name.clone()
        })
    }
}

/// What a finished tick did
#[derive(Clone, Debug, PartialEq)]
pub enum JobOutcome {
    Idle,
    Done(i64),
    Failed(i64, String)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(login: &str, display_name: &str) -> HelixUser {
        HelixUser {
            id: "7".to_string(),
            login: login.to_string(),
            display_name: display_name.to_string(),
            ..Default::default()
        }
    }

    fn stored(login: &str, display_name: &str) -> StoredNames {
        StoredNames { login: login.to_string(), display_name: display_name.to_string() }
    }

    #[test]
    fn first_sighting_is_not_a_rename() {
        assert_eq!(RenameRecord::detect(None, &fetched("alice", "Alice")), None);
    }

    #[test]
    fn unchanged_names() {
        assert_eq!(RenameRecord::detect(Some(&stored("alice", "Alice")), &fetched("alice", "Alice")), None);
    }

    #[test]
    fn login_change() {
        let record = RenameRecord::detect(Some(&stored("alice", "Alice")), &fetched("alicia", "Alice")).unwrap();
        assert_eq!(record.twitch_user_id, "7");
        assert_eq!(record.old_login, "alice");
        assert_eq!(record.new_login, "alicia");
        assert_eq!(record.old_display_name, record.new_display_name);
    }

    #[test]
    fn display_name_only_change() {
        let record = RenameRecord::detect(Some(&stored("alice", "Alice")), &fetched("alice", "ALICE"));
        assert!(record.is_some(), "display name changes count as renames");
    }
}
