use crate::analysis::types::{
    Broadcaster, SessionSummary, SuspiciousAccount, TopDay,
    SUSPICIOUS_ACCOUNTS_LIMIT, SUSPICIOUS_RENAME_THRESHOLD, TOP_DAYS_LIMIT
};
use crate::shared::util::config;

use chrono::{NaiveDate, Utc};
use log::{error, info};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};

/// Non-blocking parts of a summary: a failed query is logged and reads as
/// an empty list
fn or_empty<T>(result: Result<Vec<T>, sqlx::Error>, what: &str, session_id: i64) -> Vec<T> {
    result.unwrap_or_else(|err| {
        error!("{} query failed for session {}: {}", what, session_id, err);
        Vec::new()
    })
}

/// Read-only queries over captures and identities. Every broadcaster filter
/// is `Option<Vec<String>>`: `None` means all broadcasters of the session.
#[derive(Clone)]
pub struct PostgresHandler {
    pool: PgPool
}

impl PostgresHandler {
    pub async fn new() -> Result<PostgresHandler, sqlx::Error> {
        Ok(PostgresHandler { pool: config::get_pool().await? })
    }

    pub fn from_pool(pool: PgPool) -> PostgresHandler {
        PostgresHandler { pool }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1;").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn session_id(&self, session_uuid: &str) -> Result<Option<i64>, sqlx::Error> {
        let row = sqlx::query("SELECT id FROM sessions WHERE session_uuid = $1;")
            .bind(session_uuid)
            .fetch_optional(&self.pool).await?;
        Ok(row.map(|r| r.get::<i64, &str>("id")))
    }

    /// `None` when the session does not exist
    pub async fn session_summary(&self, session_uuid: &str, broadcasters: Option<&[String]>, with_logins: bool)
            -> Result<Option<SessionSummary>, sqlx::Error> {
        let Some(session_id) = self.session_id(session_uuid).await? else {
            return Ok(None);
        };

        let broadcaster_list = self.broadcasters(session_id).await?;
        let total_accounts = self.total_accounts(session_id, broadcasters).await?;
        let top_days = self.top_days(session_id, broadcasters, with_logins).await?;

        let suspicious_accounts = or_empty(self.suspicious_accounts(session_id, broadcasters).await,
            "suspicious accounts", session_id);

        Ok(Some(SessionSummary {
            session_uuid: session_uuid.to_string(),
            total_accounts,
            top_days,
            broadcasters: broadcaster_list,
            suspicious_renames_count: suspicious_accounts.len() as i64,
            suspicious_accounts,
            generated_at: Utc::now()
        }))
    }

    pub async fn broadcasters(&self, session_id: i64) -> Result<Vec<Broadcaster>, sqlx::Error> {
        sqlx::query(r#"
            SELECT c.broadcaster_id, c.broadcaster_login, COUNT(DISTINCT c.id) AS capture_count
            FROM captures c
            WHERE c.session_id = $1
            GROUP BY c.broadcaster_id, c.broadcaster_login
            ORDER BY capture_count DESC, c.broadcaster_login ASC;"#)
            .bind(session_id)
            .map(|row: PgRow| Broadcaster {
                broadcaster_id: row.get("broadcaster_id"),
                broadcaster_login: row.get("broadcaster_login"),
                capture_count: row.get("capture_count")
            })
            .fetch_all(&self.pool).await
    }

    pub async fn total_accounts(&self, session_id: i64, broadcasters: Option<&[String]>) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(r#"
            SELECT COUNT(DISTINCT cc.twitch_user_id) AS total
            FROM capture_chatters cc
            JOIN captures c ON cc.capture_id = c.id
            WHERE c.session_id = $1 AND ($2::text[] IS NULL OR c.broadcaster_id = ANY($2));"#)
            .bind(session_id)
            .bind(broadcasters)
            .fetch_one(&self.pool).await?;
        Ok(row.get("total"))
    }

    pub async fn top_days(&self, session_id: i64, broadcasters: Option<&[String]>, with_logins: bool)
            -> Result<Vec<TopDay>, sqlx::Error> {
        let counts: Vec<(NaiveDate, i64)> = sqlx::query(r#"
            SELECT (tu.created_at AT TIME ZONE 'UTC')::date AS day, COUNT(DISTINCT cc.twitch_user_id) AS cnt
            FROM capture_chatters cc
            JOIN captures c ON cc.capture_id = c.id
            JOIN twitch_users tu ON tu.twitch_user_id = cc.twitch_user_id
            WHERE c.session_id = $1 AND ($2::text[] IS NULL OR c.broadcaster_id = ANY($2))
                AND tu.created_at IS NOT NULL
            GROUP BY day
            ORDER BY cnt DESC, day ASC
            LIMIT $3;"#)
            .bind(session_id)
            .bind(broadcasters)
            .bind(TOP_DAYS_LIMIT)
            .map(|row: PgRow| (row.get("day"), row.get("cnt")))
            .fetch_all(&self.pool).await?;

        let mut days = Vec::with_capacity(counts.len());
        for (day, count) in counts {
            let logins = if with_logins {
                or_empty(self.logins_created_on(session_id, broadcasters, day).await, "logins by creation day", session_id)
            } else {
                Vec::new()
            };
            days.push(TopDay { date: day.format("%Y-%m-%d").to_string(), count, logins });
        }
        Ok(days)
    }

    async fn logins_created_on(&self, session_id: i64, broadcasters: Option<&[String]>, day: NaiveDate)
            -> Result<Vec<String>, sqlx::Error> {
        sqlx::query(r#"
            SELECT DISTINCT tu.login
            FROM capture_chatters cc
            JOIN captures c ON cc.capture_id = c.id
            JOIN twitch_users tu ON tu.twitch_user_id = cc.twitch_user_id
            WHERE c.session_id = $1 AND ($2::text[] IS NULL OR c.broadcaster_id = ANY($2))
                AND (tu.created_at AT TIME ZONE 'UTC')::date = $3
            ORDER BY tu.login ASC;"#)
            .bind(session_id)
            .bind(broadcasters)
            .bind(day)
            .map(|row: PgRow| row.get::<String, &str>("login"))
            .fetch_all(&self.pool).await
    }

    /// Renames are counted once per history row, however many captures
    /// the account shows up in
    pub async fn suspicious_accounts(&self, session_id: i64, broadcasters: Option<&[String]>)
            -> Result<Vec<SuspiciousAccount>, sqlx::Error> {
        let accounts: Vec<SuspiciousAccount> = sqlx::query(r#"
            SELECT tu.twitch_user_id, tu.login, tu.display_name, COUNT(tun.id) AS rename_count
            FROM twitch_users tu
            JOIN twitch_user_names tun ON tun.twitch_user_id = tu.twitch_user_id
            WHERE tu.twitch_user_id IN (
                SELECT cc.twitch_user_id
                FROM capture_chatters cc
                JOIN captures c ON c.id = cc.capture_id
                WHERE c.session_id = $1 AND ($2::text[] IS NULL OR c.broadcaster_id = ANY($2)))
            GROUP BY tu.twitch_user_id, tu.login, tu.display_name
            HAVING COUNT(tun.id) >= $3
            ORDER BY rename_count DESC, tu.login ASC
            LIMIT $4;"#)
            .bind(session_id)
            .bind(broadcasters)
            .bind(SUSPICIOUS_RENAME_THRESHOLD)
            .bind(SUSPICIOUS_ACCOUNTS_LIMIT)
            .map(|row: PgRow| SuspiciousAccount {
                twitch_user_id: row.get("twitch_user_id"),
                login: row.get("login"),
                display_name: row.get("display_name"),
                rename_count: row.get("rename_count")
            })
            .fetch_all(&self.pool).await?;

        info!("session {}: {} accounts with {}+ renames", session_id, accounts.len(), SUSPICIOUS_RENAME_THRESHOLD);
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_optional_query_reads_as_empty() {
        let logins: Vec<String> = or_empty(Err(sqlx::Error::RowNotFound), "logins by creation day", 1);
        assert!(logins.is_empty(), "failure degrades to an empty list");

        let kept = or_empty(Ok(vec!["alice".to_string()]), "logins by creation day", 1);
        assert_eq!(kept, vec!["alice".to_string()]);
    }
}
