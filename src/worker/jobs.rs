//! Job bodies. Each one runs outside any transaction; its result decides
//! whether the claimed row ends up `done` or `failed`.

use crate::shared::types::job::{FetchChattersPayload, FetchUsersInfoPayload, Job, JobType, NewJob};
use crate::worker::error::{JobError, ProxyError};
use crate::worker::runner::WorkerSettings;
use crate::worker::util::handler::{CaptureStore, TwitchSource};

use log::{debug, info, warn};
use std::collections::HashSet;
use tokio::time::sleep;

/// Helix accepts at most this many `id` params per `/users` call
pub const USERS_BATCH_SIZE: usize = 100;

pub async fn run_job<S, T>(store: &S, twitch: &T, settings: &WorkerSettings, job: &Job) -> Result<(), JobError>
        where S: CaptureStore, T: TwitchSource {
    let job_type = job.job_type.parse::<JobType>().map_err(JobError::UnknownType)?;
    match job_type {
        JobType::FetchChatters => {
            let payload: FetchChattersPayload = serde_json::from_value(job.payload.clone())?;
            fetch_chatters(store, twitch, settings, &payload).await
        },
        JobType::FetchUsersInfo => {
            let payload: FetchUsersInfoPayload = serde_json::from_value(job.payload.clone())?;
            fetch_users_info(store, twitch, settings, &payload).await
        }
    }
}

async fn access_token<S: CaptureStore>(store: &S, session_id: i64) -> Result<String, JobError> {
    store.access_token_for_session(session_id).await?
        .filter(|token| !token.is_empty())
        .ok_or(JobError::MissingAccessToken(session_id))
}

pub async fn fetch_chatters<S, T>(store: &S, twitch: &T, settings: &WorkerSettings, payload: &FetchChattersPayload)
        -> Result<(), JobError> where S: CaptureStore, T: TwitchSource {
    let token = access_token(store, payload.session_id).await?;
    let chatters = fetch_all_chatters(twitch, settings, &token, payload).await?;

    let follow_up = if chatters.is_empty() {
        None
    } else {
        Some(NewJob::fetch_users_info(&FetchUsersInfoPayload {
            session_id: payload.session_id,
            user_ids: chatters.clone()
        })?)
    };

    store.store_capture(payload, &chatters, follow_up.as_ref()).await?;
    Ok(())
}

/// Walks every page of the chatter list. A rate limited page is retried
/// after a fixed sleep.
async fn fetch_all_chatters<T: TwitchSource>(twitch: &T, settings: &WorkerSettings, token: &str,
        payload: &FetchChattersPayload) -> Result<Vec<String>, JobError> {
    let mut chatters = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = match twitch.chatters_page(token, &payload.broadcaster_id, &payload.twitch_user_id,
                cursor.as_deref()).await {
            Ok(page) => page,
            Err(ProxyError::RateLimited) => {
                warn!("rate limited fetching chatters of {}, retrying in {:?}",
                    payload.broadcaster_id, settings.rate_limited_sleep);
                sleep(settings.rate_limited_sleep).await;
                continue;
            },
            Err(err) => return Err(err.into())
        };

        debug!("chatters page for {}: {} entries", payload.broadcaster_id, page.data.len());
        chatters.extend(page.data.into_iter().map(|c| c.user_id));

        match page.pagination.cursor.filter(|c| !c.is_empty()) {
            Some(next) => cursor = Some(next),
            None => break
        }
        sleep(settings.page_delay).await;
    }

    info!("fetched {} chatters for broadcaster {}", chatters.len(), payload.broadcaster_id);
    Ok(chatters)
}

/// Drops repeated ids, keeping the first occurrence in place
pub fn dedupe_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect()
}

pub async fn fetch_users_info<S, T>(store: &S, twitch: &T, settings: &WorkerSettings, payload: &FetchUsersInfoPayload)
        -> Result<(), JobError> where S: CaptureStore, T: TwitchSource {
    let ids = dedupe_ids(&payload.user_ids);
    if ids.is_empty() {
        return Ok(());
    }
    let token = access_token(store, payload.session_id).await?;

    let batches: Vec<&[String]> = ids.chunks(USERS_BATCH_SIZE).collect();
    let mut renamed = 0;
    for (i, batch) in batches.iter().enumerate() {
        let users = loop {
            match twitch.users(&token, batch).await {
                Ok(users) => break users,
                Err(ProxyError::RateLimited) => {
                    warn!("rate limited fetching users, retrying in {:?}", settings.rate_limited_sleep);
                    sleep(settings.rate_limited_sleep).await;
                },
                Err(err) => return Err(err.into())
            }
        };
        renamed += store.upsert_twitch_users(&users).await?.len();

        if i + 1 < batches.len() {
            sleep(settings.batch_delay).await;
        }
    }

    info!("enriched {} users for session {} ({} renames)", ids.len(), payload.session_id, renamed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn dedupe_keeps_first_occurrence_order() {
        assert_eq!(dedupe_ids(&ids(&["3", "1", "3", "2", "1"])), ids(&["3", "1", "2"]));
        assert!(dedupe_ids(&[]).is_empty());
    }
}
