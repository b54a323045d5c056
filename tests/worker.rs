#[cfg(test)]
mod tests {
    use twitch_chatters::shared::types::account::{HelixChatter, HelixChattersResponse, HelixPagination, HelixUser};
    use twitch_chatters::shared::types::job::{FetchChattersPayload, FetchUsersInfoPayload, Job, JobStatus, JobType, NewJob};
    use twitch_chatters::worker::error::ProxyError;
    use twitch_chatters::worker::handlers::memory_handler::MemoryHandler;
    use twitch_chatters::worker::jobs;
    use twitch_chatters::worker::runner::{Worker, WorkerSettings};
    use twitch_chatters::worker::types::{JobOutcome, STALE_JOB_MESSAGE};
    use twitch_chatters::worker::util::handler::{JobQueue, TwitchSource};

    use async_trait::async_trait;
    use chrono::Utc;
    use futures::future::join_all;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::watch;

    const SESSION: i64 = 1;

    /// Serves canned chatter pages and echoes `/users` lookups
    #[derive(Clone, Default)]
    struct ScriptedTwitch {
        pages: Arc<Vec<Vec<&'static str>>>,
        rate_limited: Arc<Mutex<usize>>,
        users_calls: Arc<Mutex<Vec<Vec<String>>>>,
        chatter_calls: Arc<Mutex<usize>>,
        names: Arc<Mutex<Vec<(String, String)>>>,
        delay: Duration
    }

    impl ScriptedTwitch {
        fn with_pages(pages: Vec<Vec<&'static str>>) -> ScriptedTwitch {
            ScriptedTwitch { pages: Arc::new(pages), ..Default::default() }
        }

        fn rate_limit_next(&self, times: usize) {
            *self.rate_limited.lock().unwrap() = times;
        }

        /// Login override for a user id
        fn rename(&self, id: &str, login: &str) {
            self.names.lock().unwrap().push((id.to_string(), login.to_string()));
        }

        fn users_calls(&self) -> Vec<Vec<String>> {
            self.users_calls.lock().unwrap().clone()
        }

        fn take_rate_limit(&self) -> bool {
            let mut left = self.rate_limited.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return true;
            }
            false
        }
    }

    #[async_trait]
    impl TwitchSource for ScriptedTwitch {
        async fn chatters_page(&self, _token: &str, _broadcaster_id: &str, _moderator_id: &str, cursor: Option<&str>)
                -> Result<HelixChattersResponse, ProxyError> {
            tokio::time::sleep(self.delay).await;
            if self.take_rate_limit() {
                return Err(ProxyError::RateLimited);
            }
            *self.chatter_calls.lock().unwrap() += 1;

            let index = cursor.and_then(|c| c.trim_start_matches('p').parse::<usize>().ok()).unwrap_or(0);
            let data = self.pages.get(index).cloned().unwrap_or_default().into_iter()
                .map(|id| HelixChatter {
                    user_id: id.to_string(),
                    user_login: format!("user{}", id),
                    user_name: format!("User{}", id)
                })
                .collect();
            let next = if index + 1 < self.pages.len() { Some(format!("p{}", index + 1)) } else { None };
            Ok(HelixChattersResponse { data, pagination: HelixPagination { cursor: next } })
        }

        async fn users(&self, _token: &str, ids: &[String]) -> Result<Vec<HelixUser>, ProxyError> {
            if self.take_rate_limit() {
                return Err(ProxyError::RateLimited);
            }
            self.users_calls.lock().unwrap().push(ids.to_vec());

            let names = self.names.lock().unwrap().clone();
            Ok(ids.iter().map(|id| {
                let login = names.iter().find(|(n, _)| n == id).map(|(_, l)| l.clone())
                    .unwrap_or(format!("user{}", id));
                HelixUser {
                    id: id.clone(),
                    display_name: login.to_uppercase(),
                    login,
                    created_at: "2020-01-01T00:00:00Z".to_string(),
                    ..Default::default()
                }
            }).collect())
        }
    }

    fn settings() -> WorkerSettings {
        WorkerSettings {
            poll_interval: Duration::from_millis(10),
            job_timeout: Duration::from_secs(5),
            rate_limited_sleep: Duration::from_millis(10),
            page_delay: Duration::ZERO,
            batch_delay: Duration::ZERO,
            stale_job_timeout: Duration::from_secs(60),
            stale_sweep_interval: Duration::from_secs(1)
        }
    }

    fn worker(handler: &MemoryHandler, twitch: &ScriptedTwitch) -> Worker<MemoryHandler, MemoryHandler, ScriptedTwitch> {
        Worker::new(handler.clone(), handler.clone(), twitch.clone(), settings())
    }

    fn chatters_job() -> NewJob {
        NewJob::fetch_chatters(&FetchChattersPayload {
            session_id: SESSION,
            twitch_user_id: "99".to_string(),
            broadcaster_id: "42".to_string(),
            broadcaster_login: "streamer".to_string()
        }).unwrap()
    }

    fn users_job(ids: Vec<String>) -> NewJob {
        NewJob::fetch_users_info(&FetchUsersInfoPayload { session_id: SESSION, user_ids: ids }).unwrap()
    }

    async fn handler_with_token() -> MemoryHandler {
        let handler = MemoryHandler::new();
        handler.set_access_token(SESSION, "token").await;
        handler
    }

    #[tokio::test]
    async fn capture_then_enrich() {
        let handler = handler_with_token().await;
        let twitch = ScriptedTwitch::with_pages(vec![vec!["1", "2"], vec!["3"]]);
        let worker = worker(&handler, &twitch);
        let job_id = handler.enqueue_job(&chatters_job()).await.unwrap();

        assert_eq!(worker.process_one_job().await.unwrap(), JobOutcome::Done(job_id), "capture job succeeds");

        let captures = handler.captures().await;
        assert_eq!(captures.len(), 1, "one capture row");
        assert_eq!(captures[0].chatters, vec!["1", "2", "3"], "chatters from both pages");
        assert_eq!(captures[0].broadcaster_login, "streamer");

        let queued = handler.jobs().await;
        assert_eq!(queued.len(), 2, "follow-up enrichment job enqueued");
        let follow_up = &queued[1];
        assert_eq!(follow_up.job_type, JobType::FetchUsersInfo.as_str());
        assert_eq!(follow_up.status, JobStatus::Pending);
        assert_eq!(follow_up.payload, json!({"session_id": SESSION, "user_ids": ["1", "2", "3"]}));

        assert_eq!(worker.process_one_job().await.unwrap(), JobOutcome::Done(follow_up.id), "enrichment succeeds");
        assert_eq!(handler.twitch_user("3").await.unwrap().login, "user3", "identity stored");
        assert_eq!(worker.process_one_job().await.unwrap(), JobOutcome::Idle, "queue drained");
    }

    #[tokio::test]
    async fn empty_chat_has_no_follow_up() {
        let handler = handler_with_token().await;
        let twitch = ScriptedTwitch::with_pages(vec![vec![]]);
        let worker = worker(&handler, &twitch);
        handler.enqueue_job(&chatters_job()).await.unwrap();

        worker.process_one_job().await.unwrap();
        assert_eq!(handler.captures().await[0].chatters.len(), 0, "capture recorded with no chatters");
        assert_eq!(handler.jobs().await.len(), 1, "no enrichment job for an empty chat");
    }

    #[tokio::test]
    async fn job_is_claimed_once() {
        let handler = handler_with_token().await;
        let twitch = ScriptedTwitch::with_pages(vec![vec!["1"]]);
        let worker = worker(&handler, &twitch);
        let job_id = handler.enqueue_job(&users_job(vec![])).await.unwrap();

        assert_eq!(worker.process_one_job().await.unwrap(), JobOutcome::Done(job_id));
        assert_eq!(worker.process_one_job().await.unwrap(), JobOutcome::Idle, "done job is not claimed again");
        assert_eq!(handler.claims().await, vec![job_id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_workers_never_share_a_job() {
        let handler = handler_with_token().await;
        let twitch = ScriptedTwitch::default();
        let total = 50;
        for _ in 0..total {
            handler.enqueue_job(&users_job(vec![])).await.unwrap();
        }

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let worker = worker(&handler, &twitch);
            tasks.push(tokio::spawn(async move {
                while worker.process_one_job().await.unwrap() != JobOutcome::Idle {}
            }));
        }
        for finished in join_all(tasks).await {
            finished.unwrap();
        }

        let claims = handler.claims().await;
        let unique: HashSet<i64> = claims.iter().copied().collect();
        assert_eq!(claims.len(), total, "every job claimed");
        assert_eq!(unique.len(), total, "no job claimed twice");
        assert!(handler.jobs().await.iter().all(|j| j.status == JobStatus::Done));
    }

    #[tokio::test]
    async fn unknown_type_fails() {
        let handler = handler_with_token().await;
        // Rows written by something newer than this worker
        let job = Job {
            id: 7,
            job_type: "SEND_EMAIL".to_string(),
            payload: json!({}),
            status: JobStatus::Running,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            finished_at: None,
            error_message: None
        };

        let err = jobs::run_job(&handler, &ScriptedTwitch::default(), &settings(), &job).await.unwrap_err();
        assert_eq!(err.to_string(), "unknown job type SEND_EMAIL");
    }

    #[tokio::test]
    async fn bad_payload_fails() {
        let handler = handler_with_token().await;
        let worker = worker(&handler, &ScriptedTwitch::default());

        let bad = handler.enqueue_job(&NewJob { job_type: JobType::FetchChatters, payload: json!({"session_id": "x"}) })
            .await.unwrap();
        match worker.process_one_job().await.unwrap() {
            JobOutcome::Failed(id, message) => {
                assert_eq!(id, bad);
                assert!(message.starts_with("invalid payload"), "unexpected message: {}", message);
            },
            other => panic!("expected failure, got {:?}", other)
        }
        assert_eq!(handler.job(bad).await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn missing_token_fails_the_job() {
        let handler = MemoryHandler::new();
        let worker = worker(&handler, &ScriptedTwitch::with_pages(vec![vec!["1"]]));
        let job_id = handler.enqueue_job(&chatters_job()).await.unwrap();

        let outcome = worker.process_one_job().await.unwrap();
        assert_eq!(outcome, JobOutcome::Failed(job_id, format!("cannot get access token for session {}", SESSION)));
        assert!(handler.captures().await.is_empty(), "nothing stored without a token");
        assert_eq!(handler.job(job_id).await.unwrap().error_message.unwrap(),
            format!("cannot get access token for session {}", SESSION));
    }

    #[tokio::test]
    async fn rate_limited_calls_are_retried() {
        let handler = handler_with_token().await;
        let twitch = ScriptedTwitch::with_pages(vec![vec!["1", "2"]]);
        twitch.rate_limit_next(2);
        let worker = worker(&handler, &twitch);
        let job_id = handler.enqueue_job(&chatters_job()).await.unwrap();

        assert_eq!(worker.process_one_job().await.unwrap(), JobOutcome::Done(job_id), "429s do not fail the job");
        assert_eq!(handler.captures().await[0].chatters, vec!["1", "2"]);
        assert_eq!(*twitch.chatter_calls.lock().unwrap(), 1, "one successful page fetch");
    }

    #[tokio::test]
    async fn users_are_deduped_and_batched() {
        let handler = handler_with_token().await;
        let twitch = ScriptedTwitch::default();
        let worker = worker(&handler, &twitch);

        let mut ids: Vec<String> = (0..250).map(|i| i.to_string()).collect();
        ids.extend((0..20).map(|i| i.to_string()));
        handler.enqueue_job(&users_job(ids)).await.unwrap();
        worker.process_one_job().await.unwrap();

        let calls = twitch.users_calls();
        assert_eq!(calls.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![100, 100, 50], "batches of at most 100");
        assert_eq!(calls[0][0], "0", "first occurrence order kept");
        assert!(handler.twitch_user("249").await.is_some());
    }

    #[tokio::test]
    async fn renames_are_recorded_once() {
        let handler = handler_with_token().await;
        let twitch = ScriptedTwitch::default();
        let worker = worker(&handler, &twitch);
        let ids = vec!["1".to_string(), "2".to_string()];

        handler.enqueue_job(&users_job(ids.clone())).await.unwrap();
        worker.process_one_job().await.unwrap();
        assert!(handler.renames().await.is_empty(), "first sighting is not a rename");

        handler.enqueue_job(&users_job(ids.clone())).await.unwrap();
        worker.process_one_job().await.unwrap();
        assert!(handler.renames().await.is_empty(), "unchanged names add no history");

        twitch.rename("2", "newname");
        handler.enqueue_job(&users_job(ids)).await.unwrap();
        worker.process_one_job().await.unwrap();

        let renames = handler.renames().await;
        assert_eq!(renames.len(), 1, "one row for the renamed account");
        assert_eq!(renames[0].twitch_user_id, "2");
        assert_eq!(renames[0].old_login, "user2");
        assert_eq!(renames[0].new_login, "newname");
        assert_eq!(handler.twitch_user("2").await.unwrap().display_name, "NEWNAME");
    }

    #[tokio::test]
    async fn slow_job_times_out() {
        let handler = handler_with_token().await;
        let twitch = ScriptedTwitch { delay: Duration::from_millis(500), ..ScriptedTwitch::with_pages(vec![vec!["1"]]) };
        let mut settings = settings();
        settings.job_timeout = Duration::from_millis(50);
        let worker = Worker::new(handler.clone(), handler.clone(), twitch, settings);
        let job_id = handler.enqueue_job(&chatters_job()).await.unwrap();

        match worker.process_one_job().await.unwrap() {
            JobOutcome::Failed(id, message) => {
                assert_eq!(id, job_id);
                assert!(message.contains("timed out"), "unexpected message: {}", message);
            },
            other => panic!("expected timeout, got {:?}", other)
        }
    }

    #[tokio::test]
    async fn stale_running_jobs_are_failed() {
        let handler = handler_with_token().await;
        let worker = worker(&handler, &ScriptedTwitch::default());
        let stuck = handler.enqueue_job(&users_job(vec![])).await.unwrap();
        let fresh = handler.enqueue_job(&users_job(vec![])).await.unwrap();
        handler.claim_job().await.unwrap();
        handler.claim_job().await.unwrap();
        handler.backdate_start(stuck, Duration::from_secs(120)).await;

        assert_eq!(worker.sweep_stale_jobs().await.unwrap(), 1, "only the old job is stale");
        let job = handler.job(stuck).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some(STALE_JOB_MESSAGE));
        assert_eq!(handler.job(fresh).await.unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown() {
        let handler = handler_with_token().await;
        let twitch = ScriptedTwitch::with_pages(vec![vec!["1"]]);
        let worker = worker(&handler, &twitch);
        handler.enqueue_job(&chatters_job()).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { worker.run(rx).await });

        for _ in 0..100 {
            if handler.jobs().await.iter().all(|j| j.status == JobStatus::Done) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();

        assert!(handler.jobs().await.iter().all(|j| j.status == JobStatus::Done), "capture and enrichment both ran");
    }

    #[tokio::test]
    async fn closed_shutdown_channel_keeps_poll_interval() {
        let handler = handler_with_token().await;
        for _ in 0..20 {
            handler.enqueue_job(&users_job(vec![])).await.unwrap();
        }
        let mut settings = settings();
        settings.poll_interval = Duration::from_secs(1);
        let worker = Worker::new(handler.clone(), handler.clone(), ScriptedTwitch::default(), settings);

        let (tx, rx) = watch::channel(false);
        drop(tx);
        let still_running = tokio::time::timeout(Duration::from_millis(300), worker.run(rx)).await;
        assert!(still_running.is_err(), "loop keeps going without a shutdown sender");

        let done = handler.jobs().await.iter().filter(|j| j.status == JobStatus::Done).count();
        assert_eq!(done, 1, "only the immediate first tick ran within one poll interval");
    }
}
