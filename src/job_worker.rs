use log::{error, info};
use std::process::exit;
use tokio::sync::watch;

use twitch_chatters::app;
use twitch_chatters::shared::util::config;
use twitch_chatters::worker::handlers::postgres_handler::PostgresHandler;
use twitch_chatters::worker::handlers::proxy_handler::ProxyHandler;
use twitch_chatters::worker::runner::{Worker, WorkerSettings};

#[tokio::main]
async fn main() {
    app::init_logger();
    let config = config::get_config();
    let settings = WorkerSettings::from_config(&config.worker);

    let shared_handler = match app::init_database().await {
        Ok(handler) => handler,
        Err(err) => {
            error!("cannot connect to database: {}", err);
            exit(1);
        }
    };
    let postgres_handler = PostgresHandler::from_pool(shared_handler.pool().clone());

    let proxy_handler = match ProxyHandler::new(&config.worker.twitch_api_base_url, settings.job_timeout) {
        Ok(handler) => handler,
        Err(err) => {
            error!("cannot build twitch-api client: {}", err);
            exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                let _ = shutdown_tx.send(true);
            },
            Err(err) => error!("cannot listen for ctrl-c, stop the worker another way: {}", err)
        }
    });

    info!("worker using twitch-api at {}", config.worker.twitch_api_base_url);
    let worker = Worker::new(postgres_handler.clone(), postgres_handler, proxy_handler, settings);
    worker.run(shutdown_rx).await;
}
