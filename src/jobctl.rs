use clap::{arg, Parser, Subcommand};
use std::process::exit;
use std::time::Duration;

use twitch_chatters::app;
use twitch_chatters::shared::types::job::{JobStatus, NewJob};
use twitch_chatters::worker::handlers::postgres_handler::PostgresHandler;
use twitch_chatters::worker::util::handler::JobQueue;

#[derive(Parser)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List recent jobs
    List {
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Enqueue a fresh copy of a failed job
    Requeue { id: i64 },
    /// Fail jobs stuck in running
    FailStale {
        #[arg(long, default_value_t = 15 * 60)]
        older_than_seconds: u64,
    },
}

fn parse_status(status: &str) -> Result<JobStatus, String> {
    status.parse::<JobStatus>().map_err(|s| format!("unknown status `{s}`, expected pending, running, done or failed"))
}

fn fail(message: String) -> ! {
    eprintln!("Error: {message}");
    exit(1);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let postgres_handler = match app::init_database().await {
        Ok(handler) => PostgresHandler::from_pool(handler.pool().clone()),
        Err(err) => fail(format!("cannot connect to database: {err}")),
    };

    match &cli.command {
        Commands::List { status, limit } => match postgres_handler.list_jobs(*status, *limit).await {
            Ok(jobs) => {
                for job in jobs {
                    println!("{}\t{}\t{}\t{}\t{}",
                        job.id,
                        job.job_type,
                        job.status,
                        job.created_at.to_rfc3339(),
                        job.error_message.unwrap_or_default()
                    );
                }
            },
            Err(err) => fail(format!("db error: {err}")),
        },
        Commands::Requeue { id } => match postgres_handler.get_job(*id).await {
            Ok(Some(job)) => match NewJob::requeue_of(&job) {
                Ok(new_job) => match postgres_handler.enqueue_job(&new_job).await {
                    Ok(new_id) => println!("Requeued job {id} as {new_id}"),
                    Err(err) => fail(format!("db error: {err}")),
                },
                Err(reason) => fail(reason),
            },
            Ok(None) => fail(format!("job {id} does not exist")),
            Err(err) => fail(format!("db error: {err}")),
        },
        Commands::FailStale { older_than_seconds } => {
            match postgres_handler.fail_stale_jobs(Duration::from_secs(*older_than_seconds)).await {
                Ok(count) => println!("Failed {count} stale jobs"),
                Err(err) => fail(format!("db error: {err}")),
            }
        },
    }
}
