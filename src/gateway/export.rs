//! Per-account session export as CSV or JSON

use crate::gateway::types::{ExportAccount, ExportData, ExportFormat};

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

pub const CSV_HEADER: [&str; 7] =
    ["twitch_user_id", "login", "display_name", "created_at", "seen_count", "first_seen", "last_seen"];

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error)
}

fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn filename(session_uuid: &str, format: ExportFormat) -> String {
    format!("session_{}.{}", session_uuid, format.extension())
}

pub fn render(format: ExportFormat, session_uuid: &str, accounts: Vec<ExportAccount>) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Csv => render_csv(&accounts),
        ExportFormat::Json => Ok(serde_json::to_vec(&ExportData {
            session_uuid: session_uuid.to_string(),
            exported_at: Utc::now(),
            accounts
        })?)
    }
}

fn render_csv(accounts: &[ExportAccount]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for account in accounts {
        writer.write_record([
            account.twitch_user_id.clone(),
            account.login.clone(),
            account.display_name.clone(),
            account.created_at.as_ref().map(timestamp).unwrap_or_default(),
            account.seen_count.to_string(),
            timestamp(&account.first_seen),
            timestamp(&account.last_seen)
        ])?;
    }
    writer.into_inner().map_err(|err| err.into_error().into())
}
