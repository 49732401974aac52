use cellarbook_core::services::AppContext;
use cellarbook_core::sync::{CancelSignal, DownloadReport, RemoteStore};
use serde::Serialize;

use crate::commands::common::{describe_outcome, ensure_remote, outcome_result};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct SyncStatus {
    pub enabled: bool,
    pub unmetered_only: bool,
    pub remote: &'static str,
    pub account: Option<String>,
    pub pending_operations: usize,
    pub processed_objects: usize,
}

pub fn format_download_report(report: &DownloadReport) -> String {
    format!(
        "{} batches replayed ({} applied, {} stale, {} missing, {} from another schema), \
         {} expired, {} unreadable, {} failed",
        report.objects_processed,
        report.applied,
        report.stale,
        report.missing,
        report.schema_mismatch,
        report.objects_expired,
        report.objects_undecodable,
        report.objects_failed
    )
}

pub async fn run_sync_upload(app: &AppContext) -> Result<(), CliError> {
    ensure_remote(app)?;
    let pending = app.catalog().pending_count().await?;
    let outcome = app.upload_worker().run(&CancelSignal::never()).await;
    println!("Upload of {pending} operations: {}", describe_outcome(&outcome));
    outcome_result("upload", &outcome)
}

pub async fn run_sync_download(app: &AppContext) -> Result<(), CliError> {
    ensure_remote(app)?;
    let (outcome, report) = app
        .download_worker()
        .run_with_report(&CancelSignal::never())
        .await;
    println!("Download: {}", describe_outcome(&outcome));
    println!("{}", format_download_report(&report));
    outcome_result("download", &outcome)
}

pub async fn run_sync_run(app: &AppContext) -> Result<(), CliError> {
    ensure_remote(app)?;
    let pass = app.sync_once(&CancelSignal::never()).await;
    println!("Upload: {}", describe_outcome(&pass.upload));
    println!("Download: {}", describe_outcome(&pass.download));
    println!("{}", format_download_report(&pass.report));
    outcome_result("upload", &pass.upload)?;
    outcome_result("download", &pass.download)
}

pub async fn run_sync_watch(app: &AppContext) -> Result<(), CliError> {
    ensure_remote(app)?;
    let config = app.config();
    println!(
        "Syncing every {}s (upload) and {}s (download). Press Ctrl-C to stop.",
        config.upload_interval_secs, config.download_interval_secs
    );

    let scheduler = app.start_scheduler();
    let interrupted = tokio::signal::ctrl_c().await;
    scheduler.shutdown().await;
    interrupted?;
    println!("Sync stopped");
    Ok(())
}

pub async fn sync_status(app: &AppContext) -> Result<SyncStatus, CliError> {
    let prefs = app.preferences().get()?;
    let account = app
        .remote()
        .account()
        .await?
        .map(|account| account.display_name);
    Ok(SyncStatus {
        enabled: prefs.sync_enabled,
        unmetered_only: prefs.sync_unmetered_only,
        remote: app.remote().kind(),
        account,
        pending_operations: app.catalog().pending_count().await?,
        processed_objects: prefs.processed_remote_ids.len(),
    })
}

pub fn format_status_lines(status: &SyncStatus) -> Vec<String> {
    let on_off = |value: bool| if value { "on" } else { "off" };
    vec![
        format!("Sync:               {}", on_off(status.enabled)),
        format!("Unmetered only:     {}", on_off(status.unmetered_only)),
        format!(
            "Remote:             {}{}",
            status.remote,
            status
                .account
                .as_deref()
                .map(|account| format!(" ({account})"))
                .unwrap_or_default()
        ),
        format!("Pending operations: {}", status.pending_operations),
        format!("Processed batches:  {}", status.processed_objects),
    ]
}

pub async fn run_sync_status(app: &AppContext, as_json: bool) -> Result<(), CliError> {
    let status = sync_status(app).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in format_status_lines(&status) {
            println!("{line}");
        }
    }
    Ok(())
}
