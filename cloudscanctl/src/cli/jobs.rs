use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use cloudscan_client::jobs::JobHandleStore;
use cloudscan_client::{ApiClient, ClientConfig, JobClient, ScanTransport};
use cloudscan_model::job::clamp_progress;

use tracing::debug;

use super::follow::follow;

pub async fn resume(client: &JobClient) -> Result<()> {
    if !client.resume_if_pending().await? {
        println!("No pending job");
        return Ok(());
    }
    follow(client).await
}

/// One-shot status check that leaves the pending job untouched
pub async fn status(config: &ClientConfig) -> Result<()> {
    let handle = JobHandleStore::new(Arc::new(config.handle_slot()?));
    let Some(job_id) = handle.read().await? else {
        println!("No pending job");
        return Ok(());
    };

    debug!("Fetching status of job {} from {}", job_id, config.server_url);
    let api = ApiClient::new(&config.server_url, config.request_timeout)?;
    let response = api
        .fetch_status(&job_id)
        .await
        .with_context(|| format!("failed to fetch status of job {job_id}"))?;
    println!(
        "{}: {:>3}% {}",
        job_id,
        clamp_progress(response.progress),
        response.status.as_str()
    );
    if let Some(result) = response.result_payload() {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    Ok(())
}

pub async fn reset(client: &JobClient) -> Result<()> {
    client.reset().await?;
    println!("Pending job cleared");
    Ok(())
}

pub async fn history(client: &JobClient) -> Result<()> {
    let rows = client.history().await?;
    if rows.is_empty() {
        println!("No scans yet");
        return Ok(());
    }
    println!(
        "{:<38} {:<8} {:<24} {:<10} CREATED",
        "SCAN", "PROVIDER", "PROJECT", "STATUS"
    );
    for row in rows {
        let created = row
            .created_at
            .map(|ts| {
                ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
            })
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<8} {:<24} {:<10} {}",
            row.scan_id.as_str(),
            row.provider,
            row.project_id.as_deref().unwrap_or("-"),
            row.status.as_str(),
            created
        );
    }
    Ok(())
}
