use std::path::Path;

use anyhow::{Context, Result, bail};
use cloudscan_client::{CredentialArtifact, JobClient, JobOutcome, Submission};
use tracing::{info, warn};

use super::follow::{follow, print_outcome};

async fn read_key(path: &Path) -> Result<CredentialArtifact> {
    CredentialArtifact::read_key_file(path)
        .await
        .with_context(|| format!("failed to read key file {}", path.display()))
}

pub async fn discover(client: &JobClient, key_file: &Path) -> Result<()> {
    let context = client.resolve(read_key(key_file).await?).await?;
    if let Some(warning) = context.warning() {
        warn!("Discovery finished with a warning: {}", warning);
    }
    if context.discovered().is_empty() {
        println!("No projects reachable with this key");
        return Ok(());
    }
    for project in context.discovered() {
        println!("{project}");
    }
    Ok(())
}

pub async fn gcp(
    client: &JobClient,
    key_file: &Path,
    project: &str,
    checks: Option<String>,
    detach: bool,
) -> Result<()> {
    let mut context = client
        .resolve(read_key(key_file).await?)
        .await?
        .with_checks(checks);
    if let Some(warning) = context.warning() {
        warn!("Discovery finished with a warning: {}", warning);
    }
    context.select(project).with_context(|| {
        format!(
            "available projects: {}",
            context_list(context.discovered())
        )
    })?;

    match client.submit_job(&context).await? {
        Submission::Tracking(job_id) => {
            println!("Submitted job {job_id}");
            if detach {
                println!("Run `cloudscanctl resume` to follow it later");
                // Keep the handle; only the local session stops.
                client.cancel_tracking().await;
                info!("Detached from job {}", job_id);
                return Ok(());
            }
            follow(client).await
        }
        Submission::Finished(event) => print_outcome(&event),
    }
}

pub async fn aws(
    client: &JobClient,
    access_key: String,
    secret_key: String,
    region: String,
    checks: Option<String>,
) -> Result<()> {
    info!("Running AWS scan in region {}; this waits for the result", region);
    let context = client
        .resolve(CredentialArtifact::access_keys(
            access_key,
            secret_key,
            Some(region),
        ))
        .await?
        .with_checks(checks);

    match client.submit_job(&context).await? {
        Submission::Finished(event) => {
            if let JobOutcome::Completed(Some(result)) = &event.outcome
                && let Some(count) = result.get("findingsCount")
            {
                println!("Scan {} found {} finding(s)", event.job.id, count);
                return Ok(());
            }
            print_outcome(&event)
        }
        Submission::Tracking(job_id) => {
            bail!("worker unexpectedly queued AWS scan {job_id}")
        }
    }
}

fn context_list(projects: &[String]) -> String {
    if projects.is_empty() {
        "none".to_string()
    } else {
        projects.join(", ")
    }
}
