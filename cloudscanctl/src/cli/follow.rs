use anyhow::{Result, anyhow};
use cloudscan_client::{
    JobClient, JobOutcome, SuspendReason, TerminalEvent, TrackingState,
};
use tracing::info;

/// Print progress changes until the tracked job stops being active.
/// Ctrl-C stops tracking but keeps the pending job for `resume`.
pub async fn follow(client: &JobClient) -> Result<()> {
    let mut rx = client.subscribe();
    let mut last_line = String::new();

    loop {
        let state = rx.borrow_and_update().clone();
        match &state {
            TrackingState::Idle => return Ok(()),
            TrackingState::Active {
                job,
                consecutive_failures,
                last_error,
            } => {
                let mut line = format!(
                    "{}: {:>3}% {}",
                    job.id,
                    job.progress,
                    job.status.as_str()
                );
                if let Some(err) = last_error {
                    line.push_str(&format!(
                        " (retrying, {consecutive_failures} failed: {err})"
                    ));
                }
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
            }
            TrackingState::Terminal(event) => return print_outcome(event),
            TrackingState::Suspended { job, reason } => {
                return match reason {
                    SuspendReason::Cancelled => {
                        println!(
                            "Stopped following job {}; run `cloudscanctl resume` to continue",
                            job.id
                        );
                        Ok(())
                    }
                    SuspendReason::TransportFailures { .. } => {
                        Err(state.error().map_or_else(
                            || anyhow!("polling suspended"),
                            anyhow::Error::from,
                        ))
                    }
                };
            }
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping local tracking");
                client.cancel_tracking().await;
            }
        }
    }
}

pub fn print_outcome(event: &TerminalEvent) -> Result<()> {
    match &event.outcome {
        JobOutcome::Completed(result) => {
            println!("Job {} completed", event.job.id);
            if let Some(result) = result {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
            Ok(())
        }
        JobOutcome::Failed { .. } => Err(event
            .error()
            .map_or_else(|| anyhow!("job failed"), anyhow::Error::from)),
    }
}
