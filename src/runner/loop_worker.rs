use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration as RetentionWindow;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    config::RunnerConfig,
    db::{helpers::now_local, Database, NewReading},
    models::Subject,
    sampling::{CountSource, Sampler},
};

// Set to false to silence the per-pass chatter
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunnerState {
    /// Waiting for the next tick.
    Idle,
    /// Walking every subject.
    Sampling,
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub interval: Duration,
    pub pass_timeout: Duration,
    pub retention: Option<RetentionWindow>,
    /// Stop after this many passes; `None` runs until cancelled.
    pub max_passes: Option<u64>,
}

impl RunnerSettings {
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            interval: config.interval(),
            pass_timeout: config.pass_timeout(),
            retention: config
                .retention_days
                .map(|days| RetentionWindow::days(i64::from(days))),
            max_passes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub sampled: usize,
    pub failed: usize,
    pub pruned: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSummary {
    pub passes: u64,
    pub sampled: u64,
    pub failed: u64,
    pub pruned: u64,
}

impl RunnerSummary {
    fn record(&mut self, report: &PassReport) {
        self.sampled += report.sampled as u64;
        self.failed += report.failed as u64;
        self.pruned += report.pruned as u64;
    }
}

/// Samples every subject once and appends the results as one batch stamped
/// with the pass start time. A subject whose sample fails is skipped.
pub async fn run_pass<S: CountSource>(
    subjects: &[Subject],
    sampler: &Sampler<S>,
    db: &Database,
    retention: Option<RetentionWindow>,
) -> Result<PassReport> {
    let timestamp = now_local();
    let mut readings = Vec::with_capacity(subjects.len());
    let mut failed = 0;

    for subject in subjects {
        match sampler.sample(subject).await {
            Ok(count) => readings.push(NewReading::new(subject.key.clone(), timestamp, count)),
            Err(err) => {
                failed += 1;
                log_warn!("skipping {} this pass: {err}", subject.key);
            }
        }
    }

    let sampled = readings.len();
    db.append_readings(readings)
        .await
        .context("failed to persist sampling pass")?;

    let pruned = match retention.map(|window| timestamp.checked_sub_signed(window)) {
        Some(Some(cutoff)) => db
            .prune_before(cutoff)
            .await
            .context("failed to apply retention window")?,
        Some(None) => {
            log_warn!("retention window reaches past the calendar, nothing pruned");
            0
        }
        None => 0,
    };

    Ok(PassReport {
        sampled,
        failed,
        pruned,
    })
}

pub async fn sampling_loop<S: CountSource>(
    subjects: Arc<Vec<Subject>>,
    sampler: Arc<Sampler<S>>,
    db: Database,
    settings: RunnerSettings,
    state_tx: watch::Sender<RunnerState>,
    cancel_token: CancellationToken,
) -> RunnerSummary {
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut summary = RunnerSummary::default();
    if settings.max_passes == Some(0) {
        return summary;
    }

    log_info!(
        "sampling loop started: {} subjects every {:?}",
        subjects.len(),
        settings.interval
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                state_tx.send_replace(RunnerState::Sampling);
                let pass_start = Instant::now();
                let fut = run_pass(&subjects, &sampler, &db, settings.retention);

                match tokio::time::timeout(settings.pass_timeout, fut).await {
                    Ok(Ok(report)) => {
                        summary.record(&report);
                        log_debug!(
                            "pass {} done in {}ms: {} sampled, {} failed, {} pruned",
                            summary.passes + 1,
                            pass_start.elapsed().as_millis(),
                            report.sampled,
                            report.failed,
                            report.pruned
                        );
                    }
                    Ok(Err(err)) => log_error!("sampling pass failed: {err:?}"),
                    Err(_) => log_warn!("sampling pass timeout (> {:?})", settings.pass_timeout),
                }

                summary.passes += 1;
                state_tx.send_replace(RunnerState::Idle);
                // The full interval is waited after the pass, not alongside it.
                ticker.reset();

                if settings.max_passes.is_some_and(|max| summary.passes >= max) {
                    log_info!("sampling loop finished after {} passes", summary.passes);
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("sampling loop shutting down after {} passes", summary.passes);
                break;
            }
        }
    }

    summary
}
