use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    db::Database,
    models::Subject,
    sampling::{CountSource, Sampler},
};

use super::loop_worker::{sampling_loop, RunnerSettings, RunnerState, RunnerSummary};

/// Owns the background sampling task: at most one loop at a time.
pub struct RunnerController {
    handle: Option<JoinHandle<RunnerSummary>>,
    cancel_token: Option<CancellationToken>,
    state_rx: Option<watch::Receiver<RunnerState>>,
}

impl Default for RunnerController {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            state_rx: None,
        }
    }

    pub fn start<S>(
        &mut self,
        subjects: Vec<Subject>,
        sampler: Arc<Sampler<S>>,
        db: Database,
        settings: RunnerSettings,
    ) -> Result<()>
    where
        S: CountSource + 'static,
    {
        if self.handle.is_some() {
            bail!("sampling runner already active");
        }

        info!(
            "Starting sampling runner for {} subjects (policy {:?})",
            subjects.len(),
            sampler.policy()
        );

        let cancel_token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(RunnerState::Idle);

        let handle = tokio::spawn(sampling_loop(
            Arc::new(subjects),
            sampler,
            db,
            settings,
            state_tx,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.state_rx = Some(state_rx);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// `Idle` when no loop has been started.
    pub fn state(&self) -> RunnerState {
        self.state_rx
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(RunnerState::Idle)
    }

    /// Waits for a bounded loop to finish on its own.
    pub async fn wait(&mut self) -> Result<RunnerSummary> {
        self.cancel_token = None;
        self.state_rx = None;
        self.join().await
    }

    /// Cancels the loop and waits for the pass in flight to finish.
    pub async fn stop(&mut self) -> Result<RunnerSummary> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.state_rx = None;
        self.join().await
    }

    async fn join(&mut self) -> Result<RunnerSummary> {
        match self.handle.take() {
            Some(handle) => handle
                .await
                .context("sampling runner task failed to join"),
            None => Ok(RunnerSummary::default()),
        }
    }
}
