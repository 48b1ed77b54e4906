//! Occupancy sampling.
//!
//! A [`CountSource`] produces a raw count or fails; [`Sampler`] wraps one and
//! applies the configured [`SamplingErrorPolicy`] so callers see either a
//! count or, under `propagate`, the error itself.

mod detector;
mod synthetic;

use std::{
    collections::HashMap,
    future::Future,
    sync::{Mutex, MutexGuard},
};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::{SamplerConfig, SamplerMode},
    models::{Subject, SubjectKey},
};

pub use detector::{count_matching, BoundingBox, Detection, DetectionResponse, DetectorSource};
pub use synthetic::{SimulatedDetectorSource, SyntheticSource};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("no detector endpoint configured for {0}")]
    NoEndpoint(String),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("detector at {url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("could not decode detector response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("count source failed: {0}")]
    Source(String),
}

/// What a failed sample turns into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SamplingErrorPolicy {
    /// Log and report nobody there.
    #[default]
    Zero,
    /// Log and repeat the subject's last good count (0 before the first one).
    LastKnown,
    /// Hand the error to the caller.
    Propagate,
}

pub trait CountSource: Send + Sync {
    fn fetch(&self, subject: &Subject)
        -> impl Future<Output = Result<u32, SamplingError>> + Send;
}

pub struct Sampler<S> {
    source: S,
    policy: SamplingErrorPolicy,
    last_known: Mutex<HashMap<SubjectKey, u32>>,
}

impl<S: CountSource> Sampler<S> {
    pub fn new(source: S, policy: SamplingErrorPolicy) -> Self {
        Self {
            source,
            policy,
            last_known: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> SamplingErrorPolicy {
        self.policy
    }

    pub async fn sample(&self, subject: &Subject) -> Result<u32, SamplingError> {
        match self.source.fetch(subject).await {
            Ok(count) => {
                log_debug!("sampled {count} at {}", subject.key);
                self.remembered().insert(subject.key.clone(), count);
                Ok(count)
            }
            Err(err) => self.recover(subject, err),
        }
    }

    fn recover(&self, subject: &Subject, err: SamplingError) -> Result<u32, SamplingError> {
        match self.policy {
            SamplingErrorPolicy::Zero => {
                log_warn!("sampling {} failed, recording 0: {err}", subject.key);
                Ok(0)
            }
            SamplingErrorPolicy::LastKnown => {
                let count = self
                    .remembered()
                    .get(&subject.key)
                    .copied()
                    .unwrap_or(0);
                log_warn!(
                    "sampling {} failed, reusing last known count {count}: {err}",
                    subject.key
                );
                Ok(count)
            }
            SamplingErrorPolicy::Propagate => Err(err),
        }
    }

    fn remembered(&self) -> MutexGuard<'_, HashMap<SubjectKey, u32>> {
        match self.last_known.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// The source selected by configuration.
pub enum ConfiguredSource {
    Synthetic(SyntheticSource),
    Simulated(SimulatedDetectorSource),
    Live(DetectorSource),
}

impl ConfiguredSource {
    pub fn from_config(config: &SamplerConfig) -> Result<Self> {
        Ok(match config.mode {
            SamplerMode::Synthetic => Self::Synthetic(SyntheticSource::new(
                config.synthetic_min,
                config.synthetic_max,
            )),
            SamplerMode::Simulated => {
                Self::Simulated(SimulatedDetectorSource::new(config.target_class))
            }
            SamplerMode::Live => Self::Live(DetectorSource::new(
                config.endpoint.clone(),
                config.target_class,
                config.request_timeout(),
            )?),
        })
    }
}

impl CountSource for ConfiguredSource {
    async fn fetch(&self, subject: &Subject) -> Result<u32, SamplingError> {
        match self {
            Self::Synthetic(source) => source.fetch(subject).await,
            Self::Simulated(source) => source.fetch(subject).await,
            Self::Live(source) => source.fetch(subject).await,
        }
    }
}
