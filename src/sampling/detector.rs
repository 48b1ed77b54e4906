use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{CountSource, SamplingError};
use crate::models::Subject;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

/// One detector hit. Only `class_id` is read; the rest is carried along.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    #[serde(default)]
    pub class_id: Option<i64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DetectionResponse {
    #[serde(default)]
    pub detections: Vec<Detection>,
}

pub fn count_matching(response: &DetectionResponse, target_class: i64) -> u32 {
    let hits = response
        .detections
        .iter()
        .filter(|d| d.class_id == Some(target_class))
        .count();
    u32::try_from(hits).unwrap_or(u32::MAX)
}

/// Counts target-class detections reported by an HTTP endpoint.
pub struct DetectorSource {
    client: reqwest::Client,
    endpoint: Option<String>,
    target_class: i64,
}

impl DetectorSource {
    pub fn new(endpoint: Option<String>, target_class: i64, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build detector HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            target_class,
        })
    }

    fn url_for<'a>(&'a self, subject: &'a Subject) -> Result<&'a str, SamplingError> {
        subject
            .api_url
            .as_deref()
            .or(self.endpoint.as_deref())
            .ok_or_else(|| SamplingError::NoEndpoint(subject.key.to_string()))
    }
}

impl CountSource for DetectorSource {
    async fn fetch(&self, subject: &Subject) -> Result<u32, SamplingError> {
        let url = self.url_for(subject)?;

        let response = self.client.get(url).send().await.map_err(|err| {
            if err.is_timeout() {
                SamplingError::Timeout {
                    url: url.to_string(),
                }
            } else {
                SamplingError::Transport {
                    url: url.to_string(),
                    source: err,
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SamplingError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body: DetectionResponse = response.json().await.map_err(|err| SamplingError::Decode {
            url: url.to_string(),
            reason: err.to_string(),
        })?;

        Ok(count_matching(&body, self.target_class))
    }
}
