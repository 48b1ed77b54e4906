//! Count → crowd level mapping.
//!
//! Levels are derived on read and never stored, so changing the thresholds
//! reclassifies historical readings too.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum CrowdLevel {
    Low,
    Medium,
    High,
}

impl CrowdLevel {
    pub fn text(&self) -> &'static str {
        match self {
            CrowdLevel::Low => "Not at all crowded",
            CrowdLevel::Medium => "Slightly crowded",
            CrowdLevel::High => "Extremely crowded",
        }
    }

    /// CSS class used by the demo front end.
    pub fn as_str(&self) -> &'static str {
        match self {
            CrowdLevel::Low => "low",
            CrowdLevel::Medium => "medium",
            CrowdLevel::High => "high",
        }
    }

    pub fn chart_color(&self) -> &'static str {
        match self {
            CrowdLevel::Low => "green",
            CrowdLevel::Medium => "orange",
            CrowdLevel::High => "red",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub level: CrowdLevel,
    pub text: &'static str,
}

/// Lower bounds (inclusive) of the medium and high bands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CrowdThresholds {
    pub medium_from: u32,
    pub high_from: u32,
}

impl Default for CrowdThresholds {
    fn default() -> Self {
        Self {
            medium_from: 20,
            high_from: 50,
        }
    }
}

impl CrowdThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.medium_from > self.high_from {
            bail!(
                "medium threshold ({}) must not exceed high threshold ({})",
                self.medium_from,
                self.high_from
            );
        }
        Ok(())
    }

    pub fn level(&self, count: u32) -> CrowdLevel {
        if count < self.medium_from {
            CrowdLevel::Low
        } else if count < self.high_from {
            CrowdLevel::Medium
        } else {
            CrowdLevel::High
        }
    }

    pub fn classify(&self, count: u32) -> Classification {
        let level = self.level(count);
        Classification {
            level,
            text: level.text(),
        }
    }
}
