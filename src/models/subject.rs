//! Tracked locations.
//!
//! A `Subject` is built from the loaded configuration and never persisted;
//! only its `SubjectKey` reaches the database.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/400x300?text=No+Image";

/// Persisted identity of a subject. Single-stream subjects have no attraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectKey {
    pub city: String,
    pub attraction: Option<String>,
}

impl SubjectKey {
    pub fn attraction(city: impl Into<String>, attraction: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            attraction: Some(attraction.into()),
        }
    }

    pub fn stream(name: impl Into<String>) -> Self {
        Self {
            city: name.into(),
            attraction: None,
        }
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attraction {
            Some(attraction) => write!(f, "{attraction} ({})", self.city),
            None => write!(f, "{}", self.city),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub key: SubjectKey,
    /// `(lat, lng)`
    pub location: Option<(f64, f64)>,
    pub image_ref: Option<String>,
    /// Per-subject detector endpoint; overrides the global one when set.
    pub api_url: Option<String>,
}

impl Subject {
    pub fn new(key: SubjectKey) -> Self {
        Self {
            key,
            location: None,
            image_ref: None,
            api_url: None,
        }
    }

    pub fn city(&self) -> &str {
        &self.key.city
    }

    /// Display name: the attraction, or the stream name for bare streams.
    pub fn name(&self) -> &str {
        self.key.attraction.as_deref().unwrap_or(&self.key.city)
    }

    pub fn image_or_placeholder(&self) -> &str {
        self.image_ref.as_deref().unwrap_or(PLACEHOLDER_IMAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_subject_uses_city_as_name() {
        let subject = Subject::new(SubjectKey::stream("lobby-cam"));
        assert_eq!(subject.name(), "lobby-cam");
        assert_eq!(subject.key.to_string(), "lobby-cam");
    }

    #[test]
    fn missing_image_falls_back_to_placeholder() {
        let subject = Subject::new(SubjectKey::attraction("Tokyo", "Senso-ji"));
        assert_eq!(subject.image_or_placeholder(), PLACEHOLDER_IMAGE);
        assert_eq!(subject.key.to_string(), "Senso-ji (Tokyo)");
    }
}
