//! Request-path operations: what the demo's HTTP routes did, minus HTTP.
//!
//! Response structs keep the demo's snake_case JSON field names.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::warn;
use serde::Serialize;

use crate::{
    classifier::CrowdLevel,
    config::AppConfig,
    db::{
        helpers::{format_timestamp, now_local},
        Database, NewReading, Reading,
    },
    models::{Subject, SubjectKey},
    sampling::{CountSource, Sampler},
};

pub const HISTORY_LIMIT: usize = 30;
pub const LOG_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AttractionStatus {
    pub name: String,
    pub count: u32,
    pub level_text: &'static str,
    pub level_class: &'static str,
    pub image: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub counts: Vec<u32>,
    pub colors: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CitySurvey {
    pub city: String,
    /// Ascending by count.
    pub results: Vec<AttractionStatus>,
    pub chart_data: ChartData,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryPoint {
    pub datetime: String,
    pub people_count: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AttractionHistory {
    pub attraction: String,
    /// Oldest first.
    pub data: Vec<HistoryPoint>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SnapshotEntry {
    pub name: String,
    pub count: u32,
    pub level_text: &'static str,
    pub level_class: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CitySnapshot {
    pub city: String,
    pub data: Vec<SnapshotEntry>,
}

pub struct CrowdService<S> {
    config: Arc<AppConfig>,
    sampler: Arc<Sampler<S>>,
    db: Database,
}

impl<S> Clone for CrowdService<S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            sampler: Arc::clone(&self.sampler),
            db: self.db.clone(),
        }
    }
}

impl<S: CountSource> CrowdService<S> {
    pub fn new(config: Arc<AppConfig>, sampler: Arc<Sampler<S>>, db: Database) -> Self {
        Self {
            config,
            sampler,
            db,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn sampler(&self) -> Arc<Sampler<S>> {
        Arc::clone(&self.sampler)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn cities(&self) -> Vec<String> {
        self.config.city_names()
    }

    fn level(&self, count: u32) -> CrowdLevel {
        self.config.thresholds.level(count)
    }

    /// Samples every attraction of `city` once, logs the counts and returns
    /// them least crowded first. Attractions whose sample errors out are left
    /// out of the survey. Unknown cities survey nothing.
    pub async fn survey_city(&self, city: &str) -> Result<CitySurvey> {
        let attractions = self.config.attractions_for(city);
        let timestamp = now_local();

        let mut sampled: Vec<(Subject, u32)> = Vec::with_capacity(attractions.len());
        for attraction in attractions {
            match self.sampler.sample(&attraction).await {
                Ok(count) => sampled.push((attraction, count)),
                Err(err) => warn!("leaving {} out of the survey: {err}", attraction.key),
            }
        }

        let readings = sampled
            .iter()
            .map(|(subject, count)| NewReading::new(subject.key.clone(), timestamp, *count))
            .collect();
        self.db
            .append_readings(readings)
            .await
            .with_context(|| format!("failed to log survey of {city}"))?;

        let mut results: Vec<AttractionStatus> = sampled
            .into_iter()
            .map(|(subject, count)| {
                let level = self.level(count);
                AttractionStatus {
                    name: subject.name().to_string(),
                    count,
                    level_text: level.text(),
                    level_class: level.as_str(),
                    image: subject.image_or_placeholder().to_string(),
                    lat: subject.location.map(|(lat, _)| lat),
                    lng: subject.location.map(|(_, lng)| lng),
                }
            })
            .collect();
        results.sort_by_key(|status| status.count);

        let chart_data = chart_data(&results, |count| self.level(count));

        Ok(CitySurvey {
            city: city.to_string(),
            results,
            chart_data,
        })
    }

    pub async fn attraction_history(
        &self,
        city: &str,
        attraction: &str,
        limit: usize,
    ) -> Result<AttractionHistory> {
        let readings = self
            .db
            .recent_for(&SubjectKey::attraction(city, attraction), limit)
            .await?;

        Ok(AttractionHistory {
            attraction: attraction.to_string(),
            data: readings
                .iter()
                .map(|reading| HistoryPoint {
                    datetime: format_timestamp(&reading.timestamp),
                    people_count: reading.count,
                })
                .collect(),
        })
    }

    /// Latest count and level per attraction; never-sampled ones show 0.
    pub async fn city_snapshot(&self, city: &str) -> Result<CitySnapshot> {
        let mut data = Vec::new();
        for attraction in self.config.attractions_for(city) {
            let count = self
                .db
                .latest_for(&attraction.key)
                .await?
                .map(|reading| reading.count)
                .unwrap_or(0);
            let level = self.level(count);

            data.push(SnapshotEntry {
                name: attraction.name().to_string(),
                count,
                level_text: level.text(),
                level_class: level.as_str(),
            });
        }

        Ok(CitySnapshot {
            city: city.to_string(),
            data,
        })
    }

    pub async fn recent_logs(&self, limit: usize) -> Result<Vec<Reading>> {
        self.db.all_recent(limit).await
    }
}

fn chart_data(results: &[AttractionStatus], level: impl Fn(u32) -> CrowdLevel) -> ChartData {
    ChartData {
        labels: results.iter().map(|r| r.name.clone()).collect(),
        counts: results.iter().map(|r| r.count).collect(),
        colors: results.iter().map(|r| level(r.count).chart_color()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::testing::ScriptedSource;
    use crate::sampling::SamplingErrorPolicy;
    use chrono::NaiveDate;
    use tempfile::{tempdir, TempDir};

    fn service(source: ScriptedSource, policy: SamplingErrorPolicy) -> (TempDir, CrowdService<ScriptedSource>) {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("service.sqlite3")).unwrap();
        let service = CrowdService::new(
            Arc::new(AppConfig::default()),
            Arc::new(Sampler::new(source, policy)),
            db,
        );
        (dir, service)
    }

    #[tokio::test]
    async fn survey_logs_every_attraction_and_sorts_ascending() {
        // Counts 60, 61, 62 in declaration order
        let (_dir, service) = service(ScriptedSource::new(60), SamplingErrorPolicy::Zero);

        let survey = service.survey_city("Tokyo").await.unwrap();
        assert_eq!(survey.results.len(), 3);
        assert!(survey.results.windows(2).all(|w| w[0].count <= w[1].count));
        assert!(survey.results.iter().all(|r| r.level_class == "high"));
        assert_eq!(survey.chart_data.labels[0], "Shibuya Crossing");
        assert_eq!(survey.chart_data.colors, vec!["red", "red", "red"]);

        for name in ["Shibuya Crossing", "Senso-ji", "Ghibli Museum"] {
            let key = SubjectKey::attraction("Tokyo", name);
            assert_eq!(service.database().count_for(&key).await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn survey_drops_attractions_that_fail_under_propagate() {
        let broken = SubjectKey::attraction("Istanbul", "Hagia Sophia");
        let (_dir, service) = service(
            ScriptedSource::new(5).failing_for(broken.clone()),
            SamplingErrorPolicy::Propagate,
        );

        let survey = service.survey_city("Istanbul").await.unwrap();
        let names: Vec<_> = survey.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Blue Mosque", "Grand Bazaar"]);
        assert_eq!(service.database().count_for(&broken).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_city_is_empty_not_an_error() {
        let (_dir, service) = service(ScriptedSource::new(0), SamplingErrorPolicy::Zero);

        let survey = service.survey_city("Atlantis").await.unwrap();
        assert!(survey.results.is_empty());
        assert_eq!(survey.chart_data, ChartData::default());

        let snapshot = service.city_snapshot("Atlantis").await.unwrap();
        assert!(snapshot.data.is_empty());
    }

    #[tokio::test]
    async fn snapshot_defaults_unsampled_attractions_to_zero() {
        let (_dir, service) = service(ScriptedSource::new(0), SamplingErrorPolicy::Zero);
        let observatory = SubjectKey::attraction("Los Angeles", "Griffith Observatory");
        let ts = NaiveDate::from_ymd_opt(2024, 7, 4)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap();
        service
            .database()
            .append_reading(&NewReading::new(observatory, ts, 35))
            .await
            .unwrap();

        let snapshot = service.city_snapshot("Los Angeles").await.unwrap();
        assert_eq!(snapshot.data.len(), 3);
        assert_eq!(snapshot.data[0].count, 35);
        assert_eq!(snapshot.data[0].level_text, "Slightly crowded");
        assert_eq!(snapshot.data[1].count, 0);
        assert_eq!(snapshot.data[1].level_class, "low");
    }

    #[tokio::test]
    async fn history_uses_demo_json_shape() {
        let (_dir, service) = service(ScriptedSource::new(0), SamplingErrorPolicy::Zero);
        let met = SubjectKey::attraction("New York", "The Met");
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        for (second, count) in [(0, 4), (5, 9)] {
            service
                .database()
                .append_reading(&NewReading::new(
                    met.clone(),
                    day.and_hms_opt(9, 0, second).unwrap(),
                    count,
                ))
                .await
                .unwrap();
        }

        let history = service
            .attraction_history("New York", "The Met", HISTORY_LIMIT)
            .await
            .unwrap();
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "attraction": "The Met",
                "data": [
                    {"datetime": "2024-01-02 09:00:00", "people_count": 4},
                    {"datetime": "2024-01-02 09:00:05", "people_count": 9}
                ]
            })
        );
    }
}
