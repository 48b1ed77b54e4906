use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    classifier::CrowdThresholds,
    models::{Subject, SubjectKey},
    sampling::SamplingErrorPolicy,
};

const ENV_DB_PATH: &str = "CROWDLOG_DB_PATH";
const ENV_DETECTOR_URL: &str = "CROWDLOG_DETECTOR_URL";
/// A century of history.
const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttractionConfig {
    pub name: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CityConfig {
    pub name: String,
    #[serde(default)]
    pub attractions: Vec<AttractionConfig>,
}

/// A single anonymous camera stream, logged without an attraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamConfig {
    pub name: String,
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SamplerMode {
    /// Uniform random count in `[syntheticMin, syntheticMax]`.
    Synthetic,
    /// Fabricated detector payloads, 0 to 5 people each.
    Simulated,
    /// HTTP detector endpoint.
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplerConfig {
    pub mode: SamplerMode,
    pub synthetic_min: u32,
    pub synthetic_max: u32,
    pub endpoint: Option<String>,
    /// Detector class id that counts as a person.
    pub target_class: i64,
    pub request_timeout_secs: u64,
    pub on_error: SamplingErrorPolicy,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            mode: SamplerMode::Synthetic,
            synthetic_min: 0,
            synthetic_max: 100,
            endpoint: None,
            target_class: 0,
            request_timeout_secs: 10,
            on_error: SamplingErrorPolicy::Zero,
        }
    }
}

impl SamplerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerConfig {
    pub interval_secs: u64,
    /// Upper bound on a single pass over every subject.
    pub pass_timeout_secs: u64,
    /// Readings older than this are pruned after each pass. Unset keeps everything.
    pub retention_days: Option<u32>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            pass_timeout_secs: 60,
            retention_days: None,
        }
    }
}

impl RunnerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub cities: Vec<CityConfig>,
    pub streams: Vec<StreamConfig>,
    pub thresholds: CrowdThresholds,
    pub sampler: SamplerConfig,
    pub runner: RunnerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("people_guide.sqlite3"),
            cities: default_cities(),
            streams: Vec::new(),
            thresholds: CrowdThresholds::default(),
            sampler: SamplerConfig::default(),
            runner: RunnerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads `path` if it exists, otherwise starts from the built-in cities.
    /// Environment overrides are applied before validation.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        } else {
            info!("No config at {}, using built-in defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(db_path) = env_value(ENV_DB_PATH) {
            info!("{ENV_DB_PATH} set, database at {db_path}");
            self.database_path = PathBuf::from(db_path);
        }
        if let Some(url) = env_value(ENV_DETECTOR_URL) {
            info!("{ENV_DETECTOR_URL} set, switching sampler to live mode");
            self.sampler.endpoint = Some(url);
            self.sampler.mode = SamplerMode::Live;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;

        if self.sampler.synthetic_min > self.sampler.synthetic_max {
            bail!(
                "syntheticMin ({}) exceeds syntheticMax ({})",
                self.sampler.synthetic_min,
                self.sampler.synthetic_max
            );
        }
        if self.runner.interval_secs == 0 {
            bail!("runner intervalSecs must be greater than zero");
        }
        if self.sampler.request_timeout_secs == 0 {
            bail!("sampler requestTimeoutSecs must be greater than zero");
        }
        if self.runner.pass_timeout_secs == 0 {
            bail!("runner passTimeoutSecs must be greater than zero");
        }
        match self.runner.retention_days {
            Some(0) => {
                bail!("runner retentionDays must be greater than zero; omit it to keep everything")
            }
            Some(days) if days > MAX_RETENTION_DAYS => {
                bail!("runner retentionDays ({days}) exceeds {MAX_RETENTION_DAYS}")
            }
            _ => {}
        }

        if self.sampler.mode == SamplerMode::Live && non_empty(&self.sampler.endpoint).is_none() {
            if let Some(subject) = self.subjects().into_iter().find(|s| s.api_url.is_none()) {
                bail!("live sampling needs an endpoint, but {} has no apiUrl", subject.key);
            }
        }

        Ok(())
    }

    /// Every tracked subject, cities first in declaration order, then streams.
    pub fn subjects(&self) -> Vec<Subject> {
        let attractions = self
            .cities
            .iter()
            .flat_map(|city| city.attractions.iter().map(move |a| attraction_subject(city, a)));

        let streams = self.streams.iter().map(|stream| Subject {
            api_url: non_empty(&stream.api_url),
            ..Subject::new(SubjectKey::stream(stream.name.clone()))
        });

        attractions.chain(streams).collect()
    }

    /// Attractions of one city. Unknown cities yield an empty list.
    pub fn attractions_for(&self, city: &str) -> Vec<Subject> {
        self.cities
            .iter()
            .find(|c| c.name == city)
            .map(|c| c.attractions.iter().map(|a| attraction_subject(c, a)).collect())
            .unwrap_or_default()
    }

    pub fn city_names(&self) -> Vec<String> {
        self.cities.iter().map(|c| c.name.clone()).collect()
    }
}

fn attraction_subject(city: &CityConfig, attraction: &AttractionConfig) -> Subject {
    Subject {
        key: SubjectKey::attraction(city.name.clone(), attraction.name.clone()),
        location: attraction.lat.zip(attraction.lng),
        image_ref: non_empty(&attraction.image),
        api_url: non_empty(&attraction.api_url),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn attraction(name: &str, lat: f64, lng: f64, image: &str) -> AttractionConfig {
    AttractionConfig {
        name: name.to_string(),
        lat: Some(lat),
        lng: Some(lng),
        api_url: None,
        image: Some(image.to_string()),
    }
}

fn city(name: &str, attractions: Vec<AttractionConfig>) -> CityConfig {
    CityConfig {
        name: name.to_string(),
        attractions,
    }
}

fn default_cities() -> Vec<CityConfig> {
    vec![
        city(
            "Los Angeles",
            vec![
                attraction("Griffith Observatory", 34.1184, -118.3004, "https://griffithobservatory.org/wp-content/uploads/2021/03/cameron-venti-c5GkEd-j5vI-unsplash_noCautionTape.jpg"),
                attraction("Santa Monica Pier", 34.0092, -118.4973, "https://cf.bstatic.com/xdata/images/hotel/max1024x768/566352260.jpg"),
                attraction("The Getty", 34.0780, -118.4741, "https://drupal-prod.visitcalifornia.com/sites/default/files/styles/fluid_1920/public/vc_spotlightthegettycenter_hero_st_ed_233927197_1280x640.jpg.webp"),
            ],
        ),
        city(
            "New York",
            vec![
                attraction("Central Park", 40.7851, -73.9683, "https://upload.wikimedia.org/wikipedia/commons/thumb/f/f1/Global_Citizen_Festival_Central_Park_New_York_City_from_NYonAir_%2815351915006%29.jpg/300px-Global_Citizen_Festival_Central_Park_New_York_City_from_NYonAir_%2815351915006%29.jpg"),
                attraction("Times Square", 40.7580, -73.9855, "https://www.theknickerbocker.com/content/uploads/2024/02/knb_nyc_landmarks_times_square_1138719689.webp"),
                attraction("The Met", 40.7794, -73.9632, "https://cdn.sanity.io/images/cctd4ker/production/df2942014531e122504b075c1fe6aa6f3f8a3ee5-5120x2880.jpg"),
            ],
        ),
        city(
            "Tokyo",
            vec![
                attraction("Shibuya Crossing", 35.6681, 139.7314, "https://media.timeout.com/images/105946468/image.jpg"),
                attraction("Senso-ji", 35.7149, 139.7966, "https://encrypted-tbn0.gstatic.com/images?q=tbn:ANd9GcStuk4v4XbgfT9f6EwaGeLueL779qdpDTRHPg&s"),
                attraction("Ghibli Museum", 35.6812, 139.7671, "https://media.cntraveler.com/photos/5c866698ff5475304621749f/16:9/w_2560,c_limit/Ghibli%20Museum_R061NH.jpg"),
            ],
        ),
        city(
            "Istanbul",
            vec![
                attraction("Blue Mosque", 41.0082, 28.9784, "https://theistanbulinsider.com/wp-content/uploads/2020/03/blue-mosque-aerial.jpg"),
                attraction("Hagia Sophia", 41.0082, 28.9784, "https://cdn-imgix.headout.com/media/images/b6b2e10d9b209e2c526c2568780379a3-hagia.jpg"),
                attraction("Grand Bazaar", 41.0082, 28.9784, "https://cms.througheternity.com/upload/CONF83/20230906/lamps.jpg"),
            ],
        ),
    ]
}
