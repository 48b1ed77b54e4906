use chrono::{NaiveDate, NaiveDateTime};
use crowdlog_lib::{
    runner::run_pass, CountSource, CrowdLevel, CrowdThresholds, Database, NewReading, Sampler,
    SamplingError, SamplingErrorPolicy, Subject, SubjectKey,
};
use tempfile::tempdir;

fn at(minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 8, 15)
        .unwrap()
        .and_hms_opt(14, minute, 0)
        .unwrap()
}

#[tokio::test]
async fn readings_come_back_in_order_and_classify() {
    let dir = tempdir().unwrap();
    let db = Database::new(dir.path().join("people_guide.sqlite3")).unwrap();
    let pier = SubjectKey::attraction("Los Angeles", "Santa Monica Pier");

    for (minute, count) in [(1, 15), (2, 22), (3, 55)] {
        db.append_reading(&NewReading::new(pier.clone(), at(minute), count))
            .await
            .unwrap();
    }

    let recent = db.recent_for(&pier, 10).await.unwrap();
    let pairs: Vec<_> = recent.iter().map(|r| (r.timestamp, r.count)).collect();
    assert_eq!(pairs, vec![(at(1), 15), (at(2), 22), (at(3), 55)]);

    let thresholds = CrowdThresholds::default();
    let levels: Vec<_> = recent.iter().map(|r| thresholds.level(r.count)).collect();
    assert_eq!(levels, vec![CrowdLevel::Low, CrowdLevel::Medium, CrowdLevel::High]);

    let latest = db.latest_for(&pier).await.unwrap().unwrap();
    assert_eq!((latest.timestamp, latest.count), (at(3), 55));
}

#[tokio::test]
async fn thresholds_reclassify_history_on_read() {
    let dir = tempdir().unwrap();
    let db = Database::new(dir.path().join("people_guide.sqlite3")).unwrap();
    let lobby = SubjectKey::stream("lobby");
    db.append_reading(&NewReading::new(lobby.clone(), at(0), 4))
        .await
        .unwrap();

    let stored = db.latest_for(&lobby).await.unwrap().unwrap();
    assert_eq!(CrowdThresholds::default().level(stored.count), CrowdLevel::Low);

    let tight = CrowdThresholds {
        medium_from: 2,
        high_from: 4,
    };
    assert_eq!(tight.level(stored.count), CrowdLevel::High);
}

struct SecondCameraDown;

impl CountSource for SecondCameraDown {
    async fn fetch(&self, subject: &Subject) -> Result<u32, SamplingError> {
        match subject.name() {
            "cam-2" => Err(SamplingError::Source("cam-2 unreachable".into())),
            "cam-1" => Ok(7),
            _ => Ok(3),
        }
    }
}

#[tokio::test]
async fn pass_survives_one_broken_subject() {
    let dir = tempdir().unwrap();
    let db = Database::new(dir.path().join("people_counter.sqlite3")).unwrap();
    let subjects: Vec<Subject> = ["cam-1", "cam-2", "cam-3"]
        .into_iter()
        .map(|name| Subject::new(SubjectKey::stream(name)))
        .collect();
    let sampler = Sampler::new(SecondCameraDown, SamplingErrorPolicy::Propagate);

    let report = run_pass(&subjects, &sampler, &db, None).await.unwrap();
    assert_eq!(report.sampled, 2);
    assert_eq!(report.failed, 1);

    let dump = db.all_recent(10).await.unwrap();
    let mut logged: Vec<_> = dump.iter().map(|r| (r.subject.city.clone(), r.count)).collect();
    logged.sort();
    assert_eq!(logged, vec![("cam-1".to_string(), 7), ("cam-3".to_string(), 3)]);
}
