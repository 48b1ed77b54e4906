use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{format_timestamp, join_timestamp, split_timestamp, to_i64, to_u32},
    models::{NewReading, Reading},
};
use crate::models::SubjectKey;

const READING_COLUMNS: &str = "id, city, attraction, date, time, people_count";

fn row_to_reading(row: &Row) -> Result<Reading> {
    let date: String = row.get("date")?;
    let time: String = row.get("time")?;
    let count: i64 = row.get("people_count")?;

    Ok(Reading {
        id: row.get("id")?,
        subject: SubjectKey {
            city: row.get("city")?,
            attraction: row.get("attraction")?,
        },
        timestamp: join_timestamp(&date, &time)?,
        count: to_u32(count, "people_count")?,
    })
}

fn insert(conn: &Connection, reading: &NewReading) -> Result<i64> {
    let (date, time) = split_timestamp(&reading.timestamp);
    conn.execute(
        "INSERT INTO people_log (city, attraction, date, time, people_count)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            reading.subject.city,
            reading.subject.attraction,
            date,
            time,
            i64::from(reading.count),
        ],
    )
    .with_context(|| format!("failed to append reading for {}", reading.subject))?;
    Ok(conn.last_insert_rowid())
}

impl Database {
    /// Appends one reading and returns its id.
    pub async fn append_reading(&self, reading: &NewReading) -> Result<i64> {
        let record = reading.clone();
        self.execute(move |conn| insert(conn, &record)).await
    }

    /// Appends a whole pass in one transaction; ids come back in input order.
    pub async fn append_readings(&self, readings: Vec<NewReading>) -> Result<Vec<i64>> {
        if readings.is_empty() {
            return Ok(Vec::new());
        }

        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open append transaction")?;
            let mut ids = Vec::with_capacity(readings.len());
            for reading in &readings {
                ids.push(insert(&tx, reading)?);
            }
            tx.commit().context("failed to commit readings")?;
            Ok(ids)
        })
        .await
    }

    /// Up to `limit` most recent readings for `subject`, oldest first.
    pub async fn recent_for(&self, subject: &SubjectKey, limit: usize) -> Result<Vec<Reading>> {
        let subject = subject.clone();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS}
                 FROM people_log
                 WHERE city = ?1 AND attraction IS ?2
                 ORDER BY id DESC
                 LIMIT ?3"
            ))?;

            let mut rows = stmt.query(params![
                subject.city,
                subject.attraction,
                to_i64(limit as u64)?
            ])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(row_to_reading(row)?);
            }

            readings.reverse();
            Ok(readings)
        })
        .await
    }

    pub async fn latest_for(&self, subject: &SubjectKey) -> Result<Option<Reading>> {
        let subject = subject.clone();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS}
                 FROM people_log
                 WHERE city = ?1 AND attraction IS ?2
                 ORDER BY id DESC
                 LIMIT 1"
            ))?;

            let mut rows = stmt.query(params![subject.city, subject.attraction])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_reading(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Newest-first dump across every subject.
    pub async fn all_recent(&self, limit: usize) -> Result<Vec<Reading>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS}
                 FROM people_log
                 ORDER BY id DESC
                 LIMIT ?1"
            ))?;

            let mut rows = stmt.query(params![to_i64(limit as u64)?])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(row_to_reading(row)?);
            }
            Ok(readings)
        })
        .await
    }

    pub async fn count_for(&self, subject: &SubjectKey) -> Result<u64> {
        let subject = subject.clone();
        self.execute(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM people_log WHERE city = ?1 AND attraction IS ?2",
                params![subject.city, subject.attraction],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    /// Deletes readings strictly older than `cutoff`; returns how many went.
    pub async fn prune_before(&self, cutoff: NaiveDateTime) -> Result<usize> {
        let cutoff = format_timestamp(&cutoff);
        self.execute(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM people_log WHERE (date || ' ' || time) < ?1",
                    params![cutoff],
                )
                .context("failed to prune readings")?;
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use tempfile::{tempdir, TempDir};

    fn open() -> (TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("people.sqlite3")).unwrap();
        (dir, db)
    }

    fn at(hour: u32, min: u32, sec: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(hour, min, sec)
            .unwrap()
    }

    #[tokio::test]
    async fn latest_reflects_the_last_append() {
        let (_dir, db) = open();
        let pier = SubjectKey::attraction("Los Angeles", "Santa Monica Pier");

        assert!(db.latest_for(&pier).await.unwrap().is_none());

        db.append_reading(&NewReading::new(pier.clone(), at(9, 0, 0), 12))
            .await
            .unwrap();
        db.append_reading(&NewReading::new(pier.clone(), at(9, 0, 5), 48))
            .await
            .unwrap();

        let latest = db.latest_for(&pier).await.unwrap().unwrap();
        assert_eq!(latest.timestamp, at(9, 0, 5));
        assert_eq!(latest.count, 48);
        assert_eq!(latest.subject, pier);
    }

    #[tokio::test]
    async fn recent_for_is_oldest_first_and_bounded() {
        let (_dir, db) = open();
        let getty = SubjectKey::attraction("Los Angeles", "The Getty");
        let other = SubjectKey::attraction("Tokyo", "Senso-ji");

        for i in 0..8u32 {
            db.append_reading(&NewReading::new(getty.clone(), at(10, 0, i * 5), i))
                .await
                .unwrap();
            db.append_reading(&NewReading::new(other.clone(), at(10, 0, i * 5), 99))
                .await
                .unwrap();
        }

        let recent = db.recent_for(&getty, 5).await.unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(
            recent.iter().map(|r| r.count).collect::<Vec<_>>(),
            vec![3, 4, 5, 6, 7]
        );
        assert!(recent.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(recent.iter().all(|r| r.subject == getty));

        let everything = db.recent_for(&getty, 100).await.unwrap();
        assert_eq!(everything.len(), 8);
        assert_eq!(db.count_for(&getty).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn unknown_subject_reads_empty() {
        let (_dir, db) = open();
        let nowhere = SubjectKey::attraction("Atlantis", "Palace");
        assert!(db.recent_for(&nowhere, 30).await.unwrap().is_empty());
        assert!(db.latest_for(&nowhere).await.unwrap().is_none());
        assert_eq!(db.count_for(&nowhere).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stream_rows_do_not_mix_with_attractions() {
        let (_dir, db) = open();
        let stream = SubjectKey::stream("Tokyo");
        let attraction = SubjectKey::attraction("Tokyo", "Ghibli Museum");

        db.append_reading(&NewReading::new(stream.clone(), at(8, 0, 0), 3))
            .await
            .unwrap();
        db.append_reading(&NewReading::new(attraction.clone(), at(8, 0, 0), 70))
            .await
            .unwrap();

        let latest = db.latest_for(&stream).await.unwrap().unwrap();
        assert_eq!(latest.count, 3);
        assert_eq!(latest.subject.attraction, None);
        assert_eq!(db.count_for(&attraction).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn all_recent_is_newest_first_across_subjects() {
        let (_dir, db) = open();
        let batch = vec![
            NewReading::new(SubjectKey::attraction("New York", "Central Park"), at(12, 0, 0), 5),
            NewReading::new(SubjectKey::attraction("New York", "Times Square"), at(12, 0, 0), 80),
            NewReading::new(SubjectKey::stream("lobby"), at(12, 0, 5), 2),
        ];
        let ids = db.append_readings(batch).await.unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        let dump = db.all_recent(2).await.unwrap();
        assert_eq!(dump.len(), 2);
        assert_eq!(dump[0].subject, SubjectKey::stream("lobby"));
        assert_eq!(dump[1].count, 80);
    }

    #[tokio::test]
    async fn prune_only_drops_rows_older_than_cutoff() {
        let (_dir, db) = open();
        let met = SubjectKey::attraction("New York", "The Met");
        let old = at(6, 0, 0) - Duration::days(10);

        db.append_reading(&NewReading::new(met.clone(), old, 1))
            .await
            .unwrap();
        db.append_reading(&NewReading::new(met.clone(), at(6, 0, 0), 2))
            .await
            .unwrap();

        let removed = db.prune_before(at(0, 0, 0)).await.unwrap();
        assert_eq!(removed, 1);

        let left = db.recent_for(&met, 10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].count, 2);
    }

    #[tokio::test]
    async fn clones_share_one_log() {
        let (_dir, db) = open();
        let writer = db.clone();
        let key = SubjectKey::attraction("Istanbul", "Grand Bazaar");

        let handle = tokio::spawn({
            let key = key.clone();
            async move {
                for i in 0..10 {
                    writer
                        .append_reading(&NewReading::new(key.clone(), at(15, 0, i), i))
                        .await
                        .unwrap();
                }
            }
        });
        handle.await.unwrap();

        assert_eq!(db.count_for(&key).await.unwrap(), 10);
    }
}
