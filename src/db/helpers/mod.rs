use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDateTime, SubsecRound};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

/// Local wall-clock time at second resolution, the precision the log stores.
pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

pub fn split_timestamp(timestamp: &NaiveDateTime) -> (String, String) {
    (
        timestamp.format(DATE_FORMAT).to_string(),
        timestamp.format(TIME_FORMAT).to_string(),
    )
}

pub fn join_timestamp(date: &str, time: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&format!("{date} {time}"), DATETIME_FORMAT)
        .with_context(|| format!("failed to parse timestamp '{date} {time}'"))
}

/// `date time` as stored, which also sorts chronologically as text.
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(DATETIME_FORMAT).to_string()
}
