//! Remote literal encoding for constants.
//!
//! Dates and timestamps are decomposed from PostgreSQL's internal encoding
//! (offsets from 2000-01-01) and wrapped in the remote engine's conversion
//! functions with an explicit `SYYYY` format, so the remote NLS settings
//! never influence how a literal is read back. In `SYYYY` there is no year
//! zero: ISO year 0 is written `-0001`, ISO year -1 is `-0002`, and so on.

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};

use crate::error::FdwError;
use crate::pushdown::expr::{Datum, Interval, Oid, pg_type};

/// `2000-01-01` counted from `0001-01-01` (day 1).
const POSTGRES_EPOCH_DAYS_FROM_CE: i32 = 730_120;

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_HOUR: i64 = 3_600 * MICROS_PER_SECOND;

pub const DATE_FORMAT: &str = "SYYYY-MM-DD";
pub const TIMESTAMP_FORMAT: &str = "SYYYY-MM-DD HH24:MI:SS.FF6";
pub const TIMESTAMPTZ_FORMAT: &str = "SYYYY-MM-DD HH24:MI:SS.FF6 TZH:TZM";

/// How a constant of a given type is written in remote SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralCategory {
    /// Output text emitted verbatim.
    Numeric,
    Date,
    Timestamp,
    TimestampTz,
    Interval,
    /// Output text single-quoted.
    String,
    /// Anything else; best-effort single-quoted output text.
    Other,
}

impl LiteralCategory {
    pub fn of_type(type_oid: Oid) -> Self {
        match type_oid {
            pg_type::INT2OID
            | pg_type::INT4OID
            | pg_type::INT8OID
            | pg_type::OIDOID
            | pg_type::FLOAT4OID
            | pg_type::FLOAT8OID
            | pg_type::NUMERICOID => LiteralCategory::Numeric,
            pg_type::DATEOID => LiteralCategory::Date,
            pg_type::TIMESTAMPOID => LiteralCategory::Timestamp,
            pg_type::TIMESTAMPTZOID => LiteralCategory::TimestampTz,
            pg_type::INTERVALOID => LiteralCategory::Interval,
            pg_type::TEXTOID
            | pg_type::VARCHAROID
            | pg_type::BPCHAROID
            | pg_type::CHAROID
            | pg_type::NAMEOID
            | pg_type::UUIDOID => LiteralCategory::String,
            _ => LiteralCategory::Other,
        }
    }
}

/// Reject the special values of the floating-point and `numeric` types.
///
/// The remote engine has no literal for them; written bare, `NaN` or
/// `Infinity` would be read as an identifier.
pub fn ensure_finite_number(value: &Datum) -> Result<(), FdwError> {
    let finite = match value {
        Datum::Float(f) => f.is_finite(),
        Datum::Float4(f) => f.is_finite(),
        Datum::Numeric(text) => !matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "nan" | "infinity" | "+infinity" | "-infinity" | "inf" | "+inf" | "-inf"
        ),
        _ => true,
    };
    if finite {
        Ok(())
    } else {
        Err(FdwError::UnrepresentableValue(format!(
            "special numeric value {value:?} cannot be sent to the remote server"
        )))
    }
}

/// Single-quote `value`, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `TO_DATE('YYYY-MM-DD', 'SYYYY-MM-DD')`
pub fn date_literal(days: i32) -> Result<String, FdwError> {
    if days == i32::MIN || days == i32::MAX {
        return Err(FdwError::UnrepresentableValue(
            "infinite date value cannot be sent to the remote server".into(),
        ));
    }
    let date = date_from_days(days)?;
    Ok(format!(
        "TO_DATE('{}', '{DATE_FORMAT}')",
        format_remote_date(&date)
    ))
}

/// `TO_TIMESTAMP('YYYY-MM-DD HH24:MI:SS.FF6', 'SYYYY-MM-DD HH24:MI:SS.FF6')`
pub fn timestamp_literal(micros: i64) -> Result<String, FdwError> {
    let ts = finite_timestamp(micros, "timestamp")?;
    Ok(format!(
        "TO_TIMESTAMP('{}', '{TIMESTAMP_FORMAT}')",
        format_remote_timestamp(&ts)
    ))
}

/// `TO_TIMESTAMP_TZ('YYYY-MM-DD HH24:MI:SS.FF6 +HH:MM', 'SYYYY-MM-DD HH24:MI:SS.FF6 TZH:TZM')`
///
/// The instant is shown in the session's zone, `utc_offset_secs` east of UTC.
pub fn timestamptz_literal(utc_micros: i64, utc_offset_secs: i32) -> Result<String, FdwError> {
    let utc = finite_timestamp(utc_micros, "timestamp with time zone")?;
    let local = utc
        .checked_add_signed(TimeDelta::seconds(i64::from(utc_offset_secs)))
        .ok_or_else(|| out_of_range("timestamp with time zone"))?;
    Ok(format!(
        "TO_TIMESTAMP_TZ('{} {}', '{TIMESTAMPTZ_FORMAT}')",
        format_remote_timestamp(&local),
        format_offset(utc_offset_secs),
    ))
}

/// Intervals have no single remote literal: PostgreSQL mixes months, days
/// and microseconds in one value while the remote engine splits them into
/// YEAR TO MONTH and DAY TO SECOND types.
pub fn interval_literal(_interval: &Interval) -> Result<String, FdwError> {
    Err(FdwError::UnrepresentableValue(
        "interval constants cannot be sent to the remote server".into(),
    ))
}

fn date_from_days(days: i32) -> Result<NaiveDate, FdwError> {
    days.checked_add(POSTGRES_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| out_of_range("date"))
}

fn postgres_epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_num_days_from_ce_opt(POSTGRES_EPOCH_DAYS_FROM_CE)?.and_hms_opt(0, 0, 0)
}

fn timestamp_from_micros(micros: i64) -> Option<NaiveDateTime> {
    postgres_epoch()?.checked_add_signed(TimeDelta::microseconds(micros))
}

fn finite_timestamp(micros: i64, type_name: &str) -> Result<NaiveDateTime, FdwError> {
    if micros == i64::MIN || micros == i64::MAX {
        return Err(FdwError::UnrepresentableValue(format!(
            "infinite {type_name} value cannot be sent to the remote server"
        )));
    }
    timestamp_from_micros(micros).ok_or_else(|| out_of_range(type_name))
}

fn out_of_range(type_name: &str) -> FdwError {
    FdwError::UnrepresentableValue(format!("{type_name} out of range"))
}

/// ISO year to `SYYYY` year.
fn remote_year(iso_year: i32) -> i32 {
    if iso_year <= 0 { iso_year - 1 } else { iso_year }
}

fn format_signed_year(year: i32) -> String {
    if year < 0 {
        format!("-{:04}", year.unsigned_abs())
    } else {
        format!("{year:04}")
    }
}

fn format_remote_date(date: &NaiveDate) -> String {
    format!(
        "{}-{:02}-{:02}",
        format_signed_year(remote_year(date.year())),
        date.month(),
        date.day()
    )
}

fn format_remote_timestamp(ts: &NaiveDateTime) -> String {
    format!(
        "{} {:02}:{:02}:{:02}.{:06}",
        format_remote_date(&ts.date()),
        ts.hour(),
        ts.minute(),
        ts.second(),
        ts.nanosecond() / 1_000
    )
}

fn format_offset(utc_offset_secs: i32) -> String {
    let sign = if utc_offset_secs < 0 { '-' } else { '+' };
    let abs = utc_offset_secs.unsigned_abs();
    format!("{sign}{:02}:{:02}", abs / 3_600, (abs % 3_600) / 60)
}

// ── Host-side output text (used by the default type output routine) ─────

/// `date_out` text: `2023-03-15`, `0044-03-15 BC`, `infinity`.
pub fn date_output(days: i32) -> String {
    match days {
        i32::MIN => "-infinity".to_string(),
        i32::MAX => "infinity".to_string(),
        _ => match date_from_days(days) {
            Ok(date) => format_host_date(&date),
            Err(_) => days.to_string(),
        },
    }
}

/// `timestamp_out` text: `2023-03-15 10:20:30.5`.
pub fn timestamp_output(micros: i64) -> String {
    match micros {
        i64::MIN => "-infinity".to_string(),
        i64::MAX => "infinity".to_string(),
        _ => match timestamp_from_micros(micros) {
            Some(ts) => format_host_timestamp(&ts),
            None => micros.to_string(),
        },
    }
}

/// `timestamptz_out` text: `2023-03-15 10:20:30+09`.
pub fn timestamptz_output(utc_micros: i64, utc_offset_secs: i32) -> String {
    match utc_micros {
        i64::MIN => "-infinity".to_string(),
        i64::MAX => "infinity".to_string(),
        _ => {
            let local = timestamp_from_micros(utc_micros).and_then(|ts| {
                ts.checked_add_signed(TimeDelta::seconds(i64::from(utc_offset_secs)))
            });
            match local {
                Some(ts) => {
                    let offset = format_offset(utc_offset_secs);
                    let offset = offset.strip_suffix(":00").unwrap_or(&offset);
                    format!("{}{offset}", format_host_timestamp(&ts))
                }
                None => utc_micros.to_string(),
            }
        }
    }
}

/// `interval_out` text in the `postgres` style: `1 year 2 mons 3 days 04:05:06`.
pub fn interval_output(interval: &Interval) -> String {
    fn unit(n: i32, singular: &str, plural: &str) -> String {
        format!("{n} {}", if n == 1 { singular } else { plural })
    }

    let mut parts = Vec::new();
    let years = interval.months / 12;
    let months = interval.months % 12;
    if years != 0 {
        parts.push(unit(years, "year", "years"));
    }
    if months != 0 {
        parts.push(unit(months, "mon", "mons"));
    }
    if interval.days != 0 {
        parts.push(unit(interval.days, "day", "days"));
    }
    if interval.micros != 0 || parts.is_empty() {
        let sign = if interval.micros < 0 { "-" } else { "" };
        let abs = interval.micros.unsigned_abs();
        let hours = abs / MICROS_PER_HOUR as u64;
        let minutes = (abs % MICROS_PER_HOUR as u64) / (60 * MICROS_PER_SECOND as u64);
        let seconds = (abs % (60 * MICROS_PER_SECOND as u64)) / MICROS_PER_SECOND as u64;
        let fraction = abs % MICROS_PER_SECOND as u64;
        let mut time = format!("{sign}{hours:02}:{minutes:02}:{seconds:02}");
        if fraction != 0 {
            time.push_str(format!(".{fraction:06}").trim_end_matches('0'));
        }
        parts.push(time);
    }
    parts.join(" ")
}

fn format_host_date(date: &NaiveDate) -> String {
    let year = date.year();
    if year <= 0 {
        format!("{:04}-{:02}-{:02} BC", 1 - year, date.month(), date.day())
    } else {
        format!("{year:04}-{:02}-{:02}", date.month(), date.day())
    }
}

fn format_host_timestamp(ts: &NaiveDateTime) -> String {
    let date = format_host_date(&ts.date());
    let (date, era) = match date.strip_suffix(" BC") {
        Some(d) => (d.to_string(), " BC"),
        None => (date, ""),
    };
    let mut time = format!("{:02}:{:02}:{:02}", ts.hour(), ts.minute(), ts.second());
    let micros = ts.nanosecond() / 1_000;
    if micros != 0 {
        time.push_str(format!(".{micros:06}").trim_end_matches('0'));
    }
    format!("{date} {time}{era}")
}
