use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use thiserror::Error;

/// Postgres `log_line_prefix = '%m ...'` style: `2024-01-15 10:30:00.123 UTC`
static POSTGRES_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)?)",
        r"(?: ([A-Za-z]{2,5}|[+-]\d{2}(?::?\d{2})?))?",
    ))
    .expect("postgres timestamp regex is valid")
});

const POSTGRES_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Failure to extract a timestamp from a line (recoverable, the line is skipped)
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("no timestamp at start of line")]
    Missing,

    #[error("invalid timestamp '{0}'")]
    Invalid(String),

    #[error("local time '{0}' does not exist (daylight saving gap)")]
    Nonexistent(String),
}

/// Invalid log format in channel configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("unknown log format '{0}' (expected postgres, mysql, rfc3339 or custom)")]
    Unknown(String),

    #[error("log format 'custom' requires a timestamp_format")]
    MissingCustomFormat,
}

/// How a channel's log lines carry their timestamp
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// `YYYY-MM-DD HH:MM:SS[.fff] [TZ]` prefix; numeric offsets and UTC/GMT are honored,
    /// other zone abbreviations fall back to local time
    Postgres,
    /// MySQL general query log, RFC 3339 first field
    Mysql,
    /// Any RFC 3339 timestamp at the start of the line
    Rfc3339,
    /// chrono strftime format parsed from the start of the line, local time
    Custom(String),
}

impl LogFormat {
    /// Build a format from its configuration name
    ///
    /// `custom` needs a strftime format, other formats ignore it.
    pub fn from_config(name: &str, custom: Option<&str>) -> Result<Self, FormatError> {
        match (name.parse::<Self>()?, custom) {
            (Self::Custom(_), Some(fmt)) if !fmt.is_empty() => Ok(Self::Custom(fmt.to_string())),
            (Self::Custom(_), _) => Err(FormatError::MissingCustomFormat),
            (format, _) => Ok(format),
        }
    }

    /// Extract and parse the leading timestamp of a log line
    pub fn timestamp(&self, line: &str) -> Result<DateTime<Utc>, TimestampError> {
        match self {
            Self::Postgres => Self::postgres_timestamp(line),
            Self::Mysql | Self::Rfc3339 => Self::rfc3339_timestamp(line),
            Self::Custom(fmt) => {
                let (naive, _) = NaiveDateTime::parse_and_remainder(line, fmt)
                    .map_err(|_| TimestampError::Missing)?;
                Self::from_local(naive, line)
            }
        }
    }

    fn postgres_timestamp(line: &str) -> Result<DateTime<Utc>, TimestampError> {
        let caps = POSTGRES_TIMESTAMP
            .captures(line)
            .ok_or(TimestampError::Missing)?;
        let raw = &caps[1];
        let naive = NaiveDateTime::parse_from_str(raw, POSTGRES_FORMAT)
            .map_err(|_| TimestampError::Invalid(raw.to_string()))?;

        match caps.get(2).map(|m| m.as_str()) {
            Some("UTC") | Some("GMT") => Ok(naive.and_utc()),
            Some(zone) if zone.starts_with(['+', '-']) => {
                let offset =
                    parse_offset(zone).ok_or_else(|| TimestampError::Invalid(zone.to_string()))?;
                Ok((naive - offset).and_utc())
            }
            _ => Self::from_local(naive, raw),
        }
    }

    fn rfc3339_timestamp(line: &str) -> Result<DateTime<Utc>, TimestampError> {
        let raw = line
            .split_whitespace()
            .next()
            .ok_or(TimestampError::Missing)?;
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| TimestampError::Invalid(raw.to_string()))
    }

    fn from_local(naive: NaiveDateTime, raw: &str) -> Result<DateTime<Utc>, TimestampError> {
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|ts| ts.with_timezone(&Utc))
            .ok_or_else(|| TimestampError::Nonexistent(raw.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Rfc3339 => "rfc3339",
            Self::Custom(_) => "custom",
        }
    }
}

/// Postgres numeric zone: `+HH`, `-HH`, `+HHMM` or `+HH:MM`
fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let (sign, digits) = zone.split_at(1);
    let digits = digits.replace(':', "");
    let hours: i32 = digits.get(..2)?.parse().ok()?;
    let minutes: i32 = match digits.get(2..) {
        Some("") | None => 0,
        Some(m) => m.parse().ok()?,
    };
    let seconds = hours * 3600 + minutes * 60;
    FixedOffset::east_opt(if sign == "-" { -seconds } else { seconds })
}

impl FromStr for LogFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "rfc3339" | "iso8601" => Ok(Self::Rfc3339),
            "custom" => Ok(Self::Custom(String::new())),
            _ => Err(FormatError::Unknown(s.to_string())),
        }
    }
}
