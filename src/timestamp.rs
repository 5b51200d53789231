//! INDI wire timestamps: `YYYY-MM-DDTHH:MM:SS[.fraction]`.
//!
//! The fractional-seconds precision is not fixed by the protocol, so this
//! type preserves whatever decimal string was present on decode rather
//! than reformatting it — a server that sends `.5` gets `.5` back, not
//! `.500000000`.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A parsed INDI timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct INDITimestamp {
    datetime: DateTime<Utc>,
    decimal: Option<String>,
}

impl INDITimestamp {
    /// The current instant, with second-level precision (no fraction).
    pub fn now() -> Self {
        Self::from_datetime(Utc::now(), None)
    }

    /// Build from a `DateTime<Utc>`, optionally stamping `precision` decimal digits.
    pub fn from_datetime(datetime: DateTime<Utc>, precision: Option<u8>) -> Self {
        let decimal = precision.map(|p| {
            let nanos = datetime.timestamp_subsec_nanos() as f64;
            let subsec = (nanos / 1_000_000_000.0 * 10f64.powi(p as i32)).round() as u32;
            format!("{:0>width$}", subsec, width = p as usize)
        });
        Self { datetime, decimal }
    }

    /// The underlying instant.
    pub fn datetime(&self) -> DateTime<Utc> {
        self.datetime
    }
}

impl FromStr for INDITimestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if !s.chars().all(|c| c.is_ascii_digit() || ".:-T".contains(c)) {
            return Err(Error::Property(
                "invalid characters in timestamp".to_string(),
            ));
        }

        let (whole, fraction) = match s.split_once('.') {
            Some((w, f)) => {
                if f.is_empty() || !f.chars().all(|c| c.is_ascii_digit()) {
                    return Err(Error::Property(
                        "invalid decimal part in timestamp".to_string(),
                    ));
                }
                (w, Some(f.to_string()))
            }
            None => (s, None),
        };

        let naive = NaiveDateTime::parse_from_str(whole, "%Y-%m-%dT%H:%M:%S")
            .map_err(|e| Error::Property(format!("invalid timestamp format: {}", e)))?;
        let datetime = DateTime::from_naive_utc_and_offset(naive, Utc);

        Ok(Self {
            datetime,
            decimal: fraction,
        })
    }
}

impl fmt::Display for INDITimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.datetime.format("%Y-%m-%dT%H:%M:%S");
        match &self.decimal {
            Some(decimal) => write!(f, "{}.{}", base, decimal),
            None => write!(f, "{}", base),
        }
    }
}

impl Serialize for INDITimestamp {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for INDITimestamp {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_requested_precision() {
        let dt = DateTime::parse_from_rfc3339("2024-02-21T19:30:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);

        let ts = INDITimestamp::from_datetime(dt, Some(1));
        assert_eq!(ts.to_string(), "2024-02-21T19:30:00.1");

        let ts = INDITimestamp::from_datetime(dt, Some(3));
        assert_eq!(ts.to_string(), "2024-02-21T19:30:00.123");
    }

    #[test]
    fn round_trips_decimal_string_verbatim() {
        for ts_str in ["2024-02-21T19:30:00", "2024-02-21T19:30:00.5", "2024-02-21T19:30:00.500"] {
            let ts = INDITimestamp::from_str(ts_str).unwrap();
            assert_eq!(ts.to_string(), ts_str);
        }
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(INDITimestamp::from_str("invalid").is_err());
        assert!(INDITimestamp::from_str("2024-02-21 19:30:00").is_err());
        assert!(INDITimestamp::from_str("2024-02-21T19:30:00.").is_err());
        assert!(INDITimestamp::from_str("2024-02-21T19:30:00.abc").is_err());
    }
}
