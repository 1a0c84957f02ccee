use chrono::{DateTime, Local, SecondsFormat, TimeZone};
use serde::Serialize;

use super::NtpReading;

/// One answer from a time server, as returned to MCP clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSample {
    pub server: String,
    /// Server transmit time, Unix seconds.
    pub ntp_timestamp: f64,
    pub localized_ntp_time: String,
    pub local_system_time: String,
    /// Positive when the server is ahead of the local clock.
    pub offset_seconds: f64,
    pub round_trip_delay_seconds: f64,
}

impl TimeSample {
    /// Build a sample from a reading and the wall-clock time captured on receipt.
    pub fn from_reading(server: impl Into<String>, reading: &NtpReading, now: DateTime<Local>) -> Self {
        let now_unix = now.timestamp_micros() as f64 / 1_000_000.0;

        Self {
            server: server.into(),
            ntp_timestamp: reading.transmit_time,
            localized_ntp_time: localize(reading.transmit_time),
            local_system_time: now.to_rfc3339_opts(SecondsFormat::Micros, false),
            offset_seconds: reading.transmit_time - now_unix,
            round_trip_delay_seconds: reading.round_trip_delay,
        }
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn localize(unix: f64) -> String {
    let micros = (unix * 1_000_000.0).round() as i64;
    match Local.timestamp_micros(micros).single() {
        Some(t) => t.to_rfc3339_opts(SecondsFormat::Micros, false),
        None => unix.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(transmit_time: f64) -> NtpReading {
        NtpReading {
            transmit_time,
            round_trip_delay: 0.012,
        }
    }

    #[test]
    fn offset_is_server_minus_local() {
        let now = Local.timestamp_opt(1_700_000_000, 0).unwrap();
        let sample = TimeSample::from_reading("pool.ntp.org", &reading(1_700_000_000.75), now);

        assert_eq!(sample.server, "pool.ntp.org");
        assert!((sample.offset_seconds - 0.75).abs() < 1e-6);
        assert!((sample.round_trip_delay_seconds - 0.012).abs() < 1e-9);
    }

    #[test]
    fn timestamps_are_iso8601() {
        let now = Local.timestamp_opt(1_700_000_000, 0).unwrap();
        let sample = TimeSample::from_reading("x", &reading(1_700_000_001.5), now);

        let ntp = DateTime::parse_from_rfc3339(&sample.localized_ntp_time).unwrap();
        assert_eq!(ntp.timestamp(), 1_700_000_001);
        assert_eq!(ntp.timestamp_subsec_micros(), 500_000);
        assert!(DateTime::parse_from_rfc3339(&sample.local_system_time).is_ok());
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let now = Local.timestamp_opt(1_700_000_000, 0).unwrap();
        let sample = TimeSample::from_reading("x", &reading(1_700_000_000.0), now);
        let value = serde_json::to_value(&sample).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();

        for key in [
            "server",
            "ntpTimestamp",
            "localizedNtpTime",
            "localSystemTime",
            "offsetSeconds",
            "roundTripDelaySeconds",
        ] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(keys.len(), 6);
    }
}
