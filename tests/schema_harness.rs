use chrono::{Local, TimeZone};

use mcp_ntp_server::ntp::{NtpReading, TimeSample};
use mcp_ntp_server::schema::{validate_json, SchemaValidationError};

const TIME_SAMPLE_SCHEMA: &str = r#"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "type": "object",
  "required": [
    "server",
    "ntpTimestamp",
    "localizedNtpTime",
    "localSystemTime",
    "offsetSeconds",
    "roundTripDelaySeconds"
  ],
  "additionalProperties": false,
  "properties": {
    "server": { "type": "string", "minLength": 1 },
    "ntpTimestamp": { "type": "number" },
    "localizedNtpTime": { "type": "string" },
    "localSystemTime": { "type": "string" },
    "offsetSeconds": { "type": "number" },
    "roundTripDelaySeconds": { "type": "number", "minimum": 0 }
  }
}"#;

#[test]
fn time_sample_satisfies_schema() {
    let reading = NtpReading {
        transmit_time: 1_700_000_000.5,
        round_trip_delay: 0.031,
    };
    let now = Local.timestamp_opt(1_700_000_000, 0).single().unwrap();
    let sample = TimeSample::from_reading("pool.ntp.org", &reading, now);

    let instance = sample.to_pretty_json().unwrap();
    validate_json(TIME_SAMPLE_SCHEMA, &instance).expect("schema validation failed");
}

#[test]
fn extra_member_is_reported() {
    let instance = r#"{
      "server": "pool.ntp.org",
      "ntpTimestamp": 1700000000.5,
      "localizedNtpTime": "2023-11-14T22:13:20.500000+00:00",
      "localSystemTime": "2023-11-14T22:13:20.000000+00:00",
      "offsetSeconds": 0.5,
      "roundTripDelaySeconds": 0.031,
      "stratum": 2
    }"#;

    let err = validate_json(TIME_SAMPLE_SCHEMA, instance).unwrap_err();
    assert!(matches!(err, SchemaValidationError::ValidationFailed(_)), "{err}");
}

#[test]
fn unparsable_instance_is_reported() {
    let err = validate_json(TIME_SAMPLE_SCHEMA, "{").unwrap_err();
    assert!(matches!(err, SchemaValidationError::SchemaParse(_)), "{err}");
}
