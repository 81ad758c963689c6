use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::device::btle::RadioSettings;
use crate::device::constants::{CONNECT_DEADLINE, DISCOVERY_DEADLINE, SCAN_DURATION, WRITE_DEADLINE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub scan_duration_secs: u64,
    pub connect_timeout_ms: u64,
    pub discovery_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub write_with_response: bool,
}

impl Config {
    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }

    pub fn radio_settings(&self) -> RadioSettings {
        RadioSettings {
            connect_deadline: Duration::from_millis(self.connect_timeout_ms),
            discovery_deadline: Duration::from_millis(self.discovery_timeout_ms),
            write_deadline: Duration::from_millis(self.write_timeout_ms),
            write_with_response: self.write_with_response,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scan_duration_secs: SCAN_DURATION / 1000,
            connect_timeout_ms: CONNECT_DEADLINE,
            discovery_timeout_ms: DISCOVERY_DEADLINE,
            write_timeout_ms: WRITE_DEADLINE,
            write_with_response: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_radio_defaults() {
        let config = Config::default();
        assert_eq!(config.scan_duration(), Duration::from_secs(10));
        assert_eq!(config.radio_settings(), RadioSettings::default());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{"scanDurationSecs": 4, "writeWithResponse": false}"#).unwrap();
        assert_eq!(config.scan_duration_secs, 4);
        assert!(!config.write_with_response);
        assert_eq!(config.connect_timeout_ms, CONNECT_DEADLINE);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["scanDurationSecs"], 10);
        assert_eq!(json["discoveryTimeoutMs"], 15000);
    }
}
