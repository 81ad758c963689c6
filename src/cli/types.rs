use clap::Parser;
use log::LevelFilter;

use crate::config::types::Config;

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Stream heart rate readings from a Bluetooth LE heart rate sensor")]
pub struct Args {
    /// How long to scan for devices, in seconds
    #[arg(long)]
    pub scan_secs: Option<u64>,

    /// Connect to the device at this position in the scan results instead of asking
    #[arg(long)]
    pub device: Option<usize>,

    /// Configuration text to send as soon as the sensor is streaming
    #[arg(long)]
    pub send: Option<String>,

    /// Write the effective settings back to the config file
    #[arg(long)]
    pub save_config: bool,

    /// Log debug output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn apply(&self, config: &mut Config) {
        if let Some(scan_secs) = self.scan_secs {
            config.scan_duration_secs = scan_secs;
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.verbose { LevelFilter::Debug } else { LevelFilter::Info }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::try_parse_from(["ble-heartrate", "--scan-secs", "3", "--device", "1", "--send", "hello"]).unwrap();
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.scan_duration_secs, 3);
        assert_eq!(args.device, Some(1));
        assert_eq!(args.send.as_deref(), Some("hello"));
        assert_eq!(args.log_level(), LevelFilter::Info);
    }

    #[test]
    fn no_flags_keep_config() {
        let args = Args::try_parse_from(["ble-heartrate", "-v"]).unwrap();
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config, Config::default());
        assert_eq!(args.log_level(), LevelFilter::Debug);
    }
}
