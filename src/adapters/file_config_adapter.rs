//! INI file configuration adapter.
//!
//! Section and key names are case-insensitive; values are trimmed.

use crate::domain::error::ScoretraderError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScoretraderError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| ScoretraderError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, ScoretraderError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| ScoretraderError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn reads_strategy_sections() {
        let content = r#"
[strategy]
name = btc scalper
symbol = BTCUSDT
timeframe = 15

[risk]
leverage = 10
risk_fraction = 0.01

[exhaustion]
veto = yes
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("strategy", "name"),
            Some("btc scalper".to_string())
        );
        assert_eq!(adapter.get_int("strategy", "timeframe", 0), 15);
        assert_eq!(adapter.get_double("risk", "risk_fraction", 0.0), 0.01);
        assert_eq!(adapter.get_double("risk", "leverage", 1.0), 10.0);
        assert!(adapter.get_bool("exhaustion", "veto", false));
    }

    #[test]
    fn missing_keys_fall_back() {
        let adapter = FileConfigAdapter::from_string("[risk]\nleverage = 3\n").unwrap();
        assert_eq!(adapter.get_string("risk", "sizing"), None);
        assert_eq!(adapter.get_string("live", "poll_interval_secs"), None);
        assert_eq!(adapter.get_int("live", "retry_attempts", 3), 3);
        assert_eq!(adapter.get_double("fees", "fee_pct", 0.055), 0.055);
        assert!(adapter.get_bool("stops", "volatility", true));
    }

    #[test]
    fn non_numeric_values_fall_back() {
        let adapter =
            FileConfigAdapter::from_string("[indicators]\nrsi = fourteen\natr = 1.5x\n").unwrap();
        assert_eq!(adapter.get_int("indicators", "rsi", 14), 14);
        assert_eq!(adapter.get_double("indicators", "atr", 14.0), 14.0);
    }

    #[test]
    fn bool_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[exhaustion]\na = true\nb = On\nc = 0\nd = no\ne = maybe\n",
        )
        .unwrap();
        assert!(adapter.get_bool("exhaustion", "a", false));
        assert!(adapter.get_bool("exhaustion", "b", false));
        assert!(!adapter.get_bool("exhaustion", "c", true));
        assert!(!adapter.get_bool("exhaustion", "d", true));
        assert!(adapter.get_bool("exhaustion", "e", true));
    }

    #[test]
    fn list_values_are_split_and_trimmed() {
        let adapter = FileConfigAdapter::from_string(
            "[criteria]\norder = ema_alignment , rsi_band,,breakout\n",
        )
        .unwrap();
        assert_eq!(
            adapter.get_list("criteria", "order"),
            vec!["ema_alignment", "rsi_band", "breakout"]
        );
        assert!(adapter.get_list("criteria", "missing").is_empty());
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[cache]\ndir = /tmp/candles\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("cache", "dir"),
            Some("/tmp/candles".to_string())
        );
    }

    #[test]
    fn from_file_reports_missing_file() {
        match FileConfigAdapter::from_file("/nonexistent/path/config.ini") {
            Err(ScoretraderError::ConfigParse { file, .. }) => {
                assert!(file.contains("config.ini"));
            }
            other => panic!("expected ConfigParse, got {:?}", other.err()),
        }
    }
}
