//! INI file configuration adapter.

use crate::domain::error::StratflowError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StratflowError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| StratflowError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, StratflowError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| StratflowError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
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
    fn from_string_parses_config() {
        let content = r#"
[compiler]
max_depth = 16
include_graph = yes

[data]
dir = ./data
symbols = BTC-USDT, ETH-USDT
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(adapter.get_string("data", "dir"), Some("./data".to_string()));
        assert_eq!(
            adapter.get_string("data", "symbols"),
            Some("BTC-USDT, ETH-USDT".to_string())
        );
        assert_eq!(adapter.get_int("compiler", "max_depth").unwrap(), Some(16));
        assert_eq!(adapter.get_bool("compiler", "include_graph").unwrap(), Some(true));
    }

    #[test]
    fn missing_keys_are_none() {
        let adapter = FileConfigAdapter::from_string("[costs]\nfees = 0.001\n").unwrap();
        assert_eq!(adapter.get_string("costs", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
        assert_eq!(adapter.get_double("costs", "sl").unwrap(), None);
        assert_eq!(adapter.get_int("compiler", "max_depth").unwrap(), None);
    }

    #[test]
    fn get_double_returns_value() {
        let adapter = FileConfigAdapter::from_string("[costs]\nfees = 0.001\n").unwrap();
        assert_eq!(adapter.get_double("costs", "fees").unwrap(), Some(0.001));
    }

    #[test]
    fn blank_value_counts_as_unset() {
        let adapter = FileConfigAdapter::from_string("[costs]\nsl =\n").unwrap();
        assert_eq!(adapter.get_double("costs", "sl").unwrap(), None);
    }

    #[test]
    fn unparsable_values_are_invalid() {
        let adapter = FileConfigAdapter::from_string(
            "[compiler]\nmax_depth = deep\ninclude_graph = maybe\n[costs]\nfees = NaN\n",
        )
        .unwrap();
        assert!(matches!(
            adapter.get_int("compiler", "max_depth"),
            Err(StratflowError::ConfigInvalid { ref key, .. }) if key == "max_depth"
        ));
        assert!(adapter.get_bool("compiler", "include_graph").is_err());
        assert!(adapter.get_double("costs", "fees").is_err());
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[compiler]\na = true\nb = yes\nc = 1\nd = false\ne = no\nf = 0\n",
        )
        .unwrap();
        for key in ["a", "b", "c"] {
            assert_eq!(adapter.get_bool("compiler", key).unwrap(), Some(true));
        }
        for key in ["d", "e", "f"] {
            assert_eq!(adapter.get_bool("compiler", key).unwrap(), Some(false));
        }
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[data]\ndir = /srv/candles\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("data", "dir"),
            Some("/srv/candles".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(StratflowError::ConfigParse { .. })));
    }
}
