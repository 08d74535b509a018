use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};

use crate::config::AppConfig;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging the TOML file with `SWINGBOT_`
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SWINGBOT_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Loads configuration with a profile overlay, e.g. `paper` reads
    /// `Config.toml` then `Config.paper.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_with_profile(path: &str, profile: &str) -> Result<AppConfig> {
        let base = path.trim_end_matches(".toml");
        let config: AppConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Toml::file(format!("{base}.{profile}.toml")))
            .merge(Env::prefixed("SWINGBOT_").split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn missing_file_yields_defaults() {
        // Figment treats a missing TOML file as an empty provider, so a
        // nonexistent path extracts the serde defaults.
        let config = ConfigLoader::load("/nonexistent/Config.toml").unwrap();
        assert_eq!(config.engine.benchmark_symbol, "SPY");
        assert!(config.strategies.is_empty());
    }

    #[test]
    fn shipped_example_config_loads() {
        let config = ConfigLoader::load("../../config/Config.toml").unwrap();
        assert_eq!(config.strategies.len(), 4);

        // A partial [defaults] table keeps documented values for
        // everything it does not name.
        assert_eq!(config.defaults.position_size_pct, Decimal::new(2, 2));
        assert!((config.defaults.zscore_threshold - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.defaults.min_dte, 7);

        let swing = &config.strategies[0];
        assert_eq!(swing.name, "swing-spy");
        assert_eq!(swing.params_for(&config.defaults, "SPY").min_confidence, 0.70);
        assert_eq!(swing.params_for(&config.defaults, "QQQ").min_confidence, 0.75);
        assert!(!config.strategies[3].enabled);
    }
}
