use std::path::Path;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::config::PipelineConfig;

/// Config file read when no explicit path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/Pipeline.toml";

/// Prefix for environment overrides, e.g. `MW_WAREHOUSE__DATABASE_URL`.
pub const ENV_PREFIX: &str = "MW_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the pipeline configuration by layering defaults, a TOML file and
    /// `MW_`-prefixed environment variables, then validates it.
    ///
    /// A missing TOML file is not an error; the defaults and environment apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or validation fails.
    pub fn load(path: Option<&Path>) -> Result<PipelineConfig> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let config: PipelineConfig = Self::figment()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded pipeline configuration");
        Ok(config)
    }

    /// Loads configuration from an in-memory TOML document over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or validation fails.
    pub fn from_toml_str(toml: &str) -> Result<PipelineConfig> {
        let config: PipelineConfig = Self::figment().merge(Toml::string(toml)).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(PipelineConfig::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WriteMode;
    use crate::entity::EntityKind;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ConfigLoader::from_toml_str(
            r#"
            [extraction]
            page_limit = 100

            [extraction.page_limits]
            markets = 500

            [lake]
            write_mode = "append"
            "#,
        )
        .unwrap();

        assert_eq!(config.extraction.page_limit, 100);
        assert_eq!(config.extraction.page_limit_for(EntityKind::Markets), 500);
        assert_eq!(config.lake.write_mode, WriteMode::Append);
        assert_eq!(config.retry.max_retries, 5);
    }

    #[test]
    fn test_invalid_toml_value_rejected() {
        let result = ConfigLoader::from_toml_str("[retry]\nmax_retries = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "Pipeline.toml",
                r#"
                [warehouse]
                database_url = "postgres://file/db"
                batch_size = 100
                "#,
            )?;
            jail.set_env("MW_WAREHOUSE__DATABASE_URL", "postgres://env/db");
            jail.set_env("MW_RETRY__MAX_RETRIES", "3");

            let config = ConfigLoader::load(Some(Path::new("Pipeline.toml")))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.warehouse.database_url, "postgres://env/db");
            assert_eq!(config.warehouse.batch_size, 100);
            assert_eq!(config.retry.max_retries, 3);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = ConfigLoader::load(Some(Path::new("does-not-exist.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.extraction.page_limit, 300);
            Ok(())
        });
    }
}
