//! Application state management.

use std::path::PathBuf;
use tracing::info;
use ultrasearch_core::{ClassIdMap, Config, SearchContext};

/// Shared application state.
pub struct App {
    /// Configuration and class mapping
    pub context: SearchContext,
}

impl App {
    /// Create a new application instance.
    ///
    /// `conf` overrides the configured daemon configuration path.
    pub fn new(mut config: Config, conf: Option<PathBuf>) -> Self {
        if conf.is_some() {
            config.daemon.conf_path = conf;
        }

        let context = SearchContext::from_config(config);

        info!(
            classes = context.class_map().len(),
            index = %context.config().daemon.index_name,
            "Application initialized"
        );

        App { context }
    }

    /// Load the class mapping, failing on a missing or corrupted file.
    pub fn strict_class_map(config: &Config, conf: Option<PathBuf>) -> anyhow::Result<ClassIdMap> {
        let path = conf
            .or_else(|| config.daemon.conf_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("No daemon configuration path. Pass --conf or set daemon.conf_path.")
            })?;

        Ok(ClassIdMap::try_load(&path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_conf_flag_overrides_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("development.conf");
        fs::write(
            &path,
            "source sellers\n{\n  sql_query = SELECT id * 2 + 0 AS id, 0 AS class_id FROM sellers\n}\n\
             source geo__states\n{\n  sql_query = SELECT id * 2 + 1 AS id, 1 AS class_id FROM states\n}\n",
        )
        .unwrap();

        let app = App::new(Config::default(), Some(path.clone()));
        assert_eq!(app.context.class_map().id_of("Geo::State"), Some(1));

        let strict = App::strict_class_map(&Config::default(), Some(path)).unwrap();
        assert_eq!(strict.len(), 2);
    }

    #[test]
    fn test_strict_class_map_requires_a_path() {
        assert!(App::strict_class_map(&Config::default(), None).is_err());
    }

    #[test]
    fn test_strict_class_map_rejects_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.conf");
        fs::write(&path, "source sellers\nsource users\n").unwrap();

        assert!(App::strict_class_map(&Config::default(), Some(path)).is_err());
    }
}
