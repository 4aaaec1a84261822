use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use log::debug;

use aiplug::config::{find_config_file, Config};
use aiplug::PluginManager;

pub const ENV_FILE_NAME: &str = ".env";

/// Everything a subcommand needs: the merged config and the plugin manager.
pub struct Context {
    pub config: Config,
    pub config_path: Option<PathBuf>,
    /// Directory relative paths in the config are resolved against.
    pub base_dir: PathBuf,
    pub plugin_manager: Arc<PluginManager>,
}

impl Context {
    pub fn load(directory: Option<&str>) -> Result<Self> {
        let start = match directory {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir().context("Could not read the current directory")?,
        };
        let config_path = find_config_file(&start);
        let (config, base_dir) = match &config_path {
            Some(path) => {
                let config = Config::load_and_validate(path)?;
                let base_dir = path.parent().map(Path::to_path_buf).unwrap_or(start);
                (config, base_dir)
            }
            None => {
                debug!("No config file found from <{}>, using defaults", start.display());
                (Config::default(), start)
            }
        };

        let mut context = Context {
            config,
            config_path,
            base_dir,
            plugin_manager: Arc::new(PluginManager::new()),
        };
        context.load_env_file()?;
        context
            .config
            .apply_env_overrides(|key| std::env::var(key).ok());
        Ok(context)
    }

    pub fn env_file_path(&self) -> PathBuf {
        self.base_dir.join(ENV_FILE_NAME)
    }

    /// Variables already set in the environment win over the file.
    fn load_env_file(&mut self) -> Result<()> {
        let path = self.env_file_path();
        if !path.exists() {
            return Ok(());
        }
        debug!("Loading environment from <{}>", path.display());
        dotenvy::from_path(&path)
            .with_context(|| format!("Error loading <{}>", path.display()))?;
        Ok(())
    }
}
