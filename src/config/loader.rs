use super::Config;
use anyhow::{Context, Result};
use directories::UserDirs;
use std::fs;
use std::path::{Path, PathBuf};

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        let tailmem_dir = home.join(".tailmem");
        if !tailmem_dir.exists() {
            fs::create_dir_all(&tailmem_dir).context("Failed to create .tailmem directory")?;
        }
        Self::load_or_init_at(&tailmem_dir.join("config.toml"))
    }

    /// Load the config at `config_path`, writing defaults there first when
    /// the file does not exist yet.
    pub fn load_or_init_at(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(config_path).context("Failed to read config file")?;
            toml::from_str::<Config>(&contents).context("Failed to parse config file")?
        } else {
            let config = Self::default();
            config.validate()?;
            let toml_str =
                toml::to_string_pretty(&config).context("Failed to serialize config")?;
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            fs::write(config_path, toml_str).context("Failed to write config file")?;
            config
        };
        config.config_path = config_path.to_path_buf();
        config.apply_env_overrides();
        config.workspace_dir = expand_path(&config.workspace_dir);
        config.validate()?;
        fs::create_dir_all(&config.workspace_dir)
            .context("Failed to create workspace directory")?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_creates_configured_workspace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let contents = format!("workspace_dir = {:?}\n", dir.path().join("ws"));
        fs::write(&path, contents).unwrap();

        let config = Config::load_or_init_at(&path).unwrap();
        assert_eq!(config.config_path, path);
        assert!(config.workspace_dir.ends_with("ws"));
        assert!(config.workspace_dir.is_dir());
    }

    #[test]
    fn save_round_trips_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::for_workspace(dir.path().join("ws"));
        config.config_path.clone_from(&path);
        config.compaction.hot_tail_turns = 4;
        config.save().unwrap();

        let reloaded: Config = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reloaded.compaction.hot_tail_turns, 4);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "compaction = [").unwrap();
        assert!(Config::load_or_init_at(&path).is_err());
    }

    #[test]
    fn tilde_expands() {
        let expanded = expand_path(Path::new("~/x"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}
