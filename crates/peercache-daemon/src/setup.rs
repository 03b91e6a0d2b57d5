//! Config loading and node identity.

use std::path::{Path, PathBuf};

use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::DaemonError;

/// Load configuration from the given path, or the default location.
///
/// A missing file yields [`Config::default`].
pub fn load_config(path: Option<&Path>) -> Result<Config, DaemonError> {
    let config_path = path.map_or_else(default_config_path, Path::to_path_buf);

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| DaemonError::Config(format!("failed to read config: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| DaemonError::Config(format!("failed to parse config: {e}")))?;
        info!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        info!(path = %config_path.display(), "no config file found, using defaults");
        Ok(Config::default())
    }
}

/// Load or create the persistent node id stored as `node-id` in `config_dir`.
pub fn load_or_create_node_id(config_dir: &Path) -> Result<Uuid, DaemonError> {
    let id_path = config_dir.join("node-id");

    if id_path.exists() {
        let content = std::fs::read_to_string(&id_path)
            .map_err(|e| DaemonError::Config(format!("failed to read node-id: {e}")))?;
        let id: Uuid = content
            .trim()
            .parse()
            .map_err(|e| DaemonError::Config(format!("invalid node-id: {e}")))?;
        info!(%id, "loaded node id");
        Ok(id)
    } else {
        std::fs::create_dir_all(config_dir)
            .map_err(|e| DaemonError::Config(format!("failed to create config dir: {e}")))?;

        let id = Uuid::new_v4();
        std::fs::write(&id_path, id.to_string())
            .map_err(|e| DaemonError::Config(format!("failed to write node-id: {e}")))?;

        info!(%id, "created new node id");
        Ok(id)
    }
}

/// The default config directory.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("peercache")
}

/// The default config file.
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}
