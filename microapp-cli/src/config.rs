use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytedance_microapp::ClientConfig;
use tracing::debug;

use crate::cli::Args;

const CONFIG_FILE: &str = "config.toml";

/// Default config file location, `<config dir>/microapp/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("microapp").join(CONFIG_FILE))
}

/// Resolve the client configuration from the config file, environment and flags.
///
/// Flags win over the file. Without a file, the app id and secret come from
/// flags or `MICROAPP_*` variables.
pub fn load(args: &Args) -> Result<ClientConfig> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => default_config_path().filter(|p| p.exists()),
    };

    let mut config = match (&path, &args.app_id, &args.app_secret) {
        (Some(path), _, _) => load_file(path)?,
        (None, Some(app_id), Some(app_secret)) => {
            let mut config = ClientConfig::new(app_id.as_str(), app_secret.as_str());
            config.apply_env()?;
            config
        }
        (None, _, _) => anyhow::bail!(
            "no config file found; pass --app-id and --app-secret \
             or set MICROAPP_APP_ID and MICROAPP_APP_SECRET"
        ),
    };

    if let Some(app_id) = &args.app_id {
        config.app_id = app_id.clone();
    }
    if let Some(app_secret) = &args.app_secret {
        config.app_secret = app_secret.clone();
    }
    if let Some(mode) = args.store_mode {
        config.store_mode = mode;
    }

    config.validate()?;
    debug!(?config, "Resolved configuration");
    Ok(config)
}

fn load_file(path: &Path) -> Result<ClientConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
}
