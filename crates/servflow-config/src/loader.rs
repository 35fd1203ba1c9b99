//! YAML folder loading for API configs and the integrations file.

use crate::api::ApiConfig;
use crate::error::{ConfigError, Result};
use crate::integrations::IntegrationsFile;
use std::path::Path;
use tracing::{debug, warn};

/// Load one API config from a YAML file.
pub fn load_config_file(path: &Path) -> Result<ApiConfig> {
    let raw = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&raw).map_err(|e| ConfigError::yaml(path.display().to_string(), e))
}

/// Load every `.yaml` / `.yml` file in a folder, sorted by file name for
/// deterministic registration order.
///
/// Unparseable files are returned as errors alongside the successfully
/// parsed configs so a single bad file does not hide the rest.
pub fn load_config_dir(dir: &Path) -> Result<(Vec<ApiConfig>, Vec<ConfigError>)> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect();
    paths.sort();

    let mut configs = Vec::new();
    let mut failures = Vec::new();
    for path in paths {
        match load_config_file(&path) {
            Ok(config) => {
                debug!(path = %path.display(), id = %config.id, "loaded API config");
                configs.push(config);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load API config");
                failures.push(e);
            }
        }
    }
    Ok((configs, failures))
}

/// Load the integrations file.
pub fn load_integrations_file(path: &Path) -> Result<IntegrationsFile> {
    let raw = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&raw).map_err(|e| ConfigError::yaml(path.display().to_string(), e))
}
