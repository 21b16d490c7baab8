//! Worker configuration
//!
//! Environment-provided, like the coordinator's settings. The worker reads
//! only the variables it recognizes; everything model-related lives under
//! one directory provisioned by the operator.

use std::collections::HashMap;
use std::path::PathBuf;
use tipkit_common::{Error, Result};

pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_MODEL_DIR: &str = "./models";
pub const DEFAULT_TARGET_LANGUAGE: &str = "eng_Latn";

/// Processing worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bind address (`WORKER_HOST`)
    pub host: String,
    /// Bind port (`WORKER_PORT`); the whole process pool shares it
    pub port: u16,
    /// Directory holding model files (`TIPKIT_MODEL_DIR`)
    pub model_dir: PathBuf,
    /// Canonical target language, FLORES-style code (`TARGET_LANGUAGE`)
    pub target_language: String,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("WORKER_PORT") {
            None => DEFAULT_PORT,
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("WORKER_PORT: invalid value {raw:?}: {e}")))?,
        };

        Ok(Self {
            host: lookup("WORKER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            model_dir: lookup("TIPKIT_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
            target_language: lookup("TARGET_LANGUAGE")
                .unwrap_or_else(|| DEFAULT_TARGET_LANGUAGE.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = WorkerConfig::from_map(&HashMap::new()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.model_dir, PathBuf::from(DEFAULT_MODEL_DIR));
        assert_eq!(config.target_language, DEFAULT_TARGET_LANGUAGE);
    }

    #[test]
    fn explicit_values() {
        let mut vars = HashMap::new();
        vars.insert("WORKER_HOST".to_string(), "127.0.0.1".to_string());
        vars.insert("WORKER_PORT".to_string(), "9010".to_string());
        vars.insert("TIPKIT_MODEL_DIR".to_string(), "/srv/models".to_string());
        vars.insert("TARGET_LANGUAGE".to_string(), "fra_Latn".to_string());

        let config = WorkerConfig::from_map(&vars).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9010);
        assert_eq!(config.model_dir, PathBuf::from("/srv/models"));
        assert_eq!(config.target_language, "fra_Latn");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut vars = HashMap::new();
        vars.insert("WORKER_PORT".to_string(), "eighty".to_string());
        assert!(WorkerConfig::from_map(&vars).is_err());
    }
}
