use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::{OrchestratorError, Result};

const DEFAULT_ENGINE_BIN: &str = "build/dgraph_engine";
const DEFAULT_GRAPH_FILE: &str = "data/social_network.txt";
const DEFAULT_UPLOAD_DIR: &str = "data/uploads";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Runtime settings for the orchestration service.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Path to the compiled engine binary (default: `build/dgraph_engine`).
    pub engine_bin: PathBuf,

    /// Sample graph every session starts from (default: `data/social_network.txt`).
    pub default_graph: PathBuf,

    /// Where uploaded graphs are stored in canonical form (default: `data/uploads`).
    pub upload_dir: PathBuf,

    /// Where per-request interactive graphs are written (default: system temp dir).
    pub scratch_dir: PathBuf,

    pub bind_addr: SocketAddr,

    /// Deadline for a single engine invocation (default: 300s).
    pub engine_timeout: Duration,

    /// Request body limit, applied to uploads and JSON payloads (default: 8 MiB).
    pub max_upload_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            engine_bin: absolute(DEFAULT_ENGINE_BIN),
            default_graph: absolute(DEFAULT_GRAPH_FILE),
            upload_dir: absolute(DEFAULT_UPLOAD_DIR),
            scratch_dir: std::env::temp_dir(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            engine_timeout: Duration::from_secs(DEFAULT_ENGINE_TIMEOUT_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServiceConfig {
    /// Build the configuration from `DGRAPH_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServiceConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let path = |key: &str, fallback: PathBuf| lookup(key).map(absolute).unwrap_or(fallback);

        Self {
            engine_bin: path("DGRAPH_ENGINE_BIN", defaults.engine_bin),
            default_graph: path("DGRAPH_DATA_FILE", defaults.default_graph),
            upload_dir: path("DGRAPH_UPLOAD_DIR", defaults.upload_dir),
            scratch_dir: path("DGRAPH_SCRATCH_DIR", defaults.scratch_dir),
            bind_addr: parsed(&lookup, "DGRAPH_BIND_ADDR", defaults.bind_addr),
            engine_timeout: Duration::from_secs(parsed(
                &lookup,
                "DGRAPH_ENGINE_TIMEOUT_SECS",
                DEFAULT_ENGINE_TIMEOUT_SECS,
            )),
            max_upload_bytes: parsed(&lookup, "DGRAPH_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
        }
    }

    /// Create the upload and scratch directories if they are missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.scratch_dir] {
            std::fs::create_dir_all(dir).map_err(|e| OrchestratorError::io(dir, e))?;
        }
        Ok(())
    }
}

fn parsed<F, T>(lookup: &F, key: &str, fallback: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = match lookup(key) {
        Some(raw) => raw,
        None => return fallback,
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, value = %raw, "unparseable setting, using default");
            fallback
        }
    }
}

fn absolute(p: impl AsRef<Path>) -> PathBuf {
    let p = p.as_ref();
    if p.is_absolute() {
        return p.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(p))
        .unwrap_or_else(|_| p.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = ServiceConfig::from_lookup(lookup(&[]));
        assert!(config.engine_bin.ends_with("build/dgraph_engine"));
        assert!(config.default_graph.ends_with("data/social_network.txt"));
        assert_eq!(config.engine_timeout, Duration::from_secs(300));
        assert_eq!(config.max_upload_bytes, 8 * 1024 * 1024);
        assert_eq!(config.bind_addr.port(), 5000);
    }

    #[test]
    fn environment_overrides_are_honoured() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("DGRAPH_ENGINE_BIN", "/opt/engine"),
            ("DGRAPH_ENGINE_TIMEOUT_SECS", "7"),
            ("DGRAPH_BIND_ADDR", "0.0.0.0:8080"),
        ]));
        assert_eq!(config.engine_bin, PathBuf::from("/opt/engine"));
        assert_eq!(config.engine_timeout, Duration::from_secs(7));
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn garbage_numbers_fall_back_to_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("DGRAPH_ENGINE_TIMEOUT_SECS", "soon"),
            ("DGRAPH_MAX_UPLOAD_BYTES", "-1"),
        ]));
        assert_eq!(config.engine_timeout, Duration::from_secs(300));
        assert_eq!(config.max_upload_bytes, 8 * 1024 * 1024);
    }

    #[test]
    fn relative_paths_are_made_absolute() {
        let config = ServiceConfig::from_lookup(lookup(&[("DGRAPH_UPLOAD_DIR", "up")]));
        assert!(config.upload_dir.is_absolute());
        assert!(config.upload_dir.ends_with("up"));
    }
}
