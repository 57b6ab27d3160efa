//! Server configuration read from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use neurosurf_semantic::{CapabilityPolicy, SemanticConfig};

/// Which embedder and summarizer the server wires in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    /// [`HashingEmbedder`](neurosurf_semantic::HashingEmbedder) and
    /// [`ExtractiveSummarizer`](neurosurf_semantic::ExtractiveSummarizer).
    #[default]
    Local,
    /// OpenAI embeddings and chat completions (feature `openai`).
    OpenAI,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory for the durable document snapshot; in-memory when unset.
    pub data_dir: Option<PathBuf>,
    pub provider: Provider,
    pub embedding_dimensions: usize,
    pub log_format: LogFormat,
    pub semantic: SemanticConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5213,
            data_dir: None,
            provider: Provider::Local,
            embedding_dimensions: 256,
            log_format: LogFormat::Pretty,
            semantic: SemanticConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read configuration from `NEUROSURF_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but unparsable ones are errors.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(host) = lookup("NEUROSURF_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("NEUROSURF_PORT") {
            config.port = port.parse().with_context(|| format!("invalid NEUROSURF_PORT '{port}'"))?;
        }
        config.data_dir = lookup("NEUROSURF_DATA_DIR").filter(|d| !d.is_empty()).map(PathBuf::from);

        if let Some(provider) = lookup("NEUROSURF_PROVIDER") {
            config.provider = match provider.to_ascii_lowercase().as_str() {
                "local" => Provider::Local,
                "openai" => Provider::OpenAI,
                other => anyhow::bail!("unknown NEUROSURF_PROVIDER '{other}'"),
            };
        }
        if let Some(dims) = lookup("NEUROSURF_EMBEDDING_DIMENSIONS") {
            config.embedding_dimensions = dims
                .parse()
                .with_context(|| format!("invalid NEUROSURF_EMBEDDING_DIMENSIONS '{dims}'"))?;
        }
        if let Some(format) = lookup("NEUROSURF_LOG_FORMAT") {
            config.log_format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            };
        }

        let defaults = SemanticConfig::default();
        let max_k = match lookup("NEUROSURF_MAX_K") {
            Some(max_k) => max_k.parse().with_context(|| format!("invalid NEUROSURF_MAX_K '{max_k}'"))?,
            None => defaults.max_k,
        };
        let default_k = match lookup("NEUROSURF_DEFAULT_K") {
            Some(k) => k.parse().with_context(|| format!("invalid NEUROSURF_DEFAULT_K '{k}'"))?,
            None => defaults.default_k.min(max_k.max(1)),
        };
        let mut semantic = SemanticConfig::builder().max_k(max_k).default_k(default_k);
        if let Some(threshold) = lookup("NEUROSURF_SIMILARITY_THRESHOLD") {
            semantic = semantic.similarity_threshold(
                threshold
                    .parse()
                    .with_context(|| format!("invalid NEUROSURF_SIMILARITY_THRESHOLD '{threshold}'"))?,
            );
        }
        if let Some(timeout) = lookup("NEUROSURF_CAPABILITY_TIMEOUT_MS") {
            let ms: u64 = timeout
                .parse()
                .with_context(|| format!("invalid NEUROSURF_CAPABILITY_TIMEOUT_MS '{timeout}'"))?;
            let policy = CapabilityPolicy { timeout: Duration::from_millis(ms), ..Default::default() };
            semantic = semantic.embedding_policy(policy).summarizer_policy(policy);
        }
        config.semantic = semantic.build()?;

        Ok(config)
    }
}

/// Load `.env` from the working directory or its ancestors.
///
/// A missing file is not an error; returns the path that was loaded, if any.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    ignore_missing(dotenvy::dotenv())
}

/// Load a specific env file. A missing file is not an error.
pub fn load_dotenv_from(path: &Path) -> Result<Option<PathBuf>, dotenvy::Error> {
    ignore_missing(dotenvy::from_path(path).map(|()| path.to_path_buf()))
}

fn ignore_missing(result: Result<PathBuf, dotenvy::Error>) -> Result<Option<PathBuf>, dotenvy::Error> {
    match result {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
