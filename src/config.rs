use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docqa_core::chunk::{DEFAULT_MAX_TOKENS, DEFAULT_OVERLAP_WORDS};
use docqa_core::store::{DistanceMetric, HybridWeights};
use docqa_core::validate::DEFAULT_MAX_UPLOAD_BYTES;

/// Environment variable holding the embedding provider's API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Value shipped in sample configs; treated as "no key".
pub const API_KEY_PLACEHOLDER: &str = "your-api-key-here";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunk: ChunkConfig,
    #[serde(default)]
    pub blob: BlobConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Vector dimension `D`. Also sizes the `VECTOR(D)` column.
    #[serde(default = "default_dim")]
    pub dim: usize,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dim: default_dim(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_dim() -> usize {
    1536
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_words: default_overlap_words(),
        }
    }
}

fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}
fn default_overlap_words() -> usize {
    DEFAULT_OVERLAP_WORDS
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlobConfig {
    #[serde(default = "default_blob_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            dir: default_blob_dir(),
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_blob_dir() -> PathBuf {
    PathBuf::from("./uploads")
}
fn default_max_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SearchConfig {
    #[serde(default)]
    pub method: DistanceMetric,
    #[serde(default)]
    pub hybrid_weights: HybridWeights,
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.url.trim().is_empty() {
        anyhow::bail!("db.url must not be empty");
    }
    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be > 0");
    }

    if config.chunk.max_tokens == 0 {
        anyhow::bail!("chunk.max_tokens must be > 0");
    }

    if config.blob.max_bytes == 0 {
        anyhow::bail!("blob.max_bytes must be > 0");
    }

    let w = config.search.hybrid_weights;
    if !w.vector.is_finite() || !w.text.is_finite() || w.vector < 0.0 || w.text < 0.0 {
        anyhow::bail!("search.hybrid_weights must be finite and >= 0");
    }

    if config.embedding.dim == 0 {
        anyhow::bail!("embedding.dim must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// The provider API key from the environment, unless absent, blank, or the
/// sample placeholder.
pub fn api_key_from_env() -> Option<String> {
    usable_api_key(std::env::var(API_KEY_ENV).ok())
}

fn usable_api_key(raw: Option<String>) -> Option<String> {
    raw.map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty() && k != API_KEY_PLACEHOLDER)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
url = "postgres://localhost/docqa"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let c = parse_config(MINIMAL).unwrap();
        assert_eq!(c.db.max_connections, 5);
        assert!(!c.embedding.is_enabled());
        assert_eq!(c.embedding.dim, 1536);
        assert_eq!(c.embedding.max_retries, 0);
        assert_eq!(c.chunk.max_tokens, 1000);
        assert_eq!(c.chunk.overlap_words, 200);
        assert_eq!(c.blob.max_bytes, 52_428_800);
        assert_eq!(c.blob.dir, PathBuf::from("./uploads"));
        assert_eq!(c.search.method, DistanceMetric::Cosine);
        assert_eq!(c.search.hybrid_weights, HybridWeights::default());
    }

    #[test]
    fn full_config_parses() {
        let c = parse_config(
            r#"
[db]
url = "postgres://localhost/docqa"
max_connections = 10

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dim = 8
timeout_secs = 5

[chunk]
max_tokens = 50
overlap_words = 5

[blob]
dir = "/tmp/blobs"
max_bytes = 1024

[search]
method = "l2"

[search.hybrid_weights]
vector = 0.5
text = 0.5
"#,
        )
        .unwrap();
        assert!(c.embedding.is_enabled());
        assert_eq!(c.embedding.dim, 8);
        assert_eq!(c.search.method, DistanceMetric::L2);
        assert_eq!(c.search.hybrid_weights.vector, 0.5);
        assert_eq!(c.blob.max_bytes, 1024);
    }

    #[test]
    fn openai_requires_model() {
        let err = parse_config(&format!("{MINIMAL}\n[embedding]\nprovider = \"openai\"\n"))
            .unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn rejects_unknown_provider_and_method() {
        assert!(parse_config(&format!("{MINIMAL}\n[embedding]\nprovider = \"local\"\n")).is_err());
        assert!(parse_config(&format!("{MINIMAL}\n[search]\nmethod = \"dot\"\n")).is_err());
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(parse_config(&format!("{MINIMAL}\n[chunk]\nmax_tokens = 0\n")).is_err());
        assert!(parse_config(&format!("{MINIMAL}\n[blob]\nmax_bytes = 0\n")).is_err());
        assert!(parse_config(&format!(
            "{MINIMAL}\n[search.hybrid_weights]\nvector = -0.1\n"
        ))
        .is_err());
    }

    #[test]
    fn placeholder_key_is_unconfigured() {
        assert_eq!(usable_api_key(None), None);
        assert_eq!(usable_api_key(Some("  ".into())), None);
        assert_eq!(usable_api_key(Some(API_KEY_PLACEHOLDER.into())), None);
        assert_eq!(usable_api_key(Some("sk-1".into())), Some("sk-1".to_string()));
    }
}
