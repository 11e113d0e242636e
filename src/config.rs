use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Application configuration.
///
/// Loaded from a TOML file when one exists, otherwise built from defaults.
/// Recognized environment variables override the file in either case, so a
/// containerized deployment can run without any config file at all.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            chunking: ChunkingConfig::default(),
            security: SecurityConfig::default(),
            limits: LimitsConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            llm: LlmConfig::default(),
            storage: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Soft maximum chunk size in characters. A single sentence longer than
    /// this is emitted whole rather than split mid-sentence.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    /// Regex patterns substituted with `[REDACTED]` before chunking.
    #[serde(default)]
    pub redaction_patterns: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            redaction_patterns: Vec::new(),
        }
    }
}

fn default_max_length() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SecurityConfig {
    /// Maximum characters of inbound user text after escaping.
    #[serde(default = "default_input_max_chars")]
    pub input_max_chars: usize,
    /// Maximum characters of outbound model text after escaping.
    #[serde(default = "default_output_max_chars")]
    pub output_max_chars: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            input_max_chars: default_input_max_chars(),
            output_max_chars: default_output_max_chars(),
        }
    }
}

fn default_input_max_chars() -> usize {
    crate::guard::INPUT_MAX_CHARS
}
fn default_output_max_chars() -> usize {
    crate::guard::OUTPUT_MAX_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
        }
    }
}

fn default_max_requests() -> u32 {
    20
}
fn default_window_seconds() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"openai"` or `"ollama"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Embedding dimensionality. Fixed per index; the collection schema is
    /// created with this size.
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dims() -> usize {
    1536
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Base URL of the vector index service (Qdrant REST API).
    #[serde(default = "default_index_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_index_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: default_index_url(),
            collection: default_collection(),
            timeout_secs: default_index_timeout_secs(),
        }
    }
}

fn default_index_url() -> String {
    "http://localhost:6333".to_string()
}
fn default_collection() -> String {
    "document_chunks".to_string()
}
fn default_index_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `"openai"`, `"ollama"`, or anything else for the offline echo backend.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    /// Model identifier. Defaults per provider when unset.
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL for the Ollama provider.
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_completion_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            url: default_ollama_url(),
            timeout_secs: default_llm_timeout_secs(),
            max_tokens: default_max_completion_tokens(),
        }
    }
}

impl LlmConfig {
    /// Resolve the model identifier, falling back to a per-provider default.
    pub fn model_name(&self) -> String {
        match self.model {
            Some(ref m) if !m.is_empty() => m.clone(),
            _ => match self.provider.as_str() {
                "openai" => "o4-mini".to_string(),
                _ => "mistral".to_string(),
            },
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    30
}
fn default_max_completion_tokens() -> u32 {
    512
}

/// S3-compatible object store for raw uploaded files. Optional: when absent,
/// uploads skip the blob put. Credentials come from `AWS_ACCESS_KEY_ID` /
/// `AWS_SECRET_ACCESS_KEY`.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Custom endpoint (MinIO, LocalStack). When unset, the standard
    /// `<bucket>.s3.<region>.amazonaws.com` host is used.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Key prefix for stored objects.
    #[serde(default)]
    pub prefix: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Load configuration from a TOML file, then apply environment overrides
/// and validate. A missing file is not an error: defaults plus environment
/// are used instead.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("LLM_PROVIDER") {
        config.llm.provider = v;
    }
    if let Ok(v) = std::env::var("LLM_MODEL") {
        config.llm.model = Some(v);
    }
    if let Ok(v) = std::env::var("OLLAMA_URL") {
        config.llm.url = v.clone();
        config.embedding.url = Some(v);
    }
    if let Ok(v) = std::env::var("INDEX_URL") {
        config.index.url = v;
    }
    if let Ok(v) = std::env::var("INDEX_COLLECTION") {
        config.index.collection = v;
    }
    if let Ok(v) = std::env::var("RATE_MAX_REQUESTS") {
        if let Ok(n) = v.parse() {
            config.limits.max_requests = n;
        }
    }
    if let Ok(v) = std::env::var("RATE_WINDOW_SECS") {
        if let Ok(n) = v.parse() {
            config.limits.window_seconds = n;
        }
    }
    if let Ok(bucket) = std::env::var("STORAGE_BUCKET") {
        let endpoint_url = std::env::var("STORAGE_ENDPOINT").ok();
        let existing = config.storage.take();
        config.storage = Some(StorageConfig {
            endpoint_url: endpoint_url.or(existing.as_ref().and_then(|s| s.endpoint_url.clone())),
            bucket,
            region: existing
                .as_ref()
                .map(|s| s.region.clone())
                .unwrap_or_else(default_region),
            prefix: existing.map(|s| s.prefix).unwrap_or_default(),
        });
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_length == 0 {
        anyhow::bail!("chunking.max_length must be > 0");
    }

    for pattern in &config.chunking.redaction_patterns {
        regex::Regex::new(pattern)
            .with_context(|| format!("Invalid redaction pattern: '{}'", pattern))?;
    }

    if config.limits.max_requests == 0 {
        anyhow::bail!("limits.max_requests must be >= 1");
    }
    if config.limits.window_seconds == 0 {
        anyhow::bail!("limits.window_seconds must be >= 1");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai or ollama.",
            other
        ),
    }

    Ok(())
}
