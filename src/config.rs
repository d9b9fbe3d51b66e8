use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the PDF chat service.
///
/// Every required value is validated at startup so that a missing credential
/// aborts the process instead of failing on the first request.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// AWS access key id used to sign object store requests.
    pub aws_access_key_id: String,
    /// AWS secret access key used to sign object store requests.
    pub aws_secret_access_key: String,
    /// AWS region hosting the bucket.
    pub aws_region: String,
    /// Bucket holding uploaded PDF bytes.
    pub s3_bucket: String,
    /// Optional custom S3 endpoint (MinIO, LocalStack, mock servers).
    pub s3_endpoint_url: Option<String>,
    /// Base URL of the Qdrant instance that stores chunk embeddings.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// API key for the hosted document parsing service.
    pub parse_api_key: String,
    /// Optional override for the parsing service base URL.
    pub parse_base_url: Option<String>,
    /// API key for the embedding/chat provider.
    pub openai_api_key: String,
    /// Optional override for the embedding/chat provider base URL.
    pub openai_base_url: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Chat model used for answer synthesis and image description.
    pub chat_model: String,
    /// Percentile of inter-sentence distances above which a chunk break is
    /// inserted. Defaults to 95.
    pub breakpoint_percentile: f64,
    /// Sliding window width (in sentences) used when embedding boundaries.
    /// Defaults to 1.
    pub chunk_buffer_size: usize,
    /// Number of chunks retrieved per question. Defaults to 5.
    pub search_top_k: usize,
    /// Timeout applied to every external HTTP call, in seconds. Defaults to 60.
    pub request_timeout_secs: u64,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

const DEFAULT_BREAKPOINT_PERCENTILE: f64 = 95.0;
const DEFAULT_CHUNK_BUFFER_SIZE: usize = 1;
const DEFAULT_SEARCH_TOP_K: usize = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            aws_access_key_id: load_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: load_env("AWS_SECRET_ACCESS_KEY")?,
            aws_region: load_env("AWS_REGION")?,
            s3_bucket: load_env("S3_BUCKET_NAME")?,
            s3_endpoint_url: load_env_optional("S3_ENDPOINT_URL"),
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            parse_api_key: load_env("PARSE_API_KEY")?,
            parse_base_url: load_env_optional("PARSE_BASE_URL"),
            openai_api_key: load_env("OPENAI_API_KEY")?,
            openai_base_url: load_env_optional("OPENAI_BASE_URL"),
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            chat_model: load_env("CHAT_MODEL")?,
            breakpoint_percentile: parse_optional(
                "BREAKPOINT_PERCENTILE",
                DEFAULT_BREAKPOINT_PERCENTILE,
            )?,
            chunk_buffer_size: parse_optional("CHUNK_BUFFER_SIZE", DEFAULT_CHUNK_BUFFER_SIZE)?,
            search_top_k: parse_optional("SEARCH_TOP_K", DEFAULT_SEARCH_TOP_K)?,
            request_timeout_secs: parse_optional(
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        bucket = %config.s3_bucket,
        region = %config.aws_region,
        qdrant_url = %config.qdrant_url,
        embedding_model = %config.embedding_model,
        chat_model = %config.chat_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
