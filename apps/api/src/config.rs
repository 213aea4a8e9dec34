use anyhow::{bail, Context, Result};

const DEFAULT_EMBEDDING_DEPLOYMENT: &str = "text-embedding-ada-002";
const DEFAULT_OPENAI_API_VERSION: &str = "2024-02-01";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
const DEFAULT_TOP_K: usize = 10;
const DEFAULT_MAX_CONCURRENT_DOCUMENTS: usize = 4;
const DEFAULT_LLM_MAX_RETRIES: u32 = 3;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Application configuration loaded from environment variables.
/// Startup aborts if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub search: SearchBackendConfig,
    pub embedding_dimension: usize,
    pub ranking_top_k: usize,
    pub max_concurrent_documents: usize,
    pub llm_max_retries: u32,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

/// Azure OpenAI deployment settings shared by chat and embedding calls.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub api_base: String,
    pub chat_deployment: String,
    pub embedding_deployment: String,
    pub api_version: String,
}

/// Which vector index backend to run against.
#[derive(Debug, Clone)]
pub enum SearchBackendConfig {
    Azure {
        endpoint: String,
        api_key: String,
        index_name: String,
    },
    /// In-process exact index. Useful for local runs without a search service.
    Memory,
}

impl SearchBackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            SearchBackendConfig::Azure { .. } => "azure",
            SearchBackendConfig::Memory => "memory",
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Required environment variable '{key}' is not set"))
        };
        let or_default = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let openai = OpenAiConfig {
            api_key: require("AZURE_OPENAI_API_KEY")?,
            api_base: require("AZURE_OPENAI_API_BASE")?,
            chat_deployment: require("AZURE_OPENAI_DEPLOYMENT_NAME")?,
            embedding_deployment: or_default(
                "AZURE_OPENAI_EMBEDDING_DEPLOYMENT",
                DEFAULT_EMBEDDING_DEPLOYMENT,
            ),
            api_version: or_default("AZURE_OPENAI_API_VERSION", DEFAULT_OPENAI_API_VERSION),
        };

        let search = match or_default("SEARCH_BACKEND", "azure").to_lowercase().as_str() {
            "azure" => SearchBackendConfig::Azure {
                endpoint: require("COGNITIVE_SEARCH_ENDPOINT")?,
                api_key: require("COGNITIVE_SEARCH_API_KEY")?,
                index_name: require("COGNITIVE_SEARCH_INDEX_NAME")?,
            },
            "memory" => SearchBackendConfig::Memory,
            other => bail!("SEARCH_BACKEND must be 'azure' or 'memory', got '{other}'"),
        };

        Ok(Config {
            openai,
            search,
            embedding_dimension: parse_count(
                "EMBEDDING_DIMENSION",
                lookup("EMBEDDING_DIMENSION"),
                DEFAULT_EMBEDDING_DIMENSION,
            )?,
            ranking_top_k: parse_count("RANKING_TOP_K", lookup("RANKING_TOP_K"), DEFAULT_TOP_K)?,
            max_concurrent_documents: parse_count(
                "MAX_CONCURRENT_DOCUMENTS",
                lookup("MAX_CONCURRENT_DOCUMENTS"),
                DEFAULT_MAX_CONCURRENT_DOCUMENTS,
            )?,
            llm_max_retries: u32::try_from(parse_count(
                "LLM_MAX_RETRIES",
                lookup("LLM_MAX_RETRIES"),
                DEFAULT_LLM_MAX_RETRIES as usize,
            )?)
            .context("LLM_MAX_RETRIES is out of range")?,
            max_upload_bytes: parse_count(
                "MAX_UPLOAD_BYTES",
                lookup("MAX_UPLOAD_BYTES"),
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            port: or_default("PORT", "8002")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: or_default("RUST_LOG", "info"),
        })
    }
}

/// Parses a positive count, falling back to `default` when unset.
fn parse_count(key: &str, raw: Option<String>, default: usize) -> Result<usize> {
    let Some(raw) = raw.filter(|v| !v.trim().is_empty()) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<usize>()
        .with_context(|| format!("{key} must be a positive integer, got '{raw}'"))?;
    if value == 0 {
        bail!("{key} must be at least 1");
    }
    Ok(value)
}
