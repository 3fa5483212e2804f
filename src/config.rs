use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }
}

/// Generative model provider settings.
///
/// `api_key` is `None` when no real credential was supplied, in which case the
/// service starts without a configured provider and AI endpoints degrade.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis (optional, per-plan lock)
    pub redis_url: Option<String>,
    /// Unset derives the TTL from the recommendation call bound.
    pub plan_lock_ttl_ms: Option<u64>,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Generative model
    pub llm: LlmSettings,
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10);

        // Redis
        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty());
        let plan_lock_ttl_ms = env::var("PLAN_LOCK_TTL_MS").ok().and_then(|s| s.parse().ok());

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:8081".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Generative model
        let api_key = env::var("LLM_API_KEY").ok().and_then(normalize_api_key);
        let llm = LlmSettings {
            api_key,
            base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/".to_string()),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            timeout_seconds: parse_or("LLM_TIMEOUT_SECONDS", 60),
            max_retries: parse_or("LLM_MAX_RETRIES", 2),
        };

        Ok(Settings {
            env,
            server_addr,
            database_url,
            database_max_connections,
            redis_url,
            plan_lock_ttl_ms,
            cors_allow_origins,
            llm,
        })
    }
}

/// Blank keys and the `dummy` placeholder both mean "no provider".
fn normalize_api_key(raw: String) -> Option<String> {
    let key = raw.trim();
    if key.is_empty() || key.eq_ignore_ascii_case("dummy") {
        None
    } else {
        Some(key.to_string())
    }
}
