use std::env;
use std::thread;

/// Runtime settings, loaded once at startup.
///
/// Required credentials come from the environment (a `.env` file is honored);
/// the tuning knobs mirror how the web process is launched in production:
/// worker count defaults to `cpus * 2 + 1`, request timeout to 120s.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub workers: usize,
    pub keep_alive_secs: u64,
    pub client_timeout_secs: u64,
    pub whatsapp_token: String,
    pub phone_number_id: String,
    pub app_secret: String,
    pub webhook_verify_token: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub graph_base_url: String,
    pub gemini_base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set in .env file or the environment")]
    Missing(&'static str),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: parsed_or("PORT", 5001),
            workers: parsed_or("WEB_CONCURRENCY", default_workers()),
            keep_alive_secs: parsed_or("KEEP_ALIVE", 5),
            client_timeout_secs: parsed_or("REQUEST_TIMEOUT", 120),
            whatsapp_token: required("WHATSAPP_TOKEN")?,
            phone_number_id: required("PHONE_NUMBER_ID")?,
            app_secret: required("APP_SECRET")?,
            webhook_verify_token: required("WEB_HOOK_TOKEN")?,
            gemini_api_key: required("GEN_AI")?,
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            graph_base_url: trimmed_url_or("GRAPH_BASE_URL", "https://graph.facebook.com/v22.0"),
            gemini_base_url: trimmed_url_or(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    parse_with_default(env::var(name).ok(), default)
}

fn parse_with_default<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|value| value.trim().parse().ok()).unwrap_or(default)
}

fn trimmed_url_or(name: &str, default: &str) -> String {
    env::var(name)
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| default.to_string())
}

fn default_workers() -> usize {
    let cpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    cpus * 2 + 1
}
