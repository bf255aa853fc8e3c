use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;
use uuid::Uuid;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub supabase_url: String,
    pub supabase_key: String,
    pub user_id: Option<Uuid>,
    pub browser: BrowserConfig,
    pub poll_interval: Duration,
    pub form_timeout: Duration,
    pub control_addr: SocketAddr,
    pub control_token: Option<String>,
    pub http: HttpTimeouts,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Checked when the runner starts, not at load time.
    pub chrome_path: Option<PathBuf>,
    pub user_data_dir: PathBuf,
    pub user_agent: String,
}

#[derive(Debug, Clone, Copy)]
pub struct HttpTimeouts {
    pub request: Duration,
    pub connect: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(15),
            connect: Duration::from_secs(5),
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let supabase_url = std::env::var("SUPABASE_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        let supabase_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|_| std::env::var("SUPABASE_SERVICE_KEY"))
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))?;

        let user_id = match non_empty_var("RESELLER_USER_ID") {
            Some(raw) => Some(Uuid::parse_str(&raw).map_err(|_| ConfigError::Invalid {
                key: "RESELLER_USER_ID",
                value: raw,
            })?),
            None => None,
        };

        let user_data_dir = non_empty_var("CHROME_USER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_user_data_dir);

        Ok(Self {
            supabase_url,
            supabase_key,
            user_id,
            browser: BrowserConfig {
                chrome_path: non_empty_var("CHROME_PATH").map(PathBuf::from),
                user_data_dir,
                user_agent: non_empty_var("BROWSER_USER_AGENT")
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            },
            poll_interval: Duration::from_secs(parse_var("POLL_INTERVAL_SECS", 5u64)?.max(1)),
            form_timeout: Duration::from_secs(parse_var("FORM_TIMEOUT_SECS", 10u64)?),
            control_addr: parse_var("CONTROL_ADDR", SocketAddr::from(([127, 0, 0, 1], 8765)))?,
            control_token: non_empty_var("CONTROL_TOKEN"),
            http: HttpTimeouts {
                request: Duration::from_secs(parse_var("HTTP_TIMEOUT_SECS", 15u64)?),
                connect: Duration::from_secs(parse_var("HTTP_CONNECT_TIMEOUT_SECS", 5u64)?),
            },
        })
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            user_data_dir: default_user_data_dir(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

fn default_user_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".reseller-companion")
        .join("chrome-data")
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
