//! 运行配置
//! 启动时从环境变量读取一次，未设置或无法解析时使用默认值

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_API_BASE_URL: &str = "https://komiku-api.fly.dev/api";
const DEFAULT_DATA_PATH: &str = "data/portal.json";
const DEFAULT_TIMEOUT_SECONDS: u64 = 15;
const DEFAULT_ERROR_BANNER_MS: u64 = 3000;
const DEFAULT_SCHEDULE_POLL_SECONDS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// 上游 REST API 基础地址 (不带末尾斜杠)
    pub api_base_url: String,
    pub data_path: PathBuf,
    pub http_timeout: Duration,
    /// 错误横幅自动隐藏的延迟
    pub error_banner_ms: u64,
    /// 是否允许推送 "新放送" 通知
    pub notify: bool,
    pub schedule_poll: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            http_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            error_banner_ms: DEFAULT_ERROR_BANNER_MS,
            notify: true,
            schedule_poll: Duration::from_secs(DEFAULT_SCHEDULE_POLL_SECONDS),
        }
    }
}

impl Config {
    /// 从环境变量加载
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            port: lookup("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            api_base_url: lookup("API_BASE_URL")
                .map(|u| u.trim().trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty())
                .unwrap_or(defaults.api_base_url),
            data_path: lookup("DATA_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            http_timeout: parsed("HTTP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            error_banner_ms: parsed("ERROR_BANNER_MS").unwrap_or(defaults.error_banner_ms),
            notify: lookup("NOTIFY")
                .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "off" | "denied"))
                .unwrap_or(defaults.notify),
            schedule_poll: parsed("SCHEDULE_POLL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.schedule_poll),
        }
    }
}
