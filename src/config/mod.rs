//! 配置模块

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 默认 Context7 服务地址
pub const DEFAULT_BASE_URL: &str = "https://mcp.context7.com";

/// 默认 API Key 环境变量名
pub const DEFAULT_API_KEY_ENV: &str = "CONTEXT7_API_KEY";

/// 超时配置上限（秒）
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// 最大尝试次数上限
pub const MAX_ATTEMPTS: u32 = 10;

/// 退避因子上限
pub const MAX_BACKOFF_FACTOR: f64 = 10.0;

/// 缓存有效期上限（天）
pub const MAX_TTL_DAYS: u64 = 3650;

/// 应用程序配置
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Context7 客户端配置
    pub context7: Context7Config,

    /// 缓存配置
    pub cache: CacheConfig,

    /// 日志配置
    pub logging: LoggingConfig,
}

/// Context7 客户端配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Context7Config {
    /// 是否启用文档增强
    pub enabled: bool,

    /// 服务地址
    pub base_url: String,

    /// 保存 API Key 的环境变量名
    pub api_key_env: String,

    /// 等待 SSE 端点公告的超时时间（秒）
    pub endpoint_timeout_secs: u64,

    /// 等待工具结果的超时时间（秒）
    pub response_timeout_secs: u64,

    /// 最大尝试次数
    pub max_retries: u32,

    /// 指数退避因子
    pub backoff_factor: f64,

    /// 每个库的文档 token 预算
    pub default_tokens: u32,
}

/// 缓存配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 缓存目录
    pub dir: PathBuf,

    /// 有效期（天）
    pub ttl_days: u64,

    /// 获取文件锁的超时时间（秒）
    pub lock_timeout_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,

    /// 日志文件路径
    pub file_path: Option<String>,

    /// 是否启用控制台日志
    pub enable_console: bool,

    /// 是否启用文件日志
    pub enable_file: bool,
}

impl Default for Context7Config {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            endpoint_timeout_secs: 5,
            response_timeout_secs: 10,
            max_retries: 3,
            backoff_factor: 2.0,
            default_tokens: 3000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".context7_cache"),
            ttl_days: 7,
            lock_timeout_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file_path: Some("./logs/context7-enrich.log".to_string()),
            enable_console: true,
            enable_file: false,
        }
    }
}

impl Context7Config {
    /// 从配置的环境变量读取 API Key，未设置时返回 `None`
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl AppConfig {
    /// 从文件加载配置
    ///
    /// # Errors
    ///
    /// 如果文件不存在、无法读取或格式无效，返回错误
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, crate::error::Error> {
        let content = fs::read_to_string(path)
            .map_err(|e| crate::error::Error::Config(format!("读取配置文件失败: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::Error::Config(format!("解析配置文件失败: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// 保存配置到文件
    ///
    /// # Errors
    ///
    /// 如果无法序列化配置、创建目录或写入文件，返回错误
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), crate::error::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::Error::Config(format!("序列化配置失败: {e}")))?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| crate::error::Error::Config(format!("创建目录失败: {e}")))?;
            }
        }

        fs::write(path, content)
            .map_err(|e| crate::error::Error::Config(format!("写入配置文件失败: {e}")))?;

        Ok(())
    }

    /// 验证配置
    ///
    /// # Errors
    ///
    /// 如果配置无效（如无效地址、零超时等），返回错误
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        let c7 = &self.context7;

        let base = url::Url::parse(&c7.base_url)
            .map_err(|e| crate::error::Error::Config(format!("无效的服务地址 {}: {e}", c7.base_url)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(crate::error::Error::Config(format!(
                "服务地址必须使用 http 或 https: {}",
                c7.base_url
            )));
        }

        if c7.api_key_env.trim().is_empty() {
            return Err(crate::error::Error::Config("API Key 环境变量名不能为空".to_string()));
        }

        for (name, secs) in [
            ("endpoint_timeout_secs", c7.endpoint_timeout_secs),
            ("response_timeout_secs", c7.response_timeout_secs),
        ] {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                return Err(crate::error::Error::Config(format!(
                    "{name} 必须在 1 到 {MAX_TIMEOUT_SECS} 之间: {secs}"
                )));
            }
        }

        if c7.max_retries == 0 || c7.max_retries > MAX_ATTEMPTS {
            return Err(crate::error::Error::Config(format!(
                "最大尝试次数必须在 1 到 {MAX_ATTEMPTS} 之间: {}",
                c7.max_retries
            )));
        }

        if !(1.0..=MAX_BACKOFF_FACTOR).contains(&c7.backoff_factor) {
            return Err(crate::error::Error::Config(format!(
                "退避因子必须在 1 到 {MAX_BACKOFF_FACTOR} 之间: {}",
                c7.backoff_factor
            )));
        }

        if c7.default_tokens == 0 {
            return Err(crate::error::Error::Config("token 预算不能为0".to_string()));
        }

        if self.cache.ttl_days == 0 || self.cache.ttl_days > MAX_TTL_DAYS {
            return Err(crate::error::Error::Config(format!(
                "缓存有效期必须在 1 到 {MAX_TTL_DAYS} 天之间: {}",
                self.cache.ttl_days
            )));
        }

        if self.cache.lock_timeout_secs > MAX_TIMEOUT_SECS {
            return Err(crate::error::Error::Config(format!(
                "缓存锁超时不能超过 {MAX_TIMEOUT_SECS} 秒: {}",
                self.cache.lock_timeout_secs
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(crate::error::Error::Config(format!(
                "无效的日志级别: {}，有效值: {:?}",
                self.logging.level, valid_levels
            )));
        }

        Ok(())
    }

    /// 从环境变量加载配置
    ///
    /// # Errors
    ///
    /// 如果环境变量格式无效或配置验证失败，返回错误
    pub fn from_env() -> Result<Self, crate::error::Error> {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var("CONTEXT7_ENRICH_BASE_URL") {
            config.context7.base_url = base_url;
        }

        if let Ok(dir) = std::env::var("CONTEXT7_ENRICH_CACHE_DIR") {
            config.cache.dir = PathBuf::from(dir);
        }

        if let Ok(level) = std::env::var("CONTEXT7_ENRICH_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(enabled) = std::env::var("CONTEXT7_ENRICH_ENABLED") {
            config.context7.enabled = enabled
                .parse()
                .map_err(|e| crate::error::Error::Config(format!("无效的开关值: {e}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// 合并配置（环境变量优先于文件配置）
    #[must_use]
    pub fn merge(file_config: Option<Self>, env_config: Option<Self>) -> Self {
        let mut config = file_config.unwrap_or_default();

        if let Some(env) = env_config {
            let defaults = Self::default();

            if env.context7.base_url != defaults.context7.base_url {
                config.context7.base_url = env.context7.base_url;
            }
            if env.context7.enabled != defaults.context7.enabled {
                config.context7.enabled = env.context7.enabled;
            }
            if env.cache.dir != defaults.cache.dir {
                config.cache.dir = env.cache.dir;
            }
            if env.logging.level != defaults.logging.level {
                config.logging.level = env.logging.level;
            }
        }

        config
    }
}
