//! 代理配置
//!
//! 配置文件为 TOML，包含 `[aop]` 与 `[logging]` 两段：
//!
//! ```toml
//! [aop]
//! expose-proxy = true
//! cache-chains = true
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! 环境变量 `CHIMERA_AOP_*` 优先于文件内容。

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{AopError, AopResult};
use crate::logging::LoggingConfig;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "CHIMERA_AOP_";

/// 代理行为开关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// 调用期间通过 `AopContext` 暴露当前代理
    pub expose_proxy: bool,

    /// 创建第一个代理时冻结配置，之后不再允许修改顾问
    pub frozen: bool,

    /// 顾问已经按目标类型预先筛选过，解析时跳过类型过滤
    pub pre_filtered: bool,

    /// 缓存 (目标类型, 方法) 的解析结果
    pub cache_chains: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            expose_proxy: false,
            frozen: false,
            pre_filtered: false,
            cache_chains: true,
        }
    }
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expose_proxy(mut self, expose: bool) -> Self {
        self.expose_proxy = expose;
        self
    }

    pub fn frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }

    pub fn pre_filtered(mut self, pre_filtered: bool) -> Self {
        self.pre_filtered = pre_filtered;
        self
    }

    pub fn cache_chains(mut self, cache: bool) -> Self {
        self.cache_chains = cache;
        self
    }

    /// 用 `CHIMERA_AOP_*` 环境变量覆盖配置
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).and_then(|v| parse_bool(&v));
        if let Some(v) = flag("EXPOSE_PROXY") {
            self.expose_proxy = v;
        }
        if let Some(v) = flag("FROZEN") {
            self.frozen = v;
        }
        if let Some(v) = flag("PRE_FILTERED") {
            self.pre_filtered = v;
        }
        if let Some(v) = flag("CACHE_CHAINS") {
            self.cache_chains = v;
        }
        self
    }
}

/// 解析布尔值（true/yes/1、false/no/0，大小写不敏感）
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// 完整的 AOP 配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AopSettings {
    pub aop: ProxyConfig,
    pub logging: LoggingConfig,
}

impl AopSettings {
    /// 从 TOML 文件加载，并应用环境变量覆盖
    pub fn from_file(path: impl AsRef<Path>) -> AopResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| AopError::ConfigLoad(format!("{}: {}", path.display(), e)))?;
        let settings = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded AOP settings from {}", path.display());
        Ok(settings.with_env_overrides())
    }

    /// 从 TOML 字符串解析，不读取环境变量
    pub fn from_toml_str(content: &str) -> AopResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn with_env_overrides(self) -> Self {
        Self {
            aop: self.aop.with_env_overrides(),
            logging: self.logging.with_env_overrides(),
        }
    }
}
