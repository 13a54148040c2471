//! 日志初始化
//!
//! 框架内部全部通过 `tracing` 输出诊断信息：顾问变更为 `debug`，
//! 链解析和调用步骤为 `trace`。这里提供一个可选的订阅者初始化入口。

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing_subscriber::{fmt as subscriber_fmt, EnvFilter};

use crate::error::{AopError, AopResult};

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    /// 过滤器指令中使用的名称
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = AopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let wanted = if wanted == "warning" { "warn" } else { wanted.as_str() };
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| AopError::InvalidValue(format!("unknown log level `{}`", s)))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 单行紧凑输出
    Compact,
    Full,
    /// 每个事件一行 JSON，便于采集
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = AopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(AopError::InvalidValue(format!("unknown log format `{}`", s))),
        }
    }
}

/// 日志配置，对应配置文件中的 `[logging]` 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub show_target: bool,
    pub show_thread_ids: bool,

    /// 完整的过滤指令，例如 `chimera_aop=trace,my_app=debug`，优先于 `level`
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            show_target: false,
            show_thread_ids: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn show_thread_ids(mut self, show: bool) -> Self {
        self.show_thread_ids = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 默认配置叠加 `RUST_LOG`、`LOG_LEVEL`、`LOG_FORMAT`
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// 无法解析的值保持原配置
    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(filter) = lookup("RUST_LOG").filter(|f| !f.trim().is_empty()) {
            self.filter = Some(filter);
        }
        if let Some(level) = lookup("LOG_LEVEL").and_then(|v| v.parse().ok()) {
            self.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT").and_then(|v| v.parse().ok()) {
            self.format = format;
        }
        self
    }

    /// 实际生效的过滤指令
    pub fn directives(&self) -> String {
        match &self.filter {
            Some(filter) => filter.clone(),
            None => self.level.to_string(),
        }
    }

    /// 安装全局订阅者，重复初始化返回 [`AopError::LoggingInitFailed`]
    pub fn init(self) -> AopResult<()> {
        let directives = self.directives();
        let env_filter = EnvFilter::try_new(&directives)
            .map_err(|e| AopError::LoggingInitFailed(format!("invalid filter `{}`: {}", directives, e)))?;

        let builder = subscriber_fmt()
            .with_env_filter(env_filter)
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids);

        let installed = match self.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Full => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };
        installed.map_err(|e| AopError::LoggingInitFailed(e.to_string()))?;
        tracing::debug!("Logging initialized ({:?}, {})", self.format, directives);
        Ok(())
    }
}
