//! 错误类型
//!
//! 配置期错误使用 [`AopError`]（`thiserror`），调用链路统一使用 `anyhow::Result`，
//! 目标方法和通知抛出的错误原样穿过拦截链，可通过 `downcast_ref` 取回原始类型。

use std::any::Any;
use std::sync::Arc;

use crate::metadata::AnyValue;

/// AOP 框架自身产生的错误
#[derive(Debug, thiserror::Error)]
pub enum AopError {
    #[error("Invalid pointcut expression '{expression}' at position {position}: {reason}")]
    InvalidPointcutExpression {
        expression: String,
        position: usize,
        reason: String,
    },

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Class [{class}] is not an interface and cannot be introduced")]
    NotAnInterface { class: String },

    #[error(
        "Introduction advice [{advice}] of advisor [{advisor}] does not implement interface [{interface}] specified for introduction"
    )]
    IntroductionNotImplemented {
        advisor: String,
        advice: String,
        interface: String,
    },

    #[error("Introduction advice [{advice}] may only be added as part of an IntroductionAdvisor")]
    IntroductionWithoutInterfaces { advice: String },

    #[error("Cannot modify advisors of a frozen proxy configuration")]
    ConfigurationFrozen,

    #[error("Advisor index {index} is out of bounds (advisor count: {len})")]
    AdvisorIndexOutOfBounds { index: usize, len: usize },

    #[error("No target available to invoke method '{method}'")]
    NoTargetAvailable { method: String },

    #[error("Target class [{class}] has no handler for method '{method}'")]
    NoSuchMethod { class: String, method: String },

    #[error("Cannot find current proxy: set 'expose-proxy' to true to make it available")]
    NoCurrentProxy,

    #[error("Failed to load AOP configuration: {0}")]
    ConfigLoad(String),

    #[error("Failed to parse AOP configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Logging initialization failed: {0}")]
    LoggingInitFailed(String),
}

/// 配置期操作的结果类型
pub type AopResult<T> = Result<T, AopError>;

/// 调用链路的结果类型
///
/// `None` 表示无返回值（相当于 void / null）。
pub type InvocationResult = anyhow::Result<Option<AnyValue>>;

/// 把任意值装箱为 [`AnyValue`]
pub fn value<T: Any + Send + Sync>(v: T) -> AnyValue {
    Arc::new(v)
}
