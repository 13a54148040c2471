//! 内置通知
//!
//! 日志、性能监控、异常记录和重试，均以 [`Advice`](crate::Advice) 的形式加入代理。

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::advice::{MethodInterceptor, ThrowsAdvice};
use crate::error::{value, InvocationResult};
use crate::error_info::ErrorInfo;
use crate::joinpoint::ProxyMethodInvocation;
use crate::metadata::{AnyValue, Method};
use crate::target::TargetRef;

/// 日志拦截器 - 记录方法进入和退出
#[derive(Debug, Clone, Default)]
pub struct LoggingInterceptor {
    log_args: bool,
}

impl LoggingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同时记录实参个数
    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }
}

impl MethodInterceptor for LoggingInterceptor {
    fn invoke(&self, invocation: &mut dyn ProxyMethodInvocation) -> InvocationResult {
        let signature = invocation.method().signature();
        if self.log_args {
            tracing::info!("→ Entering: {} with {} argument(s)", signature, invocation.arguments().len());
        } else {
            tracing::info!("→ Entering: {}", signature);
        }

        let start = Instant::now();
        let result = invocation.proceed();
        match &result {
            Ok(_) => tracing::info!("← Exiting: {} (took {:?})", signature, start.elapsed()),
            Err(e) => tracing::info!("← Exiting: {} with error '{}' (took {:?})", signature, e, start.elapsed()),
        }
        result
    }

    fn name(&self) -> &str {
        "LoggingInterceptor"
    }
}

/// 性能监控拦截器
#[derive(Debug, Clone)]
pub struct PerformanceMonitorInterceptor {
    threshold: Duration,
}

impl PerformanceMonitorInterceptor {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}

impl MethodInterceptor for PerformanceMonitorInterceptor {
    fn invoke(&self, invocation: &mut dyn ProxyMethodInvocation) -> InvocationResult {
        let start = Instant::now();
        let result = invocation.proceed();
        let elapsed = start.elapsed();
        if elapsed > self.threshold {
            tracing::warn!(
                "⚠️ Slow method detected: {} took {}ms (threshold: {}ms)",
                invocation.method().signature(),
                elapsed.as_millis(),
                self.threshold.as_millis()
            );
        } else {
            tracing::trace!("{} took {:?}", invocation.method(), elapsed);
        }
        result
    }

    fn name(&self) -> &str {
        "PerformanceMonitorInterceptor"
    }
}

/// 异常记录通知，记录完整的原因链后原错误继续传播
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionLoggingAdvice;

impl ThrowsAdvice for ExceptionLoggingAdvice {
    fn after_throwing(
        &self,
        method: &Method,
        _args: &[AnyValue],
        _target: Option<&TargetRef>,
        error: &anyhow::Error,
    ) -> anyhow::Result<()> {
        let info = ErrorInfo::from_anyhow(error);
        tracing::error!(
            origin = ?info.origin,
            "❌ Exception in {}: {}",
            method.signature(),
            info.full_description()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "ExceptionLoggingAdvice"
    }
}

/// 重试时写入调用的用户属性，值为当前尝试次数（从 1 开始，`u32`）
pub const RETRY_ATTEMPT_ATTRIBUTE: &str = "chimera.aop.retry.attempt";

type RetryPredicate = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// 重试拦截器
///
/// 每次尝试都在当前调用的副本上执行链的剩余部分，副本之间互不影响。
#[derive(Clone)]
pub struct RetryInterceptor {
    max_attempts: u32,
    retry_on: RetryPredicate,
}

impl RetryInterceptor {
    /// `max_attempts` 包括第一次调用，至少为 1
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_on: Arc::new(|_| true),
        }
    }

    /// 只在谓词返回 `true` 的错误上重试
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.retry_on = Arc::new(predicate);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl MethodInterceptor for RetryInterceptor {
    fn invoke(&self, invocation: &mut dyn ProxyMethodInvocation) -> InvocationResult {
        let mut attempt = 1;
        loop {
            let mut copy = invocation.invocable_clone();
            copy.set_user_attribute(RETRY_ATTEMPT_ATTRIBUTE, Some(value(attempt)));
            match copy.proceed() {
                Ok(result) => return Ok(result),
                Err(error) if attempt < self.max_attempts && (self.retry_on)(&error) => {
                    tracing::debug!(
                        "Attempt {}/{} of {} failed: {}",
                        attempt,
                        self.max_attempts,
                        invocation.method(),
                        error
                    );
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn name(&self) -> &str {
        "RetryInterceptor"
    }
}

impl fmt::Debug for RetryInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryInterceptor")
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}
