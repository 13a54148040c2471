//! 通知（Advice）定义
//!
//! 通知种类是一个封闭集合（[`Advice`]）。链解析器只关心两件事：
//! 这个通知是否在调用链中贡献一个环绕步骤，还是为代理贡献额外的接口实现。
//! 前置、返回后、异常、最终通知都会被适配成统一的环绕拦截器（见 `adapter` 模块）。

use std::fmt;
use std::sync::Arc;

use crate::error::InvocationResult;
use crate::introduction::IntroductionInterceptor;
use crate::joinpoint::ProxyMethodInvocation;
use crate::metadata::{AnyValue, Method};
use crate::target::TargetRef;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceType {
    /// 环绕通知（可以控制方法执行）
    Around,
    /// 前置通知
    Before,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（抛出异常时执行）
    AfterThrowing,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 引入通知（为代理增加接口实现）
    Introduction,
}

pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// 环绕拦截器
///
/// 必须调用 `invocation.proceed()` 才会继续执行后续拦截器和目标方法；
/// 不调用即表示短路（例如缓存命中时直接返回）。
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, invocation: &mut dyn ProxyMethodInvocation) -> InvocationResult;

    /// 通知名称
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }
}

/// 前置通知
///
/// 返回错误会阻止目标方法执行，错误原样抛给调用方。
pub trait MethodBeforeAdvice: Send + Sync {
    fn before(&self, method: &Method, args: &[AnyValue], target: Option<&TargetRef>) -> anyhow::Result<()>;

    fn name(&self) -> &str {
        short_type_name::<Self>()
    }
}

/// 返回后通知
///
/// 只在目标方法成功返回时执行，可以观察但不能替换返回值。
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(
        &self,
        return_value: Option<&AnyValue>,
        method: &Method,
        args: &[AnyValue],
        target: Option<&TargetRef>,
    ) -> anyhow::Result<()>;

    fn name(&self) -> &str {
        short_type_name::<Self>()
    }
}

/// 异常通知
pub trait ThrowsAdvice: Send + Sync {
    /// 是否处理该错误，可以借助 `downcast_ref` 只处理特定错误类型
    fn handles(&self, _error: &anyhow::Error) -> bool {
        true
    }

    /// 处理后原错误继续向上传播；处理函数自身返回错误时，以新错误替换原错误
    fn after_throwing(
        &self,
        method: &Method,
        args: &[AnyValue],
        target: Option<&TargetRef>,
        error: &anyhow::Error,
    ) -> anyhow::Result<()>;

    fn name(&self) -> &str {
        short_type_name::<Self>()
    }
}

/// 后置通知（相当于 finally）
pub trait AfterAdvice: Send + Sync {
    fn after(&self, method: &Method, args: &[AnyValue], target: Option<&TargetRef>) -> anyhow::Result<()>;

    fn name(&self) -> &str {
        short_type_name::<Self>()
    }
}

/// 通知
#[derive(Clone)]
pub enum Advice {
    Around(Arc<dyn MethodInterceptor>),
    Before(Arc<dyn MethodBeforeAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    AfterThrowing(Arc<dyn ThrowsAdvice>),
    After(Arc<dyn AfterAdvice>),
    Introduction(Arc<dyn IntroductionInterceptor>),
}

impl Advice {
    pub fn around(interceptor: impl MethodInterceptor + 'static) -> Self {
        Advice::Around(Arc::new(interceptor))
    }

    pub fn before(advice: impl MethodBeforeAdvice + 'static) -> Self {
        Advice::Before(Arc::new(advice))
    }

    pub fn after_returning(advice: impl AfterReturningAdvice + 'static) -> Self {
        Advice::AfterReturning(Arc::new(advice))
    }

    pub fn after_throwing(advice: impl ThrowsAdvice + 'static) -> Self {
        Advice::AfterThrowing(Arc::new(advice))
    }

    pub fn after(advice: impl AfterAdvice + 'static) -> Self {
        Advice::After(Arc::new(advice))
    }

    pub fn introduction(interceptor: impl IntroductionInterceptor + 'static) -> Self {
        Advice::Introduction(Arc::new(interceptor))
    }

    /// 获取通知类型
    pub fn advice_type(&self) -> AdviceType {
        match self {
            Advice::Around(_) => AdviceType::Around,
            Advice::Before(_) => AdviceType::Before,
            Advice::AfterReturning(_) => AdviceType::AfterReturning,
            Advice::AfterThrowing(_) => AdviceType::AfterThrowing,
            Advice::After(_) => AdviceType::After,
            Advice::Introduction(_) => AdviceType::Introduction,
        }
    }

    /// 获取通知名称
    pub fn name(&self) -> &str {
        match self {
            Advice::Around(a) => a.name(),
            Advice::Before(a) => a.name(),
            Advice::AfterReturning(a) => a.name(),
            Advice::AfterThrowing(a) => a.name(),
            Advice::After(a) => a.name(),
            Advice::Introduction(a) => a.name(),
        }
    }

    /// 是否为同一个通知实例
    pub fn ptr_eq(&self, other: &Advice) -> bool {
        fn addr<T: ?Sized>(arc: &Arc<T>) -> *const () {
            Arc::as_ptr(arc) as *const ()
        }
        let (a, b) = match (self, other) {
            (Advice::Around(a), Advice::Around(b)) => (addr(a), addr(b)),
            (Advice::Before(a), Advice::Before(b)) => (addr(a), addr(b)),
            (Advice::AfterReturning(a), Advice::AfterReturning(b)) => (addr(a), addr(b)),
            (Advice::AfterThrowing(a), Advice::AfterThrowing(b)) => (addr(a), addr(b)),
            (Advice::After(a), Advice::After(b)) => (addr(a), addr(b)),
            (Advice::Introduction(a), Advice::Introduction(b)) => (addr(a), addr(b)),
            _ => return false,
        };
        a == b
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.advice_type(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopBefore;

    impl MethodBeforeAdvice for NoopBefore {
        fn before(&self, _: &Method, _: &[AnyValue], _: Option<&TargetRef>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Named;

    impl MethodBeforeAdvice for Named {
        fn before(&self, _: &Method, _: &[AnyValue], _: Option<&TargetRef>) -> anyhow::Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "customName"
        }
    }

    #[test]
    fn test_advice_type_and_default_name() {
        let advice = Advice::before(NoopBefore);
        assert_eq!(advice.advice_type(), AdviceType::Before);
        assert_eq!(advice.name(), "NoopBefore");
        assert_eq!(Advice::before(Named).name(), "customName");
    }

    #[test]
    fn test_ptr_eq_is_instance_identity() {
        let shared: Arc<dyn MethodBeforeAdvice> = Arc::new(NoopBefore);
        let a = Advice::Before(Arc::clone(&shared));
        let b = Advice::Before(shared);
        let c = Advice::before(NoopBefore);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }
}
