//! Chimera AOP - 面向切面编程的拦截核心
//!
//! 提供类似 Spring AOP 的代理拦截能力：
//! - 两阶段（静态/动态）切点匹配与切点组合
//! - 多种通知类型（Around、Before、AfterReturning、AfterThrowing、After），统一适配为环绕拦截器
//! - 引入（Introduction），为代理增加接口实现
//! - 按配置顺序解析并缓存拦截器链
//! - 可克隆、可重入的方法调用（proceed / invocable_clone）
//!
//! ```
//! use std::sync::Arc;
//! use chimera_aop::prelude::*;
//!
//! let class = Class::new("com.example.Greeter").build();
//! let target = FnTarget::new(Arc::clone(&class))
//!     .method("greet", |args| {
//!         let name = args[0].downcast_ref::<&str>().copied().unwrap_or("nobody");
//!         Ok(Some(value(format!("hello, {}", name))))
//!     });
//!
//! let factory = ProxyFactory::new(Arc::new(target));
//! factory.add_advice(Advice::around(LoggingInterceptor::new())).unwrap();
//! let proxy = factory.get_proxy();
//!
//! let greet = Method::new(&class, "greet").params(["&str"]);
//! let result = aop_invoke!(proxy, &greet, "chimera").unwrap().unwrap();
//! assert_eq!(result.downcast_ref::<String>().unwrap(), "hello, chimera");
//! ```

pub mod adapter;
pub mod advice;
pub mod advised;
pub mod advisor;
pub mod aop_utils;
pub mod chain;
pub mod config;
pub mod error;
pub mod error_info;
pub mod interceptor;
pub mod introduction;
pub mod joinpoint;
pub mod logging;
pub mod metadata;
pub mod pointcut;
pub mod proxy;
pub mod registry;
pub mod target;

// 重新导出核心类型
pub use advice::{
    Advice, AdviceType, AfterAdvice, AfterReturningAdvice, MethodBeforeAdvice, MethodInterceptor, ThrowsAdvice,
};
pub use advised::AdvisedSupport;
pub use advisor::{
    Advisor, AdvisorKind, DefaultIntroductionAdvisor, DefaultPointcutAdvisor, IntroductionAdvisor, PointcutAdvisor,
};
pub use chain::{AdvisorChainFactory, ChainElement, DefaultAdvisorChainFactory};
pub use config::{AopSettings, ProxyConfig};
pub use error::{value, AopError, AopResult, InvocationResult};
pub use error_info::ErrorInfo;
pub use introduction::{
    validate_introduction, DelegatingIntroductionInterceptor, DynamicIntroductionAdvice, IntroductionInfo,
    IntroductionInterceptor,
};
pub use joinpoint::{
    InvocationState, JoinPoint, MethodInvocation, ProxyMethodInvocation, ReflectiveMethodInvocation,
};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use metadata::{AnyValue, Class, ClassRef, Method};
pub use pointcut::{ClassFilter, MethodMatcher, Pointcut};
pub use proxy::{AopContext, AopProxy, ProxyFactory};
pub use registry::AdvisorRegistration;
pub use target::{
    EmptyTargetSource, FnTarget, HotSwappableTargetSource, SingletonTargetSource, TargetObject, TargetRef,
    TargetSource,
};

// 导出 inventory 供注册顾问使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::*;
    pub use crate::advised::AdvisedSupport;
    pub use crate::advisor::*;
    pub use crate::aop_invoke;
    pub use crate::config::{AopSettings, ProxyConfig};
    pub use crate::error::{value, AopError, AopResult, InvocationResult};
    pub use crate::interceptor::{
        ExceptionLoggingAdvice, LoggingInterceptor, PerformanceMonitorInterceptor, RetryInterceptor,
    };
    pub use crate::introduction::*;
    pub use crate::joinpoint::*;
    pub use crate::metadata::{AnyValue, Class, ClassRef, Method};
    pub use crate::pointcut::*;
    pub use crate::proxy::{AopContext, AopProxy, ProxyFactory};
    pub use crate::target::*;
}

/// 简化代理调用的宏
///
/// 每个实参都会被装箱为 [`AnyValue`]。
///
/// ```ignore
/// let user = aop_invoke!(proxy, &find_by_id, 42u64)?;
/// ```
#[macro_export]
macro_rules! aop_invoke {
    ($proxy:expr, $method:expr $(, $arg:expr)* $(,)?) => {
        $proxy.invoke(
            $method,
            ::std::vec![$($crate::error::value($arg)),*],
        )
    };
}
