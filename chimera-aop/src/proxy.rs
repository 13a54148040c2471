//! 代理
//!
//! [`AopProxy`] 是调用的入口：获取目标、解析调用链、执行链并返回结果。
//! 目标方法和通知的错误原样返回给调用方。

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use crate::advice::Advice;
use crate::advised::AdvisedSupport;
use crate::advisor::AdvisorKind;
use crate::config::ProxyConfig;
use crate::error::{AopError, AopResult, InvocationResult};
use crate::joinpoint::{JoinPoint, ReflectiveMethodInvocation};
use crate::metadata::{AnyValue, Class, ClassRef, Method};
use crate::target::{is_same_object, EmptyTargetSource, SingletonTargetSource, TargetRef, TargetSource};

thread_local! {
    static CURRENT_PROXY: RefCell<Option<Arc<AopProxy>>> = RefCell::new(None);
}

/// 当前线程正在执行的代理
///
/// 仅当配置了 `expose_proxy` 时可用，目标方法可借此通过代理调用自身的其他方法。
pub struct AopContext;

impl AopContext {
    pub fn current_proxy() -> AopResult<Arc<AopProxy>> {
        CURRENT_PROXY
            .with(|current| current.borrow().clone())
            .ok_or(AopError::NoCurrentProxy)
    }

    fn expose(proxy: Arc<AopProxy>) -> ExposedProxyGuard {
        let previous = CURRENT_PROXY.with(|current| current.replace(Some(proxy)));
        ExposedProxyGuard { previous }
    }
}

/// 离开调用时恢复之前暴露的代理
struct ExposedProxyGuard {
    previous: Option<Arc<AopProxy>>,
}

impl Drop for ExposedProxyGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_PROXY.with(|current| *current.borrow_mut() = previous);
    }
}

/// AOP 代理
pub struct AopProxy {
    advised: Arc<AdvisedSupport>,
}

impl AopProxy {
    pub fn new(advised: Arc<AdvisedSupport>) -> Arc<Self> {
        Arc::new(Self { advised })
    }

    pub fn advised(&self) -> &Arc<AdvisedSupport> {
        &self.advised
    }

    /// 代理实现的接口
    pub fn interfaces(&self) -> Arc<[ClassRef]> {
        self.advised.interfaces()
    }

    /// 代理能否当作该类型使用
    pub fn is_proxy_for(&self, class: &Class) -> bool {
        self.advised.is_interface_proxied(class)
            || self
                .advised
                .target_class()
                .is_some_and(|target| class.is_assignable_from(&target))
    }

    /// 调用代理方法
    pub fn invoke(self: &Arc<Self>, method: &Method, args: Vec<AnyValue>) -> InvocationResult {
        let target_source = self.advised.target_source();
        let target = target_source.get_target();

        let _exposed = self
            .advised
            .config()
            .expose_proxy
            .then(|| AopContext::expose(Arc::clone(self)));

        let result = self.invoke_with(target_source.as_ref(), target.as_ref(), method, args);

        if !target_source.is_static() {
            if let Some(target) = &target {
                target_source.release_target(target);
            }
        }
        result
    }

    fn invoke_with(
        self: &Arc<Self>,
        target_source: &dyn TargetSource,
        target: Option<&TargetRef>,
        method: &Method,
        args: Vec<AnyValue>,
    ) -> InvocationResult {
        let target_class = target.map(|t| t.class()).or_else(|| target_source.target_class());
        let snapshot = self.advised.snapshot();
        let chain = self.advised.chain_for(&snapshot, method, target_class.as_deref());

        let result = if chain.is_empty() {
            tracing::trace!("No advice for {}, invoking target directly", method);
            match target {
                Some(target) => target.invoke(method, &args)?,
                None => {
                    return Err(AopError::NoTargetAvailable {
                        method: method.signature(),
                    }
                    .into())
                }
            }
        } else {
            let mut invocation = ReflectiveMethodInvocation::new(
                self.as_value(),
                target.cloned(),
                method.clone(),
                args,
                target_class,
                chain,
            );
            invocation.proceed()?
        };

        match (result, target) {
            (Some(value), Some(target)) if is_same_object(&value, target) => Ok(Some(self.as_value())),
            (result, _) => Ok(result),
        }
    }

    fn as_value(self: &Arc<Self>) -> AnyValue {
        Arc::clone(self) as AnyValue
    }
}

impl fmt::Debug for AopProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AopProxy").field("advised", &self.advised).finish()
    }
}

/// 代理工厂
///
/// 同一个工厂创建的代理共享配置，冻结之前对顾问的修改会反映到所有代理上。
#[derive(Debug, Clone)]
pub struct ProxyFactory {
    advised: Arc<AdvisedSupport>,
}

impl ProxyFactory {
    /// 代理目标对象及其实现的全部接口
    pub fn new(target: TargetRef) -> Self {
        Self::with_config(target, ProxyConfig::default())
    }

    pub fn with_config(target: TargetRef, config: ProxyConfig) -> Self {
        let interfaces = target.class().all_supertypes();
        let factory = Self::with_target_source(Arc::new(SingletonTargetSource::new(target)), config);
        for interface in interfaces.into_iter().filter(|c| c.is_interface()) {
            if let Err(e) = factory.advised.add_interface(interface) {
                tracing::warn!("Skipping target interface: {}", e);
            }
        }
        factory
    }

    /// 没有目标对象的接口代理，方法由通知或引入实现
    pub fn for_interfaces(interfaces: impl IntoIterator<Item = ClassRef>) -> AopResult<Self> {
        let factory = Self::with_target_source(Arc::new(EmptyTargetSource::new()), ProxyConfig::default());
        for interface in interfaces {
            factory.add_interface(interface)?;
        }
        Ok(factory)
    }

    pub fn with_target_source(target_source: Arc<dyn TargetSource>, config: ProxyConfig) -> Self {
        Self {
            advised: Arc::new(AdvisedSupport::new(target_source, config)),
        }
    }

    pub fn advised(&self) -> &Arc<AdvisedSupport> {
        &self.advised
    }

    pub fn add_advisor(&self, advisor: impl Into<AdvisorKind>) -> AopResult<&Self> {
        self.advised.add_advisor(advisor)?;
        Ok(self)
    }

    pub fn add_advice(&self, advice: Advice) -> AopResult<&Self> {
        self.advised.add_advice(advice)?;
        Ok(self)
    }

    pub fn add_interface(&self, interface: ClassRef) -> AopResult<&Self> {
        self.advised.add_interface(interface)?;
        Ok(self)
    }

    /// 创建代理；配置了 `frozen` 时，配置从此冻结
    pub fn get_proxy(&self) -> Arc<AopProxy> {
        if self.advised.config_requests_freeze() && !self.advised.is_frozen() {
            self.advised.freeze();
        }
        tracing::debug!(
            "Creating proxy for {:?} with {} advisor(s)",
            self.advised.target_class().map(|c| c.name().to_string()),
            self.advised.advisor_count()
        );
        AopProxy::new(Arc::clone(&self.advised))
    }
}
