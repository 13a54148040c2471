//! 引入（Introduction / Mixin）
//!
//! 引入通知为代理增加目标本身没有实现的接口。接口能力在配置期校验，
//! 运行期对引入接口上方法的调用直接分派给委托对象，不再查找目标方法。

use std::sync::Arc;

use crate::advice::short_type_name;
use crate::error::{AopError, AopResult, InvocationResult};
use crate::joinpoint::ProxyMethodInvocation;
use crate::metadata::{Class, ClassRef};
use crate::target::{is_same_object, TargetRef};

/// 引入信息：通知或顾问贡献的额外接口
pub trait IntroductionInfo {
    fn interfaces(&self) -> Vec<ClassRef>;
}

/// 能够回答"是否实现某接口"的引入通知
pub trait DynamicIntroductionAdvice: Send + Sync {
    fn implements_interface(&self, interface: &Class) -> bool;
}

/// 引入拦截器
///
/// 自身位于调用链中：引入接口上的调用由它处理，其余调用继续 `proceed()`。
pub trait IntroductionInterceptor: DynamicIntroductionAdvice {
    fn invoke(&self, invocation: &mut dyn ProxyMethodInvocation) -> InvocationResult;

    /// 主动公布的接口；为空表示只能通过显式声明接口的顾问使用
    fn published_interfaces(&self) -> Vec<ClassRef> {
        Vec::new()
    }

    fn name(&self) -> &str {
        short_type_name::<Self>()
    }
}

/// 校验引入通知能否实现声明的全部接口
///
/// 纯函数，不依赖代理配置，可以单独调用。
pub fn validate_introduction(
    advisor: &str,
    interfaces: &[ClassRef],
    advice: &dyn IntroductionInterceptor,
) -> AopResult<()> {
    for interface in interfaces {
        if !interface.is_interface() {
            return Err(AopError::NotAnInterface {
                class: interface.name().to_string(),
            });
        }
        if !advice.implements_interface(interface) {
            return Err(AopError::IntroductionNotImplemented {
                advisor: advisor.to_string(),
                advice: advice.name().to_string(),
                interface: interface.name().to_string(),
            });
        }
    }
    Ok(())
}

/// 委托式引入拦截器
///
/// 把引入接口上的调用转发给委托对象。委托对象返回自身时，改为返回代理，
/// 避免调用方拿到未被代理的对象。
pub struct DelegatingIntroductionInterceptor {
    delegate: TargetRef,
    published: Vec<ClassRef>,
}

impl DelegatingIntroductionInterceptor {
    /// 公布委托对象实现的全部接口
    pub fn new(delegate: TargetRef) -> Self {
        let published = delegate.class().interfaces().to_vec();
        Self { delegate, published }
    }

    /// 不再公布某个接口
    pub fn suppress_interface(mut self, interface: &Class) -> Self {
        self.published.retain(|i| i.name() != interface.name());
        self
    }

    pub fn delegate(&self) -> &TargetRef {
        &self.delegate
    }

    fn is_method_on_introduced_interface(&self, declaring: &Class) -> bool {
        self.implements_interface(declaring)
    }
}

impl DynamicIntroductionAdvice for DelegatingIntroductionInterceptor {
    fn implements_interface(&self, interface: &Class) -> bool {
        self.published.iter().any(|p| interface.is_assignable_from(p))
    }
}

impl IntroductionInterceptor for DelegatingIntroductionInterceptor {
    fn invoke(&self, invocation: &mut dyn ProxyMethodInvocation) -> InvocationResult {
        if !self.is_method_on_introduced_interface(invocation.method().declaring_class()) {
            return invocation.proceed();
        }

        tracing::trace!(
            "Dispatching {} to introduction delegate {}",
            invocation.method(),
            self.delegate.class()
        );
        let result = self.delegate.invoke(invocation.method(), invocation.arguments())?;

        if result.as_ref().is_some_and(|value| is_same_object(value, &self.delegate)) {
            return Ok(Some(Arc::clone(invocation.proxy())));
        }
        Ok(result)
    }

    fn published_interfaces(&self) -> Vec<ClassRef> {
        self.published.clone()
    }

    fn name(&self) -> &str {
        "DelegatingIntroductionInterceptor"
    }
}
