//! 连接点（JoinPoint）与方法调用
//!
//! [`ReflectiveMethodInvocation`] 持有一次代理调用的全部可变状态：游标、实参和用户属性。
//! 调用链本身是共享且不可变的 `Arc<[ChainElement]>`，因此克隆一次调用只需要复制游标和实参。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::chain::ChainElement;
use crate::error::{AopError, InvocationResult};
use crate::metadata::{effective_class, AnyValue, ClassRef, Method};
use crate::target::TargetRef;

/// 连接点
pub trait JoinPoint: Send {
    /// 执行链中的下一个元素；链已走完时调用目标方法
    fn proceed(&mut self) -> InvocationResult;

    /// 当前目标对象，没有目标时为 `None`
    fn this(&self) -> Option<&TargetRef>;

    /// 静态部分（被调用的方法）
    fn static_part(&self) -> &Method;
}

/// 方法调用
pub trait MethodInvocation: JoinPoint {
    fn method(&self) -> &Method;

    fn arguments(&self) -> &[AnyValue];
}

/// 调用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    NotStarted,
    InProgress,
    TargetReached,
    Completed,
}

/// 代理方法调用，拦截器看到的完整协议
pub trait ProxyMethodInvocation: MethodInvocation {
    /// 代理对象本身，拦截器可以用它替换原始目标作为返回值
    fn proxy(&self) -> &AnyValue;

    fn target_class(&self) -> Option<&ClassRef>;

    /// 替换实参，只影响后续的拦截器和目标方法
    fn set_arguments(&mut self, arguments: Vec<AnyValue>);

    /// 在当前游标位置创建一个独立的调用副本
    fn invocable_clone(&self) -> Box<dyn ProxyMethodInvocation>;

    fn invocable_clone_with_arguments(&self, arguments: Vec<AnyValue>) -> Box<dyn ProxyMethodInvocation>;

    /// 设置用户属性，`None` 表示删除
    fn set_user_attribute(&mut self, key: &str, value: Option<AnyValue>);

    fn user_attribute(&self, key: &str) -> Option<&AnyValue>;

    fn user_attributes(&self) -> &HashMap<String, AnyValue>;

    fn state(&self) -> InvocationState;

    /// 下一个待执行的链元素下标
    fn position(&self) -> usize;
}

/// 基于调用链的方法调用实现
pub struct ReflectiveMethodInvocation {
    proxy: AnyValue,
    target: Option<TargetRef>,
    method: Method,
    arguments: Vec<AnyValue>,
    target_class: Option<ClassRef>,
    chain: Arc<[ChainElement]>,
    next_index: usize,
    depth: usize,
    target_reached: bool,
    finished: bool,
    user_attributes: HashMap<String, AnyValue>,
}

impl ReflectiveMethodInvocation {
    pub fn new(
        proxy: AnyValue,
        target: Option<TargetRef>,
        method: Method,
        arguments: Vec<AnyValue>,
        target_class: Option<ClassRef>,
        chain: Arc<[ChainElement]>,
    ) -> Self {
        Self {
            proxy,
            target,
            method,
            arguments,
            target_class,
            chain,
            next_index: 0,
            depth: 0,
            target_reached: false,
            finished: false,
            user_attributes: HashMap::new(),
        }
    }

    fn invoke_joinpoint(&mut self) -> InvocationResult {
        self.target_reached = true;
        tracing::trace!("Invoking target method {}", self.method);
        match &self.target {
            Some(target) => target.invoke(&self.method, &self.arguments),
            None => Err(AopError::NoTargetAvailable {
                method: self.method.signature(),
            }
            .into()),
        }
    }

    fn proceed_step(&mut self) -> InvocationResult {
        if self.next_index >= self.chain.len() {
            return self.invoke_joinpoint();
        }

        let element = self.chain[self.next_index].clone();
        self.next_index += 1;

        match element {
            ChainElement::Interceptor(interceptor) => interceptor.invoke(self),
            ChainElement::Dynamic(dynamic) => {
                let class = effective_class(&self.method, self.target_class.as_deref());
                if dynamic.matcher.matches_runtime(&self.method, class, &self.arguments) {
                    dynamic.interceptor.invoke(self)
                } else {
                    tracing::trace!("Dynamic match failed, skipping {}", dynamic.interceptor.name());
                    self.proceed_step()
                }
            }
        }
    }

    fn fork(&self, arguments: Vec<AnyValue>) -> Self {
        Self {
            proxy: Arc::clone(&self.proxy),
            target: self.target.clone(),
            method: self.method.clone(),
            arguments,
            target_class: self.target_class.clone(),
            chain: Arc::clone(&self.chain),
            next_index: self.next_index,
            depth: 0,
            target_reached: false,
            finished: false,
            user_attributes: self.user_attributes.clone(),
        }
    }
}

impl JoinPoint for ReflectiveMethodInvocation {
    fn proceed(&mut self) -> InvocationResult {
        self.depth += 1;
        let result = self.proceed_step();
        self.depth -= 1;
        if self.depth == 0 {
            self.finished = true;
        }
        result
    }

    fn this(&self) -> Option<&TargetRef> {
        self.target.as_ref()
    }

    fn static_part(&self) -> &Method {
        &self.method
    }
}

impl MethodInvocation for ReflectiveMethodInvocation {
    fn method(&self) -> &Method {
        &self.method
    }

    fn arguments(&self) -> &[AnyValue] {
        &self.arguments
    }
}

impl ProxyMethodInvocation for ReflectiveMethodInvocation {
    fn proxy(&self) -> &AnyValue {
        &self.proxy
    }

    fn target_class(&self) -> Option<&ClassRef> {
        self.target_class.as_ref()
    }

    fn set_arguments(&mut self, arguments: Vec<AnyValue>) {
        self.arguments = arguments;
    }

    fn invocable_clone(&self) -> Box<dyn ProxyMethodInvocation> {
        Box::new(self.fork(self.arguments.clone()))
    }

    fn invocable_clone_with_arguments(&self, arguments: Vec<AnyValue>) -> Box<dyn ProxyMethodInvocation> {
        Box::new(self.fork(arguments))
    }

    fn set_user_attribute(&mut self, key: &str, value: Option<AnyValue>) {
        match value {
            Some(value) => {
                self.user_attributes.insert(key.to_string(), value);
            }
            None => {
                self.user_attributes.remove(key);
            }
        }
    }

    fn user_attribute(&self, key: &str) -> Option<&AnyValue> {
        self.user_attributes.get(key)
    }

    fn user_attributes(&self) -> &HashMap<String, AnyValue> {
        &self.user_attributes
    }

    fn state(&self) -> InvocationState {
        if self.finished {
            InvocationState::Completed
        } else if self.target_reached {
            InvocationState::TargetReached
        } else if self.depth > 0 || self.next_index > 0 {
            InvocationState::InProgress
        } else {
            InvocationState::NotStarted
        }
    }

    fn position(&self) -> usize {
        self.next_index
    }
}

impl fmt::Debug for ReflectiveMethodInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReflectiveMethodInvocation")
            .field("method", &self.method.signature())
            .field("arguments", &self.arguments.len())
            .field("position", &self.next_index)
            .field("chain_len", &self.chain.len())
            .field("state", &self.state())
            .finish()
    }
}
