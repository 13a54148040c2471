//! 目标对象与目标源
//!
//! 目标对象是被代理的真实实现。代理每次调用都会向 [`TargetSource`] 获取目标，
//! 非静态目标源在调用结束后会收到 `release_target` 回调。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{AopError, InvocationResult};
use crate::metadata::{AnyValue, ClassRef, Method};

/// 可被反射式调用的目标对象
pub trait TargetObject: Send + Sync {
    /// 目标的运行时类型
    fn class(&self) -> ClassRef;

    /// 以给定实参调用目标方法
    fn invoke(&self, method: &Method, args: &[AnyValue]) -> InvocationResult;
}

/// 目标对象引用
pub type TargetRef = Arc<dyn TargetObject>;

/// 判断返回值是否就是目标对象本身
pub(crate) fn is_same_object(value: &AnyValue, target: &TargetRef) -> bool {
    Arc::as_ptr(value) as *const () == Arc::as_ptr(target) as *const ()
}

type Handler = Box<dyn Fn(&[AnyValue]) -> InvocationResult + Send + Sync>;

/// 以闭包按方法名分派的目标对象
pub struct FnTarget {
    class: ClassRef,
    handlers: HashMap<String, Handler>,
}

impl FnTarget {
    pub fn new(class: ClassRef) -> Self {
        Self {
            class,
            handlers: HashMap::new(),
        }
    }

    /// 注册方法处理函数，同名方法后注册的覆盖先注册的
    pub fn method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[AnyValue]) -> InvocationResult + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
        self
    }
}

impl TargetObject for FnTarget {
    fn class(&self) -> ClassRef {
        Arc::clone(&self.class)
    }

    fn invoke(&self, method: &Method, args: &[AnyValue]) -> InvocationResult {
        match self.handlers.get(method.name()) {
            Some(handler) => handler(args),
            None => Err(AopError::NoSuchMethod {
                class: self.class.name().to_string(),
                method: method.name().to_string(),
            }
            .into()),
        }
    }
}

impl fmt::Debug for FnTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.handlers.keys().collect();
        methods.sort();
        f.debug_struct("FnTarget")
            .field("class", &self.class.name())
            .field("methods", &methods)
            .finish()
    }
}

/// 目标源
pub trait TargetSource: Send + Sync + fmt::Debug {
    /// 目标类型，可能在目标对象创建之前就已知
    fn target_class(&self) -> Option<ClassRef>;

    /// 静态目标源每次返回同一个目标，不需要释放
    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> Option<TargetRef>;

    fn release_target(&self, _target: &TargetRef) {}
}

/// 持有单个目标对象的目标源
pub struct SingletonTargetSource {
    target: TargetRef,
}

impl SingletonTargetSource {
    pub fn new(target: TargetRef) -> Self {
        Self { target }
    }
}

impl TargetSource for SingletonTargetSource {
    fn target_class(&self) -> Option<ClassRef> {
        Some(self.target.class())
    }

    fn get_target(&self) -> Option<TargetRef> {
        Some(Arc::clone(&self.target))
    }
}

impl fmt::Debug for SingletonTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SingletonTargetSource({})", self.target.class())
    }
}

/// 没有目标对象的目标源，用于纯接口代理
#[derive(Debug, Clone, Default)]
pub struct EmptyTargetSource {
    target_class: Option<ClassRef>,
}

impl EmptyTargetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_class(class: ClassRef) -> Self {
        Self {
            target_class: Some(class),
        }
    }
}

impl TargetSource for EmptyTargetSource {
    fn target_class(&self) -> Option<ClassRef> {
        self.target_class.clone()
    }

    fn get_target(&self) -> Option<TargetRef> {
        None
    }
}

/// 可在运行期替换目标的目标源
///
/// 已经开始的调用继续使用旧目标，之后的调用使用新目标。
pub struct HotSwappableTargetSource {
    target: RwLock<TargetRef>,
}

impl HotSwappableTargetSource {
    pub fn new(target: TargetRef) -> Self {
        Self {
            target: RwLock::new(target),
        }
    }

    /// 替换目标，返回旧目标
    pub fn swap(&self, new_target: TargetRef) -> TargetRef {
        let old = std::mem::replace(&mut *self.target.write(), new_target);
        tracing::debug!("Swapped target {} for {}", old.class(), self.target.read().class());
        old
    }
}

impl TargetSource for HotSwappableTargetSource {
    fn target_class(&self) -> Option<ClassRef> {
        Some(self.target.read().class())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> Option<TargetRef> {
        Some(Arc::clone(&*self.target.read()))
    }
}

impl fmt::Debug for HotSwappableTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HotSwappableTargetSource({})", self.target.read().class())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::value;
    use crate::metadata::Class;

    fn echo(class_name: &str, reply: &'static str) -> TargetRef {
        let class = Class::new(class_name).build();
        Arc::new(FnTarget::new(class).method("echo", move |_| Ok(Some(value(reply)))))
    }

    #[test]
    fn test_fn_target_dispatches_by_name() {
        let target = echo("com.example.Echo", "hi");
        let class = target.class();
        let result = target.invoke(&Method::new(&class, "echo"), &[]).unwrap().unwrap();
        assert_eq!(result.downcast_ref::<&str>(), Some(&"hi"));

        let err = target.invoke(&Method::new(&class, "missing"), &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AopError>(),
            Some(AopError::NoSuchMethod { .. })
        ));
    }

    #[test]
    fn test_hot_swap_returns_previous_target() {
        let first = echo("com.example.First", "1");
        let source = HotSwappableTargetSource::new(Arc::clone(&first));
        assert!(!source.is_static());

        let old = source.swap(echo("com.example.Second", "2"));
        assert!(Arc::ptr_eq(&old, &first));
        assert_eq!(source.target_class().unwrap().name(), "com.example.Second");
    }

    #[test]
    fn test_empty_source_has_no_target() {
        let source = EmptyTargetSource::for_class(Class::interface("com.example.Api").build());
        assert!(source.get_target().is_none());
        assert_eq!(source.target_class().unwrap().name(), "com.example.Api");
    }
}
