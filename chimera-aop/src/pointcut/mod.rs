//! 切点（Pointcut）与匹配引擎
//!
//! 匹配分两阶段进行：
//!
//! 1. 静态阶段：[`ClassFilter`] 过滤目标类型，再由 [`MethodMatcher::matches`] 检查方法签名；
//! 2. 动态阶段：仅当静态阶段通过且 [`MethodMatcher::is_runtime`] 为 `true` 时，
//!    每次调用都会以实参再次调用 [`MethodMatcher::matches_runtime`]。
//!
//! 静态匹配结果可以永久缓存。调用方给出的目标类型为 `None` 时，
//! 统一替换为方法的声明类型（见 [`matches_static`] / [`matches_dynamic`]）。

mod annotation;
mod composition;
mod expression;
mod name_match;
mod pattern;
mod regexp;

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::metadata::{effective_class, AnyValue, Class, Method};

pub use annotation::{AnnotationClassFilter, AnnotationMatchingPointcut, AnnotationMethodMatcher};
pub use composition::{class_filters, method_matchers, pointcuts, ComposablePointcut};
pub use expression::ExpressionPointcut;
pub use name_match::{NameMatchMethodMatcher, NameMatchMethodPointcut};
pub use pattern::{simple_match, TypePattern, TypePatternClassFilter};
pub use regexp::{RegexpMethodMatcher, RegexpMethodPointcut};

/// 类型过滤器
///
/// 粗粒度判断切点是否作用于某个目标类型。
pub trait ClassFilter: Send + Sync + fmt::Debug {
    fn matches(&self, class: &Class) -> bool;
}

/// 方法匹配器
///
/// 实现者只需处理已经解析好的目标类型；`None` 的替换由调用入口统一完成。
pub trait MethodMatcher: Send + Sync + fmt::Debug {
    /// 静态匹配，只能依据方法签名和类型信息
    fn matches(&self, method: &Method, target_class: &Class) -> bool;

    /// 是否需要在每次调用时检查实参
    fn is_runtime(&self) -> bool {
        false
    }

    /// 动态匹配
    ///
    /// 只有静态匹配通过且 `is_runtime()` 为 `true` 时才会被调用。
    /// 静态匹配器走到这里属于调用方违约。
    fn matches_runtime(&self, method: &Method, _target_class: &Class, _args: &[AnyValue]) -> bool {
        panic!(
            "matches_runtime() called on static method matcher {:?} for {}",
            self, method
        )
    }
}

/// 切点：类型过滤器与方法匹配器的组合
pub trait Pointcut: Send + Sync + fmt::Debug {
    fn class_filter(&self) -> Arc<dyn ClassFilter>;

    fn method_matcher(&self) -> Arc<dyn MethodMatcher>;
}

/// 匹配所有类型
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueClassFilter;

impl ClassFilter for TrueClassFilter {
    fn matches(&self, _class: &Class) -> bool {
        true
    }
}

/// 匹配所有方法，永远不需要动态匹配
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueMethodMatcher;

impl MethodMatcher for TrueMethodMatcher {
    fn matches(&self, _method: &Method, _target_class: &Class) -> bool {
        true
    }
}

/// 匹配一切的切点
#[derive(Debug, Clone, Copy, Default)]
pub struct TruePointcut;

impl Pointcut for TruePointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::clone(&*TRUE_CLASS_FILTER)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::clone(&*TRUE_METHOD_MATCHER)
    }
}

/// 规范的"匹配所有类型"单例
pub static TRUE_CLASS_FILTER: Lazy<Arc<dyn ClassFilter>> = Lazy::new(|| Arc::new(TrueClassFilter));

/// 规范的"匹配所有方法"单例
pub static TRUE_METHOD_MATCHER: Lazy<Arc<dyn MethodMatcher>> =
    Lazy::new(|| Arc::new(TrueMethodMatcher));

/// 规范的"永远为真"切点单例
pub static TRUE_POINTCUT: Lazy<Arc<dyn Pointcut>> = Lazy::new(|| Arc::new(TruePointcut));

/// 静态匹配入口，`target_class` 为 `None` 时使用方法的声明类型
pub fn matches_static(matcher: &dyn MethodMatcher, method: &Method, target_class: Option<&Class>) -> bool {
    matcher.matches(method, effective_class(method, target_class))
}

/// 动态匹配入口
///
/// 先完成静态阶段；静态匹配失败或匹配器不需要运行时检查时，不会调用 `matches_runtime`。
pub fn matches_dynamic(
    matcher: &dyn MethodMatcher,
    method: &Method,
    target_class: Option<&Class>,
    args: &[AnyValue],
) -> bool {
    let class = effective_class(method, target_class);
    matcher.matches(method, class) && (!matcher.is_runtime() || matcher.matches_runtime(method, class, args))
}

/// 用闭包实现的类型过滤器
pub struct FnClassFilter {
    name: String,
    predicate: Box<dyn Fn(&Class) -> bool + Send + Sync>,
}

impl FnClassFilter {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Class) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl ClassFilter for FnClassFilter {
    fn matches(&self, class: &Class) -> bool {
        (self.predicate)(class)
    }
}

impl fmt::Debug for FnClassFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnClassFilter({})", self.name)
    }
}

type StaticPredicate = Box<dyn Fn(&Method, &Class) -> bool + Send + Sync>;
type RuntimePredicate = Box<dyn Fn(&Method, &Class, &[AnyValue]) -> bool + Send + Sync>;

/// 只做静态匹配的闭包匹配器
pub struct StaticMethodMatcher {
    name: String,
    predicate: StaticPredicate,
}

impl StaticMethodMatcher {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Method, &Class) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl MethodMatcher for StaticMethodMatcher {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        (self.predicate)(method, target_class)
    }
}

impl fmt::Debug for StaticMethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StaticMethodMatcher({})", self.name)
    }
}

/// 需要检查实参的闭包匹配器
///
/// 静态阶段默认放行，可通过 [`DynamicMethodMatcher::with_static`] 收窄。
pub struct DynamicMethodMatcher {
    name: String,
    static_predicate: Option<StaticPredicate>,
    runtime_predicate: RuntimePredicate,
}

impl DynamicMethodMatcher {
    pub fn new<F>(name: impl Into<String>, runtime_predicate: F) -> Self
    where
        F: Fn(&Method, &Class, &[AnyValue]) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            static_predicate: None,
            runtime_predicate: Box::new(runtime_predicate),
        }
    }

    pub fn with_static<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Method, &Class) -> bool + Send + Sync + 'static,
    {
        self.static_predicate = Some(Box::new(predicate));
        self
    }
}

impl MethodMatcher for DynamicMethodMatcher {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        self.static_predicate
            .as_ref()
            .map_or(true, |p| p(method, target_class))
    }

    fn is_runtime(&self) -> bool {
        true
    }

    fn matches_runtime(&self, method: &Method, target_class: &Class, args: &[AnyValue]) -> bool {
        (self.runtime_predicate)(method, target_class, args)
    }
}

impl fmt::Debug for DynamicMethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DynamicMethodMatcher({})", self.name)
    }
}

/// 由任意类型过滤器和方法匹配器组成的切点
#[derive(Debug, Clone)]
pub struct DefaultPointcut {
    class_filter: Arc<dyn ClassFilter>,
    method_matcher: Arc<dyn MethodMatcher>,
}

impl DefaultPointcut {
    pub fn new(class_filter: Arc<dyn ClassFilter>, method_matcher: Arc<dyn MethodMatcher>) -> Self {
        Self {
            class_filter,
            method_matcher,
        }
    }

    /// 只限定方法，匹配所有类型
    pub fn for_method_matcher(method_matcher: Arc<dyn MethodMatcher>) -> Self {
        Self::new(Arc::clone(&*TRUE_CLASS_FILTER), method_matcher)
    }

    /// 只限定类型，匹配其上所有方法
    pub fn for_class_filter(class_filter: Arc<dyn ClassFilter>) -> Self {
        Self::new(class_filter, Arc::clone(&*TRUE_METHOD_MATCHER))
    }
}

impl Pointcut for DefaultPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::clone(&self.class_filter)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::clone(&self.method_matcher)
    }
}
