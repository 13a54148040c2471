//! 拦截器链解析
//!
//! 对给定的 (目标类型, 方法) 按配置顺序筛选顾问，生成调用链。
//! 静态匹配在解析时完成；需要实参的匹配器随拦截器一起放入链中，调用时再判断。

use std::fmt;
use std::sync::Arc;

use crate::adapter;
use crate::advice::MethodInterceptor;
use crate::advisor::AdvisorKind;
use crate::metadata::{effective_class, Class, Method};
use crate::pointcut::MethodMatcher;

/// 需要在调用时再次匹配的拦截器
#[derive(Clone)]
pub struct InterceptorAndDynamicMethodMatcher {
    pub interceptor: Arc<dyn MethodInterceptor>,
    pub matcher: Arc<dyn MethodMatcher>,
}

/// 调用链中的一个元素
#[derive(Clone)]
pub enum ChainElement {
    /// 无条件执行
    Interceptor(Arc<dyn MethodInterceptor>),
    /// 先以实参匹配，未命中则跳过
    Dynamic(InterceptorAndDynamicMethodMatcher),
}

impl ChainElement {
    pub fn interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        match self {
            ChainElement::Interceptor(interceptor) => interceptor,
            ChainElement::Dynamic(dynamic) => &dynamic.interceptor,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ChainElement::Dynamic(_))
    }
}

impl fmt::Debug for ChainElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainElement::Interceptor(i) => write!(f, "Interceptor({})", i.name()),
            ChainElement::Dynamic(d) => write!(f, "Dynamic({}, {:?})", d.interceptor.name(), d.matcher),
        }
    }
}

/// 链缓存的键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodCacheKey {
    method: Method,
    target_class: Option<String>,
}

impl MethodCacheKey {
    pub fn new(method: &Method, target_class: Option<&Class>) -> Self {
        Self {
            method: method.clone(),
            target_class: target_class.map(|c| c.name().to_string()),
        }
    }
}

/// 调用链工厂
pub trait AdvisorChainFactory: Send + Sync + fmt::Debug {
    fn interceptors_and_dynamic_matchers(
        &self,
        advisors: &[AdvisorKind],
        method: &Method,
        target_class: Option<&Class>,
        pre_filtered: bool,
    ) -> Vec<ChainElement>;
}

/// 默认调用链工厂
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAdvisorChainFactory;

impl AdvisorChainFactory for DefaultAdvisorChainFactory {
    fn interceptors_and_dynamic_matchers(
        &self,
        advisors: &[AdvisorKind],
        method: &Method,
        target_class: Option<&Class>,
        pre_filtered: bool,
    ) -> Vec<ChainElement> {
        let class = effective_class(method, target_class);
        let mut chain = Vec::with_capacity(advisors.len());

        for advisor in advisors {
            match advisor {
                AdvisorKind::Pointcut(pa) => {
                    let pointcut = pa.pointcut();
                    if !pre_filtered && !pointcut.class_filter().matches(class) {
                        continue;
                    }
                    let matcher = pointcut.method_matcher();
                    if !matcher.matches(method, class) {
                        continue;
                    }
                    let interceptor = adapter::adapt(pa.advice());
                    if matcher.is_runtime() {
                        chain.push(ChainElement::Dynamic(InterceptorAndDynamicMethodMatcher {
                            interceptor,
                            matcher,
                        }));
                    } else {
                        chain.push(ChainElement::Interceptor(interceptor));
                    }
                }
                AdvisorKind::Introduction(ia) => {
                    if pre_filtered || ia.class_filter().matches(class) {
                        chain.push(ChainElement::Interceptor(adapter::adapt(ia.advice())));
                    }
                }
                AdvisorKind::Unconditional(a) => {
                    chain.push(ChainElement::Interceptor(adapter::adapt(a.advice())));
                }
            }
        }

        tracing::trace!(
            "Resolved chain for {} on {}: {:?}",
            method,
            class,
            chain
        );
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{Advice, MethodBeforeAdvice};
    use crate::advisor::DefaultPointcutAdvisor;
    use crate::metadata::{AnyValue, ClassRef};
    use crate::pointcut::{DefaultPointcut, DynamicMethodMatcher, NameMatchMethodPointcut};
    use crate::target::TargetRef;

    struct Noop(&'static str);

    impl MethodBeforeAdvice for Noop {
        fn before(&self, _: &Method, _: &[AnyValue], _: Option<&TargetRef>) -> anyhow::Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    fn service() -> ClassRef {
        Class::new("com.example.UserService").build()
    }

    fn names(chain: &[ChainElement]) -> Vec<String> {
        chain.iter().map(|e| e.interceptor().name().to_string()).collect()
    }

    #[test]
    fn test_order_is_configuration_order() {
        let advisors: Vec<AdvisorKind> = vec![
            DefaultPointcutAdvisor::unconditional(Advice::before(Noop("first"))).into(),
            DefaultPointcutAdvisor::new(
                Arc::new(NameMatchMethodPointcut::new(["find*"])),
                Advice::before(Noop("second")),
            )
            .into(),
            DefaultPointcutAdvisor::new(
                Arc::new(NameMatchMethodPointcut::new(["save"])),
                Advice::before(Noop("skipped")),
            )
            .into(),
            DefaultPointcutAdvisor::unconditional(Advice::before(Noop("third"))).into(),
        ];
        let class = service();
        let chain = DefaultAdvisorChainFactory.interceptors_and_dynamic_matchers(
            &advisors,
            &Method::new(&class, "findAll"),
            Some(&class),
            false,
        );
        assert_eq!(names(&chain), ["first", "second", "third"]);
    }

    #[test]
    fn test_runtime_matcher_becomes_dynamic_element() {
        let matcher = Arc::new(DynamicMethodMatcher::new("has-args", |_, _, args| !args.is_empty()));
        let advisors: Vec<AdvisorKind> = vec![DefaultPointcutAdvisor::new(
            Arc::new(DefaultPointcut::for_method_matcher(matcher)),
            Advice::before(Noop("dyn")),
        )
        .into()];
        let class = service();
        let chain = DefaultAdvisorChainFactory.interceptors_and_dynamic_matchers(
            &advisors,
            &Method::new(&class, "find"),
            None,
            false,
        );
        assert_eq!(chain.len(), 1);
        assert!(chain[0].is_dynamic());
    }

    #[test]
    fn test_cache_key_distinguishes_target_class() {
        let class = service();
        let method = Method::new(&class, "find");
        let other = Class::new("com.example.Other").build();
        assert_eq!(
            MethodCacheKey::new(&method, Some(&class)),
            MethodCacheKey::new(&method, Some(&class))
        );
        assert_ne!(
            MethodCacheKey::new(&method, Some(&class)),
            MethodCacheKey::new(&method, Some(&other))
        );
    }

    #[test]
    fn test_unconditional_advisor_ignores_class_filter() {
        let advisors: Vec<AdvisorKind> = vec![
            crate::advisor::wrap(Advice::before(Noop("everywhere"))).unwrap(),
            DefaultPointcutAdvisor::new(
                Arc::new(NameMatchMethodPointcut::new(["find"]).with_class_filter(Arc::new(
                    crate::pointcut::TypePatternClassFilter::new("org.other.*").unwrap(),
                ))),
                Advice::before(Noop("elsewhere")),
            )
            .into(),
        ];
        assert!(matches!(advisors[0], AdvisorKind::Unconditional(_)));

        let class = service();
        let find = Method::new(&class, "find");
        let chain = DefaultAdvisorChainFactory.interceptors_and_dynamic_matchers(&advisors, &find, None, false);
        assert_eq!(names(&chain), ["everywhere"]);
        assert!(!chain[0].is_dynamic());

        let chain = DefaultAdvisorChainFactory.interceptors_and_dynamic_matchers(&advisors, &find, Some(&class), true);
        assert_eq!(names(&chain), ["everywhere", "elsewhere"]);
    }
}
