//! 切点组合
//!
//! 组合后的匹配器只要任一操作数需要运行时匹配，就整体标记为运行时匹配，
//! 宁可多做一次动态检查，也不能因为过早的静态优化漏掉匹配。

use std::sync::Arc;

use super::{ClassFilter, MethodMatcher, Pointcut, TRUE_CLASS_FILTER, TRUE_METHOD_MATCHER};
use crate::metadata::{AnyValue, Class, Method};

/// 对单个操作数做完整的两阶段求值，从不对静态匹配器调用 `matches_runtime`
fn operand_matches(matcher: &dyn MethodMatcher, method: &Method, class: &Class, args: &[AnyValue]) -> bool {
    matcher.matches(method, class) && (!matcher.is_runtime() || matcher.matches_runtime(method, class, args))
}

/// 类型过滤器组合
pub mod class_filters {
    use super::*;

    #[derive(Debug)]
    struct UnionClassFilter(Vec<Arc<dyn ClassFilter>>);

    impl ClassFilter for UnionClassFilter {
        fn matches(&self, class: &Class) -> bool {
            self.0.iter().any(|f| f.matches(class))
        }
    }

    #[derive(Debug)]
    struct IntersectionClassFilter(Vec<Arc<dyn ClassFilter>>);

    impl ClassFilter for IntersectionClassFilter {
        fn matches(&self, class: &Class) -> bool {
            self.0.iter().all(|f| f.matches(class))
        }
    }

    #[derive(Debug)]
    struct NegateClassFilter(Arc<dyn ClassFilter>);

    impl ClassFilter for NegateClassFilter {
        fn matches(&self, class: &Class) -> bool {
            !self.0.matches(class)
        }
    }

    /// 任一过滤器匹配即匹配
    pub fn union(a: Arc<dyn ClassFilter>, b: Arc<dyn ClassFilter>) -> Arc<dyn ClassFilter> {
        Arc::new(UnionClassFilter(vec![a, b]))
    }

    /// 所有过滤器都匹配才匹配
    pub fn intersection(a: Arc<dyn ClassFilter>, b: Arc<dyn ClassFilter>) -> Arc<dyn ClassFilter> {
        Arc::new(IntersectionClassFilter(vec![a, b]))
    }

    pub fn union_all(filters: Vec<Arc<dyn ClassFilter>>) -> Arc<dyn ClassFilter> {
        Arc::new(UnionClassFilter(filters))
    }

    pub fn intersection_all(filters: Vec<Arc<dyn ClassFilter>>) -> Arc<dyn ClassFilter> {
        Arc::new(IntersectionClassFilter(filters))
    }

    pub fn negate(filter: Arc<dyn ClassFilter>) -> Arc<dyn ClassFilter> {
        Arc::new(NegateClassFilter(filter))
    }
}

/// 方法匹配器组合
pub mod method_matchers {
    use super::*;

    #[derive(Debug)]
    struct UnionMethodMatcher {
        a: Arc<dyn MethodMatcher>,
        b: Arc<dyn MethodMatcher>,
    }

    impl MethodMatcher for UnionMethodMatcher {
        fn matches(&self, method: &Method, target_class: &Class) -> bool {
            self.a.matches(method, target_class) || self.b.matches(method, target_class)
        }

        fn is_runtime(&self) -> bool {
            self.a.is_runtime() || self.b.is_runtime()
        }

        fn matches_runtime(&self, method: &Method, target_class: &Class, args: &[AnyValue]) -> bool {
            operand_matches(self.a.as_ref(), method, target_class, args)
                || operand_matches(self.b.as_ref(), method, target_class, args)
        }
    }

    /// 合并两个切点时使用：每个方法匹配器只在它自己的类型过滤器通过时才生效
    #[derive(Debug)]
    struct ClassAwareUnionMethodMatcher {
        a: Arc<dyn MethodMatcher>,
        a_filter: Arc<dyn ClassFilter>,
        b: Arc<dyn MethodMatcher>,
        b_filter: Arc<dyn ClassFilter>,
    }

    impl MethodMatcher for ClassAwareUnionMethodMatcher {
        fn matches(&self, method: &Method, target_class: &Class) -> bool {
            (self.a_filter.matches(target_class) && self.a.matches(method, target_class))
                || (self.b_filter.matches(target_class) && self.b.matches(method, target_class))
        }

        fn is_runtime(&self) -> bool {
            self.a.is_runtime() || self.b.is_runtime()
        }

        fn matches_runtime(&self, method: &Method, target_class: &Class, args: &[AnyValue]) -> bool {
            (self.a_filter.matches(target_class)
                && operand_matches(self.a.as_ref(), method, target_class, args))
                || (self.b_filter.matches(target_class)
                    && operand_matches(self.b.as_ref(), method, target_class, args))
        }
    }

    #[derive(Debug)]
    struct IntersectionMethodMatcher {
        a: Arc<dyn MethodMatcher>,
        b: Arc<dyn MethodMatcher>,
    }

    impl MethodMatcher for IntersectionMethodMatcher {
        fn matches(&self, method: &Method, target_class: &Class) -> bool {
            self.a.matches(method, target_class) && self.b.matches(method, target_class)
        }

        fn is_runtime(&self) -> bool {
            self.a.is_runtime() || self.b.is_runtime()
        }

        fn matches_runtime(&self, method: &Method, target_class: &Class, args: &[AnyValue]) -> bool {
            operand_matches(self.a.as_ref(), method, target_class, args)
                && operand_matches(self.b.as_ref(), method, target_class, args)
        }
    }

    #[derive(Debug)]
    struct NegateMethodMatcher(Arc<dyn MethodMatcher>);

    impl MethodMatcher for NegateMethodMatcher {
        fn matches(&self, method: &Method, target_class: &Class) -> bool {
            // 运行时匹配器的静态结果无法直接取反，只能留到动态阶段决定
            self.0.is_runtime() || !self.0.matches(method, target_class)
        }

        fn is_runtime(&self) -> bool {
            self.0.is_runtime()
        }

        fn matches_runtime(&self, method: &Method, target_class: &Class, args: &[AnyValue]) -> bool {
            !operand_matches(self.0.as_ref(), method, target_class, args)
        }
    }

    pub fn union(a: Arc<dyn MethodMatcher>, b: Arc<dyn MethodMatcher>) -> Arc<dyn MethodMatcher> {
        Arc::new(UnionMethodMatcher { a, b })
    }

    /// 带类型过滤器的并集
    pub fn union_with_filters(
        a: Arc<dyn MethodMatcher>,
        a_filter: Arc<dyn ClassFilter>,
        b: Arc<dyn MethodMatcher>,
        b_filter: Arc<dyn ClassFilter>,
    ) -> Arc<dyn MethodMatcher> {
        Arc::new(ClassAwareUnionMethodMatcher {
            a,
            a_filter,
            b,
            b_filter,
        })
    }

    pub fn intersection(a: Arc<dyn MethodMatcher>, b: Arc<dyn MethodMatcher>) -> Arc<dyn MethodMatcher> {
        Arc::new(IntersectionMethodMatcher { a, b })
    }

    pub fn negate(matcher: Arc<dyn MethodMatcher>) -> Arc<dyn MethodMatcher> {
        Arc::new(NegateMethodMatcher(matcher))
    }
}

/// 切点组合与求值
pub mod pointcuts {
    use super::*;
    use crate::metadata::effective_class;

    pub fn union(a: &dyn Pointcut, b: &dyn Pointcut) -> ComposablePointcut {
        ComposablePointcut::from_pointcut(a).union(b)
    }

    pub fn intersection(a: &dyn Pointcut, b: &dyn Pointcut) -> ComposablePointcut {
        ComposablePointcut::from_pointcut(a).intersection(b)
    }

    /// 完整的两阶段判断：类型过滤、静态匹配，必要时动态匹配
    pub fn matches(pointcut: &dyn Pointcut, method: &Method, target_class: Option<&Class>, args: &[AnyValue]) -> bool {
        let class = effective_class(method, target_class);
        if !pointcut.class_filter().matches(class) {
            return false;
        }
        operand_matches(pointcut.method_matcher().as_ref(), method, class, args)
    }

    /// 仅静态阶段：类型过滤 + 静态方法匹配
    pub fn matches_static(pointcut: &dyn Pointcut, method: &Method, target_class: Option<&Class>) -> bool {
        let class = effective_class(method, target_class);
        pointcut.class_filter().matches(class) && pointcut.method_matcher().matches(method, class)
    }
}

/// 可组合切点
///
/// 以"全部匹配"为初始状态，通过并集 / 交集逐步收窄或放宽。
#[derive(Debug, Clone)]
pub struct ComposablePointcut {
    class_filter: Arc<dyn ClassFilter>,
    method_matcher: Arc<dyn MethodMatcher>,
}

impl ComposablePointcut {
    pub fn new() -> Self {
        Self {
            class_filter: Arc::clone(&*TRUE_CLASS_FILTER),
            method_matcher: Arc::clone(&*TRUE_METHOD_MATCHER),
        }
    }

    pub fn from_pointcut(pointcut: &dyn Pointcut) -> Self {
        Self {
            class_filter: pointcut.class_filter(),
            method_matcher: pointcut.method_matcher(),
        }
    }

    pub fn from_class_filter(class_filter: Arc<dyn ClassFilter>) -> Self {
        Self {
            class_filter,
            method_matcher: Arc::clone(&*TRUE_METHOD_MATCHER),
        }
    }

    pub fn from_method_matcher(method_matcher: Arc<dyn MethodMatcher>) -> Self {
        Self {
            class_filter: Arc::clone(&*TRUE_CLASS_FILTER),
            method_matcher,
        }
    }

    pub fn union_class_filter(mut self, other: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = class_filters::union(self.class_filter, other);
        self
    }

    pub fn intersection_class_filter(mut self, other: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = class_filters::intersection(self.class_filter, other);
        self
    }

    pub fn union_method_matcher(mut self, other: Arc<dyn MethodMatcher>) -> Self {
        self.method_matcher = method_matchers::union(self.method_matcher, other);
        self
    }

    pub fn intersection_method_matcher(mut self, other: Arc<dyn MethodMatcher>) -> Self {
        self.method_matcher = method_matchers::intersection(self.method_matcher, other);
        self
    }

    /// 与另一个切点取并集
    pub fn union(self, other: &dyn Pointcut) -> Self {
        let other_filter = other.class_filter();
        Self {
            method_matcher: method_matchers::union_with_filters(
                self.method_matcher,
                Arc::clone(&self.class_filter),
                other.method_matcher(),
                Arc::clone(&other_filter),
            ),
            class_filter: class_filters::union(self.class_filter, other_filter),
        }
    }

    /// 与另一个切点取交集
    pub fn intersection(self, other: &dyn Pointcut) -> Self {
        Self {
            class_filter: class_filters::intersection(self.class_filter, other.class_filter()),
            method_matcher: method_matchers::intersection(self.method_matcher, other.method_matcher()),
        }
    }
}

impl Default for ComposablePointcut {
    fn default() -> Self {
        Self::new()
    }
}

impl Pointcut for ComposablePointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::clone(&self.class_filter)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::clone(&self.method_matcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcut::{
        AnnotationMatchingPointcut, DefaultPointcut, DynamicMethodMatcher, StaticMethodMatcher,
        TypePatternClassFilter, TRUE_POINTCUT,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn classes() -> Vec<Arc<Class>> {
        vec![
            Class::new("com.example.UserService").build(),
            Class::new("com.example.sub.AuditService").build(),
            Class::new("org.other.UserService").build(),
        ]
    }

    fn methods(class: &Arc<Class>) -> Vec<Method> {
        vec![
            Method::new(class, "find").annotated("Loggable"),
            Method::new(class, "save"),
            Method::new(class, "delete").annotated("Loggable").annotated("Audited"),
        ]
    }

    #[test]
    fn test_package_and_annotation_composition() {
        let p1 = DefaultPointcut::for_class_filter(Arc::new(TypePatternClassFilter::new("com.example.*").unwrap()));
        let p2 = AnnotationMatchingPointcut::for_method_annotation("Loggable");
        let p3 = TRUE_POINTCUT.as_ref();

        let combined = ComposablePointcut::from_pointcut(&p1)
            .intersection(&p2)
            .intersection(p3);

        for class in classes() {
            for method in methods(&class) {
                let expected = pointcuts::matches_static(&p1, &method, Some(&class))
                    && pointcuts::matches_static(&p2, &method, Some(&class))
                    && pointcuts::matches_static(p3, &method, Some(&class));
                assert_eq!(
                    pointcuts::matches_static(&combined, &method, Some(&class)),
                    expected,
                    "{} on {}",
                    method,
                    class
                );
            }
        }

        let class = Class::new("com.example.UserService").build();
        assert!(pointcuts::matches_static(&combined, &Method::new(&class, "x").annotated("Loggable"), Some(&class)));
        assert!(!pointcuts::matches_static(&combined, &Method::new(&class, "x"), Some(&class)));
    }

    #[test]
    fn test_union_keeps_each_matcher_scoped_to_its_filter() {
        let finds = DefaultPointcut::new(
            Arc::new(TypePatternClassFilter::new("com.example.*").unwrap()),
            Arc::new(StaticMethodMatcher::new("find", |m, _| m.name() == "find")),
        );
        let saves = DefaultPointcut::new(
            Arc::new(TypePatternClassFilter::new("org.other.*").unwrap()),
            Arc::new(StaticMethodMatcher::new("save", |m, _| m.name() == "save")),
        );
        let union = pointcuts::union(&finds, &saves);

        let example = Class::new("com.example.UserService").build();
        let other = Class::new("org.other.UserService").build();

        assert!(pointcuts::matches_static(&union, &Method::new(&example, "find"), Some(&example)));
        assert!(!pointcuts::matches_static(&union, &Method::new(&example, "save"), Some(&example)));
        assert!(pointcuts::matches_static(&union, &Method::new(&other, "save"), Some(&other)));
        assert!(!pointcuts::matches_static(&union, &Method::new(&other, "find"), Some(&other)));
    }

    #[test]
    fn test_runtime_flag_is_conservative_or() {
        let static_mm: Arc<dyn MethodMatcher> = Arc::new(StaticMethodMatcher::new("any", |_, _| true));
        let dynamic_mm: Arc<dyn MethodMatcher> = Arc::new(DynamicMethodMatcher::new("args", |_, _, args| !args.is_empty()));

        assert!(!method_matchers::intersection(Arc::clone(&static_mm), Arc::clone(&static_mm)).is_runtime());
        assert!(method_matchers::intersection(Arc::clone(&static_mm), Arc::clone(&dynamic_mm)).is_runtime());
        assert!(method_matchers::union(Arc::clone(&dynamic_mm), Arc::clone(&static_mm)).is_runtime());
        assert!(method_matchers::negate(Arc::clone(&dynamic_mm)).is_runtime());
    }

    #[test]
    fn test_composed_runtime_never_calls_static_operand_dynamically() {
        let dynamic_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&dynamic_calls);
        let dynamic_mm: Arc<dyn MethodMatcher> = Arc::new(DynamicMethodMatcher::new("args", move |_, _, args| {
            counter.fetch_add(1, Ordering::SeqCst);
            !args.is_empty()
        }));
        // TRUE_METHOD_MATCHER 的 matches_runtime 会 panic
        let composed = method_matchers::intersection(Arc::clone(&*TRUE_METHOD_MATCHER), dynamic_mm);

        let class = Class::new("com.example.UserService").build();
        let method = Method::new(&class, "find");
        let args: Vec<AnyValue> = vec![Arc::new(7u32)];
        assert!(composed.matches_runtime(&method, &class, &args));
        assert!(!composed.matches_runtime(&method, &class, &[]));
        assert_eq!(dynamic_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_negate_runtime_matcher() {
        let dynamic_mm: Arc<dyn MethodMatcher> =
            Arc::new(DynamicMethodMatcher::new("args", |_, _, args| !args.is_empty()));
        let negated = method_matchers::negate(dynamic_mm);
        let class = Class::new("com.example.UserService").build();
        let method = Method::new(&class, "find");

        assert!(negated.matches(&method, &class));
        assert!(negated.matches_runtime(&method, &class, &[]));
        assert!(!negated.matches_runtime(&method, &class, &[Arc::new(1u8) as AnyValue]));
    }

    #[test]
    fn test_class_filter_composition() {
        let example: Arc<dyn ClassFilter> = Arc::new(TypePatternClassFilter::new("com.example..*").unwrap());
        let services: Arc<dyn ClassFilter> = Arc::new(TypePatternClassFilter::new("*Service").unwrap());
        let both = class_filters::intersection(Arc::clone(&example), Arc::clone(&services));
        let either = class_filters::union(Arc::clone(&example), Arc::clone(&services));
        let not_example = class_filters::negate(example);

        let audit = Class::new("com.example.sub.AuditService").build();
        let other = Class::new("org.other.UserService").build();
        let repo = Class::new("com.example.UserRepository").build();

        assert!(both.matches(&audit));
        assert!(!both.matches(&other));
        assert!(either.matches(&other));
        assert!(either.matches(&repo));
        assert!(not_example.matches(&other));
        assert!(!not_example.matches(&repo));
    }
}
