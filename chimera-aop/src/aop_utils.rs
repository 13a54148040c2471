//! 代理前的适用性判断
//!
//! 创建代理之前判断某个类型是否需要被代理：只要有一个顾问可能作用于它的某个方法即可。

use crate::advisor::AdvisorKind;
use crate::metadata::{Class, Method};
use crate::pointcut::Pointcut;

/// 切点能否作用于该类型的任一方法（只做静态匹配）
pub fn can_apply(pointcut: &dyn Pointcut, class: &Class, methods: &[Method]) -> bool {
    if !pointcut.class_filter().matches(class) {
        return false;
    }
    let matcher = pointcut.method_matcher();
    methods.iter().any(|method| matcher.matches(method, class))
}

/// 顾问能否作用于该类型
pub fn can_apply_advisor(advisor: &AdvisorKind, class: &Class, methods: &[Method]) -> bool {
    match advisor {
        AdvisorKind::Pointcut(pa) => can_apply(pa.pointcut().as_ref(), class, methods),
        AdvisorKind::Introduction(ia) => ia.class_filter().matches(class),
        AdvisorKind::Unconditional(_) => true,
    }
}

/// 筛选出可能作用于该类型的顾问，保持原有顺序
pub fn find_advisors_that_can_apply(advisors: &[AdvisorKind], class: &Class, methods: &[Method]) -> Vec<AdvisorKind> {
    let eligible: Vec<_> = advisors
        .iter()
        .filter(|advisor| can_apply_advisor(advisor, class, methods))
        .cloned()
        .collect();
    tracing::trace!(
        "{} of {} advisor(s) can apply to {}",
        eligible.len(),
        advisors.len(),
        class
    );
    eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{Advice, MethodBeforeAdvice};
    use crate::advisor::DefaultPointcutAdvisor;
    use crate::metadata::{AnyValue, ClassRef};
    use crate::pointcut::{ExpressionPointcut, NameMatchMethodPointcut};
    use crate::target::TargetRef;
    use std::sync::Arc;

    struct Noop;

    impl MethodBeforeAdvice for Noop {
        fn before(&self, _: &Method, _: &[AnyValue], _: Option<&TargetRef>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn repository() -> (ClassRef, Vec<Method>) {
        let class = Class::new("com.example.repo.UserRepository").build();
        let methods = vec![Method::new(&class, "findById"), Method::new(&class, "save")];
        (class, methods)
    }

    #[test]
    fn test_can_apply_needs_class_and_some_method() {
        let (class, methods) = repository();
        let in_repo = ExpressionPointcut::parse("within(com.example.repo.*)").unwrap();
        let in_web = ExpressionPointcut::parse("within(com.example.web.*)").unwrap();
        let deletes = NameMatchMethodPointcut::new(["delete*"]);

        assert!(can_apply(&in_repo, &class, &methods));
        assert!(!can_apply(&in_web, &class, &methods));
        assert!(!can_apply(&deletes, &class, &methods));
    }

    #[test]
    fn test_find_advisors_preserves_order() {
        let (class, methods) = repository();
        let advisors: Vec<AdvisorKind> = vec![
            DefaultPointcutAdvisor::new(Arc::new(NameMatchMethodPointcut::new(["save"])), Advice::before(Noop))
                .with_name("save")
                .into(),
            DefaultPointcutAdvisor::new(Arc::new(NameMatchMethodPointcut::new(["delete"])), Advice::before(Noop))
                .with_name("delete")
                .into(),
            AdvisorKind::Unconditional(Arc::new(
                DefaultPointcutAdvisor::unconditional(Advice::before(Noop)).with_name("all"),
            )),
        ];

        let names: Vec<_> = find_advisors_that_can_apply(&advisors, &class, &methods)
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(names, ["save", "all"]);
    }

    #[test]
    fn test_unconditional_advisor_applies_without_methods() {
        let (class, _) = repository();
        let advisor = crate::advisor::wrap(Advice::before(Noop)).unwrap();
        assert!(matches!(advisor, AdvisorKind::Unconditional(_)));
        assert!(can_apply_advisor(&advisor, &class, &[]));
    }
}
