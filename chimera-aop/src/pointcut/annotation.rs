//! 基于注解的匹配

use std::sync::Arc;

use super::{ClassFilter, MethodMatcher, Pointcut, TRUE_CLASS_FILTER, TRUE_METHOD_MATCHER};
use crate::metadata::{Class, Method};

/// 按类型注解过滤
#[derive(Debug, Clone)]
pub struct AnnotationClassFilter {
    annotation: String,
    check_inherited: bool,
}

impl AnnotationClassFilter {
    pub fn new(annotation: impl Into<String>) -> Self {
        Self {
            annotation: annotation.into(),
            check_inherited: false,
        }
    }

    /// 同时检查父类型和接口上的注解
    pub fn inherited(mut self) -> Self {
        self.check_inherited = true;
        self
    }
}

impl ClassFilter for AnnotationClassFilter {
    fn matches(&self, class: &Class) -> bool {
        class.has_annotation(&self.annotation)
            || (self.check_inherited
                && class
                    .all_supertypes()
                    .iter()
                    .any(|t| t.has_annotation(&self.annotation)))
    }
}

/// 按方法注解匹配
#[derive(Debug, Clone)]
pub struct AnnotationMethodMatcher {
    annotation: String,
}

impl AnnotationMethodMatcher {
    pub fn new(annotation: impl Into<String>) -> Self {
        Self {
            annotation: annotation.into(),
        }
    }
}

impl MethodMatcher for AnnotationMethodMatcher {
    fn matches(&self, method: &Method, _target_class: &Class) -> bool {
        method.has_annotation(&self.annotation)
    }
}

/// 注解切点：类型注解和 / 或方法注解
#[derive(Debug, Clone)]
pub struct AnnotationMatchingPointcut {
    class_filter: Arc<dyn ClassFilter>,
    method_matcher: Arc<dyn MethodMatcher>,
}

impl AnnotationMatchingPointcut {
    /// 两个注解都给出时需要同时满足
    pub fn new(class_annotation: Option<&str>, method_annotation: Option<&str>) -> Self {
        let class_filter: Arc<dyn ClassFilter> = match class_annotation {
            Some(a) => Arc::new(AnnotationClassFilter::new(a)),
            None => Arc::clone(&*TRUE_CLASS_FILTER),
        };
        let method_matcher: Arc<dyn MethodMatcher> = match method_annotation {
            Some(a) => Arc::new(AnnotationMethodMatcher::new(a)),
            None => Arc::clone(&*TRUE_METHOD_MATCHER),
        };
        Self {
            class_filter,
            method_matcher,
        }
    }

    pub fn for_class_annotation(annotation: &str) -> Self {
        Self::new(Some(annotation), None)
    }

    pub fn for_method_annotation(annotation: &str) -> Self {
        Self::new(None, Some(annotation))
    }
}

impl Pointcut for AnnotationMatchingPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::clone(&self.class_filter)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        Arc::clone(&self.method_matcher)
    }
}
