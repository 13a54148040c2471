//! 方法名匹配切点

use std::sync::Arc;

use super::{simple_match, ClassFilter, MethodMatcher, Pointcut, TRUE_CLASS_FILTER};
use crate::metadata::{Class, Method};

/// 按方法名通配符匹配（`get*`、`*User`、`*find*`）
#[derive(Debug, Clone, Default)]
pub struct NameMatchMethodMatcher {
    mapped_names: Vec<String>,
}

impl NameMatchMethodMatcher {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mapped_names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn mapped_names(&self) -> &[String] {
        &self.mapped_names
    }
}

impl MethodMatcher for NameMatchMethodMatcher {
    fn matches(&self, method: &Method, _target_class: &Class) -> bool {
        self.mapped_names
            .iter()
            .any(|name| name == method.name() || simple_match(name, method.name()))
    }
}

/// 方法名切点，默认匹配所有类型
#[derive(Debug, Clone)]
pub struct NameMatchMethodPointcut {
    matcher: Arc<NameMatchMethodMatcher>,
    class_filter: Arc<dyn ClassFilter>,
}

impl NameMatchMethodPointcut {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            matcher: Arc::new(NameMatchMethodMatcher::new(names)),
            class_filter: Arc::clone(&*TRUE_CLASS_FILTER),
        }
    }

    pub fn add_method_name(mut self, name: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.matcher).mapped_names.push(name.into());
        self
    }

    /// 替换全部方法名模式
    pub fn set_mapped_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.matcher = Arc::new(NameMatchMethodMatcher::new(names));
    }

    pub fn with_class_filter(mut self, class_filter: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = class_filter;
        self
    }

    pub fn mapped_names(&self) -> &[String] {
        self.matcher.mapped_names()
    }
}

impl Pointcut for NameMatchMethodPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::clone(&self.class_filter)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        self.matcher.clone()
    }
}
