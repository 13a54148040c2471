//! 正则表达式切点
//!
//! 以 `<类型全限定名>.<方法名>` 作为匹配文本，目标类型和声明类型任一命中即可。

use std::sync::Arc;

use regex::Regex;

use super::{ClassFilter, MethodMatcher, Pointcut, TRUE_CLASS_FILTER};
use crate::error::{AopError, AopResult};
use crate::metadata::{Class, Method};

fn compile_all(patterns: &[&str]) -> AopResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("^(?:{})$", p)).map_err(|source| AopError::InvalidPattern {
                pattern: (*p).to_string(),
                source,
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct RegexpMethodMatcher {
    patterns: Vec<Regex>,
    excluded: Vec<Regex>,
}

impl RegexpMethodMatcher {
    pub fn new(patterns: &[&str]) -> AopResult<Self> {
        Ok(Self {
            patterns: compile_all(patterns)?,
            excluded: Vec::new(),
        })
    }

    /// 命中排除模式的方法即使匹配包含模式也会被排除
    pub fn with_exclusions(mut self, patterns: &[&str]) -> AopResult<Self> {
        self.excluded = compile_all(patterns)?;
        Ok(self)
    }

    fn matches_text(&self, text: &str) -> bool {
        self.patterns.iter().any(|r| r.is_match(text)) && !self.excluded.iter().any(|r| r.is_match(text))
    }
}

impl MethodMatcher for RegexpMethodMatcher {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        let target_text = format!("{}.{}", target_class.name(), method.name());
        if self.matches_text(&target_text) {
            return true;
        }
        let declaring = method.declaring_class();
        declaring.name() != target_class.name()
            && self.matches_text(&format!("{}.{}", declaring.name(), method.name()))
    }
}

#[derive(Debug, Clone)]
pub struct RegexpMethodPointcut {
    matcher: Arc<RegexpMethodMatcher>,
}

impl RegexpMethodPointcut {
    pub fn new(patterns: &[&str]) -> AopResult<Self> {
        Ok(Self {
            matcher: Arc::new(RegexpMethodMatcher::new(patterns)?),
        })
    }

    pub fn with_exclusions(patterns: &[&str], exclusions: &[&str]) -> AopResult<Self> {
        Ok(Self {
            matcher: Arc::new(RegexpMethodMatcher::new(patterns)?.with_exclusions(exclusions)?),
        })
    }
}

impl Pointcut for RegexpMethodPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::clone(&*TRUE_CLASS_FILTER)
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        self.matcher.clone()
    }
}
