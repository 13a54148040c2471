//! 名称模式匹配
//!
//! - [`simple_match`]：只支持 `*` 通配符，用于方法名、返回类型、参数类型
//! - [`TypePattern`]：类型模式，`*` 不跨越包分隔符，`..` 匹配任意层子包

use std::fmt;

use regex::Regex;

use super::ClassFilter;
use crate::error::{AopError, AopResult};
use crate::metadata::Class;

/// 简单的通配符匹配（支持 `*`）
///
/// 支持的模式：
/// - `*` - 匹配任意字符串
/// - `get*` - 以 get 开头
/// - `*Service` - 以 Service 结尾
/// - `*find*` - 包含 find
pub fn simple_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let Some(first) = pattern.find('*') else {
        return pattern == text;
    };

    let (prefix, rest) = pattern.split_at(first);
    let Some(mut remaining) = text.strip_prefix(prefix) else {
        return false;
    };

    let segments: Vec<&str> = rest.split('*').filter(|s| !s.is_empty()).collect();
    let ends_with_star = rest.ends_with('*');

    for (i, segment) in segments.iter().enumerate() {
        let is_last = i + 1 == segments.len();
        if is_last && !ends_with_star {
            return remaining.len() >= segment.len() && remaining.ends_with(segment);
        }
        match remaining.find(segment) {
            Some(pos) => remaining = &remaining[pos + segment.len()..],
            None => return false,
        }
    }
    true
}

/// 类型模式
///
/// - `com.example.*`：`com.example` 包下的直接类型
/// - `com.example..*`：`com.example` 包及其所有子包中的类型
/// - `*Service`：不含 `.` 的模式按简单类名匹配
#[derive(Clone)]
pub struct TypePattern {
    source: String,
    regex: Regex,
    qualified: bool,
}

impl TypePattern {
    pub fn new(pattern: &str) -> AopResult<Self> {
        let pattern = pattern.trim();
        let invalid = |position: usize, reason: &str| AopError::InvalidPointcutExpression {
            expression: pattern.to_string(),
            position,
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid(0, "type pattern must not be empty"));
        }

        let mut regex = String::from("^");
        let chars: Vec<char> = pattern.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '.' if chars.get(i + 1) == Some(&'.') => {
                    regex.push_str(r"\.(?:[^.]+\.)*");
                    i += 2;
                    continue;
                }
                '.' => regex.push_str(r"\."),
                '*' => regex.push_str("[^.]*"),
                c if c.is_alphanumeric() || c == '_' || c == '$' => regex.push(c),
                c => return Err(invalid(i, &format!("unexpected character '{}' in type pattern", c))),
            }
            i += 1;
        }
        regex.push('$');

        let regex = Regex::new(&regex).map_err(|source| AopError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            qualified: pattern.contains('.'),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// 按类型名匹配
    pub fn matches_name(&self, qualified_name: &str) -> bool {
        if self.qualified {
            self.regex.is_match(qualified_name)
        } else {
            let simple = qualified_name.rsplit('.').next().unwrap_or(qualified_name);
            self.regex.is_match(simple)
        }
    }

    pub fn matches(&self, class: &Class) -> bool {
        self.matches_name(class.name())
    }
}

impl fmt::Debug for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypePattern({})", self.source)
    }
}

/// 基于类型模式的类型过滤器
#[derive(Debug, Clone)]
pub struct TypePatternClassFilter {
    pattern: TypePattern,
    include_supertypes: bool,
}

impl TypePatternClassFilter {
    pub fn new(pattern: &str) -> AopResult<Self> {
        Ok(Self {
            pattern: TypePattern::new(pattern)?,
            include_supertypes: false,
        })
    }

    /// 目标类型的任一父类型匹配时也算匹配
    pub fn include_supertypes(mut self) -> Self {
        self.include_supertypes = true;
        self
    }

    pub fn pattern(&self) -> &TypePattern {
        &self.pattern
    }
}

impl ClassFilter for TypePatternClassFilter {
    fn matches(&self, class: &Class) -> bool {
        self.pattern.matches(class)
            || (self.include_supertypes
                && class.all_supertypes().iter().any(|t| self.pattern.matches(t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_match() {
        assert!(simple_match("*", "anything"));
        assert!(simple_match("get*", "get_user"));
        assert!(simple_match("*User", "find_user_or_User"));
        assert!(simple_match("*find*", "try_find_all"));
        assert!(simple_match("set*Name", "set_user_Name"));
        assert!(simple_match("save", "save"));
        assert!(!simple_match("save", "save_all"));
        assert!(!simple_match("get*", "find"));
        assert!(!simple_match("a*bb", "ab"));
    }

    #[test]
    fn test_package_patterns() {
        let direct = TypePattern::new("com.example.*").unwrap();
        assert!(direct.matches_name("com.example.UserService"));
        assert!(!direct.matches_name("com.example.sub.UserService"));
        assert!(!direct.matches_name("org.example.UserService"));

        let deep = TypePattern::new("com.example..*").unwrap();
        assert!(deep.matches_name("com.example.UserService"));
        assert!(deep.matches_name("com.example.sub.deeper.UserService"));
        assert!(!deep.matches_name("com.examples.UserService"));
    }

    #[test]
    fn test_unqualified_pattern_matches_simple_name() {
        let pattern = TypePattern::new("*Service").unwrap();
        assert!(pattern.matches_name("com.example.UserService"));
        assert!(pattern.matches_name("OrderService"));
        assert!(!pattern.matches_name("com.example.UserController"));
    }

    #[test]
    fn test_invalid_type_patterns() {
        assert!(TypePattern::new("").is_err());
        assert!(TypePattern::new("com.example.(Foo)").is_err());
    }

    #[test]
    fn test_class_filter_with_supertypes() {
        let api = Class::interface("com.example.api.Users").build();
        let impl_class = Class::new("com.other.UsersImpl").implements(&api).build();

        let plain = TypePatternClassFilter::new("com.example..*").unwrap();
        assert!(!plain.matches(&impl_class));
        assert!(plain.include_supertypes().matches(&impl_class));
    }
}
