//! 切点表达式
//!
//! 支持的语法：
//!
//! ```text
//! execution(<返回类型> <类型模式>.<方法名模式>(<参数模式>))
//! within(<类型模式>)
//! @annotation(<方法注解>)
//! @within(<类型注解>)
//! ```
//!
//! 各项可以用 `&&` / `and`、`||` / `or`、`!` / `not` 以及括号组合。
//! 参数模式中 `..` 匹配任意个参数，`*` 匹配恰好一个参数。
//! 表达式在构造时解析，语法错误属于配置错误。

use std::fmt;
use std::sync::Arc;

use super::{simple_match, ClassFilter, MethodMatcher, Pointcut, TypePattern};
use crate::error::{AopError, AopResult};
use crate::metadata::{Class, Method};

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParamToken {
    /// `*`
    AnyOne,
    /// `..`
    AnyMany,
    Named(String),
}

fn params_match(tokens: &[ParamToken], types: &[String]) -> bool {
    match tokens.split_first() {
        None => types.is_empty(),
        Some((ParamToken::AnyMany, rest)) => (0..=types.len()).any(|skip| params_match(rest, &types[skip..])),
        Some((token, rest)) => {
            let Some((first, others)) = types.split_first() else {
                return false;
            };
            let head_ok = match token {
                ParamToken::AnyOne => true,
                ParamToken::Named(pattern) => simple_match(pattern, first),
                ParamToken::AnyMany => unreachable!(),
            };
            head_ok && params_match(rest, others)
        }
    }
}

#[derive(Clone)]
struct ExecutionPattern {
    return_type: String,
    declaring_type: Option<TypePattern>,
    name: String,
    params: Vec<ParamToken>,
}

impl ExecutionPattern {
    fn matches(&self, method: &Method, class: &Class) -> bool {
        if !simple_match(&self.name, method.name()) {
            return false;
        }
        if !simple_match(&self.return_type, method.return_type()) {
            return false;
        }
        if !params_match(&self.params, method.parameter_types()) {
            return false;
        }
        match &self.declaring_type {
            None => true,
            Some(pattern) => {
                pattern.matches(class)
                    || pattern.matches(method.declaring_class())
                    || class.all_supertypes().iter().any(|t| pattern.matches(t))
            }
        }
    }

    /// 类型层面能否排除：类型模式与目标类型及其父类型都不匹配时一定不匹配
    fn class_verdict(&self, class: &Class) -> Option<bool> {
        match &self.declaring_type {
            Some(pattern)
                if !pattern.matches(class) && !class.all_supertypes().iter().any(|t| pattern.matches(t)) =>
            {
                Some(false)
            }
            _ => None,
        }
    }
}

#[derive(Clone)]
enum Expr {
    Execution(ExecutionPattern),
    Within(TypePattern),
    Annotation(String),
    WithinAnnotation(String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    fn matches(&self, method: &Method, class: &Class) -> bool {
        match self {
            Expr::Execution(pattern) => pattern.matches(method, class),
            Expr::Within(pattern) => pattern.matches(class),
            Expr::Annotation(annotation) => method.has_annotation(annotation),
            Expr::WithinAnnotation(annotation) => class.has_annotation(annotation),
            Expr::And(left, right) => left.matches(method, class) && right.matches(method, class),
            Expr::Or(left, right) => left.matches(method, class) || right.matches(method, class),
            Expr::Not(inner) => !inner.matches(method, class),
        }
    }

    /// 三值判断：`None` 表示需要看具体方法才能确定
    fn class_verdict(&self, class: &Class) -> Option<bool> {
        match self {
            Expr::Execution(pattern) => pattern.class_verdict(class),
            Expr::Within(pattern) => Some(pattern.matches(class)),
            Expr::Annotation(_) => None,
            Expr::WithinAnnotation(annotation) => Some(class.has_annotation(annotation)),
            Expr::And(left, right) => match (left.class_verdict(class), right.class_verdict(class)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Expr::Or(left, right) => match (left.class_verdict(class), right.class_verdict(class)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Expr::Not(inner) => inner.class_verdict(class).map(|v| !v),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Execution(p) => {
                let type_part = p.declaring_type.as_ref().map_or("*", |t| t.as_str());
                write!(f, "Execution({} {}.{}({:?}))", p.return_type, type_part, p.name, p.params)
            }
            Expr::Within(p) => write!(f, "Within({})", p.as_str()),
            Expr::Annotation(a) => write!(f, "Annotation({})", a),
            Expr::WithinAnnotation(a) => write!(f, "WithinAnnotation({})", a),
            Expr::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            Expr::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            Expr::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

/// 递归下降解析器
struct Parser<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    fn error(&self, position: usize, reason: impl Into<String>) -> AopError {
        AopError::InvalidPointcutExpression {
            expression: self.source.to_string(),
            position,
            reason: reason.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.source.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    /// 关键字后面必须是空白或括号，避免把 `notify` 当作 `not`
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        let rest = self.rest();
        if !rest.starts_with(keyword) {
            return false;
        }
        match rest[keyword.len()..].chars().next() {
            Some(c) if c.is_whitespace() || c == '(' => {
                self.pos += keyword.len();
                true
            }
            _ => false,
        }
    }

    fn parse(mut self) -> AopResult<Expr> {
        self.skip_whitespace();
        if self.rest().is_empty() {
            return Err(self.error(0, "pointcut expression must not be empty"));
        }
        let expr = self.parse_or()?;
        self.skip_whitespace();
        if !self.rest().is_empty() {
            return Err(self.error(self.pos, "unexpected trailing input"));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> AopResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat("||") || self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> AopResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat("&&") || self.eat_keyword("and") {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> AopResult<Expr> {
        if self.eat("!") || self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> AopResult<Expr> {
        if self.eat("(") {
            let expr = self.parse_or()?;
            if !self.eat(")") {
                return Err(self.error(self.pos, "expected ')'"));
            }
            return Ok(expr);
        }

        self.skip_whitespace();
        let source = self.source;
        let start = self.pos;
        let name_len = self
            .rest()
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '@'))
            .unwrap_or(self.rest().len());
        if name_len == 0 {
            return Err(self.error(start, "expected a pointcut designator"));
        }
        let designator = &source[start..start + name_len];
        self.pos += name_len;

        if !self.eat("(") {
            return Err(self.error(self.pos, format!("expected '(' after '{}'", designator)));
        }
        let body_start = self.pos;
        let body = self.take_balanced_body()?;

        match designator {
            "execution" => self.parse_execution(body, body_start).map(Expr::Execution),
            "within" => TypePattern::new(body)
                .map(Expr::Within)
                .map_err(|e| self.error(body_start, e.to_string())),
            "@annotation" => self.parse_annotation(body, body_start).map(Expr::Annotation),
            "@within" => self.parse_annotation(body, body_start).map(Expr::WithinAnnotation),
            other => Err(self.error(start, format!("unsupported pointcut designator '{}'", other))),
        }
    }

    /// 读取到与已消费的 `(` 配对的 `)` 为止，返回其中内容
    fn take_balanced_body(&mut self) -> AopResult<&'a str> {
        let source = self.source;
        let start = self.pos;
        let mut depth = 1usize;
        for (offset, c) in source[start..].char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let body = &source[start..start + offset];
                        self.pos = start + offset + 1;
                        return Ok(body);
                    }
                }
                _ => {}
            }
        }
        Err(self.error(start, "unbalanced parentheses"))
    }

    fn parse_annotation(&self, body: &str, offset: usize) -> AopResult<String> {
        let name = body.trim().trim_start_matches('@');
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
            return Err(self.error(offset, format!("invalid annotation name '{}'", body.trim())));
        }
        Ok(name.to_string())
    }

    fn parse_execution(&self, body: &str, offset: usize) -> AopResult<ExecutionPattern> {
        let body = body.trim();
        let usage = "expected '<return-type> <type>.<method>(<params>)'";

        let (Some(open), true) = (body.find('('), body.ends_with(')')) else {
            return Err(self.error(offset, format!("missing parameter list, {}", usage)));
        };
        let head = body[..open].trim();
        let params_src = body[open + 1..body.len() - 1].trim();

        let parts: Vec<&str> = head.split_whitespace().collect();
        let [return_type, qualified] = parts.as_slice() else {
            return Err(self.error(offset, usage));
        };

        let (declaring_type, name) = match qualified.rsplit_once('.') {
            Some((type_part, name)) => {
                let declaring = if type_part == "*" {
                    None
                } else {
                    Some(TypePattern::new(type_part).map_err(|e| self.error(offset, e.to_string()))?)
                };
                (declaring, name)
            }
            None => (None, *qualified),
        };
        if name.is_empty() {
            return Err(self.error(offset, format!("missing method name, {}", usage)));
        }

        let params = if params_src.is_empty() {
            Vec::new()
        } else {
            params_src
                .split(',')
                .map(|p| match p.trim() {
                    ".." => Ok(ParamToken::AnyMany),
                    "*" => Ok(ParamToken::AnyOne),
                    "" => Err(self.error(offset, "empty parameter pattern")),
                    other => Ok(ParamToken::Named(other.to_string())),
                })
                .collect::<AopResult<Vec<_>>>()?
        };

        Ok(ExecutionPattern {
            return_type: (*return_type).to_string(),
            declaring_type,
            name: name.to_string(),
            params,
        })
    }
}

/// 已解析的表达式，同时充当类型过滤器和方法匹配器
struct ExpressionMatcher {
    source: String,
    expr: Expr,
}

impl fmt::Debug for ExpressionMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpressionMatcher({}: {:?})", self.source, self.expr)
    }
}

impl ClassFilter for ExpressionMatcher {
    fn matches(&self, class: &Class) -> bool {
        self.expr.class_verdict(class) != Some(false)
    }
}

impl MethodMatcher for ExpressionMatcher {
    fn matches(&self, method: &Method, target_class: &Class) -> bool {
        self.expr.matches(method, target_class)
    }
}

/// 表达式切点
///
/// 使用示例：
/// ```
/// use chimera_aop::pointcut::{ExpressionPointcut, Pointcut};
/// use chimera_aop::metadata::{Class, Method};
///
/// let pointcut = ExpressionPointcut::parse("execution(* UserService.get_*(..)) && !@annotation(Internal)").unwrap();
/// let class = Class::new("com.example.UserService").build();
/// let method = Method::new(&class, "get_user").params(["u32"]);
/// assert!(pointcut.method_matcher().matches(&method, &class));
/// ```
#[derive(Clone)]
pub struct ExpressionPointcut {
    matcher: Arc<ExpressionMatcher>,
}

impl ExpressionPointcut {
    pub fn parse(expression: &str) -> AopResult<Self> {
        let expr = Parser::new(expression).parse()?;
        tracing::trace!("Parsed pointcut expression '{}' into {:?}", expression, expr);
        Ok(Self {
            matcher: Arc::new(ExpressionMatcher {
                source: expression.to_string(),
                expr,
            }),
        })
    }

    pub fn expression(&self) -> &str {
        &self.matcher.source
    }
}

impl fmt::Debug for ExpressionPointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExpressionPointcut({})", self.matcher.source)
    }
}

impl Pointcut for ExpressionPointcut {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        self.matcher.clone()
    }

    fn method_matcher(&self) -> Arc<dyn MethodMatcher> {
        self.matcher.clone()
    }
}
