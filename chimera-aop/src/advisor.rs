//! 顾问（Advisor）
//!
//! 顾问把一个通知和它的作用范围绑定在一起：
//! 普通顾问使用切点，引入顾问只使用类型过滤器，无条件顾问作用于一切方法。

use std::fmt;
use std::sync::Arc;

use crate::advice::Advice;
use crate::error::{AopError, AopResult};
use crate::introduction::{validate_introduction, IntroductionInfo, IntroductionInterceptor};
use crate::metadata::ClassRef;
use crate::pointcut::{ClassFilter, Pointcut, TRUE_CLASS_FILTER, TRUE_POINTCUT};

/// 顾问
pub trait Advisor: Send + Sync + fmt::Debug {
    fn advice(&self) -> &Advice;

    /// 是否每个代理实例各持一份通知
    fn is_per_instance(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        self.advice().name()
    }
}

/// 由切点驱动的顾问
pub trait PointcutAdvisor: Advisor {
    fn pointcut(&self) -> Arc<dyn Pointcut>;
}

/// 引入顾问
pub trait IntroductionAdvisor: Advisor + IntroductionInfo {
    fn class_filter(&self) -> Arc<dyn ClassFilter>;

    /// 校验引入通知是否实现了全部声明的接口
    ///
    /// 可以重复调用，结果不变，也不修改顾问。
    fn validate_interfaces(&self) -> AopResult<()>;
}

/// 顾问的封闭分类，链解析器据此决定如何筛选
#[derive(Clone)]
pub enum AdvisorKind {
    Pointcut(Arc<dyn PointcutAdvisor>),
    Introduction(Arc<dyn IntroductionAdvisor>),
    Unconditional(Arc<dyn Advisor>),
}

impl AdvisorKind {
    pub fn advice(&self) -> &Advice {
        match self {
            AdvisorKind::Pointcut(a) => a.advice(),
            AdvisorKind::Introduction(a) => a.advice(),
            AdvisorKind::Unconditional(a) => a.advice(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AdvisorKind::Pointcut(a) => a.name(),
            AdvisorKind::Introduction(a) => a.name(),
            AdvisorKind::Unconditional(a) => a.name(),
        }
    }

    pub fn as_introduction(&self) -> Option<&Arc<dyn IntroductionAdvisor>> {
        match self {
            AdvisorKind::Introduction(a) => Some(a),
            _ => None,
        }
    }

    /// 是否为同一个顾问实例
    pub fn ptr_eq(&self, other: &AdvisorKind) -> bool {
        fn addr<T: ?Sized>(arc: &Arc<T>) -> *const () {
            Arc::as_ptr(arc) as *const ()
        }
        match (self, other) {
            (AdvisorKind::Pointcut(a), AdvisorKind::Pointcut(b)) => addr(a) == addr(b),
            (AdvisorKind::Introduction(a), AdvisorKind::Introduction(b)) => addr(a) == addr(b),
            (AdvisorKind::Unconditional(a), AdvisorKind::Unconditional(b)) => addr(a) == addr(b),
            _ => false,
        }
    }
}

impl fmt::Debug for AdvisorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvisorKind::Pointcut(a) => write!(f, "Pointcut({:?})", a),
            AdvisorKind::Introduction(a) => write!(f, "Introduction({:?})", a),
            AdvisorKind::Unconditional(a) => write!(f, "Unconditional({:?})", a),
        }
    }
}

impl From<DefaultPointcutAdvisor> for AdvisorKind {
    fn from(advisor: DefaultPointcutAdvisor) -> Self {
        AdvisorKind::Pointcut(Arc::new(advisor))
    }
}

impl From<DefaultIntroductionAdvisor> for AdvisorKind {
    fn from(advisor: DefaultIntroductionAdvisor) -> Self {
        AdvisorKind::Introduction(Arc::new(advisor))
    }
}

/// 默认的切点顾问
#[derive(Clone)]
pub struct DefaultPointcutAdvisor {
    name: Option<String>,
    pointcut: Arc<dyn Pointcut>,
    advice: Advice,
}

impl DefaultPointcutAdvisor {
    pub fn new(pointcut: Arc<dyn Pointcut>, advice: Advice) -> Self {
        Self {
            name: None,
            pointcut,
            advice,
        }
    }

    /// 匹配所有方法的顾问
    pub fn unconditional(advice: Advice) -> Self {
        Self::new(Arc::clone(&*TRUE_POINTCUT), advice)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Advisor for DefaultPointcutAdvisor {
    fn advice(&self) -> &Advice {
        &self.advice
    }

    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.advice.name())
    }
}

impl PointcutAdvisor for DefaultPointcutAdvisor {
    fn pointcut(&self) -> Arc<dyn Pointcut> {
        Arc::clone(&self.pointcut)
    }
}

impl fmt::Debug for DefaultPointcutAdvisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultPointcutAdvisor")
            .field("name", &self.name())
            .field("pointcut", &self.pointcut)
            .field("advice", &self.advice)
            .finish()
    }
}

/// 默认的引入顾问
#[derive(Clone)]
pub struct DefaultIntroductionAdvisor {
    name: Option<String>,
    interceptor: Arc<dyn IntroductionInterceptor>,
    advice: Advice,
    interfaces: Vec<ClassRef>,
    class_filter: Arc<dyn ClassFilter>,
}

impl DefaultIntroductionAdvisor {
    /// 使用拦截器公布的接口创建顾问
    pub fn new(interceptor: Arc<dyn IntroductionInterceptor>) -> AopResult<Self> {
        let interfaces = interceptor.published_interfaces();
        Self::with_interfaces(interceptor, interfaces)
    }

    /// 显式声明引入的接口
    pub fn with_interfaces(
        interceptor: Arc<dyn IntroductionInterceptor>,
        interfaces: impl IntoIterator<Item = ClassRef>,
    ) -> AopResult<Self> {
        let mut advisor = Self {
            name: None,
            advice: Advice::Introduction(Arc::clone(&interceptor)),
            interceptor,
            interfaces: Vec::new(),
            class_filter: Arc::clone(&*TRUE_CLASS_FILTER),
        };
        for interface in interfaces {
            advisor.add_interface(interface)?;
        }
        Ok(advisor)
    }

    /// 增加一个引入接口，重复添加会被忽略
    pub fn add_interface(&mut self, interface: ClassRef) -> AopResult<()> {
        if !interface.is_interface() {
            return Err(AopError::NotAnInterface {
                class: interface.name().to_string(),
            });
        }
        if !self.interfaces.iter().any(|i| i.name() == interface.name()) {
            self.interfaces.push(interface);
        }
        Ok(())
    }

    /// 限定引入作用的目标类型
    pub fn with_class_filter(mut self, class_filter: Arc<dyn ClassFilter>) -> Self {
        self.class_filter = class_filter;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Advisor for DefaultIntroductionAdvisor {
    fn advice(&self) -> &Advice {
        &self.advice
    }

    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.interceptor.name())
    }
}

impl IntroductionInfo for DefaultIntroductionAdvisor {
    fn interfaces(&self) -> Vec<ClassRef> {
        self.interfaces.clone()
    }
}

impl IntroductionAdvisor for DefaultIntroductionAdvisor {
    fn class_filter(&self) -> Arc<dyn ClassFilter> {
        Arc::clone(&self.class_filter)
    }

    fn validate_interfaces(&self) -> AopResult<()> {
        validate_introduction(self.name(), &self.interfaces, self.interceptor.as_ref())
    }
}

impl fmt::Debug for DefaultIntroductionAdvisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interfaces: Vec<_> = self.interfaces.iter().map(|i| i.name()).collect();
        f.debug_struct("DefaultIntroductionAdvisor")
            .field("name", &self.name())
            .field("interfaces", &interfaces)
            .field("class_filter", &self.class_filter)
            .finish()
    }
}

/// 把裸通知包装为顾问
///
/// 普通通知成为无条件顾问，作用于所有类型的所有方法；引入通知必须公布至少一个接口。
pub fn wrap(advice: Advice) -> AopResult<AdvisorKind> {
    match advice {
        Advice::Introduction(interceptor) => {
            if interceptor.published_interfaces().is_empty() {
                return Err(AopError::IntroductionWithoutInterfaces {
                    advice: interceptor.name().to_string(),
                });
            }
            Ok(DefaultIntroductionAdvisor::new(interceptor)?.into())
        }
        other => Ok(AdvisorKind::Unconditional(Arc::new(DefaultPointcutAdvisor::unconditional(other)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::MethodBeforeAdvice;
    use crate::error::InvocationResult;
    use crate::introduction::DynamicIntroductionAdvice;
    use crate::joinpoint::ProxyMethodInvocation;
    use crate::metadata::{AnyValue, Class, Method};
    use crate::target::TargetRef;

    struct Noop;

    impl MethodBeforeAdvice for Noop {
        fn before(&self, _: &Method, _: &[AnyValue], _: Option<&TargetRef>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// 只实现了 Lockable 的引入
    struct LockMixin {
        publish: bool,
    }

    fn lockable() -> ClassRef {
        Class::interface("com.example.Lockable").build()
    }

    impl DynamicIntroductionAdvice for LockMixin {
        fn implements_interface(&self, interface: &crate::metadata::Class) -> bool {
            interface.name() == "com.example.Lockable"
        }
    }

    impl IntroductionInterceptor for LockMixin {
        fn invoke(&self, invocation: &mut dyn ProxyMethodInvocation) -> InvocationResult {
            invocation.proceed()
        }

        fn published_interfaces(&self) -> Vec<ClassRef> {
            if self.publish {
                vec![lockable()]
            } else {
                Vec::new()
            }
        }
    }

    #[test]
    fn test_validation_is_idempotent() {
        let other = Class::interface("com.example.Auditable").build();
        let advisor =
            DefaultIntroductionAdvisor::with_interfaces(Arc::new(LockMixin { publish: false }), [lockable(), other])
                .unwrap()
                .with_name("lockAdvisor");

        let first = advisor.validate_interfaces().unwrap_err().to_string();
        let second = advisor.validate_interfaces().unwrap_err().to_string();
        assert_eq!(first, second);
        assert!(first.contains("lockAdvisor"));
        assert!(first.contains("com.example.Auditable"));
        assert_eq!(advisor.interfaces().len(), 2);
    }

    #[test]
    fn test_duplicate_interfaces_are_ignored() {
        let advisor =
            DefaultIntroductionAdvisor::with_interfaces(Arc::new(LockMixin { publish: false }), [lockable(), lockable()])
                .unwrap();
        assert_eq!(advisor.interfaces().len(), 1);
        assert!(advisor.validate_interfaces().is_ok());
    }

    #[test]
    fn test_non_interface_is_rejected() {
        let concrete = Class::new("com.example.Lock").build();
        let err = DefaultIntroductionAdvisor::with_interfaces(Arc::new(LockMixin { publish: false }), [concrete])
            .unwrap_err();
        assert!(matches!(err, AopError::NotAnInterface { .. }));
    }

    #[test]
    fn test_wrap_plain_advice_is_unconditional() {
        let kind = wrap(Advice::before(Noop)).unwrap();
        match kind {
            AdvisorKind::Unconditional(advisor) => {
                assert_eq!(advisor.name(), "Noop");
                assert!(advisor.is_per_instance());
            }
            other => panic!("unexpected advisor kind: {:?}", other),
        }
    }

    #[test]
    fn test_valid_introduction_validates_repeatedly() {
        let advisor = DefaultIntroductionAdvisor::new(Arc::new(LockMixin { publish: true })).unwrap();
        assert_eq!(advisor.interfaces().len(), 1);

        assert!(advisor.validate_interfaces().is_ok());
        assert!(advisor.validate_interfaces().is_ok());
        assert_eq!(advisor.interfaces().len(), 1);
        assert_eq!(advisor.interfaces()[0].name(), "com.example.Lockable");
    }

    #[test]
    fn test_wrap_introduction_requires_interfaces() {
        let err = wrap(Advice::introduction(LockMixin { publish: false })).unwrap_err();
        assert!(matches!(err, AopError::IntroductionWithoutInterfaces { .. }));

        let kind = wrap(Advice::introduction(LockMixin { publish: true })).unwrap();
        let intro = kind.as_introduction().unwrap();
        assert_eq!(intro.interfaces()[0].name(), "com.example.Lockable");
    }
}
