//! 代理配置持有者
//!
//! [`AdvisedSupport`] 保存目标源、顾问列表和代理接口。顾问列表以不可变快照发布：
//! 每次修改都会生成新快照并整体替换，调用在入口处取得一个快照，不会看到修改的中间状态。
//! 链缓存属于快照，快照被替换时缓存随之丢弃。
//!
//! 读路径不加锁：快照和链缓存都放在 `ArcSwap` 中，写入方复制后整体替换。
//! 快照的发布由一把互斥锁串行化，修改总是基于最新快照进行。

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};

use crate::advice::Advice;
use crate::advisor::{self, AdvisorKind};
use crate::chain::{AdvisorChainFactory, ChainElement, DefaultAdvisorChainFactory, MethodCacheKey};
use crate::config::ProxyConfig;
use crate::error::{AopError, AopResult};
use crate::metadata::{Class, ClassRef, Method};
use crate::registry;
use crate::target::{EmptyTargetSource, SingletonTargetSource, TargetRef, TargetSource};

type ChainCache = HashMap<MethodCacheKey, Arc<[ChainElement]>>;

/// 顾问快照
pub(crate) struct AdvisorSnapshot {
    advisors: Arc<[AdvisorKind]>,
    interfaces: Arc<[ClassRef]>,
    cache: ArcSwap<ChainCache>,
}

impl AdvisorSnapshot {
    fn new(advisors: Vec<AdvisorKind>, interfaces: Vec<ClassRef>) -> Self {
        Self {
            advisors: advisors.into(),
            interfaces: interfaces.into(),
            cache: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub(crate) fn advisors(&self) -> &Arc<[AdvisorKind]> {
        &self.advisors
    }
}

/// AOP 代理配置
pub struct AdvisedSupport {
    config: ProxyConfig,
    frozen: AtomicBool,
    target_source: RwLock<Arc<dyn TargetSource>>,
    state: ArcSwap<AdvisorSnapshot>,
    publish_lock: Mutex<()>,
    chain_factory: Arc<dyn AdvisorChainFactory>,
}

impl AdvisedSupport {
    pub fn new(target_source: Arc<dyn TargetSource>, config: ProxyConfig) -> Self {
        Self {
            frozen: AtomicBool::new(false),
            config,
            target_source: RwLock::new(target_source),
            state: ArcSwap::from_pointee(AdvisorSnapshot::new(Vec::new(), Vec::new())),
            publish_lock: Mutex::new(()),
            chain_factory: Arc::new(DefaultAdvisorChainFactory),
        }
    }

    /// 以单个目标对象创建
    pub fn for_target(target: TargetRef) -> Self {
        Self::new(Arc::new(SingletonTargetSource::new(target)), ProxyConfig::default())
    }

    /// 没有目标对象的配置，只代理接口
    pub fn for_interfaces() -> Self {
        Self::new(Arc::new(EmptyTargetSource::new()), ProxyConfig::default())
    }

    pub fn with_chain_factory(mut self, factory: Arc<dyn AdvisorChainFactory>) -> Self {
        self.chain_factory = factory;
        self
    }

    /// 当前配置，`frozen` 反映实时状态
    pub fn config(&self) -> ProxyConfig {
        ProxyConfig {
            frozen: self.is_frozen(),
            ..self.config
        }
    }

    /// 配置要求在创建代理时冻结
    pub(crate) fn config_requests_freeze(&self) -> bool {
        self.config.frozen
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// 冻结配置，之后的任何修改都会失败
    pub fn freeze(&self) {
        let _publishing = self.publish_lock.lock();
        self.frozen.store(true, Ordering::Release);
        tracing::debug!("Proxy configuration frozen");
    }

    fn check_frozen(&self) -> AopResult<()> {
        if self.is_frozen() {
            return Err(AopError::ConfigurationFrozen);
        }
        Ok(())
    }

    pub fn target_source(&self) -> Arc<dyn TargetSource> {
        Arc::clone(&*self.target_source.read())
    }

    pub fn set_target_source(&self, target_source: Arc<dyn TargetSource>) -> AopResult<()> {
        self.check_frozen()?;
        tracing::debug!("Target source replaced by {:?}", target_source);
        *self.target_source.write() = target_source;
        Ok(())
    }

    pub fn target_class(&self) -> Option<ClassRef> {
        self.target_source.read().target_class()
    }

    pub(crate) fn snapshot(&self) -> Arc<AdvisorSnapshot> {
        self.state.load_full()
    }

    /// 以新快照替换当前快照
    fn publish<F>(&self, update: F) -> AopResult<()>
    where
        F: FnOnce(&mut Vec<AdvisorKind>, &mut Vec<ClassRef>) -> AopResult<()>,
    {
        let _publishing = self.publish_lock.lock();
        self.check_frozen()?;
        let current = self.state.load();
        let mut advisors = current.advisors.to_vec();
        let mut interfaces = current.interfaces.to_vec();
        update(&mut advisors, &mut interfaces)?;
        tracing::debug!(
            "Publishing advisor snapshot: {} advisor(s), {} interface(s)",
            advisors.len(),
            interfaces.len()
        );
        self.state.store(Arc::new(AdvisorSnapshot::new(advisors, interfaces)));
        Ok(())
    }

    /// 当前顾问列表（按配置顺序）
    pub fn advisors(&self) -> Arc<[AdvisorKind]> {
        Arc::clone(&self.snapshot().advisors)
    }

    pub fn advisor_count(&self) -> usize {
        self.snapshot().advisors.len()
    }

    /// 追加顾问
    pub fn add_advisor(&self, advisor: impl Into<AdvisorKind>) -> AopResult<()> {
        self.insert_advisor(None, advisor.into())
    }

    /// 在指定位置插入顾问
    ///
    /// 引入顾问在此处校验，失败时配置保持不变。
    pub fn add_advisor_at(&self, position: usize, advisor: impl Into<AdvisorKind>) -> AopResult<()> {
        self.insert_advisor(Some(position), advisor.into())
    }

    /// `None` 表示追加到末尾，末尾位置在发布锁内确定
    fn insert_advisor(&self, position: Option<usize>, advisor: AdvisorKind) -> AopResult<()> {
        if let Some(introduction) = advisor.as_introduction() {
            introduction.validate_interfaces()?;
        }
        self.publish(|advisors, interfaces| {
            let position = position.unwrap_or(advisors.len());
            if position > advisors.len() {
                return Err(AopError::AdvisorIndexOutOfBounds {
                    index: position,
                    len: advisors.len(),
                });
            }
            if let Some(introduction) = advisor.as_introduction() {
                for interface in introduction.interfaces() {
                    if !interfaces.iter().any(|i| i.name() == interface.name()) {
                        interfaces.push(interface);
                    }
                }
            }
            tracing::debug!("Adding advisor {} at position {}", advisor.name(), position);
            advisors.insert(position, advisor);
            Ok(())
        })
    }

    /// 把通知包装为顾问后追加
    pub fn add_advice(&self, advice: Advice) -> AopResult<()> {
        self.add_advisor(advisor::wrap(advice)?)
    }

    /// 追加所有通过 `inventory` 注册的顾问，返回追加数量
    pub fn add_registered_advisors(&self) -> AopResult<usize> {
        let registered = registry::registered_advisors();
        let count = registered.len();
        for advisor in registered {
            self.add_advisor(advisor)?;
        }
        Ok(count)
    }

    pub fn index_of(&self, advisor: &AdvisorKind) -> Option<usize> {
        self.snapshot().advisors.iter().position(|a| a.ptr_eq(advisor))
    }

    pub fn index_of_advice(&self, advice: &Advice) -> Option<usize> {
        self.snapshot()
            .advisors
            .iter()
            .position(|a| a.advice().ptr_eq(advice))
    }

    /// 移除顾问，返回是否找到
    pub fn remove_advisor(&self, advisor: &AdvisorKind) -> AopResult<bool> {
        match self.index_of(advisor) {
            Some(index) => self.remove_advisor_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    /// 按位置移除顾问
    ///
    /// 移除引入顾问时，它贡献的接口也一并从代理接口中移除。
    pub fn remove_advisor_at(&self, index: usize) -> AopResult<AdvisorKind> {
        let mut removed = None;
        self.publish(|advisors, interfaces| {
            if index >= advisors.len() {
                return Err(AopError::AdvisorIndexOutOfBounds {
                    index,
                    len: advisors.len(),
                });
            }
            let advisor = advisors.remove(index);
            if let Some(introduction) = advisor.as_introduction() {
                let introduced = introduction.interfaces();
                interfaces.retain(|i| !introduced.iter().any(|r| r.name() == i.name()));
            }
            tracing::debug!("Removed advisor {} from position {}", advisor.name(), index);
            removed = Some(advisor);
            Ok(())
        })?;
        removed.ok_or(AopError::AdvisorIndexOutOfBounds { index, len: 0 })
    }

    /// 增加代理接口
    pub fn add_interface(&self, interface: ClassRef) -> AopResult<()> {
        if !interface.is_interface() {
            return Err(AopError::NotAnInterface {
                class: interface.name().to_string(),
            });
        }
        self.publish(|_, interfaces| {
            if !interfaces.iter().any(|i| i.name() == interface.name()) {
                interfaces.push(interface);
            }
            Ok(())
        })
    }

    /// 移除代理接口，返回是否存在
    pub fn remove_interface(&self, interface: &Class) -> AopResult<bool> {
        let mut found = false;
        self.publish(|_, interfaces| {
            let before = interfaces.len();
            interfaces.retain(|i| i.name() != interface.name());
            found = interfaces.len() != before;
            Ok(())
        })?;
        Ok(found)
    }

    pub fn interfaces(&self) -> Arc<[ClassRef]> {
        Arc::clone(&self.snapshot().interfaces)
    }

    /// 代理是否实现了该接口（包括其子接口）
    pub fn is_interface_proxied(&self, interface: &Class) -> bool {
        self.snapshot()
            .interfaces
            .iter()
            .any(|i| interface.is_assignable_from(i))
    }

    /// 解析 (方法, 目标类型) 的调用链
    pub fn interceptors_for(&self, method: &Method, target_class: Option<&Class>) -> Arc<[ChainElement]> {
        let snapshot = self.snapshot();
        self.chain_for(&snapshot, method, target_class)
    }

    pub(crate) fn chain_for(
        &self,
        snapshot: &AdvisorSnapshot,
        method: &Method,
        target_class: Option<&Class>,
    ) -> Arc<[ChainElement]> {
        if !self.config.cache_chains {
            return self.resolve(snapshot, method, target_class);
        }

        let key = MethodCacheKey::new(method, target_class);
        if let Some(chain) = snapshot.cache.load().get(&key) {
            tracing::trace!("Chain cache hit for {}", method);
            return Arc::clone(chain);
        }

        // 并发未命中时以先写入者为准，所有调用拿到同一条链
        let resolved = self.resolve(snapshot, method, target_class);
        snapshot.cache.rcu(|cache| {
            let mut cache = ChainCache::clone(cache);
            cache.entry(key.clone()).or_insert_with(|| Arc::clone(&resolved));
            cache
        });
        let cached = snapshot.cache.load().get(&key).map(Arc::clone);
        cached.unwrap_or(resolved)
    }

    fn resolve(&self, snapshot: &AdvisorSnapshot, method: &Method, target_class: Option<&Class>) -> Arc<[ChainElement]> {
        self.chain_factory
            .interceptors_and_dynamic_matchers(&snapshot.advisors, method, target_class, self.config.pre_filtered)
            .into()
    }
}

impl fmt::Debug for AdvisedSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        let interfaces: Vec<_> = snapshot.interfaces.iter().map(|i| i.name().to_string()).collect();
        f.debug_struct("AdvisedSupport")
            .field("config", &self.config())
            .field("target_source", &self.target_source())
            .field("interfaces", &interfaces)
            .field("advisors", &snapshot.advisors)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{MethodBeforeAdvice, MethodInterceptor};
    use crate::advisor::{DefaultIntroductionAdvisor, DefaultPointcutAdvisor};
    use crate::error::InvocationResult;
    use crate::introduction::{DelegatingIntroductionInterceptor, DynamicIntroductionAdvice, IntroductionInterceptor};
    use crate::joinpoint::ProxyMethodInvocation;
    use crate::metadata::AnyValue;
    use crate::pointcut::NameMatchMethodPointcut;
    use crate::target::FnTarget;

    struct Named(&'static str);

    impl MethodBeforeAdvice for Named {
        fn before(&self, _: &Method, _: &[AnyValue], _: Option<&TargetRef>) -> anyhow::Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    struct Passthrough;

    impl MethodInterceptor for Passthrough {
        fn invoke(&self, invocation: &mut dyn ProxyMethodInvocation) -> InvocationResult {
            invocation.proceed()
        }
    }

    struct NothingMixin;

    impl DynamicIntroductionAdvice for NothingMixin {
        fn implements_interface(&self, _: &Class) -> bool {
            false
        }
    }

    impl IntroductionInterceptor for NothingMixin {
        fn invoke(&self, invocation: &mut dyn ProxyMethodInvocation) -> InvocationResult {
            invocation.proceed()
        }
    }

    fn service() -> ClassRef {
        Class::new("com.example.UserService").build()
    }

    fn advised() -> AdvisedSupport {
        AdvisedSupport::for_target(Arc::new(FnTarget::new(service())))
    }

    fn chain_names(chain: &[ChainElement]) -> Vec<String> {
        chain.iter().map(|e| e.interceptor().name().to_string()).collect()
    }

    #[test]
    fn test_add_at_position_and_index_of() {
        let advised = advised();
        let b: AdvisorKind = DefaultPointcutAdvisor::unconditional(Advice::before(Named("b"))).into();
        advised.add_advice(Advice::before(Named("a"))).unwrap();
        advised.add_advisor(b.clone()).unwrap();
        advised
            .add_advisor_at(1, DefaultPointcutAdvisor::unconditional(Advice::before(Named("mid"))))
            .unwrap();

        let names: Vec<_> = advised.advisors().iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, ["a", "mid", "b"]);
        assert_eq!(advised.index_of(&b), Some(2));

        assert!(advised.remove_advisor(&b).unwrap());
        assert!(!advised.remove_advisor(&b).unwrap());
        assert_eq!(advised.advisor_count(), 2);
    }

    #[test]
    fn test_index_out_of_bounds() {
        let advised = advised();
        let err = advised
            .add_advisor_at(3, DefaultPointcutAdvisor::unconditional(Advice::around(Passthrough)))
            .unwrap_err();
        assert!(matches!(err, AopError::AdvisorIndexOutOfBounds { index: 3, len: 0 }));
        assert!(matches!(
            advised.remove_advisor_at(0),
            Err(AopError::AdvisorIndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_frozen_rejects_mutation() {
        let advised = advised();
        advised.add_advice(Advice::around(Passthrough)).unwrap();
        advised.freeze();
        assert!(advised.config().frozen);
        assert!(matches!(
            advised.add_advice(Advice::around(Passthrough)),
            Err(AopError::ConfigurationFrozen)
        ));
        assert!(matches!(advised.remove_advisor_at(0), Err(AopError::ConfigurationFrozen)));
        assert_eq!(advised.advisor_count(), 1);
    }

    #[test]
    fn test_invalid_introduction_rejected_eagerly() {
        let advised = advised();
        let lockable = Class::interface("com.example.Lockable").build();
        let advisor = DefaultIntroductionAdvisor::with_interfaces(Arc::new(NothingMixin), [lockable]).unwrap();

        let err = advised.add_advisor(advisor).unwrap_err();
        assert!(matches!(err, AopError::IntroductionNotImplemented { .. }));
        assert_eq!(advised.advisor_count(), 0);
        assert!(advised.interfaces().is_empty());
    }

    #[test]
    fn test_introduction_interfaces_are_unioned_and_removed() {
        let advised = advised();
        let auditable = Class::interface("com.example.Auditable").build();
        let mixin_class = Class::new("com.example.AuditMixin").implements(&auditable).build();
        let interceptor = DelegatingIntroductionInterceptor::new(Arc::new(FnTarget::new(mixin_class)));
        let advisor: AdvisorKind = DefaultIntroductionAdvisor::new(Arc::new(interceptor)).unwrap().into();

        advised.add_interface(Arc::clone(&auditable)).unwrap();
        advised.add_advisor(advisor.clone()).unwrap();
        assert_eq!(advised.interfaces().len(), 1);
        assert!(advised.is_interface_proxied(&auditable));

        advised.remove_advisor(&advisor).unwrap();
        assert!(!advised.is_interface_proxied(&auditable));
    }

    #[test]
    fn test_add_interface_rejects_classes() {
        let advised = advised();
        let err = advised.add_interface(service()).unwrap_err();
        assert!(matches!(err, AopError::NotAnInterface { .. }));

        let api = Class::interface("com.example.Api").build();
        advised.add_interface(Arc::clone(&api)).unwrap();
        assert!(advised.remove_interface(&api).unwrap());
        assert!(!advised.remove_interface(&api).unwrap());
    }

    #[test]
    fn test_chain_cache_dropped_on_change() {
        let advised = advised();
        let class = service();
        let find = Method::new(&class, "find");
        advised
            .add_advisor(DefaultPointcutAdvisor::new(
                Arc::new(NameMatchMethodPointcut::new(["find"])),
                Advice::before(Named("first")),
            ))
            .unwrap();

        let chain = advised.interceptors_for(&find, Some(&class));
        assert!(Arc::ptr_eq(&chain, &advised.interceptors_for(&find, Some(&class))));
        assert_eq!(chain_names(&chain), ["first"]);

        advised.add_advice(Advice::before(Named("second"))).unwrap();
        let chain = advised.interceptors_for(&find, Some(&class));
        assert_eq!(chain_names(&chain), ["first", "second"]);
    }

    #[test]
    fn test_uncached_resolution() {
        let advised = AdvisedSupport::new(
            Arc::new(SingletonTargetSource::new(Arc::new(FnTarget::new(service())))),
            ProxyConfig::default().cache_chains(false),
        );
        advised.add_advice(Advice::around(Passthrough)).unwrap();
        let class = service();
        let find = Method::new(&class, "find");
        let first = advised.interceptors_for(&find, None);
        let second = advised.interceptors_for(&find, None);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_snapshot_is_stable_during_update() {
        let advised = advised();
        advised.add_advice(Advice::around(Passthrough)).unwrap();
        let snapshot = advised.snapshot();
        advised.add_advice(Advice::around(Passthrough)).unwrap();
        assert_eq!(snapshot.advisors().len(), 1);
        assert_eq!(advised.advisor_count(), 2);
    }

    #[test]
    fn test_same_introduction_added_twice_keeps_interfaces_unique() {
        let advised = advised();
        let auditable = Class::interface("com.example.Auditable").build();
        let mixin_class = Class::new("com.example.AuditMixin").implements(&auditable).build();
        let interceptor = DelegatingIntroductionInterceptor::new(Arc::new(FnTarget::new(mixin_class)));
        let advisor: AdvisorKind = DefaultIntroductionAdvisor::new(Arc::new(interceptor)).unwrap().into();

        advised.add_advisor(advisor.clone()).unwrap();
        advised.add_advisor(advisor.clone()).unwrap();
        assert_eq!(advised.advisor_count(), 2);
        assert_eq!(advised.interfaces().len(), 1);
        assert!(advisor.as_introduction().unwrap().validate_interfaces().is_ok());
    }

    #[test]
    fn test_append_races_with_removal() {
        let advised = advised();
        for _ in 0..64 {
            advised.add_advice(Advice::around(Passthrough)).unwrap();
        }

        let failures = std::thread::scope(|scope| {
            let remover = scope.spawn(|| {
                for _ in 0..5_000 {
                    let _ = advised.remove_advisor_at(0);
                }
            });
            let failures = (0..5_000)
                .filter(|_| advised.add_advice(Advice::around(Passthrough)).is_err())
                .count();
            remover.join().unwrap();
            failures
        });

        assert_eq!(failures, 0);
    }

    #[test]
    fn test_concurrent_appends_are_all_published() {
        let advised = advised();
        let labels: Vec<&'static str> = vec!["a", "b", "c", "d"];

        std::thread::scope(|scope| {
            for label in &labels {
                let advised = &advised;
                scope.spawn(move || {
                    for _ in 0..200 {
                        advised.add_advice(Advice::before(Named(*label))).unwrap();
                    }
                });
            }
        });

        let advisors = advised.advisors();
        assert_eq!(advisors.len(), 800);
        for label in labels {
            let count = advisors.iter().filter(|a| a.name() == label).count();
            assert_eq!(count, 200);
        }
    }
}
