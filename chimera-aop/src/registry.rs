//! 顾问注册表
//!
//! 通过 `inventory` 在编译期收集顾问，应用启动时按 `(order, name)` 顺序加载：
//!
//! ```ignore
//! chimera_aop::inventory::submit! {
//!     chimera_aop::registry::AdvisorRegistration::new("audit", 10, || {
//!         chimera_aop::DefaultPointcutAdvisor::unconditional(
//!             chimera_aop::Advice::before(AuditAdvice),
//!         )
//!         .into()
//!     })
//! }
//! ```

use crate::advisor::AdvisorKind;

/// 顾问注册信息
pub struct AdvisorRegistration {
    pub name: &'static str,

    /// 越小越靠外层
    pub order: i32,

    pub create: fn() -> AdvisorKind,
}

impl AdvisorRegistration {
    pub const fn new(name: &'static str, order: i32, create: fn() -> AdvisorKind) -> Self {
        Self { name, order, create }
    }
}

inventory::collect!(AdvisorRegistration);

/// 所有注册信息，按 `(order, name)` 排序
pub fn registrations() -> Vec<&'static AdvisorRegistration> {
    let mut all: Vec<_> = inventory::iter::<AdvisorRegistration>.into_iter().collect();
    all.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(b.name)));
    all
}

/// 创建所有注册的顾问
pub fn registered_advisors() -> Vec<AdvisorKind> {
    registrations()
        .into_iter()
        .map(|registration| {
            tracing::debug!(
                "Loading registered advisor '{}' (order {})",
                registration.name,
                registration.order
            );
            (registration.create)()
        })
        .collect()
}
