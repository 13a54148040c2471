//! 类型与方法元数据
//!
//! Rust 没有运行时反射，切点匹配所需的类型信息由调用方显式描述：
//! [`Class`] 描述目标类型或接口，[`Method`] 描述某个类型上声明的方法。

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 动态类型的参数 / 返回值
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// 共享的类型元数据引用
pub type ClassRef = Arc<Class>;

/// 类型元数据
///
/// 类型以全限定名作为身份，例如 `com.example.UserService`。
#[derive(Clone)]
pub struct Class {
    name: String,
    is_interface: bool,
    interfaces: Vec<ClassRef>,
    superclass: Option<ClassRef>,
    annotations: Vec<String>,
}

impl Class {
    /// 创建普通类型
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_interface: false,
            interfaces: Vec::new(),
            superclass: None,
            annotations: Vec::new(),
        }
    }

    /// 创建接口类型
    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            is_interface: true,
            ..Self::new(name)
        }
    }

    /// 声明实现的接口
    pub fn implements(mut self, interface: &ClassRef) -> Self {
        if !self.interfaces.iter().any(|i| i.name == interface.name) {
            self.interfaces.push(Arc::clone(interface));
        }
        self
    }

    /// 声明父类型
    pub fn extends(mut self, superclass: &ClassRef) -> Self {
        self.superclass = Some(Arc::clone(superclass));
        self
    }

    /// 添加类型注解
    pub fn annotated(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    pub fn build(self) -> ClassRef {
        Arc::new(self)
    }

    /// 全限定名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 去掉包名后的简单名称
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// 包名，没有包时为空串
    pub fn package_name(&self) -> &str {
        self.name.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
    }

    pub fn is_interface(&self) -> bool {
        self.is_interface
    }

    pub fn interfaces(&self) -> &[ClassRef] {
        &self.interfaces
    }

    pub fn superclass(&self) -> Option<&ClassRef> {
        self.superclass.as_ref()
    }

    pub fn annotations(&self) -> &[String] {
        &self.annotations
    }

    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.iter().any(|a| a == annotation)
    }

    /// 所有父类型（父类、接口及其祖先），按广度优先顺序去重
    pub fn all_supertypes(&self) -> Vec<ClassRef> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut queue: Vec<ClassRef> = self
            .superclass
            .iter()
            .chain(self.interfaces.iter())
            .cloned()
            .collect();

        let mut index = 0;
        while index < queue.len() {
            let current = Arc::clone(&queue[index]);
            index += 1;
            if !seen.insert(current.name.clone()) {
                continue;
            }
            queue.extend(current.superclass.iter().cloned());
            queue.extend(current.interfaces.iter().cloned());
            result.push(current);
        }
        result
    }

    /// `other` 是否可以当作 `self` 使用（同一类型或其子类型）
    pub fn is_assignable_from(&self, other: &Class) -> bool {
        self.name == other.name || other.all_supertypes().iter().any(|t| t.name == self.name)
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Class {}

impl Hash for Class {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_interface { "interface" } else { "class" };
        write!(f, "{} {}", kind, self.name)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// 方法元数据
///
/// 身份由声明类型、方法名和参数类型共同决定。
#[derive(Clone)]
pub struct Method {
    name: String,
    declaring_class: ClassRef,
    parameter_types: Vec<String>,
    return_type: String,
    annotations: Vec<String>,
}

impl Method {
    pub fn new(declaring_class: &ClassRef, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declaring_class: Arc::clone(declaring_class),
            parameter_types: Vec::new(),
            return_type: "void".to_string(),
            annotations: Vec::new(),
        }
    }

    /// 设置参数类型
    pub fn params<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// 设置返回类型
    pub fn returns(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    /// 添加方法注解
    pub fn annotated(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_class(&self) -> &ClassRef {
        &self.declaring_class
    }

    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_types.len()
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    pub fn annotations(&self) -> &[String] {
        &self.annotations
    }

    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.iter().any(|a| a == annotation)
    }

    /// 完整签名，例如 `com.example.UserService.find(String, u32)`
    pub fn signature(&self) -> String {
        format!(
            "{}.{}({})",
            self.declaring_class.name,
            self.name,
            self.parameter_types.join(", ")
        )
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.declaring_class.name == other.declaring_class.name
            && self.parameter_types == other.parameter_types
    }
}

impl Eq for Method {}

impl Hash for Method {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declaring_class.name.hash(state);
        self.name.hash(state);
        self.parameter_types.hash(state);
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Method({})", self.signature())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// 解析实际参与匹配的类型：未给出目标类型时使用方法的声明类型
pub fn effective_class<'a>(method: &'a Method, target_class: Option<&'a Class>) -> &'a Class {
    target_class.unwrap_or(method.declaring_class())
}
