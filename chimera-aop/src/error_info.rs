//! 错误描述
//!
//! 把调用链上传播的 `anyhow::Error` 整理成便于记录的结构，异常通知可以直接输出它。

use std::fmt;

use crate::error::AopError;

/// 结构化的错误信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// 最外层错误消息
    pub message: String,

    /// 错误来源：框架错误还是业务错误
    pub origin: ErrorOrigin,

    /// 原因链（不含最外层）
    pub causes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// 由 AOP 框架产生
    Framework,
    /// 由目标方法或通知产生
    Application,
}

impl ErrorInfo {
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        let origin = if error.downcast_ref::<AopError>().is_some() {
            ErrorOrigin::Framework
        } else {
            ErrorOrigin::Application
        };
        Self {
            message: error.to_string(),
            origin,
            causes: error.chain().skip(1).map(|cause| cause.to_string()).collect(),
        }
    }

    /// 包含原因链的完整描述
    pub fn full_description(&self) -> String {
        if self.causes.is_empty() {
            self.message.clone()
        } else {
            format!("{}\nCaused by:\n  {}", self.message, self.causes.join("\n  "))
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_cause_chain() {
        let err = Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
            .context("saving user")
            .unwrap_err();
        let info = ErrorInfo::from_anyhow(&err);
        assert_eq!(info.message, "saving user");
        assert_eq!(info.causes, ["disk full"]);
        assert_eq!(info.origin, ErrorOrigin::Application);
        assert_eq!(info.full_description(), "saving user\nCaused by:\n  disk full");
    }

    #[test]
    fn test_framework_origin() {
        let err: anyhow::Error = AopError::NoCurrentProxy.into();
        let info = ErrorInfo::from_anyhow(&err);
        assert_eq!(info.origin, ErrorOrigin::Framework);
        assert!(info.causes.is_empty());
    }
}
