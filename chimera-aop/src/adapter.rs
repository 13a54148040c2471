//! 通知适配器
//!
//! 把各类通知统一适配成环绕拦截器，调用链只需要处理一种元素。

use std::sync::Arc;

use crate::advice::{
    Advice, AfterAdvice, AfterReturningAdvice, MethodBeforeAdvice, MethodInterceptor, ThrowsAdvice,
};
use crate::error::InvocationResult;
use crate::introduction::IntroductionInterceptor;
use crate::joinpoint::ProxyMethodInvocation;

/// 前置通知适配器
pub struct BeforeAdviceInterceptor {
    advice: Arc<dyn MethodBeforeAdvice>,
}

impl MethodInterceptor for BeforeAdviceInterceptor {
    fn invoke(&self, invocation: &mut dyn ProxyMethodInvocation) -> InvocationResult {
        self.advice
            .before(invocation.method(), invocation.arguments(), invocation.this())?;
        invocation.proceed()
    }

    fn name(&self) -> &str {
        self.advice.name()
    }
}

/// 返回后通知适配器
pub struct AfterReturningAdviceInterceptor {
    advice: Arc<dyn AfterReturningAdvice>,
}

impl MethodInterceptor for AfterReturningAdviceInterceptor {
    fn invoke(&self, invocation: &mut dyn ProxyMethodInvocation) -> InvocationResult {
        let result = invocation.proceed()?;
        self.advice.after_returning(
            result.as_ref(),
            invocation.method(),
            invocation.arguments(),
            invocation.this(),
        )?;
        Ok(result)
    }

    fn name(&self) -> &str {
        self.advice.name()
    }
}

/// 异常通知适配器
pub struct ThrowsAdviceInterceptor {
    advice: Arc<dyn ThrowsAdvice>,
}

impl MethodInterceptor for ThrowsAdviceInterceptor {
    fn invoke(&self, invocation: &mut dyn ProxyMethodInvocation) -> InvocationResult {
        match invocation.proceed() {
            Ok(result) => Ok(result),
            Err(error) => {
                if self.advice.handles(&error) {
                    self.advice.after_throwing(
                        invocation.method(),
                        invocation.arguments(),
                        invocation.this(),
                        &error,
                    )?;
                }
                Err(error)
            }
        }
    }

    fn name(&self) -> &str {
        self.advice.name()
    }
}

/// 后置通知适配器（finally 语义）
pub struct AfterAdviceInterceptor {
    advice: Arc<dyn AfterAdvice>,
}

impl MethodInterceptor for AfterAdviceInterceptor {
    fn invoke(&self, invocation: &mut dyn ProxyMethodInvocation) -> InvocationResult {
        let result = invocation.proceed();
        let after = self
            .advice
            .after(invocation.method(), invocation.arguments(), invocation.this());
        match (result, after) {
            (Err(error), _) => Err(error),
            (Ok(_), Err(error)) => Err(error),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    fn name(&self) -> &str {
        self.advice.name()
    }
}

/// 引入拦截器适配器
pub struct IntroductionAdapter {
    interceptor: Arc<dyn IntroductionInterceptor>,
}

impl MethodInterceptor for IntroductionAdapter {
    fn invoke(&self, invocation: &mut dyn ProxyMethodInvocation) -> InvocationResult {
        self.interceptor.invoke(invocation)
    }

    fn name(&self) -> &str {
        self.interceptor.name()
    }
}

/// 把通知适配为环绕拦截器
pub fn adapt(advice: &Advice) -> Arc<dyn MethodInterceptor> {
    match advice {
        Advice::Around(interceptor) => Arc::clone(interceptor),
        Advice::Before(advice) => Arc::new(BeforeAdviceInterceptor {
            advice: Arc::clone(advice),
        }),
        Advice::AfterReturning(advice) => Arc::new(AfterReturningAdviceInterceptor {
            advice: Arc::clone(advice),
        }),
        Advice::AfterThrowing(advice) => Arc::new(ThrowsAdviceInterceptor {
            advice: Arc::clone(advice),
        }),
        Advice::After(advice) => Arc::new(AfterAdviceInterceptor {
            advice: Arc::clone(advice),
        }),
        Advice::Introduction(interceptor) => Arc::new(IntroductionAdapter {
            interceptor: Arc::clone(interceptor),
        }),
    }
}
