//! Interceptors for unary handlers.
//!
//! Interceptors add cross-cutting logic around a call — logging, metrics,
//! auth checks, error translation — by wrapping the handler function. They
//! see the decoded request on the way in and the response (or error) on the
//! way out, plus the [`RpcContext`] with the negotiated specification and
//! both header maps.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::RpcContext;
use crate::error::RpcError;

/// Type alias for a boxed future returning a result.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The outcome of a unary call.
///
/// `Ok(None)` is the sentinel produced when a raw gRPC delegate has taken
/// over and already written the response; interceptors pass it through.
pub type UnaryResult<Res> = Result<Option<Res>, RpcError>;

/// The signature of a unary call.
///
/// Interceptors wrap this function to add logic before and after the call.
pub type UnaryHandler<Req, Res> =
    Arc<dyn Fn(RpcContext, Req) -> BoxFuture<'static, UnaryResult<Res>> + Send + Sync>;

/// The "next" function in the interceptor chain.
///
/// Call this to proceed to the next interceptor or the application itself.
pub struct UnaryNext<Req, Res> {
    inner: UnaryHandler<Req, Res>,
}

impl<Req, Res> Clone for UnaryNext<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Req, Res> UnaryNext<Req, Res> {
    pub(crate) fn new(inner: UnaryHandler<Req, Res>) -> Self {
        Self { inner }
    }

    /// Call the next interceptor or the application.
    pub async fn call(self, ctx: RpcContext, req: Req) -> UnaryResult<Res> {
        (self.inner)(ctx, req).await
    }
}

/// A wrapper around a unary handler.
///
/// One method: take a handler, return a handler. Chains are built by
/// folding a sequence of interceptors; the outermost interceptor sees the
/// call first and the response last.
pub trait Interceptor<Req, Res>: Send + Sync {
    /// Wrap a unary handler.
    fn wrap_handler(&self, next: UnaryHandler<Req, Res>) -> UnaryHandler<Req, Res>;
}

/// A chain of interceptors applied in order.
///
/// The first interceptor pushed is the outermost: it acts first on the
/// request and last on the response.
pub struct InterceptorChain<Req, Res> {
    interceptors: Vec<Arc<dyn Interceptor<Req, Res>>>,
}

impl<Req, Res> Clone for InterceptorChain<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            interceptors: self.interceptors.clone(),
        }
    }
}

impl<Req, Res> std::fmt::Debug for InterceptorChain<Req, Res> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("count", &self.interceptors.len())
            .finish()
    }
}

impl<Req, Res> InterceptorChain<Req, Res> {
    /// Create a new empty chain.
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    /// Add an interceptor to the end of the chain.
    pub fn push(&mut self, interceptor: Arc<dyn Interceptor<Req, Res>>) {
        self.interceptors.push(interceptor);
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, interceptor: Arc<dyn Interceptor<Req, Res>>) -> Self {
        self.push(interceptor);
        self
    }

    /// Check if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Get the number of interceptors in the chain.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }
}

impl<Req, Res> Default for InterceptorChain<Req, Res> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Res> Interceptor<Req, Res> for InterceptorChain<Req, Res> {
    /// Wrap a handler with every interceptor in the chain.
    ///
    /// Applied in reverse order so the first interceptor pushed acts first.
    fn wrap_handler(&self, next: UnaryHandler<Req, Res>) -> UnaryHandler<Req, Res> {
        let mut wrapped = next;
        for interceptor in self.interceptors.iter().rev() {
            wrapped = interceptor.wrap_handler(wrapped);
        }
        wrapped
    }
}

/// A function-based interceptor.
///
/// Lifts a closure `(ctx, req, next) -> future` into an [`Interceptor`].
pub struct FnInterceptor<F> {
    func: F,
}

impl<F> FnInterceptor<F> {
    /// Create a new function-based interceptor.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Clone for FnInterceptor<F>
where
    F: Clone,
{
    fn clone(&self) -> Self {
        Self {
            func: self.func.clone(),
        }
    }
}

impl<F, Req, Res> Interceptor<Req, Res> for FnInterceptor<F>
where
    F: Fn(RpcContext, Req, UnaryNext<Req, Res>) -> BoxFuture<'static, UnaryResult<Res>>
        + Send
        + Sync
        + Clone
        + 'static,
    Req: Send + 'static,
    Res: Send + 'static,
{
    fn wrap_handler(&self, next: UnaryHandler<Req, Res>) -> UnaryHandler<Req, Res> {
        let func = self.func.clone();
        Arc::new(move |ctx: RpcContext, req: Req| {
            let func = func.clone();
            let next = UnaryNext::new(next.clone());
            func(ctx, req, next)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CompressionEncoding, RpcProtocol, Specification};
    use crate::error::{Code, RpcError};
    use axum::http::HeaderMap;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    fn context() -> RpcContext {
        RpcContext::new(
            Specification {
                method: "acme.test.v1.TestService.Call".to_owned(),
                protocol: RpcProtocol::Grpc,
                content_type: "application/grpc".to_owned(),
                request_compression: CompressionEncoding::Identity,
                response_compression: CompressionEncoding::Identity,
            },
            HeaderMap::new(),
            Arc::new(Mutex::new(HeaderMap::new())),
            CancellationToken::new(),
            None,
        )
    }

    fn base_handler() -> UnaryHandler<String, String> {
        Arc::new(|_ctx, req: String| Box::pin(async move { Ok(Some(format!("[{req}]"))) }))
    }

    /// Records its marker around the inner call.
    struct Tracer {
        marker: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor<String, String> for Tracer {
        fn wrap_handler(&self, next: UnaryHandler<String, String>) -> UnaryHandler<String, String> {
            let marker = self.marker;
            let log = self.log.clone();
            Arc::new(move |ctx, req| {
                let log = log.clone();
                let next = next.clone();
                Box::pin(async move {
                    log.lock().unwrap().push(format!("{marker}-in"));
                    let result = next(ctx, req).await;
                    log.lock().unwrap().push(format!("{marker}-out"));
                    result
                })
            })
        }
    }

    #[tokio::test]
    async fn test_single_interceptor_wraps_call() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tracer = Tracer {
            marker: "a",
            log: log.clone(),
        };

        let handler = tracer.wrap_handler(base_handler());
        let result = handler(context(), "hi".to_owned()).await.unwrap();

        assert_eq!(result, Some("[hi]".to_owned()));
        assert_eq!(*log.lock().unwrap(), vec!["a-in", "a-out"]);
    }

    #[tokio::test]
    async fn test_chain_is_onion_shaped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = InterceptorChain::new();
        chain.push(Arc::new(Tracer {
            marker: "outer",
            log: log.clone(),
        }));
        chain.push(Arc::new(Tracer {
            marker: "inner",
            log: log.clone(),
        }));

        let handler = chain.wrap_handler(base_handler());
        handler(context(), "x".to_owned()).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer-in", "inner-in", "inner-out", "outer-out"]
        );
    }

    #[tokio::test]
    async fn test_empty_chain_is_identity() {
        let chain: InterceptorChain<String, String> = InterceptorChain::new();
        assert!(chain.is_empty());

        let handler = chain.wrap_handler(base_handler());
        let result = handler(context(), "hi".to_owned()).await.unwrap();
        assert_eq!(result, Some("[hi]".to_owned()));
    }

    #[tokio::test]
    async fn test_fn_interceptor_transforms_errors() {
        let translate = FnInterceptor::new(|ctx, req, next: UnaryNext<String, String>| {
            Box::pin(async move {
                match next.call(ctx, req).await {
                    Err(err) if err.code() == Code::Unknown => {
                        Err(RpcError::internal(err.message().to_owned()))
                    }
                    other => other,
                }
            }) as BoxFuture<'static, UnaryResult<String>>
        });

        let failing: UnaryHandler<String, String> =
            Arc::new(|_ctx, _req| Box::pin(async { Err(RpcError::new(Code::Unknown, "boom")) }));

        let handler = translate.wrap_handler(failing);
        let err = handler(context(), "x".to_owned()).await.unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(err.message(), "boom");
    }

    #[tokio::test]
    async fn test_interceptor_observes_cancellation() {
        let ctx = context();
        ctx.cancellation().cancel();

        let observes = FnInterceptor::new(|ctx: RpcContext, req, next: UnaryNext<String, String>| {
            Box::pin(async move {
                if ctx.is_cancelled() {
                    return Err(RpcError::new(Code::Canceled, "client went away"));
                }
                next.call(ctx, req).await
            }) as BoxFuture<'static, UnaryResult<String>>
        });

        let handler = observes.wrap_handler(base_handler());
        let err = handler(ctx, "x".to_owned()).await.unwrap_err();
        assert_eq!(err.code(), Code::Canceled);
    }

    #[tokio::test]
    async fn test_sentinel_passes_through_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new().with(Arc::new(Tracer {
            marker: "t",
            log: log.clone(),
        }));

        let hijacked: UnaryHandler<String, String> =
            Arc::new(|_ctx, _req| Box::pin(async { Ok(None) }));

        let handler = chain.wrap_handler(hijacked);
        let result = handler(context(), "x".to_owned()).await.unwrap();
        assert_eq!(result, None);
        assert_eq!(*log.lock().unwrap(), vec!["t-in", "t-out"]);
    }
}
