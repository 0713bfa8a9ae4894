//! Middleware pipelines.
//!
//! Middleware wraps request handling in both directions. A chain is ordered:
//! the first middleware added is outermost and sees the request first. Each
//! middleware receives the request context, method, and params, plus a
//! [`Next`] that continues the chain; it may observe or rewrite params (for
//! example to inject a progress token) and observe or rewrite the result.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::SessionResult;

/// The innermost step of a chain: the actual dispatch or send.
pub type Endpoint = Arc<
    dyn Fn(RequestContext, String, Option<Value>) -> BoxFuture<'static, SessionResult<Value>>
        + Send
        + Sync,
>;

/// A middleware layer.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Handle the request, calling `next` to continue the chain.
    async fn call(
        &self,
        ctx: RequestContext,
        method: String,
        params: Option<Value>,
        next: Next<'_>,
    ) -> SessionResult<Value>;
}

/// The remainder of a middleware chain.
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    endpoint: &'a Endpoint,
}

impl<'a> Next<'a> {
    /// Continue with the next middleware, or the endpoint when exhausted.
    pub fn run(
        self,
        ctx: RequestContext,
        method: String,
        params: Option<Value>,
    ) -> BoxFuture<'a, SessionResult<Value>> {
        Box::pin(async move {
            match self.middlewares.split_first() {
                Some((head, tail)) => {
                    let next = Next {
                        middlewares: tail,
                        endpoint: self.endpoint,
                    };
                    head.call(ctx, method, params, next).await
                }
                None => (self.endpoint)(ctx, method, params).await,
            }
        })
    }
}

/// Run a full chain around an endpoint, outermost middleware first.
pub(crate) async fn run_chain(
    middlewares: &[Arc<dyn Middleware>],
    endpoint: &Endpoint,
    ctx: RequestContext,
    method: String,
    params: Option<Value>,
) -> SessionResult<Value> {
    Next {
        middlewares,
        endpoint,
    }
    .run(ctx, method, params)
    .await
}
