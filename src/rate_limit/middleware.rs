use crate::policy::{OperationKey, Policy};
use crate::rate_limit::origin::OriginLimiter;
use crate::rate_limit::principal::PrincipalLimiter;
use crate::rate_limit::response::{apply_quota_headers, QuotaExceeded};
use crate::rate_limit::store::CounterStore;
use crate::rate_limit::Decision;
use crate::telemetry::{emit_best_effort, AdmissionEvent, NullSink, Scope, TelemetrySink};
use http::{Request, Response};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Origin used when the routing layer did not attach one.
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Authenticated principal id, inserted into request extensions by the identity layer.
///
/// Its presence is what moves a request from the unidentified to the identified state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal(pub String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Network origin of a request, inserted into request extensions by the routing layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin(pub String);

impl Origin {
    pub fn new(origin: impl Into<String>) -> Self {
        Self(origin.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<IpAddr> for Origin {
    fn from(ip: IpAddr) -> Self {
        Self(ip.to_string())
    }
}

impl From<SocketAddr> for Origin {
    fn from(addr: SocketAddr) -> Self {
        // the port changes per connection; limit the host
        Self::from(addr.ip())
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

fn event_for(scope: Scope, decision: &Decision, now_millis: u64) -> AdmissionEvent {
    if decision.degraded {
        AdmissionEvent::FailOpen { scope }
    } else if decision.allowed {
        AdmissionEvent::Allowed { scope, current_count: decision.current_count, limit: decision.limit }
    } else {
        AdmissionEvent::Denied {
            scope,
            current_count: decision.current_count,
            limit: decision.limit,
            retry_after: decision.retry_after(now_millis),
        }
    }
}

/// Shared tail of both services: short-circuit on denial, otherwise run the inner
/// service and stamp the quota headers on its response.
async fn admit<S, ReqB, ResB>(
    mut inner: S,
    req: Request<ReqB>,
    decision: Decision,
    now_millis: u64,
) -> Result<Response<ResB>, S::Error>
where
    S: Service<Request<ReqB>, Response = Response<ResB>>,
    ResB: From<String>,
{
    if !decision.allowed {
        return Ok(QuotaExceeded::from_decision(&decision, now_millis).into_response());
    }
    let mut response = inner.call(req).await?;
    apply_quota_headers(response.headers_mut(), &decision);
    Ok(response)
}

/// A layer that enforces per-principal limits using a [`PrincipalLimiter`].
///
/// Requests without a [`Principal`] extension pass through untouched. Identified requests
/// always receive `X-RateLimit-*` headers; denied ones get a 429 without reaching the
/// inner service.
#[derive(Debug)]
pub struct AdmissionLayer<St, T = NullSink> {
    limiter: PrincipalLimiter<St>,
    sink: T,
}

impl<St, T: Clone> Clone for AdmissionLayer<St, T> {
    fn clone(&self) -> Self {
        Self { limiter: self.limiter.clone(), sink: self.sink.clone() }
    }
}

impl<St> AdmissionLayer<St, NullSink>
where
    St: CounterStore + 'static,
{
    pub fn new(limiter: PrincipalLimiter<St>) -> Self {
        Self { limiter, sink: NullSink }
    }
}

impl<St, T> AdmissionLayer<St, T> {
    /// Attach a telemetry sink.
    pub fn with_sink<T2>(self, sink: T2) -> AdmissionLayer<St, T2> {
        AdmissionLayer { limiter: self.limiter, sink }
    }
}

impl<S, St, T> Layer<S> for AdmissionLayer<St, T>
where
    T: Clone,
{
    type Service = AdmissionService<S, St, T>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionService { inner: service, limiter: self.limiter.clone(), sink: self.sink.clone() }
    }
}

/// Middleware service produced by [`AdmissionLayer`].
#[derive(Debug)]
pub struct AdmissionService<S, St, T = NullSink> {
    inner: S,
    limiter: PrincipalLimiter<St>,
    sink: T,
}

impl<S: Clone, St, T: Clone> Clone for AdmissionService<S, St, T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), limiter: self.limiter.clone(), sink: self.sink.clone() }
    }
}

impl<S, St, T, ReqB, ResB> Service<Request<ReqB>> for AdmissionService<S, St, T>
where
    S: Service<Request<ReqB>, Response = Response<ResB>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    St: CounterStore + 'static,
    T: TelemetrySink,
    ReqB: Send + 'static,
    ResB: From<String> + Send + 'static,
{
    type Response = Response<ResB>;
    type Error = S::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqB>) -> Self::Future {
        // keep the instance that was driven to readiness
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        let Some(principal) = req.extensions().get::<Principal>().cloned() else {
            let mut inner = inner;
            return Box::pin(inner.call(req));
        };

        let limiter = self.limiter.clone();
        let sink = self.sink.clone();
        let operation = OperationKey::from_request(&req);

        Box::pin(async move {
            let decision = limiter.check(principal.as_str(), &operation).await;
            let now = limiter.clock().now_millis();
            let scope = Scope::Principal { principal: principal.0, operation: operation.to_string() };
            emit_best_effort(sink, event_for(scope, &decision, now)).await;
            admit(inner, req, decision, now).await
        })
    }
}

/// A layer that bounds unidentified traffic per network origin using an [`OriginLimiter`].
///
/// Compose it in front of routes that are reachable before authentication. Requests
/// that already carry a [`Principal`] pass through; the rest are counted against one
/// [`Policy`] keyed by their [`Origin`] extension ([`UNKNOWN_ORIGIN`] when missing).
#[derive(Clone, Debug)]
pub struct OriginLimitLayer<T = NullSink> {
    limiter: OriginLimiter,
    policy: Policy,
    sink: T,
}

impl OriginLimitLayer<NullSink> {
    pub fn new(limiter: OriginLimiter, policy: Policy) -> Self {
        Self { limiter, policy, sink: NullSink }
    }
}

impl<T> OriginLimitLayer<T> {
    /// Attach a telemetry sink.
    pub fn with_sink<T2>(self, sink: T2) -> OriginLimitLayer<T2> {
        OriginLimitLayer { limiter: self.limiter, policy: self.policy, sink }
    }
}

impl<S, T> Layer<S> for OriginLimitLayer<T>
where
    T: Clone,
{
    type Service = OriginLimitService<S, T>;

    fn layer(&self, service: S) -> Self::Service {
        OriginLimitService {
            inner: service,
            limiter: self.limiter.clone(),
            policy: self.policy,
            sink: self.sink.clone(),
        }
    }
}

/// Middleware service produced by [`OriginLimitLayer`].
#[derive(Clone, Debug)]
pub struct OriginLimitService<S, T = NullSink> {
    inner: S,
    limiter: OriginLimiter,
    policy: Policy,
    sink: T,
}

impl<S, T, ReqB, ResB> Service<Request<ReqB>> for OriginLimitService<S, T>
where
    S: Service<Request<ReqB>, Response = Response<ResB>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    T: TelemetrySink,
    ReqB: Send + 'static,
    ResB: From<String> + Send + 'static,
{
    type Response = Response<ResB>;
    type Error = S::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqB>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if req.extensions().get::<Principal>().is_some() {
            return Box::pin(inner.call(req));
        }

        let origin = req
            .extensions()
            .get::<Origin>()
            .map(|o| o.0.clone())
            .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string());
        let decision = self.limiter.check(&origin, self.policy.max_requests(), self.policy.window());
        let now = self.limiter.clock().now_millis();
        let sink = self.sink.clone();

        Box::pin(async move {
            emit_best_effort(sink, event_for(Scope::Origin { origin }, &decision, now)).await;
            admit(inner, req, decision, now).await
        })
    }
}
