#![allow(dead_code)]

use async_trait::async_trait;
use http::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use turnstile::{
    CounterRecord, CounterStore, InMemoryCounterStore, ManualClock, OperationKey, Policy,
    PolicyTable, PrincipalLimiter, StoreError,
};

/// 2023-11-14T22:13:20Z
pub const T0: u64 = 1_700_000_000_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::DEBUG).try_init();
}

pub fn op() -> OperationKey {
    OperationKey::from_parts("POST", "/op")
}

/// Limiter with `{max, window}` on `POST /op`, an in-memory store and a shared manual clock.
pub fn principal_limiter(
    max: u32,
    window: Duration,
) -> (PrincipalLimiter<InMemoryCounterStore>, ManualClock) {
    let clock = ManualClock::new(T0);
    let policies = PolicyTable::builder()
        .operation("POST", "/op", Policy::new(max, window).expect("valid policy"))
        .build()
        .expect("valid table");
    let store = InMemoryCounterStore::new().with_clock(clock.clone());
    (PrincipalLimiter::new(store, policies).with_clock(clock.clone()), clock)
}

/// Store whose reads and/or writes always fail; counts calls.
#[derive(Debug, Default)]
pub struct FailingStore {
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl FailingStore {
    pub fn everything() -> Self {
        Self { fail_reads: true, fail_writes: true, ..Self::default() }
    }

    pub fn writes_only() -> Self {
        Self { fail_writes: true, ..Self::default() }
    }

    fn down() -> StoreError {
        StoreError::unavailable(io::Error::new(io::ErrorKind::ConnectionRefused, "store down"))
    }
}

#[async_trait]
impl CounterStore for FailingStore {
    async fn read(&self, _key: &str) -> Result<Option<CounterRecord>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(Self::down());
        }
        Ok(None)
    }

    async fn write(&self, _key: &str, _record: CounterRecord, _ttl: Duration) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(Self::down());
        }
        Ok(())
    }
}

/// Inner service that answers 200 with a fixed body and counts calls.
#[derive(Clone, Debug, Default)]
pub struct Echo {
    pub calls: Arc<AtomicUsize>,
}

impl Echo {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl tower::Service<Request<String>> for Echo {
    type Response = Response<String>;
    type Error = Infallible;
    type Future = std::future::Ready<Result<Response<String>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Infallible>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Request<String>) -> Self::Future {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut response = Response::new("ok".to_string());
        *response.status_mut() = StatusCode::OK;
        // a downstream handler trying to set its own quota header
        response.headers_mut().insert("x-ratelimit-limit", http::HeaderValue::from_static("999999"));
        std::future::ready(Ok(response))
    }
}

pub fn request(method: &str, path: &str) -> Request<String> {
    Request::builder().method(method).uri(path).body(String::new()).expect("valid request")
}
