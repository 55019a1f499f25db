//! Request Logger Middleware
//!
//! Wraps a service so that every request produces exactly one structured
//! `"request completed"` record with its request id, method, path, final
//! status, response body bytes and elapsed time.
//!
//! The record is owned by a guard that emits it when dropped. The guard
//! travels with the response inside [`ResponseBody`], so the record is written
//! once the body has been fully sent (or abandoned), not when the handler
//! returns its response head. If the inner service fails, panics or the
//! request future is dropped, the guard fires from there instead.
//!
//! `duration` therefore covers the handler plus body streaming: it runs from
//! the moment the request enters this layer until the last body frame is
//! produced or the body is dropped.
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use platform::logging::{LogConfig, Logger};
//! use platform::request_id::RequestIdLayer;
//! use platform::request_logger::RequestLoggerLayer;
//!
//! let logger = Logger::init(&LogConfig::from_env());
//!
//! let app: Router = Router::new()
//!     .route("/healthz", get(|| async { "ok" }))
//!     .layer(RequestLoggerLayer::new(logger))
//!     .layer(RequestIdLayer::new());
//! ```

use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Buf;
use futures::FutureExt;
use futures::future::BoxFuture;
use http::{Method, Request, Response, StatusCode};
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use tower::{Layer, Service};
use tracing::instrument::WithSubscriber;

use crate::logging::{LogConfig, Logger};
use crate::request_id::RequestId;

// =============================================================================
// RequestLoggerLayer
// =============================================================================

/// Layer that logs one completion record per request.
///
/// The inner service runs with the layer's [`Logger`] as its default
/// dispatcher, so anything it logs (e.g. `AppError::report`) lands in the
/// same sink as the completion records.
#[derive(Debug, Clone)]
pub struct RequestLoggerLayer {
    logger: Logger,
}

impl RequestLoggerLayer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Builds the logger from `config` (stdout, plus the file if configured).
    pub fn from_config(config: &LogConfig) -> Self {
        Self::new(Logger::init(config))
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggerService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

// =============================================================================
// RequestLoggerService
// =============================================================================

#[derive(Debug, Clone)]
pub struct RequestLoggerService<S> {
    inner: S,
    logger: Logger,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLoggerService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Body + Send + 'static,
{
    type Response = Response<ResponseBody<ResBody>>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let mut record = CompletionRecord::start(self.logger.clone(), &request);
        let dispatch = self.logger.dispatch().clone();

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let handled = AssertUnwindSafe(inner.call(request))
                .catch_unwind()
                .with_subscriber(dispatch)
                .await;

            match handled {
                Ok(Ok(response)) => {
                    record.status = response.status();
                    let (parts, body) = response.into_parts();
                    Ok(Response::from_parts(parts, ResponseBody::new(body, record)))
                }
                Ok(Err(error)) => {
                    record.finish(StatusCode::INTERNAL_SERVER_ERROR, Outcome::Failed);
                    Err(error)
                }
                Err(panic) => {
                    record.finish(StatusCode::INTERNAL_SERVER_ERROR, Outcome::Panicked);
                    std::panic::resume_unwind(panic)
                }
            }
        })
    }
}

// =============================================================================
// ResponseBody
// =============================================================================

pin_project! {
    /// Response body decorator
    ///
    /// Forwards every frame untouched and counts the data bytes that pass
    /// through. Carries the request's completion record, which is emitted at
    /// end of stream or when the body is dropped.
    pub struct ResponseBody<B> {
        #[pin]
        inner: B,
        record: Option<CompletionRecord>,
    }
}

impl<B: Body> ResponseBody<B> {
    fn new(inner: B, mut record: CompletionRecord) -> Self {
        // Bodies that are already complete may never be polled.
        if inner.is_end_stream() {
            record.outcome = Outcome::Completed;
        }
        Self {
            inner,
            record: Some(record),
        }
    }
}

impl<B: Body> Body for ResponseBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        let polled = this.inner.as_mut().poll_frame(cx);

        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let (Some(record), Some(data)) = (this.record.as_mut(), frame.data_ref()) {
                    record.bytes_written += data.remaining() as u64;
                }
                if this.inner.is_end_stream() {
                    emit(this.record, Outcome::Completed);
                }
            }
            Poll::Ready(Some(Err(_))) => emit(this.record, Outcome::Aborted),
            Poll::Ready(None) => emit(this.record, Outcome::Completed),
            Poll::Pending => {}
        }

        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

fn emit(record: &mut Option<CompletionRecord>, outcome: Outcome) {
    if let Some(mut record) = record.take() {
        record.outcome = outcome;
    }
}

// =============================================================================
// CompletionRecord
// =============================================================================

/// How the request ended, from this middleware's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Body fully produced
    Completed,
    /// Dropped before completion: client went away, body error, or the
    /// request future itself was cancelled
    Aborted,
    /// Inner service returned an error instead of a response
    Failed,
    /// Inner service panicked; the panic is resumed after logging
    Panicked,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Aborted => "aborted",
            Outcome::Failed => "failed",
            Outcome::Panicked => "panicked",
        }
    }
}

/// Per-request state. Emits the log record exactly once, on drop.
///
/// The elapsed time is measured at emission, so it includes body streaming.
struct CompletionRecord {
    logger: Logger,
    request_id: String,
    method: Method,
    path: String,
    started: Instant,
    status: StatusCode,
    bytes_written: u64,
    outcome: Outcome,
}

impl CompletionRecord {
    fn start<B>(logger: Logger, request: &Request<B>) -> Self {
        Self {
            logger,
            request_id: RequestId::of(request)
                .map(|id| id.to_string())
                .unwrap_or_default(),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            started: Instant::now(),
            // An http::Response that never had its status set is 200 OK.
            status: StatusCode::OK,
            bytes_written: 0,
            outcome: Outcome::Aborted,
        }
    }

    fn finish(mut self, status: StatusCode, outcome: Outcome) {
        self.status = status;
        self.outcome = outcome;
    }
}

impl Drop for CompletionRecord {
    fn drop(&mut self) {
        let duration = self.started.elapsed();

        self.logger.in_scope(|| {
            tracing::info!(
                request_id = %self.request_id,
                method = %self.method,
                path = %self.path,
                status = self.status.as_u16(),
                bytes_written = self.bytes_written,
                duration = ?duration,
                duration_ns = duration_ns(duration),
                outcome = self.outcome.as_str(),
                "request completed"
            );
        });
    }
}

fn duration_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full, StreamBody};
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn records(&self) -> Vec<serde_json::Value> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .lines()
                .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
                .filter(|line| line["message"] == "request completed")
                .collect()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn record_for(captured: &Captured, path: &str) -> CompletionRecord {
        let logger = Logger::with_primary(&LogConfig::default(), captured.clone());
        let request = Request::get(path).body(()).unwrap();
        CompletionRecord::start(logger, &request)
    }

    #[test]
    fn test_record_defaults_to_200_and_emits_on_drop() {
        let captured = Captured::default();
        drop(record_for(&captured, "/idle"));

        let records = captured.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["status"], 200);
        assert_eq!(records[0]["path"], "/idle");
        assert_eq!(records[0]["method"], "GET");
        assert_eq!(records[0]["request_id"], "");
        assert_eq!(records[0]["outcome"], "aborted");
    }

    #[tokio::test]
    async fn test_body_counts_bytes_and_emits_once_at_end() {
        let captured = Captured::default();
        let body = ResponseBody::new(
            Full::new(Bytes::from_static(b"hello world")),
            record_for(&captured, "/hello"),
        );

        let collected = body.collect().await.unwrap().to_bytes();

        assert_eq!(&collected[..], b"hello world");
        let records = captured.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["bytes_written"], 11);
        assert_eq!(records[0]["outcome"], "completed");
    }

    #[tokio::test]
    async fn test_body_sums_multiple_frames() {
        let captured = Captured::default();
        let chunks = futures::stream::iter(
            ["ab", "cde", "fghi"]
                .map(|chunk| Ok::<_, io::Error>(Frame::data(Bytes::from_static(chunk.as_bytes())))),
        );
        let body = ResponseBody::new(StreamBody::new(chunks), record_for(&captured, "/stream"));

        let collected = body.collect().await.unwrap().to_bytes();

        assert_eq!(collected.len(), 9);
        assert_eq!(captured.records()[0]["bytes_written"], 9);
    }

    #[test]
    fn test_empty_body_is_completed_without_polling() {
        let captured = Captured::default();
        let body = ResponseBody::new(Full::new(Bytes::new()), record_for(&captured, "/empty"));
        drop(body);

        let records = captured.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["bytes_written"], 0);
        assert_eq!(records[0]["outcome"], "completed");
    }

    #[test]
    fn test_dropped_body_is_aborted() {
        let captured = Captured::default();
        let body = ResponseBody::new(
            Full::new(Bytes::from_static(b"never sent")),
            record_for(&captured, "/gone"),
        );
        drop(body);

        let records = captured.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["bytes_written"], 0);
        assert_eq!(records[0]["outcome"], "aborted");
    }

    #[tokio::test]
    async fn test_layer_from_config_appends_records_to_file() {
        use tower::{ServiceExt, service_fn};

        let path = std::env::temp_dir().join(format!("platform-layer-{}.log", uuid::Uuid::new_v4()));
        let layer = RequestLoggerLayer::from_config(&LogConfig::with_file(&path));
        let service = layer.layer(service_fn(|_: Request<()>| async {
            Ok::<_, io::Error>(Response::new(Full::new(Bytes::from_static(b"pong"))))
        }));

        let response = service
            .oneshot(Request::get("/ping").body(()).unwrap())
            .await
            .unwrap();
        response.into_body().collect().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let record: serde_json::Value =
            serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(record["message"], "request completed");
        assert_eq!(record["path"], "/ping");
        assert_eq!(record["bytes_written"], 4);
    }

    #[test]
    fn test_duration_ns_saturates() {
        assert_eq!(duration_ns(Duration::from_nanos(1500)), 1500);
        assert_eq!(duration_ns(Duration::MAX), u64::MAX);
    }
}
