//! Tower middleware that feeds monitorable exchanges into the pipeline
//!
//! `MonitorLayer` wraps a router (preferably via `Router::route_layer`, so
//! route parameters are available). Excluded URLs go straight to the inner
//! service. For everything else the request is snapshotted up front, the
//! request body is optionally observed while the handler reads it, and once
//! a response with a monitored status has been fully produced the exchange
//! is submitted to the [`ErrorPipeline`] in the background. The response
//! that reaches the client is never altered or delayed.

use crate::capture::body::{BodyRecorder, FinishHook, ObservedBody};
use crate::capture::shim::{
    client_ip, is_excluded, parse_body, query_params, request_url, sanitize_headers,
};
use crate::config::{ErrorMonitoringConfig, ReportOptions};
use crate::pipeline::ErrorPipeline;
use crate::record::{ErrorDescriptor, RequestSnapshot, ResponseSnapshot};
use axum::body::Body;
use axum::extract::{FromRequestParts, RawPathParams};
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tower::{Layer, Service};

/// Immutable capture settings shared by every service clone
struct CaptureSettings {
    status_codes: HashSet<u16>,
    exclude_paths: Vec<String>,
    options: ReportOptions,
    pipeline: Arc<ErrorPipeline>,
}

/// Layer installing [`MonitorService`]
#[derive(Clone)]
pub struct MonitorLayer {
    settings: Arc<CaptureSettings>,
}

impl MonitorLayer {
    pub fn new(config: &ErrorMonitoringConfig, pipeline: Arc<ErrorPipeline>) -> Self {
        Self {
            settings: Arc::new(CaptureSettings {
                status_codes: config.status_set(),
                exclude_paths: config.exclude_paths.clone(),
                options: config.report_options(),
                pipeline,
            }),
        }
    }
}

impl<S> Layer<S> for MonitorLayer {
    type Service = MonitorService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MonitorService {
            inner,
            settings: Arc::clone(&self.settings),
        }
    }
}

/// Service observing each exchange for monitorable error responses
#[derive(Clone)]
pub struct MonitorService<S> {
    inner: S,
    settings: Arc<CaptureSettings>,
}

impl<S> Service<Request<Body>> for MonitorService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let url = request_url(request.uri());
        if is_excluded(&url, &self.settings.exclude_paths) {
            debug!("Skipping monitoring for excluded URL {}", url);
            return Box::pin(self.inner.call(request));
        }

        // The ready service is the one that must handle this request
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let settings = Arc::clone(&self.settings);

        Box::pin(async move {
            let (exchange, request) = Exchange::begin(request, url, settings).await;
            let response = inner.call(request).await?;
            Ok(exchange.complete(response))
        })
    }
}

/// State carried from the start of an exchange to its completion
struct Exchange {
    settings: Arc<CaptureSettings>,
    request: RequestSnapshot,
    request_body: Option<BodyRecorder>,
}

impl Exchange {
    /// Snapshot the request and attach the request-body observer if enabled
    async fn begin(
        request: Request<Body>,
        url: String,
        settings: Arc<CaptureSettings>,
    ) -> (Self, Request<Body>) {
        let options = settings.options;
        let (mut parts, body) = request.into_parts();

        let mut snapshot = RequestSnapshot::new(parts.method.as_str(), url);
        snapshot.query = query_params(&parts.uri);
        if let Ok(params) = RawPathParams::from_request_parts(&mut parts, &()).await {
            snapshot.params = params
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect();
        }
        if options.include_headers {
            snapshot.headers = Some(sanitize_headers(&parts.headers));
        }

        let request = Request::from_parts(parts, body);
        snapshot.ip = client_ip(&request);

        let (request_body, request) = if options.include_request_body {
            let recorder = BodyRecorder::new();
            let observed = request
                .map(|body| Body::new(ObservedBody::new(body, Some(recorder.clone()), None)));
            (Some(recorder), observed)
        } else {
            (None, request)
        };

        let exchange = Self {
            settings,
            request: snapshot,
            request_body,
        };
        (exchange, request)
    }

    /// Return the response, wrapped with a finish observer if it is monitorable
    fn complete(self, response: Response<Body>) -> Response<Body> {
        let status = response.status().as_u16();
        if !self.settings.status_codes.contains(&status) {
            return response;
        }

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cannot monitor {}: no async runtime ({})", self.request.endpoint(), e);
                return response;
            }
        };

        let response_body = self
            .settings
            .options
            .include_response_body
            .then(BodyRecorder::new);
        let recorder = response_body.clone();

        let on_finish: FinishHook = Box::new(move || self.submit(status, response_body, &handle));
        response.map(|body| Body::new(ObservedBody::new(body, recorder, Some(on_finish))))
    }

    /// Hand the finished exchange to the pipeline without waiting on it
    fn submit(self, status: u16, response_body: Option<BodyRecorder>, handle: &Handle) {
        let mut request = self.request;
        if let Some(recorder) = &self.request_body {
            request.body = parse_body(&recorder.take());
        }

        let error = ErrorDescriptor::for_status(status, &request.method, &request.url);
        let response = ResponseSnapshot {
            status_code: status,
            body: response_body.and_then(|recorder| parse_body(&recorder.take())),
        };

        debug!("Monitored {} finished with {}", request.endpoint(), status);
        let _runtime = handle.enter();
        drop(self.settings.pipeline.submit(error, request, Some(response)));
    }
}
