use crate::{
    admission::{self, EncodeError},
    core::{AssumeRole, AuthToken, Exchange, Injector, Secrets, TargetRoles, TokenStore},
    exchange::Reply,
    metrics::Metrics,
};
use chrono::Utc;
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use serde_json::json;
use std::{convert::Infallible, sync::Arc};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Serves both the admission webhook and the credential exchange endpoint.
pub(crate) struct Broker<S, K, A> {
    inner: Arc<Inner<S, K, A>>,
}

struct Inner<S, K, A> {
    injector: Injector<S, K>,
    exchange: Exchange<S, A>,
    metrics: Metrics,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to decode admission object: {0}")]
    Object(#[source] serde_json::Error),

    #[error(transparent)]
    Review(#[from] EncodeError),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

/// What an inbound request asks of the broker, decided by its method.
#[derive(Debug, PartialEq)]
enum Inbound {
    Exchange(Option<AuthToken>),
    Admission,
    Unsupported(http::Method),
}

type Body = http_body_util::Full<bytes::Bytes>;

// === impl Broker ===

impl<S, K, A> Clone for Broker<S, K, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, K, A> Broker<S, K, A>
where
    S: TokenStore + Send + Sync + 'static,
    K: TargetRoles + Secrets + Send + Sync + 'static,
    A: AssumeRole + Send + Sync + 'static,
{
    pub(crate) fn new(injector: Injector<S, K>, exchange: Exchange<S, A>, metrics: Metrics) -> Self {
        Self {
            inner: Arc::new(Inner {
                injector,
                exchange,
                metrics,
            }),
        }
    }

    async fn admit(self, body: bytes::Bytes) -> Result<Response<Body>, Error> {
        let review = match admission::parse(&body) {
            Ok(review) => review,
            Err(error) => {
                warn!(%error, "Invalid admission review");
                return json_response(
                    http::StatusCode::BAD_REQUEST,
                    None,
                    json!({"output": "Invalid admission review"}),
                );
            }
        };

        let req = admission::request(&review).map_err(Error::Object)?;
        let injection = self.inner.injector.admit(&req).await;
        self.inner.metrics.admitted(injection.outcome());

        let rsp = admission::respond(&review, &injection)?;
        trace!(?rsp);
        json_response(http::StatusCode::OK, None, rsp)
    }

    async fn exchange(self, token: Option<AuthToken>) -> Result<Response<Body>, Error> {
        let now = Utc::now();
        let res = self.inner.exchange.exchange(token, now).await;
        let reply = Reply::new(res, now);
        self.inner.metrics.exchanged(reply.label());
        reply_response(reply)
    }
}

impl<S, K, A, B> tower::Service<Request<B>> for Broker<S, K, A>
where
    S: TokenStore + Send + Sync + 'static,
    K: TargetRoles + Secrets + Send + Sync + 'static,
    A: AssumeRole + Send + Sync + 'static,
    B: hyper::body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Error>,
{
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // The request is not traced as a whole: its headers may carry a token.
        let inbound = Inbound::classify(&req);
        let broker = self.clone();
        Box::pin(async move {
            match inbound {
                Inbound::Admission => {
                    let body = req
                        .into_body()
                        .collect()
                        .await
                        .map_err(Into::<Error>::into)?
                        .to_bytes();
                    broker.admit(body).await
                }
                Inbound::Exchange(token) => broker.exchange(token).await,
                Inbound::Unsupported(method) => {
                    debug!(%method, "Unsupported invocation");
                    reply_response(Reply::unsupported())
                }
            }
        })
    }
}

// === impl Error ===

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

// === impl Inbound ===

impl Inbound {
    fn classify<B>(req: &Request<B>) -> Self {
        match *req.method() {
            http::Method::POST => Self::Admission,
            http::Method::GET => Self::Exchange(
                req.headers()
                    .get(http::header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(AuthToken::from_header),
            ),
            ref method => Self::Unsupported(method.clone()),
        }
    }
}

fn reply_response(reply: Reply) -> Result<Response<Body>, Error> {
    let Reply {
        status,
        cache_control,
        body,
    } = reply;
    json_response(status, Some(&cache_control), body)
}

fn json_response(
    status: http::StatusCode,
    cache_control: Option<&str>,
    body: serde_json::Value,
) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&body)?;
    let mut rsp = Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json");
    if let Some(cache_control) = cache_control {
        rsp = rsp.header(http::header::CACHE_CONTROL, cache_control);
    }
    Ok(rsp.body(Body::from(bytes)).expect("json response must be valid"))
}
