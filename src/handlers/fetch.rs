use crate::{
    config::Config,
    errors::{AppError, AppResult},
    ops::{
        registry::{Args, OperationHandler},
        types::{OperationKind, Outcome, PathParam},
    },
    sandbox::{PathGuard, PathIntent},
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Url};
use std::time::Duration;

const PATH_PARAMS: &[PathParam] = &[PathParam { name: "save_path", intent: PathIntent::Create }];

pub struct RemoteFetcher {
    http: Client,
}

impl RemoteFetcher {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> { Self::with_timeout(cfg.limits.fetch_timeout) }

    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("filegate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    async fn download(&self, url: Url) -> AppResult<Bytes> {
        let response = self.http.get(url).send().await.map_err(upstream_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamError(status.as_u16()));
        }
        response.bytes().await.map_err(upstream_error)
    }
}

fn upstream_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::UpstreamTimeout
    } else {
        AppError::UpstreamUnreachable(e.without_url().to_string())
    }
}

fn parse_url(raw: &str) -> AppResult<Url> {
    let url = Url::parse(raw).map_err(|e| AppError::InvalidArgument(format!("api_url: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AppError::InvalidArgument(format!("api_url: unsupported scheme {other}"))),
    }
}

#[async_trait]
impl OperationHandler for RemoteFetcher {
    fn kind(&self) -> OperationKind { OperationKind::FetchApiData }
    fn path_params(&self) -> &'static [PathParam] { PATH_PARAMS }
    fn params(&self) -> &'static [&'static str] { &["api_url"] }

    async fn execute(&self, _guard: &PathGuard, args: Args) -> AppResult<Outcome> {
        let url = parse_url(args.param("api_url")?)?;
        let dest = args.path("save_path")?;
        let body = self.download(url).await?;
        tokio::fs::write(dest.as_path(), &body).await.map_err(|e| AppError::WriteFailed(e.to_string()))?;
        tracing::debug!(dest = %dest, bytes = body.len(), "remote data saved");
        Ok(Outcome::Written {
            message: "Data fetched and saved successfully",
            field: "save_path",
            path: dest.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use std::collections::HashMap;
    use std::net::SocketAddr;

    async fn upstream() -> SocketAddr {
        let app = Router::new()
            .route("/ok", get(|| async { "{\"items\":[1,2,3]}" }))
            .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "nope") }))
            .route("/broken", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn args(guard: &PathGuard, url: String, save: &str) -> Args {
        let dest = guard.validate(save, PathIntent::Create).unwrap();
        Args::new(HashMap::from([("save_path", dest)]), HashMap::from([("api_url".to_string(), url)]))
    }

    #[tokio::test]
    async fn saves_body_verbatim_and_overwrites() {
        let addr = upstream().await;
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("out.json"), "stale content that is longer").unwrap();
        let guard = PathGuard::new(tmp.path()).unwrap();
        let fetcher = RemoteFetcher::with_timeout(Duration::from_secs(2)).unwrap();
        let out = fetcher.execute(&guard, args(&guard, format!("http://{addr}/ok"), "out.json")).await.unwrap();
        assert!(matches!(out, Outcome::Written { field: "save_path", .. }));
        assert_eq!(std::fs::read_to_string(tmp.path().join("out.json")).unwrap(), "{\"items\":[1,2,3]}");
    }

    #[tokio::test]
    async fn non_success_status_writes_nothing() {
        let addr = upstream().await;
        let tmp = tempfile::tempdir().unwrap();
        let guard = PathGuard::new(tmp.path()).unwrap();
        let fetcher = RemoteFetcher::with_timeout(Duration::from_secs(2)).unwrap();
        for (route, code) in [("missing", 404), ("broken", 500)] {
            let err = fetcher
                .execute(&guard, args(&guard, format!("http://{addr}/{route}"), "out.json"))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::UpstreamError(c) if c == code), "{err:?}");
        }
        assert!(!tmp.path().join("out.json").exists());
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let addr = upstream().await;
        let tmp = tempfile::tempdir().unwrap();
        let guard = PathGuard::new(tmp.path()).unwrap();
        let fetcher = RemoteFetcher::with_timeout(Duration::from_millis(200)).unwrap();
        let err = fetcher
            .execute(&guard, args(&guard, format!("http://{addr}/slow"), "out.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamTimeout), "{err:?}");
        assert!(!tmp.path().join("out.json").exists());
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let tmp = tempfile::tempdir().unwrap();
        let guard = PathGuard::new(tmp.path()).unwrap();
        let fetcher = RemoteFetcher::with_timeout(Duration::from_secs(1)).unwrap();
        for url in ["file:///etc/passwd", "not a url"] {
            let err = fetcher.execute(&guard, args(&guard, url.to_string(), "out.json")).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidArgument(_)), "{err:?}");
        }
    }
}
