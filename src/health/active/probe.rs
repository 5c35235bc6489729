//! Health probe requests and the transport that sends them.
//!
//! # Responsibilities
//! - Build the probe request for a destination
//! - Send it over HTTP/1.1 or HTTP/2 according to the cluster's version settings
//!
//! # Design Decisions
//! - The transport is a trait so clusters can be probed through any client
//! - The version policy travels with the request as an extension
//! - Timeouts are applied by the caller, not the transport

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, Version};
use futures_util::future::BoxFuture;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::cluster::{ClusterModel, DestinationModel};
use crate::config::VersionPolicy;
use crate::health::error::ProbeError;

/// `User-Agent` sent with every probe.
pub const PROBE_USER_AGENT: &str = concat!("proxy-health-probe/", env!("CARGO_PKG_VERSION"));

/// Sends probe requests.
pub trait HealthProbeTransport: Send + Sync {
    fn send(&self, request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, ProbeError>>;
}

/// Parse a configured HTTP version.
pub fn parse_http_version(raw: &str) -> Option<Version> {
    match raw.trim() {
        "1.0" => Some(Version::HTTP_10),
        "1.1" => Some(Version::HTTP_11),
        "2" | "2.0" => Some(Version::HTTP_2),
        _ => None,
    }
}

/// Hyper based transport with one HTTP/1 and one HTTP/2 (prior knowledge) pool.
#[derive(Clone)]
pub struct HyperProbeTransport {
    http1: Client<HttpConnector, Body>,
    http2: Client<HttpConnector, Body>,
}

impl HyperProbeTransport {
    pub fn new() -> Self {
        let http1 = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let http2 = Client::builder(TokioExecutor::new())
            .http2_only(true)
            .build(HttpConnector::new());
        Self { http1, http2 }
    }
}

impl Default for HyperProbeTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a request should go over HTTP/2.
///
/// Cleartext has no negotiation, so `RequestVersionOrLower` always downgrades
/// to HTTP/1.1 and `RequestVersionOrHigher` keeps the requested version.
fn use_http2(version: Version, policy: VersionPolicy) -> bool {
    version == Version::HTTP_2 && policy != VersionPolicy::RequestVersionOrLower
}

impl HealthProbeTransport for HyperProbeTransport {
    fn send(&self, mut request: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, ProbeError>> {
        let policy = request
            .extensions()
            .get::<VersionPolicy>()
            .copied()
            .unwrap_or_default();
        let client = if use_http2(request.version(), policy) {
            &self.http2
        } else {
            if request.version() == Version::HTTP_2 {
                *request.version_mut() = Version::HTTP_11;
            }
            &self.http1
        };

        Box::pin(async move {
            let response = client
                .request(request)
                .await
                .map_err(|e| ProbeError::Transport(e.to_string()))?;
            Ok(response.map(Body::new))
        })
    }
}

/// Builds probe requests.
pub trait ProbingRequestFactory: Send + Sync {
    fn create_request(
        &self,
        cluster: &ClusterModel,
        destination: &DestinationModel,
    ) -> Result<Request<Body>, ProbeError>;
}

/// `GET <health or primary address><path>[?query]`.
#[derive(Debug, Default)]
pub struct DefaultProbingRequestFactory;

impl DefaultProbingRequestFactory {
    /// Probe URI for a destination.
    pub fn probe_uri(cluster: &ClusterModel, destination: &DestinationModel) -> String {
        let active = &cluster.config.health_check.active;
        let base = destination.probe_address().as_str().trim_end_matches('/');

        let mut uri = String::with_capacity(base.len() + active.path.len() + 1);
        uri.push_str(base);
        if !active.path.starts_with('/') {
            uri.push('/');
        }
        uri.push_str(&active.path);

        if let Some(query) = active.query.as_deref().filter(|q| !q.is_empty()) {
            uri.push('?');
            uri.push_str(query.trim_start_matches('?'));
        }
        uri
    }
}

impl ProbingRequestFactory for DefaultProbingRequestFactory {
    fn create_request(
        &self,
        cluster: &ClusterModel,
        destination: &DestinationModel,
    ) -> Result<Request<Body>, ProbeError> {
        let http = &cluster.config.http_request;
        let version = parse_http_version(&http.version).unwrap_or(Version::HTTP_11);

        let mut builder = Request::builder()
            .method("GET")
            .uri(Self::probe_uri(cluster, destination))
            .version(version)
            .header(header::USER_AGENT, PROBE_USER_AGENT);

        if let Some(host) = destination.config.host.as_deref() {
            let value = HeaderValue::from_str(host).map_err(|e| ProbeError::Request(e.to_string()))?;
            builder = builder.header(header::HOST, value);
        }

        let mut request = builder
            .body(Body::empty())
            .map_err(|e| ProbeError::Request(e.to_string()))?;
        request.extensions_mut().insert(http.version_policy);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::test_support::StaticTransport;
    use crate::config::{ClusterConfig, DestinationConfig};

    fn models(address: &str, health: Option<&str>) -> (ClusterModel, DestinationModel) {
        let mut destination = DestinationConfig::new("d1", address);
        destination.health = health.map(String::from);
        (
            ClusterModel::new(ClusterConfig::new("web"), StaticTransport::new()),
            DestinationModel::from_config(destination).unwrap(),
        )
    }

    #[test]
    fn test_parse_http_version() {
        assert_eq!(parse_http_version("1.0"), Some(Version::HTTP_10));
        assert_eq!(parse_http_version("1.1"), Some(Version::HTTP_11));
        assert_eq!(parse_http_version("2"), Some(Version::HTTP_2));
        assert_eq!(parse_http_version("2.0"), Some(Version::HTTP_2));
        assert_eq!(parse_http_version("3"), None);
    }

    #[test]
    fn test_uri_uses_health_address_and_path() {
        let (mut cluster, destination) = models("http://10.0.0.1:80", Some("http://10.0.0.1:9000/"));
        cluster.config.health_check.active.path = "/healthz".into();
        assert_eq!(
            DefaultProbingRequestFactory::probe_uri(&cluster, &destination),
            "http://10.0.0.1:9000/healthz"
        );
    }

    #[test]
    fn test_uri_keeps_base_path_and_appends_query() {
        let (mut cluster, destination) = models("http://10.0.0.1/api/", None);
        cluster.config.health_check.active.path = "status".into();
        cluster.config.health_check.active.query = Some("?deep=1".into());
        assert_eq!(
            DefaultProbingRequestFactory::probe_uri(&cluster, &destination),
            "http://10.0.0.1/api/status?deep=1"
        );
    }

    #[test]
    fn test_request_headers_and_version() {
        let (mut cluster, destination) = {
            let mut destination = DestinationConfig::new("d1", "http://10.0.0.1");
            destination.host = Some("internal.example".into());
            (
                ClusterModel::new(ClusterConfig::new("web"), StaticTransport::new()),
                DestinationModel::from_config(destination).unwrap(),
            )
        };
        cluster.config.http_request.version = "2".into();
        cluster.config.http_request.version_policy = VersionPolicy::RequestVersionExact;

        let request = DefaultProbingRequestFactory
            .create_request(&cluster, &destination)
            .unwrap();
        assert_eq!(request.method(), "GET");
        assert_eq!(request.version(), Version::HTTP_2);
        assert_eq!(request.headers()[header::USER_AGENT], PROBE_USER_AGENT);
        assert_eq!(request.headers()[header::HOST], "internal.example");
        assert_eq!(
            request.extensions().get::<VersionPolicy>(),
            Some(&VersionPolicy::RequestVersionExact)
        );
    }

    #[test]
    fn test_version_selection() {
        assert!(!use_http2(Version::HTTP_11, VersionPolicy::RequestVersionExact));
        assert!(!use_http2(Version::HTTP_2, VersionPolicy::RequestVersionOrLower));
        assert!(use_http2(Version::HTTP_2, VersionPolicy::RequestVersionOrHigher));
        assert!(use_http2(Version::HTTP_2, VersionPolicy::RequestVersionExact));
    }
}
