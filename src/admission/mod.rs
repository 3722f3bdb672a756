//! Admission Gateway
//!
//! Every API request and every WebSocket upgrade is evaluated here before any
//! business logic or connection state exists. Two profiles are configured,
//! one per kind of traffic, each backed by an optional [`PolicyProvider`]:
//!
//! - no provider: bypass mode, everything is allowed
//! - provider answers Deny(RateLimit): 429
//! - provider answers Deny(other): 403
//! - provider fails or times out: 503 for requests, 500 for upgrades
//!
//! Provider failures never grant access.

pub mod middleware;
pub mod policy;
pub mod rate_limit;
pub mod remote;
pub mod rules;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode, Uri};
use serde::Serialize;

pub use policy::{DisabledPolicy, LocalPolicy, PolicyMode, PolicyProvider};
pub use rate_limit::{RateLimitConfig, SlidingWindowLimiter};
pub use remote::RemotePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonKind {
    RateLimit,
    BotSuspected,
    ShieldTriggered,
    None,
}

impl fmt::Display for ReasonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReasonKind::RateLimit => "rate limit",
            ReasonKind::BotSuspected => "bot suspected",
            ReasonKind::ShieldTriggered => "shield triggered",
            ReasonKind::None => "no reason",
        };
        f.write_str(name)
    }
}

/// One admission verdict, produced fresh per check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionDecision {
    pub outcome: Outcome,
    pub reason: ReasonKind,
}

impl AdmissionDecision {
    pub fn allow() -> Self {
        Self {
            outcome: Outcome::Allow,
            reason: ReasonKind::None,
        }
    }

    pub fn deny(reason: ReasonKind) -> Self {
        Self {
            outcome: Outcome::Deny,
            reason,
        }
    }

    pub fn is_denied(&self) -> bool {
        self.outcome == Outcome::Deny
    }
}

/// Which policy profile applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Ordinary HTTP requests
    Http,
    /// WebSocket upgrade attempts
    Upgrade,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Http => "http",
            Profile::Upgrade => "upgrade",
        }
    }
}

/// What a policy provider sees of an inbound request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionContext {
    pub profile: Profile,
    /// Client address used as the rate-limit key
    pub client_key: String,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub user_agent: Option<String>,
}

impl AdmissionContext {
    pub fn from_request(
        profile: Profile,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        trust_forwarded: bool,
    ) -> Self {
        Self {
            profile,
            client_key: client_key(headers, peer, trust_forwarded),
            method: method.as_str().to_string(),
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            user_agent: headers
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }
}

/// Rate-limit key for a request.
///
/// Forwarding headers are client-controlled, so they are only read when a
/// proxy in front of us is trusted to set them. The trusted proxy appends the
/// address it saw, which makes the rightmost `x-forwarded-for` hop the one to
/// key on; `x-real-ip` is the fallback. Otherwise the peer address is used.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        if let Some(last) = header("x-forwarded-for").and_then(|xff| {
            xff.rsplit(',')
                .map(str::trim)
                .find(|hop| !hop.is_empty())
        }) {
            return last.to_string();
        }
        if let Some(real_ip) = header("x-real-ip") {
            return real_ip.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Error type for admission checks
#[derive(Debug)]
pub enum AdmissionError {
    /// Policy denied the request
    Denied(ReasonKind),
    /// Policy provider failed to produce a decision
    Provider(String),
    /// Policy provider did not answer in time
    Timeout(Duration),
}

impl AdmissionError {
    /// HTTP status surfaced to the client for this profile
    pub fn status_code(&self, profile: Profile) -> StatusCode {
        match (self, profile) {
            (AdmissionError::Denied(ReasonKind::RateLimit), _) => StatusCode::TOO_MANY_REQUESTS,
            (AdmissionError::Denied(_), _) => StatusCode::FORBIDDEN,
            (_, Profile::Http) => StatusCode::SERVICE_UNAVAILABLE,
            (_, Profile::Upgrade) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message
    pub fn public_message(&self) -> &'static str {
        match self {
            AdmissionError::Denied(ReasonKind::RateLimit) => "Too many requests.",
            AdmissionError::Denied(_) => "Forbidden.",
            _ => "Service Unavailable",
        }
    }
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::Denied(reason) => write!(f, "Admission denied: {}", reason),
            AdmissionError::Provider(msg) => write!(f, "Policy provider error: {}", msg),
            AdmissionError::Timeout(after) => {
                write!(f, "Policy provider timed out after {:?}", after)
            }
        }
    }
}

impl std::error::Error for AdmissionError {}

/// Policy settings shared by both profiles
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Provider key; `None` selects bypass mode
    pub key: Option<String>,
    pub mode: PolicyMode,
    /// Remote provider endpoint; `None` evaluates rules locally
    pub url: Option<String>,
    pub timeout: Duration,
    pub http_limit: RateLimitConfig,
    pub upgrade_limit: RateLimitConfig,
    /// Key clients on forwarding headers; only safe behind a proxy that sets them
    pub trust_forwarded: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            key: None,
            mode: PolicyMode::Live,
            url: None,
            timeout: Duration::from_millis(2000),
            http_limit: RateLimitConfig::http(),
            upgrade_limit: RateLimitConfig::upgrade(),
            trust_forwarded: false,
        }
    }
}

impl PolicyConfig {
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_mode(mut self, mode: PolicyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_trust_forwarded(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }
}

pub struct AdmissionGateway {
    http: Option<Arc<dyn PolicyProvider>>,
    upgrade: Option<Arc<dyn PolicyProvider>>,
    timeout: Duration,
    trust_forwarded: bool,
}

impl Default for AdmissionGateway {
    fn default() -> Self {
        Self::bypass()
    }
}

impl AdmissionGateway {
    /// Gateway that allows everything
    pub fn bypass() -> Self {
        Self {
            http: None,
            upgrade: None,
            timeout: PolicyConfig::default().timeout,
            trust_forwarded: false,
        }
    }

    pub fn new(http: Arc<dyn PolicyProvider>, upgrade: Arc<dyn PolicyProvider>) -> Self {
        Self {
            http: Some(http),
            upgrade: Some(upgrade),
            timeout: PolicyConfig::default().timeout,
            trust_forwarded: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_trust_forwarded(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    /// Admission context for a request, keyed per this gateway's proxy trust
    pub fn context(
        &self,
        profile: Profile,
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> AdmissionContext {
        AdmissionContext::from_request(profile, method, uri, headers, peer, self.trust_forwarded)
    }

    /// Build providers from settings
    pub fn from_config(config: &PolicyConfig) -> Result<Self, AdmissionError> {
        let Some(key) = config.key.as_deref() else {
            log::warn!("no policy key configured, admission control is bypassed");
            return Ok(Self::bypass());
        };
        if config.trust_forwarded {
            log::info!("trusting x-forwarded-for from the fronting proxy");
        }

        let gateway = match config.url.as_deref() {
            Some(url) => {
                let remote = |profile, limit: &RateLimitConfig| {
                    RemotePolicy::new(url, key, profile, limit.clone(), config.mode, config.timeout)
                };
                Self::new(
                    Arc::new(remote(Profile::Http, &config.http_limit)?),
                    Arc::new(remote(Profile::Upgrade, &config.upgrade_limit)?),
                )
            }
            None => Self::new(
                Arc::new(LocalPolicy::new(config.http_limit.clone(), config.mode)),
                Arc::new(LocalPolicy::new(config.upgrade_limit.clone(), config.mode)),
            ),
        };
        log::info!(
            "admission control enabled (provider={}, mode={:?})",
            gateway.provider_name(),
            config.mode
        );
        Ok(gateway
            .with_timeout(config.timeout)
            .with_trust_forwarded(config.trust_forwarded))
    }

    pub fn is_bypass(&self) -> bool {
        self.http.is_none() && self.upgrade.is_none()
    }

    pub fn provider_name(&self) -> &'static str {
        self.http
            .as_ref()
            .or(self.upgrade.as_ref())
            .map_or("disabled", |p| p.name())
    }

    fn provider(&self, profile: Profile) -> Option<&Arc<dyn PolicyProvider>> {
        match profile {
            Profile::Http => self.http.as_ref(),
            Profile::Upgrade => self.upgrade.as_ref(),
        }
    }

    /// Ask the profile's provider for a decision
    pub async fn evaluate(
        &self,
        ctx: &AdmissionContext,
    ) -> Result<AdmissionDecision, AdmissionError> {
        let Some(provider) = self.provider(ctx.profile) else {
            return Ok(AdmissionDecision::allow());
        };

        let result = match tokio::time::timeout(self.timeout, provider.evaluate(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(AdmissionError::Timeout(self.timeout)),
        };
        if let Err(e) = &result {
            log::error!(
                "admission check failed for {} {} ({}): {}",
                ctx.method,
                ctx.path,
                ctx.profile.as_str(),
                e
            );
        }
        result
    }

    /// `Ok` when admitted; a denial becomes [`AdmissionError::Denied`]
    pub async fn admit(&self, ctx: &AdmissionContext) -> Result<(), AdmissionError> {
        let decision = self.evaluate(ctx).await?;
        if decision.is_denied() {
            log::info!(
                "denied {} {} from {} ({})",
                ctx.method,
                ctx.path,
                ctx.client_key,
                decision.reason
            );
            return Err(AdmissionError::Denied(decision.reason));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;

    use axum::http::HeaderValue;

    use super::*;

    struct Fixed(Result<AdmissionDecision, &'static str>);

    impl PolicyProvider for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn evaluate<'a>(
            &'a self,
            _ctx: &'a AdmissionContext,
        ) -> Pin<Box<dyn Future<Output = Result<AdmissionDecision, AdmissionError>> + Send + 'a>>
        {
            let result = self.0.map_err(|m| AdmissionError::Provider(m.to_string()));
            Box::pin(async move { result })
        }
    }

    struct Hanging;

    impl PolicyProvider for Hanging {
        fn name(&self) -> &'static str {
            "hanging"
        }

        fn evaluate<'a>(
            &'a self,
            _ctx: &'a AdmissionContext,
        ) -> Pin<Box<dyn Future<Output = Result<AdmissionDecision, AdmissionError>> + Send + 'a>>
        {
            Box::pin(std::future::pending())
        }
    }

    fn ctx(profile: Profile) -> AdmissionContext {
        AdmissionContext::from_request(
            profile,
            &Method::GET,
            &Uri::from_static("/matches?limit=5"),
            &HeaderMap::new(),
            Some("10.0.0.9:5555".parse().unwrap()),
            false,
        )
    }

    fn gateway(result: Result<AdmissionDecision, &'static str>) -> AdmissionGateway {
        let provider: Arc<dyn PolicyProvider> = Arc::new(Fixed(result));
        AdmissionGateway::new(Arc::clone(&provider), provider)
    }

    #[tokio::test]
    async fn test_bypass_allows() {
        let gateway = AdmissionGateway::bypass();
        assert!(gateway.is_bypass());
        assert!(gateway.admit(&ctx(Profile::Upgrade)).await.is_ok());
        assert!(AdmissionGateway::from_config(&PolicyConfig::default())
            .unwrap()
            .is_bypass());
    }

    #[tokio::test]
    async fn test_denial_maps_to_status() {
        let limited = gateway(Ok(AdmissionDecision::deny(ReasonKind::RateLimit)));
        let err = limited.admit(&ctx(Profile::Http)).await.unwrap_err();
        assert_eq!(err.status_code(Profile::Http), StatusCode::TOO_MANY_REQUESTS);

        let bot = gateway(Ok(AdmissionDecision::deny(ReasonKind::BotSuspected)));
        let err = bot.admit(&ctx(Profile::Upgrade)).await.unwrap_err();
        assert_eq!(err.status_code(Profile::Upgrade), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_provider_failure_fails_closed() {
        let broken = gateway(Err("connection refused"));
        let err = broken.admit(&ctx(Profile::Http)).await.unwrap_err();
        assert_eq!(err.status_code(Profile::Http), StatusCode::SERVICE_UNAVAILABLE);
        let err = broken.admit(&ctx(Profile::Upgrade)).await.unwrap_err();
        assert_eq!(
            err.status_code(Profile::Upgrade),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_timeout_fails_closed() {
        let provider: Arc<dyn PolicyProvider> = Arc::new(Hanging);
        let gateway = AdmissionGateway::new(Arc::clone(&provider), provider)
            .with_timeout(Duration::from_millis(50));

        let err = gateway.admit(&ctx(Profile::Http)).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Timeout(_)));
    }

    #[test]
    fn test_client_key_ignores_forwarding_by_default() {
        let peer = Some("192.168.1.2:4000".parse().unwrap());
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("172.16.0.1"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));

        assert_eq!(client_key(&headers, peer, false), "192.168.1.2");
        assert_eq!(client_key(&headers, None, false), "unknown");
    }

    #[test]
    fn test_client_key_behind_trusted_proxy() {
        let peer = Some("10.0.0.1:4000".parse().unwrap());
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers, peer, true), "10.0.0.1");

        headers.insert("x-real-ip", HeaderValue::from_static("172.16.0.1"));
        assert_eq!(client_key(&headers, peer, true), "172.16.0.1");

        // the client wrote the left hop, the proxy appended the right one
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 203.0.113.7 ,"),
        );
        assert_eq!(client_key(&headers, peer, true), "203.0.113.7");
    }

    #[test]
    fn test_gateway_context_uses_configured_trust() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        let peer = Some("10.0.0.1:4000".parse().unwrap());
        let uri = Uri::from_static("/ws");

        let direct = AdmissionGateway::bypass();
        let ctx = direct.context(Profile::Upgrade, &Method::GET, &uri, &headers, peer);
        assert_eq!(ctx.client_key, "10.0.0.1");

        let proxied = AdmissionGateway::bypass().with_trust_forwarded(true);
        let ctx = proxied.context(Profile::Upgrade, &Method::GET, &uri, &headers, peer);
        assert_eq!(ctx.client_key, "203.0.113.7");
    }
}
