use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Instant;

use super::rate_limit::{RateLimitConfig, SlidingWindowLimiter};
use super::rules::{BotDetector, Shield};
use super::{AdmissionContext, AdmissionDecision, AdmissionError, ReasonKind};

/// Source of admission decisions.
///
/// Implementations may suspend on I/O; the gateway bounds every call with
/// its configured timeout.
pub trait PolicyProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate<'a>(
        &'a self,
        ctx: &'a AdmissionContext,
    ) -> Pin<Box<dyn Future<Output = Result<AdmissionDecision, AdmissionError>> + Send + 'a>>;
}

/// Enforcement mode for policy rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyMode {
    /// Denials are enforced
    #[default]
    Live,
    /// Denials are logged, then allowed
    DryRun,
}

impl PolicyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyMode::Live => "LIVE",
            PolicyMode::DryRun => "DRY_RUN",
        }
    }

    /// Apply the mode to a raw rule verdict
    pub fn enforce(&self, decision: AdmissionDecision, ctx: &AdmissionContext) -> AdmissionDecision {
        match self {
            PolicyMode::DryRun if decision.is_denied() => {
                log::info!(
                    "[dry-run] would deny {} {} from {} ({})",
                    ctx.method,
                    ctx.path,
                    ctx.client_key,
                    decision.reason
                );
                AdmissionDecision::allow()
            }
            _ => decision,
        }
    }
}

impl FromStr for PolicyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LIVE" => Ok(PolicyMode::Live),
            "DRY_RUN" => Ok(PolicyMode::DryRun),
            other => Err(format!("unknown policy mode '{}'", other)),
        }
    }
}

/// Explicit no-op provider
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPolicy;

impl PolicyProvider for DisabledPolicy {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn evaluate<'a>(
        &'a self,
        _ctx: &'a AdmissionContext,
    ) -> Pin<Box<dyn Future<Output = Result<AdmissionDecision, AdmissionError>> + Send + 'a>> {
        Box::pin(async { Ok(AdmissionDecision::allow()) })
    }
}

/// In-process rules: shield, then bot detection, then the sliding window
pub struct LocalPolicy {
    mode: PolicyMode,
    shield: Shield,
    bots: BotDetector,
    limiter: SlidingWindowLimiter,
}

impl LocalPolicy {
    pub fn new(limit: RateLimitConfig, mode: PolicyMode) -> Self {
        Self {
            mode,
            shield: Shield,
            bots: BotDetector::default(),
            limiter: SlidingWindowLimiter::new(limit),
        }
    }

    pub fn with_bot_detector(mut self, bots: BotDetector) -> Self {
        self.bots = bots;
        self
    }

    /// Evaluate with an explicit clock reading
    pub fn evaluate_at(&self, ctx: &AdmissionContext, now: Instant) -> AdmissionDecision {
        let raw = if self.shield.is_triggered(&ctx.path, ctx.query.as_deref()) {
            AdmissionDecision::deny(ReasonKind::ShieldTriggered)
        } else if self.bots.is_suspected(ctx.user_agent.as_deref()) {
            AdmissionDecision::deny(ReasonKind::BotSuspected)
        } else if !self.limiter.check(&ctx.client_key, now).allowed {
            AdmissionDecision::deny(ReasonKind::RateLimit)
        } else {
            AdmissionDecision::allow()
        };
        self.mode.enforce(raw, ctx)
    }
}

impl PolicyProvider for LocalPolicy {
    fn name(&self) -> &'static str {
        "local"
    }

    fn evaluate<'a>(
        &'a self,
        ctx: &'a AdmissionContext,
    ) -> Pin<Box<dyn Future<Output = Result<AdmissionDecision, AdmissionError>> + Send + 'a>> {
        let decision = self.evaluate_at(ctx, Instant::now());
        Box::pin(async move { Ok(decision) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::admission::Profile;

    const BROWSER: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 Safari/605.1.15";

    fn ctx(path: &str, user_agent: Option<&str>) -> AdmissionContext {
        AdmissionContext {
            profile: Profile::Upgrade,
            client_key: "198.51.100.4".into(),
            method: "GET".into(),
            path: path.into(),
            query: None,
            user_agent: user_agent.map(str::to_string),
        }
    }

    #[test]
    fn test_rule_order() {
        let policy = LocalPolicy::new(RateLimitConfig::upgrade(), PolicyMode::Live);
        let now = Instant::now();

        assert_eq!(
            policy.evaluate_at(&ctx("/ws/../../etc/passwd", Some("curl/8")), now).reason,
            ReasonKind::ShieldTriggered
        );
        assert_eq!(
            policy.evaluate_at(&ctx("/ws", Some("curl/8")), now).reason,
            ReasonKind::BotSuspected
        );
        assert!(!policy.evaluate_at(&ctx("/ws", Some(BROWSER)), now).is_denied());
    }

    #[test]
    fn test_upgrade_profile_rate_limit() {
        let policy = LocalPolicy::new(RateLimitConfig::upgrade(), PolicyMode::Live);
        let request = ctx("/ws", Some(BROWSER));
        let start = Instant::now();

        for i in 0..5 {
            let at = start + Duration::from_millis(i * 300);
            assert!(!policy.evaluate_at(&request, at).is_denied());
        }
        let sixth = policy.evaluate_at(&request, start + Duration::from_millis(1800));
        assert_eq!(sixth, AdmissionDecision::deny(ReasonKind::RateLimit));

        let later = policy.evaluate_at(&request, start + Duration::from_millis(4000));
        assert_eq!(later, AdmissionDecision::allow());
    }

    #[test]
    fn test_rotating_forwarded_for_shares_peer_bucket() {
        use axum::http::{HeaderMap, HeaderValue, Method, Uri};

        let policy = LocalPolicy::new(RateLimitConfig::upgrade(), PolicyMode::Live);
        let peer = Some("203.0.113.50:41000".parse().unwrap());
        let uri = Uri::from_static("/ws");
        let now = Instant::now();

        let decisions: Vec<_> = (0..6)
            .map(|i| {
                let mut headers = HeaderMap::new();
                headers.insert("user-agent", HeaderValue::from_static(BROWSER));
                let spoofed = format!("198.18.0.{}", i + 1);
                headers.insert("x-forwarded-for", HeaderValue::from_str(&spoofed).unwrap());
                let ctx = AdmissionContext::from_request(
                    Profile::Upgrade,
                    &Method::GET,
                    &uri,
                    &headers,
                    peer,
                    false,
                );
                assert_eq!(ctx.client_key, "203.0.113.50");
                policy.evaluate_at(&ctx, now)
            })
            .collect();

        assert!(decisions[..5].iter().all(|d| !d.is_denied()));
        assert_eq!(decisions[5], AdmissionDecision::deny(ReasonKind::RateLimit));
    }

    #[test]
    fn test_dry_run_never_denies() {
        let policy = LocalPolicy::new(RateLimitConfig::new(1, Duration::from_secs(60)), PolicyMode::DryRun);
        let now = Instant::now();
        assert!(!policy.evaluate_at(&ctx("/ws", None), now).is_denied());
        assert!(!policy.evaluate_at(&ctx("/ws", Some(BROWSER)), now).is_denied());
        assert!(!policy.evaluate_at(&ctx("/ws", Some(BROWSER)), now).is_denied());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("dry_run".parse::<PolicyMode>().unwrap(), PolicyMode::DryRun);
        assert_eq!("LIVE".parse::<PolicyMode>().unwrap(), PolicyMode::Live);
        assert!("sometimes".parse::<PolicyMode>().is_err());
    }

    #[tokio::test]
    async fn test_disabled_policy_allows() {
        let decision = DisabledPolicy.evaluate(&ctx("/ws", None)).await.unwrap();
        assert_eq!(decision, AdmissionDecision::allow());
    }
}
