use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::policy::{PolicyMode, PolicyProvider};
use super::rate_limit::RateLimitConfig;
use super::{AdmissionContext, AdmissionDecision, AdmissionError, Profile, ReasonKind};

/// Provider that asks an external decision service over HTTP.
///
/// Request: `POST <url>` with a bearer key and the context plus the profile's
/// rule parameters. Response: `{"conclusion": "ALLOW"|"DENY", "reason": ...}`.
pub struct RemotePolicy {
    client: reqwest::Client,
    url: String,
    key: String,
    profile: Profile,
    limit: RateLimitConfig,
    mode: PolicyMode,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerdictRequest<'a> {
    #[serde(flatten)]
    context: &'a AdmissionContext,
    mode: &'static str,
    rules: RuleSet,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RuleSet {
    shield: bool,
    detect_bot: BotRule,
    sliding_window: WindowRule,
}

#[derive(Serialize)]
struct BotRule {
    allow: [&'static str; 2],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WindowRule {
    max: u32,
    interval_ms: u64,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    conclusion: String,
    #[serde(default)]
    reason: Option<String>,
}

impl RemotePolicy {
    pub fn new(
        url: &str,
        key: &str,
        profile: Profile,
        limit: RateLimitConfig,
        mode: PolicyMode,
        timeout: Duration,
    ) -> Result<Self, AdmissionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdmissionError::Provider(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
            key: key.to_string(),
            profile,
            limit,
            mode,
        })
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    fn request_body<'a>(&self, ctx: &'a AdmissionContext) -> VerdictRequest<'a> {
        VerdictRequest {
            context: ctx,
            mode: self.mode.as_str(),
            rules: RuleSet {
                shield: true,
                detect_bot: BotRule {
                    allow: ["CATEGORY:SEARCH_ENGINE", "CATEGORY:PREVIEW"],
                },
                sliding_window: WindowRule {
                    max: self.limit.max_requests,
                    interval_ms: self.limit.window.as_millis() as u64,
                },
            },
        }
    }

    async fn fetch(&self, ctx: &AdmissionContext) -> Result<AdmissionDecision, AdmissionError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.key)
            .json(&self.request_body(ctx))
            .send()
            .await
            .map_err(|e| AdmissionError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdmissionError::Provider(format!(
                "decision service returned {}",
                status
            )));
        }

        let verdict: Verdict = response
            .json()
            .await
            .map_err(|e| AdmissionError::Provider(e.to_string()))?;
        let decision = decision_from_verdict(&verdict)?;
        Ok(self.mode.enforce(decision, ctx))
    }
}

fn decision_from_verdict(verdict: &Verdict) -> Result<AdmissionDecision, AdmissionError> {
    match verdict.conclusion.as_str() {
        "ALLOW" => Ok(AdmissionDecision::allow()),
        "DENY" => {
            let reason = match verdict.reason.as_deref() {
                Some("RATE_LIMIT") => ReasonKind::RateLimit,
                Some("BOT") => ReasonKind::BotSuspected,
                Some("SHIELD") => ReasonKind::ShieldTriggered,
                _ => ReasonKind::None,
            };
            Ok(AdmissionDecision::deny(reason))
        }
        other => Err(AdmissionError::Provider(format!(
            "unexpected conclusion '{}'",
            other
        ))),
    }
}

impl PolicyProvider for RemotePolicy {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn evaluate<'a>(
        &'a self,
        ctx: &'a AdmissionContext,
    ) -> Pin<Box<dyn Future<Output = Result<AdmissionDecision, AdmissionError>> + Send + 'a>> {
        Box::pin(self.fetch(ctx))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn verdict(conclusion: &str, reason: Option<&str>) -> Verdict {
        Verdict {
            conclusion: conclusion.to_string(),
            reason: reason.map(str::to_string),
        }
    }

    #[test]
    fn test_verdict_mapping() {
        assert_eq!(
            decision_from_verdict(&verdict("ALLOW", None)).unwrap(),
            AdmissionDecision::allow()
        );
        assert_eq!(
            decision_from_verdict(&verdict("DENY", Some("RATE_LIMIT"))).unwrap(),
            AdmissionDecision::deny(ReasonKind::RateLimit)
        );
        assert_eq!(
            decision_from_verdict(&verdict("DENY", Some("BOT"))).unwrap(),
            AdmissionDecision::deny(ReasonKind::BotSuspected)
        );
        assert_eq!(
            decision_from_verdict(&verdict("DENY", Some("EMAIL"))).unwrap(),
            AdmissionDecision::deny(ReasonKind::None)
        );
        assert!(decision_from_verdict(&verdict("ERROR", None)).is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let policy = RemotePolicy::new(
            "http://127.0.0.1:9/decide",
            "key",
            Profile::Upgrade,
            RateLimitConfig::upgrade(),
            PolicyMode::DryRun,
            Duration::from_millis(100),
        )
        .unwrap();
        let ctx = AdmissionContext {
            profile: Profile::Upgrade,
            client_key: "203.0.113.1".into(),
            method: "GET".into(),
            path: "/ws".into(),
            query: None,
            user_agent: None,
        };

        let body = serde_json::to_value(policy.request_body(&ctx)).unwrap();
        assert_eq!(body["profile"], json!("upgrade"));
        assert_eq!(body["clientKey"], json!("203.0.113.1"));
        assert_eq!(body["mode"], json!("DRY_RUN"));
        assert_eq!(body["rules"]["slidingWindow"], json!({"max": 5, "intervalMs": 2000}));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_error() {
        let policy = RemotePolicy::new(
            "http://127.0.0.1:9/decide",
            "key",
            Profile::Http,
            RateLimitConfig::http(),
            PolicyMode::Live,
            Duration::from_millis(200),
        )
        .unwrap();
        let ctx = AdmissionContext {
            profile: Profile::Http,
            client_key: "203.0.113.1".into(),
            method: "GET".into(),
            path: "/matches".into(),
            query: None,
            user_agent: None,
        };

        assert!(matches!(
            policy.evaluate(&ctx).await,
            Err(AdmissionError::Provider(_))
        ));
    }
}
