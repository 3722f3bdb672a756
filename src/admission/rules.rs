//! Bot detection and request shielding rules

use percent_encoding::percent_decode_str;

/// Coarse classification of a `User-Agent`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BotCategory {
    SearchEngine,
    /// Link unfurlers for chat and social apps
    Preview,
    /// Scripts, CLI tools, headless browsers
    Automated,
    /// Looks like an interactive browser
    Browser,
}

const SEARCH_ENGINES: &[&str] = &[
    "googlebot",
    "bingbot",
    "duckduckbot",
    "baiduspider",
    "yandexbot",
    "applebot",
    "slurp",
];

const PREVIEWS: &[&str] = &[
    "slackbot",
    "twitterbot",
    "facebookexternalhit",
    "discordbot",
    "linkedinbot",
    "telegrambot",
    "whatsapp",
    "skypeuripreview",
];

const AUTOMATED: &[&str] = &[
    "curl",
    "wget",
    "python-requests",
    "python-urllib",
    "aiohttp",
    "httpx",
    "go-http-client",
    "java/",
    "okhttp",
    "libwww-perl",
    "scrapy",
    "headlesschrome",
    "phantomjs",
    "puppeteer",
    "playwright",
    "selenium",
    "bot",
    "crawler",
    "spider",
];

pub fn classify_user_agent(user_agent: Option<&str>) -> BotCategory {
    let ua = match user_agent.map(str::trim) {
        Some(ua) if !ua.is_empty() => ua.to_ascii_lowercase(),
        _ => return BotCategory::Automated,
    };

    if SEARCH_ENGINES.iter().any(|s| ua.contains(s)) {
        BotCategory::SearchEngine
    } else if PREVIEWS.iter().any(|s| ua.contains(s)) {
        BotCategory::Preview
    } else if AUTOMATED.iter().any(|s| ua.contains(s)) || !ua.starts_with("mozilla/") {
        BotCategory::Automated
    } else {
        BotCategory::Browser
    }
}

/// Denies automated clients outside the allowed categories
#[derive(Clone, Debug)]
pub struct BotDetector {
    allow: Vec<BotCategory>,
}

impl Default for BotDetector {
    fn default() -> Self {
        Self {
            allow: vec![BotCategory::SearchEngine, BotCategory::Preview],
        }
    }
}

impl BotDetector {
    pub fn with_allowed(mut self, category: BotCategory) -> Self {
        if !self.allow.contains(&category) {
            self.allow.push(category);
        }
        self
    }

    /// True when the client should be denied as a bot
    pub fn is_suspected(&self, user_agent: Option<&str>) -> bool {
        match classify_user_agent(user_agent) {
            BotCategory::Browser => false,
            category => !self.allow.contains(&category),
        }
    }
}

const SHIELD_PATTERNS: &[&str] = &[
    // traversal
    "../",
    "..\\",
    "/etc/passwd",
    "/proc/self",
    // script injection
    "<script",
    "javascript:",
    "onerror=",
    "onload=",
    // sql injection
    "' or '1'='1",
    "\" or \"1\"=\"1",
    " or 1=1",
    "union select",
    "union all select",
    "; drop table",
    "sleep(",
    // comment closing a quoted literal
    "'--",
    "' --",
    "\"--",
    "\" --",
];

/// Flags request targets that carry common attack payloads
#[derive(Clone, Debug, Default)]
pub struct Shield;

impl Shield {
    pub fn is_triggered(&self, path: &str, query: Option<&str>) -> bool {
        let target = match query {
            Some(q) => format!("{}?{}", path, q.replace('+', " ")),
            None => path.to_string(),
        };
        let decoded = percent_decode_str(&target)
            .decode_utf8_lossy()
            .to_ascii_lowercase();
        SHIELD_PATTERNS.iter().any(|p| decoded.contains(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let chrome = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";
        assert_eq!(classify_user_agent(Some(chrome)), BotCategory::Browser);
        assert_eq!(
            classify_user_agent(Some("Mozilla/5.0 (compatible; Googlebot/2.1)")),
            BotCategory::SearchEngine
        );
        assert_eq!(
            classify_user_agent(Some("Slackbot-LinkExpanding 1.0")),
            BotCategory::Preview
        );
        assert_eq!(classify_user_agent(Some("curl/8.5.0")), BotCategory::Automated);
        assert_eq!(
            classify_user_agent(Some("Mozilla/5.0 HeadlessChrome/120.0")),
            BotCategory::Automated
        );
        assert_eq!(classify_user_agent(None), BotCategory::Automated);
        assert_eq!(classify_user_agent(Some("  ")), BotCategory::Automated);
    }

    #[test]
    fn test_bot_detector_allows_listed_categories() {
        let detector = BotDetector::default();
        assert!(!detector.is_suspected(Some("Googlebot/2.1")));
        assert!(!detector.is_suspected(Some("facebookexternalhit/1.1")));
        assert!(detector.is_suspected(Some("python-requests/2.31")));

        let lenient = BotDetector::default().with_allowed(BotCategory::Automated);
        assert!(!lenient.is_suspected(Some("python-requests/2.31")));
    }

    #[test]
    fn test_shield() {
        let shield = Shield;
        assert!(!shield.is_triggered("/matches", Some("limit=10")));
        assert!(!shield.is_triggered("/matches/4/commentary", None));
        assert!(shield.is_triggered("/static/..%2F..%2Fetc/passwd", None));
        assert!(shield.is_triggered("/matches", Some("q=%3Cscript%3Ealert(1)")));
        assert!(shield.is_triggered("/matches", Some("id=1+UNION+SELECT+password")));
    }

    #[test]
    fn test_shield_double_hyphen() {
        let shield = Shield;
        assert!(!shield.is_triggered("/teams/real--madrid", None));
        assert!(!shield.is_triggered("/matches", Some("from=2026--05")));
        assert!(shield.is_triggered("/matches", Some("team=x%27--")));
        assert!(shield.is_triggered("/matches", Some("team=admin'+--")));
        assert!(shield.is_triggered("/matches", Some("team=%22--")));
    }
}
