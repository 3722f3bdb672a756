use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::parse_rfc3339;

/// Primary key of a match row
pub type MatchId = i64;

/// Lifecycle status of a match.
///
/// Ordered `Scheduled < Live < Finished`; the status is derived from the match
/// window rather than stored as free-form truth (see [`super::status`]).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "match_status", rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Live,
    Finished,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Live => "live",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub sport: String,
    pub home_team: String,
    pub away_team: String,
    pub status: MatchStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub home_score: i32,
    pub away_score: i32,
    pub created_at: DateTime<Utc>,
}

/// The subset of a match the status synchronizer reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct MatchLifecycle {
    pub id: MatchId,
    pub status: MatchStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Score pair pushed to subscribers after a score change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub home_score: i32,
    pub away_score: i32,
}

/// A stored commentary entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Commentary {
    pub id: i64,
    pub match_id: MatchId,
    pub minute: Option<i32>,
    pub sequence: Option<i32>,
    pub period: Option<String>,
    pub event_type: Option<String>,
    pub actor: Option<String>,
    pub team: Option<String>,
    pub message: Option<String>,
    pub metadata: Option<Value>,
    pub tags: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Validated inputs
// ---------------------------------------------------------------------------

/// A match ready to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    pub sport: String,
    pub home_team: String,
    pub away_team: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub home_score: i32,
    pub away_score: i32,
}

/// A commentary entry ready to be inserted
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewCommentary {
    pub minute: i32,
    pub sequence: Option<i32>,
    pub period: Option<String>,
    pub event_type: Option<String>,
    pub actor: Option<String>,
    pub team: Option<String>,
    pub message: String,
    pub metadata: Option<Map<String, Value>>,
    pub tags: Option<Vec<String>>,
}

/// One validation problem, reported in the `details` array of a 400 response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub path: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A JSON number, or a string holding one.
///
/// Score fields are coerced from strings; other numeric fields are not.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumberLike {
    Number(serde_json::Number),
    Text(String),
}

impl NumberLike {
    fn to_integer(&self, coerce: bool) -> Option<i64> {
        match self {
            NumberLike::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            NumberLike::Text(s) if coerce => s.trim().parse::<i64>().ok(),
            NumberLike::Text(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// `POST /matches` body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMatchRequest {
    pub sport: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub home_score: Option<NumberLike>,
    pub away_score: Option<NumberLike>,
}

impl NewMatchRequest {
    pub fn validate(self) -> Result<NewMatch, Vec<FieldIssue>> {
        let mut issues = Vec::new();

        let sport = required_text("sport", self.sport, &mut issues);
        let home_team = required_text("homeTeam", self.home_team, &mut issues);
        let away_team = required_text("awayTeam", self.away_team, &mut issues);
        let start_time = required_datetime("startTime", self.start_time, &mut issues);
        let end_time = required_datetime("endTime", self.end_time, &mut issues);
        let home_score = optional_count("homeScore", self.home_score.as_ref(), true, &mut issues);
        let away_score = optional_count("awayScore", self.away_score.as_ref(), true, &mut issues);

        if let (Some(start), Some(end)) = (start_time, end_time) {
            if end <= start {
                issues.push(FieldIssue::new(
                    "endTime",
                    "endTime must be chronologically after startTime",
                ));
            }
        }

        match (sport, home_team, away_team, start_time, end_time) {
            (Some(sport), Some(home_team), Some(away_team), Some(start_time), Some(end_time))
                if issues.is_empty() =>
            {
                Ok(NewMatch {
                    sport,
                    home_team,
                    away_team,
                    start_time,
                    end_time,
                    home_score: home_score.unwrap_or(0),
                    away_score: away_score.unwrap_or(0),
                })
            }
            _ => Err(issues),
        }
    }
}

/// `PATCH /matches/{id}/score` body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdateRequest {
    pub home_score: Option<NumberLike>,
    pub away_score: Option<NumberLike>,
}

impl ScoreUpdateRequest {
    pub fn validate(self) -> Result<Score, Vec<FieldIssue>> {
        let mut issues = Vec::new();
        let home = required_count("homeScore", self.home_score.as_ref(), true, &mut issues);
        let away = required_count("awayScore", self.away_score.as_ref(), true, &mut issues);

        match (home, away) {
            (Some(home_score), Some(away_score)) => Ok(Score {
                home_score,
                away_score,
            }),
            _ => Err(issues),
        }
    }
}

/// `POST /matches/{id}/commentary` body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommentaryRequest {
    pub minute: Option<NumberLike>,
    pub sequence: Option<NumberLike>,
    pub period: Option<String>,
    pub event_type: Option<String>,
    pub actor: Option<String>,
    pub team: Option<String>,
    pub message: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub tags: Option<Vec<String>>,
}

impl NewCommentaryRequest {
    pub fn validate(self) -> Result<NewCommentary, Vec<FieldIssue>> {
        let mut issues = Vec::new();
        let minute = required_count("minute", self.minute.as_ref(), false, &mut issues);
        let message = required_text("message", self.message, &mut issues);

        let sequence = match self.sequence.as_ref() {
            None => None,
            Some(raw) => match raw.to_integer(false).and_then(|v| i32::try_from(v).ok()) {
                Some(v) => Some(v),
                None => {
                    issues.push(FieldIssue::new("sequence", "expected an integer"));
                    None
                }
            },
        };

        match (minute, message) {
            (Some(minute), Some(message)) if issues.is_empty() => Ok(NewCommentary {
                minute,
                sequence,
                period: self.period,
                event_type: self.event_type,
                actor: self.actor,
                team: self.team,
                message,
                metadata: self.metadata,
                tags: self.tags,
            }),
            _ => Err(issues),
        }
    }
}

fn required_text(path: &str, value: Option<String>, issues: &mut Vec<FieldIssue>) -> Option<String> {
    match value {
        Some(text) if !text.is_empty() => Some(text),
        Some(_) => {
            issues.push(FieldIssue::new(path, "must not be empty"));
            None
        }
        None => {
            issues.push(FieldIssue::new(path, "is required"));
            None
        }
    }
}

fn required_datetime(
    path: &str,
    value: Option<String>,
    issues: &mut Vec<FieldIssue>,
) -> Option<DateTime<Utc>> {
    let Some(raw) = value else {
        issues.push(FieldIssue::new(path, "is required"));
        return None;
    };
    let parsed = parse_rfc3339(&raw);
    if parsed.is_none() {
        issues.push(FieldIssue::new(path, "must be an ISO 8601 datetime"));
    }
    parsed
}

fn optional_count(
    path: &str,
    value: Option<&NumberLike>,
    coerce: bool,
    issues: &mut Vec<FieldIssue>,
) -> Option<i32> {
    let raw = value?;
    match raw.to_integer(coerce).and_then(|v| i32::try_from(v).ok()) {
        Some(v) if v >= 0 => Some(v),
        Some(_) => {
            issues.push(FieldIssue::new(path, "must be non-negative"));
            None
        }
        None => {
            issues.push(FieldIssue::new(path, "expected an integer"));
            None
        }
    }
}

fn required_count(
    path: &str,
    value: Option<&NumberLike>,
    coerce: bool,
    issues: &mut Vec<FieldIssue>,
) -> Option<i32> {
    if value.is_none() {
        issues.push(FieldIssue::new(path, "is required"));
        return None;
    }
    optional_count(path, value, coerce, issues)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn match_request(value: Value) -> NewMatchRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_status_order() {
        assert!(MatchStatus::Scheduled < MatchStatus::Live);
        assert!(MatchStatus::Live < MatchStatus::Finished);
        assert_eq!(serde_json::to_value(MatchStatus::Live).unwrap(), json!("live"));
    }

    #[test]
    fn test_new_match_valid() {
        let new = match_request(json!({
            "sport": "football",
            "homeTeam": "Ajax",
            "awayTeam": "PSV",
            "startTime": "2026-03-01T18:00:00Z",
            "endTime": "2026-03-01T19:45:00Z",
            "homeScore": "2",
        }))
        .validate()
        .unwrap();

        assert_eq!(new.home_score, 2);
        assert_eq!(new.away_score, 0);
        assert!(new.end_time > new.start_time);
    }

    #[test]
    fn test_new_match_end_before_start() {
        let issues = match_request(json!({
            "sport": "football",
            "homeTeam": "Ajax",
            "awayTeam": "PSV",
            "startTime": "2026-03-01T18:00:00Z",
            "endTime": "2026-03-01T18:00:00Z",
        }))
        .validate()
        .unwrap_err();

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "endTime");
    }

    #[test]
    fn test_new_match_collects_all_issues() {
        let issues = match_request(json!({
            "sport": "",
            "startTime": "yesterday",
            "endTime": "2026-03-01T18:00:00Z",
            "awayScore": -1,
        }))
        .validate()
        .unwrap_err();

        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["sport", "homeTeam", "awayTeam", "startTime", "awayScore"]);
    }

    #[test]
    fn test_score_update_coerces_strings() {
        let req: ScoreUpdateRequest =
            serde_json::from_value(json!({"homeScore": "3", "awayScore": 1})).unwrap();
        assert_eq!(
            req.validate().unwrap(),
            Score {
                home_score: 3,
                away_score: 1
            }
        );

        let req: ScoreUpdateRequest = serde_json::from_value(json!({"homeScore": 1.5})).unwrap();
        let issues = req.validate().unwrap_err();
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn test_commentary_minute_is_not_coerced() {
        let req: NewCommentaryRequest =
            serde_json::from_value(json!({"minute": "12", "message": "Goal!"})).unwrap();
        let issues = req.validate().unwrap_err();
        assert_eq!(issues[0].path, "minute");

        let req: NewCommentaryRequest = serde_json::from_value(json!({
            "minute": 12,
            "message": "Goal!",
            "tags": ["goal"],
            "metadata": {"assist": "Berghuis"},
        }))
        .unwrap();
        let new = req.validate().unwrap();
        assert_eq!(new.minute, 12);
        assert_eq!(new.tags, Some(vec!["goal".to_string()]));
    }
}
