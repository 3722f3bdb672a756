//! Match persistence
//!
//! [`MatchStore`] is the narrow interface the HTTP layer and the status
//! synchronizer use to reach storage. [`MemoryStore`] backs tests and
//! database-less deployments; [`super::postgres::PostgresStore`] backs
//! production.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;

use super::model::{
    Commentary, Match, MatchId, MatchLifecycle, MatchStatus, NewCommentary, NewMatch, Score,
};

/// Error type for store operations
#[derive(Debug)]
pub enum StoreError {
    /// Referenced match does not exist
    MatchNotFound(MatchId),
    /// Backend could not be reached or rejected the operation
    Unavailable(String),
    /// Database driver error
    Database(sqlx::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::MatchNotFound(id) => write!(f, "Match not found: {}", id),
            StoreError::Unavailable(reason) => write!(f, "Store unavailable: {}", reason),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future returned by [`MatchStore`] methods
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Storage capability for matches and commentary
pub trait MatchStore: Send + Sync {
    /// Backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Newest matches first
    fn list_matches(&self, limit: usize) -> StoreFuture<'_, Vec<Match>>;

    fn create_match(&self, new: NewMatch, status: MatchStatus) -> StoreFuture<'_, Match>;

    /// Status and window of one match, `None` if it does not exist
    fn read_match_lifecycle_fields(&self, id: MatchId)
        -> StoreFuture<'_, Option<MatchLifecycle>>;

    fn write_match_status(&self, id: MatchId, status: MatchStatus) -> StoreFuture<'_, ()>;

    /// Returns the updated match, `None` if it does not exist
    fn update_score(&self, id: MatchId, score: Score) -> StoreFuture<'_, Option<Match>>;

    /// Newest entries first
    fn list_commentary(&self, match_id: MatchId, limit: usize)
        -> StoreFuture<'_, Vec<Commentary>>;

    fn create_commentary(
        &self,
        match_id: MatchId,
        new: NewCommentary,
    ) -> StoreFuture<'_, Commentary>;
}

#[derive(Default)]
struct MemoryInner {
    next_match_id: MatchId,
    next_commentary_id: i64,
    matches: Vec<Match>,
    commentary: Vec<Commentary>,
}

/// In-process store, lost on restart
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn newest_first<T: Clone>(
        items: &[T],
        limit: usize,
        key: impl Fn(&T) -> (chrono::DateTime<Utc>, i64),
        filter: impl Fn(&T) -> bool,
    ) -> Vec<T> {
        let mut out: Vec<T> = items.iter().filter(|item| filter(item)).cloned().collect();
        out.sort_by(|a, b| key(b).cmp(&key(a)));
        out.truncate(limit);
        out
    }
}

impl MatchStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn list_matches(&self, limit: usize) -> StoreFuture<'_, Vec<Match>> {
        Box::pin(async move {
            let inner = self.inner.read();
            Ok(Self::newest_first(
                &inner.matches,
                limit,
                |m| (m.created_at, m.id),
                |_| true,
            ))
        })
    }

    fn create_match(&self, new: NewMatch, status: MatchStatus) -> StoreFuture<'_, Match> {
        Box::pin(async move {
            let mut inner = self.inner.write();
            inner.next_match_id += 1;
            let created = Match {
                id: inner.next_match_id,
                sport: new.sport,
                home_team: new.home_team,
                away_team: new.away_team,
                status,
                start_time: Some(new.start_time),
                end_time: Some(new.end_time),
                home_score: new.home_score,
                away_score: new.away_score,
                created_at: Utc::now(),
            };
            inner.matches.push(created.clone());
            Ok(created)
        })
    }

    fn read_match_lifecycle_fields(
        &self,
        id: MatchId,
    ) -> StoreFuture<'_, Option<MatchLifecycle>> {
        Box::pin(async move {
            let inner = self.inner.read();
            Ok(inner.matches.iter().find(|m| m.id == id).map(|m| MatchLifecycle {
                id: m.id,
                status: m.status,
                start_time: m.start_time,
                end_time: m.end_time,
            }))
        })
    }

    fn write_match_status(&self, id: MatchId, status: MatchStatus) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.inner.write();
            let found = inner
                .matches
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or(StoreError::MatchNotFound(id))?;
            found.status = status;
            Ok(())
        })
    }

    fn update_score(&self, id: MatchId, score: Score) -> StoreFuture<'_, Option<Match>> {
        Box::pin(async move {
            let mut inner = self.inner.write();
            Ok(inner.matches.iter_mut().find(|m| m.id == id).map(|m| {
                m.home_score = score.home_score;
                m.away_score = score.away_score;
                m.clone()
            }))
        })
    }

    fn list_commentary(
        &self,
        match_id: MatchId,
        limit: usize,
    ) -> StoreFuture<'_, Vec<Commentary>> {
        Box::pin(async move {
            let inner = self.inner.read();
            Ok(Self::newest_first(
                &inner.commentary,
                limit,
                |c| (c.created_at, c.id),
                |c| c.match_id == match_id,
            ))
        })
    }

    fn create_commentary(
        &self,
        match_id: MatchId,
        new: NewCommentary,
    ) -> StoreFuture<'_, Commentary> {
        Box::pin(async move {
            let mut inner = self.inner.write();
            if !inner.matches.iter().any(|m| m.id == match_id) {
                return Err(StoreError::MatchNotFound(match_id));
            }
            inner.next_commentary_id += 1;
            let created = Commentary {
                id: inner.next_commentary_id,
                match_id,
                minute: Some(new.minute),
                sequence: new.sequence,
                period: new.period,
                event_type: new.event_type,
                actor: new.actor,
                team: new.team,
                message: Some(new.message),
                metadata: new.metadata.map(Value::Object),
                tags: new.tags,
                created_at: Utc::now(),
            };
            inner.commentary.push(created.clone());
            Ok(created)
        })
    }
}
