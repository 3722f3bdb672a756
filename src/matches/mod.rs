//! Match domain: models, persistence and lifecycle status sync

pub mod model;
pub mod postgres;
pub mod status;
pub mod store;

pub use model::{
    Commentary, FieldIssue, Match, MatchId, MatchLifecycle, MatchStatus, NewCommentary,
    NewCommentaryRequest, NewMatch, NewMatchRequest, Score, ScoreUpdateRequest,
};
pub use postgres::{DatabaseConfig, PostgresStore};
pub use status::{derive_status, sync_status, SyncError, SyncOutcome};
pub use store::{MatchStore, MemoryStore, StoreError, StoreFuture};
