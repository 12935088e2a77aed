//! Data models for tournament entities.
//!
//! This module contains the data structures exchanged with the scoring API
//! and held in the entity caches:
//!
//! - `Judge`, `NewJudge`: judge assignments within a cluster
//! - `Team`, `Coach`: competing teams and their coaches
//! - `Contest`, `Cluster`: tournament structure
//! - `Scoresheet`, `ScoresheetKey`, `SheetType`: per-judge scoring records
//! - `Award`, `TeamTotal`, `SubmissionStatus`: derived/summary records

pub mod award;
pub mod contest;
pub mod judge;
pub mod scoresheet;
pub mod team;

pub use award::Award;
pub use contest::{Cluster, Contest};
pub use judge::{ClusterJudgesResponse, Judge, NewJudge};
pub use scoresheet::{ScoreEntry, Scoresheet, ScoresheetKey, SheetType, SubmissionStatus};
pub use team::{Coach, NewTeam, Team, TeamTotal};

/// Identifier aliases. The API hands out plain integers; the aliases keep
/// signatures readable without wrapping every id in a newtype.
pub type ChampionshipId = i64;
pub type ClusterId = i64;
pub type ContestId = i64;
pub type JudgeId = i64;
pub type TeamId = i64;
