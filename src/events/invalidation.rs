//! Static invalidation rules: which caches a domain change purges.
//!
//! Rules are intentionally coarse - type-level rather than key-level - so a
//! single team update purges the entire teams-by-cluster cache across all
//! clusters rather than just the affected one. Unneeded purges only cost a
//! refetch; a missed purge would leave a stale read, which is never
//! acceptable.

use std::sync::Arc;

use tracing::debug;

use crate::cache::Stores;

use super::bus::{EventBus, Subscription};
use super::domain::{Action, DomainEvent, EntityKind};

/// Names one entity cache for the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheId {
    JudgesByCluster,
    TeamsByCluster,
    ClustersByContest,
    ContestByTeam,
    CoachByTeam,
    AwardsByTeam,
    Scoresheets,
    SubmissionStatusByCluster,
    TotalByTeam,
    ContestsByChampionship,
}

/// One hand-authored rule: events of `entity` (and `action`, if given)
/// purge every cache in `purge`.
#[derive(Debug)]
pub struct InvalidationRule {
    pub entity: EntityKind,
    pub action: Option<Action>,
    pub purge: &'static [CacheId],
}

pub const RULES: &[InvalidationRule] = &[
    // Teams. Updates touch the roster row plus the per-team lookups that
    // embed team fields; deletions additionally orphan everything keyed by
    // the team.
    InvalidationRule {
        entity: EntityKind::Team,
        action: Some(Action::Created),
        purge: &[CacheId::TeamsByCluster, CacheId::SubmissionStatusByCluster],
    },
    InvalidationRule {
        entity: EntityKind::Team,
        action: Some(Action::Updated),
        purge: &[
            CacheId::TeamsByCluster,
            CacheId::CoachByTeam,
            CacheId::AwardsByTeam,
        ],
    },
    InvalidationRule {
        entity: EntityKind::Team,
        action: Some(Action::Deleted),
        purge: &[
            CacheId::TeamsByCluster,
            CacheId::CoachByTeam,
            CacheId::AwardsByTeam,
            CacheId::ContestByTeam,
            CacheId::Scoresheets,
            CacheId::TotalByTeam,
            CacheId::SubmissionStatusByCluster,
        ],
    },
    // Judges. Any change reshuffles cluster assignments; removals also
    // invalidate the sheets and counts that referenced the judge.
    InvalidationRule {
        entity: EntityKind::Judge,
        action: None,
        purge: &[CacheId::JudgesByCluster],
    },
    InvalidationRule {
        entity: EntityKind::Judge,
        action: Some(Action::Created),
        purge: &[CacheId::SubmissionStatusByCluster],
    },
    InvalidationRule {
        entity: EntityKind::Judge,
        action: Some(Action::Deleted),
        purge: &[CacheId::Scoresheets, CacheId::SubmissionStatusByCluster],
    },
    // Clusters regroup both judges and teams.
    InvalidationRule {
        entity: EntityKind::Cluster,
        action: None,
        purge: &[
            CacheId::ClustersByContest,
            CacheId::JudgesByCluster,
            CacheId::TeamsByCluster,
            CacheId::SubmissionStatusByCluster,
        ],
    },
    InvalidationRule {
        entity: EntityKind::Contest,
        action: None,
        purge: &[
            CacheId::ContestsByChampionship,
            CacheId::ClustersByContest,
            CacheId::ContestByTeam,
        ],
    },
    // A scoresheet change moves totals and submission counts.
    InvalidationRule {
        entity: EntityKind::Scoresheet,
        action: None,
        purge: &[
            CacheId::Scoresheets,
            CacheId::SubmissionStatusByCluster,
            CacheId::TotalByTeam,
        ],
    },
    InvalidationRule {
        entity: EntityKind::Championship,
        action: None,
        purge: &[CacheId::ContestsByChampionship],
    },
];

/// Wire the rule table to the bus. On every event, all matching rules fire
/// and their named caches are purged whole. The returned subscription keeps
/// the wiring alive; dropping it disconnects invalidation.
pub fn register_invalidation(bus: &EventBus, stores: Arc<Stores>) -> Subscription {
    bus.subscribe(move |event: &DomainEvent| {
        let kind = event.kind();
        let action = event.action();
        for rule in RULES {
            if rule.entity != kind {
                continue;
            }
            if rule.action.is_some_and(|a| a != action) {
                continue;
            }
            for &cache in rule.purge {
                stores.purge_cache(cache);
            }
            debug!(?kind, ?action, purged = ?rule.purge, "invalidation rule fired");
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
