//! Typed change notifications.
//!
//! One variant per entity type, each carrying only its relevant foreign
//! keys, so rule matching is exhaustive and checked at compile time.

use crate::models::{ChampionshipId, ClusterId, ContestId, JudgeId, ScoresheetKey, TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Team,
    Judge,
    Cluster,
    Contest,
    Scoresheet,
    Championship,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    Team {
        action: Action,
        team_id: TeamId,
        cluster_id: ClusterId,
        contest_id: Option<ContestId>,
    },
    Judge {
        action: Action,
        judge_id: JudgeId,
        cluster_id: ClusterId,
    },
    Cluster {
        action: Action,
        cluster_id: ClusterId,
        contest_id: ContestId,
    },
    Contest {
        action: Action,
        contest_id: ContestId,
        championship_id: Option<ChampionshipId>,
    },
    Scoresheet {
        action: Action,
        key: ScoresheetKey,
    },
    Championship {
        action: Action,
        championship_id: ChampionshipId,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> EntityKind {
        match self {
            DomainEvent::Team { .. } => EntityKind::Team,
            DomainEvent::Judge { .. } => EntityKind::Judge,
            DomainEvent::Cluster { .. } => EntityKind::Cluster,
            DomainEvent::Contest { .. } => EntityKind::Contest,
            DomainEvent::Scoresheet { .. } => EntityKind::Scoresheet,
            DomainEvent::Championship { .. } => EntityKind::Championship,
        }
    }

    pub fn action(&self) -> Action {
        match *self {
            DomainEvent::Team { action, .. }
            | DomainEvent::Judge { action, .. }
            | DomainEvent::Cluster { action, .. }
            | DomainEvent::Contest { action, .. }
            | DomainEvent::Scoresheet { action, .. }
            | DomainEvent::Championship { action, .. } => action,
        }
    }
}
