use serde::{Deserialize, Serialize};

use super::{ChampionshipId, ClusterId, ContestId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contest {
    pub id: ContestId,
    pub name: String,
    #[serde(rename = "championshipId")]
    pub championship_id: ChampionshipId,
    pub division: Option<String>,
}

/// A judging cluster: the unit teams and judges are grouped into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    #[serde(rename = "contestId")]
    pub contest_id: ContestId,
    pub name: String,
    #[serde(rename = "teamCount")]
    pub team_count: Option<u32>,
}
