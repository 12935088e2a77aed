use serde::{Deserialize, Serialize};

use super::{ClusterId, ContestId, TeamId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    /// Competition number shown on scoresheets and rankings.
    pub number: Option<i32>,
    pub name: String,
    #[serde(rename = "clusterId")]
    pub cluster_id: ClusterId,
    #[serde(rename = "contestId")]
    pub contest_id: ContestId,
    pub affiliation: Option<String>,
}

/// Payload for registering a team. The server assigns the id and cluster.
#[derive(Debug, Clone, Serialize)]
pub struct NewTeam {
    pub number: Option<i32>,
    pub name: String,
    pub affiliation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coach {
    pub id: i64,
    #[serde(rename = "teamId")]
    pub team_id: TeamId,
    pub name: String,
    pub email: Option<String>,
}

/// Derived total for one team, computed server-side from submitted sheets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamTotal {
    #[serde(rename = "teamId")]
    pub team_id: TeamId,
    pub total: f64,
    pub rank: Option<u32>,
}
