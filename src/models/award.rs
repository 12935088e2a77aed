use serde::{Deserialize, Serialize};

use super::TeamId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Award {
    pub id: i64,
    #[serde(rename = "teamId")]
    pub team_id: TeamId,
    pub name: String,
    pub place: Option<u32>,
}
