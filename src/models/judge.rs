use serde::{Deserialize, Serialize};

use super::{ClusterId, JudgeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judge {
    pub id: JudgeId,
    pub name: String,
    #[serde(rename = "clusterId")]
    pub cluster_id: ClusterId,
    /// Judging role within the cluster, e.g. "head" or "assistant".
    pub role: Option<String>,
    pub email: Option<String>,
}

/// Payload for creating a judge. The server assigns the id and cluster.
#[derive(Debug, Clone, Serialize)]
pub struct NewJudge {
    pub name: String,
    pub role: Option<String>,
    pub email: Option<String>,
}

/// Envelope returned by the cluster-judges endpoint.
#[derive(Debug, Deserialize)]
pub struct ClusterJudgesResponse {
    pub judges: Vec<Judge>,
}
