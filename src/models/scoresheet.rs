use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ClusterId, JudgeId, TeamId};

/// The kind of scoresheet a judge fills in for a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SheetType {
    Project,
    RobotDesign,
    CoreValues,
}

impl SheetType {
    /// Path segment used by the scoring API.
    pub fn as_str(&self) -> &'static str {
        match self {
            SheetType::Project => "project",
            SheetType::RobotDesign => "robotDesign",
            SheetType::CoreValues => "coreValues",
        }
    }
}

impl fmt::Display for SheetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite cache key: one scoresheet exists per (team, judge, sheet type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoresheetKey {
    #[serde(rename = "teamId")]
    pub team_id: TeamId,
    #[serde(rename = "judgeId")]
    pub judge_id: JudgeId,
    #[serde(rename = "sheetType")]
    pub sheet_type: SheetType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub criterion: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scoresheet {
    #[serde(rename = "teamId")]
    pub team_id: TeamId,
    #[serde(rename = "judgeId")]
    pub judge_id: JudgeId,
    #[serde(rename = "sheetType")]
    pub sheet_type: SheetType,
    pub scores: Vec<ScoreEntry>,
    pub comment: Option<String>,
    pub submitted: bool,
    /// Computed server-side on save; absent until the first save round-trips.
    pub total: Option<f64>,
}

impl Scoresheet {
    pub fn key(&self) -> ScoresheetKey {
        ScoresheetKey {
            team_id: self.team_id,
            judge_id: self.judge_id,
            sheet_type: self.sheet_type,
        }
    }
}

/// How many sheets a cluster expects versus how many have been submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionStatus {
    #[serde(rename = "clusterId")]
    pub cluster_id: ClusterId,
    pub expected: u32,
    pub submitted: u32,
}

impl SubmissionStatus {
    pub fn is_complete(&self) -> bool {
        self.expected > 0 && self.submitted >= self.expected
    }
}
