use serde::{Deserialize, Serialize};

/// Generation counter bumped on every start. Anything produced for an older
/// run is stale.
pub type RunId = u64;

/// Parameters supplied by the caller when starting a job. Passed through to the
/// backend unvalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub rural_quota: f64,
    pub reserved_quota: f64,
    pub female_quota: f64,
    pub top_k_similarity: u32,
    /// Optimization time budget in seconds.
    pub optimization_time: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            rural_quota: 30.0,
            reserved_quota: 50.0,
            female_quota: 33.0,
            top_k_similarity: 10,
            optimization_time: 60,
        }
    }
}

/// Authoritative job snapshot reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(alias = "isRunning")]
    pub is_running: bool,
    #[serde(alias = "progressPercent", alias = "progress_percent")]
    pub progress: f64,
    #[serde(default, alias = "stageName", alias = "stage_name")]
    pub stage: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "estimatedRemainingSeconds")]
    pub estimated_remaining_seconds: Option<f64>,
    #[serde(default, alias = "totalUnits")]
    pub total_units: Option<f64>,
}

impl JobStatus {
    pub fn running(progress: f64) -> Self {
        Self {
            is_running: true,
            progress,
            stage: String::new(),
            message: String::new(),
            estimated_remaining_seconds: None,
            total_units: None,
        }
    }

    pub fn finished(progress: f64) -> Self {
        Self {
            is_running: false,
            ..Self::running(progress)
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>, message: impl Into<String>) -> Self {
        self.stage = stage.into();
        self.message = message.into();
        self
    }

    pub fn with_remaining(mut self, seconds: f64) -> Self {
        self.estimated_remaining_seconds = Some(seconds);
        self
    }
}

/// Provisional match produced while the job is still running. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMatch {
    #[serde(alias = "subjectId")]
    pub subject_id: String,
    #[serde(default, alias = "subjectName")]
    pub subject_name: String,
    #[serde(default, alias = "counterpartyName")]
    pub counterparty_name: String,
    #[serde(default, alias = "roleName")]
    pub role_name: String,
    #[serde(default, alias = "similarityScore")]
    pub similarity_score: f64,
    #[serde(default, alias = "successProbability")]
    pub success_probability: f64,
}

/// Final allocation row. Fields beyond the common ones are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(alias = "subjectId")]
    pub subject_id: String,
    #[serde(default, alias = "counterpartyName")]
    pub counterparty_name: String,
    #[serde(default, alias = "roleName")]
    pub role_name: String,
    #[serde(default, alias = "similarityScore")]
    pub similarity_score: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Outcome of a finished job, fetched once after completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestResult {
    #[serde(default)]
    pub allocations: Vec<MatchRecord>,
    #[serde(default)]
    pub total: f64,
    /// Unix timestamp in seconds, when the backend provides one.
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// The two polled streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Status,
    LiveMatches,
}

/// Coarse classification of a transport failure, used to pick a retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    Timeout,
    Other,
}

/// A failed poll, as seen by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub class: FailureClass,
    pub message: String,
}

impl TransportFailure {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Timeout,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Other,
            message: message.into(),
        }
    }
}
