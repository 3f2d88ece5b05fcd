use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ids::*, target::Target, time};

/// A stored request to benchmark against a dependency target.
///
/// Builds are written once by whoever originates them and only read afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub id: BuildId,
    pub target: Target,
    /// Runtime version active on the host when the build was created.
    pub runtime_version: String,
    pub created_at: DateTime<Utc>,
}

impl Build {
    pub fn new(target: Target, runtime_version: impl Into<String>) -> Self {
        Self {
            id: BuildId::new(),
            target,
            runtime_version: runtime_version.into(),
            created_at: time::now(),
        }
    }
}

/// Structured result of one benchmark run.
///
/// `payload` holds the script's JSON object with `build_id` and `created_at`
/// merged in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub build_id: BuildId,
    pub payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}
