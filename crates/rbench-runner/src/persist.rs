use std::sync::Arc;

use rbench_core::{now, to_rfc3339, BuildId, PipelineError, Report, ReportId};
use rbench_storage::Storage;
use serde_json::{Map, Value};

/// Writes one new report per successful run. There is no update path.
pub struct ReportPersister {
    storage: Arc<dyn Storage>,
}

impl ReportPersister {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Stamp `build_id` and `created_at` into `payload` and insert it.
    /// The stamped values replace any the script emitted under those keys.
    pub fn persist(&self, build_id: &BuildId, mut payload: Map<String, Value>) -> Result<Report, PipelineError> {
        let created_at = now();
        payload.insert("build_id".to_string(), Value::String(build_id.to_string()));
        payload.insert("created_at".to_string(), Value::String(to_rfc3339(&created_at)));

        let mut report = Report {
            id: ReportId::new(),
            build_id: build_id.clone(),
            payload,
            created_at,
        };
        report.id = self
            .storage
            .insert_report(report.clone())
            .map_err(PipelineError::Storage)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbench_core::Build;
    use rbench_storage::InMemoryStorage;
    use serde_json::json;

    #[test]
    fn pipeline_build_id_wins() {
        let storage = Arc::new(InMemoryStorage::new());
        let build_id = storage.insert_build(Build::new(vec![], "3.3.0")).unwrap();
        let persister = ReportPersister::new(storage.clone());

        let payload = json!({"build_id": "forged", "k": 1}).as_object().cloned().unwrap();
        let report = persister.persist(&build_id, payload).unwrap();

        assert_eq!(report.get("build_id"), Some(&json!(build_id.as_str())));
        assert_eq!(report.get("k"), Some(&json!(1)));
        assert!(report.get("created_at").unwrap().is_string());
        assert_eq!(storage.count_reports().unwrap(), 1);
    }

    #[test]
    fn each_call_is_a_new_report() {
        let storage = Arc::new(InMemoryStorage::new());
        let build_id = storage.insert_build(Build::new(vec![], "3.3.0")).unwrap();
        let persister = ReportPersister::new(storage.clone());

        let a = persister.persist(&build_id, Map::new()).unwrap();
        let b = persister.persist(&build_id, Map::new()).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(storage.reports_for_build(&build_id).unwrap().len(), 2);
    }

    #[test]
    fn storage_failure_is_typed() {
        let storage = Arc::new(InMemoryStorage::new());
        let persister = ReportPersister::new(storage);
        let err = persister.persist(&BuildId::from_str("ghost"), Map::new()).unwrap_err();
        assert_eq!(err.kind(), rbench_core::ErrorKind::Storage);
    }
}
