use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use rbench_core::{Build, BuildId, Report, ReportId};

use crate::traits::Storage;

/// In-memory storage for tests. Not durable, but good for unit/small scenario tests.
#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    builds: HashMap<String, Build>,
    // insertion order doubles as report age
    reports: Vec<Report>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| anyhow!("in-memory storage lock poisoned"))
    }
}

impl Storage for InMemoryStorage {
    fn find_build(&self, id: &BuildId) -> anyhow::Result<Option<Build>> {
        let inner = self.lock()?;
        Ok(inner.builds.get(id.as_str()).cloned())
    }

    fn insert_build(&self, build: Build) -> anyhow::Result<BuildId> {
        let mut inner = self.lock()?;
        if inner.builds.contains_key(build.id.as_str()) {
            return Err(anyhow!("build {} already exists", build.id));
        }
        let id = build.id.clone();
        inner.builds.insert(id.0.clone(), build);
        Ok(id)
    }

    fn list_builds(&self) -> anyhow::Result<Vec<Build>> {
        let inner = self.lock()?;
        let mut builds: Vec<Build> = inner.builds.values().cloned().collect();
        builds.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(builds)
    }

    fn count_builds(&self) -> anyhow::Result<u64> {
        Ok(self.lock()?.builds.len() as u64)
    }

    fn insert_report(&self, report: Report) -> anyhow::Result<ReportId> {
        let mut inner = self.lock()?;
        if !inner.builds.contains_key(report.build_id.as_str()) {
            return Err(anyhow!("report references unknown build {}", report.build_id));
        }
        let id = report.id.clone();
        inner.reports.push(report);
        Ok(id)
    }

    fn count_reports(&self) -> anyhow::Result<u64> {
        Ok(self.lock()?.reports.len() as u64)
    }

    fn find_one_report(&self) -> anyhow::Result<Option<Report>> {
        Ok(self.lock()?.reports.first().cloned())
    }

    fn reports_for_build(&self, build_id: &BuildId) -> anyhow::Result<Vec<Report>> {
        let inner = self.lock()?;
        Ok(inner.reports.iter().filter(|r| &r.build_id == build_id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbench_core::Declaration;
    use serde_json::{json, Map};

    fn report_for(build_id: &BuildId, key: &str) -> Report {
        let mut payload = Map::new();
        payload.insert(key.to_string(), json!(1));
        Report {
            id: ReportId::new(),
            build_id: build_id.clone(),
            payload,
            created_at: rbench_core::now(),
        }
    }

    #[test]
    fn test_new_creates_empty_storage() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.count_builds().unwrap(), 0);
        assert_eq!(storage.count_reports().unwrap(), 0);
        assert!(storage.find_one_report().unwrap().is_none());
    }

    #[test]
    fn test_insert_and_find_build() {
        let storage = InMemoryStorage::new();
        let build = Build::new(vec![Declaration::named("sqlite3")], "3.3.0");
        let id = storage.insert_build(build.clone()).unwrap();
        assert_eq!(id, build.id);
        assert_eq!(storage.find_build(&id).unwrap(), Some(build));
        assert_eq!(storage.count_builds().unwrap(), 1);
    }

    #[test]
    fn test_find_missing_build() {
        let storage = InMemoryStorage::new();
        assert!(storage.find_build(&BuildId::from_str("1")).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_build_rejected() {
        let storage = InMemoryStorage::new();
        let build = Build::new(vec![], "3.3.0");
        storage.insert_build(build.clone()).unwrap();
        assert!(storage.insert_build(build).is_err());
    }

    #[test]
    fn test_reports_are_never_merged() {
        let storage = InMemoryStorage::new();
        let build = Build::new(vec![], "3.3.0");
        let id = storage.insert_build(build).unwrap();

        storage.insert_report(report_for(&id, "first")).unwrap();
        storage.insert_report(report_for(&id, "second")).unwrap();

        assert_eq!(storage.count_reports().unwrap(), 2);
        assert_eq!(storage.reports_for_build(&id).unwrap().len(), 2);
        let first = storage.find_one_report().unwrap().unwrap();
        assert!(first.payload.contains_key("first"));
    }

    #[test]
    fn test_report_for_unknown_build_rejected() {
        let storage = InMemoryStorage::new();
        let err = storage.insert_report(report_for(&BuildId::from_str("nope"), "k"));
        assert!(err.is_err());
        assert_eq!(storage.count_reports().unwrap(), 0);
    }
}
