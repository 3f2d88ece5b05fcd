use rbench_core::{Build, BuildId, Report, ReportId};

/// The persistent store behind builds and reports.
///
/// Implementations must accept concurrent `insert_report` calls, including
/// several for the same build.
pub trait Storage: Send + Sync {
    fn find_build(&self, id: &BuildId) -> anyhow::Result<Option<Build>>;
    fn insert_build(&self, build: Build) -> anyhow::Result<BuildId>;
    fn list_builds(&self) -> anyhow::Result<Vec<Build>>;
    fn count_builds(&self) -> anyhow::Result<u64>;

    /// Always inserts a new row; there is no upsert.
    fn insert_report(&self, report: Report) -> anyhow::Result<ReportId>;
    fn count_reports(&self) -> anyhow::Result<u64>;
    /// Oldest report in the store, if any.
    fn find_one_report(&self) -> anyhow::Result<Option<Report>>;
    fn reports_for_build(&self, build_id: &BuildId) -> anyhow::Result<Vec<Report>>;
}
