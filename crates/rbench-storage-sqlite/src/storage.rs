use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rbench_core::{to_rfc3339, Build, BuildId, Report, ReportId, Target};
use rbench_storage::Storage;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // several workers may share one db file
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql).context("apply schema")?;
        tracing::debug!("sqlite schema ready");
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }

    fn build_from_row(r: &Row<'_>) -> rusqlite::Result<(String, String, String, String)> {
        Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
    }

    fn decode_build((id, target_json, runtime_version, created_at): (String, String, String, String)) -> Result<Build> {
        let target: Target =
            serde_json::from_str(&target_json).with_context(|| format!("decode target of build {id}"))?;
        Ok(Build {
            id: BuildId::from_str(id),
            target,
            runtime_version,
            created_at: parse_ts(&created_at)?,
        })
    }

    fn report_from_row(r: &Row<'_>) -> rusqlite::Result<(String, String, String, String)> {
        Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
    }

    fn decode_report((id, build_id, payload_json, created_at): (String, String, String, String)) -> Result<Report> {
        let payload: Map<String, Value> =
            serde_json::from_str(&payload_json).with_context(|| format!("decode payload of report {id}"))?;
        Ok(Report {
            id: ReportId::from_str(id),
            build_id: BuildId::from_str(build_id),
            payload,
            created_at: parse_ts(&created_at)?,
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(s).with_context(|| format!("parse timestamp {s}"))?;
    Ok(ts.with_timezone(&Utc))
}

impl Storage for SqliteStorage {
    fn find_build(&self, id: &BuildId) -> Result<Option<Build>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, target_json, runtime_version, created_at FROM builds WHERE id=?1",
                params![id.0],
                Self::build_from_row,
            )
            .optional()?;
        row.map(Self::decode_build).transpose()
    }

    fn insert_build(&self, build: Build) -> Result<BuildId> {
        let conn = self.conn()?;
        let target_json = serde_json::to_string(&build.target)?;
        conn.execute(
            "INSERT INTO builds(id, target_json, runtime_version, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![build.id.0, target_json, build.runtime_version, to_rfc3339(&build.created_at)],
        )
        .with_context(|| format!("insert build {}", build.id))?;
        Ok(build.id)
    }

    fn list_builds(&self) -> Result<Vec<Build>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, target_json, runtime_version, created_at FROM builds ORDER BY created_at, id")?;
        let rows = stmt.query_map([], Self::build_from_row)?;
        let mut builds = vec![];
        for row in rows {
            builds.push(Self::decode_build(row?)?);
        }
        Ok(builds)
    }

    fn count_builds(&self) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(1) FROM builds", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    fn insert_report(&self, report: Report) -> Result<ReportId> {
        let conn = self.conn()?;
        let payload_json = serde_json::to_string(&report.payload)?;
        conn.execute(
            "INSERT INTO reports(id, build_id, payload_json, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![report.id.0, report.build_id.0, payload_json, to_rfc3339(&report.created_at)],
        )
        .with_context(|| format!("insert report for build {}", report.build_id))?;
        Ok(report.id)
    }

    fn count_reports(&self) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(1) FROM reports", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    fn find_one_report(&self) -> Result<Option<Report>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, build_id, payload_json, created_at FROM reports ORDER BY seq LIMIT 1",
                [],
                Self::report_from_row,
            )
            .optional()?;
        row.map(Self::decode_report).transpose()
    }

    fn reports_for_build(&self, build_id: &BuildId) -> Result<Vec<Report>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, build_id, payload_json, created_at FROM reports WHERE build_id=?1 ORDER BY seq")?;
        let rows = stmt.query_map(params![build_id.0], Self::report_from_row)?;
        let mut reports = vec![];
        for row in rows {
            reports.push(Self::decode_report(row?)?);
        }
        Ok(reports)
    }
}
