//! Job and section persistence for the generation pipeline.
//!
//! [`JobStore`] is the single write path for pipeline state: every pass
//! completion, section acceptance and progress counter goes through it before
//! the next unit of work starts. Implementations:
//! - [`Storage`]: libSQL database (offline, file-backed)
//! - [`MemoryStore`]: in-process maps, for ephemeral runs and tests
//! - [`CachedStore`]: TTL section-list cache wrapped around another store

mod cache;
mod memory;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, params};

use articleforge_shared::{
    ArticleForgeError, GenerationJob, JobId, JobUpdate, PassName, PassStatus, Result, Section,
    SectionUpdate,
};

pub use cache::CachedStore;
pub use memory::MemoryStore;

/// Persistence contract consumed by the orchestrator.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails if the brief already has a job.
    async fn create_job(&self, job: &GenerationJob) -> Result<()>;

    async fn get_job(&self, id: &JobId) -> Result<Option<GenerationJob>>;

    /// The job owning `brief_id`, if any.
    async fn find_job_by_brief(&self, brief_id: &str) -> Result<Option<GenerationJob>>;

    /// All jobs, newest first.
    async fn list_jobs(&self) -> Result<Vec<GenerationJob>>;

    /// Apply a partial update and return the updated job.
    async fn update_job(&self, id: &JobId, update: &JobUpdate) -> Result<GenerationJob>;

    /// Sections of a job in document order.
    async fn list_sections(&self, job_id: &JobId) -> Result<Vec<Section>>;

    /// Create or update the section `(job_id, section_key)`.
    async fn upsert_section(
        &self,
        job_id: &JobId,
        section_key: &str,
        update: &SectionUpdate,
    ) -> Result<Section>;

    /// Delete a job with its sections and cached pass outputs.
    async fn delete_job(&self, id: &JobId) -> Result<()>;

    /// Cached output of a whole-document pass.
    async fn get_pass_cache(
        &self,
        job_id: &JobId,
        pass: PassName,
        input_hash: &str,
        route: &str,
    ) -> Result<Option<String>>;

    async fn set_pass_cache(
        &self,
        job_id: &JobId,
        pass: PassName,
        input_hash: &str,
        route: &str,
        output: &str,
    ) -> Result<()>;

    /// Take or renew the run lease of a job for `owner`. Succeeds when no
    /// one holds it, `owner` already does, or the holder's last heartbeat is
    /// older than `stale_before`.
    async fn claim_run(
        &self,
        job_id: &JobId,
        owner: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool>;

    /// Drop the run lease if `owner` still holds it.
    async fn release_run(&self, job_id: &JobId, owner: &str) -> Result<()>;
}

fn storage_err(e: impl std::fmt::Display) -> ArticleForgeError {
    ArticleForgeError::Storage(e.to_string())
}

fn job_not_found(id: &JobId) -> ArticleForgeError {
    ArticleForgeError::Storage(format!("job {id} not found"))
}

// ---------------------------------------------------------------------------
// libSQL storage
// ---------------------------------------------------------------------------

const JOB_COLUMNS: &str = "id, brief_id, status, current_pass, pass_status_json, total_sections, \
     completed_sections, current_section_key, draft_content, final_score, violation_report_json, \
     last_error, retry_count, created_at, started_at, completed_at";

const SECTION_COLUMNS: &str = "id, job_id, section_key, heading, sort_order, level, contents_json, \
     per_rule_scores_json, status, created_at, updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArticleForgeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    ArticleForgeError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    async fn query_jobs(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<GenerationJob>> {
        let mut rows = self.conn.query(sql, params).await.map_err(storage_err)?;
        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }

    async fn get_section(&self, job_id: &JobId, section_key: &str) -> Result<Option<Section>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {SECTION_COLUMNS} FROM sections WHERE job_id = ?1 AND section_key = ?2"
                ),
                params![job_id.to_string(), section_key],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_section(&row)?)),
            None => Ok(None),
        }
    }

    async fn write_job(&self, job: &GenerationJob) -> Result<()> {
        let pass_status = serde_json::to_string(&job.pass_status).map_err(storage_err)?;
        let report = job
            .violation_report
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(storage_err)?;

        let changed = self
            .conn
            .execute(
                "UPDATE jobs SET status = ?2, current_pass = ?3, pass_status_json = ?4,
                   total_sections = ?5, completed_sections = ?6, current_section_key = ?7,
                   draft_content = ?8, final_score = ?9, violation_report_json = ?10,
                   last_error = ?11, retry_count = ?12, started_at = ?13, completed_at = ?14
                 WHERE id = ?1",
                params![
                    job.id.to_string(),
                    job.status.as_str(),
                    i64::from(job.current_pass),
                    pass_status,
                    i64::from(job.total_sections),
                    i64::from(job.completed_sections),
                    job.current_section_key.clone(),
                    job.draft_content.as_str(),
                    job.final_score.map(i64::from),
                    report,
                    job.last_error.clone(),
                    i64::from(job.retry_count),
                    job.started_at.map(|t| t.to_rfc3339()),
                    job.completed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(job_not_found(&job.id));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for Storage {
    async fn create_job(&self, job: &GenerationJob) -> Result<()> {
        let pass_status = serde_json::to_string(&job.pass_status).map_err(storage_err)?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO jobs ({JOB_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
                ),
                params![
                    job.id.to_string(),
                    job.brief_id.as_str(),
                    job.status.as_str(),
                    i64::from(job.current_pass),
                    pass_status,
                    i64::from(job.total_sections),
                    i64::from(job.completed_sections),
                    job.current_section_key.clone(),
                    job.draft_content.as_str(),
                    job.final_score.map(i64::from),
                    Option::<String>::None,
                    job.last_error.clone(),
                    i64::from(job.retry_count),
                    job.created_at.to_rfc3339(),
                    job.started_at.map(|t| t.to_rfc3339()),
                    job.completed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .await
            .map_err(storage_err)?;
        tracing::debug!(job_id = %job.id, brief_id = %job.brief_id, "job created");
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<GenerationJob>> {
        let jobs = self
            .query_jobs(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id.to_string()],
            )
            .await?;
        Ok(jobs.into_iter().next())
    }

    async fn find_job_by_brief(&self, brief_id: &str) -> Result<Option<GenerationJob>> {
        let jobs = self
            .query_jobs(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE brief_id = ?1"),
                params![brief_id],
            )
            .await?;
        Ok(jobs.into_iter().next())
    }

    async fn list_jobs(&self) -> Result<Vec<GenerationJob>> {
        self.query_jobs(
            &format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC"),
            params![],
        )
        .await
    }

    async fn update_job(&self, id: &JobId, update: &JobUpdate) -> Result<GenerationJob> {
        let mut job = self.get_job(id).await?.ok_or_else(|| job_not_found(id))?;
        job.apply(update);
        self.write_job(&job).await?;
        Ok(job)
    }

    async fn list_sections(&self, job_id: &JobId) -> Result<Vec<Section>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {SECTION_COLUMNS} FROM sections WHERE job_id = ?1
                     ORDER BY sort_order, section_key"
                ),
                params![job_id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        let mut sections = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            sections.push(row_to_section(&row)?);
        }
        Ok(sections)
    }

    async fn upsert_section(
        &self,
        job_id: &JobId,
        section_key: &str,
        update: &SectionUpdate,
    ) -> Result<Section> {
        let mut section = match self.get_section(job_id, section_key).await? {
            Some(existing) => existing,
            None => Section::new(job_id.to_string(), section_key),
        };
        section.apply(update)?;

        let contents = serde_json::to_string(&section.contents).map_err(storage_err)?;
        let scores = serde_json::to_string(&section.per_rule_scores).map_err(storage_err)?;

        self.conn
            .execute(
                &format!(
                    "INSERT INTO sections ({SECTION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(job_id, section_key) DO UPDATE SET
                       heading = excluded.heading,
                       sort_order = excluded.sort_order,
                       level = excluded.level,
                       contents_json = excluded.contents_json,
                       per_rule_scores_json = excluded.per_rule_scores_json,
                       status = excluded.status,
                       updated_at = excluded.updated_at"
                ),
                params![
                    section.id.as_str(),
                    section.job_id.as_str(),
                    section.section_key.as_str(),
                    section.heading.as_str(),
                    section.order,
                    i64::from(section.level),
                    contents,
                    scores,
                    section.status.as_str(),
                    section.created_at.to_rfc3339(),
                    section.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;

        Ok(section)
    }

    async fn delete_job(&self, id: &JobId) -> Result<()> {
        let id = id.to_string();
        for sql in [
            "DELETE FROM run_leases WHERE job_id = ?1",
            "DELETE FROM pass_cache WHERE job_id = ?1",
            "DELETE FROM sections WHERE job_id = ?1",
            "DELETE FROM jobs WHERE id = ?1",
        ] {
            self.conn
                .execute(sql, params![id.as_str()])
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    async fn get_pass_cache(
        &self,
        job_id: &JobId,
        pass: PassName,
        input_hash: &str,
        route: &str,
    ) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT output FROM pass_cache
                 WHERE job_id = ?1 AND pass = ?2 AND input_hash = ?3 AND route = ?4",
                params![job_id.to_string(), pass.as_str(), input_hash, route],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            None => Ok(None),
        }
    }

    async fn set_pass_cache(
        &self,
        job_id: &JobId,
        pass: PassName,
        input_hash: &str,
        route: &str,
        output: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO pass_cache (job_id, pass, input_hash, route, output, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(job_id, pass, input_hash, route) DO UPDATE SET
                   output = excluded.output,
                   created_at = excluded.created_at",
                params![job_id.to_string(), pass.as_str(), input_hash, route, output, now],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn claim_run(
        &self,
        job_id: &JobId,
        owner: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "INSERT INTO run_leases (job_id, owner, heartbeat_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(job_id) DO UPDATE SET
                   owner = excluded.owner,
                   heartbeat_at = excluded.heartbeat_at
                 WHERE run_leases.owner = excluded.owner OR run_leases.heartbeat_at < ?4",
                params![
                    job_id.to_string(),
                    owner,
                    lease_time(now),
                    lease_time(stale_before)
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    async fn release_run(&self, job_id: &JobId, owner: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM run_leases WHERE job_id = ?1 AND owner = ?2",
                params![job_id.to_string(), owner],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Fixed-width UTC timestamp, so lease times compare as text.
fn lease_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ArticleForgeError::Storage(format!("invalid date '{s}': {e}")))
}

fn opt_time(row: &libsql::Row, idx: i32) -> Result<Option<DateTime<Utc>>> {
    match row.get::<String>(idx).ok() {
        Some(s) => Ok(Some(parse_time(&s)?)),
        None => Ok(None),
    }
}

/// Convert a database row to a [`GenerationJob`].
fn row_to_job(row: &libsql::Row) -> Result<GenerationJob> {
    let id: String = row.get(0).map_err(storage_err)?;
    let status: String = row.get(2).map_err(storage_err)?;
    let pass_status: String = row.get(4).map_err(storage_err)?;
    let created_at: String = row.get(13).map_err(storage_err)?;

    Ok(GenerationJob {
        id: id
            .parse()
            .map_err(|e| ArticleForgeError::Storage(format!("invalid job id '{id}': {e}")))?,
        brief_id: row.get::<String>(1).map_err(storage_err)?,
        status: status.parse()?,
        current_pass: row.get::<u32>(3).map_err(storage_err)? as u8,
        pass_status: serde_json::from_str::<PassStatus>(&pass_status).map_err(storage_err)?,
        total_sections: row.get::<u32>(5).map_err(storage_err)?,
        completed_sections: row.get::<u32>(6).map_err(storage_err)?,
        current_section_key: row.get::<String>(7).ok(),
        draft_content: row.get::<String>(8).unwrap_or_default(),
        final_score: row.get::<u32>(9).ok().map(|v| v.min(100) as u8),
        violation_report: row
            .get::<String>(10)
            .ok()
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(storage_err)?,
        last_error: row.get::<String>(11).ok(),
        retry_count: row.get::<u32>(12).map_err(storage_err)?,
        created_at: parse_time(&created_at)?,
        started_at: opt_time(row, 14)?,
        completed_at: opt_time(row, 15)?,
    })
}

/// Convert a database row to a [`Section`].
fn row_to_section(row: &libsql::Row) -> Result<Section> {
    let contents: String = row.get(6).map_err(storage_err)?;
    let scores: String = row.get(7).map_err(storage_err)?;
    let status: String = row.get(8).map_err(storage_err)?;
    let created_at: String = row.get(9).map_err(storage_err)?;
    let updated_at: String = row.get(10).map_err(storage_err)?;

    Ok(Section {
        id: row.get::<String>(0).map_err(storage_err)?,
        job_id: row.get::<String>(1).map_err(storage_err)?,
        section_key: row.get::<String>(2).map_err(storage_err)?,
        heading: row.get::<String>(3).map_err(storage_err)?,
        order: row.get::<f64>(4).map_err(storage_err)?,
        level: row.get::<u32>(5).map_err(storage_err)? as u8,
        contents: serde_json::from_str(&contents).map_err(storage_err)?,
        per_rule_scores: serde_json::from_str(&scores).map_err(storage_err)?,
        status: status.parse()?,
        created_at: parse_time(&created_at)?,
        updated_at: parse_time(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use articleforge_shared::{JobStatus, PassState, SectionStatus};
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("af_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 3);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("af_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn job_crud() {
        let storage = test_storage().await;
        let job = GenerationJob::new("brief-1", 4);
        storage.create_job(&job).await.expect("create job");

        let found = storage.get_job(&job.id).await.expect("get job").expect("exists");
        assert_eq!(found.brief_id, "brief-1");
        assert_eq!(found.status, JobStatus::Pending);
        assert_eq!(found.total_sections, 4);
        assert!(found.current_section_key.is_none());

        let updated = storage
            .update_job(
                &job.id,
                &JobUpdate::new()
                    .with_status(JobStatus::InProgress)
                    .with_pass_state(PassName::Draft, PassState::InProgress)
                    .with_current_section_key(Some("intro".into()))
                    .with_started_at(Utc::now()),
            )
            .await
            .expect("update job");
        assert_eq!(updated.status, JobStatus::InProgress);

        let reloaded = storage.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.pass_status.get(PassName::Draft), PassState::InProgress);
        assert_eq!(reloaded.current_section_key.as_deref(), Some("intro"));
        assert!(reloaded.started_at.is_some());

        let by_brief = storage.find_job_by_brief("brief-1").await.unwrap();
        assert_eq!(by_brief.map(|j| j.id), Some(job.id.clone()));
        assert_eq!(storage.list_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn brief_id_is_unique() {
        let storage = test_storage().await;
        storage
            .create_job(&GenerationJob::new("brief-1", 1))
            .await
            .expect("first job");
        let second = storage.create_job(&GenerationJob::new("brief-1", 1)).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn update_missing_job_fails() {
        let storage = test_storage().await;
        let result = storage
            .update_job(&JobId::new(), &JobUpdate::new().with_status(JobStatus::Paused))
            .await;
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[tokio::test]
    async fn section_upsert_keeps_history() {
        let storage = test_storage().await;
        let job = GenerationJob::new("brief-2", 2);
        storage.create_job(&job).await.unwrap();

        storage
            .upsert_section(
                &job.id,
                "intro",
                &SectionUpdate::new()
                    .with_content(PassName::Draft, "first draft")
                    .with_status(SectionStatus::Completed),
            )
            .await
            .expect("insert section");

        storage
            .upsert_section(
                &job.id,
                "intro",
                &SectionUpdate::new().with_content(PassName::Headings, "second draft"),
            )
            .await
            .expect("append pass 2");

        let sections = storage.list_sections(&job.id).await.expect("list sections");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content_for(PassName::Draft), Some("first draft"));
        assert_eq!(sections[0].current_content(), Some("second draft"));
        assert_eq!(sections[0].status, SectionStatus::Completed);

        let rewrite = storage
            .upsert_section(
                &job.id,
                "intro",
                &SectionUpdate::new().with_content(PassName::Draft, "overwrite"),
            )
            .await;
        assert!(rewrite.is_err());
    }

    #[tokio::test]
    async fn sections_listed_in_order() {
        let storage = test_storage().await;
        let job = GenerationJob::new("brief-3", 3);
        storage.create_job(&job).await.unwrap();

        for (key, order) in [("c", 2.0), ("a", 1.0), ("b", 1.01)] {
            let update = SectionUpdate {
                order: Some(order),
                heading: Some(key.to_uppercase()),
                ..SectionUpdate::default()
            };
            storage.upsert_section(&job.id, key, &update).await.unwrap();
        }

        let keys: Vec<String> = storage
            .list_sections(&job.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.section_key)
            .collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn delete_job_removes_everything() {
        let storage = test_storage().await;
        let job = GenerationJob::new("brief-4", 1);
        storage.create_job(&job).await.unwrap();
        storage
            .upsert_section(&job.id, "s", &SectionUpdate::new())
            .await
            .unwrap();
        storage
            .set_pass_cache(&job.id, PassName::Headings, "h", "openrouter", "out")
            .await
            .unwrap();

        storage.delete_job(&job.id).await.expect("delete");
        assert!(storage.get_job(&job.id).await.unwrap().is_none());
        assert!(storage.list_sections(&job.id).await.unwrap().is_empty());
        assert!(
            storage
                .get_pass_cache(&job.id, PassName::Headings, "h", "openrouter")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn pass_cache_roundtrip() {
        let storage = test_storage().await;
        let job = GenerationJob::new("brief-5", 1);
        storage.create_job(&job).await.unwrap();

        let miss = storage
            .get_pass_cache(&job.id, PassName::Discourse, "abc", "openrouter>anthropic")
            .await
            .expect("cache miss");
        assert!(miss.is_none());

        storage
            .set_pass_cache(&job.id, PassName::Discourse, "abc", "openrouter>anthropic", "v1")
            .await
            .expect("set");
        storage
            .set_pass_cache(&job.id, PassName::Discourse, "abc", "openrouter>anthropic", "v2")
            .await
            .expect("overwrite");

        let hit = storage
            .get_pass_cache(&job.id, PassName::Discourse, "abc", "openrouter>anthropic")
            .await
            .expect("cache hit");
        assert_eq!(hit.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn run_lease_is_shared_between_handles() {
        let path = std::env::temp_dir().join(format!("af_test_{}.db", Uuid::now_v7()));
        let first = Storage::open(&path).await.expect("open");
        let second = Storage::open(&path).await.expect("open again");
        let job = GenerationJob::new("brief-6", 1);
        first.create_job(&job).await.unwrap();

        let now = Utc::now();
        let stale_before = now - chrono::Duration::minutes(15);
        assert!(first.claim_run(&job.id, "one", now, stale_before).await.unwrap());
        assert!(!second.claim_run(&job.id, "two", now, stale_before).await.unwrap());
        assert!(first.claim_run(&job.id, "one", now, stale_before).await.unwrap());

        // A heartbeat older than the cutoff can be taken over.
        let much_later = now + chrono::Duration::minutes(30);
        assert!(
            second
                .claim_run(&job.id, "two", much_later, much_later - chrono::Duration::minutes(15))
                .await
                .unwrap()
        );
        first.release_run(&job.id, "one").await.unwrap();
        assert!(!first.claim_run(&job.id, "one", much_later, stale_before).await.unwrap());

        second.release_run(&job.id, "two").await.unwrap();
        assert!(first.claim_run(&job.id, "one", much_later, stale_before).await.unwrap());
    }
}
