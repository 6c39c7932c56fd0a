//! In-process [`JobStore`] backed by hash maps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use articleforge_shared::{
    ArticleForgeError, GenerationJob, JobId, JobUpdate, PassName, Result, Section, SectionUpdate,
};

use crate::JobStore;

type CacheKey = (String, PassName, String, String);

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, GenerationJob>,
    sections: HashMap<(String, String), Section>,
    pass_cache: HashMap<CacheKey, String>,
    /// Job id to lease holder and last heartbeat.
    leases: HashMap<String, (String, DateTime<Utc>)>,
}

/// Non-durable store. State lives as long as the value.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a storage error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ArticleForgeError::Storage("write rejected".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: &GenerationJob) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.lock().await;
        if inner.jobs.values().any(|j| j.brief_id == job.brief_id) {
            return Err(ArticleForgeError::Storage(format!(
                "brief '{}' already has a job",
                job.brief_id
            )));
        }
        inner.jobs.insert(job.id.to_string(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<GenerationJob>> {
        Ok(self.inner.lock().await.jobs.get(&id.to_string()).cloned())
    }

    async fn find_job_by_brief(&self, brief_id: &str) -> Result<Option<GenerationJob>> {
        let inner = self.inner.lock().await;
        Ok(inner.jobs.values().find(|j| j.brief_id == brief_id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<GenerationJob>> {
        let mut jobs: Vec<_> = self.inner.lock().await.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn update_job(&self, id: &JobId, update: &JobUpdate) -> Result<GenerationJob> {
        self.check_writable()?;
        let mut inner = self.inner.lock().await;
        let job = inner
            .jobs
            .get_mut(&id.to_string())
            .ok_or_else(|| ArticleForgeError::Storage(format!("job {id} not found")))?;
        job.apply(update);
        Ok(job.clone())
    }

    async fn list_sections(&self, job_id: &JobId) -> Result<Vec<Section>> {
        let job_id = job_id.to_string();
        let inner = self.inner.lock().await;
        let mut sections: Vec<_> = inner
            .sections
            .values()
            .filter(|s| s.job_id == job_id)
            .cloned()
            .collect();
        sections.sort_by(|a, b| {
            a.order
                .total_cmp(&b.order)
                .then_with(|| a.section_key.cmp(&b.section_key))
        });
        Ok(sections)
    }

    async fn upsert_section(
        &self,
        job_id: &JobId,
        section_key: &str,
        update: &SectionUpdate,
    ) -> Result<Section> {
        self.check_writable()?;
        let key = (job_id.to_string(), section_key.to_string());
        let mut inner = self.inner.lock().await;
        let mut section = inner
            .sections
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Section::new(job_id.to_string(), section_key));
        section.apply(update)?;
        inner.sections.insert(key, section.clone());
        Ok(section)
    }

    async fn delete_job(&self, id: &JobId) -> Result<()> {
        self.check_writable()?;
        let id = id.to_string();
        let mut inner = self.inner.lock().await;
        inner.jobs.remove(&id);
        inner.sections.retain(|(job, _), _| *job != id);
        inner.pass_cache.retain(|(job, ..), _| *job != id);
        inner.leases.remove(&id);
        Ok(())
    }

    async fn get_pass_cache(
        &self,
        job_id: &JobId,
        pass: PassName,
        input_hash: &str,
        route: &str,
    ) -> Result<Option<String>> {
        let key = (
            job_id.to_string(),
            pass,
            input_hash.to_string(),
            route.to_string(),
        );
        Ok(self.inner.lock().await.pass_cache.get(&key).cloned())
    }

    async fn set_pass_cache(
        &self,
        job_id: &JobId,
        pass: PassName,
        input_hash: &str,
        route: &str,
        output: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let key = (
            job_id.to_string(),
            pass,
            input_hash.to_string(),
            route.to_string(),
        );
        self.inner
            .lock()
            .await
            .pass_cache
            .insert(key, output.to_string());
        Ok(())
    }

    async fn claim_run(
        &self,
        job_id: &JobId,
        owner: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        self.check_writable()?;
        let mut inner = self.inner.lock().await;
        let key = job_id.to_string();
        let free = match inner.leases.get(&key) {
            Some((holder, heartbeat)) => holder == owner || *heartbeat < stale_before,
            None => true,
        };
        if free {
            inner.leases.insert(key, (owner.to_string(), now));
        }
        Ok(free)
    }

    async fn release_run(&self, job_id: &JobId, owner: &str) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.lock().await;
        let key = job_id.to_string();
        if inner.leases.get(&key).is_some_and(|(holder, _)| holder == owner) {
            inner.leases.remove(&key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use articleforge_shared::JobStatus;

    #[tokio::test]
    async fn failing_writes_leave_state_untouched() {
        let store = MemoryStore::new();
        let job = GenerationJob::new("b", 1);
        store.create_job(&job).await.unwrap();

        store.set_fail_writes(true);
        let err = store
            .update_job(&job.id, &JobUpdate::new().with_status(JobStatus::Completed))
            .await
            .unwrap_err();
        assert!(err.is_persistence());

        store.set_fail_writes(false);
        let job = store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn run_lease_is_exclusive_until_stale() {
        let store = MemoryStore::new();
        let job = GenerationJob::new("b", 1);
        store.create_job(&job).await.unwrap();
        let t0 = Utc::now();
        let later = t0 + chrono::Duration::minutes(5);

        assert!(store.claim_run(&job.id, "a", t0, t0 - chrono::Duration::minutes(1)).await.unwrap());
        assert!(!store.claim_run(&job.id, "b", t0, t0 - chrono::Duration::minutes(1)).await.unwrap());
        assert!(store.claim_run(&job.id, "a", t0, t0).await.unwrap());
        assert!(store.claim_run(&job.id, "b", later, later - chrono::Duration::minutes(1)).await.unwrap());

        store.release_run(&job.id, "a").await.unwrap();
        assert!(!store.claim_run(&job.id, "a", later, t0).await.unwrap());
        store.release_run(&job.id, "b").await.unwrap();
        assert!(store.claim_run(&job.id, "a", later, t0).await.unwrap());
    }

    #[tokio::test]
    async fn sections_sorted_and_scoped_to_job() {
        let store = MemoryStore::new();
        let a = GenerationJob::new("a", 2);
        let b = GenerationJob::new("b", 1);
        store.create_job(&a).await.unwrap();
        store.create_job(&b).await.unwrap();

        for (key, order) in [("two", 2.0), ("one", 1.0)] {
            let update = SectionUpdate {
                order: Some(order),
                ..SectionUpdate::default()
            };
            store.upsert_section(&a.id, key, &update).await.unwrap();
        }
        store
            .upsert_section(&b.id, "other", &SectionUpdate::new())
            .await
            .unwrap();

        let keys: Vec<_> = store
            .list_sections(&a.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.section_key)
            .collect();
        assert_eq!(keys, ["one", "two"]);

        store.delete_job(&a.id).await.unwrap();
        assert!(store.list_sections(&a.id).await.unwrap().is_empty());
        assert_eq!(store.list_sections(&b.id).await.unwrap().len(), 1);
    }
}
