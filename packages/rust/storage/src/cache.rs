//! Short-lived section-list cache in front of a [`JobStore`].
//!
//! Entries expire after a TTL and are dropped on job deletion. Section
//! upserts refresh the cached list in place so readers never observe a
//! version older than the last write made through this wrapper.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use articleforge_shared::{GenerationJob, JobId, JobUpdate, PassName, Result, Section, SectionUpdate};

use crate::JobStore;

struct Entry {
    sections: Vec<Section>,
    loaded_at: Instant,
}

pub struct CachedStore<S> {
    inner: S,
    ttl: Duration,
    sections: Mutex<HashMap<String, Entry>>,
}

impl<S: JobStore> CachedStore<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            sections: Mutex::new(HashMap::new()),
        }
    }

    /// Drop the cached section list of one job.
    pub async fn invalidate(&self, job_id: &JobId) {
        self.sections.lock().await.remove(&job_id.to_string());
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: JobStore> JobStore for CachedStore<S> {
    async fn create_job(&self, job: &GenerationJob) -> Result<()> {
        self.inner.create_job(job).await
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<GenerationJob>> {
        self.inner.get_job(id).await
    }

    async fn find_job_by_brief(&self, brief_id: &str) -> Result<Option<GenerationJob>> {
        self.inner.find_job_by_brief(brief_id).await
    }

    async fn list_jobs(&self) -> Result<Vec<GenerationJob>> {
        self.inner.list_jobs().await
    }

    async fn update_job(&self, id: &JobId, update: &JobUpdate) -> Result<GenerationJob> {
        self.inner.update_job(id, update).await
    }

    async fn list_sections(&self, job_id: &JobId) -> Result<Vec<Section>> {
        let key = job_id.to_string();
        {
            let cache = self.sections.lock().await;
            if let Some(entry) = cache.get(&key) {
                if entry.loaded_at.elapsed() < self.ttl {
                    return Ok(entry.sections.clone());
                }
            }
        }

        let sections = self.inner.list_sections(job_id).await?;
        self.sections.lock().await.insert(
            key,
            Entry {
                sections: sections.clone(),
                loaded_at: Instant::now(),
            },
        );
        Ok(sections)
    }

    async fn upsert_section(
        &self,
        job_id: &JobId,
        section_key: &str,
        update: &SectionUpdate,
    ) -> Result<Section> {
        let section = self.inner.upsert_section(job_id, section_key, update).await?;

        let mut cache = self.sections.lock().await;
        if let Some(entry) = cache.get_mut(&job_id.to_string()) {
            match entry
                .sections
                .iter_mut()
                .find(|s| s.section_key == section.section_key)
            {
                Some(slot) => *slot = section.clone(),
                None => entry.sections.push(section.clone()),
            }
            entry.sections.sort_by(|a, b| {
                a.order
                    .total_cmp(&b.order)
                    .then_with(|| a.section_key.cmp(&b.section_key))
            });
        }
        Ok(section)
    }

    async fn delete_job(&self, id: &JobId) -> Result<()> {
        self.invalidate(id).await;
        self.inner.delete_job(id).await
    }

    async fn get_pass_cache(
        &self,
        job_id: &JobId,
        pass: PassName,
        input_hash: &str,
        route: &str,
    ) -> Result<Option<String>> {
        self.inner
            .get_pass_cache(job_id, pass, input_hash, route)
            .await
    }

    async fn set_pass_cache(
        &self,
        job_id: &JobId,
        pass: PassName,
        input_hash: &str,
        route: &str,
        output: &str,
    ) -> Result<()> {
        self.inner
            .set_pass_cache(job_id, pass, input_hash, route, output)
            .await
    }

    async fn claim_run(
        &self,
        job_id: &JobId,
        owner: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner.claim_run(job_id, owner, now, stale_before).await
    }

    async fn release_run(&self, job_id: &JobId, owner: &str) -> Result<()> {
        self.inner.release_run(job_id, owner).await
    }
}
