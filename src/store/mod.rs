//portail typé vers le magasin partagé: chaque mutation est un UPDATE conditionnel mono-ligne
use anyhow::{anyhow, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, FromRow};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::jobs::{Job, JobInput, JobMetadata, JobProgress, JobResult, JobStatus};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

//ligne brute telle que stockée, convertie en Job côté domaine
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    status: String,
    created_at: i64,
    assigned_date: Option<i64>,
    last_pinged: Option<i64>,
    completed_at: Option<i64>,
    assigned_to: Option<String>,
    video_owner: String,
    video_permlink: String,
    storage_metadata: Option<String>,
    input_uri: String,
    input_size: i64,
    download_pct: Option<f64>,
    pct: Option<f64>,
    result: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("unknown job status {:?} on job {}", self.status, self.id))?;
        let progress = match (self.download_pct, self.pct) {
            (Some(download_pct), Some(pct)) => Some(JobProgress { download_pct, pct }),
            _ => None,
        };
        let result: Option<JobResult> = self
            .result
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        let storage_metadata = self
            .storage_metadata
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        Ok(Job {
            id: self.id,
            status,
            created_at: self.created_at,
            assigned_date: self.assigned_date,
            last_pinged: self.last_pinged,
            completed_at: self.completed_at,
            assigned_to: self.assigned_to,
            metadata: JobMetadata {
                video_owner: self.video_owner,
                video_permlink: self.video_permlink,
            },
            storage_metadata,
            input: JobInput {
                uri: self.input_uri,
                size: self.input_size,
            },
            progress,
            result,
        })
    }
}

//fiche vidéo aval, lue et réparée par le healer
#[derive(Clone, Debug, FromRow)]
pub struct VideoRecord {
    pub owner: String,
    pub permlink: String,
    pub status: String,
    pub video_v2: Option<String>,
    pub created: i64,
}

impl VideoRecord {
    pub fn is_published(&self) -> bool {
        self.status == "published"
    }

    pub fn has_video_v2(&self) -> bool {
        self.video_v2.as_deref().is_some_and(|v| !v.is_empty())
    }
}

//issue d'une mutation conditionnée par la propriété
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutateOutcome {
    Updated,
    NotOwner,
    AlreadyComplete,
    Missing,
}

//issue d'une complétion, idempotente pour le propriétaire
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompleteOutcome {
    Completed { completed_at: i64 },
    AlreadyComplete { completed_at: Option<i64> },
    NotOwner,
}

#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await?;
        (&pool).execute(include_str!("setup.sql")).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn ping(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    //jobs disponibles, les plus récents d'abord
    pub async fn list_unassigned(&self, limit: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE status = 'unassigned' ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRow::into_job).transpose()
    }

    //revendication atomique: un seul compare-and-set au niveau du magasin
    pub async fn claim_atomic(&self, job_id: &str, did: &str, now: i64) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            "UPDATE jobs
             SET status = 'assigned', assigned_to = ?, assigned_date = ?, last_pinged = ?
             WHERE id = ? AND status = 'unassigned'
             RETURNING *",
        )
        .bind(did)
        .bind(now)
        .bind(now)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobRow::into_job).transpose()
    }

    //mise à jour conditionnée sur {id, assigned_to}; l'état aval est requalifié après coup
    pub async fn update_progress(
        &self,
        job_id: &str,
        did: &str,
        status: JobStatus,
        progress: JobProgress,
        now: i64,
    ) -> Result<MutateOutcome> {
        let affected = sqlx::query(
            "UPDATE jobs
             SET status = ?, download_pct = ?, pct = ?, last_pinged = ?
             WHERE id = ? AND assigned_to = ? AND status != 'complete'",
        )
        .bind(status.as_str())
        .bind(progress.download_pct)
        .bind(progress.pct)
        .bind(now)
        .bind(job_id)
        .bind(did)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected > 0 {
            return Ok(MutateOutcome::Updated);
        }
        self.qualify_miss(job_id, did).await
    }

    //complétion idempotente pour le propriétaire: une ligne déjà complète n'est jamais retouchée
    pub async fn complete_job(
        &self,
        job_id: &str,
        did: &str,
        result: &JobResult,
        now: i64,
    ) -> Result<CompleteOutcome> {
        let raw = serde_json::to_string(result)?;
        let affected = sqlx::query(
            "UPDATE jobs
             SET status = 'complete', completed_at = ?, result = ?
             WHERE id = ? AND assigned_to = ? AND status != 'complete'",
        )
        .bind(now)
        .bind(raw)
        .bind(job_id)
        .bind(did)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected > 0 {
            return Ok(CompleteOutcome::Completed { completed_at: now });
        }
        match self.qualify_miss(job_id, did).await? {
            MutateOutcome::AlreadyComplete => {
                let completed_at =
                    sqlx::query_scalar::<_, Option<i64>>("SELECT completed_at FROM jobs WHERE id = ?")
                        .bind(job_id)
                        .fetch_one(&self.pool)
                        .await?;
                Ok(CompleteOutcome::AlreadyComplete { completed_at })
            }
            _ => Ok(CompleteOutcome::NotOwner),
        }
    }

    //distingue absent / autre propriétaire / déjà complet après un UPDATE sans effet
    async fn qualify_miss(&self, job_id: &str, did: &str) -> Result<MutateOutcome> {
        let row = sqlx::query_as::<_, (Option<String>, String)>(
            "SELECT assigned_to, status FROM jobs WHERE id = ?",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            None => MutateOutcome::Missing,
            Some((assigned_to, status)) => {
                if assigned_to.as_deref() != Some(did) {
                    MutateOutcome::NotOwner
                } else if status == "complete" {
                    MutateOutcome::AlreadyComplete
                } else {
                    MutateOutcome::Missing
                }
            }
        })
    }

    //libération en masse des revendications expirées, le prédicat se réévalue ligne par ligne
    pub async fn release_timed_out(&self, cutoff: i64) -> Result<u64> {
        let affected = sqlx::query(
            "UPDATE jobs
             SET status = 'unassigned', assigned_to = NULL, assigned_date = NULL, last_pinged = NULL
             WHERE status IN ('assigned', 'running') AND last_pinged < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected)
    }

    pub async fn recently_completed(&self, since: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs
             WHERE status = 'complete' AND completed_at >= ?
             ORDER BY completed_at DESC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    //promeut les jobs coincés: résultat présent mais jamais marqués complets
    pub async fn heal_stuck_jobs(&self, since: i64, now: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "UPDATE jobs
             SET status = 'complete', completed_at = ?
             WHERE status != 'complete'
               AND COALESCE(json_extract(result, '$.cid'), '') != ''
               AND COALESCE(last_pinged, created_at) >= ?
             RETURNING *",
        )
        .bind(now)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    //vrai ssi exactement une complétion servie par le plan Aid existe
    pub async fn is_first_aid_serviced(&self) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM jobs WHERE status = 'complete' AND assigned_to IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count == 1)
    }

    pub async fn find_video(&self, owner: &str, permlink: &str) -> Result<Option<VideoRecord>> {
        let record = sqlx::query_as::<_, VideoRecord>(
            "SELECT owner, permlink, status, video_v2, created FROM videos
             WHERE owner = ? AND permlink = ?",
        )
        .bind(owner)
        .bind(permlink)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    //le healer ne touche que ces deux champs
    pub async fn publish_video(&self, owner: &str, permlink: &str, video_v2: &str) -> Result<bool> {
        let affected = sqlx::query(
            "UPDATE videos SET status = 'published', video_v2 = ?
             WHERE owner = ? AND permlink = ?",
        )
        .bind(video_v2)
        .bind(owner)
        .bind(permlink)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }
}

//emplacement du magasin, rempli par la connexion d'arrière-plan
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<RwLock<Option<JobStore>>>,
}

impl StoreHandle {
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
        }
    }

    pub fn preconnected(store: JobStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(store))),
        }
    }

    pub async fn set(&self, store: JobStore) {
        *self.inner.write().await = Some(store);
    }

    pub async fn get(&self) -> Option<JobStore> {
        self.inner.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.read().await.is_some()
    }
}
