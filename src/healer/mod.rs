//réconciliateur vidéo: débloque les jobs porteurs de résultat et répare les fiches sans video_v2
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertingGate;
use crate::jobs::Job;
use crate::store::StoreHandle;

pub const HEALER_INTERVAL: Duration = Duration::from_secs(60 * 60);
//fenêtre des jobs à examiner et fenêtre de fraîcheur des fiches vidéo
const JOB_WINDOW_MS: i64 = 60 * 60 * 1000;
const RECORD_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

//pointeur publié, dérivé du cid du résultat
fn video_v2_for(cid: &str) -> String {
    format!("ipfs://{cid}/manifest.m3u8")
}

pub struct VideoHealer {
    store: StoreHandle,
    alerts: Arc<AlertingGate>,
    interval: Duration,
}

impl VideoHealer {
    pub fn new(store: StoreHandle, alerts: Arc<AlertingGate>) -> Self {
        Self::with_interval(store, alerts, HEALER_INTERVAL)
    }

    pub fn with_interval(store: StoreHandle, alerts: Arc<AlertingGate>, interval: Duration) -> Self {
        Self {
            store,
            alerts,
            interval,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(interval_secs = self.interval.as_secs(), "video healer started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("video healer stopped");
                    break;
                }
                _ = interval.tick() => self.tick().await,
            }
        }
    }

    pub async fn tick(&self) {
        let Some(store) = self.store.get().await else {
            tracing::debug!("healer tick skipped, store not connected");
            return;
        };
        let now = Utc::now().timestamp_millis();

        //phase A: jobs coincés avec un résultat mais jamais marqués complets
        match store.heal_stuck_jobs(now - JOB_WINDOW_MS, now).await {
            Ok(repaired) if !repaired.is_empty() => {
                let identities: Vec<String> = repaired
                    .iter()
                    .map(|j| format!("{}/{}", j.metadata.video_owner, j.metadata.video_permlink))
                    .collect();
                self.alerts.stuck_jobs_repaired(&identities).await;
            }
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "stuck job pass failed"),
        }

        //phase B: fiches vidéo publiées sans pointeur video_v2
        let recent = match store.recently_completed(now - JOB_WINDOW_MS).await {
            Ok(jobs) => jobs,
            Err(err) => {
                tracing::error!(error = %err, "recently completed scan failed");
                return;
            }
        };

        let mut healed = 0usize;
        let mut failed = 0usize;
        for job in &recent {
            match self.heal_video(&store, job, now).await {
                Ok(true) => healed += 1,
                Ok(false) => {}
                Err(err) => {
                    failed += 1;
                    tracing::warn!(job_id = %job.id, error = %err, "video heal failed, continuing");
                }
            }
        }
        if healed > 0 || failed > 0 {
            self.alerts.heal_cycle_summary(healed, failed).await;
        }
    }

    //répare une fiche au plus: préconditions strictes, sinon passe au job suivant
    async fn heal_video(
        &self,
        store: &crate::store::JobStore,
        job: &Job,
        now: i64,
    ) -> anyhow::Result<bool> {
        let owner = job.metadata.video_owner.as_str();
        let permlink = job.metadata.video_permlink.as_str();
        let Some(cid) = job.result_cid() else {
            return Ok(false);
        };
        if owner.is_empty() || permlink.is_empty() {
            return Ok(false);
        }

        let Some(record) = store.find_video(owner, permlink).await? else {
            return Ok(false);
        };
        let fresh = record.created >= now - RECORD_WINDOW_MS;
        if !record.is_published() || !fresh || record.has_video_v2() {
            return Ok(false);
        }

        let patched = store
            .publish_video(owner, permlink, &video_v2_for(cid))
            .await?;
        if patched {
            self.alerts.video_healed(owner, permlink).await;
        }
        Ok(patched)
    }
}
