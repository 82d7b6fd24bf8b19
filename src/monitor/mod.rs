//moniteur de timeout: rend à la file les jobs dont l'encodeur ne ping plus
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertingGate;
use crate::store::StoreHandle;

//marge TTL - intervalle: un claim mort est rendu en au plus TTL + intervalle
pub const CLAIM_TTL: Duration = Duration::from_secs(60 * 60);
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub struct TimeoutMonitor {
    store: StoreHandle,
    alerts: Arc<AlertingGate>,
    interval: Duration,
    ttl: Duration,
}

impl TimeoutMonitor {
    pub fn new(store: StoreHandle, alerts: Arc<AlertingGate>) -> Self {
        Self::with_timing(store, alerts, MONITOR_INTERVAL, CLAIM_TTL)
    }

    pub fn with_timing(
        store: StoreHandle,
        alerts: Arc<AlertingGate>,
        interval: Duration,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            alerts,
            interval,
            ttl,
        }
    }

    //boucle coopérative mono-tâche, premier tick immédiat
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(interval_secs = self.interval.as_secs(), "timeout monitor started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("timeout monitor stopped");
                    break;
                }
                _ = interval.tick() => self.tick().await,
            }
        }
    }

    //un tick raté réessaie au suivant, aucune erreur ne sort de la boucle
    pub async fn tick(&self) {
        let Some(store) = self.store.get().await else {
            tracing::debug!("timeout monitor tick skipped, store not connected");
            return;
        };

        let now = Utc::now().timestamp_millis();
        let cutoff = now - self.ttl.as_millis() as i64;
        match store.release_timed_out(cutoff).await {
            Ok(0) => tracing::debug!("no stale claims to release"),
            Ok(count) => self.alerts.timeout_released(count).await,
            Err(err) => tracing::error!(error = %err, "timeout release pass failed"),
        }

        //tant que le verrou n'a pas sauté, guette la toute première complétion servie par Aid
        if !self.alerts.latched() {
            match store.is_first_aid_serviced().await {
                Ok(true) => {
                    self.alerts
                        .fallback_activated("first Aid-serviced job completion observed")
                        .await;
                }
                Ok(false) => {}
                Err(err) => tracing::error!(error = %err, "first-serviced check failed"),
            }
        }
    }
}
