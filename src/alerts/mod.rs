//notifications opérateur: verrou one-shot d'activation + envois secondaires best-effort
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AlertingGate {
    client: reqwest::Client,
    webhook_url: Option<String>,
    fallback_latched: AtomicBool,
}

impl AlertingGate {
    //une URL absente désactive silencieusement tous les envois
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.filter(|u| !u.is_empty()),
            fallback_latched: AtomicBool::new(false),
        }
    }

    //déclenche la notification d'activation au plus une fois par vie du processus
    pub async fn fallback_activated(&self, detail: &str) -> bool {
        if self.fallback_latched.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::warn!(%detail, "fallback dispatch path activated");
        self.notify(&format!(
            "🚨 Aid fallback dispatch is now ACTIVE — the primary gateway path is not serving. {detail}"
        ))
        .await;
        true
    }

    pub fn latched(&self) -> bool {
        self.fallback_latched.load(Ordering::SeqCst)
    }

    pub async fn timeout_released(&self, count: u64) {
        tracing::warn!(count, "released timed-out job claims");
        self.notify(&format!(
            "⏱ Aid timeout monitor released {count} stalled job claim(s) back to the queue"
        ))
        .await;
    }

    pub async fn stuck_jobs_repaired(&self, identities: &[String]) {
        let shown = identities
            .iter()
            .take(5)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        tracing::warn!(count = identities.len(), "promoted stuck jobs to complete");
        self.notify(&format!(
            "🩹 Healer promoted {} stuck job(s) to complete: {shown}",
            identities.len()
        ))
        .await;
    }

    pub async fn video_healed(&self, owner: &str, permlink: &str) {
        tracing::info!(%owner, %permlink, "healed video record");
        self.notify(&format!("🩹 Healer repaired video {owner}/{permlink}"))
            .await;
    }

    pub async fn heal_cycle_summary(&self, healed: usize, failed: usize) {
        tracing::info!(healed, failed, "healer cycle finished");
        self.notify(&format!(
            "Healer cycle summary: {healed} video(s) repaired, {failed} failure(s)"
        ))
        .await;
    }

    //l'échec d'un envoi est consigné, jamais remonté
    async fn notify(&self, content: &str) {
        let Some(url) = self.webhook_url.as_deref() else {
            return;
        };
        let payload = serde_json::json!({ "content": content });
        let sent = self
            .client
            .post(url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&payload)
            .send()
            .await;
        match sent {
            Ok(resp) if !resp.status().is_success() => {
                tracing::warn!(status = %resp.status(), "operator webhook rejected notification");
            }
            Err(err) => {
                tracing::warn!(error = %err, "operator webhook unreachable");
            }
            Ok(_) => {}
        }
    }
}
