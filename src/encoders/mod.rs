//registre local des encodeurs (clé: DID) et projection du répertoire de nœuds distant
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::AidError;

const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(10);

//fiche d'un encodeur enregistré
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Encoder {
    pub encoder_id: String,
    pub name: String,
    pub owner: String,
    pub is_active: bool,
    pub created_at: i64,
    #[serde(default)]
    pub last_seen: Option<i64>,
}

//registre chargé au démarrage depuis un fichier JSON, lectures majoritaires ensuite
pub struct EncoderRegistry {
    encoders: RwLock<HashMap<String, Encoder>>,
}

impl EncoderRegistry {
    //chargement synchrone: fichier absent = registre vide, fichier corrompu = échec du boot
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "encoder registry file missing, starting empty");
                return Ok(Self::from_encoders(Vec::new()));
            }
            Err(err) => return Err(err.into()),
        };
        let encoders: Vec<Encoder> = serde_json::from_str(&raw)?;
        tracing::info!(count = encoders.len(), path = %path.display(), "encoder registry loaded");
        Ok(Self::from_encoders(encoders))
    }

    pub fn from_encoders(encoders: Vec<Encoder>) -> Self {
        let map = encoders
            .into_iter()
            .map(|e| (e.encoder_id.clone(), e))
            .collect();
        Self {
            encoders: RwLock::new(map),
        }
    }

    //seul contrôle d'autorisation du plan Aid: présence + activité, aucune signature vérifiée
    pub async fn authorize(&self, did: &str, now: i64) -> Result<Encoder, AidError> {
        let mut encoders = self.encoders.write().await;
        let Some(encoder) = encoders.get_mut(did) else {
            return Err(AidError::not_authorized(did));
        };
        if !encoder.is_active {
            return Err(AidError::inactive(did));
        }
        encoder.last_seen = Some(now);
        Ok(encoder.clone())
    }

    pub async fn get(&self, did: &str) -> Option<Encoder> {
        self.encoders.read().await.get(did).cloned()
    }

    pub async fn len(&self) -> usize {
        self.encoders.read().await.len()
    }
}

//descripteur d'un nœud de la flotte vu par le répertoire distant
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub did: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

//cache d'affichage: un hit reste en cache indéfiniment, un miss retombe sur le répertoire distant
pub struct NodeDirectoryCache {
    client: reqwest::Client,
    base_url: Option<String>,
    cache: RwLock<HashMap<String, NodeDescriptor>>,
}

impl NodeDirectoryCache {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn lookup(&self, did: &str) -> Option<NodeDescriptor> {
        if let Some(hit) = self.cache.read().await.get(did).cloned() {
            return Some(hit);
        }
        self.refresh(did).await
    }

    //contourne le cache et re-consulte le répertoire
    pub async fn refresh(&self, did: &str) -> Option<NodeDescriptor> {
        let descriptor = self.fetch_remote(did).await?;
        self.cache
            .write()
            .await
            .insert(did.to_string(), descriptor.clone());
        Some(descriptor)
    }

    //échec doux: un répertoire injoignable ne bloque jamais le chemin de dispatch
    async fn fetch_remote(&self, did: &str) -> Option<NodeDescriptor> {
        let base = self.base_url.as_deref()?;
        let url = format!("{base}/nodes/{did}");
        let response = self
            .client
            .get(&url)
            .timeout(DIRECTORY_TIMEOUT)
            .send()
            .await;
        match response {
            Ok(resp) if resp.status().is_success() => match resp.json::<NodeDescriptor>().await {
                Ok(descriptor) => Some(descriptor),
                Err(err) => {
                    tracing::debug!(%did, error = %err, "node directory returned unparsable descriptor");
                    None
                }
            },
            Ok(resp) => {
                tracing::debug!(%did, status = %resp.status(), "node directory lookup miss");
                None
            }
            Err(err) => {
                tracing::debug!(%did, error = %err, "node directory unreachable");
                None
            }
        }
    }
}

#[cfg(test)]
impl NodeDirectoryCache {
    async fn prime(&self, descriptor: NodeDescriptor) {
        self.cache
            .write()
            .await
            .insert(descriptor.did.clone(), descriptor);
    }
}
