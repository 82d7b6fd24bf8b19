//état partagé du contrôleur
use std::sync::Arc;

use crate::alerts::AlertingGate;
use crate::config::Config;
use crate::encoders::{EncoderRegistry, NodeDirectoryCache};
use crate::store::StoreHandle;

//registre des encodeurs + accès magasin + porte d'alerte
pub struct AppState {
    pub config: Config,
    pub registry: EncoderRegistry,
    pub store: StoreHandle,
    pub alerts: Arc<AlertingGate>,
    pub directory: NodeDirectoryCache,
}

impl AppState {
    pub fn new(config: Config, registry: EncoderRegistry) -> Arc<Self> {
        let alerts = Arc::new(AlertingGate::new(config.webhook_url.clone()));
        let directory = NodeDirectoryCache::new(config.node_directory_url.clone());
        Arc::new(Self {
            config,
            registry,
            store: StoreHandle::empty(),
            alerts,
            directory,
        })
    }

    //variante de test: magasin déjà connecté
    pub fn with_store(config: Config, registry: EncoderRegistry, store: StoreHandle) -> Arc<Self> {
        let alerts = Arc::new(AlertingGate::new(config.webhook_url.clone()));
        let directory = NodeDirectoryCache::new(config.node_directory_url.clone());
        Arc::new(Self {
            config,
            registry,
            store,
            alerts,
            directory,
        })
    }
}
