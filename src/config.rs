//configuration du contrôleur, alimentée par l'environnement
use std::path::PathBuf;
use std::time::Duration;

//bornes du plan de dispatch
pub const LIST_JOBS_CAP: i64 = 50;
pub const STORE_POOL_MAX: u32 = 10;
pub const STORE_CONNECT_BUDGET: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub store_url: String,
    pub registry_path: PathBuf,
    pub webhook_url: Option<String>,
    pub node_directory_url: Option<String>,
}

//valeurs par défaut
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            store_url: "sqlite://aid.db?mode=rwc".to_string(),
            registry_path: PathBuf::from("encoders.json"),
            webhook_url: None,
            node_directory_url: None,
        }
    }
}
