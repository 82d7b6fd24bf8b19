//cœur du contrôleur Aid, exposé en bibliothèque pour le binaire et les tests
pub mod alerts;
pub mod config;
pub mod encoders;
pub mod error;
pub mod healer;
pub mod jobs;
pub mod monitor;
pub mod server;
pub mod state;
pub mod store;
