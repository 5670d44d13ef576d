pub mod config;
pub mod http_api;
pub mod metrics;

pub use config::ServerConfig;
pub use http_api::{router, AppState};
pub use metrics::MetricsExporter;
