use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("network request failed: {0}")]
    Network(String),
    #[error("unexpected response shape: {0}")]
    DataShape(String),
    #[error("missing configuration: {0}")]
    ConfigMissing(String),
    #[error("persistent storage unavailable: {0}")]
    StorageUnavailable(String),
}
