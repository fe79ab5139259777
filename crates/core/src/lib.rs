pub mod collaborators;
pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{FetchError, InferenceError, RepositoryError, ServiceError, WorkerError};
pub use types::*;
