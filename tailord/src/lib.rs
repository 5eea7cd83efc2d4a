pub mod aggregator;
pub mod config;
pub mod error;
pub mod feedback;
pub mod proto;
pub mod router;
pub mod search;
pub mod services;
pub mod storage;

pub use tailor_query as query;

pub use config::{PersonalizationConfig, RecordPolicy, ServerConfig};
pub use error::{ServiceError, ServiceResult};
pub use services::Services;
