pub mod api;
pub mod artifacts;
pub mod collaborator;
pub mod config;
pub mod error;
pub mod offline;
pub mod pipeline;
pub mod state;
pub mod store;

pub use collaborator::CollaboratorSet;
pub use config::{PipelineConfig, ServiceConfig};
pub use error::{ApiError, PipelineError, StoreError};
pub use pipeline::PlatePipeline;
pub use state::LprServiceState;
pub use store::RecordStore;
