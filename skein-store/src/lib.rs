pub mod persist;
pub mod pipeline_store;
pub mod suspension_store;
pub mod version_store;

pub use pipeline_store::PipelineStore;
pub use suspension_store::{SuspensionRecord, SuspensionStore, DEFAULT_SUSPENSION_CAPACITY};
pub use version_store::{PipelineVersion, VersionStore};
