pub mod executor;
pub mod loader;
pub mod registry;
pub mod reload;

pub use executor::ExecutionOutcome;
pub use loader::{LoadOptions, LoadReport};
pub use registry::{CompileSummary, Registry};
pub use reload::{ReloadOutcome, RollbackOutcome};
