pub mod canary;
pub mod config;
pub mod error;
pub mod image;
pub mod refs;
pub mod types;
pub mod value;

pub use canary::{CanaryConfig, CanaryRouter, CanaryState, CanaryStatus};
pub use config::SkeinConfig;
pub use error::{Diagnostic, SkeinError};
pub use image::{PipelineImage, STRUCTURAL_HASH_LEN};
pub use refs::PipelineRef;
pub use types::TypeDescriptor;
pub use value::Value;
