pub mod assistant;
pub mod codec;
pub mod config;
pub mod error;
pub mod inference;
pub mod normalize;
pub mod server;

pub use assistant::{Assistant, ClinicalQuery};
pub use error::{Error, ErrorKind, InferenceError, Result};
pub use normalize::{NormalizedAnswer, normalize};
