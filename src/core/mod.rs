pub mod cancel;
pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod ocr;
pub mod pipeline;
pub mod video;

pub use cancel::CancelToken;
pub use config::{Config, ConfigError};
pub use error::{Notice, PipelineError};
pub use pipeline::{Pipeline, PipelineRun, RunReport};
