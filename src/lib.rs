pub mod api;
pub mod audio;
pub mod config;
pub mod continuity;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod planner;
pub mod run;
pub mod scene;
pub mod segment;
pub mod upload;
pub mod video;

pub use config::Config;
pub use engine::EngineKind;
pub use error::{ErrorKind, Result, VideoError};
pub use pipeline::{GenerationOptions, GenerationOutcome, Pipeline, PipelineSettings, Services};
pub use run::{CancelFlag, PipelineRun};
pub use scene::Scene;
