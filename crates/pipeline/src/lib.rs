pub mod bootstrap;
pub mod config;
pub mod dispatcher;
pub mod orchestrator;
#[cfg(test)]
mod testing;

pub use bootstrap::build_pipeline;
pub use config::{PipelineOptions, PipelineSettings};
pub use dispatcher::{cache_key, cache_ttl, Dispatcher};
pub use orchestrator::{warnings_for, LookupReply, PipelineParts, VoicePipeline};
