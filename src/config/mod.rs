mod env_overrides;
mod loader;
pub mod schema;

pub use schema::{
    BackgroundConfig, CompactionConfig, ConceptConfig, Config, EpisodicConfig, ReflectionConfig,
    RetrievalConfig, SearchConfig,
};
