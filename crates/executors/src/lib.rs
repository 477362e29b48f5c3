pub mod adapters;
pub mod prompt;

pub use adapters::{
    AdapterConfig, AdapterError, AdapterResult, AgentAdapter, get_adapter, list_adapters,
};
pub use prompt::{PromptConvention, PromptInput, PromptRole};
