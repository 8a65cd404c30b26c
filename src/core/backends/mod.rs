//! Backend implementations

pub mod mock;
pub mod openai;

pub use mock::MockBackend;
pub use openai::OpenAIBackend;
