//! LLM conversation types consumed by the cache

mod message;

pub use message::{last_user_content, Message, MessageRole};
