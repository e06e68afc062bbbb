pub mod chat_llm;
pub mod sse;

pub use chat_llm::DeepSeekChatAdapter;
pub use sse::{SseDecoder, SseEvent};
