pub mod chat;
pub mod http;
pub mod traits;

pub use chat::ChatCompletionsClient;
pub use http::http_client;
pub use traits::{AgentError, LanguageModel};
