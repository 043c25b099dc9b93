pub mod request;
pub mod response;
pub mod stream;
pub mod types;

pub use request::CreateChatCompletionRequest;
pub use response::{ChatCompletionResponse, ErrorEnvelope};
pub use stream::ChatCompletionChunk;
