pub mod request;
pub mod response;
pub mod stream;
pub mod types;

pub use request::GenerateContentRequest;
pub use response::{ErrorEnvelope, GenerateContentResponse};
pub use stream::StreamChunk;
