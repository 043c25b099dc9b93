pub mod request;
pub mod response;
pub mod stream;
pub mod types;

pub use request::CreateMessageRequest;
pub use response::{CreateMessageResponse, ErrorEnvelope};
pub use stream::StreamEvent;
