pub mod request;
pub mod response;
pub mod stream;
pub mod types;

pub use request::CreateResponseRequest;
pub use response::{ErrorEnvelope, ResponseObject};
pub use stream::StreamEvent;
