pub use super::response::GenerateContentResponse as StreamChunk;
