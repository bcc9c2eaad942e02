pub mod codec;
pub mod reader;
