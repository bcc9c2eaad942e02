pub mod criteria;
pub mod server;
