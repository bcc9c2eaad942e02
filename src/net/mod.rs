pub mod cancel;
pub mod discovery;
pub mod scheduler;
