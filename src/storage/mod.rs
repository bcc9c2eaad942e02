pub mod activity;
pub mod memory;
