pub mod dbcolab;
pub mod memory;
pub mod store;
