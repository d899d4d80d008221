pub mod broadcast;
pub mod registry;
