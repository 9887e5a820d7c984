pub mod close;
pub mod store;
