pub mod engine;
pub mod predicates;
