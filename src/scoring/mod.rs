pub mod rules;
pub mod squad;
