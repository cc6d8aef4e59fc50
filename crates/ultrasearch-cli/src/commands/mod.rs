pub mod classes;
pub mod config;
pub mod parse;
pub mod plan;
