pub mod config;
pub mod evaluation;
pub mod generative;
pub mod upload;
