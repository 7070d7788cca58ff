pub mod config;
pub mod errors;
pub mod kernel;
pub mod pairs;
pub mod traits;
pub mod types;
