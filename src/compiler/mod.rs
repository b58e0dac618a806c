pub mod core;
pub mod enhancer;
pub mod error;
pub mod loader;
pub mod planner;
pub mod schema;
pub mod synthesizer;
pub mod validator;
