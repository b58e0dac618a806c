pub mod api;
pub mod catalog;
pub mod compiler;
pub mod dsl;
pub mod runtime;
pub mod verifier;
