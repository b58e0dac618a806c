pub mod http;
pub mod tool;
