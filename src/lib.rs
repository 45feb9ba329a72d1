pub mod app;
pub mod config;
pub mod http;
pub mod report;
pub mod runtime;
