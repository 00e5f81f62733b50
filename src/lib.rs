pub mod artifact;
pub mod bin_resolver;
pub mod bore;
pub mod cli;
pub mod config;
pub mod local_server;
pub mod preflight;
pub mod serve;
pub mod serve_log;
pub mod tasks;
