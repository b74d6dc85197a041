pub mod config;
pub mod constants;
pub mod controller;
pub mod endpoint;
pub mod message;
pub mod security_log;
pub mod session;
pub mod stream_parser;
pub mod thinking;
pub mod transport;
pub mod validator;
