//! Shama is a command-line chat and model-management client for an Ollama
//! inference server.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns validation, the HTTP transport, stream decoding, the
//!   reasoning filter, session persistence, configuration and the
//!   controller that ties them together.
//! - [`api`] defines the wire payloads of the Ollama HTTP API and the model
//!   descriptor reports built from them.
//! - [`cli`] parses arguments and drives the controller from a terminal.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
