//! driftchat is a terminal chat client for a streaming completion endpoint.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation state machine: decoding the response
//!   stream, accumulating and pacing the reply, verifying the API key, and
//!   the message store.
//! - [`api`] defines the request payload and the [`api::CompletionEndpoint`]
//!   seam with its HTTP implementation.
//! - [`commands`] implements slash-command parsing used by the chat loop.
//! - [`cli`] parses arguments, loads configuration, and renders the
//!   conversation to the terminal.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod utils;
