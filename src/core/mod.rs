pub mod accumulator;
pub mod config;
pub mod controller;
pub mod message;
pub mod observe;
pub mod session;
pub mod store;
pub mod stream_decoder;
pub mod timer;
pub mod verifier;
