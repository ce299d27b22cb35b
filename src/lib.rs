//! Cinder - single-threaded HTTP/1.0 server
//!
//! Core library for request handling and the event loop.

pub mod config;
pub mod http;
pub mod server;
