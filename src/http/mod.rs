//! HTTP/1.0 protocol implementation.
//!
//! # Architecture
//!
//! - **`connection`**: the per-request state machine, driven by the event loop
//! - **`parser`**: parses request heads in place in the input stream
//! - **`request`**: the pooled request record
//! - **`response`**: status lines, headers and canned error pages
//! - **`writer`**: the fixed output buffer and non-blocking flush
//! - **`date`**: HTTP date formatting and parsing
//! - **`uri`**: escaping, unescaping and path canonicalization
//! - **`alias`**: URI prefix aliases, script aliases and redirects
//! - **`mime`**: content types by file extension
//! - **`cgi`**: script environment and the gateway boundary
//!
//! # Request State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │ ReadHeader  │ ← Wait for a complete request head
//!        └──────┬──────┘
//!               │ POST to a script
//!               ▼
//!        ┌─────────────┐
//!        │  ReadBody   │ ← Collect Content-Length bytes
//!        └──────┬──────┘
//!               ▼
//!        ┌─────────────┐
//!        │    Write    │ ← Stream the file or script output
//!        └──────┬──────┘
//!               ▼
//!        ┌─────────────┐
//!        │    Done     │ ← Drain the buffer, write the access log
//!        └──────┬──────┘
//!               ├─ Keep-Alive → ReadHeader (same connection)
//!               └─ Close → record returns to the pool
//! ```
//!
//! Error responses skip straight to `Done`. Nothing in this module blocks:
//! every read and write is attempted once and reported back as
//! [`connection::Progress`].

pub mod alias;
pub mod cgi;
pub mod connection;
pub mod date;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod uri;
pub mod writer;
