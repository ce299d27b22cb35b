//! Event loop, request pool and readiness plumbing.
//!
//! - **`listener`**: binds, accepts and runs the loop; signal handling
//! - **`scheduler`**: the fixed request pool and its free / blocked / ready lists
//! - **`readiness`**: interest bits and descriptor sets
//! - **`reactor`**: epoll registration and waiting

pub mod listener;
pub mod reactor;
pub mod readiness;
pub mod scheduler;
