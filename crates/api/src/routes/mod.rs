//! API route handlers

pub mod config;
pub mod history;
pub mod stream;
