//! Shared error type and text utilities for Chatty.

pub mod error;
pub mod text;
