//! Storage and persistence domain for Chatty.

pub mod db;
