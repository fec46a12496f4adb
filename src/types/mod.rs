//! Type definitions for the product council client.

pub mod chat;
pub mod context;
