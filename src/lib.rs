// Clippy allows for reasonable defaults
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types
#![allow(clippy::derivable_impls)] // Explicit Default impls can be clearer
#![allow(clippy::field_reassign_with_default)] // Builder pattern is clearer
#![allow(clippy::redundant_closure)] // |x| f(x) can be clearer than f

// Module declarations
pub mod config;
pub mod connections;
pub mod events;
pub mod llm;
pub mod models;
pub mod onboarding;
pub mod parsers;
pub mod shutdown;
pub mod storage;
pub mod templates;
pub mod utils;

// Server module (HTTP/WebSocket API)
pub mod server;

// Re-export models for use by the binary and integration tests
pub use models::*;
