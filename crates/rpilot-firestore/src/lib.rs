//! Firestore REST persistence for the ReelPilot pipeline.
//!
//! This crate provides:
//! - A tuned Firestore REST client (token cache, masked updates, structured
//!   queries, optimistic-concurrency preconditions)
//! - Storage-level retry with jitter
//! - The `ProjectStore` port: atomic oldest-first claiming, masked delta
//!   persistence, and lease release

pub mod client;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use store::{ClaimToken, ClaimedProject, FirestoreProjectStore, ProjectStore};
pub use types::{json_to_value, value_to_json, Document, Value};
