//! Minimal client for the PeerTube REST API
//!
//! Covers the pieces needed for batch uploads: OAuth client discovery,
//! password/refresh-token grants and the resumable video upload protocol.

pub mod api;
pub mod client;
pub mod credentials;
pub mod error;
pub mod models;

pub use client::{Client, ClientConfig};
pub use credentials::{CredentialStore, LoginCredentials};
pub use error::{ApiError, ApiResult};
