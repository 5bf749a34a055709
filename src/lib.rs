//! Batch uploader for PeerTube instances
//!
//! Media items come from a folder walk or a SQLite table, go through a fixed
//! pool of workers that upload them with the resumable protocol, and each
//! outcome is recorded to a JSON lines file or a database table.

pub mod config;
pub mod database;
pub mod logging;
pub mod media;
pub mod models;
pub mod sink;
pub mod source;
pub mod tasks;
pub mod uploader;

#[cfg(test)]
mod testing;
