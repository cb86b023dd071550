//! Core data models for the chunked upload service.
//!
//! Upload sessions track in-flight uploads; finalized files are the durable
//! result of a completed one. Both map to SQLite tables and serialize as JSON.

pub mod file;
pub mod upload_session;
