//! Upload lifecycle, storage and metadata services.

pub mod download_service;
pub mod file_catalog;
pub mod session_store;
pub mod signed_url;
pub mod storage_service;
pub mod upload_service;
