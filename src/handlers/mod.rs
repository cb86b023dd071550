//! HTTP handlers. Each one extracts its inputs, delegates to a service and
//! maps the outcome through `AppError`.

pub mod download_handlers;
pub mod health_handlers;
pub mod identity;
pub mod upload_handlers;
