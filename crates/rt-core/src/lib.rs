//! Core building blocks of the retention subsystem: the value codec, entity
//! identity, record and snapshot types, configuration, and document-store
//! access.

pub mod codec;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use error::{ErrorPolicy, Result, RetentionError};
