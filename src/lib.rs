#![forbid(unsafe_code)]

//! Library half of the tubemux service.
//!
//! The interesting logic lives here so the backend binary stays a thin HTTP
//! wrapper: rendition catalog fetching, format selection, stream
//! materialization, and the remux orchestration with its scratch-file
//! lifecycle.

pub mod catalog;
pub mod config;
pub mod error;
pub mod remux;
pub mod scratch;
pub mod security;
pub mod select;
pub mod stream;
