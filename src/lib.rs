#![forbid(unsafe_code)]

pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod output;
pub mod research;
pub mod sse;
pub mod transport;

pub use error::{ExaError, Result};
