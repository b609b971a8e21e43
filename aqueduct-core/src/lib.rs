#[macro_use]
mod error;
pub use error::{AnyError, AnyResult};

pub mod config;
pub mod handler;
pub mod http;
pub mod util;
