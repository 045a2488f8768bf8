//! Foundation types for VOS.
//!
//! This crate holds what every other VOS crate agrees on: the error enum,
//! TOML configuration, the console and network collaborator traits, and
//! POSIX-style path helpers.

use std::future::Future;
use std::pin::Pin;

pub mod config;
pub mod console;
pub mod error;
pub mod network;
pub mod path;

pub use error::{Result, VosError};

/// A boxed future that may borrow from its caller and stays on one thread.
pub type LocalFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;
