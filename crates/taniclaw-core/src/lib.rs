pub mod action;
pub mod advisory;
pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod io;
pub mod knowledge;
pub mod lifecycle;
pub mod memory;
pub mod notification;
pub mod paths;
pub mod rules;
pub mod scheduler;
pub mod security;
pub mod store;
pub mod types;
pub mod weather;

pub use error::{Result, TaniclawError};
