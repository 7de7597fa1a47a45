//! Data models for infrautomater

pub mod configuration;
pub mod request;

pub use configuration::*;
pub use request::*;
