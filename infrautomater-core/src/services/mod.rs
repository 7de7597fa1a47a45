//! Shared services

pub mod logging;
