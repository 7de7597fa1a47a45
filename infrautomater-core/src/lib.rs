//! # Infrautomater Core Library
//!
//! Provisioning worker core: request model and store, workspace rendering,
//! the terraform pipeline, provisioning and destruction tasks, and the
//! worker pool that schedules them.

pub mod error;
pub mod models;
pub mod runner;
pub mod services;
pub mod store;
pub mod task;
pub mod worker;
pub mod workflow;
pub mod workspace;
