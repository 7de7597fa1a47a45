//! Provisioning pipeline over a rendered workspace

pub mod outputs;
pub mod pipeline;
pub mod stage;

pub use outputs::*;
pub use pipeline::*;
pub use stage::*;
