// Domain layer: session data model, persisted snapshot shape and ports.

pub mod model;
pub mod ports;
pub mod snapshot;
