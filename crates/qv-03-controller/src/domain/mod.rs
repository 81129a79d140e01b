//! Domain layer for the controller

pub mod config;
pub mod events;
pub mod fork;

pub use config::ControllerConfig;
pub use events::DecidedEvent;
pub use fork::{ForkSchedule, ForkVersion, WireCodec};
