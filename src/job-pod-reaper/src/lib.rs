/// Expose all reaper components used by main
pub mod controller;
pub mod model;
pub mod reaping_logic;
pub mod settings;
pub mod store;

pub use controller::*;
pub use settings::Settings;
pub use store::{ClusterStore, KubeStore};

#[cfg(test)]
pub mod fixtures;
