pub mod commands;
pub mod controller;
pub mod state;

pub use controller::{CaptchaHarvester, SpawnOptions};
pub use state::{HarvestState, HarvestTarget};
