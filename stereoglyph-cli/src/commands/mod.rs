//! CLI command implementations

mod config;
mod list;
mod modes;
mod run;

pub use config::{ConfigArgs, config};
pub use list::list_devices;
pub use modes::modes;
pub use run::{RunArgs, run};
