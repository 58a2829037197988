// lib.rs
#![warn(clippy::large_futures)]

pub use std::{
    net,
    pin::Pin,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

pub use anyhow::bail;
pub use serde::{Deserialize, Serialize};
pub use tokio::{
    sync::RwLock,
    time::{sleep, Duration},
};

mod config;
pub use config::*;

mod state;
pub use state::*;

mod display;
pub use display::*;

mod lcd;
pub use lcd::*;

mod stats;
pub use stats::*;

mod wifi;
pub use wifi::*;

mod counter;
pub use counter::*;

mod portal;
pub use portal::*;

pub const FW_VERSION: &str = env!("CARGO_PKG_VERSION");

// EOF
