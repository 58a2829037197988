// state.rs

use crate::*;

use tokio::sync::RwLock;

pub struct MyState {
    pub config: RwLock<MyConfig>,
    pub store: RwLock<Box<dyn ConfigStorage>>,
    pub connectivity: RwLock<ConnectivityState>,
    pub api_cnt: AtomicU32,
    pub reset: RwLock<bool>,
}

impl MyState {
    pub fn new(config: MyConfig, store: Box<dyn ConfigStorage>) -> Self {
        MyState {
            config: RwLock::new(config),
            store: RwLock::new(store),
            connectivity: RwLock::new(ConnectivityState::Unconfigured),
            api_cnt: AtomicU32::new(0),
            reset: RwLock::new(false),
        }
    }
}

// EOF
