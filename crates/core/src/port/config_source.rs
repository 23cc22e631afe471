// Configuration Source Port
// Loaded once at startup and again on every reload request

use crate::domain::MultivisorConfig;
use crate::error::Result;

pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<MultivisorConfig>;
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// In-memory config that tests can swap before a reload
    pub struct StaticConfigSource {
        config: Mutex<MultivisorConfig>,
    }

    impl StaticConfigSource {
        pub fn new(config: MultivisorConfig) -> Self {
            Self {
                config: Mutex::new(config),
            }
        }

        pub fn replace(&self, config: MultivisorConfig) {
            *self.config.lock().unwrap() = config;
        }
    }

    impl ConfigSource for StaticConfigSource {
        fn load(&self) -> Result<MultivisorConfig> {
            Ok(self.config.lock().unwrap().clone())
        }
    }
}
