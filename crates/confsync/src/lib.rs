pub mod backends;
pub mod config;
pub mod error;
pub mod processor;
pub mod shutdown;
pub mod store;
pub mod template;

pub use backends::{BackendError, BackendRegistry, StoreClient};
pub use config::{load_config, load_config_or_default, Config};
pub use error::{ConfigError, ConfsyncError, Result, StoreError};
pub use processor::{
    error_queue, run_once, IntervalProcessor, Processor, ProcessorError, WatchProcessor,
};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use store::{KvPair, KvStore};
pub use template::{ResourceConfig, ResourceError, ResourceLoader, TemplateResource};
