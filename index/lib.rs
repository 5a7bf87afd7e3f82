#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod codec;
pub mod encode;
pub mod registry;
pub mod rowkey;
pub mod types;

#[path = "../samples/mod.rs"]
pub mod samples;

#[path = "../shared/config.rs"]
pub mod shared_config;
#[path = "../shared/error.rs"]
pub mod shared_error;
#[path = "../shared/progress.rs"]
pub mod shared_progress;
pub mod shared {
    pub use super::shared_config as config;
    pub use super::shared_error as error;
    pub use super::shared_progress as progress;
}
