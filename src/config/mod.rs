mod defaults;
mod io;
mod schema;
mod validate;

pub use io::load_config;
pub use schema::{Config, RuntimeConfig, SiteConfig};
pub use validate::{ConfigError, utc_offset_from_minutes};
