pub mod data;
pub mod io;
pub mod printing;

pub use data::{path_display, AmbientConfig, Config};
pub use io::ConfigError;
