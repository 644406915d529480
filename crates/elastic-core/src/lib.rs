pub mod config;
pub mod console;
pub mod labels;
pub mod types;

pub use config::{ConfigError, ConfigResult, LogConfiguration, PluginSettings};
pub use console::{BufferConsole, ConsoleLog, NullConsole};
pub use labels::{LabelError, LabelResult, Labels, OwnershipLabels};
pub use types::*;
