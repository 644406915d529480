pub mod plan;
pub mod simulate;
pub mod validate;

use std::path::Path;

use anyhow::Context;
use elastic_core::{ConsoleLog, PluginSettings, ScheduleRequest};

pub const DEFAULT_SERVER_ID: &str = "ecs-elastic-local";

pub fn load_settings(path: &Path) -> anyhow::Result<PluginSettings> {
    PluginSettings::from_file(path)
        .with_context(|| format!("loading settings from {}", path.display()))
}

pub fn load_request(path: &Path) -> anyhow::Result<ScheduleRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading request {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing request {}", path.display()))
}

/// Job console lines go to stdout, indented under the step output.
pub struct StdoutConsole;

impl ConsoleLog for StdoutConsole {
    fn append(&self, line: &str) {
        println!("  | {line}");
    }
}
