use std::path::Path;

use elastic_core::{Platform, PluginSettings};

pub fn validate(path: &Path) -> anyhow::Result<()> {
    let settings = super::load_settings(path)?;
    println!("✓ {} is valid", path.display());
    println!("{}", summary(&settings));
    Ok(())
}

pub fn summary(settings: &PluginSettings) -> String {
    let mut lines = vec![
        format!("  server url:         {}", settings.go_server_url),
        format!("  cluster:            {}", settings.cluster_name),
        format!("  plugin id:          {}", settings.plugin_id),
        format!(
            "  linux stop policy:  {:?}",
            settings.stop_policy_for(Platform::Linux)
        ),
        format!(
            "  windows stop policy: {:?}",
            settings.stop_policy_for(Platform::Windows)
        ),
        format!("  subnets:            {}", list(&settings.subnet_ids)),
        format!("  security groups:    {}", list(&settings.security_group_ids)),
        format!(
            "  reconcile every:    {}s",
            settings.reconcile_interval_secs
        ),
    ];
    if let Some(log) = &settings.log {
        lines.push(format!("  log driver:         {}", log.driver));
    }
    if !settings.environment.is_empty() {
        let keys: Vec<_> = settings.environment.keys().cloned().collect();
        lines.push(format!("  extra environment:  {}", keys.join(", ")));
    }
    lines.join("\n")
}

fn list(values: &[String]) -> String {
    if values.is_empty() {
        "(none)".to_string()
    } else {
        values.join(", ")
    }
}
