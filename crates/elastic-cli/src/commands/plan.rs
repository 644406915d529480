use std::path::Path;

use elastic_core::{PluginSettings, ScheduleRequest};
use elastic_scheduler::TaskSpecification;

pub fn plan(settings: &Path, request: &Path, server_id: &str) -> anyhow::Result<()> {
    let settings = super::load_settings(settings)?;
    let request = super::load_request(request)?;
    println!("{}", render(&request, &settings, server_id)?);
    Ok(())
}

/// The registration request as JSON.
pub fn render(
    request: &ScheduleRequest,
    settings: &PluginSettings,
    server_id: &str,
) -> anyhow::Result<String> {
    let spec = TaskSpecification::build(request, settings, server_id)?;
    tracing::debug!(task = %spec.name, stop_policy = ?spec.stop_policy, "built task specification");
    Ok(serde_json::to_string_pretty(&spec.to_register_request())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use elastic_core::{ElasticProfile, JobIdentifier};

    #[test]
    fn renders_registration_json() {
        let request = ScheduleRequest {
            job_identifier: JobIdentifier {
                pipeline_name: "build".to_string(),
                pipeline_counter: 1,
                pipeline_label: "1".to_string(),
                stage_name: "s".to_string(),
                stage_counter: "1".to_string(),
                job_name: "j".to_string(),
                job_id: 1,
            },
            environment: "prod".to_string(),
            profile: ElasticProfile::new("gocd/agent", 512),
            auto_register_key: "k".to_string(),
        };
        let settings = PluginSettings::new("https://ci", "agents");

        let json = render(&request, &settings, "srv").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["family"].as_str().unwrap().starts_with("GoCD"));
        assert_eq!(value["containerDefinitions"][0]["image"], "gocd/agent");
        assert_eq!(
            value["containerDefinitions"][0]["dockerLabels"]["server-id"],
            "srv"
        );
    }
}
