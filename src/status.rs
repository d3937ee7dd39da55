//! Summaries of the stored configuration for the status endpoint

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSummary {
    pub configured: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSummary {
    pub enabled: bool,
}

/// Scheduled jobs found under `<home>/cron`
#[derive(Debug, Clone, Serialize)]
pub struct CronSummary {
    pub count: usize,
    pub jobs: Vec<Value>,
}

fn entries<'a>(document: &'a Value, section: &str) -> impl Iterator<Item = (&'a String, &'a Value)> {
    document
        .get(section)
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|map| map.iter())
}

fn has_api_key(provider: &Value) -> bool {
    provider
        .get("api_key")
        .and_then(Value::as_str)
        .is_some_and(|key| !key.is_empty())
}

/// Which providers have an API key
pub fn provider_summary(document: &Value) -> BTreeMap<String, ProviderSummary> {
    entries(document, "providers")
        .map(|(name, provider)| {
            let summary = ProviderSummary {
                configured: has_api_key(provider),
            };
            (name.clone(), summary)
        })
        .collect()
}

/// Which channels are enabled
pub fn channel_summary(document: &Value) -> BTreeMap<String, ChannelSummary> {
    entries(document, "channels")
        .map(|(name, channel)| {
            let enabled = channel
                .get("enabled")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            (name.clone(), ChannelSummary { enabled })
        })
        .collect()
}

/// True when at least one provider has an API key
pub fn has_provider_key(document: &Value) -> bool {
    entries(document, "providers").any(|(_, provider)| has_api_key(provider))
}

/// Read every `*.json` job under `<home>/cron`, skipping unreadable files
pub fn load_cron_jobs(home: &Path) -> CronSummary {
    let cron_dir = home.join("cron");
    let mut paths: Vec<_> = match std::fs::read_dir(&cron_dir) {
        Ok(dir) => dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect(),
        Err(_) => Vec::new(),
    };
    paths.sort();

    let jobs: Vec<Value> = paths
        .iter()
        .filter_map(|path| {
            let parsed = std::fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));
            match parsed {
                Ok(job) => Some(job),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping cron job");
                    None
                }
            }
        })
        .collect();

    CronSummary {
        count: jobs.len(),
        jobs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::default_document;
    use serde_json::json;

    #[test]
    fn test_provider_summary() {
        let doc = json!({
            "providers": {
                "anthropic": {"api_key": "sk-ant-123"},
                "openai": {"api_key": ""},
                "vllm": {"api_base": "http://localhost:8000"},
                "broken": "not-an-object"
            }
        });

        let summary = provider_summary(&doc);

        assert!(summary["anthropic"].configured);
        assert!(!summary["openai"].configured);
        assert!(!summary["vllm"].configured);
        assert!(!summary["broken"].configured);
    }

    #[test]
    fn test_channel_summary() {
        let doc = json!({
            "channels": {
                "telegram": {"enabled": true},
                "discord": {"enabled": false},
                "slack": {}
            }
        });

        let summary = channel_summary(&doc);

        assert!(summary["telegram"].enabled);
        assert!(!summary["discord"].enabled);
        assert!(!summary["slack"].enabled);
    }

    #[test]
    fn test_summaries_of_missing_sections_are_empty() {
        let doc = json!({"gateway": {"port": 18790}});
        assert!(provider_summary(&doc).is_empty());
        assert!(channel_summary(&doc).is_empty());
        assert!(!has_provider_key(&doc));
    }

    #[test]
    fn test_has_provider_key() {
        assert!(!has_provider_key(&default_document()));

        let mut doc = default_document();
        doc["providers"]["groq"]["api_key"] = json!("gsk_live");
        assert!(has_provider_key(&doc));
    }

    #[test]
    fn test_load_cron_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let cron = dir.path().join("cron");
        std::fs::create_dir_all(&cron).unwrap();
        std::fs::write(cron.join("a.json"), r#"{"name": "daily", "schedule": "0 9 * * *"}"#).unwrap();
        std::fs::write(cron.join("b.json"), "{broken").unwrap();
        std::fs::write(cron.join("notes.txt"), "ignored").unwrap();

        let summary = load_cron_jobs(dir.path());

        assert_eq!(summary.count, 1);
        assert_eq!(summary.jobs[0]["name"], "daily");
    }

    #[test]
    fn test_load_cron_jobs_without_directory() {
        let dir = tempfile::tempdir().unwrap();
        let summary = load_cron_jobs(dir.path());
        assert_eq!(summary.count, 0);
        assert!(summary.jobs.is_empty());
    }
}
