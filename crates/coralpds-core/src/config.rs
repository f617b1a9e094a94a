use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PdsConfig {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default)]
    pub repo: RepoConfig,
    #[serde(default)]
    pub firehose: FirehoseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    /// Curve for newly generated repository signing keys: "p256" or "k256".
    #[serde(default = "default_signing_curve")]
    pub signing_curve: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirehoseConfig {
    /// Events buffered per subscriber before the hub gives up on it.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Whether commit events are also written to the event store.
    #[serde(default = "default_persist_events")]
    pub persist_events: bool,
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_signing_curve() -> String {
    "p256".to_string()
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_persist_events() -> bool {
    true
}

impl Default for RepoConfig {
    fn default() -> Self {
        RepoConfig {
            signing_curve: default_signing_curve(),
        }
    }
}

impl Default for FirehoseConfig {
    fn default() -> Self {
        FirehoseConfig {
            channel_capacity: default_channel_capacity(),
            persist_events: default_persist_events(),
        }
    }
}

impl Default for PdsConfig {
    fn default() -> Self {
        PdsConfig {
            hostname: default_hostname(),
            repo: RepoConfig::default(),
            firehose: FirehoseConfig::default(),
        }
    }
}

impl PdsConfig {
    pub fn load(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CORAL_PDS_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = PdsConfig::default();
        assert_eq!(config.repo.signing_curve, "p256");
        assert!(config.firehose.channel_capacity > 0);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = PdsConfig::load("/nonexistent/coralpds.toml").unwrap();
        assert_eq!(config.hostname, "localhost");
    }
}
