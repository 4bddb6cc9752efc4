use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{DataSource, FetchPolicy};
use crate::core::observability::Observability;
use crate::error::ResourceError;
use crate::model::Dataset;
use crate::normalize::{normalize, RawSnapshot};

/// The seven snapshot resources published by the upstream pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    Peers,
    Wavefronts,
    Messages,
    Communities,
    Leaks,
    Summary,
    Fingerprints,
}

impl Resource {
    pub const ALL: [Resource; 7] = [
        Resource::Peers,
        Resource::Wavefronts,
        Resource::Messages,
        Resource::Communities,
        Resource::Leaks,
        Resource::Summary,
        Resource::Fingerprints,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Resource::Peers => "peers.json",
            Resource::Wavefronts => "wavefronts.json",
            Resource::Messages => "messages.json",
            Resource::Communities => "communities.json",
            Resource::Leaks => "leaks.json",
            Resource::Summary => "summary.json",
            Resource::Fingerprints => "fingerprints.json",
        }
    }
}

pub trait ResourceFetcher {
    async fn fetch(&self, resource: Resource) -> Result<Vec<u8>, ResourceError>;
}

/// Reads the snapshot from a local directory.
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceFetcher for DirectoryFetcher {
    async fn fetch(&self, resource: Resource) -> Result<Vec<u8>, ResourceError> {
        let path = self.root.join(resource.file_name());
        tokio::fs::read(&path)
            .await
            .map_err(|e| ResourceError::Unavailable {
                resource,
                reason: format!("{}: {}", path.display(), e),
            })
    }
}

/// Fetches the snapshot from a static file server.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    policy: FetchPolicy,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>, policy: FetchPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            policy,
        }
    }

    fn url_for(&self, resource: Resource) -> String {
        format!("{}/{}", self.base_url, resource.file_name())
    }
}

impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, resource: Resource) -> Result<Vec<u8>, ResourceError> {
        let url = self.url_for(resource);

        let mut last_error = ResourceError::Unavailable {
            resource,
            reason: "no fetch attempted".to_string(),
        };
        for attempt in 0..self.policy.attempts.max(1) {
            let response = match self
                .client
                .get(&url)
                .header("Accept", "application/json")
                .timeout(self.policy.timeout)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    debug!(resource = resource.file_name(), attempt, error = %e, "fetch attempt failed");
                    last_error = if e.is_timeout() {
                        ResourceError::Timeout { resource }
                    } else {
                        ResourceError::Unavailable {
                            resource,
                            reason: e.to_string(),
                        }
                    };
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                // A missing file will not appear on retry.
                return Err(ResourceError::Status {
                    resource,
                    status: status.as_u16(),
                });
            }

            match response.bytes().await {
                Ok(body) => return Ok(body.to_vec()),
                Err(e) => {
                    last_error = ResourceError::Unavailable {
                        resource,
                        reason: e.to_string(),
                    };
                }
            }
        }
        Err(last_error)
    }
}

/// Serves resources from memory. Resources never inserted are unavailable.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    bodies: BTreeMap<Resource, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resource: Resource, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(resource, body.into());
        self
    }

    pub fn with_json(self, resource: Resource, value: &Value) -> Self {
        self.with(resource, value.to_string())
    }
}

impl ResourceFetcher for MemoryFetcher {
    async fn fetch(&self, resource: Resource) -> Result<Vec<u8>, ResourceError> {
        self.bodies
            .get(&resource)
            .cloned()
            .ok_or_else(|| ResourceError::Unavailable {
                resource,
                reason: "not present".to_string(),
            })
    }
}

/// Which resources loaded and which fell back to their empty default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub loaded: Vec<Resource>,
    pub failed: Vec<ResourceError>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_resources(&self) -> Vec<Resource> {
        self.failed.iter().map(|e| e.resource()).collect()
    }

    pub fn degraded(&self, resource: Resource) -> bool {
        self.failed.iter().any(|e| e.resource() == resource)
    }
}

async fn fetch_json<F: ResourceFetcher>(fetcher: &F, resource: Resource) -> Result<Value, ResourceError> {
    let body = fetcher.fetch(resource).await?;
    serde_json::from_slice::<Value>(&body).map_err(|e| ResourceError::Malformed {
        resource,
        reason: e.to_string(),
    })
}

fn settle(
    resource: Resource,
    result: Result<Value, ResourceError>,
    report: &mut LoadReport,
    obs: &Observability,
) -> Value {
    match result {
        Ok(value) => {
            obs.record_resource_loaded();
            report.loaded.push(resource);
            value
        }
        Err(e) => {
            warn!(resource = resource.file_name(), error = %e, "resource unavailable, using empty default");
            obs.record_resource_failed();
            report.failed.push(e);
            Value::Null
        }
    }
}

/// Fetches all seven resources concurrently and normalizes them. Never fails:
/// each resource that cannot be obtained degrades to its empty default.
pub async fn load_dataset<F: ResourceFetcher>(fetcher: &F, obs: &Observability) -> (Dataset, LoadReport) {
    let (peers, wavefronts, messages, communities, leaks, summary, fingerprints) = tokio::join!(
        fetch_json(fetcher, Resource::Peers),
        fetch_json(fetcher, Resource::Wavefronts),
        fetch_json(fetcher, Resource::Messages),
        fetch_json(fetcher, Resource::Communities),
        fetch_json(fetcher, Resource::Leaks),
        fetch_json(fetcher, Resource::Summary),
        fetch_json(fetcher, Resource::Fingerprints),
    );

    let mut report = LoadReport::default();
    let raw = RawSnapshot {
        peers: settle(Resource::Peers, peers, &mut report, obs),
        wavefronts: settle(Resource::Wavefronts, wavefronts, &mut report, obs),
        messages: settle(Resource::Messages, messages, &mut report, obs),
        communities: settle(Resource::Communities, communities, &mut report, obs),
        leaks: settle(Resource::Leaks, leaks, &mut report, obs),
        summary: settle(Resource::Summary, summary, &mut report, obs),
        fingerprints: settle(Resource::Fingerprints, fingerprints, &mut report, obs),
    };

    info!(
        loaded = report.loaded.len(),
        failed = report.failed.len(),
        "snapshot fetch finished"
    );
    (normalize(&raw, obs), report)
}

/// Loads from whichever source the configuration names.
pub async fn load_from_source(
    source: &DataSource,
    fetch: &FetchPolicy,
    obs: &Observability,
) -> (Dataset, LoadReport) {
    match source {
        DataSource::Directory(path) => load_dataset(&DirectoryFetcher::new(path.clone()), obs).await,
        DataSource::Http { base_url } => {
            load_dataset(&HttpFetcher::new(base_url.clone(), fetch.clone()), obs).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_fetcher() -> MemoryFetcher {
        MemoryFetcher::new()
            .with_json(Resource::Peers, &json!({"A": {"ip": "10.0.0.1"}, "B": {"is_tor": true}}))
            .with_json(Resource::Wavefronts, &json!({"h": [{"peer": "A", "delay_ms": 0}, {"peer": "B", "delay_ms": 500}]}))
            .with_json(Resource::Messages, &json!({"h": {"type_id": 3}}))
            .with_json(Resource::Communities, &json!([]))
            .with_json(Resource::Leaks, &json!({"first_responders": [{"pubkey": "A"}], "colocation": []}))
            .with_json(Resource::Summary, &json!({"total_peers": 2, "total_messages": 1, "peers_with_ip": 1}))
            .with_json(Resource::Fingerprints, &json!({"fingerprint_groups": []}))
    }

    #[test]
    fn every_resource_has_a_distinct_file() {
        let mut names: Vec<&str> = Resource::ALL.iter().map(|r| r.file_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 7);
    }

    #[tokio::test]
    async fn complete_snapshot_loads_cleanly() {
        let obs = Observability::new();
        let (ds, report) = load_dataset(&full_fetcher(), &obs).await;
        assert!(report.is_complete());
        assert_eq!(report.loaded.len(), 7);
        assert_eq!(ds.peers.len(), 2);
        assert_eq!(ds.summary.total_peers, 2);
        assert_eq!(ds.leaks.first_responders.len(), 1);
    }

    #[tokio::test]
    async fn missing_leaks_degrades_only_that_resource() {
        let mut fetcher = full_fetcher();
        fetcher.bodies.remove(&Resource::Leaks);
        let obs = Observability::new();
        let (ds, report) = load_dataset(&fetcher, &obs).await;

        assert_eq!(report.failed_resources(), vec![Resource::Leaks]);
        assert!(report.degraded(Resource::Leaks));
        assert!(ds.leaks.is_empty());
        assert_eq!(ds.wavefronts.len(), 1);
        assert_eq!(ds.peers.len(), 2);
    }

    #[tokio::test]
    async fn unparseable_body_is_malformed_not_fatal() {
        let fetcher = full_fetcher().with(Resource::Summary, "{not json");
        let obs = Observability::new();
        let (ds, report) = load_dataset(&fetcher, &obs).await;
        assert!(matches!(
            report.failed.as_slice(),
            [ResourceError::Malformed { resource: Resource::Summary, .. }]
        ));
        assert_eq!(ds.summary.total_peers, 0);
    }

    #[tokio::test]
    async fn nothing_available_yields_empty_dataset() {
        let obs = Observability::new();
        let (ds, report) = load_dataset(&MemoryFetcher::new(), &obs).await;
        assert_eq!(report.failed.len(), 7);
        assert!(ds.peers.is_empty());
        assert!(ds.messages.is_empty());
    }

    #[tokio::test]
    async fn directory_fetcher_reports_missing_file() {
        let fetcher = DirectoryFetcher::new("/nonexistent/gossip-tomography");
        let err = fetcher.fetch(Resource::Peers).await.unwrap_err();
        assert_eq!(err.resource(), Resource::Peers);
        assert!(err.to_string().starts_with("peers.json unavailable"));
    }

    #[test]
    fn http_urls_join_base_and_file() {
        let fetcher = HttpFetcher::new("http://localhost:8000/data/", FetchPolicy::default());
        assert_eq!(fetcher.url_for(Resource::Leaks), "http://localhost:8000/data/leaks.json");
    }
}
