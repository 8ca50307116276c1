use std::sync::Arc;

use async_trait::async_trait;
use bollard::container::{ListContainersOptions, StopContainerOptions};
use bollard::Docker;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
}

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Container {id} not found.")]
    NotFound { id: String },
    #[error("{0}")]
    Api(String),
}

#[async_trait]
pub trait ContainerProvider: Send + Sync {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, DaemonError>;
    async fn stop_container(&self, id: &str) -> Result<(), DaemonError>;
}

/// The process-scoped daemon connection. `Unavailable` is a permanent degraded
/// state recorded at startup; it stays that way until the process restarts.
#[derive(Clone)]
pub enum DaemonHandle {
    Connected(Arc<dyn ContainerProvider>),
    Unavailable,
}

pub struct BollardDockerClient {
    docker: Docker,
}

impl BollardDockerClient {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

/// Connects to the local daemon and verifies it answers a ping. Connection
/// details (socket path, host override) come from the environment.
pub async fn connect_daemon() -> DaemonHandle {
    let docker = match Docker::connect_with_local_defaults() {
        Ok(docker) => docker,
        Err(err) => {
            warn!(error = %err, "docker daemon connection failed");
            return DaemonHandle::Unavailable;
        }
    };

    match docker.ping().await {
        Ok(_) => DaemonHandle::Connected(Arc::new(BollardDockerClient::new(docker))),
        Err(err) => {
            warn!(error = %err, "docker daemon unreachable");
            DaemonHandle::Unavailable
        }
    }
}

#[async_trait]
impl ContainerProvider for BollardDockerClient {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, DaemonError> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|err| DaemonError::Api(err.to_string()))?;

        Ok(containers.into_iter().map(summarize_container).collect())
    }

    async fn stop_container(&self, id: &str) -> Result<(), DaemonError> {
        self.docker
            .stop_container(id, None::<StopContainerOptions>)
            .await
            .map_err(|err| match err {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => DaemonError::NotFound { id: id.to_string() },
                other => DaemonError::Api(other.to_string()),
            })
    }
}

fn summarize_container(container: bollard::models::ContainerSummary) -> ContainerSummary {
    let id = container.id.unwrap_or_default();
    let short_id: String = id.chars().take(12).collect();

    let name = container
        .names
        .unwrap_or_default()
        .into_iter()
        .next()
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_default();

    // The daemon reports a digest-only image reference for untagged images.
    let image = container
        .image
        .filter(|image| !image.is_empty() && !image.starts_with("sha256:"))
        .unwrap_or_else(|| "N/A".to_string());

    let status = container.state.unwrap_or_else(|| "unknown".to_string());

    ContainerSummary {
        id: short_id,
        name,
        image,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::summarize_container;

    fn raw(
        id: &str,
        names: Vec<&str>,
        image: Option<&str>,
        state: Option<&str>,
    ) -> bollard::models::ContainerSummary {
        bollard::models::ContainerSummary {
            id: Some(id.to_string()),
            names: Some(names.into_iter().map(str::to_string).collect()),
            image: image.map(str::to_string),
            state: state.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn truncates_id_and_strips_name_slash() {
        let summary = summarize_container(raw(
            "0123456789abcdef0123456789abcdef",
            vec!["/web-frontend"],
            Some("nginx:latest"),
            Some("running"),
        ));

        assert_eq!(summary.id, "0123456789ab");
        assert_eq!(summary.name, "web-frontend");
        assert_eq!(summary.image, "nginx:latest");
        assert_eq!(summary.status, "running");
    }

    #[test]
    fn untagged_image_becomes_sentinel() {
        let summary = summarize_container(raw(
            "feedfacefeedface",
            vec!["/job"],
            Some("sha256:abcdef0123"),
            Some("exited"),
        ));

        assert_eq!(summary.image, "N/A");
        assert_eq!(summary.status, "exited");
    }

    #[test]
    fn missing_fields_fall_back() {
        let summary = summarize_container(bollard::models::ContainerSummary::default());

        assert_eq!(summary.id, "");
        assert_eq!(summary.name, "");
        assert_eq!(summary.image, "N/A");
        assert_eq!(summary.status, "unknown");
    }
}
