//! Docker control tools backed by the container daemon
//!
//! `list_containers` and `stop_container` delegate to the `ContainerProvider`
//! behind the process-scoped `DaemonHandle`. When no daemon connection was
//! established at startup, every call short-circuits with a fixed error
//! payload instead of touching the daemon.

use rust_mcp_sdk::macros;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::docker_client::{DaemonError, DaemonHandle};
use crate::errors::AppError;
use crate::registry::{RegistryError, ToolRegistry};

pub const SERVER_NAME: &str = "docker-control-server";

pub const DAEMON_UNAVAILABLE_MESSAGE: &str = "Docker is not running or is not installed.";

#[macros::mcp_tool(
    name = "list_containers",
    description = "Lists all Docker containers"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct ListContainersTool {
    pub all_containers: Option<bool>,
}

#[macros::mcp_tool(
    name = "stop_container",
    description = "Stops a running Docker container by its ID"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct StopContainerTool {
    pub container_id: String,
}

pub fn registry(daemon: DaemonHandle) -> Result<ToolRegistry, RegistryError> {
    let list_daemon = daemon.clone();
    Ok(ToolRegistry::builder(SERVER_NAME)
        .register(ListContainersTool::tool(), move |arguments| {
            list_containers(list_daemon.clone(), arguments)
        })?
        .register(StopContainerTool::tool(), move |arguments| {
            stop_container(daemon.clone(), arguments)
        })?
        .build())
}

pub async fn list_containers(daemon: DaemonHandle, arguments: Value) -> Result<Value, AppError> {
    let params: ListContainersTool = serde_json::from_value(arguments)
        .map_err(|_| AppError::bad_request("invalid_arguments", "all_containers must be a boolean"))?;

    let DaemonHandle::Connected(provider) = daemon else {
        return Ok(json!([{ "error": DAEMON_UNAVAILABLE_MESSAGE }]));
    };

    match provider
        .list_containers(params.all_containers.unwrap_or(false))
        .await
    {
        Ok(containers) => Ok(json!(containers)),
        Err(err) => Ok(json!({
            "status": "error",
            "message": err.to_string(),
        })),
    }
}

pub async fn stop_container(daemon: DaemonHandle, arguments: Value) -> Result<Value, AppError> {
    let params: StopContainerTool = serde_json::from_value(arguments)
        .map_err(|_| AppError::bad_request("invalid_arguments", "container_id is required"))?;

    let DaemonHandle::Connected(provider) = daemon else {
        return Ok(json!({ "error": DAEMON_UNAVAILABLE_MESSAGE }));
    };

    match provider.stop_container(&params.container_id).await {
        Ok(()) => Ok(json!({
            "status": "success",
            "message": format!("Container {} stopped.", params.container_id),
        })),
        Err(DaemonError::NotFound { .. }) => Ok(json!({
            "status": "error",
            "message": format!("Container {} not found.", params.container_id),
        })),
        Err(err) => Ok(json!({
            "status": "error",
            "message": err.to_string(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::docker_client::{ContainerProvider, ContainerSummary, DaemonError, DaemonHandle};

    use super::{list_containers, registry, stop_container, DAEMON_UNAVAILABLE_MESSAGE};

    struct MockDaemon {
        containers: Vec<ContainerSummary>,
    }

    impl MockDaemon {
        fn with_fixtures() -> Self {
            Self {
                containers: vec![
                    ContainerSummary {
                        id: "aaaa11112222".to_string(),
                        name: "web".to_string(),
                        image: "nginx:latest".to_string(),
                        status: "running".to_string(),
                    },
                    ContainerSummary {
                        id: "bbbb33334444".to_string(),
                        name: "batch".to_string(),
                        image: "N/A".to_string(),
                        status: "exited".to_string(),
                    },
                ],
            }
        }
    }

    #[async_trait]
    impl ContainerProvider for MockDaemon {
        async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, DaemonError> {
            Ok(self
                .containers
                .iter()
                .filter(|container| all || container.status == "running")
                .cloned()
                .collect())
        }

        async fn stop_container(&self, id: &str) -> Result<(), DaemonError> {
            if self.containers.iter().any(|container| container.id == id) {
                Ok(())
            } else {
                Err(DaemonError::NotFound { id: id.to_string() })
            }
        }
    }

    struct FailingDaemon;

    #[async_trait]
    impl ContainerProvider for FailingDaemon {
        async fn list_containers(&self, _all: bool) -> Result<Vec<ContainerSummary>, DaemonError> {
            Err(DaemonError::Api("connection reset by daemon".to_string()))
        }

        async fn stop_container(&self, _id: &str) -> Result<(), DaemonError> {
            Err(DaemonError::Api("connection reset by daemon".to_string()))
        }
    }

    fn connected() -> DaemonHandle {
        DaemonHandle::Connected(Arc::new(MockDaemon::with_fixtures()))
    }

    #[tokio::test]
    async fn lists_running_containers_by_default() {
        let result = list_containers(connected(), json!({}))
            .await
            .expect("handler result");

        let containers = result.as_array().expect("list result");
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0]["name"], "web");
        assert_eq!(containers[0]["status"], "running");
    }

    #[tokio::test]
    async fn lists_all_containers_when_requested() {
        let result = list_containers(connected(), json!({"all_containers": true}))
            .await
            .expect("handler result");

        let containers = result.as_array().expect("list result");
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[1]["status"], "exited");
    }

    #[tokio::test]
    async fn stop_known_container_succeeds() {
        let result = stop_container(connected(), json!({"container_id": "aaaa11112222"}))
            .await
            .expect("handler result");

        assert_eq!(result["status"], "success");
        assert_eq!(result["message"], "Container aaaa11112222 stopped.");
    }

    #[tokio::test]
    async fn stop_unknown_container_reports_not_found() {
        let result = stop_container(connected(), json!({"container_id": "nonexistent-id"}))
            .await
            .expect("handler result");

        assert_eq!(result["status"], "error");
        assert_eq!(result["message"], "Container nonexistent-id not found.");
    }

    #[tokio::test]
    async fn daemon_fault_surfaces_as_error_result() {
        let daemon = DaemonHandle::Connected(Arc::new(FailingDaemon));
        let result = list_containers(daemon, json!({}))
            .await
            .expect("handler result");

        assert_eq!(result["status"], "error");
        assert_eq!(result["message"], "connection reset by daemon");
    }

    #[tokio::test]
    async fn unavailable_daemon_short_circuits_list() {
        let result = list_containers(DaemonHandle::Unavailable, json!({}))
            .await
            .expect("handler result");

        let containers = result.as_array().expect("list result");
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0]["error"], DAEMON_UNAVAILABLE_MESSAGE);
    }

    #[tokio::test]
    async fn unavailable_daemon_short_circuits_stop() {
        let result = stop_container(DaemonHandle::Unavailable, json!({"container_id": "any"}))
            .await
            .expect("handler result");

        assert_eq!(result["error"], DAEMON_UNAVAILABLE_MESSAGE);
    }

    #[test]
    fn registry_exposes_both_tools() {
        let registry = registry(DaemonHandle::Unavailable).expect("registry builds");
        let names: Vec<String> = registry
            .definitions()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(names, vec!["list_containers", "stop_container"]);
    }
}
