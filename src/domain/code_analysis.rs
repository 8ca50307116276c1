//! Code analysis tools backed by external analyzer executables
//!
//! `run_linter` and `run_type_checker` spawn the configured programs, wait for
//! them to finish, and return captured output verbatim. The analyzers' own
//! exit codes are deliberately ignored: a non-zero exit means findings were
//! reported, which is a normal success outcome.

use std::io::ErrorKind;

use rust_mcp_sdk::macros;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::process::Command;

use crate::errors::AppError;
use crate::registry::{RegistryError, ToolRegistry};

pub const SERVER_NAME: &str = "code-analysis-server";

/// External analyzer programs, resolved through PATH. Overridable so tests can
/// substitute executables; the wire surface never changes.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub linter_program: String,
    pub type_checker_program: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            linter_program: "ruff".to_string(),
            type_checker_program: "mypy".to_string(),
        }
    }
}

#[macros::mcp_tool(
    name = "run_linter",
    description = "Performs linting and static analysis using Ruff and returns the results"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct RunLinterTool {
    pub project_path: String,
}

#[macros::mcp_tool(
    name = "run_type_checker",
    description = "Performs static type checking using Mypy and returns the results"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct RunTypeCheckerTool {
    pub project_path: String,
}

pub fn registry(toolchain: Toolchain) -> Result<ToolRegistry, RegistryError> {
    let linter_toolchain = toolchain.clone();
    Ok(ToolRegistry::builder(SERVER_NAME)
        .register(RunLinterTool::tool(), move |arguments| {
            run_linter(linter_toolchain.clone(), arguments)
        })?
        .register(RunTypeCheckerTool::tool(), move |arguments| {
            run_type_checker(toolchain.clone(), arguments)
        })?
        .build())
}

pub async fn run_linter(toolchain: Toolchain, arguments: Value) -> Result<Value, AppError> {
    let params: RunLinterTool = serde_json::from_value(arguments)
        .map_err(|_| AppError::bad_request("invalid_arguments", "project_path is required"))?;

    Ok(run_analysis_command(
        &toolchain.linter_program,
        &["check", &params.project_path],
        "Ruff",
        "No issues found.",
    )
    .await)
}

pub async fn run_type_checker(toolchain: Toolchain, arguments: Value) -> Result<Value, AppError> {
    let params: RunTypeCheckerTool = serde_json::from_value(arguments)
        .map_err(|_| AppError::bad_request("invalid_arguments", "project_path is required"))?;

    Ok(run_analysis_command(
        &toolchain.type_checker_program,
        &[&params.project_path],
        "Mypy",
        "No type errors found.",
    )
    .await)
}

async fn run_analysis_command(
    program: &str,
    args: &[&str],
    display_name: &str,
    empty_output_sentinel: &str,
) -> Value {
    match Command::new(program).args(args).output().await {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            json!({
                "status": "success",
                "output": if stdout.is_empty() {
                    empty_output_sentinel.to_string()
                } else {
                    stdout
                },
                "errors": stderr,
            })
        }
        Err(err) if err.kind() == ErrorKind::NotFound => json!({
            "status": "error",
            "message": format!("{display_name} is not installed or not in PATH."),
        }),
        Err(err) => json!({
            "status": "error",
            "message": err.to_string(),
        }),
    }
}
