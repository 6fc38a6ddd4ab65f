//! Deployment restarts through `kubectl rollout restart`.

use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use driftguard_domain::{DeploymentConfig, DriftguardError, Parameter};
use driftguard_ports::{DeploymentController, PortResult};

/// Restarts `deployment/<prefix><param lowercase>` in the configured namespace
/// so the serving pods reload their weights. A `kubectl` that outlives
/// `timeout` is killed and reported as a restart failure.
#[derive(Debug, Clone)]
pub struct KubectlDeploymentController {
    kubectl_bin: String,
    namespace: String,
    deployment_prefix: String,
    timeout: Duration,
}

impl KubectlDeploymentController {
    pub fn new(config: &DeploymentConfig) -> Self {
        Self {
            kubectl_bin: config.kubectl_bin.clone(),
            namespace: config.namespace.clone(),
            deployment_prefix: config.deployment_prefix.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn deployment_name(&self, parameter: &Parameter) -> String {
        format!("{}{}", self.deployment_prefix, parameter.slug())
    }

    pub fn restart_args(&self, parameter: &Parameter) -> Vec<String> {
        vec![
            "rollout".into(),
            "restart".into(),
            format!("deployment/{}", self.deployment_name(parameter)),
            "-n".into(),
            self.namespace.clone(),
        ]
    }

    async fn run_bounded(&self, parameter: &Parameter, mut command: Command) -> PortResult<Output> {
        command.kill_on_drop(true);
        let program = command.as_std().get_program().to_string_lossy().into_owned();
        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(DriftguardError::DeploymentRestartFailed {
                parameter: parameter.clone(),
                message: format!("failed to spawn {program}: {e}"),
            }),
            Err(_) => Err(DriftguardError::DeploymentRestartFailed {
                parameter: parameter.clone(),
                message: format!(
                    "{program} did not finish within {}s",
                    self.timeout.as_secs_f64()
                ),
            }),
        }
    }
}

#[async_trait]
impl DeploymentController for KubectlDeploymentController {
    async fn restart(&self, parameter: &Parameter) -> PortResult<()> {
        let args = self.restart_args(parameter);
        tracing::info!(
            parameter = %parameter,
            command = %format!("{} {}", self.kubectl_bin, args.join(" ")),
            "restarting deployment"
        );
        let mut command = Command::new(&self.kubectl_bin);
        command.args(&args);
        let output = self.run_bounded(parameter, command).await?;
        if output.status.success() {
            tracing::debug!(
                parameter = %parameter,
                stdout = %String::from_utf8_lossy(&output.stdout).trim(),
                "rollout restart accepted"
            );
            Ok(())
        } else {
            Err(DriftguardError::DeploymentRestartFailed {
                parameter: parameter.clone(),
                message: format!(
                    "{} exited with {}: {}",
                    self.kubectl_bin,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }
}
