use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::{Child, Command as TokioCommand};
use tracing::{info, warn};

use crate::model::ResourceKind;
use crate::{TuiTerminal, resume_terminal_after_subprocess, suspend_terminal_for_subprocess};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ExternalCommand {
    Describe {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },
    Shell {
        namespace: String,
        pod: String,
        container: Option<String>,
        shell: String,
    },
    PortForward {
        kind: ResourceKind,
        namespace: String,
        name: String,
        local_port: u16,
        remote_port: u16,
    },
    Edit {
        kind: ResourceKind,
        namespace: String,
        name: String,
    },
}

impl ExternalCommand {
    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Shell { .. } | Self::Edit { .. })
    }

    pub fn is_background(&self) -> bool {
        matches!(self, Self::PortForward { .. })
    }

    pub fn label(&self) -> String {
        match self {
            Self::Describe {
                kind,
                namespace,
                name,
            } => format!("describe {} {namespace}/{name}", kind.kubectl_resource()),
            Self::Shell { namespace, pod, .. } => format!("shell {namespace}/{pod}"),
            Self::PortForward {
                kind,
                namespace,
                name,
                local_port,
                remote_port,
            } => format!(
                "port-forward {} {namespace}/{name} {local_port}:{remote_port}",
                kind.kubectl_resource()
            ),
            Self::Edit {
                kind,
                namespace,
                name,
            } => format!("edit {} {namespace}/{name}", kind.kubectl_resource()),
        }
    }

    pub fn kubectl_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match self {
            Self::Describe {
                kind,
                namespace,
                name,
            } => {
                args.extend(
                    [
                        "describe",
                        kind.kubectl_resource(),
                        name.as_str(),
                        "-n",
                        namespace.as_str(),
                    ]
                    .map(str::to_string),
                );
            }
            Self::Shell {
                namespace,
                pod,
                container,
                shell,
            } => {
                args.extend(
                    ["exec", "-it", "-n", namespace.as_str(), pod.as_str()].map(str::to_string),
                );
                if let Some(container) = container {
                    args.push("-c".to_string());
                    args.push(container.clone());
                }
                args.push("--".to_string());
                args.push(shell.clone());
            }
            Self::PortForward {
                kind,
                namespace,
                name,
                local_port,
                remote_port,
            } => {
                args.extend(["port-forward", "-n", namespace.as_str()].map(str::to_string));
                args.push(format!("{}/{name}", kind.kubectl_resource()));
                args.push(format!("{local_port}:{remote_port}"));
            }
            Self::Edit {
                kind,
                namespace,
                name,
            } => {
                args.extend(
                    [
                        "edit",
                        kind.kubectl_resource(),
                        name.as_str(),
                        "-n",
                        namespace.as_str(),
                    ]
                    .map(str::to_string),
                );
            }
        }
        args
    }
}

pub async fn run_captured(command: &ExternalCommand) -> Result<String> {
    let label = command.label();
    let output = TokioCommand::new("kubectl")
        .args(command.kubectl_args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to execute kubectl {label}"))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if output.status.success() {
        Ok(stdout.to_string())
    } else if stderr.trim().is_empty() {
        Err(anyhow::anyhow!("kubectl {label} exited with {}", output.status))
    } else {
        Err(anyhow::anyhow!(
            "kubectl {label} exited with {}: {}",
            output.status,
            stderr.trim()
        ))
    }
}

pub async fn run_interactive(terminal: &mut TuiTerminal, command: &ExternalCommand) -> Result<()> {
    let label = command.label();
    suspend_terminal_for_subprocess(terminal)?;

    let mut cmd = TokioCommand::new("kubectl");
    cmd.args(command.kubectl_args());
    if matches!(command, ExternalCommand::Edit { .. })
        && std::env::var_os("KUBE_EDITOR").is_none()
        && let Some(editor) = std::env::var_os("EDITOR")
    {
        cmd.env("KUBE_EDITOR", editor);
    }
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    info!("running kubectl {label}");
    let run_result = cmd
        .status()
        .await
        .with_context(|| format!("failed to run kubectl {label}"));
    let restore_result = resume_terminal_after_subprocess(terminal);

    let status = match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => {
            return Err(anyhow::anyhow!(
                "{run_error:#}\nterminal resume error: {restore_error:#}"
            ));
        }
        (Err(error), _) => return Err(error),
        (_, Err(error)) => return Err(error),
        (Ok(status), Ok(())) => status,
    };

    if status.success() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("kubectl {label} exited with {status}"))
    }
}

struct ForwardProcess {
    label: String,
    child: Child,
}

#[derive(Default)]
pub struct PortForwards {
    active: Vec<ForwardProcess>,
}

impl PortForwards {
    pub fn start(&mut self, command: &ExternalCommand) -> Result<String> {
        if !command.is_background() {
            anyhow::bail!("{} is not a background command", command.label());
        }
        self.reap();

        let label = command.label();
        let child = TokioCommand::new("kubectl")
            .args(command.kubectl_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn kubectl {label}"))?;
        let pid = child
            .id()
            .context("failed to determine process id for kubectl port-forward")?;

        info!("started kubectl {label} (pid {pid})");
        self.active.push(ForwardProcess {
            label: label.clone(),
            child,
        });
        Ok(format!("{label} running (pid {pid})"))
    }

    pub fn running(&mut self) -> usize {
        self.reap();
        self.active.len()
    }

    fn reap(&mut self) {
        self.active
            .retain_mut(|forward| match forward.child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    warn!("kubectl {} exited with {status}", forward.label);
                    false
                }
                Err(error) => {
                    warn!("kubectl {} could not be polled: {error}", forward.label);
                    false
                }
            });
    }
}
