use crate::commands::ExternalCommand;
use crate::k8s::NotFound;
use crate::logs::{LogHandle, LogRequest};
use crate::message::{FailureKind, Message, NavParams, Subject, TaskError, ViewId};
use crate::model::{NamespaceScope, ResourceChange, ResourceKind};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub enum Effect {
    None,
    Task(Task),
    Batch(Vec<Effect>),
    Sequence(Vec<Effect>),
    Emit(Message),
    Halt,
}

impl Effect {
    pub fn navigate(view: ViewId, params: NavParams) -> Self {
        Self::Emit(Message::NavigateTo(view, params))
    }

    pub fn task(task: Task) -> Self {
        Self::Task(task)
    }

    pub fn batch(effects: impl IntoIterator<Item = Effect>) -> Self {
        let effects = effects
            .into_iter()
            .filter(|effect| !effect.is_none())
            .collect::<Vec<_>>();
        match effects.len() {
            0 => Self::None,
            1 => effects.into_iter().next().unwrap_or(Self::None),
            _ => Self::Batch(effects),
        }
    }

    pub fn sequence(effects: impl IntoIterator<Item = Effect>) -> Self {
        let effects = effects
            .into_iter()
            .filter(|effect| !effect.is_none())
            .collect::<Vec<_>>();
        match effects.len() {
            0 => Self::None,
            1 => effects.into_iter().next().unwrap_or(Self::None),
            _ => Self::Sequence(effects),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

#[derive(Debug)]
pub enum Task {
    ListResources {
        kind: ResourceKind,
        scope: NamespaceScope,
        selector: Option<String>,
    },
    GetResource {
        kind: ResourceKind,
        namespace: Option<String>,
        name: String,
    },
    ListNamespaces,
    DeleteResource {
        kind: ResourceKind,
        namespace: Option<String>,
        name: String,
        grace_period_secs: u32,
    },
    UpdateResource {
        kind: ResourceKind,
        namespace: String,
        name: String,
        change: ResourceChange,
    },
    OpenLogs {
        session: u64,
        request: LogRequest,
        cancel: CancellationToken,
    },
    ReadLogs {
        session: u64,
        handle: LogHandle,
        follow: bool,
        cancel: CancellationToken,
    },
    RetryLogs {
        session: u64,
        handle: LogHandle,
        after: Duration,
        cancel: CancellationToken,
    },
    RunCommand(ExternalCommand),
}

impl Task {
    pub fn subject(&self) -> Subject {
        match self {
            Self::ListResources { .. } => Subject::List,
            Self::GetResource { .. } => Subject::Get,
            Self::ListNamespaces => Subject::Namespaces,
            Self::DeleteResource { .. } => Subject::Delete,
            Self::UpdateResource { .. } => Subject::Update,
            Self::OpenLogs { session, .. } => Subject::LogOpen { session: *session },
            Self::ReadLogs { session, .. } | Self::RetryLogs { session, .. } => {
                Subject::LogRead { session: *session }
            }
            Self::RunCommand(_) => Subject::Command,
        }
    }

    pub fn cancel_token(&self) -> Option<&CancellationToken> {
        match self {
            Self::OpenLogs { cancel, .. }
            | Self::ReadLogs { cancel, .. }
            | Self::RetryLogs { cancel, .. } => Some(cancel),
            _ => None,
        }
    }

    pub fn timeout(&self, request_timeout: Duration) -> Option<Duration> {
        match self {
            Self::ReadLogs { follow: true, .. } | Self::RetryLogs { .. } => None,
            Self::RunCommand(command) if command.is_interactive() => None,
            _ => Some(request_timeout),
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::RunCommand(command) if command.is_interactive())
    }

    pub fn label(&self) -> String {
        match self {
            Self::ListResources { kind, scope, .. } => format!("list {kind} in {scope}"),
            Self::GetResource {
                kind,
                namespace,
                name,
            } => format!("get {kind} {}", qualified(namespace.as_deref(), name)),
            Self::ListNamespaces => "list namespaces".to_string(),
            Self::DeleteResource {
                kind,
                namespace,
                name,
                ..
            } => format!("delete {kind} {}", qualified(namespace.as_deref(), name)),
            Self::UpdateResource {
                kind,
                namespace,
                name,
                ..
            } => format!("update {kind} {namespace}/{name}"),
            Self::OpenLogs { request, .. } => format!("open logs {}", request.target_label()),
            Self::ReadLogs { handle, .. } => format!("read logs {}", handle.label()),
            Self::RetryLogs { handle, .. } => format!("retry logs {}", handle.label()),
            Self::RunCommand(command) => command.label(),
        }
    }
}

pub fn qualified(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(namespace) => format!("{namespace}/{name}"),
        None => name.to_string(),
    }
}

pub fn classify_error(error: &anyhow::Error) -> TaskError {
    let kind = if error.downcast_ref::<NotFound>().is_some() {
        FailureKind::NotFound
    } else {
        FailureKind::Remote
    };
    TaskError::new(kind, compact_error(error))
}

pub fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index == 0 {
            out.push(cause.to_string());
        } else if index <= 2 {
            out.push(format!("caused by: {cause}"));
        } else {
            break;
        }
    }

    out.join("\n")
}
