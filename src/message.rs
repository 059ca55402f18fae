use crate::input::Key;
use crate::logs::{LogChunk, LogHandle};
use crate::model::{ResourceDocument, ResourceKind, ResourceTable};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ViewId {
    MainMenu,
    NamespacePicker,
    ResourceList,
    ResourceDetail,
    ContainerPicker,
    LogViewer,
    ConfirmDialog,
    Form,
}

impl ViewId {
    pub fn title(self) -> &'static str {
        match self {
            Self::MainMenu => "menu",
            Self::NamespacePicker => "namespaces",
            Self::ResourceList => "list",
            Self::ResourceDetail => "detail",
            Self::ContainerPicker => "containers",
            Self::LogViewer => "logs",
            Self::ConfirmDialog => "confirm",
            Self::Form => "form",
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct NavParams {
    values: BTreeMap<String, String>,
}

impl NavParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn with_opt(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn require(&self, key: &str) -> Result<&str, String> {
        self.get(key)
            .ok_or_else(|| format!("missing required parameter '{key}'"))
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true" | "1" | "yes"))
    }

    pub fn kind(&self) -> Result<ResourceKind, String> {
        let token = self.require("kind")?;
        ResourceKind::from_token(token).ok_or_else(|| format!("unknown resource kind '{token}'"))
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub struct ViewToken(pub u64);

impl Display for ViewToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug)]
pub enum Message {
    Key(Key),
    Resize { width: u16, height: u16 },
    Tick(DateTime<Local>),
    NavigateTo(ViewId, NavParams),
    AsyncResult(AsyncResult),
    Quit,
}

#[derive(Debug)]
pub struct AsyncResult {
    pub origin: ViewToken,
    pub subject: Subject,
    pub result: Result<Outcome, TaskError>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Subject {
    List,
    Get,
    Namespaces,
    Delete,
    Update,
    LogOpen { session: u64 },
    LogRead { session: u64 },
    Command,
}

#[derive(Debug)]
pub enum Outcome {
    Table(ResourceTable),
    Document(ResourceDocument),
    Namespaces(Vec<String>),
    Deleted,
    Updated,
    LogOpened(LogHandle),
    Log(LogChunk),
    CommandFinished { output: Option<String> },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FailureKind {
    Timeout,
    NotFound,
    Remote,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TaskError {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == FailureKind::NotFound
    }
}

impl Display for TaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            FailureKind::Timeout => write!(f, "timed out: {}", self.message),
            FailureKind::NotFound => write!(f, "not found: {}", self.message),
            FailureKind::Remote => write!(f, "{}", self.message),
        }
    }
}
