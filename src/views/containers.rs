use super::{Body, Screen, Target, ViewContext, ViewModel};
use crate::commands::ExternalCommand;
use crate::effect::{Effect, Task};
use crate::input::Key;
use crate::message::{AsyncResult, Message, NavParams, Outcome, Subject, ViewId};
use crate::model::ResourceKind;
use crate::widgets::{SelectItem, SelectionWidget};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Purpose {
    Logs { follow: bool },
    Shell,
}

pub struct ContainerView {
    target: Target,
    purpose: Purpose,
    shell: String,
    picker: SelectionWidget<String>,
    loading: bool,
    running: bool,
    error: Option<String>,
}

impl ContainerView {
    pub fn new(params: &NavParams) -> Result<Self, String> {
        let target = Target::from_params(params)?;
        if target.kind != ResourceKind::Pods {
            return Err(format!("{} has no containers to pick", target.describe()));
        }
        let purpose = match params.require("purpose")? {
            "logs" => Purpose::Logs {
                follow: params.flag("follow"),
            },
            "shell" => Purpose::Shell,
            other => return Err(format!("unknown container purpose '{other}'")),
        };
        Ok(Self {
            target,
            purpose,
            shell: String::new(),
            picker: SelectionWidget::default(),
            loading: false,
            running: false,
            error: None,
        })
    }

    fn fetch(&mut self) -> Effect {
        self.loading = true;
        Effect::task(Task::GetResource {
            kind: ResourceKind::Pods,
            namespace: Some(self.target.namespace.clone()),
            name: self.target.name.clone(),
        })
    }

    fn activate(&mut self) -> Effect {
        let Some(container) = self.picker.selected_value().cloned() else {
            return Effect::None;
        };
        match self.purpose {
            Purpose::Logs { follow } => Effect::navigate(
                ViewId::LogViewer,
                self.target
                    .params()
                    .with("container", container)
                    .with("follow", if follow { "true" } else { "false" }),
            ),
            Purpose::Shell => {
                self.running = true;
                self.error = None;
                Effect::task(Task::RunCommand(ExternalCommand::Shell {
                    namespace: self.target.namespace.clone(),
                    pod: self.target.name.clone(),
                    container: Some(container),
                    shell: self.shell.clone(),
                }))
            }
        }
    }
}

impl ViewModel for ContainerView {
    fn init(&mut self, ctx: &ViewContext) -> Effect {
        self.shell = ctx.config.shell.clone();
        self.picker.set_page(ctx.body_rows());
        self.fetch()
    }

    fn handle(&mut self, message: Message) -> Effect {
        match message {
            Message::AsyncResult(AsyncResult {
                subject: Subject::Get,
                result,
                ..
            }) => {
                self.loading = false;
                match result {
                    Ok(Outcome::Document(document)) => {
                        self.error = None;
                        self.picker.set_items(
                            document
                                .containers
                                .into_iter()
                                .map(|name| SelectItem::new(name.clone(), name))
                                .collect(),
                        );
                    }
                    Ok(_) => {}
                    Err(error) => self.error = Some(error.to_string()),
                }
                Effect::None
            }
            Message::AsyncResult(AsyncResult {
                subject: Subject::Command,
                result,
                ..
            }) => {
                self.running = false;
                match result {
                    Ok(_) => self
                        .target
                        .back_to_detail(Some("shell session ended".to_string())),
                    Err(error) => {
                        self.error = Some(error.to_string());
                        Effect::None
                    }
                }
            }
            Message::Key(_) if self.running => Effect::None,
            Message::Key(key) if key.is_activate() => self.activate(),
            Message::Key(key) if key.is_back() => self.target.back_to_detail(None),
            Message::Key(Key::Char('r')) if !self.loading => self.fetch(),
            Message::Key(key) => {
                self.picker.handle_key(key);
                Effect::None
            }
            _ => Effect::None,
        }
    }

    fn render(&self) -> Screen {
        let body = if self.loading && self.picker.is_empty() {
            Body::Loading("loading containers…".to_string())
        } else if !self.loading && self.picker.is_empty() && self.error.is_none() {
            Body::Notice(format!("{} has no containers", self.target.describe()))
        } else {
            Body::Menu {
                items: self.picker.labels(),
                selected: self.picker.selected_index(),
            }
        };
        let status = match self.purpose {
            Purpose::Logs { follow: true } => "pick a container to follow",
            Purpose::Logs { follow: false } => "pick a container to read logs from",
            Purpose::Shell if self.running => "shell running…",
            Purpose::Shell => "pick a container to open a shell in",
        };

        Screen::new(format!("Containers of {}", self.target.qualified()), body)
            .with_error(self.error.as_deref())
            .with_status(Some(status.to_string()))
            .with_hints(&[("enter", "select"), ("r", "retry"), ("esc", "back")])
    }
}
