use tracing::debug;

use super::{Body, Screen, Target, ViewContext, ViewModel};
use crate::commands::ExternalCommand;
use crate::effect::{Effect, Task};
use crate::input::Key;
use crate::message::{AsyncResult, Message, NavParams, Outcome, Subject, TaskError, ViewId};
use crate::model::{ResourceDocument, ResourceKind};
use crate::widgets::TextViewport;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Waiting {
    Describe,
    Edit,
    Shell,
}

pub struct DetailView {
    target: Target,
    document: Option<ResourceDocument>,
    yaml: Vec<String>,
    described: Option<Vec<String>>,
    viewport: TextViewport,
    shell: String,
    loading: bool,
    missing: bool,
    waiting: Option<Waiting>,
    error: Option<String>,
    flash: Option<String>,
}

impl DetailView {
    pub fn new(params: &NavParams) -> Result<Self, String> {
        Ok(Self {
            target: Target::from_params(params)?,
            document: None,
            yaml: Vec::new(),
            described: None,
            viewport: TextViewport::default(),
            shell: String::new(),
            loading: false,
            missing: false,
            waiting: None,
            error: None,
            flash: params.get("flash").map(str::to_string),
        })
    }

    fn fetch(&mut self) -> Effect {
        self.loading = true;
        Effect::task(Task::GetResource {
            kind: self.target.kind,
            namespace: Some(self.target.namespace.clone()),
            name: self.target.name.clone(),
        })
    }

    fn lines(&self) -> &[String] {
        self.described.as_deref().unwrap_or(&self.yaml)
    }

    fn apply_document(&mut self, document: ResourceDocument) {
        self.yaml = document.yaml.lines().map(str::to_string).collect();
        self.document = Some(document);
        self.missing = false;
        self.error = None;
        let total = self.lines().len();
        self.viewport.resize(self.viewport.height(), total);
    }

    fn apply_failure(&mut self, error: TaskError) {
        if error.is_not_found() {
            self.missing = true;
            self.document = None;
            self.yaml.clear();
            self.described = None;
        }
        self.error = Some(error.to_string());
    }

    fn containers(&self) -> &[String] {
        self.document
            .as_ref()
            .map(|document| document.containers.as_slice())
            .unwrap_or_default()
    }

    fn run(&mut self, waiting: Waiting, command: ExternalCommand) -> Effect {
        debug!("{} requested from detail view", command.label());
        self.waiting = Some(waiting);
        self.error = None;
        Effect::task(Task::RunCommand(command))
    }

    fn open_logs(&self, follow: bool) -> Effect {
        let params = self
            .target
            .params()
            .with("follow", if follow { "true" } else { "false" });
        match self.containers() {
            [_, _, ..] => Effect::navigate(
                ViewId::ContainerPicker,
                params.with("purpose", "logs"),
            ),
            [only] => Effect::navigate(ViewId::LogViewer, params.with("container", only.as_str())),
            [] => Effect::navigate(ViewId::LogViewer, params),
        }
    }

    fn open_shell(&mut self) -> Effect {
        let container = match self.containers() {
            [_, _, ..] => {
                return Effect::navigate(
                    ViewId::ContainerPicker,
                    self.target.params().with("purpose", "shell"),
                );
            }
            [only] => Some(only.clone()),
            [] => None,
        };
        let command = ExternalCommand::Shell {
            namespace: self.target.namespace.clone(),
            pod: self.target.name.clone(),
            container,
            shell: self.shell.clone(),
        };
        self.run(Waiting::Shell, command)
    }

    fn open_form(&self, purpose: &str) -> Effect {
        let mut params = self.target.params().with("purpose", purpose);
        if let Some(document) = &self.document {
            params = match purpose {
                "scale" => params.with_opt("replicas", document.replicas.map(|r| r.to_string())),
                "port-forward" => {
                    params.with_opt("remote", document.ports.first().map(u16::to_string))
                }
                _ => params,
            };
        }
        Effect::navigate(ViewId::Form, params)
    }

    fn confirm(&self, action: &str) -> Effect {
        Effect::navigate(
            ViewId::ConfirmDialog,
            self.target.params().with("action", action),
        )
    }

    fn related_pods(&mut self) -> Effect {
        let selector = self
            .document
            .as_ref()
            .and_then(|document| document.selector.clone());
        let Some(selector) = selector else {
            self.flash = Some(format!("{} has no pod selector", self.target.describe()));
            return Effect::None;
        };
        Effect::navigate(
            ViewId::ResourceList,
            NavParams::new()
                .with("kind", ResourceKind::Pods.short_token())
                .with("namespace", self.target.namespace.as_str())
                .with("selector", selector),
        )
    }

    fn handle_key(&mut self, key: Key) -> Effect {
        let kind = self.target.kind;
        let ready = self.document.is_some() && self.waiting.is_none();
        match key {
            Key::Char('r')
                if !self.loading && self.described.is_some() && self.waiting.is_none() =>
            {
                let command = ExternalCommand::Describe {
                    kind,
                    namespace: self.target.namespace.clone(),
                    name: self.target.name.clone(),
                };
                let fetch = self.fetch();
                Effect::batch([fetch, self.run(Waiting::Describe, command)])
            }
            Key::Char('r') if !self.loading => {
                self.described = None;
                self.fetch()
            }
            Key::Char('d') if self.described.is_some() => {
                self.described = None;
                self.viewport.to_top();
                Effect::None
            }
            Key::Char('d') if ready => {
                let command = ExternalCommand::Describe {
                    kind,
                    namespace: self.target.namespace.clone(),
                    name: self.target.name.clone(),
                };
                self.run(Waiting::Describe, command)
            }
            Key::Char('l') if ready && kind == ResourceKind::Pods => self.open_logs(true),
            Key::Char('L') if ready && kind == ResourceKind::Pods => self.open_logs(false),
            Key::Char('x') if ready && kind == ResourceKind::Pods => self.open_shell(),
            Key::Char('f') if ready && kind.supports_port_forward() => {
                self.open_form("port-forward")
            }
            Key::Char('e') if ready && kind.has_data() => self.open_form("edit-data"),
            Key::Char('X') if ready && kind.has_data() => self.open_form("remove-data"),
            Key::Char('s') if ready && kind.is_scalable() => self.open_form("scale"),
            Key::Char('R') if ready && kind.is_scalable() => self.confirm("restart"),
            Key::Char('D') if ready => self.confirm("delete"),
            Key::Char('E') if ready => {
                let command = ExternalCommand::Edit {
                    kind,
                    namespace: self.target.namespace.clone(),
                    name: self.target.name.clone(),
                };
                self.run(Waiting::Edit, command)
            }
            Key::Char('p') if ready && kind.has_related_pods() => self.related_pods(),
            key if key.is_back() => {
                if self.described.take().is_some() {
                    self.viewport.to_top();
                    Effect::None
                } else {
                    self.target.back_to_list(None)
                }
            }
            key => {
                let total = self.lines().len();
                self.viewport.handle_key(key, total);
                Effect::None
            }
        }
    }

    fn handle_command(&mut self, result: Result<Outcome, TaskError>) -> Effect {
        let waiting = self.waiting.take();
        match (waiting, result) {
            (Some(Waiting::Describe), Ok(Outcome::CommandFinished { output })) => {
                self.described = Some(
                    output
                        .unwrap_or_default()
                        .lines()
                        .map(str::to_string)
                        .collect(),
                );
                self.viewport.to_top();
                Effect::None
            }
            (Some(Waiting::Edit), Ok(_)) => {
                self.flash = Some(format!("edited {}", self.target.describe()));
                self.fetch()
            }
            (Some(Waiting::Shell), Ok(_)) => {
                self.flash = Some("shell session ended".to_string());
                Effect::None
            }
            (_, Ok(_)) => Effect::None,
            (_, Err(error)) => {
                self.error = Some(error.to_string());
                Effect::None
            }
        }
    }

    fn hints(&self) -> Vec<(&'static str, &'static str)> {
        let kind = self.target.kind;
        let mut hints = vec![("r", "refresh"), ("d", "describe")];
        if kind == ResourceKind::Pods {
            hints.extend([("l", "follow logs"), ("L", "logs"), ("x", "shell")]);
        }
        if kind.supports_port_forward() {
            hints.push(("f", "port-forward"));
        }
        if kind.has_data() {
            hints.extend([("e", "set key"), ("X", "remove key")]);
        }
        if kind.is_scalable() {
            hints.extend([("s", "scale"), ("R", "restart")]);
        }
        if kind.has_related_pods() {
            hints.push(("p", "pods"));
        }
        hints.extend([("E", "edit"), ("D", "delete"), ("esc", "back")]);
        hints
    }
}

impl ViewModel for DetailView {
    fn init(&mut self, ctx: &ViewContext) -> Effect {
        self.shell = ctx.config.shell.clone();
        self.viewport = TextViewport::new(ctx.body_rows());
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
                    Ok(Outcome::Document(document)) => self.apply_document(document),
                    Ok(_) => {}
                    Err(error) => self.apply_failure(error),
                }
                Effect::None
            }
            Message::AsyncResult(AsyncResult {
                subject: Subject::Command,
                result,
                ..
            }) => self.handle_command(result),
            Message::Resize { height, .. } => {
                let total = self.lines().len();
                self.viewport.resize(super::body_rows(height), total);
                Effect::None
            }
            Message::Key(key) => self.handle_key(key),
            _ => Effect::None,
        }
    }

    fn render(&self) -> Screen {
        let body = if self.missing {
            Body::Notice(format!("{} no longer exists", self.target.describe()))
        } else if self.document.is_none() && !self.loading && self.error.is_some() {
            Body::Notice(format!("could not load {}, r to retry", self.target.describe()))
        } else if self.document.is_none() {
            Body::Loading(format!("loading {}…", self.target.describe()))
        } else {
            let lines = self.lines();
            Body::Text {
                lines: lines
                    .iter()
                    .skip(self.viewport.offset())
                    .take(self.viewport.height())
                    .cloned()
                    .collect(),
                offset: self.viewport.offset(),
                total: lines.len(),
                structured: self.described.is_none(),
            }
        };

        let mut status = if self.described.is_some() {
            "describe".to_string()
        } else {
            "yaml".to_string()
        };
        match self.waiting {
            Some(Waiting::Describe) => status.push_str("  running describe…"),
            Some(Waiting::Edit) => status.push_str("  editing…"),
            Some(Waiting::Shell) => status.push_str("  shell running…"),
            None if self.loading => status.push_str("  refreshing…"),
            None => {}
        }
        if let Some(flash) = &self.flash {
            status.push_str(&format!("  {flash}"));
        }

        Screen::new(self.target.describe(), body)
            .with_error(self.error.as_deref())
            .with_status(Some(status))
            .with_hints(&self.hints())
    }
}

#[cfg(test)]
mod tests {
    use super::DetailView;
    use crate::commands::ExternalCommand;
    use crate::effect::{Effect, Task};
    use crate::input::Key;
    use crate::message::{FailureKind, Message, NavParams, Outcome, Subject, TaskError, ViewId};
    use crate::model::{ResourceDocument, ResourceKind};
    use crate::views::testing::{context, deliver, press};
    use crate::views::{Body, ViewModel};

    fn params(kind: &str) -> NavParams {
        NavParams::new()
            .with("kind", kind)
            .with("namespace", "default")
            .with("name", "api-0")
            .with("scope", "all")
    }

    fn document(containers: &[&str]) -> ResourceDocument {
        ResourceDocument {
            kind: Some(ResourceKind::Pods),
            namespace: Some("default".to_string()),
            name: "api-0".to_string(),
            yaml: "apiVersion: v1\nkind: Pod\nmetadata:\n  name: api-0\n".to_string(),
            containers: containers.iter().map(|name| name.to_string()).collect(),
            ports: vec![8080],
            ..ResourceDocument::default()
        }
    }

    fn loaded(kind: &str, containers: &[&str]) -> DetailView {
        let mut view = DetailView::new(&params(kind)).expect("valid params");
        let _ = view.init(&context());
        let _ = deliver(
            &mut view,
            Subject::Get,
            Ok(Outcome::Document(document(containers))),
        );
        view
    }

    #[test]
    fn init_fetches_target() {
        let mut view = DetailView::new(&params("po")).expect("valid params");
        let Effect::Task(Task::GetResource {
            kind,
            namespace,
            name,
        }) = view.init(&context())
        else {
            panic!("expected a get task");
        };
        assert_eq!(kind, ResourceKind::Pods);
        assert_eq!(namespace.as_deref(), Some("default"));
        assert_eq!(name, "api-0");
    }

    #[test]
    fn not_found_renders_no_longer_exists() {
        let mut view = DetailView::new(&params("po")).expect("valid params");
        let _ = view.init(&context());
        let _ = deliver(
            &mut view,
            Subject::Get,
            Err(TaskError::new(FailureKind::NotFound, "pod default/api-0")),
        );
        let screen = view.render();
        assert_eq!(
            screen.body,
            Body::Notice("pod default/api-0 no longer exists".to_string())
        );
        assert!(matches!(
            press(&mut view, Key::Char('r')),
            Effect::Task(Task::GetResource { .. })
        ));
    }

    #[test]
    fn transient_failure_keeps_document() {
        let mut view = loaded("po", &["app"]);
        let _ = press(&mut view, Key::Char('r'));
        let _ = deliver(
            &mut view,
            Subject::Get,
            Err(TaskError::new(FailureKind::Timeout, "get pod")),
        );
        let screen = view.render();
        assert!(matches!(screen.body, Body::Text { .. }));
        assert_eq!(screen.error.as_deref(), Some("timed out: get pod"));
    }

    #[test]
    fn failed_first_fetch_offers_a_retry() {
        let mut view = DetailView::new(&params("po")).expect("valid params");
        let _ = view.init(&context());
        let _ = deliver(
            &mut view,
            Subject::Get,
            Err(TaskError::new(FailureKind::Timeout, "get pod")),
        );
        let Body::Notice(notice) = view.render().body else {
            panic!("expected a notice");
        };
        assert_eq!(notice, "could not load pod default/api-0, r to retry");

        assert!(matches!(
            press(&mut view, Key::Char('r')),
            Effect::Task(Task::GetResource { .. })
        ));
        assert!(matches!(view.render().body, Body::Loading(_)));
    }

    #[test]
    fn logs_with_one_container_go_straight_to_viewer() {
        let mut view = loaded("po", &["app"]);
        let Effect::Emit(Message::NavigateTo(ViewId::LogViewer, params)) =
            press(&mut view, Key::Char('l'))
        else {
            panic!("expected log viewer navigation");
        };
        assert_eq!(params.get("container"), Some("app"));
        assert!(params.flag("follow"));
    }

    #[test]
    fn logs_with_many_containers_open_picker() {
        let mut view = loaded("po", &["app", "sidecar"]);
        let Effect::Emit(Message::NavigateTo(ViewId::ContainerPicker, params)) =
            press(&mut view, Key::Char('L'))
        else {
            panic!("expected container picker navigation");
        };
        assert_eq!(params.get("purpose"), Some("logs"));
        assert!(!params.flag("follow"));
    }

    #[test]
    fn describe_toggles_text_mode() {
        let mut view = loaded("po", &["app"]);
        let Effect::Task(Task::RunCommand(ExternalCommand::Describe { name, .. })) =
            press(&mut view, Key::Char('d'))
        else {
            panic!("expected describe command");
        };
        assert_eq!(name, "api-0");

        let _ = deliver(
            &mut view,
            Subject::Command,
            Ok(Outcome::CommandFinished {
                output: Some("Name: api-0\nStatus: Running\n".to_string()),
            }),
        );
        let Body::Text {
            lines, structured, ..
        } = view.render().body
        else {
            panic!("expected text");
        };
        assert_eq!(lines[0], "Name: api-0");
        assert!(!structured);

        assert!(press(&mut view, Key::Esc).is_none());
        assert!(matches!(
            view.render().body,
            Body::Text {
                structured: true,
                ..
            }
        ));
    }

    #[test]
    fn refresh_while_describing_refetches_and_redescribes() {
        let mut view = loaded("po", &["app"]);
        let _ = press(&mut view, Key::Char('d'));
        let _ = deliver(
            &mut view,
            Subject::Command,
            Ok(Outcome::CommandFinished {
                output: Some("Name: api-0\n".to_string()),
            }),
        );

        let Effect::Batch(effects) = press(&mut view, Key::Char('r')) else {
            panic!("expected a batch");
        };
        assert!(matches!(effects[0], Effect::Task(Task::GetResource { .. })));
        assert!(matches!(
            effects[1],
            Effect::Task(Task::RunCommand(ExternalCommand::Describe { .. }))
        ));
        assert!(matches!(
            view.render().body,
            Body::Text {
                structured: false,
                ..
            }
        ));

        let _ = deliver(
            &mut view,
            Subject::Command,
            Ok(Outcome::CommandFinished {
                output: Some("Name: api-0\nStatus: Pending\n".to_string()),
            }),
        );
        let Body::Text { lines, .. } = view.render().body else {
            panic!("expected text");
        };
        assert_eq!(lines[1], "Status: Pending");
    }

    #[test]
    fn kind_specific_actions_only_apply_to_their_kinds() {
        let mut pod = loaded("po", &["app"]);
        assert!(press(&mut pod, Key::Char('s')).is_none());
        assert!(press(&mut pod, Key::Char('e')).is_none());

        let mut config = loaded("cm", &[]);
        let Effect::Emit(Message::NavigateTo(ViewId::Form, params)) =
            press(&mut config, Key::Char('e'))
        else {
            panic!("expected form navigation");
        };
        assert_eq!(params.get("purpose"), Some("edit-data"));
        assert!(press(&mut config, Key::Char('l')).is_none());
    }

    #[test]
    fn delete_opens_confirmation_and_back_returns_to_list() {
        let mut view = loaded("po", &["app"]);
        let Effect::Emit(Message::NavigateTo(ViewId::ConfirmDialog, params)) =
            press(&mut view, Key::Char('D'))
        else {
            panic!("expected confirm dialog");
        };
        assert_eq!(params.get("action"), Some("delete"));

        let Effect::Emit(Message::NavigateTo(ViewId::ResourceList, params)) =
            press(&mut view, Key::Esc)
        else {
            panic!("expected list navigation");
        };
        assert_eq!(params.get("namespace"), Some("all"));
    }

    #[test]
    fn related_pods_use_workload_selector() {
        let mut view = DetailView::new(&params("deploy")).expect("valid params");
        let _ = view.init(&context());
        let _ = deliver(
            &mut view,
            Subject::Get,
            Ok(Outcome::Document(ResourceDocument {
                selector: Some("app=api".to_string()),
                yaml: "kind: Deployment".to_string(),
                ..ResourceDocument::default()
            })),
        );
        let Effect::Emit(Message::NavigateTo(ViewId::ResourceList, params)) =
            press(&mut view, Key::Char('p'))
        else {
            panic!("expected pod list navigation");
        };
        assert_eq!(params.get("kind"), Some("po"));
        assert_eq!(params.get("selector"), Some("app=api"));
    }

    #[test]
    fn external_edit_refetches_when_done() {
        let mut view = loaded("cm", &[]);
        assert!(matches!(
            press(&mut view, Key::Char('E')),
            Effect::Task(Task::RunCommand(ExternalCommand::Edit { .. }))
        ));
        assert!(matches!(
            deliver(
                &mut view,
                Subject::Command,
                Ok(Outcome::CommandFinished { output: None })
            ),
            Effect::Task(Task::GetResource { .. })
        ));
    }
}
