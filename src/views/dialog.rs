use super::{Body, Screen, Target, ViewContext, ViewModel};
use crate::effect::{Effect, Task};
use crate::input::Key;
use crate::message::{AsyncResult, Message, NavParams, Subject};
use crate::model::ResourceChange;

const OPTIONS: [&str; 2] = ["Cancel", "Confirm"];
const CONFIRM: usize = 1;

#[derive(Debug, Clone, Eq, PartialEq)]
enum Action {
    Delete,
    Restart,
    RemoveData { key: String },
}

pub struct DialogView {
    target: Target,
    action: Action,
    grace_period_secs: u32,
    highlighted: usize,
    pending: bool,
    error: Option<String>,
}

impl DialogView {
    pub fn new(params: &NavParams) -> Result<Self, String> {
        let target = Target::from_params(params)?;
        let action = match params.require("action")? {
            "delete" => Action::Delete,
            "restart" if target.kind.is_scalable() => Action::Restart,
            "remove-data" if target.kind.has_data() => Action::RemoveData {
                key: params.require("key")?.to_string(),
            },
            other => {
                return Err(format!(
                    "action '{other}' is not available for {}",
                    target.describe()
                ));
            }
        };
        Ok(Self {
            target,
            action,
            grace_period_secs: 0,
            highlighted: 0,
            pending: false,
            error: None,
        })
    }

    fn prompt(&self) -> String {
        match &self.action {
            Action::Delete => format!("Delete {}?", self.target.describe()),
            Action::Restart => format!("Restart {}?", self.target.describe()),
            Action::RemoveData { key } => {
                format!("Remove key '{key}' from {}?", self.target.describe())
            }
        }
    }

    fn move_highlight(&mut self, delta: isize) {
        self.highlighted = self
            .highlighted
            .saturating_add_signed(delta)
            .min(OPTIONS.len() - 1);
    }

    fn confirm(&mut self) -> Effect {
        self.pending = true;
        self.error = None;
        let target = &self.target;
        match &self.action {
            Action::Delete => Effect::sequence([
                Effect::task(Task::DeleteResource {
                    kind: target.kind,
                    namespace: Some(target.namespace.clone()),
                    name: target.name.clone(),
                    grace_period_secs: self.grace_period_secs,
                }),
                target.back_to_list(Some(format!("deleted {}", target.describe()))),
            ]),
            Action::Restart => self.update(ResourceChange::Restart),
            Action::RemoveData { key } => self.update(ResourceChange::RemoveData { key: key.clone() }),
        }
    }

    fn update(&self, change: ResourceChange) -> Effect {
        let flash = format!("{} on {}", change.describe(), self.target.describe());
        Effect::sequence([
            Effect::task(Task::UpdateResource {
                kind: self.target.kind,
                namespace: self.target.namespace.clone(),
                name: self.target.name.clone(),
                change,
            }),
            self.target.back_to_detail(Some(flash)),
        ])
    }

    fn cancel(&self) -> Effect {
        self.target.back_to_detail(None)
    }
}

impl ViewModel for DialogView {
    fn init(&mut self, ctx: &ViewContext) -> Effect {
        self.grace_period_secs = ctx.config.delete_grace_period_secs;
        Effect::None
    }

    fn handle(&mut self, message: Message) -> Effect {
        match message {
            Message::AsyncResult(AsyncResult {
                subject: Subject::Delete | Subject::Update,
                result: Err(error),
                ..
            }) => {
                self.pending = false;
                self.error = Some(error.to_string());
                Effect::None
            }
            Message::Key(_) if self.pending => Effect::None,
            Message::Key(key) => match key {
                Key::Left | Key::Up | Key::BackTab | Key::Char('h') => {
                    self.move_highlight(-1);
                    Effect::None
                }
                Key::Right | Key::Down | Key::Tab | Key::Char('l') => {
                    self.move_highlight(1);
                    Effect::None
                }
                Key::Enter if self.highlighted == CONFIRM => self.confirm(),
                Key::Enter | Key::Char('n') => self.cancel(),
                Key::Char('y') => self.confirm(),
                key if key.is_back() => self.cancel(),
                _ => Effect::None,
            },
            _ => Effect::None,
        }
    }

    fn render(&self) -> Screen {
        let status = self.pending.then(|| "waiting for the cluster…".to_string());
        Screen::new(
            "Confirm",
            Body::Dialog {
                prompt: self.prompt(),
                options: OPTIONS.iter().map(|option| option.to_string()).collect(),
                highlighted: self.highlighted,
            },
        )
        .with_error(self.error.as_deref())
        .with_status(status)
        .with_hints(&[("←/→", "choose"), ("y", "confirm"), ("n/esc", "cancel")])
    }
}

#[cfg(test)]
mod tests {
    use super::DialogView;
    use crate::effect::{Effect, Task};
    use crate::input::Key;
    use crate::message::{FailureKind, Message, NavParams, Subject, TaskError, ViewId};
    use crate::model::ResourceChange;
    use crate::views::testing::{context, deliver, press};
    use crate::views::{Body, ViewModel};

    fn dialog(kind: &str, action: &str) -> DialogView {
        let params = NavParams::new()
            .with("kind", kind)
            .with("namespace", "default")
            .with("name", "api")
            .with("action", action)
            .with("key", "LOG_LEVEL");
        let mut view = DialogView::new(&params).expect("valid params");
        let _ = view.init(&context());
        view
    }

    #[test]
    fn highlight_starts_on_cancel_and_clamps() {
        let mut view = dialog("po", "delete");
        let _ = press(&mut view, Key::Left);
        let Body::Dialog { highlighted, .. } = view.render().body else {
            panic!("expected dialog body");
        };
        assert_eq!(highlighted, 0);

        let _ = press(&mut view, Key::Right);
        let _ = press(&mut view, Key::Right);
        let Body::Dialog { highlighted, .. } = view.render().body else {
            panic!("expected dialog body");
        };
        assert_eq!(highlighted, 1);
    }

    #[test]
    fn enter_on_cancel_goes_back_to_detail() {
        let mut view = dialog("po", "delete");
        assert!(matches!(
            press(&mut view, Key::Enter),
            Effect::Emit(Message::NavigateTo(ViewId::ResourceDetail, _))
        ));
    }

    #[test]
    fn confirmed_delete_awaits_remote_call_before_navigating() {
        let mut view = dialog("po", "delete");
        let _ = press(&mut view, Key::Right);
        let Effect::Sequence(steps) = press(&mut view, Key::Enter) else {
            panic!("expected a delete sequence");
        };
        assert!(matches!(
            &steps[0],
            Effect::Task(Task::DeleteResource {
                grace_period_secs: 30,
                ..
            })
        ));
        let Effect::Emit(Message::NavigateTo(ViewId::ResourceList, params)) = &steps[1] else {
            panic!("expected list navigation");
        };
        assert_eq!(params.get("flash"), Some("deleted pod default/api"));
        assert!(press(&mut view, Key::Esc).is_none());
    }

    #[test]
    fn failed_operation_clears_pending_and_shows_error() {
        let mut view = dialog("deploy", "restart");
        let Effect::Sequence(steps) = press(&mut view, Key::Char('y')) else {
            panic!("expected a restart sequence");
        };
        assert!(matches!(
            &steps[0],
            Effect::Task(Task::UpdateResource {
                change: ResourceChange::Restart,
                ..
            })
        ));

        let _ = deliver(
            &mut view,
            Subject::Update,
            Err(TaskError::new(FailureKind::Remote, "forbidden")),
        );
        assert_eq!(view.render().error.as_deref(), Some("forbidden"));
        assert!(matches!(
            press(&mut view, Key::Char('n')),
            Effect::Emit(Message::NavigateTo(ViewId::ResourceDetail, _))
        ));
    }

    #[test]
    fn remove_data_needs_a_data_kind() {
        let view = dialog("cm", "remove-data");
        assert!(view.render().plain_text().contains("LOG_LEVEL"));
        let params = NavParams::new()
            .with("kind", "po")
            .with("namespace", "default")
            .with("name", "api")
            .with("action", "remove-data")
            .with("key", "X");
        assert!(DialogView::new(&params).is_err());
    }
}
