use super::{Body, Screen, ViewContext, ViewModel};
use crate::effect::{Effect, Task};
use crate::input::Key;
use crate::message::{AsyncResult, Message, NavParams, Outcome, Subject, ViewId};
use crate::model::NamespaceScope;
use crate::widgets::{SelectItem, SelectionWidget};

pub struct NamespaceView {
    current: Option<NamespaceScope>,
    selector: Option<String>,
    picker: SelectionWidget<NamespaceScope>,
    loading: bool,
    error: Option<String>,
}

impl NamespaceView {
    pub fn new(params: &NavParams) -> Self {
        Self {
            current: params.get("namespace").map(NamespaceScope::from_param),
            selector: params.get("selector").map(str::to_string),
            picker: SelectionWidget::default(),
            loading: false,
            error: None,
        }
    }

    fn fetch(&mut self) -> Effect {
        self.loading = true;
        self.error = None;
        Effect::task(Task::ListNamespaces)
    }

    fn back(&self, scope: Option<&NamespaceScope>) -> Effect {
        Effect::navigate(
            ViewId::MainMenu,
            NavParams::new()
                .with_opt("namespace", scope.map(NamespaceScope::label))
                .with_opt("selector", self.selector.as_deref()),
        )
    }

    fn apply(&mut self, names: Vec<String>) {
        let mut items = vec![SelectItem::new("all namespaces", NamespaceScope::All)];
        items.extend(
            names
                .into_iter()
                .map(|name| SelectItem::new(name.clone(), NamespaceScope::Named(name))),
        );
        let current = self
            .current
            .as_ref()
            .and_then(|current| items.iter().position(|item| &item.value == current));
        self.picker.set_items(items);
        if let Some(index) = current {
            self.picker.select(index);
        }
    }
}

impl ViewModel for NamespaceView {
    fn init(&mut self, ctx: &ViewContext) -> Effect {
        if self.current.is_none() {
            self.current = Some(ctx.config.scope.clone());
        }
        self.picker.set_page(ctx.body_rows());
        self.fetch()
    }

    fn handle(&mut self, message: Message) -> Effect {
        match message {
            Message::AsyncResult(AsyncResult {
                subject: Subject::Namespaces,
                result,
                ..
            }) => {
                self.loading = false;
                match result {
                    Ok(Outcome::Namespaces(names)) => self.apply(names),
                    Ok(_) => {}
                    Err(error) => self.error = Some(error.to_string()),
                }
                Effect::None
            }
            Message::Key(key) if key.is_activate() => match self.picker.selected_value() {
                Some(scope) => self.back(Some(scope)),
                None => Effect::None,
            },
            Message::Key(key) if key.is_back() => self.back(self.current.as_ref()),
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
            Body::Loading("loading namespaces…".to_string())
        } else {
            Body::Menu {
                items: self.picker.labels(),
                selected: self.picker.selected_index(),
            }
        };
        let status = self
            .current
            .as_ref()
            .map(|current| format!("current: {current}"));

        Screen::new("Namespaces", body)
            .with_error(self.error.as_deref())
            .with_status(status)
            .with_hints(&[("enter", "select"), ("r", "retry"), ("esc", "back")])
    }
}

#[cfg(test)]
mod tests {
    use super::NamespaceView;
    use crate::effect::{Effect, Task};
    use crate::input::Key;
    use crate::message::{FailureKind, Message, NavParams, Outcome, Subject, TaskError, ViewId};
    use crate::views::ViewModel;
    use crate::views::testing::{context, deliver, press};

    #[test]
    fn picker_starts_on_current_namespace_and_returns_choice() {
        let mut view = NamespaceView::new(&NavParams::new().with("namespace", "kube-system"));
        assert!(matches!(
            view.init(&context()),
            Effect::Task(Task::ListNamespaces)
        ));

        let _ = deliver(
            &mut view,
            Subject::Namespaces,
            Ok(Outcome::Namespaces(vec![
                "default".to_string(),
                "kube-system".to_string(),
            ])),
        );
        let _ = press(&mut view, Key::Down);

        let Effect::Emit(Message::NavigateTo(ViewId::MainMenu, params)) =
            press(&mut view, Key::Enter)
        else {
            panic!("expected navigation back to the menu");
        };
        assert_eq!(params.get("namespace"), Some("kube-system"));
    }

    #[test]
    fn first_entry_selects_all_namespaces() {
        let mut view = NamespaceView::new(&NavParams::new());
        let _ = view.init(&context());
        let _ = deliver(
            &mut view,
            Subject::Namespaces,
            Ok(Outcome::Namespaces(vec!["default".to_string()])),
        );
        let _ = press(&mut view, Key::Home);
        let Effect::Emit(Message::NavigateTo(_, params)) = press(&mut view, Key::Enter) else {
            panic!("expected navigation");
        };
        assert_eq!(params.get("namespace"), Some("all"));
    }

    #[test]
    fn failure_renders_inline_and_r_retries() {
        let mut view = NamespaceView::new(&NavParams::new());
        let _ = view.init(&context());
        let _ = deliver(
            &mut view,
            Subject::Namespaces,
            Err(TaskError::new(FailureKind::Timeout, "list namespaces")),
        );
        let screen = view.render();
        assert_eq!(screen.error.as_deref(), Some("timed out: list namespaces"));

        assert!(matches!(
            press(&mut view, Key::Char('r')),
            Effect::Task(Task::ListNamespaces)
        ));
    }
}
