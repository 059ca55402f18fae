mod containers;
mod detail;
mod dialog;
mod form;
mod list;
mod logs;
mod menu;
mod namespaces;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::ViewConfig;
use crate::effect::Effect;
use crate::input::Key;
use crate::message::{Message, NavParams, ViewId};
use crate::model::{NamespaceScope, ResourceKind};

pub use containers::ContainerView;
pub use detail::DetailView;
pub use dialog::DialogView;
pub use form::FormView;
pub use list::ListView;
pub use logs::LogView;
pub use menu::MenuView;
pub use namespaces::NamespaceView;

pub trait ViewModel {
    fn init(&mut self, ctx: &ViewContext) -> Effect;
    fn handle(&mut self, message: Message) -> Effect;
    fn render(&self) -> Screen;
}

#[derive(Debug, Clone)]
pub struct ViewContext {
    pub config: Arc<ViewConfig>,
    pub cancel: CancellationToken,
    pub viewport: (u16, u16),
}

impl ViewContext {
    pub fn body_rows(&self) -> usize {
        body_rows(self.viewport.1)
    }
}

pub fn body_rows(terminal_height: u16) -> usize {
    terminal_height.saturating_sub(4).max(1) as usize
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Screen {
    pub title: String,
    pub body: Body,
    pub error: Option<String>,
    pub status: Option<String>,
    pub hints: Vec<(&'static str, &'static str)>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Body {
    Menu {
        items: Vec<String>,
        selected: Option<usize>,
    },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        selected: Option<usize>,
    },
    Text {
        lines: Vec<String>,
        offset: usize,
        total: usize,
        structured: bool,
    },
    Form {
        fields: Vec<FieldLine>,
        focused: usize,
    },
    Dialog {
        prompt: String,
        options: Vec<String>,
        highlighted: usize,
    },
    Loading(String),
    Notice(String),
}

impl Default for Body {
    fn default() -> Self {
        Self::Loading("loading…".to_string())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FieldLine {
    pub label: String,
    pub value: String,
    pub cursor: usize,
    pub error: Option<String>,
}

impl Screen {
    pub fn new(title: impl Into<String>, body: Body) -> Self {
        Self {
            title: title.into(),
            body,
            ..Self::default()
        }
    }

    pub fn with_error(mut self, error: Option<&str>) -> Self {
        self.error = error.map(str::to_string);
        self
    }

    pub fn with_status(mut self, status: Option<String>) -> Self {
        self.status = status;
        self
    }

    pub fn with_hints(mut self, hints: &[(&'static str, &'static str)]) -> Self {
        self.hints = hints.to_vec();
        self
    }

    #[cfg(test)]
    pub fn plain_text(&self) -> String {
        let mut out = vec![self.title.clone()];
        match &self.body {
            Body::Menu { items, selected } => {
                for (index, item) in items.iter().enumerate() {
                    let marker = if Some(index) == *selected { ">" } else { " " };
                    out.push(format!("{marker} {item}"));
                }
            }
            Body::Table {
                headers,
                rows,
                selected,
            } => {
                out.push(format!("  {}", headers.join(" | ")));
                for (index, row) in rows.iter().enumerate() {
                    let marker = if Some(index) == *selected { ">" } else { " " };
                    out.push(format!("{marker} {}", row.join(" | ")));
                }
            }
            Body::Text { lines, .. } => out.extend(lines.iter().cloned()),
            Body::Form { fields, focused } => {
                for (index, field) in fields.iter().enumerate() {
                    let marker = if index == *focused { ">" } else { " " };
                    out.push(format!("{marker} {}: {}", field.label, field.value));
                    if let Some(error) = &field.error {
                        out.push(format!("    ! {error}"));
                    }
                }
            }
            Body::Dialog {
                prompt,
                options,
                highlighted,
            } => {
                out.push(prompt.clone());
                let options = options
                    .iter()
                    .enumerate()
                    .map(|(index, option)| {
                        if index == *highlighted {
                            format!("[{option}]")
                        } else {
                            option.clone()
                        }
                    })
                    .collect::<Vec<_>>();
                out.push(options.join("  "));
            }
            Body::Loading(text) | Body::Notice(text) => out.push(text.clone()),
        }
        if let Some(error) = &self.error {
            out.push(format!("error: {error}"));
        }
        if let Some(status) = &self.status {
            out.push(status.clone());
        }
        out.join("\n")
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Target {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
    pub scope: NamespaceScope,
    pub list_selector: Option<String>,
}

impl Target {
    pub fn from_params(params: &NavParams) -> Result<Self, String> {
        let kind = params.kind()?;
        let namespace = params.require("namespace")?.to_string();
        let name = params.require("name")?.to_string();
        let scope = params
            .get("scope")
            .map(NamespaceScope::from_param)
            .unwrap_or_else(|| NamespaceScope::Named(namespace.clone()));
        Ok(Self {
            kind,
            namespace,
            name,
            scope,
            list_selector: params.get("list_selector").map(str::to_string),
        })
    }

    pub fn params(&self) -> NavParams {
        NavParams::new()
            .with("kind", self.kind.short_token())
            .with("namespace", self.namespace.as_str())
            .with("name", self.name.as_str())
            .with("scope", self.scope.label())
            .with_opt("list_selector", self.list_selector.as_deref())
    }

    pub fn qualified(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn describe(&self) -> String {
        format!("{} {}", self.kind.kubectl_resource(), self.qualified())
    }

    pub fn back_to_detail(&self, flash: Option<String>) -> Effect {
        Effect::navigate(
            ViewId::ResourceDetail,
            self.params().with_opt("flash", flash),
        )
    }

    pub fn back_to_list(&self, flash: Option<String>) -> Effect {
        Effect::navigate(
            ViewId::ResourceList,
            NavParams::new()
                .with("kind", self.kind.short_token())
                .with("namespace", self.scope.label())
                .with_opt("selector", self.list_selector.as_deref())
                .with_opt("flash", flash),
        )
    }
}

pub enum View {
    MainMenu(MenuView),
    NamespacePicker(NamespaceView),
    ResourceList(ListView),
    ResourceDetail(DetailView),
    ContainerPicker(ContainerView),
    LogViewer(LogView),
    ConfirmDialog(DialogView),
    Form(FormView),
    Broken(BrokenView),
}

impl View {
    pub fn build(id: ViewId, params: NavParams) -> Self {
        let built = match id {
            ViewId::MainMenu => Ok(Self::MainMenu(MenuView::new(&params))),
            ViewId::NamespacePicker => Ok(Self::NamespacePicker(NamespaceView::new(&params))),
            ViewId::ResourceList => ListView::new(&params).map(Self::ResourceList),
            ViewId::ResourceDetail => DetailView::new(&params).map(Self::ResourceDetail),
            ViewId::ContainerPicker => ContainerView::new(&params).map(Self::ContainerPicker),
            ViewId::LogViewer => LogView::new(&params).map(Self::LogViewer),
            ViewId::ConfirmDialog => DialogView::new(&params).map(Self::ConfirmDialog),
            ViewId::Form => FormView::from_params(&params).map(Self::Form),
        };

        built.unwrap_or_else(|message| {
            warn!("cannot open {} view: {message}", id.title());
            Self::Broken(BrokenView::new(id, message))
        })
    }

    fn inner(&self) -> &dyn ViewModel {
        match self {
            Self::MainMenu(view) => view,
            Self::NamespacePicker(view) => view,
            Self::ResourceList(view) => view,
            Self::ResourceDetail(view) => view,
            Self::ContainerPicker(view) => view,
            Self::LogViewer(view) => view,
            Self::ConfirmDialog(view) => view,
            Self::Form(view) => view,
            Self::Broken(view) => view,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ViewModel {
        match self {
            Self::MainMenu(view) => view,
            Self::NamespacePicker(view) => view,
            Self::ResourceList(view) => view,
            Self::ResourceDetail(view) => view,
            Self::ContainerPicker(view) => view,
            Self::LogViewer(view) => view,
            Self::ConfirmDialog(view) => view,
            Self::Form(view) => view,
            Self::Broken(view) => view,
        }
    }

    #[cfg(test)]
    pub fn is_broken(&self) -> bool {
        matches!(self, Self::Broken(_))
    }
}

impl ViewModel for View {
    fn init(&mut self, ctx: &ViewContext) -> Effect {
        self.inner_mut().init(ctx)
    }

    fn handle(&mut self, message: Message) -> Effect {
        self.inner_mut().handle(message)
    }

    fn render(&self) -> Screen {
        self.inner().render()
    }
}

pub struct BrokenView {
    id: ViewId,
    message: String,
}

impl BrokenView {
    fn new(id: ViewId, message: String) -> Self {
        Self { id, message }
    }
}

impl ViewModel for BrokenView {
    fn init(&mut self, _ctx: &ViewContext) -> Effect {
        Effect::None
    }

    fn handle(&mut self, message: Message) -> Effect {
        match message {
            Message::Key(key) if key.is_back() || key == Key::Enter => {
                Effect::navigate(ViewId::MainMenu, NavParams::new())
            }
            _ => Effect::None,
        }
    }

    fn render(&self) -> Screen {
        Screen::new(
            self.id.title(),
            Body::Notice(format!("cannot open {} view", self.id.title())),
        )
        .with_error(Some(&self.message))
        .with_hints(&[("esc", "main menu")])
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{ViewContext, ViewModel};
    use crate::config::ViewConfig;
    use crate::effect::Effect;
    use crate::input::Key;
    use crate::message::{AsyncResult, Message, Outcome, Subject, TaskError, ViewToken};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    pub fn context() -> ViewContext {
        ViewContext {
            config: Arc::new(ViewConfig::default()),
            cancel: CancellationToken::new(),
            viewport: (120, 40),
        }
    }

    pub fn press(view: &mut impl ViewModel, key: Key) -> Effect {
        view.handle(Message::Key(key))
    }

    pub fn type_text(view: &mut impl ViewModel, text: &str) {
        for ch in text.chars() {
            let _ = view.handle(Message::Key(Key::Char(ch)));
        }
    }

    pub fn deliver(
        view: &mut impl ViewModel,
        subject: Subject,
        result: Result<Outcome, TaskError>,
    ) -> Effect {
        view.handle(Message::AsyncResult(AsyncResult {
            origin: ViewToken(1),
            subject,
            result,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::{Body, Target, View, ViewModel};
    use crate::effect::Effect;
    use crate::input::Key;
    use crate::message::{Message, NavParams, ViewId};
    use crate::model::{NamespaceScope, ResourceKind};

    #[test]
    fn missing_params_build_an_error_view() {
        let mut view = View::build(ViewId::ResourceDetail, NavParams::new().with("kind", "po"));
        assert!(view.is_broken());
        let screen = view.render();
        assert!(screen.error.unwrap_or_default().contains("namespace"));

        let effect = view.handle(Message::Key(Key::Esc));
        assert!(matches!(
            effect,
            Effect::Emit(Message::NavigateTo(ViewId::MainMenu, _))
        ));
    }

    #[test]
    fn unknown_kind_builds_an_error_view() {
        let view = View::build(ViewId::ResourceList, NavParams::new().with("kind", "gadgets"));
        assert!(view.is_broken());
        assert!(matches!(view.render().body, Body::Notice(_)));
    }

    #[test]
    fn target_round_trips_through_params() {
        let target = Target {
            kind: ResourceKind::ConfigMaps,
            namespace: "payments".to_string(),
            name: "settings".to_string(),
            scope: NamespaceScope::All,
            list_selector: Some("app=api".to_string()),
        };
        assert_eq!(Target::from_params(&target.params()), Ok(target));
    }
}
