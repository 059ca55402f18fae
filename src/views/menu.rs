use std::sync::Arc;

use super::{Body, Screen, ViewContext, ViewModel};
use crate::config::ViewConfig;
use crate::effect::Effect;
use crate::message::{Message, NavParams, ViewId};
use crate::model::{NamespaceScope, ResourceKind};
use crate::widgets::{SelectItem, SelectionWidget};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum MenuEntry {
    Kind(ResourceKind),
    Namespaces,
}

pub struct MenuView {
    requested_scope: Option<NamespaceScope>,
    selector: Option<String>,
    scope: NamespaceScope,
    menu: SelectionWidget<MenuEntry>,
    config: Option<Arc<ViewConfig>>,
}

impl MenuView {
    pub fn new(params: &NavParams) -> Self {
        let mut items = ResourceKind::ALL
            .iter()
            .map(|kind| SelectItem::new(kind.title(), MenuEntry::Kind(*kind)))
            .collect::<Vec<_>>();
        items.push(SelectItem::new("Switch namespace…", MenuEntry::Namespaces));

        Self {
            requested_scope: params.get("namespace").map(NamespaceScope::from_param),
            selector: params.get("selector").map(str::to_string),
            scope: NamespaceScope::All,
            menu: SelectionWidget::new(items),
            config: None,
        }
    }

    fn activate(&self) -> Effect {
        match self.menu.selected_value() {
            Some(MenuEntry::Kind(kind)) => Effect::navigate(
                ViewId::ResourceList,
                NavParams::new()
                    .with("kind", kind.short_token())
                    .with("namespace", self.scope.label())
                    .with_opt("selector", self.selector.as_deref()),
            ),
            Some(MenuEntry::Namespaces) => Effect::navigate(
                ViewId::NamespacePicker,
                NavParams::new()
                    .with("namespace", self.scope.label())
                    .with_opt("selector", self.selector.as_deref()),
            ),
            None => Effect::None,
        }
    }
}

impl ViewModel for MenuView {
    fn init(&mut self, ctx: &ViewContext) -> Effect {
        self.scope = self
            .requested_scope
            .clone()
            .unwrap_or_else(|| ctx.config.scope.clone());
        if self.selector.is_none() {
            self.selector = ctx.config.selector.clone();
        }
        self.menu.set_page(ctx.body_rows());
        self.config = Some(ctx.config.clone());
        Effect::None
    }

    fn handle(&mut self, message: Message) -> Effect {
        let Message::Key(key) = message else {
            return Effect::None;
        };

        if key.is_activate() {
            return self.activate();
        }
        if key.is_back() {
            return Effect::Emit(Message::Quit);
        }
        if key == crate::input::Key::Char('n') {
            return Effect::navigate(
                ViewId::NamespacePicker,
                NavParams::new().with("namespace", self.scope.label()),
            );
        }
        self.menu.handle_key(key);
        Effect::None
    }

    fn render(&self) -> Screen {
        let context = self
            .config
            .as_ref()
            .map(|config| config.identity.context.clone())
            .unwrap_or_default();
        let mut status = format!("namespace: {}", self.scope);
        if let Some(selector) = &self.selector {
            status.push_str(&format!("  selector: {selector}"));
        }
        if !context.is_empty() {
            status.push_str(&format!("  context: {context}"));
        }

        Screen::new(
            "Resources",
            Body::Menu {
                items: self.menu.labels(),
                selected: self.menu.selected_index(),
            },
        )
        .with_status(Some(status))
        .with_hints(&[
            ("enter", "open"),
            ("n", "namespace"),
            ("j/k", "move"),
            ("q", "quit"),
        ])
    }
}
