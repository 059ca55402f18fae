use chrono::{DateTime, Local};
use std::time::Duration;
use tracing::debug;

use super::{Body, Screen, Target, ViewContext, ViewModel};
use crate::config::ViewConfig;
use crate::effect::{Effect, Task};
use crate::input::Key;
use crate::message::{AsyncResult, Message, NavParams, Outcome, Subject, ViewId};
use crate::model::{NamespaceScope, ResourceKind, ResourceRow, ResourceTable};
use crate::widgets::{SelectItem, SelectionWidget};

pub struct ListView {
    kind: ResourceKind,
    requested_scope: Option<NamespaceScope>,
    requested_selector: Option<String>,
    scope: NamespaceScope,
    selector: Option<String>,
    refresh_interval: Duration,
    headers: Vec<String>,
    rows: Vec<ResourceRow>,
    visible: SelectionWidget<ResourceRow>,
    filter: String,
    filtering: bool,
    loading: bool,
    loaded: bool,
    refreshed_at: Option<DateTime<Local>>,
    error: Option<String>,
    flash: Option<String>,
}

impl ListView {
    pub fn new(params: &NavParams) -> Result<Self, String> {
        let kind = params.kind()?;
        Ok(Self {
            kind,
            requested_scope: params.get("namespace").map(NamespaceScope::from_param),
            requested_selector: params.get("selector").map(str::to_string),
            scope: NamespaceScope::All,
            selector: None,
            refresh_interval: ViewConfig::default().refresh_interval,
            headers: Vec::new(),
            rows: Vec::new(),
            visible: SelectionWidget::default(),
            filter: String::new(),
            filtering: false,
            loading: false,
            loaded: false,
            refreshed_at: None,
            error: None,
            flash: params.get("flash").map(str::to_string),
        })
    }

    fn fetch(&mut self) -> Effect {
        self.loading = true;
        self.refreshed_at = None;
        Effect::task(Task::ListResources {
            kind: self.kind,
            scope: self.scope.clone(),
            selector: self.selector.clone(),
        })
    }

    fn apply(&mut self, table: ResourceTable) {
        self.headers = table.headers;
        self.rows = table.rows;
        self.loaded = true;
        self.error = None;
        self.rebuild();
    }

    fn rebuild(&mut self) {
        let items = self
            .rows
            .iter()
            .filter(|row| row.matches_filter(&self.filter))
            .map(|row| SelectItem::new(row.name.clone(), row.clone()))
            .collect();
        self.visible
            .set_items_keeping(items, |left, right| left.same_identity(right));
    }

    fn open_selected(&self) -> Effect {
        let Some(row) = self.visible.selected_value() else {
            return Effect::None;
        };
        let namespace = row
            .namespace
            .clone()
            .or_else(|| self.scope.named().map(str::to_string))
            .unwrap_or_default();
        let target = Target {
            kind: self.kind,
            namespace,
            name: row.name.clone(),
            scope: self.scope.clone(),
            list_selector: self.selector.clone(),
        };
        Effect::navigate(ViewId::ResourceDetail, target.params())
    }

    fn handle_filter_key(&mut self, key: Key) -> Effect {
        match key {
            Key::Enter => self.filtering = false,
            Key::Esc => {
                self.filtering = false;
                self.filter.clear();
                self.rebuild();
            }
            Key::Backspace => {
                self.filter.pop();
                self.rebuild();
            }
            Key::Char(ch) => {
                self.filter.push(ch);
                self.rebuild();
            }
            Key::Up | Key::Down | Key::PageUp | Key::PageDown => {
                self.visible.handle_key(key);
            }
            _ => {}
        }
        Effect::None
    }

    fn on_tick(&mut self, now: DateTime<Local>) -> Effect {
        if self.loading {
            return Effect::None;
        }
        let Some(refreshed_at) = self.refreshed_at else {
            self.refreshed_at = Some(now);
            return Effect::None;
        };
        let elapsed = (now - refreshed_at).to_std().unwrap_or_default();
        if elapsed < self.refresh_interval {
            return Effect::None;
        }
        debug!("auto-refreshing {} after {:?}", self.kind, elapsed);
        self.fetch()
    }

    fn status_line(&self) -> String {
        let mut status = format!("{} in {}", self.kind, self.scope);
        if let Some(selector) = &self.selector {
            status.push_str(&format!(" [{selector}]"));
        }
        if self.filter.is_empty() {
            status.push_str(&format!("  {} items", self.rows.len()));
        } else {
            status.push_str(&format!(
                "  {}/{} items  filter: {}",
                self.visible.len(),
                self.rows.len(),
                self.filter
            ));
        }
        if self.filtering {
            status.push('_');
        }
        if self.loading {
            status.push_str("  refreshing…");
        }
        if let Some(flash) = &self.flash {
            status.push_str(&format!("  {flash}"));
        }
        status
    }
}

impl ViewModel for ListView {
    fn init(&mut self, ctx: &ViewContext) -> Effect {
        self.scope = self
            .requested_scope
            .clone()
            .unwrap_or_else(|| ctx.config.scope.clone());
        self.selector = self
            .requested_selector
            .clone()
            .or_else(|| ctx.config.selector.clone());
        self.refresh_interval = ctx.config.refresh_interval;
        self.visible.set_page(ctx.body_rows().saturating_sub(1));
        self.fetch()
    }

    fn handle(&mut self, message: Message) -> Effect {
        match message {
            Message::AsyncResult(AsyncResult {
                subject: Subject::List,
                result,
                ..
            }) => {
                self.loading = false;
                match result {
                    Ok(Outcome::Table(table)) => self.apply(table),
                    Ok(_) => {}
                    Err(error) => self.error = Some(error.to_string()),
                }
                Effect::None
            }
            Message::Tick(now) => self.on_tick(now),
            Message::Resize { height, .. } => {
                self.visible
                    .set_page(super::body_rows(height).saturating_sub(1));
                Effect::None
            }
            Message::Key(key) if self.filtering => self.handle_filter_key(key),
            Message::Key(key) if key.is_activate() => self.open_selected(),
            Message::Key(Key::Char('/')) => {
                self.filtering = true;
                Effect::None
            }
            Message::Key(Key::Char('r')) if !self.loading => {
                self.flash = None;
                self.fetch()
            }
            Message::Key(Key::Esc) if !self.filter.is_empty() => {
                self.filter.clear();
                self.rebuild();
                Effect::None
            }
            Message::Key(key) if key.is_back() => Effect::navigate(
                ViewId::MainMenu,
                NavParams::new()
                    .with("namespace", self.scope.label())
                    .with_opt("selector", self.selector.as_deref()),
            ),
            Message::Key(key) => {
                self.visible.handle_key(key);
                Effect::None
            }
            _ => Effect::None,
        }
    }

    fn render(&self) -> Screen {
        let body = if !self.loaded && self.loading {
            Body::Loading(format!("loading {} in {}…", self.kind, self.scope))
        } else if self.loaded && self.rows.is_empty() {
            Body::Notice(format!("no {} found in {}", self.kind, self.scope))
        } else {
            Body::Table {
                headers: self.headers.clone(),
                rows: self
                    .visible
                    .items()
                    .iter()
                    .map(|item| item.value.columns.clone())
                    .collect(),
                selected: self.visible.selected_index(),
            }
        };

        let hints: &[(&'static str, &'static str)] = if self.filtering {
            &[("enter", "keep filter"), ("esc", "clear filter")]
        } else {
            &[
                ("enter", "open"),
                ("/", "filter"),
                ("r", "refresh"),
                ("esc", "back"),
            ]
        };

        Screen::new(self.kind.title(), body)
            .with_error(self.error.as_deref())
            .with_status(Some(self.status_line()))
            .with_hints(hints)
    }
}
