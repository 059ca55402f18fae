use crate::input::{Key, selection_step};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SelectItem<T> {
    pub label: String,
    pub value: T,
}

impl<T> SelectItem<T> {
    pub fn new(label: impl Into<String>, value: T) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectionWidget<T> {
    items: Vec<SelectItem<T>>,
    selected: usize,
    page: usize,
}

impl<T> Default for SelectionWidget<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            selected: 0,
            page: 10,
        }
    }
}

impl<T> SelectionWidget<T> {
    pub fn new(items: Vec<SelectItem<T>>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn set_items(&mut self, items: Vec<SelectItem<T>>) {
        self.items = items;
        self.clamp();
    }

    pub fn set_items_keeping(
        &mut self,
        items: Vec<SelectItem<T>>,
        same: impl Fn(&T, &T) -> bool,
    ) {
        let position = self.selected().and_then(|current| {
            items
                .iter()
                .position(|candidate| same(&current.value, &candidate.value))
        });
        self.items = items;
        match position {
            Some(index) => self.selected = index,
            None => self.clamp(),
        }
    }

    pub fn items(&self) -> &[SelectItem<T>] {
        &self.items
    }

    pub fn labels(&self) -> Vec<String> {
        self.items.iter().map(|item| item.label.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn selected_index(&self) -> Option<usize> {
        (!self.items.is_empty()).then_some(self.selected)
    }

    pub fn selected(&self) -> Option<&SelectItem<T>> {
        self.items.get(self.selected)
    }

    pub fn selected_value(&self) -> Option<&T> {
        self.selected().map(|item| &item.value)
    }

    pub fn select(&mut self, index: usize) {
        self.selected = index;
        self.clamp();
    }

    pub fn move_by(&mut self, delta: isize) {
        if self.items.is_empty() {
            self.selected = 0;
            return;
        }
        let last = self.items.len() - 1;
        self.selected = self.selected.saturating_add_signed(delta).min(last);
    }

    pub fn first(&mut self) {
        self.selected = 0;
    }

    pub fn last(&mut self) {
        self.selected = self.items.len().saturating_sub(1);
    }

    pub fn handle_key(&mut self, key: Key) -> bool {
        if let Some(delta) = selection_step(key, self.page) {
            self.move_by(delta);
            return true;
        }
        match key {
            Key::Home | Key::Char('g') => {
                self.first();
                true
            }
            Key::End | Key::Char('G') => {
                self.last();
                true
            }
            _ => false,
        }
    }

    fn clamp(&mut self) {
        self.selected = self.selected.min(self.items.len().saturating_sub(1));
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct TextViewport {
    offset: usize,
    height: usize,
}

impl TextViewport {
    pub fn new(height: usize) -> Self {
        Self {
            offset: 0,
            height: height.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn height(&self) -> usize {
        self.height.max(1)
    }

    pub fn resize(&mut self, height: usize, total: usize) {
        self.height = height.max(1);
        self.offset = self.offset.min(self.max_offset(total));
    }

    pub fn scroll_by(&mut self, delta: isize, total: usize) {
        self.offset = self
            .offset
            .saturating_add_signed(delta)
            .min(self.max_offset(total));
    }

    pub fn to_top(&mut self) {
        self.offset = 0;
    }

    pub fn to_bottom(&mut self, total: usize) {
        self.offset = self.max_offset(total);
    }

    pub fn handle_key(&mut self, key: Key, total: usize) -> bool {
        if let Some(delta) = selection_step(key, self.height()) {
            self.scroll_by(delta, total);
            return true;
        }
        match key {
            Key::Home | Key::Char('g') => {
                self.to_top();
                true
            }
            Key::End | Key::Char('G') => {
                self.to_bottom(total);
                true
            }
            _ => false,
        }
    }

    fn max_offset(&self, total: usize) -> usize {
        total.saturating_sub(self.height())
    }
}
