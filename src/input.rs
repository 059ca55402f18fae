use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Enter,
    Esc,
    Tab,
    BackTab,
    Backspace,
    Delete,
    Interrupt,
}

impl Key {
    pub fn is_activate(self) -> bool {
        matches!(self, Key::Enter | Key::Char(' '))
    }

    pub fn is_back(self) -> bool {
        matches!(self, Key::Esc | Key::Char('q'))
    }
}

pub fn map_key(key: KeyEvent) -> Option<Key> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => Some(Key::Interrupt),
        KeyCode::Char('m') | KeyCode::Char('j') if ctrl => Some(Key::Enter),
        KeyCode::Char('n') if ctrl => Some(Key::Down),
        KeyCode::Char('p') if ctrl => Some(Key::Up),
        KeyCode::Char('d') if ctrl => Some(Key::PageDown),
        KeyCode::Char('u') if ctrl => Some(Key::PageUp),
        KeyCode::Char(_) if ctrl => None,
        KeyCode::Char(_) if key.modifiers.contains(KeyModifiers::ALT) => None,
        KeyCode::Char(c) => Some(Key::Char(c)),
        KeyCode::Up => Some(Key::Up),
        KeyCode::Down => Some(Key::Down),
        KeyCode::Left => Some(Key::Left),
        KeyCode::Right => Some(Key::Right),
        KeyCode::Home => Some(Key::Home),
        KeyCode::End => Some(Key::End),
        KeyCode::PageUp => Some(Key::PageUp),
        KeyCode::PageDown => Some(Key::PageDown),
        KeyCode::Enter => Some(Key::Enter),
        KeyCode::Esc => Some(Key::Esc),
        KeyCode::Tab if key.modifiers.contains(KeyModifiers::SHIFT) => Some(Key::BackTab),
        KeyCode::Tab => Some(Key::Tab),
        KeyCode::BackTab => Some(Key::BackTab),
        KeyCode::Backspace => Some(Key::Backspace),
        KeyCode::Delete => Some(Key::Delete),
        _ => None,
    }
}

pub fn selection_step(key: Key, page: usize) -> Option<isize> {
    let page = page.max(1) as isize;
    match key {
        Key::Down | Key::Char('j') => Some(1),
        Key::Up | Key::Char('k') => Some(-1),
        Key::PageDown => Some(page),
        Key::PageUp => Some(-page),
        _ => None,
    }
}
