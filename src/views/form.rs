use std::collections::BTreeMap;

use super::{Body, FieldLine, Screen, Target, ViewContext, ViewModel};
use crate::commands::ExternalCommand;
use crate::effect::{Effect, Task};
use crate::input::Key;
use crate::message::{AsyncResult, Message, NavParams, Outcome, Subject, ViewId};
use crate::model::ResourceChange;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FieldKind {
    Text,
    NonNegativeInt,
    Port,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FormField {
    pub label: String,
    pub value: String,
    pub kind: FieldKind,
    pub required: bool,
    cursor: usize,
    error: Option<String>,
}

impl FormField {
    pub fn new(label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            label: label.into(),
            value: String::new(),
            kind,
            required: true,
            cursor: 0,
            error: None,
        }
    }

    pub fn with_value(mut self, value: Option<&str>) -> Self {
        self.value = value.unwrap_or_default().to_string();
        self.cursor = self.value.chars().count();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        let value = self.value.trim();
        if value.is_empty() {
            return if self.required {
                Err(format!("{} is required", self.label))
            } else {
                Ok(())
            };
        }
        match self.kind {
            FieldKind::Text => Ok(()),
            FieldKind::NonNegativeInt => match value.parse::<i32>() {
                Ok(number) if number >= 0 => Ok(()),
                _ => Err(format!("{} must be a non-negative integer", self.label)),
            },
            FieldKind::Port => match value.parse::<u16>() {
                Ok(port) if port > 0 => Ok(()),
                _ => Err(format!("{} must be a port between 1 and 65535", self.label)),
            },
        }
    }

    fn byte_index(&self, cursor: usize) -> usize {
        self.value
            .char_indices()
            .nth(cursor)
            .map(|(index, _)| index)
            .unwrap_or(self.value.len())
    }

    fn len(&self) -> usize {
        self.value.chars().count()
    }

    fn insert(&mut self, ch: char) {
        let at = self.byte_index(self.cursor);
        self.value.insert(at, ch);
        self.cursor += 1;
        self.error = None;
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let at = self.byte_index(self.cursor);
        self.value.remove(at);
        self.error = None;
    }

    fn delete(&mut self) {
        if self.cursor >= self.len() {
            return;
        }
        let at = self.byte_index(self.cursor);
        self.value.remove(at);
        self.error = None;
    }

    fn move_cursor(&mut self, key: Key) {
        self.cursor = match key {
            Key::Left => self.cursor.saturating_sub(1),
            Key::Right => (self.cursor + 1).min(self.len()),
            Key::Home => 0,
            Key::End => self.len(),
            _ => self.cursor,
        };
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Purpose {
    EditData,
    RemoveData,
    Scale,
    PortForward,
}

impl Purpose {
    fn parse(value: &str) -> Result<Self, String> {
        match value {
            "edit-data" => Ok(Self::EditData),
            "remove-data" => Ok(Self::RemoveData),
            "scale" => Ok(Self::Scale),
            "port-forward" => Ok(Self::PortForward),
            other => Err(format!("unknown form purpose '{other}'")),
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::EditData => "Set data key",
            Self::RemoveData => "Remove data key",
            Self::Scale => "Scale",
            Self::PortForward => "Port-forward",
        }
    }
}

pub struct FormView {
    target: Target,
    purpose: Purpose,
    fields: Vec<FormField>,
    focus: usize,
    submitted: bool,
    pending: bool,
    error: Option<String>,
}

impl FormView {
    pub fn from_params(params: &NavParams) -> Result<Self, String> {
        let target = Target::from_params(params)?;
        let purpose = Purpose::parse(params.require("purpose")?)?;
        let kind = target.kind;

        let supported = match purpose {
            Purpose::EditData | Purpose::RemoveData => kind.has_data(),
            Purpose::Scale => kind.is_scalable(),
            Purpose::PortForward => kind.supports_port_forward(),
        };
        if !supported {
            return Err(format!(
                "{} is not available for {}",
                purpose.title().to_lowercase(),
                target.describe()
            ));
        }

        let fields = match purpose {
            Purpose::EditData => vec![
                FormField::new("Key", FieldKind::Text).with_value(params.get("key")),
                FormField::new("Value", FieldKind::Text),
            ],
            Purpose::RemoveData => {
                vec![FormField::new("Key", FieldKind::Text).with_value(params.get("key"))]
            }
            Purpose::Scale => vec![
                FormField::new("Replicas", FieldKind::NonNegativeInt)
                    .with_value(params.get("replicas")),
            ],
            Purpose::PortForward => vec![
                FormField::new("Local port", FieldKind::Port).with_value(params.get("remote")),
                FormField::new("Remote port", FieldKind::Port).with_value(params.get("remote")),
            ],
        };

        Ok(Self {
            target,
            purpose,
            fields,
            focus: 0,
            submitted: false,
            pending: false,
            error: None,
        })
    }

    #[cfg(test)]
    pub fn submitted(&self) -> bool {
        self.submitted
    }

    pub fn values(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|field| (field.label.clone(), field.value.clone()))
            .collect()
    }


    fn focus_by(&mut self, delta: isize) {
        let last = self.fields.len().saturating_sub(1);
        self.focus = self.focus.saturating_add_signed(delta).min(last);
    }

    fn submit(&mut self) -> Effect {
        if self.submitted {
            return Effect::None;
        }
        let mut valid = true;
        for field in &mut self.fields {
            field.error = field.validate().err();
            valid &= field.error.is_none();
        }
        if !valid {
            if let Some(index) = self.fields.iter().position(|field| field.error.is_some()) {
                self.focus = index;
            }
            return Effect::None;
        }

        self.submitted = true;
        self.error = None;
        self.next_step()
    }

    fn update(&mut self, change: ResourceChange) -> Effect {
        self.pending = true;
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

    fn next_step(&mut self) -> Effect {
        let values = self.values();
        let trimmed = |label: &str| {
            values
                .get(label)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };
        match self.purpose {
            Purpose::EditData => self.update(ResourceChange::SetData {
                key: trimmed("Key"),
                value: values.get("Value").cloned().unwrap_or_default(),
            }),
            Purpose::RemoveData => Effect::navigate(
                ViewId::ConfirmDialog,
                self.target
                    .params()
                    .with("action", "remove-data")
                    .with("key", trimmed("Key")),
            ),
            Purpose::Scale => {
                let replicas = trimmed("Replicas").parse::<i32>().unwrap_or_default();
                self.update(ResourceChange::Scale { replicas })
            }
            Purpose::PortForward => {
                let local_port = trimmed("Local port").parse::<u16>().unwrap_or_default();
                let remote_port = trimmed("Remote port").parse::<u16>().unwrap_or_default();
                self.pending = true;
                Effect::task(Task::RunCommand(ExternalCommand::PortForward {
                    kind: self.target.kind,
                    namespace: self.target.namespace.clone(),
                    name: self.target.name.clone(),
                    local_port,
                    remote_port,
                }))
            }
        }
    }

    fn handle_key(&mut self, key: Key) -> Effect {
        match key {
            Key::Esc => return self.target.back_to_detail(None),
            Key::Tab | Key::Down => self.focus_by(1),
            Key::BackTab | Key::Up => self.focus_by(-1),
            Key::Enter if self.focus + 1 < self.fields.len() => self.focus_by(1),
            Key::Enter => return self.submit(),
            key => {
                let Some(field) = self.fields.get_mut(self.focus) else {
                    return Effect::None;
                };
                match key {
                    Key::Char(ch) => field.insert(ch),
                    Key::Backspace => field.backspace(),
                    Key::Delete => field.delete(),
                    Key::Left | Key::Right | Key::Home | Key::End => field.move_cursor(key),
                    _ => {}
                }
            }
        }
        Effect::None
    }
}

impl ViewModel for FormView {
    fn init(&mut self, _ctx: &ViewContext) -> Effect {
        Effect::None
    }

    fn handle(&mut self, message: Message) -> Effect {
        match message {
            Message::AsyncResult(AsyncResult {
                subject: Subject::Update | Subject::Command,
                result,
                ..
            }) => match result {
                Ok(Outcome::CommandFinished { output }) => {
                    self.pending = false;
                    self.target.back_to_detail(output)
                }
                Ok(_) => Effect::None,
                Err(error) => {
                    self.pending = false;
                    self.submitted = false;
                    self.error = Some(error.to_string());
                    Effect::None
                }
            },
            Message::Key(_) if self.pending => Effect::None,
            Message::Key(key) => self.handle_key(key),
            _ => Effect::None,
        }
    }

    fn render(&self) -> Screen {
        let fields = self
            .fields
            .iter()
            .map(|field| FieldLine {
                label: field.label.clone(),
                value: field.value.clone(),
                cursor: field.cursor,
                error: field.error.clone(),
            })
            .collect();
        let status = if self.pending {
            "applying…".to_string()
        } else {
            format!("{} {}", self.purpose.title(), self.target.describe())
        };

        Screen::new(
            format!("{} {}", self.purpose.title(), self.target.qualified()),
            Body::Form {
                fields,
                focused: self.focus,
            },
        )
        .with_error(self.error.as_deref())
        .with_status(Some(status))
        .with_hints(&[("tab", "next field"), ("enter", "submit"), ("esc", "cancel")])
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldKind, FormField, FormView};
    use crate::commands::ExternalCommand;
    use crate::effect::{Effect, Task};
    use crate::input::Key;
    use crate::message::{FailureKind, Message, NavParams, Outcome, Subject, TaskError, ViewId};
    use crate::model::ResourceChange;
    use crate::views::testing::{deliver, press, type_text};
    use crate::views::{Body, ViewModel};
    use std::collections::BTreeMap;

    fn params(kind: &str, purpose: &str) -> NavParams {
        NavParams::new()
            .with("kind", kind)
            .with("namespace", "default")
            .with("name", "settings")
            .with("purpose", purpose)
    }

    #[test]
    fn key_value_form_submits_typed_values() {
        let mut form = FormView::from_params(&params("cm", "edit-data")).expect("valid params");
        type_text(&mut form, "FOO");
        let _ = press(&mut form, Key::Tab);
        type_text(&mut form, "bar");
        let effect = press(&mut form, Key::Enter);

        assert!(form.submitted());
        let expected = BTreeMap::from([
            ("Key".to_string(), "FOO".to_string()),
            ("Value".to_string(), "bar".to_string()),
        ]);
        assert_eq!(form.values(), expected);

        let Effect::Sequence(steps) = effect else {
            panic!("expected update then navigation");
        };
        assert!(matches!(
            &steps[0],
            Effect::Task(Task::UpdateResource {
                change: ResourceChange::SetData { key, value },
                ..
            }) if key == "FOO" && value == "bar"
        ));
        assert!(matches!(
            &steps[1],
            Effect::Emit(Message::NavigateTo(ViewId::ResourceDetail, _))
        ));
    }

    #[test]
    fn submitted_key_is_trimmed_but_value_is_kept_verbatim() {
        let mut form = FormView::from_params(&params("cm", "edit-data")).expect("valid params");
        type_text(&mut form, " FOO ");
        let _ = press(&mut form, Key::Tab);
        type_text(&mut form, " bar ");
        let Effect::Sequence(steps) = press(&mut form, Key::Enter) else {
            panic!("expected update then navigation");
        };
        assert!(matches!(
            &steps[0],
            Effect::Task(Task::UpdateResource {
                change: ResourceChange::SetData { key, value },
                ..
            }) if key == "FOO" && value == " bar "
        ));
    }

    #[test]
    fn remove_key_form_submits_only_once() {
        let mut form =
            FormView::from_params(&params("secret", "remove-data")).expect("valid params");
        type_text(&mut form, "token");
        let Effect::Emit(Message::NavigateTo(ViewId::ConfirmDialog, params)) =
            press(&mut form, Key::Enter)
        else {
            panic!("expected confirmation");
        };
        assert_eq!(params.get("key"), Some("token"));
        assert!(form.submitted());
        assert!(press(&mut form, Key::Enter).is_none());
    }

    #[test]
    fn enter_on_first_field_moves_focus_instead_of_submitting() {
        let mut form = FormView::from_params(&params("cm", "edit-data")).expect("valid params");
        type_text(&mut form, "FOO");
        assert!(press(&mut form, Key::Enter).is_none());
        assert!(!form.submitted());
        type_text(&mut form, "x");
        assert_eq!(form.values().get("Value").map(String::as_str), Some("x"));
    }

    #[test]
    fn cursor_editing_inserts_at_position() {
        let mut form = FormView::from_params(&params("cm", "edit-data")).expect("valid params");
        type_text(&mut form, "ac");
        let _ = press(&mut form, Key::Left);
        type_text(&mut form, "b");
        let _ = press(&mut form, Key::End);
        let _ = press(&mut form, Key::Backspace);
        let _ = press(&mut form, Key::Home);
        let _ = press(&mut form, Key::Delete);
        assert_eq!(form.values().get("Key").map(String::as_str), Some("b"));
    }

    #[test]
    fn empty_required_field_blocks_submission() {
        let mut form = FormView::from_params(&params("cm", "edit-data")).expect("valid params");
        let _ = press(&mut form, Key::Tab);
        type_text(&mut form, "bar");
        assert!(press(&mut form, Key::Enter).is_none());
        assert!(!form.submitted());

        let Body::Form { fields, focused } = form.render().body else {
            panic!("expected a form body");
        };
        assert_eq!(focused, 0);
        assert_eq!(fields[0].error.as_deref(), Some("Key is required"));
    }

    #[test]
    fn scale_rejects_negative_replicas() {
        let mut form = FormView::from_params(&params("deploy", "scale").with("replicas", "3"))
            .expect("valid params");
        assert_eq!(form.values().get("Replicas").map(String::as_str), Some("3"));
        let _ = press(&mut form, Key::Backspace);
        type_text(&mut form, "-1");
        assert!(press(&mut form, Key::Enter).is_none());
        assert!(!form.submitted());
    }

    #[test]
    fn failed_update_reopens_the_form_with_error() {
        let mut form = FormView::from_params(&params("deploy", "scale").with("replicas", "2"))
            .expect("valid params");
        assert!(matches!(press(&mut form, Key::Enter), Effect::Sequence(_)));
        assert!(press(&mut form, Key::Char('9')).is_none());

        let _ = deliver(
            &mut form,
            Subject::Update,
            Err(TaskError::new(FailureKind::Remote, "forbidden")),
        );
        assert!(!form.submitted());
        assert_eq!(form.render().error.as_deref(), Some("forbidden"));
    }

    #[test]
    fn port_forward_starts_command_and_returns_on_completion() {
        let mut form =
            FormView::from_params(&params("svc", "port-forward").with("remote", "8080"))
                .expect("valid params");
        let _ = press(&mut form, Key::Tab);
        let Effect::Task(Task::RunCommand(ExternalCommand::PortForward {
            local_port,
            remote_port,
            ..
        })) = press(&mut form, Key::Enter)
        else {
            panic!("expected port-forward command");
        };
        assert_eq!((local_port, remote_port), (8080, 8080));

        assert!(matches!(
            deliver(
                &mut form,
                Subject::Command,
                Ok(Outcome::CommandFinished {
                    output: Some("forwarding".to_string())
                })
            ),
            Effect::Emit(Message::NavigateTo(ViewId::ResourceDetail, _))
        ));
    }

    #[test]
    fn unsupported_purpose_for_kind_is_rejected() {
        assert!(FormView::from_params(&params("po", "scale")).is_err());
        assert!(FormView::from_params(&params("cm", "launch")).is_err());
    }

    #[test]
    fn field_validation_by_kind() {
        let port = FormField::new("Port", FieldKind::Port).with_value(Some("70000"));
        assert!(port.validate().is_err());
        let mut optional = FormField::new("Note", FieldKind::Text);
        optional.required = false;
        assert!(optional.validate().is_ok());
    }
}
