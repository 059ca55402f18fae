use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Body, Screen, Target, ViewContext, ViewModel};
use crate::effect::Effect;
use crate::input::Key;
use crate::logs::{LogRequest, LogStreamSession, SessionState};
use crate::message::{AsyncResult, Message, NavParams, Outcome};
use crate::model::ResourceKind;
use crate::widgets::TextViewport;

pub struct LogView {
    target: Target,
    container: Option<String>,
    follow: bool,
    tail_lines: i64,
    retry_delay: Duration,
    cancel: CancellationToken,
    session: Option<LogStreamSession>,
    next_session: u64,
    viewport: TextViewport,
}

impl LogView {
    pub fn new(params: &NavParams) -> Result<Self, String> {
        let target = Target::from_params(params)?;
        if target.kind != ResourceKind::Pods {
            return Err(format!("{} has no logs", target.describe()));
        }
        Ok(Self {
            target,
            container: params.get("container").map(str::to_string),
            follow: params.flag("follow"),
            tail_lines: 0,
            retry_delay: Duration::ZERO,
            cancel: CancellationToken::new(),
            session: None,
            next_session: 1,
            viewport: TextViewport::default(),
        })
    }

    fn start_session(&mut self) -> Effect {
        let id = self.next_session;
        self.next_session += 1;

        let request = LogRequest {
            namespace: self.target.namespace.clone(),
            pod: self.target.name.clone(),
            container: self.container.clone(),
            follow: self.follow,
            tail_lines: (!self.follow).then_some(self.tail_lines),
        };
        let mut session =
            LogStreamSession::new(id, request, self.cancel.child_token(), self.retry_delay);
        let effect = session.start();
        self.session = Some(session);
        self.viewport.to_top();
        effect
    }

    fn total(&self) -> usize {
        self.session
            .as_ref()
            .map(|session| session.buffer().len())
            .unwrap_or_default()
    }

    fn apply(&mut self, result: AsyncResult) -> Effect {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|session| session.owns(result.subject))
        else {
            debug!("discarding log result for {:?}", result.subject);
            if let Ok(Outcome::LogOpened(handle)) = result.result {
                handle.close();
            }
            return Effect::None;
        };

        let (updated, effect) = session.apply(result.result);
        let total = session.buffer().len();
        if updated && self.follow {
            self.viewport.to_bottom(total);
        } else {
            self.viewport.resize(self.viewport.height(), total);
        }
        effect
    }

    fn leave(&mut self) -> Effect {
        if let Some(session) = self.session.as_mut() {
            session.cancel();
        }
        self.target.back_to_detail(None)
    }

    fn body(&self) -> Body {
        let Some(session) = &self.session else {
            return Body::default();
        };
        let buffer = session.buffer();
        if buffer.is_empty() {
            return match (session.state(), session.error()) {
                (SessionState::Closed, None) => Body::Notice("no output".to_string()),
                (SessionState::Closed, Some(_)) => Body::Notice("log stream closed".to_string()),
                (SessionState::Starting, _) => Body::Loading("opening log stream…".to_string()),
                _ => Body::Loading("waiting for output…".to_string()),
            };
        }
        Body::Text {
            lines: buffer.window(self.viewport.offset(), self.viewport.height()),
            offset: self.viewport.offset(),
            total: buffer.len(),
            structured: false,
        }
    }
}

impl ViewModel for LogView {
    fn init(&mut self, ctx: &ViewContext) -> Effect {
        self.cancel = ctx.cancel.clone();
        self.tail_lines = ctx.config.log_tail_lines;
        self.retry_delay = ctx.config.log_retry_delay;
        self.viewport = TextViewport::new(ctx.body_rows());
        self.start_session()
    }

    fn handle(&mut self, message: Message) -> Effect {
        match message {
            Message::AsyncResult(result) => self.apply(result),
            Message::Resize { height, .. } => {
                let total = self.total();
                self.viewport.resize(super::body_rows(height), total);
                if self.follow {
                    self.viewport.to_bottom(total);
                }
                Effect::None
            }
            Message::Key(key) if key.is_back() => self.leave(),
            Message::Key(Key::Char('r'))
                if self
                    .session
                    .as_ref()
                    .is_none_or(|session| session.state() == SessionState::Closed) =>
            {
                self.start_session()
            }
            Message::Key(key) => {
                let total = self.total();
                self.viewport.handle_key(key, total);
                Effect::None
            }
            _ => Effect::None,
        }
    }

    fn render(&self) -> Screen {
        let title = format!(
            "Logs {}",
            self.session
                .as_ref()
                .map(|session| session.request().target_label())
                .unwrap_or_else(|| self.target.qualified())
        );
        let status = self.session.as_ref().map(|session| {
            let mut status = format!(
                "{}  follow: {}  {} lines",
                session.state().label(),
                if session.follow() { "on" } else { "off" },
                session.buffer().len()
            );
            if session.buffer().evicted() > 0 {
                status.push_str(&format!("  ({} dropped)", session.buffer().evicted()));
            }
            status
        });

        let hints: &[(&'static str, &'static str)] =
            if self.session.as_ref().map(LogStreamSession::state) == Some(SessionState::Closed) {
                &[("j/k", "scroll"), ("r", "restart"), ("esc", "back")]
            } else {
                &[("j/k", "scroll"), ("g/G", "top/bottom"), ("esc", "back")]
            };

        Screen::new(title, self.body())
            .with_error(self.session.as_ref().and_then(LogStreamSession::error))
            .with_status(status)
            .with_hints(hints)
    }
}

#[cfg(test)]
mod tests {
    use super::LogView;
    use crate::effect::{Effect, Task};
    use crate::input::Key;
    use crate::logs::{LogChunk, LogHandle, SessionState};
    use crate::message::{
        AsyncResult, FailureKind, Message, NavParams, Outcome, Subject, TaskError, ViewId,
        ViewToken,
    };
    use crate::views::testing::{context, deliver, press};
    use crate::views::{Body, ViewModel};
    use futures::StreamExt;
    use futures::stream;

    fn params(follow: bool) -> NavParams {
        NavParams::new()
            .with("kind", "po")
            .with("namespace", "default")
            .with("name", "api-0")
            .with("container", "app")
            .with("follow", if follow { "true" } else { "false" })
    }

    fn handle() -> LogHandle {
        LogHandle::new("default/api-0:app", stream::empty().boxed())
    }

    fn lines(count: usize) -> Vec<String> {
        (0..count).map(|index| format!("line {index}")).collect()
    }

    fn started(follow: bool) -> LogView {
        let mut view = LogView::new(&params(follow)).expect("valid params");
        let Effect::Task(Task::OpenLogs { session, request, .. }) = view.init(&context()) else {
            panic!("expected open logs task");
        };
        assert_eq!(session, 1);
        assert_eq!(request.container.as_deref(), Some("app"));
        assert_eq!(request.tail_lines, if follow { None } else { Some(500) });
        view
    }

    #[test]
    fn follow_view_scrolls_to_newest_line() {
        let mut view = started(true);
        let effect = deliver(
            &mut view,
            Subject::LogOpen { session: 1 },
            Ok(Outcome::LogOpened(handle())),
        );
        assert!(matches!(
            effect,
            Effect::Task(Task::ReadLogs { follow: true, .. })
        ));

        let _ = deliver(
            &mut view,
            Subject::LogRead { session: 1 },
            Ok(Outcome::Log(LogChunk::Lines(lines(100)))),
        );
        let Body::Text { offset, total, .. } = view.render().body else {
            panic!("expected text body");
        };
        assert_eq!(total, 100);
        assert_eq!(offset, 100 - view.viewport.height());
    }

    #[test]
    fn snapshot_view_keeps_scroll_position() {
        let mut view = started(false);
        let _ = deliver(
            &mut view,
            Subject::LogOpen { session: 1 },
            Ok(Outcome::LogOpened(handle())),
        );
        let _ = deliver(
            &mut view,
            Subject::LogRead { session: 1 },
            Ok(Outcome::Log(LogChunk::Finished {
                lines: lines(100),
                evicted: 0,
            })),
        );
        let _ = press(&mut view, Key::Down);
        let _ = press(&mut view, Key::Down);

        let Body::Text { offset, .. } = view.render().body else {
            panic!("expected text body");
        };
        assert_eq!(offset, 2);
        assert!(view.render().plain_text().contains("closed"));
    }

    #[test]
    fn empty_snapshot_renders_no_output() {
        let mut view = started(false);
        let _ = deliver(
            &mut view,
            Subject::LogOpen { session: 1 },
            Ok(Outcome::LogOpened(handle())),
        );
        let _ = deliver(
            &mut view,
            Subject::LogRead { session: 1 },
            Ok(Outcome::Log(LogChunk::Finished {
                lines: Vec::new(),
                evicted: 0,
            })),
        );
        assert_eq!(view.render().body, Body::Notice("no output".to_string()));
    }

    #[test]
    fn open_failure_shows_error_and_r_restarts_with_new_session() {
        let mut view = started(true);
        let _ = deliver(
            &mut view,
            Subject::LogOpen { session: 1 },
            Err(TaskError::new(FailureKind::Remote, "container app not found")),
        );
        let screen = view.render();
        assert_eq!(screen.error.as_deref(), Some("container app not found"));

        let Effect::Task(Task::OpenLogs { session, .. }) = press(&mut view, Key::Char('r')) else {
            panic!("expected a new open logs task");
        };
        assert_eq!(session, 2);
    }

    #[test]
    fn results_for_a_replaced_session_are_discarded() {
        let mut view = started(false);
        let _ = deliver(
            &mut view,
            Subject::LogOpen { session: 1 },
            Err(TaskError::new(FailureKind::Timeout, "open logs")),
        );
        let _ = press(&mut view, Key::Char('r'));

        let stale = handle();
        let effect = view.handle(Message::AsyncResult(AsyncResult {
            origin: ViewToken(1),
            subject: Subject::LogOpen { session: 1 },
            result: Ok(Outcome::LogOpened(stale.clone())),
        }));
        assert!(effect.is_none());
        assert!(stale.is_closed());
        assert_eq!(
            view.session.as_ref().map(|session| session.state()),
            Some(SessionState::Starting)
        );
    }

    #[test]
    fn leaving_cancels_session_and_returns_to_detail() {
        let mut view = started(true);
        let opened = handle();
        let _ = deliver(
            &mut view,
            Subject::LogOpen { session: 1 },
            Ok(Outcome::LogOpened(opened.clone())),
        );
        let effect = press(&mut view, Key::Esc);
        assert!(matches!(
            effect,
            Effect::Emit(Message::NavigateTo(ViewId::ResourceDetail, _))
        ));
        assert!(opened.is_closed());

        let late = deliver(
            &mut view,
            Subject::LogRead { session: 1 },
            Ok(Outcome::Log(LogChunk::Lines(lines(3)))),
        );
        assert!(late.is_none());
        assert_eq!(view.total(), 0);
    }
}
