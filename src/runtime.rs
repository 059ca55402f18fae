use anyhow::{Context, Result};
use chrono::Local;
use crossterm::event::{Event, EventStream, KeyEventKind};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{MissedTickBehavior, interval, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::TuiTerminal;
use crate::commands::{ExternalCommand, PortForwards, run_captured, run_interactive};
use crate::config::ViewConfig;
use crate::effect::{Effect, Task, classify_error, qualified};
use crate::input::map_key;
use crate::k8s::ClusterClient;
use crate::logs::{LogHandle, ReadMode, read_next};
use crate::message::{AsyncResult, FailureKind, Message, Outcome, Subject, TaskError, ViewToken};
use crate::navigation::{Dispatch, NavigationController};
use crate::ui;

const TICK: Duration = Duration::from_millis(250);

type TaskResult = Option<Result<Outcome, TaskError>>;

#[derive(Debug)]
pub struct InlineCommand {
    pub origin: ViewToken,
    pub command: ExternalCommand,
}

#[derive(Debug, Default)]
pub struct Step {
    pub halt: bool,
    pub inline: Vec<InlineCommand>,
}

pub struct Runtime<C: ClusterClient> {
    controller: NavigationController,
    cluster: Arc<C>,
    config: Arc<ViewConfig>,
    tx: UnboundedSender<Message>,
    rx: UnboundedReceiver<Message>,
    forwards: PortForwards,
}

impl<C: ClusterClient> Runtime<C> {
    pub fn new(cluster: Arc<C>, config: ViewConfig, viewport: (u16, u16)) -> Self {
        let config = Arc::new(config);
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            controller: NavigationController::new(
                config.clone(),
                CancellationToken::new(),
                viewport,
            ),
            cluster,
            config,
            tx,
            rx,
            forwards: PortForwards::default(),
        }
    }

    #[cfg(test)]
    pub fn controller(&self) -> &NavigationController {
        &self.controller
    }

    pub fn start(&mut self) -> Step {
        let dispatch = self.controller.initialize();
        self.schedule(dispatch)
    }

    pub fn process(&mut self, message: Message) -> Step {
        let dispatch = self.controller.dispatch(message);
        self.schedule(dispatch)
    }

    pub async fn next_message(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub async fn run(mut self, terminal: &mut TuiTerminal) -> Result<()> {
        let mut events = EventStream::new();
        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let step = self.start();
        if self.finish_step(terminal, step).await {
            return Ok(());
        }
        self.draw(terminal)?;

        loop {
            let message = tokio::select! {
                maybe_event = events.next() => match maybe_event {
                    Some(Ok(event)) => match translate(event) {
                        Some(message) => message,
                        None => continue,
                    },
                    Some(Err(error)) => {
                        warn!("terminal event error: {error}");
                        continue;
                    }
                    None => {
                        info!("terminal event stream closed");
                        break;
                    }
                },
                _ = ticker.tick() => Message::Tick(Local::now()),
                Some(message) = self.next_message() => message,
            };

            let step = self.process(message);
            if self.finish_step(terminal, step).await {
                break;
            }
            self.draw(terminal)?;
        }

        self.controller.shutdown();
        Ok(())
    }

    async fn finish_step(&mut self, terminal: &mut TuiTerminal, step: Step) -> bool {
        for inline in step.inline {
            self.run_inline(terminal, inline).await;
        }
        step.halt
    }

    fn draw(&mut self, terminal: &mut TuiTerminal) -> Result<()> {
        if self.controller.take_clear_request() {
            terminal.clear().context("failed to clear terminal")?;
        }
        let screen = self.controller.screen();
        let view_id = self.controller.view_id();
        terminal
            .draw(|frame| ui::render(frame, &screen, &self.config, view_id))
            .context("failed to render terminal frame")?;
        Ok(())
    }

    async fn run_inline(&mut self, terminal: &mut TuiTerminal, inline: InlineCommand) {
        let InlineCommand { origin, command } = inline;
        let result = if command.is_background() {
            self.forwards
                .start(&command)
                .map(|summary| Outcome::CommandFinished {
                    output: Some(format!(
                        "{summary}, {} port-forward(s) active",
                        self.forwards.running()
                    )),
                })
        } else {
            run_interactive(terminal, &command)
                .await
                .map(|()| Outcome::CommandFinished { output: None })
        };
        let result = result.map_err(|error| classify_error(&error));
        if let Err(error) = &result {
            warn!("{} failed: {error}", command.label());
        }
        let _ = self.tx.send(Message::AsyncResult(AsyncResult {
            origin,
            subject: Subject::Command,
            result,
        }));
    }

    fn schedule(&mut self, dispatch: Dispatch) -> Step {
        let Dispatch {
            origin,
            cancel,
            effect,
        } = dispatch;
        let mut step = Step::default();
        self.schedule_effect(origin, &cancel, effect, &mut step);
        step
    }

    fn schedule_effect(
        &mut self,
        origin: ViewToken,
        cancel: &CancellationToken,
        effect: Effect,
        step: &mut Step,
    ) {
        match effect {
            Effect::None => {}
            Effect::Halt => step.halt = true,
            Effect::Emit(message) => {
                let _ = self.tx.send(message);
            }
            Effect::Batch(effects) => {
                for effect in effects {
                    self.schedule_effect(origin, cancel, effect, step);
                }
            }
            Effect::Task(Task::RunCommand(command))
                if command.is_interactive() || command.is_background() =>
            {
                debug!("queued {} to run on the terminal", command.label());
                step.inline.push(InlineCommand { origin, command });
            }
            Effect::Task(task) => {
                debug!("spawning {} for {origin}", task.label());
                let cluster = self.cluster.clone();
                let config = self.config.clone();
                let tx = self.tx.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let subject = task.subject();
                    if let Some(result) = run_task(cluster, config, task, &cancel).await {
                        report(&tx, origin, subject, result);
                    }
                });
            }
            Effect::Sequence(effects) => {
                let cluster = self.cluster.clone();
                let config = self.config.clone();
                let tx = self.tx.clone();
                let cancel = cancel.clone();
                tokio::spawn(run_sequence(cluster, config, tx, origin, cancel, effects));
            }
        }
    }
}

fn translate(event: Event) -> Option<Message> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => map_key(key).map(Message::Key),
        Event::Resize(width, height) => Some(Message::Resize { width, height }),
        _ => None,
    }
}

fn report(
    tx: &UnboundedSender<Message>,
    origin: ViewToken,
    subject: Subject,
    result: Result<Outcome, TaskError>,
) {
    if tx
        .send(Message::AsyncResult(AsyncResult {
            origin,
            subject,
            result,
        }))
        .is_err()
    {
        debug!("dropping {subject:?} result for {origin}: loop has stopped");
    }
}

async fn run_sequence<C: ClusterClient>(
    cluster: Arc<C>,
    config: Arc<ViewConfig>,
    tx: UnboundedSender<Message>,
    origin: ViewToken,
    cancel: CancellationToken,
    effects: Vec<Effect>,
) {
    for effect in effects {
        if cancel.is_cancelled() {
            debug!("sequence for {origin} cancelled");
            return;
        }
        match effect {
            Effect::None => {}
            Effect::Emit(message) => {
                let _ = tx.send(message);
            }
            Effect::Halt => {
                let _ = tx.send(Message::Quit);
                return;
            }
            Effect::Task(task) if !task.is_interactive() => {
                let subject = task.subject();
                let Some(result) = run_task(cluster.clone(), config.clone(), task, &cancel).await
                else {
                    return;
                };
                let failed = result.is_err();
                report(&tx, origin, subject, result);
                if failed {
                    return;
                }
            }
            other => warn!("skipping {other:?}: not supported inside a sequence"),
        }
    }
}

/// Applies the timeout and the cancellation token around one task.
/// `None` means the task was cancelled and must not report anything.
async fn run_task<C: ClusterClient>(
    cluster: Arc<C>,
    config: Arc<ViewConfig>,
    task: Task,
    view_cancel: &CancellationToken,
) -> TaskResult {
    let label = task.label();
    let limit = task.timeout(config.request_timeout);
    let cancel = task.cancel_token().unwrap_or(view_cancel).clone();
    // log reads observe the token themselves so they can close the stream
    let self_cancelling = matches!(task, Task::ReadLogs { .. } | Task::RetryLogs { .. });

    let work = async {
        match limit {
            Some(limit) => match timeout(limit, execute(cluster.as_ref(), &config, task)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("{label} timed out after {limit:?}");
                    Some(Err(TaskError::new(FailureKind::Timeout, label.clone())))
                }
            },
            None => execute(cluster.as_ref(), &config, task).await,
        }
    };

    let result = if self_cancelling {
        work.await
    } else {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = work => result,
        }
    };

    if cancel.is_cancelled() {
        if let Some(Ok(Outcome::LogOpened(handle))) = &result {
            handle.close();
        }
        debug!("{label} finished after cancellation, result dropped");
        return None;
    }
    result
}

async fn execute<C: ClusterClient>(cluster: &C, config: &ViewConfig, task: Task) -> TaskResult {
    let outcome = match task {
        Task::ListResources {
            kind,
            scope,
            selector,
        } => cluster
            .list(kind, &scope, selector.as_deref())
            .await
            .map(Outcome::Table),
        Task::GetResource {
            kind,
            namespace,
            name,
        } => cluster
            .get(kind, namespace.as_deref(), &name)
            .await
            .map(Outcome::Document),
        Task::ListNamespaces => cluster.namespaces().await.map(Outcome::Namespaces),
        Task::DeleteResource {
            kind,
            namespace,
            name,
            grace_period_secs,
        } => cluster
            .delete(kind, namespace.as_deref(), &name, grace_period_secs)
            .await
            .map(|()| {
                info!("deleted {kind} {}", qualified(namespace.as_deref(), &name));
                Outcome::Deleted
            }),
        Task::UpdateResource {
            kind,
            namespace,
            name,
            change,
        } => cluster
            .update(kind, &namespace, &name, &change)
            .await
            .map(|()| {
                info!("{} on {kind} {namespace}/{name}", change.describe());
                Outcome::Updated
            }),
        Task::OpenLogs { request, .. } => cluster.open_logs(&request).await.map(|lines| {
            Outcome::LogOpened(LogHandle::new(request.target_label(), lines))
        }),
        Task::ReadLogs {
            handle,
            follow,
            cancel,
            ..
        } => {
            let mode = if follow {
                ReadMode::Follow(config.follow_policy)
            } else {
                ReadMode::Snapshot
            };
            return read_logs(&handle, mode, &cancel).await;
        }
        Task::RetryLogs {
            handle,
            after,
            cancel,
            ..
        } => {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    handle.close();
                    return None;
                }
                _ = sleep(after) => {}
            }
            return read_logs(&handle, ReadMode::Follow(config.follow_policy), &cancel).await;
        }
        Task::RunCommand(command) => run_captured(&command)
            .await
            .map(|output| Outcome::CommandFinished {
                output: Some(output),
            }),
    };
    Some(outcome.map_err(|error| classify_error(&error)))
}

async fn read_logs(handle: &LogHandle, mode: ReadMode, cancel: &CancellationToken) -> TaskResult {
    match read_next(handle, mode, cancel).await {
        Ok(Some(chunk)) => Some(Ok(Outcome::Log(chunk))),
        Ok(None) => None,
        Err(error) => Some(Err(classify_error(&error))),
    }
}

#[cfg(test)]
mod tests {
    use super::Runtime;
    use crate::config::ViewConfig;
    use crate::effect::{Effect, Task};
    use crate::input::Key;
    use crate::k8s::{ClusterClient, NotFound};
    use crate::logs::{LogHandle, LogLines, LogRequest};
    use crate::message::{AsyncResult, FailureKind, Message, NavParams, Outcome, Subject, ViewId};
    use crate::model::{
        NamespaceScope, ResourceChange, ResourceDocument, ResourceKind, ResourceRow, ResourceTable,
    };
    use crate::views::Body;
    use anyhow::Result;
    use futures::stream;
    use futures::{Stream, StreamExt};
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct FakeCluster {
        list_delay: Duration,
        deleted: Mutex<Vec<String>>,
        log_lines: Vec<String>,
    }

    impl ClusterClient for FakeCluster {
        async fn list(
            &self,
            kind: ResourceKind,
            _scope: &NamespaceScope,
            _selector: Option<&str>,
        ) -> Result<ResourceTable> {
            tokio::time::sleep(self.list_delay).await;
            Ok(ResourceTable {
                headers: vec!["Name".to_string()],
                rows: vec![ResourceRow {
                    name: format!("{}-0", kind.short_token()),
                    namespace: Some("default".to_string()),
                    columns: vec![format!("{}-0", kind.short_token())],
                }],
            })
        }

        async fn get(
            &self,
            kind: ResourceKind,
            namespace: Option<&str>,
            name: &str,
        ) -> Result<ResourceDocument> {
            if name == "gone" {
                return Err(NotFound::new(kind, namespace.map(str::to_string), name).into());
            }
            Ok(ResourceDocument {
                kind: Some(kind),
                name: name.to_string(),
                yaml: format!("name: {name}"),
                containers: vec!["app".to_string()],
                ..ResourceDocument::default()
            })
        }

        async fn delete(
            &self,
            _kind: ResourceKind,
            _namespace: Option<&str>,
            name: &str,
            _grace_period_secs: u32,
        ) -> Result<()> {
            if let Ok(mut deleted) = self.deleted.lock() {
                deleted.push(name.to_string());
            }
            Ok(())
        }

        async fn update(
            &self,
            _kind: ResourceKind,
            _namespace: &str,
            _name: &str,
            _change: &ResourceChange,
        ) -> Result<()> {
            anyhow::bail!("forbidden")
        }

        async fn namespaces(&self) -> Result<Vec<String>> {
            Ok(vec!["default".to_string()])
        }

        async fn open_logs(&self, _request: &LogRequest) -> Result<LogLines> {
            Ok(stream::iter(self.log_lines.clone().into_iter().map(Ok)).boxed())
        }
    }

    fn runtime(cluster: FakeCluster) -> Runtime<FakeCluster> {
        let config = ViewConfig {
            request_timeout: Duration::from_millis(200),
            ..ViewConfig::default()
        };
        let mut runtime = Runtime::new(Arc::new(cluster), config, (120, 40));
        let step = runtime.start();
        assert!(!step.halt);
        runtime
    }

    async fn pump(runtime: &mut Runtime<FakeCluster>) -> Message {
        timeout(Duration::from_secs(2), runtime.next_message())
            .await
            .expect("message arrives in time")
            .expect("queue open")
    }

    fn pod_detail(name: &str) -> Message {
        Message::NavigateTo(
            ViewId::ResourceDetail,
            NavParams::new()
                .with("kind", "po")
                .with("namespace", "default")
                .with("name", name),
        )
    }

    #[tokio::test]
    async fn fetch_result_reaches_the_view() {
        let mut runtime = runtime(FakeCluster::default());
        let _ = runtime.process(Message::NavigateTo(
            ViewId::ResourceList,
            NavParams::new().with("kind", "po"),
        ));

        let message = pump(&mut runtime).await;
        assert!(matches!(
            message,
            Message::AsyncResult(AsyncResult {
                subject: Subject::List,
                result: Ok(_),
                ..
            })
        ));
        let _ = runtime.process(message);
        let Body::Table { rows, .. } = runtime.controller().screen().body else {
            panic!("expected table");
        };
        assert_eq!(rows, vec![vec!["po-0".to_string()]]);
    }

    #[tokio::test]
    async fn navigating_away_cancels_in_flight_fetch() {
        let mut runtime = runtime(FakeCluster {
            list_delay: Duration::from_millis(100),
            ..FakeCluster::default()
        });
        let _ = runtime.process(Message::NavigateTo(
            ViewId::ResourceList,
            NavParams::new().with("kind", "po"),
        ));
        let _ = runtime.process(Message::NavigateTo(ViewId::MainMenu, NavParams::new()));

        let quiet = timeout(Duration::from_millis(300), runtime.next_message()).await;
        assert!(quiet.is_err(), "cancelled fetch must not report");
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let mut runtime = runtime(FakeCluster {
            list_delay: Duration::from_secs(5),
            ..FakeCluster::default()
        });
        let _ = runtime.process(Message::NavigateTo(
            ViewId::ResourceList,
            NavParams::new().with("kind", "po"),
        ));

        let Message::AsyncResult(AsyncResult {
            result: Err(error), ..
        }) = pump(&mut runtime).await
        else {
            panic!("expected a timeout failure");
        };
        assert_eq!(error.kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn missing_resource_is_classified_not_found() {
        let mut runtime = runtime(FakeCluster::default());
        let _ = runtime.process(pod_detail("gone"));
        let message = pump(&mut runtime).await;
        let _ = runtime.process(message);
        let screen = runtime.controller().screen();
        assert_eq!(
            screen.body,
            Body::Notice("pod default/gone no longer exists".to_string())
        );
    }

    #[tokio::test]
    async fn confirmed_delete_reports_before_navigating() {
        let cluster = FakeCluster::default();
        let mut runtime = runtime(cluster);
        let _ = runtime.process(Message::NavigateTo(
            ViewId::ConfirmDialog,
            NavParams::new()
                .with("kind", "po")
                .with("namespace", "default")
                .with("name", "api-0")
                .with("action", "delete"),
        ));
        let _ = runtime.process(Message::Key(Key::Char('y')));

        let first = pump(&mut runtime).await;
        assert!(matches!(
            first,
            Message::AsyncResult(AsyncResult {
                subject: Subject::Delete,
                result: Ok(Outcome::Deleted),
                ..
            })
        ));
        let second = pump(&mut runtime).await;
        assert!(matches!(
            second,
            Message::NavigateTo(ViewId::ResourceList, _)
        ));
        assert_eq!(
            runtime.cluster.deleted.lock().map(|names| names.clone()).ok(),
            Some(vec!["api-0".to_string()])
        );
    }

    #[tokio::test]
    async fn failed_step_stops_the_sequence() {
        let mut runtime = runtime(FakeCluster::default());
        let _ = runtime.process(Message::NavigateTo(
            ViewId::ConfirmDialog,
            NavParams::new()
                .with("kind", "deploy")
                .with("namespace", "default")
                .with("name", "api")
                .with("action", "restart"),
        ));
        let _ = runtime.process(Message::Key(Key::Char('y')));

        let first = pump(&mut runtime).await;
        assert!(matches!(
            first,
            Message::AsyncResult(AsyncResult {
                subject: Subject::Update,
                result: Err(_),
                ..
            })
        ));
        let _ = runtime.process(first);
        assert_eq!(runtime.controller().view_id(), ViewId::ConfirmDialog);
        let quiet = timeout(Duration::from_millis(100), runtime.next_message()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test]
    async fn snapshot_logs_flow_through_the_session() {
        let mut runtime = runtime(FakeCluster {
            log_lines: vec!["one".to_string(), "two".to_string()],
            ..FakeCluster::default()
        });
        let _ = runtime.process(Message::NavigateTo(
            ViewId::LogViewer,
            NavParams::new()
                .with("kind", "po")
                .with("namespace", "default")
                .with("name", "api-0")
                .with("follow", "false"),
        ));

        for _ in 0..2 {
            let message = pump(&mut runtime).await;
            let _ = runtime.process(message);
        }
        let screen = runtime.controller().screen();
        let Body::Text { lines, .. } = screen.body else {
            panic!("expected log text, got {:?}", screen.body);
        };
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
        assert!(screen.status.unwrap_or_default().starts_with("closed"));
    }

    #[tokio::test]
    async fn quit_halts_and_emit_is_queued() {
        let mut runtime = runtime(FakeCluster::default());
        let step = runtime.process(Message::Key(Key::Char('q')));
        assert!(!step.halt);
        let quit = pump(&mut runtime).await;
        assert!(matches!(quit, Message::Quit));
        assert!(runtime.process(quit).halt);
    }

    #[test]
    fn interactive_commands_are_kept_for_the_terminal() {
        let runtime_config = ViewConfig::default();
        let mut runtime = Runtime::new(Arc::new(FakeCluster::default()), runtime_config, (80, 24));
        let mut step = super::Step::default();
        let cancel = CancellationToken::new();
        runtime.schedule_effect(
            runtime.controller().token(),
            &cancel,
            Effect::task(Task::RunCommand(crate::commands::ExternalCommand::Shell {
                namespace: "default".to_string(),
                pod: "api-0".to_string(),
                container: None,
                shell: "/bin/sh".to_string(),
            })),
            &mut step,
        );
        assert_eq!(step.inline.len(), 1);
        assert!(!step.halt);
    }

    struct CountedLines {
        closes: Arc<AtomicUsize>,
    }

    impl Stream for CountedLines {
        type Item = std::io::Result<String>;

        fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Poll::Pending
        }
    }

    impl Drop for CountedLines {
        fn drop(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn cancelling_a_pending_retry_closes_the_stream_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let handle = LogHandle::new(
            "default/api-0",
            CountedLines {
                closes: closes.clone(),
            }
            .boxed(),
        );
        let cancel = CancellationToken::new();
        let task = Task::RetryLogs {
            session: 1,
            handle: handle.clone(),
            after: Duration::from_secs(30),
            cancel: cancel.clone(),
        };
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = timeout(
            Duration::from_secs(5),
            super::run_task(
                Arc::new(FakeCluster::default()),
                Arc::new(ViewConfig::default()),
                task,
                &cancel,
            ),
        )
        .await
        .expect("retry should stop on cancellation");

        assert!(result.is_none());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(handle.is_closed());
        assert!(!handle.close());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
