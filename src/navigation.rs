use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ViewConfig;
use crate::effect::Effect;
use crate::input::Key;
use crate::message::{AsyncResult, Message, NavParams, Outcome, ViewId, ViewToken};
use crate::views::{Screen, View, ViewContext, ViewModel};

#[derive(Debug)]
pub struct Dispatch {
    pub origin: ViewToken,
    pub cancel: CancellationToken,
    pub effect: Effect,
}

/// Owns the active view. The only place a view is ever replaced.
pub struct NavigationController {
    config: Arc<ViewConfig>,
    root_cancel: CancellationToken,
    view: View,
    view_id: ViewId,
    token: ViewToken,
    view_cancel: CancellationToken,
    next_token: u64,
    viewport: (u16, u16),
    halted: bool,
    clear_pending: bool,
}

impl NavigationController {
    pub fn new(config: Arc<ViewConfig>, root_cancel: CancellationToken, viewport: (u16, u16)) -> Self {
        let view_cancel = root_cancel.child_token();
        Self {
            config,
            root_cancel,
            view: View::build(ViewId::MainMenu, NavParams::new()),
            view_id: ViewId::MainMenu,
            token: ViewToken::default(),
            view_cancel,
            next_token: 0,
            viewport,
            halted: false,
            clear_pending: true,
        }
    }

    pub fn initialize(&mut self) -> Dispatch {
        self.transition(ViewId::MainMenu, NavParams::new())
    }

    pub fn dispatch(&mut self, message: Message) -> Dispatch {
        if self.halted {
            return self.idle();
        }

        match message {
            Message::NavigateTo(view, params) => self.transition(view, params),
            Message::Quit | Message::Key(Key::Interrupt) => self.halt(),
            Message::AsyncResult(result) if result.origin != self.token => {
                discard_stale(result, self.token);
                self.idle()
            }
            Message::Resize { width, height } => {
                self.viewport = (width, height);
                self.forward(Message::Resize { width, height })
            }
            message => self.forward(message),
        }
    }

    pub fn view_id(&self) -> ViewId {
        self.view_id
    }

    #[cfg(test)]
    pub fn token(&self) -> ViewToken {
        self.token
    }

    #[cfg(test)]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn screen(&self) -> Screen {
        self.view.render()
    }

    pub fn take_clear_request(&mut self) -> bool {
        std::mem::take(&mut self.clear_pending)
    }

    pub fn shutdown(&mut self) {
        self.view_cancel.cancel();
        self.root_cancel.cancel();
    }

    fn transition(&mut self, view: ViewId, params: NavParams) -> Dispatch {
        self.view_cancel.cancel();

        self.next_token += 1;
        self.token = ViewToken(self.next_token);
        self.view_cancel = self.root_cancel.child_token();
        self.view_id = view;
        self.view = View::build(view, params);
        self.clear_pending = true;
        info!("showing {} view ({})", view.title(), self.token);

        let ctx = ViewContext {
            config: self.config.clone(),
            cancel: self.view_cancel.clone(),
            viewport: self.viewport,
        };
        let effect = self.view.init(&ctx);
        self.scoped(effect)
    }

    fn halt(&mut self) -> Dispatch {
        info!("quit requested from {} view", self.view_id.title());
        self.halted = true;
        self.shutdown();
        self.scoped(Effect::Halt)
    }

    fn forward(&mut self, message: Message) -> Dispatch {
        let effect = self.view.handle(message);
        self.scoped(effect)
    }

    fn idle(&self) -> Dispatch {
        self.scoped(Effect::None)
    }

    fn scoped(&self, effect: Effect) -> Dispatch {
        Dispatch {
            origin: self.token,
            cancel: self.view_cancel.clone(),
            effect,
        }
    }
}

fn discard_stale(result: AsyncResult, current: ViewToken) {
    debug!(
        "discarding {:?} result from {} (active view is {current})",
        result.subject, result.origin
    );
    if let Ok(Outcome::LogOpened(handle)) = result.result {
        handle.close();
    }
}
