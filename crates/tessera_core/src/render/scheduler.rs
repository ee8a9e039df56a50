//! Per-instance render scheduling with error containment.
//!
//! # Invariants
//! - State machine `Idle -> Scheduled -> Idle`; while scheduled, further
//!   refreshes join the pending frame instead of queueing another one.
//! - A frame render reads data at frame time, not at request time.
//! - Frame callbacks hold only a weak reference plus the connection
//!   generation they were queued under; stale callbacks do nothing.
//! - The scheduled flag returns to idle whether the render succeeds or not.

use super::{ComponentView, FrameClock, RenderError, RenderSurface, RenderTree};
use crate::config::RenderConfig;
use crate::logging::panic_payload_summary;
use crate::template::RenderFn;
use log::{debug, error, warn};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Result of one render attempt as seen by refresh callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered,
    /// Failure contained by the error boundary; placeholder committed.
    Placeholder(RenderError),
    /// Failure without a boundary; surface left untouched.
    Failed(RenderError),
    /// Nothing rendered: no template, disconnected, or superseded.
    Skipped,
}

/// Pending result of `refresh()`; resolves after the frame render.
pub struct RenderTicket {
    state: TicketState,
}

enum TicketState {
    Ready(Option<RenderOutcome>),
    Pending(oneshot::Receiver<RenderOutcome>),
}

impl RenderTicket {
    fn ready(outcome: RenderOutcome) -> Self {
        Self {
            state: TicketState::Ready(Some(outcome)),
        }
    }

    fn pending(receiver: oneshot::Receiver<RenderOutcome>) -> Self {
        Self {
            state: TicketState::Pending(receiver),
        }
    }
}

impl Future for RenderTicket {
    type Output = RenderOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            TicketState::Ready(outcome) => {
                Poll::Ready(outcome.take().unwrap_or(RenderOutcome::Skipped))
            }
            TicketState::Pending(receiver) => Pin::new(receiver)
                .poll(cx)
                .map(|received| received.unwrap_or(RenderOutcome::Skipped)),
        }
    }
}

struct RenderState {
    render_fn: Option<RenderFn>,
    scheduled: bool,
    connected: bool,
    generation: u64,
    waiters: Vec<oneshot::Sender<RenderOutcome>>,
    renders: u64,
}

struct Instance {
    id: Uuid,
    tag: String,
    view: Box<dyn ComponentView>,
    surface: Arc<dyn RenderSurface>,
    frames: Arc<FrameClock>,
    options: RenderConfig,
    state: Mutex<RenderState>,
}

/// One mounted component: view, surface and render state.
#[derive(Clone)]
pub struct ComponentInstance {
    inner: Arc<Instance>,
}

impl ComponentInstance {
    pub fn new(
        tag: impl Into<String>,
        view: Box<dyn ComponentView>,
        surface: Arc<dyn RenderSurface>,
        frames: Arc<FrameClock>,
        options: RenderConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Instance {
                id: Uuid::new_v4(),
                tag: tag.into(),
                view,
                surface,
                frames,
                options,
                state: Mutex::new(RenderState {
                    render_fn: None,
                    scheduled: false,
                    connected: false,
                    generation: 0,
                    waiters: Vec::new(),
                    renders: 0,
                }),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    pub fn view(&self) -> &dyn ComponentView {
        self.inner.view.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    pub fn is_scheduled(&self) -> bool {
        self.inner.lock().scheduled
    }

    /// Successful renders committed so far.
    pub fn render_count(&self) -> u64 {
        self.inner.lock().renders
    }

    /// Marks the instance mounted with its compiled template.
    pub fn connect(&self, render_fn: Option<RenderFn>) {
        let waiters = {
            let mut state = self.inner.lock();
            state.render_fn = render_fn;
            state.connected = true;
            state.scheduled = false;
            state.generation += 1;
            std::mem::take(&mut state.waiters)
        };
        // The frame these callers waited on is stale now.
        for waiter in waiters {
            let _ = waiter.send(RenderOutcome::Skipped);
        }
    }

    /// Unmounts: resets debouncing and releases pending refresh callers.
    ///
    /// An already queued frame callback is not cancelled; it observes the
    /// generation change and returns without touching the instance.
    pub fn disconnect(&self) {
        let waiters = {
            let mut state = self.inner.lock();
            if !state.connected {
                return;
            }
            state.connected = false;
            state.scheduled = false;
            state.generation += 1;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(RenderOutcome::Skipped);
        }
        self.inner.view.on_dispose();
        debug!(
            "event=component_disconnect module=render status=ok tag={} instance={}",
            self.inner.tag, self.inner.id
        );
    }

    /// Requests a render on the next frame, coalescing with a pending one.
    pub fn refresh(&self) -> RenderTicket {
        let mut state = self.inner.lock();
        if !state.connected {
            return RenderTicket::ready(RenderOutcome::Skipped);
        }
        let Some(render_fn) = state.render_fn.clone() else {
            warn!(
                "event=component_refresh module=render status=warn reason=no_template tag={}",
                self.inner.tag
            );
            return RenderTicket::ready(RenderOutcome::Skipped);
        };

        if !self.inner.options.debounce {
            drop(state);
            return RenderTicket::ready(self.inner.render_with(&render_fn, true));
        }

        let (sender, receiver) = oneshot::channel();
        state.waiters.push(sender);
        if !state.scheduled {
            state.scheduled = true;
            let generation = state.generation;
            let weak: Weak<Instance> = Arc::downgrade(&self.inner);
            self.inner.frames.request_frame(Box::new(move || {
                if let Some(instance) = weak.upgrade() {
                    instance.run_frame(generation);
                }
            }));
        }
        RenderTicket::pending(receiver)
    }

    /// Renders immediately, bypassing debouncing.
    pub fn force_refresh(&self) -> RenderOutcome {
        let render_fn = {
            let state = self.inner.lock();
            if !state.connected {
                return RenderOutcome::Skipped;
            }
            state.render_fn.clone()
        };
        match render_fn {
            Some(render_fn) => self
                .inner
                .render_with(&render_fn, self.inner.options.error_boundary),
            None => RenderOutcome::Skipped,
        }
    }
}

impl Instance {
    fn lock(&self) -> MutexGuard<'_, RenderState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_frame(&self, generation: u64) {
        let (render_fn, waiters) = {
            let mut state = self.lock();
            if !state.connected || state.generation != generation || !state.scheduled {
                return;
            }
            state.scheduled = false;
            (state.render_fn.clone(), std::mem::take(&mut state.waiters))
        };

        let outcome = match render_fn {
            Some(render_fn) => self.render_with(&render_fn, self.options.error_boundary),
            None => RenderOutcome::Skipped,
        };
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    fn render_with(&self, render_fn: &RenderFn, boundary: bool) -> RenderOutcome {
        let attempt = catch_unwind(AssertUnwindSafe(|| {
            let data = self.view.data()?;
            render_fn(&data)
        }));
        let result = attempt.unwrap_or_else(|payload| {
            Err(RenderError::new(format!(
                "panicked: {}",
                panic_payload_summary(payload.as_ref())
            )))
        });

        match result {
            Ok(tree) => {
                self.surface.commit(tree);
                self.lock().renders += 1;
                self.view.on_render();
                RenderOutcome::Rendered
            }
            Err(err) if boundary => {
                error!(
                    "event=component_render module=render status=error contained=true tag={} instance={} error={}",
                    self.tag, self.id, err
                );
                self.surface.commit(RenderTree::placeholder(&self.tag, &err));
                self.invoke_error_hook(&err);
                RenderOutcome::Placeholder(err)
            }
            Err(err) => {
                error!(
                    "event=component_render module=render status=error contained=false tag={} instance={} error={}",
                    self.tag, self.id, err
                );
                RenderOutcome::Failed(err)
            }
        }
    }

    fn invoke_error_hook(&self, err: &RenderError) {
        match catch_unwind(AssertUnwindSafe(|| self.view.on_error(err))) {
            Ok(Ok(())) => {}
            Ok(Err(hook_err)) => error!(
                "event=component_error_hook module=render status=error tag={} error={}",
                self.tag, hook_err
            ),
            Err(payload) => error!(
                "event=component_error_hook module=render status=error tag={} panic={}",
                self.tag,
                panic_payload_summary(payload.as_ref())
            ),
        }
    }
}
