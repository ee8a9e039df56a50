//! Component rendering contracts and scheduling.
//!
//! # Responsibility
//! - Define the view/surface seams a component instance renders through.
//! - Coalesce refresh bursts into one render per frame and contain failures.
//!
//! # Invariants
//! - A render failure only ever affects the failing component's own surface.

use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod frame;
mod scheduler;

pub use frame::{FrameCallback, FrameClock};
pub use scheduler::{ComponentInstance, RenderOutcome, RenderTicket};

/// Data mapping handed to a compiled template.
pub type RenderData = Map<String, Value>;

/// Opaque output of a compiled template, committed to a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTree {
    markup: String,
}

impl RenderTree {
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
        }
    }

    /// Minimal diagnostic output shown in place of a failed component.
    pub fn placeholder(tag: &str, err: &RenderError) -> Self {
        Self::new(format!(
            "<div class=\"tessera-render-error\" data-tag=\"{}\">render failed: {}</div>",
            escape_markup(tag),
            escape_markup(err.message())
        ))
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn into_markup(self) -> String {
        self.markup
    }
}

fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Failure during data computation or template invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError {
    message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for RenderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "render failed: {}", self.message)
    }
}

impl Error for RenderError {}

/// Behaviour of one component type.
///
/// Views are shared with the frame callback, so state that changes between
/// renders lives behind interior mutability.
pub trait ComponentView: Send + Sync {
    /// Fresh data for the next render; read at frame time.
    fn data(&self) -> Result<RenderData, RenderError> {
        Ok(RenderData::new())
    }

    fn on_init(&self) {}

    /// Called after every successful render.
    fn on_render(&self) {}

    fn on_dispose(&self) {}

    /// Called after a contained render failure.
    fn on_error(&self, _err: &RenderError) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Paint target owned by the host for one component instance.
pub trait RenderSurface: Send + Sync {
    fn commit(&self, tree: RenderTree);
}
