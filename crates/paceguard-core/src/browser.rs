use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SolveError;

/// Opaque handle returned by [`BrowserSurface::locate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Browser automation primitives, implemented outside the core.
///
/// The governor only calls these best-effort (incidental interaction) or
/// on behalf of the caller (`type_text`).
#[async_trait]
pub trait BrowserSurface: Send + Sync {
    async fn locate(&self, selector: &str) -> Result<Option<ElementHandle>, SolveError>;

    async fn type_char(&self, selector: &str, ch: char, delay_ms: u64) -> Result<(), SolveError>;

    async fn move_mouse(&self, x: f64, y: f64) -> Result<(), SolveError>;

    async fn scroll_by(&self, amount: i64) -> Result<(), SolveError>;

    /// `None` when the page cannot report its size.
    async fn viewport_size(&self) -> Option<Viewport>;
}
