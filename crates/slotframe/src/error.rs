//! Error types for slotframe.

use crate::session::SessionId;

/// Result type alias for menu operations.
pub type Result<T> = std::result::Result<T, MenuError>;

/// The main error type for menu operations.
#[derive(Debug, thiserror::Error)]
pub enum MenuError {
    /// The menu document or programmatic definition was rejected at build time.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// A slot index was outside the grid. This is a programming error in the
    /// caller and is surfaced rather than clamped.
    #[error("slot index {index} out of range for a {size}-slot grid")]
    InvalidSlot { index: usize, size: usize },

    /// The session is unknown or already closed. Recoverable; callers may
    /// log and ignore.
    #[error("session {0:?} not found or closed")]
    SessionNotFound(SessionId),

    /// An item or placeholder provider failed to resolve.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The surface handed in at open time is unusable: too small for the
    /// definition's grid, or already invalid in the host.
    #[error("surface rejected: {reason}")]
    SurfaceRejected { reason: String },
}

/// Errors detected while building a [`MenuDefinition`](crate::MenuDefinition).
///
/// These are fatal to the definition being loaded but never to the library:
/// a bad document is rejected at load time, never at render time.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    /// The configuration document could not be deserialized.
    #[error("failed to parse menu document: {0}")]
    Parse(String),

    /// Grid dimensions are zero or exceed the host-imposed maximum.
    #[error("grid dimensions {rows}x{cols} are invalid (limit {max} slots)")]
    InvalidDimensions { rows: usize, cols: usize, max: usize },

    /// A configured slot index does not fit the grid.
    #[error("slot {slot} is out of range for a {size}-slot grid")]
    SlotOutOfRange { slot: usize, size: usize },

    /// A slot specification string could not be parsed.
    #[error("invalid slot specification '{text}'")]
    InvalidSlotSpec { text: String },

    /// A `{placeholder}` token does not resolve against the injected registry.
    #[error("unknown placeholder '{{{name}}}'")]
    UnknownPlaceholder { name: String },

    /// An item provider name does not resolve against the injected registry.
    #[error("unknown item provider '{name}'")]
    UnknownProvider { name: String },

    /// A click handler id does not resolve against the injected registry.
    #[error("unknown click handler '{name}'")]
    UnknownHandler { name: String },

    /// The pagination block declares no page slots.
    #[error("pagination block declares no page slots")]
    EmptyPageSlots,

    /// A navigation slot collides with a page slot.
    #[error("navigation slot {slot} overlaps a page slot")]
    NavOverlap { slot: usize },

    /// Two templates claim the same slot at the same priority.
    #[error("slot {slot} assigned twice at priority {priority}")]
    AmbiguousSlot { slot: usize, priority: i32 },

    /// A visibility condition string could not be parsed.
    #[error("invalid condition '{text}'")]
    InvalidCondition { text: String },
}

/// A placeholder or item provider failed to produce a value.
///
/// Recoverable: the render engine substitutes the definition's fallback
/// content for the affected slot and continues with the rest of the grid.
#[derive(Debug, Clone, thiserror::Error)]
#[error("provider '{provider}' failed to resolve '{item}': {message}")]
pub struct ResolutionError {
    /// The provider that failed.
    pub provider: String,
    /// The item id that was being resolved.
    pub item: String,
    /// Human-readable failure description.
    pub message: String,
}

impl ResolutionError {
    /// Create a resolution error.
    pub fn new(
        provider: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            item: item.into(),
            message: message.into(),
        }
    }
}
