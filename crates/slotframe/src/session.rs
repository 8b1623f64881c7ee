//! Per-viewer menu sessions and their lifecycle state machine.
//!
//! A [`MenuSession`] is the mutable half of an open menu: one exists per
//! (viewer, open menu instance), owned exclusively by the
//! [`MenuManager`](crate::manager::MenuManager) and destroyed on close. The
//! immutable half is the shared [`MenuDefinition`](crate::MenuDefinition) it
//! references.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use slotmap::new_key_type;

use crate::definition::MenuDefinition;
use crate::scheduler::{ContextKey, ViewerId};
use crate::slot::SlotContent;

new_key_type! {
    /// A unique identifier for an open menu session.
    pub struct SessionId;
}

/// Session lifecycle state. Transitions are forward-only; there is no
/// resurrection of a closed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Lifecycle {
    /// Registered; initial render not yet applied.
    Opening,
    /// Live: accepts clicks and refresh triggers.
    Open,
    /// Close requested; renders are discarded, no new work accepted.
    Closing,
    /// Terminal; the session id is invalid for all operations.
    Closed,
}

impl Lifecycle {
    /// Whether render output may still be applied for this state.
    pub fn is_renderable(self) -> bool {
        matches!(self, Self::Opening | Self::Open)
    }

    /// Whether the session still accepts operations (clicks, refreshes,
    /// page changes).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Opening | Self::Open)
    }

    /// Move forward to `next` if that is a forward transition; backward
    /// requests leave the state unchanged.
    pub(crate) fn advance(&mut self, next: Lifecycle) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

/// Typed key/value bag for handler-defined session state.
///
/// Owned by a single session and never shared across sessions.
#[derive(Default)]
pub struct DataBag {
    values: HashMap<String, Box<dyn Any + Send>>,
}

impl DataBag {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn insert<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Get the value under `key` if it exists and has type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref())
    }

    /// Remove and return the value under `key` if it has type `T`.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        let value = self.values.remove(key)?;
        match value.downcast::<T>() {
            Ok(boxed) => Some(*boxed),
            Err(value) => {
                // Wrong type requested; keep the stored value.
                self.values.insert(key.into(), value);
                None
            }
        }
    }

    /// Whether any value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

/// One open menu instance for one viewer.
pub struct MenuSession {
    pub(crate) definition: Arc<MenuDefinition>,
    pub(crate) viewer: ViewerId,
    pub(crate) context: ContextKey,
    pub(crate) page: usize,
    pub(crate) page_items: Vec<SlotContent>,
    pub(crate) data: DataBag,
    /// Exactly what was last applied to the live surface.
    pub(crate) snapshot: Vec<Option<SlotContent>>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) render_in_flight: bool,
    pub(crate) refresh_pending: bool,
}

impl MenuSession {
    pub(crate) fn new(
        definition: Arc<MenuDefinition>,
        viewer: ViewerId,
        context: ContextKey,
        initial_page: usize,
    ) -> Self {
        let size = definition.size();
        let page_items = definition.page_items().to_vec();
        Self {
            definition,
            viewer,
            context,
            page: initial_page,
            page_items,
            data: DataBag::new(),
            snapshot: vec![None; size],
            lifecycle: Lifecycle::Opening,
            render_in_flight: false,
            refresh_pending: false,
        }
    }

    /// The definition this session renders.
    pub fn definition(&self) -> &Arc<MenuDefinition> {
        &self.definition
    }

    /// The viewer this session belongs to.
    pub fn viewer(&self) -> ViewerId {
        self.viewer
    }

    /// The execution context that owns this session's surface.
    pub fn context(&self) -> ContextKey {
        self.context
    }

    /// Current page, clamped and 0-indexed.
    pub fn page(&self) -> usize {
        self.clamped_page()
    }

    /// Total pages for the session's current item list; 1 for non-paginated
    /// menus.
    pub fn page_count(&self) -> usize {
        self.definition
            .pagination()
            .map(|p| p.page_count(self.page_items.len()))
            .unwrap_or(1)
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// The session's custom data bag.
    pub fn data(&self) -> &DataBag {
        &self.data
    }

    /// Mutable access to the custom data bag.
    pub fn data_mut(&mut self) -> &mut DataBag {
        &mut self.data
    }

    /// Last-rendered slot contents, exactly as applied to the surface.
    pub fn snapshot(&self) -> &[Option<SlotContent>] {
        &self.snapshot
    }

    pub(crate) fn clamped_page(&self) -> usize {
        self.page.min(self.page_count() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_only_advances_forward() {
        let mut state = Lifecycle::Opening;
        assert!(state.advance(Lifecycle::Open));
        assert!(state.advance(Lifecycle::Closing));
        assert!(!state.advance(Lifecycle::Open));
        assert_eq!(state, Lifecycle::Closing);
        assert!(state.advance(Lifecycle::Closed));
        assert!(!state.advance(Lifecycle::Closed));
        assert_eq!(state, Lifecycle::Closed);
    }

    #[test]
    fn renderable_states() {
        assert!(Lifecycle::Opening.is_renderable());
        assert!(Lifecycle::Open.is_renderable());
        assert!(!Lifecycle::Closing.is_renderable());
        assert!(!Lifecycle::Closed.is_renderable());
    }

    #[test]
    fn data_bag_is_typed() {
        let mut bag = DataBag::new();
        bag.insert("count", 3usize);
        bag.insert("label", String::from("hello"));

        assert_eq!(bag.get::<usize>("count"), Some(&3));
        assert_eq!(bag.get::<String>("count"), None);
        assert!(bag.contains("label"));

        // A wrong-typed remove leaves the value in place.
        assert_eq!(bag.remove::<u8>("count"), None);
        assert_eq!(bag.remove::<usize>("count"), Some(3));
        assert!(!bag.contains("count"));
    }
}
