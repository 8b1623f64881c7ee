//! The addressable slot grid and its content values.
//!
//! A menu surface is a fixed-size grid of discrete slots. [`SlotGrid`] is the
//! in-memory reference implementation of [`MenuSurface`]; hosts that render
//! into a native container implement [`MenuSurface`] themselves and mirror
//! writes into it.
//!
//! The grid is a pure data container with no threading logic of its own.
//! Callers are responsible for mutating it only from the execution context
//! the [`Scheduler`](crate::scheduler::Scheduler) designates for the owning
//! entity.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::content::ItemDescriptor;
use crate::error::{MenuError, Result};

/// Identifies a click handler bound to a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(Arc<str>);

impl HandlerId {
    /// Create a handler id.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// The handler id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HandlerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for HandlerId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The displayed content of one slot: an opaque item descriptor plus an
/// optional click-handler binding.
///
/// Two contents are equal iff descriptor and handler id match. The render
/// engine relies on this equality for diffing; anything that should force a
/// re-send of a slot must be part of the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotContent {
    /// The opaque item descriptor shown in the slot.
    pub item: ItemDescriptor,
    /// The click handler bound to the slot, if any.
    pub handler: Option<HandlerId>,
}

impl SlotContent {
    /// Content with no handler binding.
    pub fn display(item: ItemDescriptor) -> Self {
        Self {
            item,
            handler: None,
        }
    }

    /// Content with a handler binding.
    pub fn interactive(item: ItemDescriptor, handler: impl Into<HandlerId>) -> Self {
        Self {
            item,
            handler: Some(handler.into()),
        }
    }
}

impl From<ItemDescriptor> for SlotContent {
    fn from(item: ItemDescriptor) -> Self {
        Self::display(item)
    }
}

/// A live, slot-addressable surface that deltas are applied to.
///
/// The library never creates the host's native container; it only writes
/// into whatever surface the host hands it at open time. Implementations do
/// not need internal synchronization: every mutation arrives on the context
/// the scheduler designates for the owning entity.
///
/// Writes arrive while the manager's internal session state is locked, so
/// implementations must not call back into
/// [`MenuManager`](crate::MenuManager); push the slot content to the host and
/// return. Click handlers are the re-entrant seam.
pub trait MenuSurface: Send {
    /// Write `content` into the slot at `index`.
    fn set_slot(&mut self, index: usize, content: &SlotContent) -> Result<()>;

    /// Empty the slot at `index`.
    fn clear_slot(&mut self, index: usize) -> Result<()>;

    /// Total number of slots.
    fn size(&self) -> usize;

    /// Whether the surface can still be written to (e.g. the viewer is still
    /// a valid target in the host). A surface that reports `false` causes the
    /// owning session to close gracefully.
    fn is_valid(&self) -> bool {
        true
    }
}

/// Fixed-size in-memory slot grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotGrid {
    rows: usize,
    cols: usize,
    slots: Vec<Option<SlotContent>>,
}

impl SlotGrid {
    /// Create an empty grid of `rows x cols` slots.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            slots: vec![None; rows * cols],
        }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of slots.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Get the content at `index`.
    pub fn get_slot(&self, index: usize) -> Result<Option<&SlotContent>> {
        self.check_bounds(index)?;
        Ok(self.slots[index].as_ref())
    }

    /// Set the content at `index`.
    pub fn set_slot(&mut self, index: usize, content: SlotContent) -> Result<()> {
        self.check_bounds(index)?;
        self.slots[index] = Some(content);
        Ok(())
    }

    /// Clear the content at `index`.
    pub fn clear(&mut self, index: usize) -> Result<()> {
        self.check_bounds(index)?;
        self.slots[index] = None;
        Ok(())
    }

    /// Iterate over all slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<&SlotContent>)> {
        self.slots.iter().enumerate().map(|(i, s)| (i, s.as_ref()))
    }

    /// Wrap this grid in a cloneable, shared handle that implements
    /// [`MenuSurface`].
    pub fn shared(self) -> SharedSlotGrid {
        SharedSlotGrid {
            inner: Arc::new(Mutex::new(self)),
        }
    }

    fn check_bounds(&self, index: usize) -> Result<()> {
        if index < self.slots.len() {
            Ok(())
        } else {
            Err(MenuError::InvalidSlot {
                index,
                size: self.slots.len(),
            })
        }
    }
}

impl MenuSurface for SlotGrid {
    fn set_slot(&mut self, index: usize, content: &SlotContent) -> Result<()> {
        SlotGrid::set_slot(self, index, content.clone())
    }

    fn clear_slot(&mut self, index: usize) -> Result<()> {
        self.clear(index)
    }

    fn size(&self) -> usize {
        SlotGrid::size(self)
    }
}

/// A cloneable handle to a [`SlotGrid`], usable as a [`MenuSurface`] while
/// the host keeps its own reference for reading.
#[derive(Debug, Clone)]
pub struct SharedSlotGrid {
    inner: Arc<Mutex<SlotGrid>>,
}

impl SharedSlotGrid {
    /// Run `f` against the current grid state.
    pub fn with<R>(&self, f: impl FnOnce(&SlotGrid) -> R) -> R {
        f(&self.inner.lock())
    }

    /// Clone the content at `index`.
    pub fn get_slot(&self, index: usize) -> Result<Option<SlotContent>> {
        self.inner.lock().get_slot(index).map(|c| c.cloned())
    }
}

impl MenuSurface for SharedSlotGrid {
    fn set_slot(&mut self, index: usize, content: &SlotContent) -> Result<()> {
        self.inner.lock().set_slot(index, content.clone())
    }

    fn clear_slot(&mut self, index: usize) -> Result<()> {
        self.inner.lock().clear(index)
    }

    fn size(&self) -> usize {
        self.inner.lock().size()
    }
}
