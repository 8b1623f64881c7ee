//! The render/diff engine.
//!
//! Rendering is split into two pure steps so logical computation and physical
//! mutation stay decoupled:
//!
//! 1. [`resolve`] produces the full logical slot grid for a session's current
//!    state (page index, custom data, viewer identity). Deterministic and
//!    side-effect-free.
//! 2. [`diff`] compares that grid against the session's last-rendered
//!    snapshot and yields the minimal [`RenderDelta`].
//!
//! Applying the delta is the caller's job and goes through the
//! [`Scheduler`](crate::scheduler::Scheduler); the session manager never
//! applies a delta for a session in `Closing`/`Closed` state.
//!
//! Per-slot failures are isolated: a provider that fails to resolve yields
//! the definition's fallback content for that slot and the rest of the grid
//! renders normally.

use crate::content::{Registries, ResolveContext};
use crate::session::MenuSession;
use crate::slot::SlotContent;

/// The minimal ordered set of slot mutations for one render cycle.
///
/// Transient: produced and consumed within a single cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderDelta {
    changes: Vec<(usize, Option<SlotContent>)>,
}

impl RenderDelta {
    /// The (slot index, new content) pairs, in ascending slot order.
    /// `None` clears the slot.
    pub fn changes(&self) -> &[(usize, Option<SlotContent>)] {
        &self.changes
    }

    /// Number of slots that change.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether nothing changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl IntoIterator for RenderDelta {
    type Item = (usize, Option<SlotContent>);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

/// Resolve the full logical slot grid for `session`.
pub fn resolve(session: &MenuSession, registries: &Registries) -> Vec<Option<SlotContent>> {
    let definition = session.definition();
    let page = session.clamped_page();
    let page_count = session.page_count();
    let ctx = ResolveContext {
        viewer: session.viewer(),
        page,
        page_count,
        data: session.data(),
    };

    let mut grid: Vec<Option<SlotContent>> = vec![None; definition.size()];

    // Templates are pre-sorted ascending by priority; later writes win.
    for template in definition.templates() {
        if let Some(condition) = &template.visible_if {
            if !condition.evaluate(registries, &ctx) {
                continue;
            }
        }

        let content = match &template.rule {
            crate::definition::ContentRule::Static(content) => content.clone(),
            crate::definition::ContentRule::Templated { item, handler } => {
                let mut item = item.clone();
                if let Some(name) = &item.name {
                    item.name = Some(registries.placeholders.apply(name, &ctx));
                }
                item.lore = item
                    .lore
                    .iter()
                    .map(|line| registries.placeholders.apply(line, &ctx))
                    .collect();
                SlotContent {
                    item,
                    handler: handler.clone(),
                }
            }
            crate::definition::ContentRule::Provider {
                provider,
                item_id,
                handler,
            } => {
                let resolved = registries
                    .providers
                    .get(provider)
                    .ok_or_else(|| {
                        crate::error::ResolutionError::new(
                            provider.clone(),
                            item_id.clone(),
                            "provider not registered",
                        )
                    })
                    .and_then(|p| p.resolve(item_id, &ctx));

                let item = match resolved {
                    Ok(item) => item,
                    Err(error) => {
                        tracing::warn!(
                            target: crate::logging::targets::RENDER,
                            %error,
                            "slot resolution failed, substituting fallback"
                        );
                        definition.fallback().clone()
                    }
                };
                SlotContent {
                    item,
                    handler: handler.clone(),
                }
            }
        };

        for &slot in &template.slots {
            grid[slot] = Some(content.clone());
        }
    }

    if let Some(pagination) = definition.pagination() {
        let items = &session.page_items;
        let start = page * pagination.items_per_page();

        // Page slots are dedicated: slots past the end of the item list are
        // cleared, not left to lower-priority content.
        for (offset, &slot) in pagination.page_slots.iter().enumerate() {
            grid[slot] = items.get(start + offset).cloned();
        }

        if page > 0 {
            if let Some(prev) = &pagination.prev {
                let mut item = prev.item.clone();
                if let Some(name) = &item.name {
                    item.name = Some(registries.placeholders.apply(name, &ctx));
                }
                grid[prev.slot] = Some(SlotContent::interactive(item, "prev_page"));
            }
        }
        if page + 1 < page_count {
            if let Some(next) = &pagination.next {
                let mut item = next.item.clone();
                if let Some(name) = &item.name {
                    item.name = Some(registries.placeholders.apply(name, &ctx));
                }
                grid[next.slot] = Some(SlotContent::interactive(item, "next_page"));
            }
        }
    }

    grid
}

/// Compute the minimal delta turning `snapshot` into `resolved`.
///
/// Slots compare by [`SlotContent`] equality (descriptor + handler id);
/// unchanged slots are omitted.
pub fn diff(snapshot: &[Option<SlotContent>], resolved: &[Option<SlotContent>]) -> RenderDelta {
    debug_assert_eq!(snapshot.len(), resolved.len());

    let changes = snapshot
        .iter()
        .zip(resolved.iter())
        .enumerate()
        .filter(|(_, (old, new))| old != new)
        .map(|(slot, (_, new))| (slot, new.clone()))
        .collect();

    RenderDelta { changes }
}
