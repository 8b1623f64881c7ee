//! The session manager: open/close lifecycle, refresh coalescing, and the
//! render cycle.
//!
//! [`MenuManager`] owns every live [`MenuSession`] and is the only component
//! that touches a [`MenuSurface`]. All surface mutation happens inside render
//! cycle tasks routed through the injected [`Scheduler`], so writes always
//! land on the execution context that owns the viewer's surface.
//!
//! Refreshes coalesce: while a render cycle is in flight, any number of
//! further refresh requests collapse into exactly one follow-up cycle. A
//! closing session discards in-flight render output instead of applying it.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::SlotMap;

use crate::content::Registries;
use crate::definition::{LifecycleObserver, MenuDefinition};
use crate::error::{MenuError, Result};
use crate::render;
use crate::scheduler::{ContextKey, Scheduler, TaskHandle, ViewerId};
use crate::session::{DataBag, Lifecycle, MenuSession, SessionId};
use crate::slot::{MenuSurface, SlotContent};

/// Which slots a render cycle is allowed to touch.
#[derive(Clone)]
enum RenderScope {
    /// Resolve and apply the whole grid.
    Full,
    /// Apply only the listed slots; the rest of the surface and snapshot
    /// stay as they are.
    Slots(Arc<[usize]>),
}

pub(crate) struct SessionEntry {
    pub(crate) session: MenuSession,
    pub(crate) surface: Box<dyn MenuSurface>,
    pub(crate) refresh_handle: Option<TaskHandle>,
}

#[derive(Default)]
pub(crate) struct SessionTable {
    pub(crate) entries: SlotMap<SessionId, SessionEntry>,
    pub(crate) by_viewer: HashMap<ViewerId, SessionId>,
}

pub(crate) struct ManagerInner {
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) registries: Arc<Registries>,
    pub(crate) sessions: Mutex<SessionTable>,
}

/// Owns all live sessions and drives their render cycles.
///
/// Cloning is cheap and shares the same session table; hosts typically keep
/// one clone in their event listener and one wherever menus are opened.
#[derive(Clone)]
pub struct MenuManager {
    pub(crate) inner: Arc<ManagerInner>,
}

static_assertions::assert_impl_all!(MenuManager: Send, Sync);

impl MenuManager {
    /// Create a manager over the given scheduler and registries.
    pub fn new(scheduler: Arc<dyn Scheduler>, registries: Arc<Registries>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                scheduler,
                registries,
                sessions: Mutex::new(SessionTable::default()),
            }),
        }
    }

    /// The registries definitions are validated against and rendered with.
    pub fn registries(&self) -> &Registries {
        &self.inner.registries
    }

    /// The scheduler render cycles are routed through.
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.inner.scheduler
    }

    /// Open `definition` for `viewer` on the given surface.
    ///
    /// The initial render is scheduled on `context` and applied on its next
    /// tick; the session transitions `Opening` to `Open` when it lands. A
    /// viewer holds at most one session, so any existing session for `viewer`
    /// is closed first.
    pub fn open(
        &self,
        definition: Arc<MenuDefinition>,
        viewer: ViewerId,
        context: ContextKey,
        surface: Box<dyn MenuSurface>,
    ) -> Result<SessionId> {
        self.open_at(definition, viewer, context, surface, 0)
    }

    /// Open at a specific initial page. Out-of-range pages clamp to the last
    /// valid page for the definition's item list.
    pub fn open_at(
        &self,
        definition: Arc<MenuDefinition>,
        viewer: ViewerId,
        context: ContextKey,
        surface: Box<dyn MenuSurface>,
        initial_page: usize,
    ) -> Result<SessionId> {
        if surface.size() < definition.size() {
            return Err(MenuError::SurfaceRejected {
                reason: format!(
                    "surface has {} slots, definition needs {}",
                    surface.size(),
                    definition.size()
                ),
            });
        }
        if !surface.is_valid() {
            return Err(MenuError::SurfaceRejected {
                reason: "surface is no longer a valid render target".into(),
            });
        }

        if let Some(existing) = self.session_for(viewer) {
            self.close(existing);
        }

        let id = {
            let mut sessions = self.inner.sessions.lock();
            let mut session = MenuSession::new(Arc::clone(&definition), viewer, context, initial_page);
            // The initial render counts as in-flight so early refresh calls
            // coalesce into it.
            session.render_in_flight = true;
            let id = sessions.entries.insert(SessionEntry {
                session,
                surface,
                refresh_handle: None,
            });
            sessions.by_viewer.insert(viewer, id);

            if let Some(refresh) = definition.refresh() {
                let scope = if refresh.is_refresh_all() {
                    RenderScope::Full
                } else {
                    RenderScope::Slots(Arc::from(refresh.slots.as_slice()))
                };
                let manager = self.clone();
                let interval = refresh.interval_ticks.max(1);
                let handle = self.inner.scheduler.run_repeating(
                    context,
                    interval,
                    interval,
                    Box::new(move || manager.request_render(id, scope.clone())),
                );
                sessions.entries[id].refresh_handle = Some(handle);
            }
            id
        };

        tracing::debug!(
            target: crate::logging::targets::SESSION,
            menu = definition.name(),
            viewer = viewer.raw(),
            "session opened"
        );
        self.schedule_render(id, context, RenderScope::Full);
        Ok(id)
    }

    /// Close the session.
    ///
    /// Idempotent; unknown or already-closed ids are ignored. The session
    /// enters `Closing` immediately (pending render output is discarded from
    /// then on) and the entry is removed on the owning context's next tick.
    pub fn close(&self, id: SessionId) {
        let context = {
            let mut sessions = self.inner.sessions.lock();
            let Some(entry) = sessions.entries.get_mut(id) else {
                return;
            };
            if !entry.session.lifecycle.advance(Lifecycle::Closing) {
                return;
            }
            if let Some(handle) = entry.refresh_handle.take() {
                handle.cancel();
            }
            entry.session.context()
        };

        let manager = self.clone();
        self.inner.scheduler.run_on_context(
            context,
            Box::new(move || manager.finish_close(id)),
        );
    }

    fn finish_close(&self, id: SessionId) {
        let removed = {
            let mut sessions = self.inner.sessions.lock();
            let Some(mut entry) = sessions.entries.remove(id) else {
                return;
            };
            entry.session.lifecycle.advance(Lifecycle::Closed);
            if sessions.by_viewer.get(&entry.session.viewer()) == Some(&id) {
                sessions.by_viewer.remove(&entry.session.viewer());
            }
            entry
        };

        tracing::debug!(
            target: crate::logging::targets::SESSION,
            menu = removed.session.definition().name(),
            viewer = removed.session.viewer().raw(),
            "session closed"
        );
        let observers = removed.session.definition().on_close.clone();
        fire_observers(&observers, removed.session.viewer(), "on_close");
    }

    /// Request a full re-render of the session.
    ///
    /// Safe to call from any thread, including from inside click handlers.
    /// Requests made while a render is in flight coalesce into exactly one
    /// follow-up cycle.
    pub fn refresh(&self, id: SessionId) {
        self.request_render(id, RenderScope::Full);
    }

    /// Jump the session to `page` (0-indexed), clamped to the valid range.
    ///
    /// Out-of-range requests clamp rather than error, so `next_page` on the
    /// last page is a no-op that produces an empty delta. A page change
    /// triggers a re-render only when the effective page actually changes.
    pub fn set_page(&self, id: SessionId, page: i64) {
        let changed = {
            let mut sessions = self.inner.sessions.lock();
            let Some(entry) = sessions.entries.get_mut(id) else {
                tracing::debug!(
                    target: crate::logging::targets::SESSION,
                    ?id,
                    "set_page on unknown session ignored"
                );
                return;
            };
            if !entry.session.lifecycle().is_active() {
                return;
            }
            let max = entry.session.page_count() - 1;
            let target = page.clamp(0, max as i64) as usize;
            let current = entry.session.clamped_page();
            entry.session.page = target;
            target != current
        };
        if changed {
            self.refresh(id);
        }
    }

    /// Replace the session's logical page item list and re-render.
    ///
    /// The current page is preserved where possible; if the new list has
    /// fewer pages the session clamps to the new last page.
    pub fn set_page_items(&self, id: SessionId, items: Vec<SlotContent>) -> Result<()> {
        {
            let mut sessions = self.inner.sessions.lock();
            let entry = sessions
                .entries
                .get_mut(id)
                .ok_or(MenuError::SessionNotFound(id))?;
            entry.session.page_items = items;
        }
        self.refresh(id);
        Ok(())
    }

    /// Mutate the session's custom data bag, then re-render.
    pub fn update_data(&self, id: SessionId, f: impl FnOnce(&mut DataBag)) -> Result<()> {
        {
            let mut sessions = self.inner.sessions.lock();
            let entry = sessions
                .entries
                .get_mut(id)
                .ok_or(MenuError::SessionNotFound(id))?;
            f(entry.session.data_mut());
        }
        self.refresh(id);
        Ok(())
    }

    /// The active session for `viewer`, if any.
    pub fn session_for(&self, viewer: ViewerId) -> Option<SessionId> {
        self.inner.sessions.lock().by_viewer.get(&viewer).copied()
    }

    /// The session's lifecycle state, or `None` for unknown ids.
    pub fn lifecycle(&self, id: SessionId) -> Option<Lifecycle> {
        let sessions = self.inner.sessions.lock();
        sessions.entries.get(id).map(|e| e.session.lifecycle())
    }

    /// The session's current page (clamped, 0-indexed).
    pub fn page(&self, id: SessionId) -> Option<usize> {
        let sessions = self.inner.sessions.lock();
        sessions.entries.get(id).map(|e| e.session.page())
    }

    /// The session's total page count.
    pub fn page_count(&self, id: SessionId) -> Option<usize> {
        let sessions = self.inner.sessions.lock();
        sessions.entries.get(id).map(|e| e.session.page_count())
    }

    /// A copy of the session's last-rendered snapshot.
    pub fn snapshot(&self, id: SessionId) -> Option<Vec<Option<SlotContent>>> {
        let sessions = self.inner.sessions.lock();
        sessions.entries.get(id).map(|e| e.session.snapshot().to_vec())
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().entries.len()
    }

    fn request_render(&self, id: SessionId, scope: RenderScope) {
        let context = {
            let mut sessions = self.inner.sessions.lock();
            let Some(entry) = sessions.entries.get_mut(id) else {
                tracing::debug!(
                    target: crate::logging::targets::SESSION,
                    ?id,
                    "refresh on unknown session ignored"
                );
                return;
            };
            if !entry.session.lifecycle().is_active() {
                return;
            }
            if entry.session.render_in_flight {
                // Coalesce; scoped requests widen to a full follow-up.
                entry.session.refresh_pending = true;
                return;
            }
            entry.session.render_in_flight = true;
            entry.session.context()
        };
        self.schedule_render(id, context, scope);
    }

    fn schedule_render(&self, id: SessionId, context: ContextKey, scope: RenderScope) {
        let manager = self.clone();
        self.inner.scheduler.run_on_context(
            context,
            Box::new(move || manager.run_render_cycle(id, scope)),
        );
    }

    /// One render cycle: resolve, diff against the snapshot, apply to the
    /// surface. Runs on the session's owning context.
    ///
    /// Providers, placeholder resolvers and the surface are invoked with the
    /// session table locked; their trait docs forbid calling back into the
    /// manager from there.
    fn run_render_cycle(&self, id: SessionId, scope: RenderScope) {
        let mut opened: Option<(Vec<LifecycleObserver>, ViewerId)> = None;
        let mut refreshed: Option<(Vec<LifecycleObserver>, ViewerId)> = None;
        let mut failed = false;

        {
            let mut sessions = self.inner.sessions.lock();
            let Some(entry) = sessions.entries.get_mut(id) else {
                return;
            };
            if !entry.session.lifecycle().is_renderable() {
                // Closing or closed: discard the output entirely.
                entry.session.render_in_flight = false;
                entry.session.refresh_pending = false;
                return;
            }
            if !entry.surface.is_valid() {
                tracing::warn!(
                    target: crate::logging::targets::RENDER,
                    viewer = entry.session.viewer().raw(),
                    "surface no longer valid, closing session"
                );
                failed = true;
            } else {
                let resolved = render::resolve(&entry.session, &self.inner.registries);
                let delta = render::diff(entry.session.snapshot(), &resolved);

                let mut applied = 0usize;
                for (slot, content) in delta {
                    if let RenderScope::Slots(slots) = &scope {
                        if !slots.contains(&slot) {
                            continue;
                        }
                    }
                    let result = match &content {
                        Some(content) => entry.surface.set_slot(slot, content),
                        None => entry.surface.clear_slot(slot),
                    };
                    match result {
                        Ok(()) => {
                            entry.session.snapshot[slot] = content;
                            applied += 1;
                        }
                        Err(error) => {
                            tracing::error!(
                                target: crate::logging::targets::RENDER,
                                viewer = entry.session.viewer().raw(),
                                slot,
                                %error,
                                "surface write failed, closing session"
                            );
                            failed = true;
                            break;
                        }
                    }
                }

                if !failed {
                    tracing::trace!(
                        target: crate::logging::targets::RENDER,
                        viewer = entry.session.viewer().raw(),
                        applied,
                        "render cycle applied"
                    );
                    let viewer = entry.session.viewer();
                    if entry.session.lifecycle.advance(Lifecycle::Open) {
                        opened = Some((entry.session.definition().on_open.clone(), viewer));
                    } else {
                        refreshed = Some((entry.session.definition().on_refresh.clone(), viewer));
                    }
                }
            }

            entry.session.render_in_flight = false;
            if !failed && entry.session.refresh_pending {
                entry.session.refresh_pending = false;
                entry.session.render_in_flight = true;
                let context = entry.session.context();
                drop(sessions);
                self.schedule_render(id, context, RenderScope::Full);
            }
        }

        if failed {
            self.close(id);
            return;
        }
        if let Some((observers, viewer)) = opened {
            fire_observers(&observers, viewer, "on_open");
        }
        if let Some((observers, viewer)) = refreshed {
            fire_observers(&observers, viewer, "on_refresh");
        }
    }
}

/// Invoke lifecycle observers outside the session lock, isolating panics.
fn fire_observers(observers: &[LifecycleObserver], viewer: ViewerId, stage: &str) {
    for observer in observers {
        if catch_unwind(AssertUnwindSafe(|| observer(viewer))).is_err() {
            tracing::error!(
                target: crate::logging::targets::SESSION,
                viewer = viewer.raw(),
                stage,
                "lifecycle observer panicked"
            );
        }
    }
}
