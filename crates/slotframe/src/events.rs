//! Interaction dispatch: host events in, handler responses out.
//!
//! The host translates its native input events into [`RawInteraction`]s and
//! feeds them to [`MenuManager::handle_interaction`]. Dispatch is a pure
//! lookup against the session's last-rendered snapshot; routing invokes the
//! bound handler (if any) and reports whether the host's default action is
//! suppressed.
//!
//! Handlers are identified, never captured inline in slot content, so that
//! definitions stay serializable and snapshots stay comparable. A handler
//! that panics is caught and logged; the session survives.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::definition::MenuDefinition;
use crate::manager::MenuManager;
use crate::scheduler::ViewerId;
use crate::session::SessionId;
use crate::slot::{HandlerId, SlotContent};

/// The kind of a host input event targeting a menu surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    /// Primary click on a slot.
    LeftClick,
    /// Secondary click on a slot.
    RightClick,
    /// Primary click with the shift modifier held.
    ShiftLeftClick,
    /// Secondary click with the shift modifier held.
    ShiftRightClick,
    /// A drag gesture touching one or more slots.
    Drag,
    /// The host finished opening the surface. Informational; sessions are
    /// driven by [`MenuManager::open`](crate::MenuManager::open), not by this
    /// event.
    Open,
    /// The host closed the surface (viewer pressed escape, disconnected,
    /// or the container was destroyed).
    Close,
}

impl InteractionKind {
    /// Whether this kind carries a meaningful slot index.
    pub fn is_click(self) -> bool {
        !matches!(self, Self::Open | Self::Close)
    }
}

/// Modifier keys held during an interaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClickModifiers {
    /// Shift was held.
    pub shift: bool,
    /// A number key selected a hotbar slot alongside the click.
    pub hotbar_key: Option<u8>,
}

/// A host input event, untranslated beyond viewer/slot/kind.
#[derive(Debug, Clone)]
pub struct RawInteraction {
    /// The viewer that produced the event.
    pub viewer: ViewerId,
    /// The slot the event targets, if any.
    pub slot: Option<usize>,
    /// What happened.
    pub kind: InteractionKind,
    /// Modifier state.
    pub modifiers: ClickModifiers,
}

impl RawInteraction {
    /// A click of `kind` on `slot` by `viewer`.
    pub fn click(viewer: ViewerId, slot: usize, kind: InteractionKind) -> Self {
        Self {
            viewer,
            slot: Some(slot),
            kind,
            modifiers: ClickModifiers::default(),
        }
    }

    /// A surface-close event for `viewer`.
    pub fn close(viewer: ViewerId) -> Self {
        Self {
            viewer,
            slot: None,
            kind: InteractionKind::Close,
            modifiers: ClickModifiers::default(),
        }
    }
}

/// Everything a click handler may inspect.
///
/// The content (and thus the handler binding) comes from the session's
/// last-rendered snapshot, not from the definition: a click races against
/// refreshes, and the snapshot is what the viewer actually saw.
#[derive(Clone)]
pub struct ClickContext {
    /// The session the click landed in.
    pub session: SessionId,
    /// The clicking viewer.
    pub viewer: ViewerId,
    /// The menu definition the session renders.
    pub definition: Arc<MenuDefinition>,
    /// The clicked slot, if the interaction targets one.
    pub slot: Option<usize>,
    /// What happened.
    pub kind: InteractionKind,
    /// Modifier state.
    pub modifiers: ClickModifiers,
    /// Current page, clamped and 0-indexed.
    pub page: usize,
    /// Total page count.
    pub page_count: usize,
    /// The snapshot content of the clicked slot.
    pub content: Option<SlotContent>,
}

impl ClickContext {
    /// The handler id bound to the clicked slot's snapshot content.
    pub fn handler(&self) -> Option<&HandlerId> {
        self.content.as_ref().and_then(|c| c.handler.as_ref())
    }
}

/// What a handler asks the manager to do after the click.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClickResponse {
    /// Nothing beyond the default suppression policy.
    #[default]
    Ignored,
    /// Re-render the session.
    Refresh,
    /// Advance one page (no-op on the last page).
    NextPage,
    /// Go back one page (no-op on the first page).
    PrevPage,
    /// Jump to a specific 0-indexed page (clamped).
    SetPage(usize),
    /// Close the session.
    Close,
    /// Ask the host to open the named menu instead. The manager does not act
    /// on this itself; surfaces are host-created, so the host performs the
    /// open and may close this session first.
    OpenMenu(String),
}

/// A registered click handler.
pub type HandlerFn = Arc<dyn Fn(&ClickContext) -> ClickResponse + Send + Sync>;

/// Registry of named click handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<HandlerId, HandlerFn>>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in navigation handlers bound:
    /// `next_page`, `prev_page`, `close` and `refresh`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("next_page", |_| ClickResponse::NextPage);
        registry.register("prev_page", |_| ClickResponse::PrevPage);
        registry.register("close", |_| ClickResponse::Close);
        registry.register("refresh", |_| ClickResponse::Refresh);
        registry
    }

    /// Register `handler` under `id`, replacing any previous binding.
    pub fn register<F>(&self, id: impl Into<HandlerId>, handler: F)
    where
        F: Fn(&ClickContext) -> ClickResponse + Send + Sync + 'static,
    {
        self.handlers.write().insert(id.into(), Arc::new(handler));
    }

    /// Whether a handler is bound under `id`.
    pub fn contains(&self, id: &HandlerId) -> bool {
        self.handlers.read().contains_key(id)
    }

    /// Get the handler bound under `id`.
    pub fn get(&self, id: &HandlerId) -> Option<HandlerFn> {
        self.handlers.read().get(id).cloned()
    }
}

/// The outcome of routing one interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Whether the host must cancel its default action for this event.
    pub suppress_default: bool,
    /// The follow-up the handler requested. Already applied by
    /// [`MenuManager::handle_interaction`] except for
    /// [`ClickResponse::OpenMenu`], which the host acts on.
    pub response: ClickResponse,
}

impl MenuManager {
    /// Translate a raw host event into a click context.
    ///
    /// Returns `None` when the viewer has no active session, meaning the
    /// event is an ordinary host action the library has no stake in.
    pub fn dispatch(&self, raw: &RawInteraction) -> Option<ClickContext> {
        let sessions = self.inner.sessions.lock();
        let id = *sessions.by_viewer.get(&raw.viewer)?;
        let entry = sessions.entries.get(id)?;
        if !entry.session.lifecycle().is_active() {
            return None;
        }

        let content = raw
            .slot
            .and_then(|slot| entry.session.snapshot().get(slot))
            .and_then(|c| c.clone());

        Some(ClickContext {
            session: id,
            viewer: raw.viewer,
            definition: Arc::clone(entry.session.definition()),
            slot: raw.slot,
            kind: raw.kind,
            modifiers: raw.modifiers,
            page: entry.session.page(),
            page_count: entry.session.page_count(),
            content,
        })
    }

    /// Invoke the handler bound to the clicked slot and compute the default
    /// suppression policy.
    ///
    /// The session table lock is not held while the handler runs, so handlers
    /// may call back into the manager freely. A panicking handler is caught,
    /// logged, and treated as [`ClickResponse::Ignored`].
    pub fn route(&self, ctx: &ClickContext) -> Dispatch {
        let suppress_default = ctx.definition.cancel_by_default()
            && !ctx
                .slot
                .is_some_and(|slot| ctx.definition.is_slot_placeable(slot));

        let response = match ctx.handler().and_then(|id| self.registries().handlers.get(id)) {
            Some(handler) => match catch_unwind(AssertUnwindSafe(|| handler(ctx))) {
                Ok(response) => response,
                Err(_) => {
                    tracing::error!(
                        target: crate::logging::targets::DISPATCH,
                        viewer = ctx.viewer.raw(),
                        slot = ctx.slot,
                        handler = %ctx.handler().map(HandlerId::as_str).unwrap_or(""),
                        "click handler panicked"
                    );
                    ClickResponse::Ignored
                }
            },
            None => ClickResponse::Ignored,
        };

        tracing::trace!(
            target: crate::logging::targets::DISPATCH,
            viewer = ctx.viewer.raw(),
            slot = ctx.slot,
            suppress_default,
            ?response,
            "interaction routed"
        );

        Dispatch {
            suppress_default,
            response,
        }
    }

    /// Full interaction pipeline: dispatch, route, apply the response.
    ///
    /// Host close events close the session and return `None`; the host's
    /// teardown proceeds either way. All other responses except `OpenMenu`
    /// are applied before returning.
    pub fn handle_interaction(&self, raw: RawInteraction) -> Option<Dispatch> {
        match raw.kind {
            InteractionKind::Close => {
                let id = self.session_for(raw.viewer)?;
                self.close(id);
                return None;
            }
            InteractionKind::Open => return None,
            _ => {}
        }

        let ctx = self.dispatch(&raw)?;
        let dispatch = self.route(&ctx);

        match &dispatch.response {
            ClickResponse::Ignored | ClickResponse::OpenMenu(_) => {}
            ClickResponse::Refresh => self.refresh(ctx.session),
            ClickResponse::NextPage => self.set_page(ctx.session, ctx.page as i64 + 1),
            ClickResponse::PrevPage => self.set_page(ctx.session, ctx.page as i64 - 1),
            ClickResponse::SetPage(page) => self.set_page(ctx.session, *page as i64),
            ClickResponse::Close => self.close(ctx.session),
        }

        Some(dispatch)
    }
}
