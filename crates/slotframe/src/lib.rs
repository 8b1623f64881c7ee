//! Grid-based, slot-addressable menus for tick-driven host runtimes.
//!
//! slotframe turns a host's fixed-size container surfaces (inventory windows,
//! dialog grids) into declarative, paginated, auto-refreshing menus. The host
//! supplies three things: a [`Scheduler`] implementation matching its
//! threading model, a [`MenuSurface`] per open window, and a stream of
//! [`RawInteraction`]s from its input events. Everything else, rendering,
//! diffing, pagination, click routing and session lifecycle, lives here.
//!
//! # Architecture
//!
//! - [`MenuDefinition`]: immutable menu template, built programmatically via
//!   [`DefinitionBuilder`] or loaded from a TOML document ([`config`]).
//!   Validated up front against the injected [`Registries`].
//! - [`MenuManager`]: owns all live [`MenuSession`]s, drives render cycles
//!   through the scheduler, and routes interactions to handlers.
//! - [`Scheduler`]: the host's tick model. [`TickScheduler`] for a single
//!   global tick thread, [`RegionScheduler`] for region-threaded hosts.
//!
//! Renders are computed as a full logical grid, diffed against the session's
//! last-applied snapshot, and only the changed slots touch the surface.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use slotframe::{
//!     ContextKey, ItemDescriptor, MenuDefinition, MenuManager, Registries,
//!     SlotContent, SlotGrid, SlotTemplate, TickScheduler, ViewerId,
//! };
//!
//! # fn main() -> slotframe::Result<()> {
//! let scheduler = Arc::new(TickScheduler::new());
//! let registries = Arc::new(Registries::with_builtins());
//! let manager = MenuManager::new(scheduler.clone(), registries.clone());
//!
//! let definition = MenuDefinition::builder("hello")
//!     .title("Hello")
//!     .grid(1, 9)
//!     .template(SlotTemplate::fixed(
//!         vec![4],
//!         SlotContent::interactive(ItemDescriptor::new("emerald"), "close"),
//!     ))
//!     .build(&registries)?;
//!
//! let surface = SlotGrid::new(1, 9).shared();
//! manager.open(definition, ViewerId::new(1), ContextKey::Global, Box::new(surface))?;
//!
//! // In the host's main loop:
//! scheduler.tick();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod content;
pub mod definition;
pub mod error;
pub mod events;
pub mod logging;
pub mod manager;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod slot;

pub use config::{load_definition, MenuConfig, SlotSpec};
pub use content::{
    ItemDescriptor, ItemProvider, PlaceholderRegistry, ProviderRegistry, Registries,
    ResolveContext,
};
pub use definition::{
    Condition, ContentRule, DefinitionBuilder, MenuDefinition, NavButton, PaginationConfig,
    RefreshConfig, SlotTemplate, DEFAULT_SLOT_LIMIT,
};
pub use error::{DefinitionError, MenuError, ResolutionError, Result};
pub use events::{
    ClickContext, ClickModifiers, ClickResponse, Dispatch, HandlerRegistry, InteractionKind,
    RawInteraction,
};
pub use manager::MenuManager;
pub use render::RenderDelta;
pub use scheduler::{
    ContextKey, RegionId, RegionScheduler, Scheduler, TaskHandle, TickScheduler, ViewerId,
};
pub use session::{DataBag, Lifecycle, MenuSession, SessionId};
pub use slot::{HandlerId, MenuSurface, SharedSlotGrid, SlotContent, SlotGrid};
