//! Item descriptors, placeholder resolution and provider registries.
//!
//! The core treats item content as opaque: an [`ItemDescriptor`] is a
//! comparable value built by the host or by an external [`ItemProvider`]
//! (cosmetic registries, custom-item systems). Placeholders are named
//! resolvers that substitute `{token}` occurrences in display text at render
//! time.
//!
//! Registries are explicit and injected (bundled in [`Registries`]) rather
//! than ambient global state, so sessions stay independently testable.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use regex::Regex;

use crate::error::ResolutionError;
use crate::events::HandlerRegistry;
use crate::scheduler::ViewerId;
use crate::session::DataBag;

/// Placeholder token pattern: `{snake_case_token}`.
fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-z0-9_]+)\}").expect("valid token pattern"))
}

/// Extract all placeholder tokens referenced by `text`.
pub fn placeholder_tokens(text: &str) -> Vec<String> {
    token_pattern()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// An opaque, comparable item descriptor.
///
/// The core never interprets these fields beyond equality; they exist so the
/// host can map a descriptor onto whatever its native item representation is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemDescriptor {
    /// Host-meaningful material or model identifier.
    pub id: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Optional lore lines shown under the name.
    pub lore: Vec<String>,
    /// Stack size shown in the slot.
    pub amount: u32,
}

impl ItemDescriptor {
    /// A descriptor with just an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            lore: Vec::new(),
            amount: 1,
        }
    }

    /// Set the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the lore lines.
    pub fn with_lore(mut self, lore: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.lore = lore.into_iter().map(Into::into).collect();
        self
    }

    /// Set the stack size.
    pub fn with_amount(mut self, amount: u32) -> Self {
        self.amount = amount;
        self
    }
}

/// Everything a resolver may inspect when producing a value for one slot.
///
/// Resolution is deterministic and side-effect-free with respect to this
/// context.
pub struct ResolveContext<'a> {
    /// The viewer the menu is rendered for.
    pub viewer: ViewerId,
    /// Current page, clamped and 0-indexed.
    pub page: usize,
    /// Total number of pages (at least 1).
    pub page_count: usize,
    /// The session's custom data bag.
    pub data: &'a DataBag,
}

/// A named placeholder resolver.
pub type PlaceholderFn = Arc<dyn Fn(&ResolveContext<'_>) -> String + Send + Sync>;

/// Registry of placeholder resolvers.
///
/// `page` and `total_pages` are built in (1-indexed for display, matching
/// what viewers expect to read) and always resolve.
#[derive(Default)]
pub struct PlaceholderRegistry {
    resolvers: RwLock<HashMap<String, PlaceholderFn>>,
}

impl PlaceholderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver under `name`, replacing any previous one.
    ///
    /// Resolvers run inside render cycles; like
    /// [`ItemProvider::resolve`], they must not call back into the manager.
    pub fn register<F>(&self, name: impl Into<String>, resolver: F)
    where
        F: Fn(&ResolveContext<'_>) -> String + Send + Sync + 'static,
    {
        self.resolvers
            .write()
            .insert(name.into(), Arc::new(resolver));
    }

    /// Whether `name` resolves (registered or built in).
    pub fn contains(&self, name: &str) -> bool {
        matches!(name, "page" | "total_pages") || self.resolvers.read().contains_key(name)
    }

    /// Resolve one token. Returns `None` for unknown tokens; definition
    /// validation makes that unreachable for loaded menus.
    pub fn resolve(&self, name: &str, ctx: &ResolveContext<'_>) -> Option<String> {
        match name {
            "page" => Some((ctx.page + 1).to_string()),
            "total_pages" => Some(ctx.page_count.to_string()),
            _ => {
                let resolver = self.resolvers.read().get(name).cloned();
                resolver.map(|f| f(ctx))
            }
        }
    }

    /// Substitute every `{token}` occurrence in `text`.
    ///
    /// Unknown tokens are left verbatim rather than erased, so a validation
    /// gap shows up in-game instead of silently hiding data.
    pub fn apply(&self, text: &str, ctx: &ResolveContext<'_>) -> String {
        token_pattern()
            .replace_all(text, |caps: &regex::Captures<'_>| {
                self.resolve(&caps[1], ctx)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// An external item-descriptor source.
///
/// Implemented by adapters over third-party item or cosmetic registries. The
/// core only calls `resolve` and treats the result as an opaque value.
///
/// `resolve` runs inside a render cycle while the manager's internal session
/// state is locked: it must not call back into
/// [`MenuManager`](crate::MenuManager). Providers that need manager state
/// should read it through the [`ResolveContext`] instead.
pub trait ItemProvider: Send + Sync {
    /// Resolve `item_id` into a descriptor for the given context.
    fn resolve(
        &self,
        item_id: &str,
        ctx: &ResolveContext<'_>,
    ) -> Result<ItemDescriptor, ResolutionError>;
}

/// Registry of named [`ItemProvider`]s.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn ItemProvider>>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under `name`, replacing any previous one.
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn ItemProvider>) {
        self.providers.write().insert(name.into(), provider);
    }

    /// Whether a provider named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.providers.read().contains_key(name)
    }

    /// Get the provider registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ItemProvider>> {
        self.providers.read().get(name).cloned()
    }
}

/// The injected registries a definition is validated against and rendered
/// with.
#[derive(Default)]
pub struct Registries {
    /// Placeholder resolvers.
    pub placeholders: PlaceholderRegistry,
    /// Item descriptor providers.
    pub providers: ProviderRegistry,
    /// Click handlers.
    pub handlers: HandlerRegistry,
}

impl Registries {
    /// Registries with the built-in click handlers
    /// (`next_page`, `prev_page`, `close`, `refresh`) pre-bound.
    pub fn with_builtins() -> Self {
        Self {
            placeholders: PlaceholderRegistry::new(),
            providers: ProviderRegistry::new(),
            handlers: HandlerRegistry::with_builtins(),
        }
    }
}
