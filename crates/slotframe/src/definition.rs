//! Immutable menu definitions and their build-time validation.
//!
//! A [`MenuDefinition`] is produced once, from configuration or through
//! [`DefinitionBuilder`], and then shared read-only across every session that
//! uses it. All referential problems (unknown placeholders, providers or
//! handlers, out-of-range slots, overlapping pagination) are rejected here,
//! at build time, never at render time.

use std::sync::Arc;

use crate::content::{placeholder_tokens, ItemDescriptor, Registries, ResolveContext};
use crate::error::DefinitionError;
use crate::scheduler::ViewerId;
use crate::slot::SlotContent;

/// Default host-imposed maximum grid size (six rows of nine).
pub const DEFAULT_SLOT_LIMIT: usize = 54;

/// A rule producing the content for one or more slots.
#[derive(Clone)]
pub enum ContentRule {
    /// Fixed content, placed as-is.
    Static(SlotContent),
    /// Content whose name/lore contain `{placeholder}` tokens substituted at
    /// render time.
    Templated {
        /// The item with unexpanded tokens.
        item: ItemDescriptor,
        /// Optional click handler binding.
        handler: Option<crate::slot::HandlerId>,
    },
    /// Content resolved through a named external [`ItemProvider`]
    /// (`crate::content::ItemProvider`) at render time.
    Provider {
        /// Registered provider name.
        provider: String,
        /// Item id passed to the provider.
        item_id: String,
        /// Optional click handler binding.
        handler: Option<crate::slot::HandlerId>,
    },
}

/// A pure, stateless slot rule: which slots it fills, how, and when.
#[derive(Clone)]
pub struct SlotTemplate {
    /// Slot indices this template fills.
    pub slots: Vec<usize>,
    /// How the content is produced.
    pub rule: ContentRule,
    /// Templates are applied in ascending priority; higher priority wins
    /// overlapping slots.
    pub priority: i32,
    /// Render the template only when this condition holds.
    pub visible_if: Option<Condition>,
}

impl SlotTemplate {
    /// A static template at priority 0.
    pub fn fixed(slots: Vec<usize>, content: SlotContent) -> Self {
        Self {
            slots,
            rule: ContentRule::Static(content),
            priority: 0,
            visible_if: None,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the visibility condition.
    pub fn visible_when(mut self, condition: Condition) -> Self {
        self.visible_if = Some(condition);
        self
    }

    fn handler(&self) -> Option<&crate::slot::HandlerId> {
        match &self.rule {
            ContentRule::Static(content) => content.handler.as_ref(),
            ContentRule::Templated { handler, .. } => handler.as_ref(),
            ContentRule::Provider { handler, .. } => handler.as_ref(),
        }
    }
}

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondOp {
    /// `==` / `equals`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
}

/// A visibility condition of the form `{token} <op> value`.
///
/// The token is resolved through the placeholder registry; values that parse
/// as numbers on both sides compare numerically, otherwise `==`/`!=` compare
/// as strings and the ordering operators evaluate to false.
#[derive(Debug, Clone)]
pub struct Condition {
    token: String,
    op: CondOp,
    value: String,
}

impl Condition {
    /// Parse a condition string such as `{page} == 0` or
    /// `{rank} equals vip`.
    pub fn parse(text: &str) -> Result<Self, DefinitionError> {
        let invalid = || DefinitionError::InvalidCondition { text: text.into() };

        let trimmed = text.trim();
        let rest = trimmed.strip_prefix('{').ok_or_else(invalid)?;
        let (token, rest) = rest.split_once('}').ok_or_else(invalid)?;
        let mut parts = rest.trim().splitn(2, ' ');
        let op = match parts.next().ok_or_else(invalid)? {
            "==" | "equals" => CondOp::Eq,
            "!=" => CondOp::Ne,
            ">" => CondOp::Gt,
            "<" => CondOp::Lt,
            ">=" => CondOp::Ge,
            "<=" => CondOp::Le,
            _ => return Err(invalid()),
        };
        let value = parts.next().ok_or_else(invalid)?.trim();
        if token.is_empty() || value.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            token: token.into(),
            op,
            value: value.into(),
        })
    }

    /// The placeholder token the condition reads.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Evaluate against the given resolve context.
    pub fn evaluate(&self, registries: &Registries, ctx: &ResolveContext<'_>) -> bool {
        let Some(lhs) = registries.placeholders.resolve(&self.token, ctx) else {
            return false;
        };

        if let (Ok(lhs), Ok(rhs)) = (lhs.parse::<f64>(), self.value.parse::<f64>()) {
            return match self.op {
                CondOp::Eq => lhs == rhs,
                CondOp::Ne => lhs != rhs,
                CondOp::Gt => lhs > rhs,
                CondOp::Lt => lhs < rhs,
                CondOp::Ge => lhs >= rhs,
                CondOp::Le => lhs <= rhs,
            };
        }

        match self.op {
            CondOp::Eq => lhs.eq_ignore_ascii_case(&self.value),
            CondOp::Ne => !lhs.eq_ignore_ascii_case(&self.value),
            _ => false,
        }
    }
}

/// A pagination navigation button.
#[derive(Debug, Clone)]
pub struct NavButton {
    /// The slot the button occupies.
    pub slot: usize,
    /// The item shown in the button.
    pub item: ItemDescriptor,
}

/// Pagination layout: which slots hold page items and where the navigation
/// buttons sit.
///
/// Navigation buttons are bound to the built-in `prev_page`/`next_page`
/// handlers and are only rendered when the corresponding direction exists,
/// matching how paginated menus conventionally behave.
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// Slot indices that hold page items, in fill order.
    pub page_slots: Vec<usize>,
    /// Previous-page button, shown when `page > 0`.
    pub prev: Option<NavButton>,
    /// Next-page button, shown when `page + 1 < page_count`.
    pub next: Option<NavButton>,
}

impl PaginationConfig {
    /// Items shown per page.
    pub fn items_per_page(&self) -> usize {
        self.page_slots.len()
    }

    /// Number of pages needed for `items` logical items; at least 1.
    pub fn page_count(&self, items: usize) -> usize {
        items.div_ceil(self.items_per_page().max(1)).max(1)
    }
}

/// Auto-refresh behavior for a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Ticks between automatic refreshes.
    pub interval_ticks: u64,
    /// Slots to refresh; empty means the whole grid.
    pub slots: Vec<usize>,
}

impl RefreshConfig {
    /// Refresh the whole grid every `interval_ticks`.
    pub fn all(interval_ticks: u64) -> Self {
        Self {
            interval_ticks,
            slots: Vec::new(),
        }
    }

    /// Refresh only `slots` every `interval_ticks`.
    pub fn slots(interval_ticks: u64, slots: Vec<usize>) -> Self {
        Self {
            interval_ticks,
            slots,
        }
    }

    /// Whether the whole grid is refreshed.
    pub fn is_refresh_all(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Observer invoked on session open/close/refresh.
pub type LifecycleObserver = Arc<dyn Fn(ViewerId) + Send + Sync>;

/// Immutable template describing a menu's layout and behavior rules.
///
/// Created once, never mutated, safely shared (read-only) across all sessions
/// using it.
pub struct MenuDefinition {
    name: String,
    title: String,
    rows: usize,
    cols: usize,
    templates: Vec<SlotTemplate>,
    pagination: Option<PaginationConfig>,
    page_items: Vec<SlotContent>,
    cancel_by_default: bool,
    placeable_slots: Vec<usize>,
    fallback: ItemDescriptor,
    refresh: Option<RefreshConfig>,
    pub(crate) on_open: Vec<LifecycleObserver>,
    pub(crate) on_close: Vec<LifecycleObserver>,
    pub(crate) on_refresh: Vec<LifecycleObserver>,
}

impl std::fmt::Debug for MenuDefinition {
    // Manual impl: the lifecycle observers are unnameable closures.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuDefinition")
            .field("name", &self.name)
            .field("title", &self.title)
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("templates", &self.templates.len())
            .field("pagination", &self.pagination)
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

impl MenuDefinition {
    /// Start building a definition.
    pub fn builder(name: impl Into<String>) -> DefinitionBuilder {
        DefinitionBuilder::new(name)
    }

    /// The definition's registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The menu title, with unexpanded placeholder tokens.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Grid rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Grid columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total slots in the grid.
    pub fn size(&self) -> usize {
        self.rows * self.cols
    }

    /// Slot templates in application order (ascending priority).
    pub fn templates(&self) -> &[SlotTemplate] {
        &self.templates
    }

    /// Pagination layout, if the menu is paginated.
    pub fn pagination(&self) -> Option<&PaginationConfig> {
        self.pagination.as_ref()
    }

    /// Initial page items configured on the definition.
    pub fn page_items(&self) -> &[SlotContent] {
        &self.page_items
    }

    /// Whether clicks suppress the host's default action unless overridden.
    pub fn cancel_by_default(&self) -> bool {
        self.cancel_by_default
    }

    /// Slots where the host's default click action is allowed.
    pub fn placeable_slots(&self) -> &[usize] {
        &self.placeable_slots
    }

    /// Whether `slot` allows the host's default click action.
    pub fn is_slot_placeable(&self, slot: usize) -> bool {
        self.placeable_slots.contains(&slot)
    }

    /// Content substituted when a provider fails to resolve.
    pub fn fallback(&self) -> &ItemDescriptor {
        &self.fallback
    }

    /// Auto-refresh behavior, if configured.
    pub fn refresh(&self) -> Option<&RefreshConfig> {
        self.refresh.as_ref()
    }
}

/// Builder for [`MenuDefinition`], validating everything at `build` time.
pub struct DefinitionBuilder {
    name: String,
    title: String,
    rows: usize,
    cols: usize,
    slot_limit: usize,
    templates: Vec<SlotTemplate>,
    pagination: Option<PaginationConfig>,
    page_items: Vec<SlotContent>,
    cancel_by_default: bool,
    placeable_slots: Vec<usize>,
    fallback: ItemDescriptor,
    refresh: Option<RefreshConfig>,
    on_open: Vec<LifecycleObserver>,
    on_close: Vec<LifecycleObserver>,
    on_refresh: Vec<LifecycleObserver>,
}

impl DefinitionBuilder {
    /// Create a builder for a one-row, nine-column menu named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: String::new(),
            rows: 1,
            cols: 9,
            slot_limit: DEFAULT_SLOT_LIMIT,
            templates: Vec::new(),
            pagination: None,
            page_items: Vec::new(),
            cancel_by_default: true,
            placeable_slots: Vec::new(),
            fallback: ItemDescriptor::new("barrier").named("Unavailable"),
            refresh: None,
            on_open: Vec::new(),
            on_close: Vec::new(),
            on_refresh: Vec::new(),
        }
    }

    /// Set the menu title (may contain placeholder tokens).
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the grid dimensions.
    pub fn grid(mut self, rows: usize, cols: usize) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    /// Override the host-imposed maximum slot count.
    pub fn slot_limit(mut self, limit: usize) -> Self {
        self.slot_limit = limit;
        self
    }

    /// Add a slot template.
    pub fn template(mut self, template: SlotTemplate) -> Self {
        self.templates.push(template);
        self
    }

    /// Configure pagination.
    pub fn pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Append initial page items.
    pub fn page_items(mut self, items: impl IntoIterator<Item = SlotContent>) -> Self {
        self.page_items.extend(items);
        self
    }

    /// Set whether clicks suppress the host's default action by default.
    pub fn cancel_by_default(mut self, cancel: bool) -> Self {
        self.cancel_by_default = cancel;
        self
    }

    /// Mark slots where the host's default click action is allowed.
    pub fn placeable_slots(mut self, slots: Vec<usize>) -> Self {
        self.placeable_slots = slots;
        self
    }

    /// Set the content substituted when a provider fails.
    pub fn fallback(mut self, item: ItemDescriptor) -> Self {
        self.fallback = item;
        self
    }

    /// Configure auto-refresh.
    pub fn refresh(mut self, config: RefreshConfig) -> Self {
        self.refresh = Some(config);
        self
    }

    /// Run `observer` whenever a session of this menu finishes opening.
    pub fn on_open<F: Fn(ViewerId) + Send + Sync + 'static>(mut self, observer: F) -> Self {
        self.on_open.push(Arc::new(observer));
        self
    }

    /// Run `observer` whenever a session of this menu closes.
    pub fn on_close<F: Fn(ViewerId) + Send + Sync + 'static>(mut self, observer: F) -> Self {
        self.on_close.push(Arc::new(observer));
        self
    }

    /// Run `observer` whenever a session of this menu completes a refresh.
    pub fn on_refresh<F: Fn(ViewerId) + Send + Sync + 'static>(mut self, observer: F) -> Self {
        self.on_refresh.push(Arc::new(observer));
        self
    }

    /// Validate and build the definition.
    pub fn build(mut self, registries: &Registries) -> Result<Arc<MenuDefinition>, DefinitionError> {
        let size = self.rows * self.cols;
        if self.rows == 0 || self.cols == 0 || size > self.slot_limit {
            return Err(DefinitionError::InvalidDimensions {
                rows: self.rows,
                cols: self.cols,
                max: self.slot_limit,
            });
        }

        let check_slot = |slot: usize| {
            if slot < size {
                Ok(())
            } else {
                Err(DefinitionError::SlotOutOfRange { slot, size })
            }
        };

        let check_handler = |handler: Option<&crate::slot::HandlerId>| match handler {
            Some(id) if !registries.handlers.contains(id) => Err(DefinitionError::UnknownHandler {
                name: id.as_str().into(),
            }),
            _ => Ok(()),
        };

        let check_tokens = |text: &str| {
            for token in placeholder_tokens(text) {
                if !registries.placeholders.contains(&token) {
                    return Err(DefinitionError::UnknownPlaceholder { name: token });
                }
            }
            Ok(())
        };

        check_tokens(&self.title)?;

        // Same-priority duplicate slot claims are ambiguous; reject instead
        // of letting application order decide.
        let mut claimed: Vec<(usize, i32)> = Vec::new();
        for template in &self.templates {
            for &slot in &template.slots {
                check_slot(slot)?;
                if claimed.contains(&(slot, template.priority)) {
                    return Err(DefinitionError::AmbiguousSlot {
                        slot,
                        priority: template.priority,
                    });
                }
                claimed.push((slot, template.priority));
            }

            check_handler(template.handler())?;
            if let Some(condition) = &template.visible_if {
                if !registries.placeholders.contains(condition.token()) {
                    return Err(DefinitionError::UnknownPlaceholder {
                        name: condition.token().into(),
                    });
                }
            }
            match &template.rule {
                ContentRule::Static(_) => {}
                ContentRule::Templated { item, .. } => {
                    if let Some(name) = &item.name {
                        check_tokens(name)?;
                    }
                    for line in &item.lore {
                        check_tokens(line)?;
                    }
                }
                ContentRule::Provider { provider, .. } => {
                    if !registries.providers.contains(provider) {
                        return Err(DefinitionError::UnknownProvider {
                            name: provider.clone(),
                        });
                    }
                }
            }
        }

        if let Some(pagination) = &self.pagination {
            if pagination.page_slots.is_empty() {
                return Err(DefinitionError::EmptyPageSlots);
            }
            for &slot in &pagination.page_slots {
                check_slot(slot)?;
            }
            for nav in [&pagination.prev, &pagination.next].into_iter().flatten() {
                check_slot(nav.slot)?;
                if pagination.page_slots.contains(&nav.slot) {
                    return Err(DefinitionError::NavOverlap { slot: nav.slot });
                }
            }
            // Reserved slots may not double as page slots.
            for &slot in &self.placeable_slots {
                if pagination.page_slots.contains(&slot) {
                    return Err(DefinitionError::NavOverlap { slot });
                }
            }
        }

        for &slot in &self.placeable_slots {
            check_slot(slot)?;
        }
        for item in &self.page_items {
            check_handler(item.handler.as_ref())?;
        }
        if let Some(refresh) = &self.refresh {
            for &slot in &refresh.slots {
                check_slot(slot)?;
            }
        }

        // Stable sort keeps declaration order within a priority level.
        self.templates.sort_by_key(|t| t.priority);

        tracing::debug!(
            target: crate::logging::targets::DEFINITION,
            name = %self.name,
            rows = self.rows,
            cols = self.cols,
            templates = self.templates.len(),
            paginated = self.pagination.is_some(),
            "definition built"
        );

        Ok(Arc::new(MenuDefinition {
            name: self.name,
            title: self.title,
            rows: self.rows,
            cols: self.cols,
            templates: self.templates,
            pagination: self.pagination,
            page_items: self.page_items,
            cancel_by_default: self.cancel_by_default,
            placeable_slots: self.placeable_slots,
            fallback: self.fallback,
            refresh: self.refresh,
            on_open: self.on_open,
            on_close: self.on_close,
            on_refresh: self.on_refresh,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::DataBag;

    fn registries() -> Registries {
        Registries::with_builtins()
    }

    #[test]
    fn rejects_zero_and_oversized_grids() {
        let err = MenuDefinition::builder("bad")
            .grid(0, 9)
            .build(&registries())
            .unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidDimensions { .. }));

        let err = MenuDefinition::builder("bad")
            .grid(7, 9)
            .build(&registries())
            .unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidDimensions { .. }));
    }

    #[test]
    fn rejects_unknown_placeholder_at_build_time() {
        let err = MenuDefinition::builder("bad")
            .grid(1, 9)
            .title("Hello {nobody}")
            .build(&registries())
            .unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::UnknownPlaceholder { name } if name == "nobody"
        ));
    }

    #[test]
    fn rejects_unknown_handler_and_provider() {
        let content = SlotContent::interactive(ItemDescriptor::new("lever"), "does_not_exist");
        let err = MenuDefinition::builder("bad")
            .grid(1, 9)
            .template(SlotTemplate::fixed(vec![0], content))
            .build(&registries())
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownHandler { .. }));

        let err = MenuDefinition::builder("bad")
            .grid(1, 9)
            .template(SlotTemplate {
                slots: vec![0],
                rule: ContentRule::Provider {
                    provider: "heads".into(),
                    item_id: "steve".into(),
                    handler: None,
                },
                priority: 0,
                visible_if: None,
            })
            .build(&registries())
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownProvider { .. }));
    }

    #[test]
    fn rejects_nav_slot_inside_page_slots() {
        let err = MenuDefinition::builder("bad")
            .grid(3, 9)
            .pagination(PaginationConfig {
                page_slots: (9..18).collect(),
                prev: None,
                next: Some(NavButton {
                    slot: 17,
                    item: ItemDescriptor::new("arrow"),
                }),
            })
            .build(&registries())
            .unwrap_err();
        assert!(matches!(err, DefinitionError::NavOverlap { slot: 17 }));
    }

    #[test]
    fn rejects_same_priority_duplicate_slot() {
        let err = MenuDefinition::builder("bad")
            .grid(1, 9)
            .template(SlotTemplate::fixed(
                vec![3],
                SlotContent::display(ItemDescriptor::new("stone")),
            ))
            .template(SlotTemplate::fixed(
                vec![3],
                SlotContent::display(ItemDescriptor::new("dirt")),
            ))
            .build(&registries())
            .unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::AmbiguousSlot {
                slot: 3,
                priority: 0
            }
        ));
    }

    #[test]
    fn templates_sort_by_priority_preserving_declaration_order() {
        let def = MenuDefinition::builder("ok")
            .grid(1, 9)
            .template(
                SlotTemplate::fixed(vec![0], SlotContent::display(ItemDescriptor::new("late")))
                    .with_priority(5),
            )
            .template(SlotTemplate::fixed(
                vec![1],
                SlotContent::display(ItemDescriptor::new("early")),
            ))
            .build(&registries())
            .unwrap();
        assert_eq!(def.templates()[0].priority, 0);
        assert_eq!(def.templates()[1].priority, 5);
    }

    #[test]
    fn page_count_rounds_up_and_floors_at_one() {
        let pagination = PaginationConfig {
            page_slots: (0..9).collect(),
            prev: None,
            next: None,
        };
        assert_eq!(pagination.page_count(0), 1);
        assert_eq!(pagination.page_count(9), 1);
        assert_eq!(pagination.page_count(10), 2);
        assert_eq!(pagination.page_count(20), 3);
    }

    #[test]
    fn definition_is_debuggable() {
        let def = MenuDefinition::builder("debuggable")
            .grid(1, 9)
            .build(&registries())
            .unwrap();
        let text = format!("{def:?}");
        assert!(text.contains("debuggable"));

        // Build results format too, so assertions on them can unwrap freely.
        let result = MenuDefinition::builder("bad").grid(0, 0).build(&registries());
        assert!(format!("{result:?}").contains("InvalidDimensions"));
    }

    #[test]
    fn condition_parsing_and_evaluation() {
        let registries = registries();
        let data = DataBag::new();
        let ctx = ResolveContext {
            viewer: ViewerId::new(7),
            page: 0,
            page_count: 3,
            data: &data,
        };

        let cond = Condition::parse("{page} == 1").unwrap();
        assert!(cond.evaluate(&registries, &ctx)); // display page is 1-indexed

        let cond = Condition::parse("{total_pages} > 2").unwrap();
        assert!(cond.evaluate(&registries, &ctx));

        let cond = Condition::parse("{page} equals 2").unwrap();
        assert!(!cond.evaluate(&registries, &ctx));

        assert!(Condition::parse("page == 1").is_err());
        assert!(Condition::parse("{page} ~= 1").is_err());
        assert!(Condition::parse("{page} ==").is_err());
    }
}
