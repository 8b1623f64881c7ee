//! Declarative menu documents.
//!
//! Menus can be authored as TOML documents and loaded into validated
//! [`MenuDefinition`]s. The document schema mirrors the builder API: an item
//! list with slot specs, optional pagination and auto-refresh blocks, and
//! the cancel/placeable click policy. Everything referential (handlers,
//! providers, placeholders) is validated against the injected registries at
//! load time.
//!
//! Slot specs accept a single index, a spec string (`"0-8, 17"`), or a list
//! of either.

use std::sync::Arc;

use serde::Deserialize;

use crate::content::{placeholder_tokens, ItemDescriptor, Registries};
use crate::definition::{
    Condition, ContentRule, MenuDefinition, NavButton, PaginationConfig, RefreshConfig,
    SlotTemplate,
};
use crate::error::DefinitionError;
use crate::slot::{HandlerId, SlotContent};

/// One or more slot indices, as authored in a document.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SlotSpec {
    /// A single slot index.
    Index(usize),
    /// A spec string: comma-separated indices and inclusive ranges,
    /// e.g. `"0-8, 17"`.
    Text(String),
    /// A list of specs, flattened in order.
    Many(Vec<SlotSpec>),
}

impl SlotSpec {
    /// Expand into a flat slot index list, preserving authored order.
    pub fn resolve(&self) -> Result<Vec<usize>, DefinitionError> {
        let mut slots = Vec::new();
        self.collect(&mut slots)?;
        Ok(slots)
    }

    fn collect(&self, out: &mut Vec<usize>) -> Result<(), DefinitionError> {
        match self {
            SlotSpec::Index(slot) => out.push(*slot),
            SlotSpec::Text(text) => {
                for part in text.split(',') {
                    let part = part.trim();
                    if part.is_empty() {
                        return Err(invalid_spec(text));
                    }
                    match part.split_once('-') {
                        Some((start, end)) => {
                            let start: usize =
                                start.trim().parse().map_err(|_| invalid_spec(text))?;
                            let end: usize = end.trim().parse().map_err(|_| invalid_spec(text))?;
                            if end < start {
                                return Err(invalid_spec(text));
                            }
                            out.extend(start..=end);
                        }
                        None => out.push(part.parse().map_err(|_| invalid_spec(text))?),
                    }
                }
            }
            SlotSpec::Many(specs) => {
                for spec in specs {
                    spec.collect(out)?;
                }
            }
        }
        Ok(())
    }
}

fn invalid_spec(text: &str) -> DefinitionError {
    DefinitionError::InvalidSlotSpec { text: text.into() }
}

/// An item's display fields, as authored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ItemConfig {
    /// Host material or model id.
    pub item: String,
    /// Display name, may contain `{placeholder}` tokens.
    #[serde(default)]
    pub name: Option<String>,
    /// Lore lines, may contain `{placeholder}` tokens.
    #[serde(default)]
    pub lore: Vec<String>,
    /// Stack size.
    #[serde(default = "default_amount")]
    pub amount: u32,
}

fn default_amount() -> u32 {
    1
}

impl ItemConfig {
    fn descriptor(&self) -> ItemDescriptor {
        let mut item = ItemDescriptor::new(&self.item).with_amount(self.amount);
        if let Some(name) = &self.name {
            item = item.named(name);
        }
        if !self.lore.is_empty() {
            item = item.with_lore(self.lore.iter().cloned());
        }
        item
    }

    fn has_tokens(&self) -> bool {
        self.name
            .as_deref()
            .is_some_and(|n| !placeholder_tokens(n).is_empty())
            || self.lore.iter().any(|l| !placeholder_tokens(l).is_empty())
    }
}

/// One `[[items]]` entry: slots, content source, click binding, visibility.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EntryConfig {
    /// The slots this entry fills.
    pub slot: SlotSpec,
    /// Display fields; with a `provider`, `item` is the id passed to it.
    #[serde(flatten)]
    pub item: ItemConfig,
    /// Resolve through this registered provider instead of using the display
    /// fields directly.
    #[serde(default)]
    pub provider: Option<String>,
    /// Click handler id.
    #[serde(default)]
    pub handler: Option<String>,
    /// Overlap priority; higher wins.
    #[serde(default)]
    pub priority: i32,
    /// Visibility condition, e.g. `"{page} == 1"`.
    #[serde(default)]
    pub visible_if: Option<String>,
}

/// A pagination navigation button, as authored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NavConfig {
    /// The slot the button occupies.
    pub slot: usize,
    /// Display fields.
    #[serde(flatten)]
    pub item: ItemConfig,
}

/// The `[pagination]` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PaginationSection {
    /// Page item slots, in fill order.
    pub slots: SlotSpec,
    /// Previous-page button.
    #[serde(default)]
    pub prev: Option<NavConfig>,
    /// Next-page button.
    #[serde(default)]
    pub next: Option<NavConfig>,
}

/// The `[auto-refresh]` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AutoRefreshSection {
    /// Whether auto-refresh is active.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ticks between refreshes.
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Slots to refresh; omitted means the whole grid.
    #[serde(default)]
    pub slots: Option<SlotSpec>,
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    20
}

/// A complete menu document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MenuConfig {
    /// Menu title, may contain `{placeholder}` tokens.
    #[serde(default)]
    pub title: String,
    /// Grid rows.
    #[serde(default = "default_rows")]
    pub rows: usize,
    /// Grid columns.
    #[serde(default = "default_cols")]
    pub cols: usize,
    /// Item entries.
    #[serde(default)]
    pub items: Vec<EntryConfig>,
    /// Pagination block.
    #[serde(default)]
    pub pagination: Option<PaginationSection>,
    /// Auto-refresh block.
    #[serde(default)]
    pub auto_refresh: Option<AutoRefreshSection>,
    /// Slots where the host's default click action is allowed.
    #[serde(default)]
    pub placeable_slots: Option<SlotSpec>,
    /// Whether clicks suppress the host's default action unless overridden.
    #[serde(default = "default_true")]
    pub cancel_by_default: bool,
    /// Content substituted when a provider fails.
    #[serde(default)]
    pub fallback: Option<ItemConfig>,
}

fn default_rows() -> usize {
    1
}

fn default_cols() -> usize {
    9
}

impl MenuConfig {
    /// Parse a TOML menu document.
    pub fn from_toml_str(text: &str) -> Result<Self, DefinitionError> {
        toml::from_str(text).map_err(|e| DefinitionError::Parse(e.to_string()))
    }

    /// Validate against `registries` and build the definition under `name`.
    pub fn into_definition(
        self,
        name: impl Into<String>,
        registries: &Registries,
    ) -> Result<Arc<MenuDefinition>, DefinitionError> {
        let mut builder = MenuDefinition::builder(name)
            .title(self.title)
            .grid(self.rows, self.cols)
            .cancel_by_default(self.cancel_by_default);

        if let Some(fallback) = &self.fallback {
            builder = builder.fallback(fallback.descriptor());
        }
        if let Some(spec) = &self.placeable_slots {
            builder = builder.placeable_slots(spec.resolve()?);
        }

        for entry in &self.items {
            let slots = entry.slot.resolve()?;
            let handler = entry.handler.as_deref().map(HandlerId::from);
            let rule = match &entry.provider {
                Some(provider) => ContentRule::Provider {
                    provider: provider.clone(),
                    item_id: entry.item.item.clone(),
                    handler,
                },
                None if entry.item.has_tokens() => ContentRule::Templated {
                    item: entry.item.descriptor(),
                    handler,
                },
                None => ContentRule::Static(SlotContent {
                    item: entry.item.descriptor(),
                    handler,
                }),
            };
            let mut template = SlotTemplate {
                slots,
                rule,
                priority: entry.priority,
                visible_if: None,
            };
            if let Some(text) = &entry.visible_if {
                template.visible_if = Some(Condition::parse(text)?);
            }
            builder = builder.template(template);
        }

        if let Some(pagination) = &self.pagination {
            let nav = |config: &Option<NavConfig>| {
                config.as_ref().map(|nav| NavButton {
                    slot: nav.slot,
                    item: nav.item.descriptor(),
                })
            };
            builder = builder.pagination(PaginationConfig {
                page_slots: pagination.slots.resolve()?,
                prev: nav(&pagination.prev),
                next: nav(&pagination.next),
            });
        }

        if let Some(refresh) = &self.auto_refresh {
            if refresh.enabled {
                let slots = match &refresh.slots {
                    Some(spec) => spec.resolve()?,
                    None => Vec::new(),
                };
                builder = builder.refresh(RefreshConfig {
                    interval_ticks: refresh.interval,
                    slots,
                });
            }
        }

        builder.build(registries)
    }
}

/// Parse and build a definition from a TOML document in one step.
pub fn load_definition(
    name: impl Into<String>,
    toml_text: &str,
    registries: &Registries,
) -> Result<Arc<MenuDefinition>, DefinitionError> {
    MenuConfig::from_toml_str(toml_text)?.into_definition(name, registries)
}
