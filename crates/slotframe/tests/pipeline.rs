//! End-to-end pipeline tests: definition -> open -> render -> click -> close,
//! driven by a [`TickScheduler`] the way a single-threaded host would.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use slotframe::{
    ClickResponse, ContextKey, InteractionKind, ItemDescriptor, Lifecycle, MenuDefinition,
    MenuManager, MenuSurface, NavButton, PaginationConfig, RawInteraction, Registries, Result,
    SessionId, SlotContent, SlotGrid, SlotTemplate, TickScheduler, ViewerId,
};

/// A surface that counts every write, for asserting delta minimality.
#[derive(Clone)]
struct CountingSurface {
    grid: Arc<parking_lot::Mutex<SlotGrid>>,
    writes: Arc<AtomicUsize>,
}

impl CountingSurface {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            grid: Arc::new(parking_lot::Mutex::new(SlotGrid::new(rows, cols))),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn slot(&self, index: usize) -> Option<SlotContent> {
        self.grid.lock().get_slot(index).unwrap().cloned()
    }
}

impl MenuSurface for CountingSurface {
    fn set_slot(&mut self, index: usize, content: &SlotContent) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.grid.lock().set_slot(index, content.clone())
    }

    fn clear_slot(&mut self, index: usize) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.grid.lock().clear(index)
    }

    fn size(&self) -> usize {
        self.grid.lock().size()
    }
}

struct Harness {
    scheduler: Arc<TickScheduler>,
    manager: MenuManager,
    registries: Arc<Registries>,
}

fn harness() -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let scheduler = Arc::new(TickScheduler::new());
    let registries = Arc::new(Registries::with_builtins());
    let manager = MenuManager::new(scheduler.clone(), registries.clone());
    Harness {
        scheduler,
        manager,
        registries,
    }
}

/// Three rows; top row holds page items, bottom corners navigate.
fn paged_shop(registries: &Registries, items: usize) -> Arc<MenuDefinition> {
    MenuDefinition::builder("shop")
        .title("Shop")
        .grid(3, 9)
        .template(
            SlotTemplate::fixed(
                (9..18).collect(),
                SlotContent::display(ItemDescriptor::new("gray_glass")),
            )
            .with_priority(-10),
        )
        .pagination(PaginationConfig {
            page_slots: (0..9).collect(),
            prev: Some(NavButton {
                slot: 18,
                item: ItemDescriptor::new("arrow").named("Previous"),
            }),
            next: Some(NavButton {
                slot: 26,
                item: ItemDescriptor::new("arrow").named("Next"),
            }),
        })
        .page_items(
            (0..items).map(|i| SlotContent::display(ItemDescriptor::new(format!("ware_{i}")))),
        )
        .build(registries)
        .unwrap()
}

fn open(
    h: &Harness,
    definition: Arc<MenuDefinition>,
    viewer: ViewerId,
    surface: &CountingSurface,
) -> SessionId {
    h.manager
        .open(definition, viewer, ContextKey::Global, Box::new(surface.clone()))
        .unwrap()
}

#[test]
fn paginated_menu_renders_and_navigates() {
    let h = harness();
    let definition = paged_shop(&h.registries, 20);
    let surface = CountingSurface::new(3, 9);
    let viewer = ViewerId::new(1);
    let id = open(&h, definition, viewer, &surface);

    h.scheduler.tick();
    assert_eq!(h.manager.lifecycle(id), Some(Lifecycle::Open));
    assert_eq!(h.manager.page_count(id), Some(3));

    // Page 0: wares 0..9, filler row, next button only.
    assert_eq!(surface.slot(0).unwrap().item.id, "ware_0");
    assert_eq!(surface.slot(8).unwrap().item.id, "ware_8");
    assert_eq!(surface.slot(9).unwrap().item.id, "gray_glass");
    assert_eq!(surface.slot(18), None);
    assert_eq!(
        surface.slot(26).unwrap().handler.unwrap().as_str(),
        "next_page"
    );

    // Click next: page 1 shows wares 9..18 and both nav buttons.
    let dispatch = h
        .manager
        .handle_interaction(RawInteraction::click(viewer, 26, InteractionKind::LeftClick))
        .unwrap();
    assert!(dispatch.suppress_default);
    assert_eq!(dispatch.response, ClickResponse::NextPage);

    h.scheduler.tick();
    assert_eq!(h.manager.page(id), Some(1));
    assert_eq!(surface.slot(0).unwrap().item.id, "ware_9");
    assert!(surface.slot(18).is_some());
    assert!(surface.slot(26).is_some());

    // Page 2 (last): wares 18..20, empty fillers, next hidden.
    h.manager.set_page(id, 2);
    h.scheduler.tick();
    assert_eq!(surface.slot(1).unwrap().item.id, "ware_19");
    for slot in 2..9 {
        assert_eq!(surface.slot(slot), None, "slot {slot}");
    }
    assert_eq!(surface.slot(26), None);
}

#[test]
fn opening_past_the_last_page_clamps() {
    let h = harness();
    let definition = paged_shop(&h.registries, 20);
    let surface = CountingSurface::new(3, 9);

    // 20 items across 9-slot pages is 3 pages; page 5 clamps to page 2.
    let id = h
        .manager
        .open_at(
            definition,
            ViewerId::new(10),
            ContextKey::Global,
            Box::new(surface.clone()),
            5,
        )
        .unwrap();
    h.scheduler.tick();

    assert_eq!(h.manager.page(id), Some(2));
    assert_eq!(surface.slot(0).unwrap().item.id, "ware_18");
    assert_eq!(surface.slot(1).unwrap().item.id, "ware_19");
    for slot in 2..9 {
        assert_eq!(surface.slot(slot), None, "slot {slot}");
    }

    // The snapshot is exactly what was applied to the surface.
    let snapshot = h.manager.snapshot(id).unwrap();
    for (slot, content) in snapshot.iter().enumerate() {
        assert_eq!(surface.slot(slot), *content, "slot {slot}");
    }
}

#[test]
fn next_page_on_last_page_is_an_empty_delta() {
    let h = harness();
    let definition = paged_shop(&h.registries, 20);
    let surface = CountingSurface::new(3, 9);
    let viewer = ViewerId::new(2);
    let id = open(&h, definition, viewer, &surface);

    h.manager.set_page(id, 2);
    h.scheduler.tick();
    h.scheduler.tick();
    let writes_before = surface.writes();

    // Already on the last page; advancing clamps to the same page and
    // schedules nothing.
    h.manager.set_page(id, 3);
    h.scheduler.tick();
    assert_eq!(h.manager.page(id), Some(2));
    assert_eq!(surface.writes(), writes_before);

    // Out-of-range jumps clamp too.
    h.manager.set_page(id, 99);
    h.manager.set_page(id, -1);
    assert_eq!(h.manager.page(id), Some(0));
}

#[test]
fn refresh_storm_collapses_to_one_followup_cycle() {
    let h = harness();
    let definition = paged_shop(&h.registries, 20);
    let surface = CountingSurface::new(3, 9);
    let id = open(&h, definition, ViewerId::new(3), &surface);

    h.scheduler.tick();
    let after_open = surface.writes();
    assert!(after_open > 0);

    // Nothing changed, so the coalesced follow-up produces an empty delta.
    for _ in 0..10 {
        h.manager.refresh(id);
    }
    h.scheduler.tick();
    h.scheduler.tick();
    assert_eq!(surface.writes(), after_open);
}

#[test]
fn close_discards_pending_work_without_touching_the_surface() {
    let h = harness();
    let definition = paged_shop(&h.registries, 20);
    let surface = CountingSurface::new(3, 9);
    let viewer = ViewerId::new(4);
    let id = open(&h, definition, viewer, &surface);

    // Queue a pile of work, then close before any of it runs.
    for _ in 0..5 {
        h.manager.refresh(id);
    }
    h.manager.set_page(id, 1);
    h.manager.close(id);

    h.scheduler.tick();
    h.scheduler.tick();

    assert_eq!(surface.writes(), 0);
    assert_eq!(h.manager.lifecycle(id), None);
    assert_eq!(h.manager.session_for(viewer), None);

    // Clicks after close fall through to the host.
    assert!(h
        .manager
        .handle_interaction(RawInteraction::click(viewer, 0, InteractionKind::LeftClick))
        .is_none());
}

#[test]
fn unknown_viewer_interactions_fall_through() {
    let h = harness();
    assert!(h
        .manager
        .dispatch(&RawInteraction::click(
            ViewerId::new(999),
            0,
            InteractionKind::LeftClick
        ))
        .is_none());
    assert!(h
        .manager
        .handle_interaction(RawInteraction::close(ViewerId::new(999)))
        .is_none());
}

#[test]
fn host_close_event_tears_down_the_session() {
    let h = harness();
    let definition = paged_shop(&h.registries, 5);
    let surface = CountingSurface::new(3, 9);
    let viewer = ViewerId::new(5);
    let id = open(&h, definition, viewer, &surface);
    h.scheduler.tick();

    assert!(h
        .manager
        .handle_interaction(RawInteraction::close(viewer))
        .is_none());
    assert_eq!(h.manager.lifecycle(id), Some(Lifecycle::Closing));
    h.scheduler.tick();
    assert_eq!(h.manager.lifecycle(id), None);
}

#[test]
fn panicking_handler_does_not_kill_the_session() {
    let h = harness();
    h.registries
        .handlers
        .register("explode", |_| panic!("handler bug"));

    let definition = MenuDefinition::builder("fragile")
        .grid(1, 9)
        .template(SlotTemplate::fixed(
            vec![0],
            SlotContent::interactive(ItemDescriptor::new("tnt"), "explode"),
        ))
        .template(SlotTemplate::fixed(
            vec![8],
            SlotContent::interactive(ItemDescriptor::new("door"), "close"),
        ))
        .build(&h.registries)
        .unwrap();

    let surface = CountingSurface::new(1, 9);
    let viewer = ViewerId::new(6);
    let id = open(&h, definition, viewer, &surface);
    h.scheduler.tick();

    let dispatch = h
        .manager
        .handle_interaction(RawInteraction::click(viewer, 0, InteractionKind::LeftClick))
        .unwrap();
    assert_eq!(dispatch.response, ClickResponse::Ignored);
    assert_eq!(h.manager.lifecycle(id), Some(Lifecycle::Open));

    // The session still routes clicks normally.
    let dispatch = h
        .manager
        .handle_interaction(RawInteraction::click(viewer, 8, InteractionKind::LeftClick))
        .unwrap();
    assert_eq!(dispatch.response, ClickResponse::Close);
    h.scheduler.tick();
    assert_eq!(h.manager.lifecycle(id), None);
}

#[test]
fn placeable_slots_allow_the_default_action() {
    let h = harness();
    let definition = MenuDefinition::builder("deposit")
        .grid(1, 9)
        .placeable_slots(vec![4])
        .build(&h.registries)
        .unwrap();

    let surface = CountingSurface::new(1, 9);
    let viewer = ViewerId::new(7);
    open(&h, definition, viewer, &surface);
    h.scheduler.tick();

    let on_locked = h
        .manager
        .handle_interaction(RawInteraction::click(viewer, 0, InteractionKind::LeftClick))
        .unwrap();
    assert!(on_locked.suppress_default);

    let on_placeable = h
        .manager
        .handle_interaction(RawInteraction::click(viewer, 4, InteractionKind::LeftClick))
        .unwrap();
    assert!(!on_placeable.suppress_default);
}

#[test]
fn session_data_drives_custom_placeholders() {
    let h = harness();
    h.registries.placeholders.register("balance", |ctx| {
        ctx.data
            .get::<u64>("balance")
            .map(|b| b.to_string())
            .unwrap_or_else(|| "0".into())
    });

    let definition = MenuDefinition::builder("bank")
        .grid(1, 9)
        .template(SlotTemplate {
            slots: vec![4],
            rule: slotframe::ContentRule::Templated {
                item: ItemDescriptor::new("gold").named("Balance: {balance}"),
                handler: None,
            },
            priority: 0,
            visible_if: None,
        })
        .build(&h.registries)
        .unwrap();

    let surface = CountingSurface::new(1, 9);
    let viewer = ViewerId::new(8);
    let id = open(&h, definition, viewer, &surface);
    h.scheduler.tick();
    assert_eq!(
        surface.slot(4).unwrap().item.name.as_deref(),
        Some("Balance: 0")
    );

    h.manager
        .update_data(id, |data| data.insert("balance", 1250u64))
        .unwrap();
    h.scheduler.tick();
    assert_eq!(
        surface.slot(4).unwrap().item.name.as_deref(),
        Some("Balance: 1250")
    );
}
