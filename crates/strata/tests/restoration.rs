//! End-to-end restoration: log, look up, restore, drain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use strata::{BackendRegistry, Strata, StrataConfig, StrataError};
use strata_core::{
    BlockData, BlockPos, BlockWrapper, Change, ChangeQuery, ChangeReason, ChangeSource,
    ChangeSubject, ChangeType, CoreError, CuboidRegion, Location, StateBlob,
};
use strata_queue::{ApplyError, ChunkLayout, LocalChunk, TickReport, WorldBackend};

/// An in-memory world that records every applied cell.
#[derive(Default)]
struct World {
    cells: Mutex<HashMap<BlockPos, BlockWrapper>>,
    chunks: AtomicUsize,
}

impl WorldBackend for World {
    fn apply_chunk(
        &self,
        _world: &str,
        layout: &ChunkLayout,
        chunk: &LocalChunk,
    ) -> Result<(), ApplyError> {
        let mut cells = self.cells.lock();
        for (pos, block) in chunk.iter(layout) {
            cells.insert(pos, block.clone());
        }
        self.chunks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn current_block(&self, location: &Location) -> Option<BlockWrapper> {
        self.cells.lock().get(&location.pos).cloned()
    }
}

fn grass() -> BlockWrapper {
    BlockWrapper::new(
        BlockData::new("minecraft:grass_block"),
        StateBlob::from_bytes([1, 2, 3]),
    )
}

fn broken(pos: BlockPos) -> Change {
    Change::builder()
        .source(ChangeSource::new("griefer"))
        .location(Location::at("world", pos))
        .subject(ChangeSubject::from_wrappers(
            grass(),
            BlockWrapper::plain(BlockData::air()),
        ))
        .reason(ChangeReason::BlockBreak)
        .build()
        .unwrap()
}

/// 500 distinct positions spread over chunks (0,0), (1,0) and (2,0).
fn damaged_area() -> Vec<BlockPos> {
    (0..500)
        .map(|i| BlockPos::new(i % 48, 64, (i / 48) % 16))
        .collect()
}

fn area() -> CuboidRegion {
    CuboidRegion::new(BlockPos::new(0, 0, 0), BlockPos::new(47, 255, 15))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (Strata, Arc<World>) {
    init_tracing();
    let world = Arc::new(World::default());
    let strata = Strata::with_backend(&StrataConfig::default(), world.clone()).unwrap();
    for pos in damaged_area() {
        strata.log_change(broken(pos));
    }
    assert_eq!(strata.logger().drain_once().persisted, 500);
    (strata, world)
}

fn distinct_area() -> ChangeQuery {
    ChangeQuery::new()
        .in_world("world")
        .in_region(area())
        .distinct_values()
}

#[tokio::test]
async fn test_restore_500_locations_in_3_chunks() {
    let (strata, world) = setup();
    let changes = strata.lookup(distinct_area()).await.unwrap();
    assert_eq!(changes.len(), 500);

    let done = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&done);
    let ticket = strata
        .restore(&changes, &ChangeSource::new("admin"), move || {
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    assert_eq!(ticket.chunks, 3);
    assert_eq!(ticket.cells, 500);
    assert_eq!(ticket.logged, 500);
    // Logged before anything was applied.
    assert_eq!(strata.logger().pending_count(), 500);
    assert_eq!(world.chunks.load(Ordering::SeqCst), 0);
    assert_eq!(strata.scheduler().queue_counts(), (1, 0));

    strata.run_task();
    while !strata.scheduler().is_done() {
        let report = strata.tick();
        assert!(!matches!(report, TickReport::Stopped | TickReport::Waiting));
        if !strata.scheduler().is_done() {
            assert!(!done.load(Ordering::SeqCst), "completion fired early");
        }
    }
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(world.chunks.load(Ordering::SeqCst), 3);

    let cells = world.cells.lock();
    assert_eq!(cells.len(), 500);
    assert!(cells.values().all(|cell| *cell == grass()));
    drop(cells);

    assert!(strata.restorer().locks().is_empty());
}

#[tokio::test]
async fn test_inverse_changes_are_persisted() {
    let (strata, world) = setup();
    let target = BlockPos::new(0, 64, 0);
    world.cells.lock().insert(
        target,
        BlockWrapper::plain(BlockData::new("minecraft:tnt")),
    );

    let changes = strata.lookup(distinct_area()).await.unwrap();
    strata
        .restore(&changes, &ChangeSource::new("admin"), || {})
        .unwrap();
    assert_eq!(strata.logger().drain_once().persisted, 500);

    let restorations = strata
        .query(
            ChangeQuery::new()
                .at_location(&Location::at("world", target))
                .with_reason(ChangeReason::Restoration),
        )
        .await
        .unwrap();
    assert_eq!(restorations.len(), 1);
    let inverse = &restorations[0];
    assert_eq!(inverse.source().name(), "admin");
    // The live value becomes "from", the original value becomes "to".
    assert_eq!(inverse.subject().serialize_from(), "minecraft:tnt");
    assert_eq!(inverse.subject().to_wrapper(), Some(grass()));
}

#[tokio::test]
async fn test_restoration_markers_are_not_logged_again() {
    let (strata, world) = setup();
    let marked = Location::new("world", 40, 70, 12);
    strata.log_change(
        Change::builder()
            .source(ChangeSource::new("admin"))
            .location(marked.clone())
            .subject(ChangeSubject::Restoration {
                kind: ChangeType::Block,
                id: 7,
            })
            .reason(ChangeReason::Restoration)
            .build()
            .unwrap(),
    );
    assert_eq!(strata.logger().drain_once().persisted, 1);

    let changes = strata.lookup(distinct_area()).await.unwrap();
    assert_eq!(changes.len(), 501);

    let ticket = strata
        .restore(&changes, &ChangeSource::new("admin"), || {})
        .unwrap();
    assert_eq!(ticket.logged, 500);
    assert_eq!(ticket.cells, 500);
    assert_eq!(strata.logger().pending_count(), 500);
    assert_eq!(strata.logger().drain_once().persisted, 500);

    let at_marker = strata
        .query(
            ChangeQuery::new()
                .at_location(&marked)
                .with_reason(ChangeReason::Restoration),
        )
        .await
        .unwrap();
    assert_eq!(at_marker.len(), 1);
    assert!(matches!(
        at_marker[0].subject(),
        ChangeSubject::Restoration { id: 7, .. }
    ));

    strata.run_task();
    while !strata.scheduler().is_done() {
        let _ = strata.tick();
    }
    assert!(world.current_block(&marked).is_none());
}

#[tokio::test]
async fn test_non_distinct_set_is_rejected_untouched() {
    let (strata, _world) = setup();
    strata.log_change(broken(BlockPos::new(0, 64, 0)));
    strata.logger().drain_once();

    let changes = strata
        .lookup(ChangeQuery::new().in_world("world").in_region(area()))
        .await
        .unwrap();
    assert!(!changes.is_distinct());

    let err = strata
        .restore(&changes, &ChangeSource::new("admin"), || {})
        .unwrap_err();
    assert!(matches!(err, StrataError::Model(CoreError::NotDistinct)));
    assert_eq!(strata.logger().pending_count(), 0);
    assert!(strata.scheduler().is_done());
    assert!(strata.restorer().locks().is_empty());
}

#[tokio::test]
async fn test_overlapping_restoration_is_locked_until_complete() {
    let (strata, _world) = setup();
    let changes = strata.lookup(distinct_area()).await.unwrap();
    let admin = ChangeSource::new("admin");

    strata.restore(&changes, &admin, || {}).unwrap();
    let err = strata.restore(&changes, &admin, || {}).unwrap_err();
    assert!(matches!(err, StrataError::RegionLocked { ref world, .. } if world == "world"));

    strata.run_task();
    while !strata.scheduler().is_done() {
        let _ = strata.tick();
    }
    assert!(strata.restore(&changes, &admin, || {}).is_ok());
}

#[test]
fn test_open_from_registry_and_file() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("strata.db");
    let config = StrataConfig::from_toml_str(&format!(
        "[logger]\ndatabase = {:?}\ninterval_ms = 10\n\n[world]\nhost_version = \"1.20\"\n",
        database.display().to_string()
    ))
    .unwrap();

    let world = Arc::new(World::default());
    let registry = {
        let world = Arc::clone(&world);
        BackendRegistry::new().with("1.20", move || -> Arc<dyn WorldBackend> {
            world.clone()
        })
    };

    let strata = Strata::open(&config, &registry).unwrap();
    strata.start().unwrap();
    strata.log_change(broken(BlockPos::new(1, 2, 3)));
    strata.stop().unwrap();
    assert_eq!(strata.logger().backend().event_count().unwrap(), 1);
    assert!(!strata.logger().is_running());
    drop(strata);

    let reopened = Strata::open(&config, &registry).unwrap();
    assert_eq!(reopened.logger().backend().event_count().unwrap(), 1);

    let unknown = StrataConfig::from_toml_str("[world]\nhost_version = \"0.9\"\n").unwrap();
    assert!(matches!(
        Strata::open(&unknown, &registry),
        Err(StrataError::UnknownHostVersion(_))
    ));
}
