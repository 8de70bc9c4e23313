//! Tick thread and auxiliary cadences.
//!
//! The [`World`] moves onto a dedicated tick thread. Two more threads run the
//! lighting update (a third of the tick rate) and the physics step. Physics
//! and lighting state each sit behind a mutex; the lighting mutex is only
//! taken while holding the physics mutex.
//!
//! Other threads talk to the world through [`WorldCommand`]s and read the
//! [`WorldSnapshot`] published after every tick.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use strata_common::ChunkCoord;
use strata_world::{Material, StreamingReport, ViewRect, World};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::collaborators::{LightingWorld, PhysicsWorld};
use crate::timing::Cadence;

/// Number of threads the driver runs.
const THREAD_COUNT: usize = 3;

/// Capacity of the command queue.
const COMMAND_CAPACITY: usize = 1024;

/// Driver errors.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The tick thread is gone
    #[error("Tick thread is not accepting commands")]
    Disconnected,
    /// A driver thread panicked
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

/// Requests applied by the tick thread before its next streaming pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldCommand {
    /// Write a block.
    SetBlock {
        /// World x
        x: i64,
        /// World y
        y: i64,
        /// New contents, `None` for air
        slot: Option<Material>,
    },
    /// Make a chunk resident.
    LoadChunk(ChunkCoord),
    /// Move the viewport.
    SetViewport(ViewRect),
    /// Pin or unpin a resident chunk.
    SetAllowUnload {
        /// Chunk
        coord: ChunkCoord,
        /// Whether streaming may evict it
        allow: bool,
    },
    /// Save every modified chunk.
    SaveAll,
}

/// Driver settings.
#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    /// World ticks per second
    pub ticks_per_second: u32,
    /// Physics steps per second
    pub physics_hz: u32,
    /// Length of a full day in seconds
    pub day_length_secs: f32,
    /// Initial viewport
    pub viewport: ViewRect,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: 30,
            physics_hz: 60,
            day_length_secs: 600.0,
            viewport: ViewRect::around(ChunkCoord::new(0, 2), 3),
        }
    }
}

/// Resident-chunk state as of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSummary {
    /// Chunk coordinate
    pub coord: ChunkCoord,
    /// Loading completed
    pub loaded: bool,
    /// Unsaved changes
    pub modified: bool,
    /// No solid blocks as of the last rare tick
    pub all_air: bool,
    /// Tick the viewport last saw it
    pub last_viewed_tick: u64,
}

/// Read-only view of the world published after each tick.
///
/// Entries may be stale by the time they are read; check [`ChunkSummary::loaded`]
/// and re-validate through a command before relying on a chunk.
#[derive(Debug, Clone, Default)]
pub struct WorldSnapshot {
    /// Tick the snapshot was taken at
    pub tick: u64,
    /// Counters of that tick's streaming pass
    pub report: StreamingReport,
    /// Resident chunks, sorted by coordinate
    pub chunks: Vec<ChunkSummary>,
}

impl WorldSnapshot {
    /// Captures the resident set.
    #[must_use]
    pub fn capture(world: &World, report: StreamingReport) -> Self {
        let mut chunks: Vec<_> = world
            .chunks()
            .map(|c| ChunkSummary {
                coord: c.coord(),
                loaded: c.is_loaded(),
                modified: c.is_modified(),
                all_air: c.is_all_air(),
                last_viewed_tick: c.last_viewed_tick(),
            })
            .collect();
        chunks.sort_unstable_by_key(|c| c.coord);
        Self {
            tick: world.current_tick(),
            report,
            chunks,
        }
    }

    /// Looks up a chunk.
    #[must_use]
    pub fn chunk(&self, coord: ChunkCoord) -> Option<&ChunkSummary> {
        self.chunks
            .binary_search_by_key(&coord, |c| c.coord)
            .ok()
            .map(|i| &self.chunks[i])
    }

    /// Whether the chunk was resident and loaded at capture time.
    #[must_use]
    pub fn is_loaded(&self, coord: ChunkCoord) -> bool {
        self.chunk(coord).is_some_and(|c| c.loaded)
    }
}

#[derive(Debug, Default)]
struct ControlState {
    paused: bool,
    stopping: bool,
    parked: usize,
    alive: usize,
}

/// Start/pause/resume/stop state shared by every driver thread.
#[derive(Debug, Default)]
struct Control {
    state: Mutex<ControlState>,
    changed: Condvar,
}

/// What a driver thread should do after passing [`Control::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    /// Keep running.
    Run,
    /// Keep running; the thread was parked and its pacing is stale.
    Resumed,
    /// Exit the loop.
    Stop,
}

impl Control {
    /// Parks the calling thread while paused.
    fn checkpoint(&self) -> Gate {
        let mut state = self.state.lock();
        let mut parked = false;
        if state.paused && !state.stopping {
            parked = true;
            state.parked += 1;
            self.changed.notify_all();
            while state.paused && !state.stopping {
                self.changed.wait(&mut state);
            }
            state.parked -= 1;
        }
        if state.stopping {
            Gate::Stop
        } else if parked {
            Gate::Resumed
        } else {
            Gate::Run
        }
    }
}

/// Passes the checkpoint, restarting `cadence` after a pause. Returns
/// `false` once stopping.
fn pass(control: &Control, cadence: &mut Cadence) -> bool {
    match control.checkpoint() {
        Gate::Stop => false,
        Gate::Resumed => {
            cadence.reset();
            true
        },
        Gate::Run => true,
    }
}

/// Decrements the live-thread count when a driver thread exits, even by panic.
struct ExitGuard(Arc<Control>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut state = self.0.state.lock();
        state.alive -= 1;
        self.0.changed.notify_all();
    }
}

/// Runs a world on its own thread alongside physics and lighting.
pub struct TickDriver<P, L> {
    control: Arc<Control>,
    commands: Sender<WorldCommand>,
    snapshot: Arc<RwLock<Arc<WorldSnapshot>>>,
    physics: Arc<Mutex<P>>,
    lighting: Arc<Mutex<L>>,
    tick_thread: Option<JoinHandle<World>>,
    aux_threads: Vec<(&'static str, JoinHandle<()>)>,
}

impl<P, L> TickDriver<P, L>
where
    P: PhysicsWorld + 'static,
    L: LightingWorld + 'static,
{
    /// Moves `world` onto a tick thread and starts the auxiliary threads.
    pub fn start(world: World, config: DriverConfig, physics: P, lighting: L) -> Self {
        let control = Arc::new(Control::default());
        control.state.lock().alive = THREAD_COUNT;

        let (commands, receiver) = bounded(COMMAND_CAPACITY);
        let snapshot = Arc::new(RwLock::new(Arc::new(WorldSnapshot::capture(
            &world,
            StreamingReport::default(),
        ))));
        let physics = Arc::new(Mutex::new(physics));
        let lighting = Arc::new(Mutex::new(lighting));

        info!(
            "Starting tick driver: {} tps, physics {} Hz",
            config.ticks_per_second, config.physics_hz
        );

        let tick_thread = {
            let control = Arc::clone(&control);
            let snapshot = Arc::clone(&snapshot);
            let physics = Arc::clone(&physics);
            thread::spawn(move || {
                run_tick_loop(world, &config, &control, &receiver, &snapshot, &*physics)
            })
        };

        let lighting_thread = {
            let control = Arc::clone(&control);
            let physics = Arc::clone(&physics);
            let lighting = Arc::clone(&lighting);
            thread::spawn(move || run_lighting_loop(&config, &control, &*physics, &*lighting))
        };

        let physics_thread = {
            let control = Arc::clone(&control);
            let physics = Arc::clone(&physics);
            thread::spawn(move || run_physics_loop(&config, &control, &*physics))
        };

        Self {
            control,
            commands,
            snapshot,
            physics,
            lighting,
            tick_thread: Some(tick_thread),
            aux_threads: vec![("lighting", lighting_thread), ("physics", physics_thread)],
        }
    }

    /// Queues a command for the tick thread.
    pub fn send(&self, command: WorldCommand) -> Result<(), DriverError> {
        self.commands
            .send(command)
            .map_err(|_| DriverError::Disconnected)
    }

    /// A sender other threads can keep.
    #[must_use]
    pub fn sender(&self) -> Sender<WorldCommand> {
        self.commands.clone()
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        Arc::clone(&*self.snapshot.read())
    }

    /// Runs `f` with the physics lock held.
    pub fn with_physics<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut self.physics.lock())
    }

    /// Runs `f` with the physics and lighting locks held.
    pub fn with_lighting<R>(&self, f: impl FnOnce(&mut L) -> R) -> R {
        let _physics = self.physics.lock();
        f(&mut self.lighting.lock())
    }

    /// Pauses every driver thread. Returns once all live threads are parked.
    pub fn pause(&self) {
        let mut state = self.control.state.lock();
        state.paused = true;
        while state.parked < state.alive {
            self.control.changed.wait(&mut state);
        }
        debug!("Tick driver paused");
    }

    /// Resumes after [`TickDriver::pause`].
    pub fn resume(&self) {
        let mut state = self.control.state.lock();
        state.paused = false;
        self.control.changed.notify_all();
        debug!("Tick driver resumed");
    }

    /// Whether the driver is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.control.state.lock().paused
    }

    /// Stops and joins every thread, handing the world back for teardown.
    pub fn stop(mut self) -> Result<World, DriverError> {
        {
            let mut state = self.control.state.lock();
            state.stopping = true;
            self.control.changed.notify_all();
        }

        let mut failure = None;
        for (name, handle) in self.aux_threads.drain(..) {
            if handle.join().is_err() {
                warn!("{name} thread panicked");
                failure.get_or_insert(DriverError::ThreadPanicked(name));
            }
        }

        let world = self
            .tick_thread
            .take()
            .ok_or(DriverError::ThreadPanicked("tick"))?
            .join()
            .map_err(|_| DriverError::ThreadPanicked("tick"))?;
        info!("Tick driver stopped at tick {}", world.current_tick());

        match failure {
            Some(e) => Err(e),
            None => Ok(world),
        }
    }
}

impl<P, L> Drop for TickDriver<P, L> {
    fn drop(&mut self) {
        if self.tick_thread.is_some() {
            let mut state = self.control.state.lock();
            state.stopping = true;
            self.control.changed.notify_all();
        }
    }
}

impl<P, L> std::fmt::Debug for TickDriver<P, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickDriver")
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

fn apply_command(world: &mut World, viewport: &mut ViewRect, command: WorldCommand) {
    match command {
        WorldCommand::SetBlock { x, y, slot } => {
            world.set_block(x, y, slot);
        },
        WorldCommand::LoadChunk(coord) => {
            world.load_chunk(coord);
        },
        WorldCommand::SetViewport(rect) => *viewport = rect,
        WorldCommand::SetAllowUnload { coord, allow } => {
            if let Err(e) = world.set_allow_unload(coord, allow) {
                warn!("Ignoring pin request: {e}");
            }
        },
        WorldCommand::SaveAll => {
            if let Err(e) = world.save_all() {
                warn!("Save requested by command failed: {e}");
            }
        },
    }
}

fn run_tick_loop<P: PhysicsWorld>(
    mut world: World,
    config: &DriverConfig,
    control: &Arc<Control>,
    commands: &Receiver<WorldCommand>,
    snapshot: &RwLock<Arc<WorldSnapshot>>,
    physics: &Mutex<P>,
) -> World {
    let _guard = ExitGuard(Arc::clone(control));
    let mut cadence = Cadence::new(f64::from(config.ticks_per_second));
    let mut viewport = config.viewport;

    while pass(control, &mut cadence) {
        while let Ok(command) = commands.try_recv() {
            apply_command(&mut world, &mut viewport, command);
        }

        world.load_area(&viewport);
        world.observe(&viewport);
        let report = world.tick(&viewport);
        if world.is_rare_tick() {
            world.tick_rare();
        }

        let changes = world.drain_changes();
        if !changes.is_empty() {
            let mut physics = physics.lock();
            for coord in changes {
                physics.block_changed(coord.x, coord.y);
            }
        }

        *snapshot.write() = Arc::new(WorldSnapshot::capture(&world, report));
        cadence.wait();
    }
    world
}

fn run_lighting_loop<P: PhysicsWorld, L: LightingWorld>(
    config: &DriverConfig,
    control: &Arc<Control>,
    physics: &Mutex<P>,
    lighting: &Mutex<L>,
) {
    let _guard = ExitGuard(Arc::clone(control));
    let mut cadence = Cadence::new(f64::from(config.ticks_per_second) / 3.0);
    let day_length = config.day_length_secs.max(1.0);
    let started = Instant::now();

    while pass(control, &mut cadence) {
        let time_of_day = (started.elapsed().as_secs_f32() / day_length).rem_euclid(1.0);
        {
            let _physics = physics.lock();
            lighting.lock().update(time_of_day);
        }
        cadence.wait();
    }
}

fn run_physics_loop<P: PhysicsWorld>(config: &DriverConfig, control: &Arc<Control>, physics: &Mutex<P>) {
    let _guard = ExitGuard(Arc::clone(control));
    let mut cadence = Cadence::new(f64::from(config.physics_hz));

    while pass(control, &mut cadence) {
        let dt = cadence.wait();
        physics.lock().step(dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{DaylightCycle, NullPhysics};
    use std::time::Duration;
    use strata_world::{GeneratorKind, WorldConfig};

    fn fast_config() -> DriverConfig {
        DriverConfig {
            ticks_per_second: 100,
            physics_hz: 200,
            day_length_secs: 10.0,
            viewport: ViewRect::around(ChunkCoord::new(0, 0), 1),
        }
    }

    fn empty_world() -> World {
        World::in_memory(WorldConfig {
            seed: 7,
            generator: GeneratorKind::Empty,
            flat_fill: Material::Stone,
            ticks_per_second: 100,
        })
    }

    fn wait_for(driver: &TickDriver<NullPhysics, DaylightCycle>, pred: impl Fn(&WorldSnapshot) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !pred(&driver.snapshot()) {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_driver_loads_viewport_and_stops() {
        let driver = TickDriver::start(empty_world(), fast_config(), NullPhysics::default(), DaylightCycle::default());
        wait_for(&driver, |s| s.tick > 3 && s.chunks.len() == 9);
        assert!(driver.snapshot().is_loaded(ChunkCoord::new(1, -1)));

        let world = driver.stop().expect("stop");
        assert!(world.current_tick() > 3);
        assert_eq!(world.resident_count(), 9);
    }

    #[test]
    fn test_commands_reach_world_and_physics() {
        let driver = TickDriver::start(empty_world(), fast_config(), NullPhysics::default(), DaylightCycle::default());
        driver
            .send(WorldCommand::SetBlock {
                x: 3,
                y: 4,
                slot: Some(Material::Stone),
            })
            .expect("send");
        wait_for(&driver, |s| s.chunk(ChunkCoord::new(0, 0)).is_some_and(|c| c.modified));

        let changed = driver.with_physics(|p| p.changed_blocks());
        assert!(changed >= 1);

        let world = driver.stop().expect("stop");
        assert_eq!(world.get_block(3, 4).map(|b| b.material), Some(Material::Stone));
    }

    #[test]
    fn test_pause_parks_all_threads() {
        let driver = TickDriver::start(empty_world(), fast_config(), NullPhysics::default(), DaylightCycle::default());
        wait_for(&driver, |s| s.tick > 1);

        driver.pause();
        assert!(driver.is_paused());
        let tick = driver.snapshot().tick;
        let steps = driver.with_physics(|p| p.steps());
        let updates = driver.with_lighting(|l| l.updates());
        thread::sleep(Duration::from_millis(50));
        assert_eq!(driver.snapshot().tick, tick);
        assert_eq!(driver.with_physics(|p| p.steps()), steps);
        assert_eq!(driver.with_lighting(|l| l.updates()), updates);

        driver.resume();
        wait_for(&driver, |s| s.tick > tick);
        driver.stop().expect("stop");
    }

    #[test]
    fn test_resume_does_not_report_pause_as_elapsed_time() {
        let driver = TickDriver::start(empty_world(), fast_config(), NullPhysics::default(), DaylightCycle::default());
        wait_for(&driver, |s| s.tick > 1);

        driver.pause();
        thread::sleep(Duration::from_millis(300));
        let (steps, secs) = driver.with_physics(|p| (p.steps(), p.simulated_secs()));
        driver.resume();

        let deadline = Instant::now() + Duration::from_secs(5);
        while driver.with_physics(|p| p.steps()) == steps {
            assert!(Instant::now() < deadline, "physics never resumed");
            thread::sleep(Duration::from_millis(2));
        }
        let resumed_secs = driver.with_physics(|p| p.simulated_secs()) - secs;
        assert!(resumed_secs < 0.2, "first steps after resume simulated {resumed_secs}s");
        driver.stop().expect("stop");
    }

    #[test]
    fn test_stop_while_paused() {
        let driver = TickDriver::start(empty_world(), fast_config(), NullPhysics::default(), DaylightCycle::default());
        driver.pause();
        let world = driver.stop().expect("stop");
        assert_eq!(world.seed(), 7);
    }

    #[test]
    fn test_snapshot_lookup() {
        let mut world = empty_world();
        world.load_chunk(ChunkCoord::new(2, -3));
        world.load_chunk(ChunkCoord::new(-1, 0));
        let snapshot = WorldSnapshot::capture(&world, StreamingReport::default());
        assert!(snapshot.is_loaded(ChunkCoord::new(2, -3)));
        assert!(!snapshot.is_loaded(ChunkCoord::new(0, 0)));
        assert_eq!(snapshot.chunks.len(), 2);
    }
}
