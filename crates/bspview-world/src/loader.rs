// loader.rs — background map loading and scene handoff
//
// Loads run on a dedicated worker thread. The frame thread queues requests,
// polls status updates without blocking and publishes finished scenes into
// a SceneSlot. Each request gets a generation; a newer request cancels every
// older one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use bspview_common::cvar::LoaderSettings;

use crate::assemble::{CancelToken, SceneAssembler};
use crate::error::{LoadError, LoadReport};
use crate::scene::Scene;

// ============================================================
// Scene slot
// ============================================================

/// The currently displayed scene. Readers clone the `Arc` and never hold
/// the lock while drawing.
#[derive(Debug, Default)]
pub struct SceneSlot {
    inner: RwLock<SlotState>,
}

#[derive(Debug, Default)]
struct SlotState {
    generation: u64,
    scene: Option<Arc<Scene>>,
}

impl SceneSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<Scene>> {
        self.inner.read().scene.clone()
    }

    /// Generation of the published scene, 0 before the first publish.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Swap in a scene. A generation older than the published one is refused.
    pub fn publish(&self, generation: u64, scene: Arc<Scene>) -> bool {
        let mut state = self.inner.write();
        if generation < state.generation {
            return false;
        }
        state.generation = generation;
        state.scene = Some(scene);
        true
    }

    pub fn clear(&self) {
        self.inner.write().scene = None;
    }
}

// ============================================================
// Requests and statuses
// ============================================================

#[derive(Debug, Clone)]
pub enum LoadSource {
    Path(PathBuf),
    Bytes { name: String, data: Arc<[u8]> },
}

impl LoadSource {
    pub fn name(&self) -> String {
        match self {
            LoadSource::Path(path) => path.display().to_string(),
            LoadSource::Bytes { name, .. } => name.clone(),
        }
    }
}

#[derive(Debug)]
struct LoadRequest {
    generation: u64,
    source: LoadSource,
    settings: LoaderSettings,
    cancel: CancelToken,
}

#[derive(Debug)]
pub enum LoadStatus {
    /// The worker picked the request up.
    Started,
    Completed {
        scene: Arc<Scene>,
        report: LoadReport,
    },
    Failed(LoadError),
    Cancelled,
}

impl LoadStatus {
    /// Whether no further status follows for this generation.
    pub fn is_final(&self) -> bool {
        !matches!(self, LoadStatus::Started)
    }
}

/// Read a map file. Only names ending in `.bsp` (any case) are accepted.
pub fn read_map_file(path: &Path) -> Result<Vec<u8>, LoadError> {
    let is_bsp = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("bsp"));
    if !is_bsp {
        return Err(LoadError::NotABspFile {
            path: path.to_path_buf(),
        });
    }
    std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================
// Loader
// ============================================================

/// Map loader with one background worker.
pub struct MapLoader {
    request_tx: Option<Sender<LoadRequest>>,
    status_rx: Receiver<(u64, LoadStatus)>,
    /// Token of the newest request; older ones are already cancelled.
    latest_cancel: Mutex<Option<CancelToken>>,
    next_generation: AtomicU64,
    /// Every generation up to this one was cancelled explicitly.
    cancelled_through: AtomicU64,
    worker: Option<thread::JoinHandle<()>>,
}

impl MapLoader {
    pub fn new() -> std::io::Result<Self> {
        let (request_tx, request_rx) = unbounded::<LoadRequest>();
        let (status_tx, status_rx) = unbounded::<(u64, LoadStatus)>();

        let worker = thread::Builder::new()
            .name("map-loader".to_string())
            .spawn(move || load_loop(request_rx, status_tx))?;

        Ok(Self {
            request_tx: Some(request_tx),
            status_rx,
            latest_cancel: Mutex::new(None),
            next_generation: AtomicU64::new(1),
            cancelled_through: AtomicU64::new(0),
            worker: Some(worker),
        })
    }

    /// Queue a load from disk. Returns its generation.
    pub fn load_path(&self, path: &Path, settings: LoaderSettings) -> u64 {
        self.queue(LoadSource::Path(path.to_path_buf()), settings)
    }

    /// Queue a load from a buffer already in memory.
    pub fn load_bytes(&self, name: &str, data: impl Into<Arc<[u8]>>, settings: LoaderSettings) -> u64 {
        self.queue(
            LoadSource::Bytes {
                name: name.to_string(),
                data: data.into(),
            },
            settings,
        )
    }

    pub fn queue(&self, source: LoadSource, settings: LoaderSettings) -> u64 {
        let cancel = CancelToken::new();
        let generation = {
            let mut latest = self.latest_cancel.lock();
            if let Some(previous) = latest.replace(cancel.clone()) {
                previous.cancel();
            }
            self.next_generation.fetch_add(1, Ordering::Relaxed)
        };

        debug!(generation, source = %source.name(), "queueing map load");
        let request = LoadRequest {
            generation,
            source,
            settings,
            cancel,
        };
        let sent = self
            .request_tx
            .as_ref()
            .is_some_and(|tx| tx.send(request).is_ok());
        if !sent {
            warn!(generation, "map loader worker is gone");
        }
        generation
    }

    /// Cancel the newest request, and with it every pending load. Loads
    /// that already finished are no longer current either.
    pub fn cancel(&self) {
        let latest = self.latest_cancel.lock();
        if let Some(token) = latest.as_ref() {
            token.cancel();
        }
        let through = self.latest_generation();
        self.cancelled_through.fetch_max(through, Ordering::Relaxed);
        debug!(through, "map loads cancelled");
    }

    /// Generation of the newest request, 0 if none was made.
    pub fn latest_generation(&self) -> u64 {
        self.next_generation.load(Ordering::Relaxed) - 1
    }

    /// True for the newest request unless it was cancelled.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.latest_generation()
            && generation > self.cancelled_through.load(Ordering::Relaxed)
    }

    /// All status updates available right now.
    pub fn poll_updates(&self) -> Vec<(u64, LoadStatus)> {
        self.status_rx.try_iter().collect()
    }

    /// Block for the next status update, up to `timeout`.
    pub fn wait_update(&self, timeout: Duration) -> Option<(u64, LoadStatus)> {
        match self.status_rx.recv_timeout(timeout) {
            Ok(update) => Some(update),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for MapLoader {
    fn drop(&mut self) {
        self.cancel();
        // closing the request channel ends the worker loop
        self.request_tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("map loader worker panicked");
            }
        }
    }
}

fn load_loop(request_rx: Receiver<LoadRequest>, status_tx: Sender<(u64, LoadStatus)>) {
    while let Ok(request) = request_rx.recv() {
        let generation = request.generation;
        let status = if request.cancel.is_cancelled() {
            LoadStatus::Cancelled
        } else {
            if status_tx.send((generation, LoadStatus::Started)).is_err() {
                break;
            }
            run_request(&request)
        };

        match &status {
            LoadStatus::Completed { scene, report } => {
                info!(generation, name = scene.name(), issues = report.len(), "map load finished")
            }
            LoadStatus::Failed(e) => warn!(generation, "map load failed: {}", e),
            LoadStatus::Cancelled => debug!(generation, "map load cancelled"),
            LoadStatus::Started => {}
        }
        if status_tx.send((generation, status)).is_err() {
            break;
        }
    }
    debug!("map loader worker exiting");
}

fn run_request(request: &LoadRequest) -> LoadStatus {
    let assembler = SceneAssembler::new(request.settings);
    let result = match &request.source {
        LoadSource::Path(path) => read_map_file(path).and_then(|data| {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            assembler.load_cancellable(&name, &data, &request.cancel)
        }),
        LoadSource::Bytes { name, data } => assembler.load_cancellable(name, data, &request.cancel),
    };

    match result {
        Ok((scene, report)) => LoadStatus::Completed {
            scene: Arc::new(scene),
            report,
        },
        Err(LoadError::Cancelled) => LoadStatus::Cancelled,
        Err(e) => LoadStatus::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testmap::{quad_map, two_room_map};
    use std::io::Write;

    const WAIT: Duration = Duration::from_secs(10);

    /// Statuses up to and including the final one for `generation`.
    fn wait_final(loader: &MapLoader, generation: u64) -> Vec<(u64, LoadStatus)> {
        let mut seen = Vec::new();
        while let Some((g, status)) = loader.wait_update(WAIT) {
            let done = g == generation && status.is_final();
            seen.push((g, status));
            if done {
                return seen;
            }
        }
        panic!("no final status for generation {}", generation);
    }

    fn final_status(updates: &[(u64, LoadStatus)], generation: u64) -> &LoadStatus {
        updates
            .iter()
            .rev()
            .find(|(g, s)| *g == generation && s.is_final())
            .map(|(_, s)| s)
            .unwrap()
    }

    #[test]
    fn slot_refuses_older_generation() {
        let slot = SceneSlot::new();
        assert!(slot.current().is_none());
        assert_eq!(slot.generation(), 0);

        let data = quad_map().finish();
        let (scene, _) = SceneAssembler::default().load("a", &data).unwrap();
        let scene = Arc::new(scene);
        assert!(slot.publish(3, Arc::clone(&scene)));
        let held = slot.current().unwrap();
        assert!(!slot.publish(2, Arc::clone(&scene)));
        assert_eq!(slot.generation(), 3);
        slot.clear();
        assert!(slot.current().is_none());
        // readers keep their scene after the slot moves on
        assert_eq!(held.name(), "a");
    }

    #[test]
    fn load_bytes_completes() {
        let loader = MapLoader::new().unwrap();
        let generation = loader.load_bytes("quad", quad_map().finish(), LoaderSettings::default());
        assert_eq!(generation, 1);
        assert!(loader.is_current(generation));

        let updates = wait_final(&loader, generation);
        assert!(matches!(updates[0].1, LoadStatus::Started));
        match final_status(&updates, generation) {
            LoadStatus::Completed { scene, report } => {
                assert_eq!(scene.name(), "quad");
                assert!(report.is_empty());
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert!(loader.poll_updates().is_empty());
    }

    #[test]
    fn load_path_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".BSP").tempfile().unwrap();
        file.write_all(&two_room_map().finish()).unwrap();
        file.flush().unwrap();

        let loader = MapLoader::new().unwrap();
        let generation = loader.load_path(file.path(), LoaderSettings::default());
        let updates = wait_final(&loader, generation);
        match final_status(&updates, generation) {
            LoadStatus::Completed { scene, .. } => {
                assert_eq!(scene.faces().len(), 2);
                assert_eq!(scene.checksum(), bspview_common::crc::crc_block(&two_room_map().finish()));
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn wrong_extension_rejected() {
        let err = read_map_file(Path::new("maps/readme.txt")).unwrap_err();
        assert!(matches!(err, LoadError::NotABspFile { .. }));
        let err = read_map_file(Path::new("maps/noext")).unwrap_err();
        assert!(matches!(err, LoadError::NotABspFile { .. }));
    }

    #[test]
    fn missing_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.bsp");

        let loader = MapLoader::new().unwrap();
        let generation = loader.load_path(&path, LoaderSettings::default());
        let updates = wait_final(&loader, generation);
        match final_status(&updates, generation) {
            LoadStatus::Failed(LoadError::Io { path: p, .. }) => assert_eq!(p, &path),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn corrupt_bytes_fail_load() {
        let loader = MapLoader::new().unwrap();
        let generation = loader.load_bytes("junk", vec![0u8; 16], LoaderSettings::default());
        let updates = wait_final(&loader, generation);
        assert!(matches!(
            final_status(&updates, generation),
            LoadStatus::Failed(LoadError::Corrupt(_))
        ));
    }

    #[test]
    fn newer_request_supersedes_older() {
        let loader = MapLoader::new().unwrap();
        let first = loader.load_bytes("first", two_room_map().finish(), LoaderSettings::default());
        let second = loader.load_bytes("second", quad_map().finish(), LoaderSettings::default());
        assert!(second > first);
        assert!(!loader.is_current(first));
        assert!(loader.is_current(second));

        let updates = wait_final(&loader, second);
        // the first load either finished before it was superseded or was dropped
        assert!(matches!(
            final_status(&updates, first),
            LoadStatus::Completed { .. } | LoadStatus::Cancelled
        ));
        assert!(matches!(
            final_status(&updates, second),
            LoadStatus::Completed { .. }
        ));
    }

    #[test]
    fn cancel_before_pickup_or_finish() {
        let loader = MapLoader::new().unwrap();
        let generation = loader.load_bytes("quad", quad_map().finish(), LoaderSettings::default());
        loader.cancel();
        let updates = wait_final(&loader, generation);
        assert!(matches!(
            final_status(&updates, generation),
            LoadStatus::Completed { .. } | LoadStatus::Cancelled
        ));
        assert!(!loader.is_current(generation));
        // a cancelled token stays cancelled; the next request gets a fresh one
        let next = loader.load_bytes("quad", quad_map().finish(), LoaderSettings::default());
        assert!(loader.is_current(next));
        let updates = wait_final(&loader, next);
        assert!(matches!(
            final_status(&updates, next),
            LoadStatus::Completed { .. }
        ));
    }

    #[test]
    fn cancel_after_finish_is_not_current() {
        let loader = MapLoader::new().unwrap();
        let generation = loader.load_bytes("quad", quad_map().finish(), LoaderSettings::default());
        let updates = wait_final(&loader, generation);
        assert!(matches!(
            final_status(&updates, generation),
            LoadStatus::Completed { .. }
        ));
        assert!(loader.is_current(generation));

        loader.cancel();
        assert!(!loader.is_current(generation));
        assert_eq!(loader.latest_generation(), generation);
    }
}
