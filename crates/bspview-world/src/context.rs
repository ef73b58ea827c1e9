// context.rs — application context and per-frame command processing
//
// Input handling and other front ends never touch the loader or the scene
// slot directly. They push commands onto the queue; `AppContext::frame`
// applies them once per tick and publishes finished loads.

use std::path::PathBuf;
use std::sync::Arc;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use bspview_common::cvar::{CvarContext, LoaderSettings};

use crate::error::{LoadError, LoadReport};
use crate::loader::{LoadStatus, MapLoader, SceneSlot};
use crate::scene::Scene;

pub const COMMAND_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    LoadPath(PathBuf),
    LoadBytes { name: String, data: Vec<u8> },
    /// Cancel every pending load.
    Cancel,
    SetCvar { name: String, value: String },
}

// ============================================================
// Command queue
// ============================================================

/// Bounded command queue between producers and the frame thread.
pub struct CommandQueue {
    sender: Sender<Command>,
    receiver: Receiver<Command>,
}

impl CommandQueue {
    /// When full, new commands are dropped; producers never block.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            sender: self.sender.clone(),
        }
    }

    pub fn try_recv(&self) -> Option<Command> {
        self.receiver.try_recv().ok()
    }

    /// Take everything queued right now, in arrival order.
    pub fn drain(&self) -> Vec<Command> {
        self.receiver.try_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

/// Producer handle for the command queue.
#[derive(Clone)]
pub struct CommandSender {
    sender: Sender<Command>,
}

impl CommandSender {
    /// Returns `false` if the queue is full or closed and the command was dropped.
    pub fn send(&self, command: Command) -> bool {
        match self.sender.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("command queue full, dropping command");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

// ============================================================
// Frame events
// ============================================================

/// What happened during one frame.
#[derive(Debug)]
pub enum FrameEvent {
    LoadQueued { generation: u64 },
    LoadStarted { generation: u64 },
    ScenePublished { generation: u64, report: LoadReport },
    /// A load finished after a newer one was requested or after a cancel.
    SceneDiscarded { generation: u64 },
    LoadFailed { generation: u64, error: LoadError },
    LoadCancelled { generation: u64 },
    CvarRejected { name: String },
}

// ============================================================
// Context
// ============================================================

pub struct AppContext {
    cvars: CvarContext,
    loader: MapLoader,
    slot: Arc<SceneSlot>,
    commands: CommandQueue,
}

impl AppContext {
    pub fn new(cvars: CvarContext) -> std::io::Result<Self> {
        Ok(Self {
            cvars,
            loader: MapLoader::new()?,
            slot: Arc::new(SceneSlot::new()),
            commands: CommandQueue::new(COMMAND_QUEUE_CAPACITY),
        })
    }

    pub fn cvars(&self) -> &CvarContext {
        &self.cvars
    }

    pub fn cvars_mut(&mut self) -> &mut CvarContext {
        &mut self.cvars
    }

    pub fn loader(&self) -> &MapLoader {
        &self.loader
    }

    /// Shared handle for readers on other threads.
    pub fn slot(&self) -> Arc<SceneSlot> {
        Arc::clone(&self.slot)
    }

    pub fn scene(&self) -> Option<Arc<Scene>> {
        self.slot.current()
    }

    pub fn commands(&self) -> CommandSender {
        self.commands.sender()
    }

    pub fn loader_settings(&self) -> LoaderSettings {
        LoaderSettings::from_cvars(&self.cvars)
    }

    /// Apply queued commands, then collect loader updates and publish the
    /// newest finished scene.
    pub fn frame(&mut self) -> Vec<FrameEvent> {
        let mut events = Vec::new();

        for command in self.commands.drain() {
            self.execute(command, &mut events);
        }

        for (generation, status) in self.loader.poll_updates() {
            events.push(self.apply_status(generation, status));
        }

        events
    }

    fn execute(&mut self, command: Command, events: &mut Vec<FrameEvent>) {
        match command {
            Command::LoadPath(path) => {
                let generation = self.loader.load_path(&path, self.loader_settings());
                events.push(FrameEvent::LoadQueued { generation });
            }
            Command::LoadBytes { name, data } => {
                let generation = self.loader.load_bytes(&name, data, self.loader_settings());
                events.push(FrameEvent::LoadQueued { generation });
            }
            Command::Cancel => self.loader.cancel(),
            Command::SetCvar { name, value } => {
                if !self.cvars.set(&name, &value) {
                    events.push(FrameEvent::CvarRejected { name });
                }
            }
        }
    }

    fn apply_status(&mut self, generation: u64, status: LoadStatus) -> FrameEvent {
        match status {
            LoadStatus::Started => FrameEvent::LoadStarted { generation },
            LoadStatus::Completed { scene, report } => {
                if self.loader.is_current(generation) && self.slot.publish(generation, scene) {
                    info!(generation, "scene published");
                    FrameEvent::ScenePublished { generation, report }
                } else {
                    debug!(generation, "discarding superseded or cancelled scene");
                    FrameEvent::SceneDiscarded { generation }
                }
            }
            LoadStatus::Failed(error) => FrameEvent::LoadFailed { generation, error },
            LoadStatus::Cancelled => FrameEvent::LoadCancelled { generation },
        }
    }
}
