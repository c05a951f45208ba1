//! Host interface: display, breathing, output routing, configuration
//!
//! The engine never performs blocking host I/O on the scheduler's thread
//! of control directly; operations that must run on a host thread go
//! through the [`Workspace`] trait. A headless host executes them inline.

use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::nvm::error::{EngineError, EngineResult};
use crate::nvm::value::Value;

/// Process-wide engine configuration.
///
/// `is_app` is set once at construction and read-only thereafter; it
/// replaces any notion of a global mutable application flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// World width in patches.
    pub world_width: u32,
    /// World height in patches.
    pub world_height: u32,
    /// Seed for the world RNG.
    pub seed: u64,
    /// Directory of the current model, for model-relative extension
    /// resolution.
    pub model_dir: PathBuf,
    /// Shared `extensions/` search root, tried after the model directory.
    pub extensions_root: Option<PathBuf>,
    /// Whether the process hosts a GUI application.
    pub is_app: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            world_width: 32,
            world_height: 32,
            seed: 0,
            model_dir: PathBuf::from("."),
            extensions_root: None,
            is_app: false,
        }
    }
}

/// Where routed output lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDestination {
    /// The on-screen output area.
    OutputArea,
    /// An open output file.
    File(PathBuf),
}

/// Host services the engine consumes.
pub trait Workspace {
    /// Ask the host to redraw the view when it next can.
    fn request_display_update(&self);

    /// Give the host a chance to pump its own event loop.
    fn breathe(&self);

    /// Deliver one line of routed output, tagged with its owner caption.
    fn send_output(
        &self,
        owner: &str,
        destination: &OutputDestination,
        text: &str,
    ) -> EngineResult<()>;

    /// Put a yes/no question to the user (extension soft-version
    /// warnings). Headless hosts answer without prompting.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Render a value and route it to the host, tagged with an addressable
/// owner caption.
pub fn output_object(
    value: &Value,
    owner: &str,
    destination: &OutputDestination,
    workspace: &dyn Workspace,
) -> EngineResult<()> {
    workspace.send_output(owner, destination, &value.print_form())
}

/// An in-process host that records everything it is asked to do. Used by
/// tests and by embeddings with no GUI.
pub struct HeadlessWorkspace {
    output: Mutex<Vec<(String, String)>>,
    display_updates: Mutex<usize>,
    breaths: Mutex<usize>,
    confirm_answer: bool,
}

impl HeadlessWorkspace {
    /// Headless host that answers "yes" to confirmations.
    pub fn new() -> Self {
        Self {
            output: Mutex::new(Vec::new()),
            display_updates: Mutex::new(0),
            breaths: Mutex::new(0),
            confirm_answer: true,
        }
    }

    /// Headless host with a fixed answer for confirmations.
    pub fn answering(confirm_answer: bool) -> Self {
        Self {
            confirm_answer,
            ..Self::new()
        }
    }

    /// Output lines captured so far, as (owner, text) pairs.
    pub fn output_lines(&self) -> Vec<(String, String)> {
        self.output.lock().clone()
    }

    /// Number of display updates requested.
    pub fn display_update_count(&self) -> usize {
        *self.display_updates.lock()
    }

    /// Number of breathe calls.
    pub fn breath_count(&self) -> usize {
        *self.breaths.lock()
    }
}

impl Default for HeadlessWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace for HeadlessWorkspace {
    fn request_display_update(&self) {
        *self.display_updates.lock() += 1;
    }

    fn breathe(&self) {
        *self.breaths.lock() += 1;
    }

    fn send_output(
        &self,
        owner: &str,
        destination: &OutputDestination,
        text: &str,
    ) -> EngineResult<()> {
        match destination {
            OutputDestination::OutputArea => {
                self.output.lock().push((owner.to_string(), text.to_string()));
                Ok(())
            }
            OutputDestination::File(path) => {
                use std::io::Write;
                let mut file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| EngineError::Runtime(e.to_string()))?;
                writeln!(file, "{text}").map_err(|e| EngineError::Runtime(e.to_string()))
            }
        }
    }

    fn confirm(&self, _prompt: &str) -> bool {
        self.confirm_answer
    }
}
