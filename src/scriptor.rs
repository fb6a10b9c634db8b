//! External script-generator collaborator.
//!
//! Observing scripts come from a site-provided generator program, invoked
//! with the encoded macro-state and the device name. The generator's first
//! stdout line is the script; producing no line is a per-device hard error
//! that must not take the caller down. Retained per-device scripts are
//! re-broadcast to peers as `SC_<device>` value lines.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, warn};

use crate::protocol::format_value_line;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("cannot run generator {0}: {1}")]
    Generator(PathBuf, #[source] std::io::Error),
    #[error("generator produced no script for {0}")]
    NoScript(String),
}

/// Run one generator invocation: `<generator> <state_word> <device>`,
/// first stdout line is the script.
///
/// Blocks until the generator exits; callers on a cooperative loop must
/// run it on a blocking worker.
pub fn run_generator(
    generator: &Path,
    state_word: u32,
    device: &str,
) -> Result<String, ScriptError> {
    let output = Command::new(generator)
        .arg(state_word.to_string())
        .arg(device)
        .output()
        .map_err(|err| ScriptError::Generator(generator.to_path_buf(), err))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .next()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| {
            warn!("{}: generator returned no script", device);
            ScriptError::NoScript(device.to_string())
        })?;

    debug!("{}: script \"{}\"", device, line);
    Ok(line.to_string())
}

/// Per-device script store fed by one generator program.
pub struct Scriptor {
    generator: PathBuf,
    scripts: HashMap<String, String>,
}

impl Scriptor {
    pub fn new(generator: impl Into<PathBuf>) -> Self {
        Self { generator: generator.into(), scripts: HashMap::new() }
    }

    pub fn generator(&self) -> &Path {
        &self.generator
    }

    /// Retain a script obtained from [`run_generator`].
    pub fn record(&mut self, device: &str, script: impl Into<String>) {
        self.scripts.insert(device.to_string(), script.into());
    }

    /// Ask the generator for a script for one device under the given
    /// macro-state word. The script is retained on success. Blocks like
    /// [`run_generator`].
    pub fn find_script(&mut self, state_word: u32, device: &str) -> Result<String, ScriptError> {
        let line = run_generator(&self.generator, state_word, device)?;
        self.record(device, line.clone());
        Ok(line)
    }

    pub fn script_for(&self, device: &str) -> Option<&str> {
        self.scripts.get(device).map(String::as_str)
    }

    /// Value-push lines for every retained script, for peers that attached
    /// after the scripts were generated.
    pub fn value_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .scripts
            .iter()
            .map(|(device, script)| format_value_line(&format!("SC_{device}"), script))
            .collect();
        lines.sort();
        lines
    }
}
