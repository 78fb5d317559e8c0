//! Plugin setup file (`config.txt`) loading.
//!
//! The file lives in the plugin bundle directory and holds `key = value`
//! lines. Keys are case-insensitive, values are trimmed, lines starting
//! with `#` and unknown keys are ignored.

use crate::error::{BridgeError, Result};
use crate::layout::{DEFAULT_SAMPLE_RATE, MAX_CHANNELS, MAX_PARAMETERS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.txt";
pub const MAX_PROGRAMS: usize = 128;
pub const DEFAULT_PARAMETER_NAME: &str = "<unnamed>";

#[cfg(windows)]
pub const ENGINE_BINARY: &str = "patchbridge-scheduler.exe";
#[cfg(not(windows))]
pub const ENGINE_BINARY: &str = "patchbridge-scheduler";

/// A preset: a name and one value per parameter slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub values: Vec<f32>,
}

impl Program {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: vec![0.0; MAX_PARAMETERS],
        }
    }
}

/// Immutable plugin configuration, built once per instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub plugin_name: String,
    pub plugin_id: u32,
    pub version: String,
    pub author: String,
    pub url: String,
    pub mail: String,
    /// Plugin bundle root.
    pub bundle_dir: PathBuf,
    /// `<bundle>/Contents/Resources/`, where the scheduler library lives.
    pub scheduler_dir: PathBuf,
    /// Directory holding the scheduler executable.
    pub engine_dir: PathBuf,
    pub engine_flags: String,
    /// Content file opened by the scheduler at startup.
    pub content_file: String,
    pub channels_in: usize,
    pub channels_out: usize,
    pub is_synth: bool,
    pub debug: bool,
    pub parameter_count: usize,
    pub parameter_names: Vec<String>,
    pub programs: Vec<Program>,
    pub libraries: Vec<String>,
    pub latency: u32,
    pub sample_rate: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::for_bundle(Path::new("."))
    }
}

impl BridgeConfig {
    /// Defaults derived from a bundle path alone.
    pub fn for_bundle(bundle_dir: &Path) -> Self {
        let scheduler_dir = bundle_dir.join("Contents").join("Resources");
        Self {
            plugin_name: plugin_name_from_bundle(bundle_dir),
            plugin_id: u32::from_be_bytes(*b"pbrg"),
            version: "0.0.1".to_string(),
            author: String::new(),
            url: String::new(),
            mail: String::new(),
            bundle_dir: bundle_dir.to_path_buf(),
            engine_dir: scheduler_dir.clone(),
            scheduler_dir,
            engine_flags: String::new(),
            content_file: String::new(),
            channels_in: 2,
            channels_out: 2,
            is_synth: false,
            debug: false,
            parameter_count: 0,
            parameter_names: vec![DEFAULT_PARAMETER_NAME.to_string(); MAX_PARAMETERS],
            programs: vec![Program::new("Default")],
            libraries: Vec::new(),
            latency: 0,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    /// Read `<bundle_dir>/config.txt`. A missing file yields the defaults.
    pub fn load(bundle_dir: &Path) -> Result<Self> {
        let path = bundle_dir.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::parse(&text, bundle_dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "No setup file, using defaults");
                Ok(Self::for_bundle(bundle_dir))
            }
            Err(e) => Err(BridgeError::Config(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn parse(text: &str, bundle_dir: &Path) -> Result<Self> {
        let mut config = Self::for_bundle(bundle_dir);
        let mut current_program: Option<usize> = None;

        for line in text.lines() {
            if line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            if key.is_empty() {
                continue;
            }

            match key.as_str() {
                "in-channels" => config.channels_in = parse_number(&key, value)?,
                "out-channels" => config.channels_out = parse_number(&key, value)?,
                "main" => config.content_file = value.to_string(),
                "engine-path" => config.engine_dir = resolve_engine_dir(bundle_dir, value),
                "engine-flags" => config.engine_flags = value.to_string(),
                "id" => config.plugin_id = parse_plugin_id(value),
                "synth" => {
                    if let Some(flag) = parse_flag(value) {
                        config.is_synth = flag;
                    }
                }
                "debug" => {
                    if let Some(flag) = parse_flag(value) {
                        config.debug = flag;
                    }
                }
                "parameters" => {
                    let count: usize = parse_number(&key, value)?;
                    if count < MAX_PARAMETERS {
                        config.parameter_count = count;
                    } else {
                        tracing::warn!(count, "Parameter count out of range, ignored");
                    }
                }
                "version" => config.version = value.to_string(),
                "author" => config.author = value.to_string(),
                "url" => config.url = value.to_string(),
                "mail" => config.mail = value.to_string(),
                "plugname" => config.plugin_name = value.to_string(),
                "latency" => config.latency = parse_number(&key, value)?,
                "lib" => config.libraries.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|lib| !lib.is_empty())
                        .map(String::from),
                ),
                "program" => {
                    // The first program line renames the default preset.
                    let index = match current_program {
                        None => 0,
                        Some(_) if config.programs.len() >= MAX_PROGRAMS => {
                            tracing::warn!("Too many programs, '{}' ignored", value);
                            continue;
                        }
                        Some(_) => {
                            config.programs.push(Program::new(""));
                            config.programs.len() - 1
                        }
                    };
                    config.programs[index].name = value.to_string();
                    current_program = Some(index);
                }
                _ => {
                    if let Some(index) = indexed_key(&key, "nameparameter") {
                        config.parameter_names[index] = value.to_string();
                    } else if let Some(index) = indexed_key(&key, "parameter") {
                        let program = current_program.unwrap_or(0);
                        config.programs[program].values[index] =
                            value.parse().map_err(|_| {
                                BridgeError::Config(format!("{} is not a number: {}", key, value))
                            })?;
                    }
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels_in > MAX_CHANNELS || self.channels_out > MAX_CHANNELS {
            return Err(BridgeError::Config(format!(
                "{} in / {} out channels exceeds the maximum of {}",
                self.channels_in, self.channels_out, MAX_CHANNELS
            )));
        }
        if self.parameter_count > MAX_PARAMETERS {
            return Err(BridgeError::Config(format!(
                "{} parameters exceeds the maximum of {}",
                self.parameter_count, MAX_PARAMETERS
            )));
        }
        Ok(())
    }

    pub fn engine_executable(&self) -> PathBuf {
        self.engine_dir.join(ENGINE_BINARY)
    }

    pub fn parameter_name(&self, index: usize) -> &str {
        self.parameter_names
            .get(index)
            .map(String::as_str)
            .unwrap_or(DEFAULT_PARAMETER_NAME)
    }
}

fn plugin_name_from_bundle(bundle_dir: &Path) -> String {
    let name = bundle_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.to_ascii_lowercase().find(".vst3") {
        Some(pos) => name[..pos].to_string(),
        None => name,
    }
}

fn resolve_engine_dir(bundle_dir: &Path, value: &str) -> PathBuf {
    match value {
        "@plug_parent" => bundle_dir.join("..").join("engine"),
        "@resources" => bundle_dir.join("Contents").join("Resources").join("engine"),
        other => PathBuf::from(other),
    }
}

/// Four characters packed big-endian, e.g. `"abcd"` -> `0x61626364`.
fn parse_plugin_id(value: &str) -> u32 {
    let mut bytes = [0u8; 4];
    for (slot, byte) in bytes.iter_mut().zip(value.bytes()) {
        *slot = byte;
    }
    u32::from_be_bytes(bytes)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| BridgeError::Config(format!("{} is not a valid number: {}", key, value)))
}

/// `prefixN` with `N < MAX_PARAMETERS`.
fn indexed_key(key: &str, prefix: &str) -> Option<usize> {
    let digits = key.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|&index| index < MAX_PARAMETERS)
}
