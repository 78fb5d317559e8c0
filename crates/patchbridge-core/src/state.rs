//! Persisted plugin state.
//!
//! Layout (little-endian): `MAX_PARAMETERS` doubles, one per parameter slot,
//! zero-padded; an `i32` chunk length; the chunk bytes.

use crate::error::{BridgeError, Result};
use crate::layout::MAX_PARAMETERS;
use std::io::{Read, Write};

#[derive(Debug, Clone, PartialEq)]
pub struct PluginState {
    pub parameters: Vec<f64>,
    pub chunk: Vec<u8>,
}

impl PluginState {
    /// `parameters` is padded with zeros (or cut) to `MAX_PARAMETERS` slots.
    pub fn new(mut parameters: Vec<f64>, chunk: Vec<u8>) -> Self {
        parameters.resize(MAX_PARAMETERS, 0.0);
        Self { parameters, chunk }
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let len = i32::try_from(self.chunk.len())
            .map_err(|_| BridgeError::StateSave(format!("chunk of {} bytes", self.chunk.len())))?;

        for slot in 0..MAX_PARAMETERS {
            let value = self.parameters.get(slot).copied().unwrap_or(0.0);
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(&self.chunk)?;
        Ok(())
    }

    /// Trailing bytes after the chunk are ignored.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut parameters = Vec::with_capacity(MAX_PARAMETERS);
        let mut word = [0u8; 8];
        for slot in 0..MAX_PARAMETERS {
            reader.read_exact(&mut word).map_err(|e| {
                BridgeError::StateRestore(format!("parameter {}: {}", slot, e))
            })?;
            parameters.push(f64::from_le_bytes(word));
        }

        let mut len = [0u8; 4];
        reader
            .read_exact(&mut len)
            .map_err(|e| BridgeError::StateRestore(format!("chunk length: {}", e)))?;
        let len = i32::from_le_bytes(len);
        if len < 0 {
            return Err(BridgeError::StateRestore(format!(
                "negative chunk length {}",
                len
            )));
        }

        let mut chunk = Vec::new();
        reader
            .take(len as u64)
            .read_to_end(&mut chunk)
            .map_err(|e| BridgeError::StateRestore(format!("chunk: {}", e)))?;
        if chunk.len() != len as usize {
            return Err(BridgeError::StateRestore(format!(
                "chunk truncated: {} of {} bytes",
                chunk.len(),
                len
            )));
        }

        Ok(Self { parameters, chunk })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(MAX_PARAMETERS * 8 + 4 + self.chunk.len());
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read_from(bytes)
    }
}

impl Default for PluginState {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}
