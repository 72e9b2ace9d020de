//! Wire buffer handling
//!
//! A fixed capacity cursor buffer used to write RPS element payloads of a
//! precomputed size and to read them back.

use crate::{RawError, Result};

/// Largest payload of a single information element
pub const MAX_ELEMENT_LEN: usize = u8::MAX as usize;

/// Fixed capacity wire buffer with independent read and write cursors
#[derive(Debug, Clone)]
pub struct WireBuffer {
    /// Buffer data
    data: Vec<u8>,
    /// Current read position
    read_pos: usize,
    /// Current write position
    write_pos: usize,
}

impl WireBuffer {
    /// Create an empty buffer that can hold exactly `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|e| RawError::ResourceExhausted(format!("wire buffer: {}", e)))?;
        data.resize(capacity, 0);
        Ok(Self {
            data,
            read_pos: 0,
            write_pos: 0,
        })
    }

    /// Create buffer from existing data, ready to be read
    pub fn from_data(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            read_pos: 0,
            write_pos: data.len(),
        }
    }

    /// Total capacity
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes written so far
    pub fn position(&self) -> usize {
        self.write_pos
    }

    /// Get available bytes for reading
    pub fn available(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Get remaining space for writing
    pub fn remaining(&self) -> usize {
        self.data.len() - self.write_pos
    }

    /// Check if the whole capacity has been written
    pub fn is_full(&self) -> bool {
        self.write_pos == self.data.len()
    }

    fn reserve_write(&mut self, len: usize) -> Result<&mut [u8]> {
        if self.remaining() < len {
            return Err(RawError::InternalInconsistency(format!(
                "wire buffer overflow: {} bytes at offset {} of {}",
                len,
                self.write_pos,
                self.data.len()
            )));
        }
        let start = self.write_pos;
        self.write_pos += len;
        Ok(&mut self.data[start..start + len])
    }

    fn take_read(&mut self, len: usize) -> Result<&[u8]> {
        if self.available() < len {
            return Err(RawError::InvalidArgument(format!(
                "truncated data: {} bytes needed at offset {}, {} available",
                len,
                self.read_pos,
                self.available()
            )));
        }
        let start = self.read_pos;
        self.read_pos += len;
        Ok(&self.data[start..start + len])
    }

    /// Write single byte
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.reserve_write(1)?[0] = value;
        Ok(())
    }

    /// Write u16 in little endian
    pub fn write_u16_le(&mut self, value: u16) -> Result<()> {
        self.reserve_write(2)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Write the low 24 bits of `value` in little endian
    pub fn write_u24_le(&mut self, value: u32) -> Result<()> {
        self.reserve_write(3)?.copy_from_slice(&value.to_le_bytes()[..3]);
        Ok(())
    }

    /// Read single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_read(1)?[0])
    }

    /// Read u16 in little endian
    pub fn read_u16_le(&mut self) -> Result<u16> {
        let bytes = self.take_read(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read 24 bit little endian value
    pub fn read_u24_le(&mut self) -> Result<u32> {
        let bytes = self.take_read(3)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
    }

    /// Written bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.write_pos]
    }

    /// Consume the buffer, returning the written bytes
    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.write_pos);
        self.data
    }
}
