//! # Wire Codec
//!
//! Canonical byte form of block headers and raw transactions.
//!
//! Integers are little-endian; counts and script lengths are CompactSize
//! (1, 3, 5 or 9 bytes). Decoding rejects truncated input and trailing bytes.

use crate::domain::{
    BlockHeader, Digest, ProofError, RawTransaction, TxInput, TxOutput, BLOCK_HEADER_SIZE,
    DIGEST_LEN,
};

/// Upper bound on pre-allocation while decoding untrusted counts.
const MAX_PREALLOC: usize = 1024;

/// Append-only little-endian writer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// Empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// u32, little-endian.
    pub fn write_u32_le(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// i32, little-endian.
    pub fn write_i32_le(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// u64, little-endian.
    pub fn write_u64_le(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// CompactSize integer.
    pub fn write_compact_size(&mut self, v: u64) {
        if v < 0xfd {
            self.buf.push(v as u8);
        } else if v <= 0xffff {
            self.buf.push(0xfd);
            self.buf.extend_from_slice(&(v as u16).to_le_bytes());
        } else if v <= 0xffff_ffff {
            self.buf.push(0xfe);
            self.buf.extend_from_slice(&(v as u32).to_le_bytes());
        } else {
            self.buf.push(0xff);
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    /// Length-prefixed byte string.
    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_compact_size(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    /// Finished buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a byte slice.
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Read `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ProofError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                ProofError::Codec(format!(
                    "unexpected end of data: need {} bytes at offset {}, have {}",
                    n,
                    self.pos,
                    self.remaining()
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ProofError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// u8.
    pub fn read_u8(&mut self) -> Result<u8, ProofError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// u32, little-endian.
    pub fn read_u32_le(&mut self) -> Result<u32, ProofError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// i32, little-endian.
    pub fn read_i32_le(&mut self) -> Result<i32, ProofError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// u64, little-endian.
    pub fn read_u64_le(&mut self) -> Result<u64, ProofError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// 32-byte digest.
    pub fn read_digest(&mut self) -> Result<Digest, ProofError> {
        Ok(Digest::new(self.read_array::<DIGEST_LEN>()?))
    }

    /// CompactSize integer.
    pub fn read_compact_size(&mut self) -> Result<u64, ProofError> {
        match self.read_u8()? {
            0xff => self.read_u64_le(),
            0xfe => Ok(u64::from(self.read_u32_le()?)),
            0xfd => Ok(u64::from(u16::from_le_bytes(self.read_array()?))),
            b => Ok(u64::from(b)),
        }
    }

    /// Length-prefixed byte string.
    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>, ProofError> {
        let len = self.read_len()?;
        Ok(self.read_bytes(len)?.to_vec())
    }

    fn read_len(&mut self) -> Result<usize, ProofError> {
        let len = self.read_compact_size()?;
        usize::try_from(len)
            .ok()
            .filter(|&l| l <= self.remaining())
            .ok_or_else(|| {
                ProofError::Codec(format!(
                    "length {} exceeds remaining {} bytes",
                    len,
                    self.remaining()
                ))
            })
    }

    /// Unread byte count.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Fail if anything is left unread.
    pub fn finish(&self) -> Result<(), ProofError> {
        if self.remaining() != 0 {
            return Err(ProofError::Codec(format!(
                "trailing {} bytes",
                self.remaining()
            )));
        }
        Ok(())
    }
}

impl BlockHeader {
    /// Append the 80-byte wire form.
    pub fn write_to(&self, w: &mut WireWriter) {
        w.write_i32_le(self.version);
        w.write_bytes(self.prev_block.as_bytes());
        w.write_bytes(self.merkle_root.as_bytes());
        w.write_u32_le(self.time);
        w.write_u32_le(self.bits);
        w.write_u32_le(self.nonce);
    }

    /// Read the 80-byte wire form.
    pub fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProofError> {
        Ok(Self {
            version: r.read_i32_le()?,
            prev_block: r.read_digest()?,
            merkle_root: r.read_digest()?,
            time: r.read_u32_le()?,
            bits: r.read_u32_le()?,
            nonce: r.read_u32_le()?,
        })
    }

    /// Canonical 80-byte serialization.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(BLOCK_HEADER_SIZE);
        self.write_to(&mut w);
        w.into_bytes()
    }

    /// Parse exactly 80 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        let mut r = WireReader::new(bytes);
        let header = Self::read_from(&mut r)?;
        r.finish()?;
        Ok(header)
    }

    /// Parse a hex-encoded header.
    pub fn from_hex(s: &str) -> Result<Self, ProofError> {
        let bytes = hex::decode(s).map_err(|e| ProofError::Codec(format!("invalid hex: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl TxInput {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_bytes(self.prev_txid.as_bytes());
        w.write_u32_le(self.prev_vout);
        w.write_var_bytes(&self.script_sig);
        w.write_u32_le(self.sequence);
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProofError> {
        Ok(Self {
            prev_txid: r.read_digest()?,
            prev_vout: r.read_u32_le()?,
            script_sig: r.read_var_bytes()?,
            sequence: r.read_u32_le()?,
        })
    }
}

impl TxOutput {
    fn write_to(&self, w: &mut WireWriter) {
        w.write_u64_le(self.value);
        w.write_var_bytes(&self.script_pubkey);
    }

    fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProofError> {
        Ok(Self {
            value: r.read_u64_le()?,
            script_pubkey: r.read_var_bytes()?,
        })
    }
}

impl RawTransaction {
    /// Append the wire form.
    pub fn write_to(&self, w: &mut WireWriter) {
        w.write_i32_le(self.version);
        w.write_compact_size(self.inputs.len() as u64);
        for input in &self.inputs {
            input.write_to(w);
        }
        w.write_compact_size(self.outputs.len() as u64);
        for output in &self.outputs {
            output.write_to(w);
        }
        w.write_u32_le(self.lock_time);
    }

    /// Read the wire form.
    pub fn read_from(r: &mut WireReader<'_>) -> Result<Self, ProofError> {
        let version = r.read_i32_le()?;

        let input_count = r.read_compact_size()?;
        let mut inputs = Vec::with_capacity((input_count as usize).min(MAX_PREALLOC));
        for _ in 0..input_count {
            inputs.push(TxInput::read_from(r)?);
        }

        let output_count = r.read_compact_size()?;
        let mut outputs = Vec::with_capacity((output_count as usize).min(MAX_PREALLOC));
        for _ in 0..output_count {
            outputs.push(TxOutput::read_from(r)?);
        }

        let lock_time = r.read_u32_le()?;

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// Canonical serialization.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        self.write_to(&mut w);
        w.into_bytes()
    }

    /// Parse exactly one transaction.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProofError> {
        let mut r = WireReader::new(bytes);
        let tx = Self::read_from(&mut r)?;
        r.finish()?;
        Ok(tx)
    }

    /// Parse a hex-encoded transaction.
    pub fn from_hex(s: &str) -> Result<Self, ProofError> {
        let bytes = hex::decode(s).map_err(|e| ProofError::Codec(format!("invalid hex: {e}")))?;
        Self::from_bytes(&bytes)
    }
}
