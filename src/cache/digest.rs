//! Streaming content digest for cache keys
//!
//! SHA-256 truncated to a fixed hex prefix. Keys are content addresses,
//! not cryptographic identities; a truncated collision costs at worst a
//! wrong local hit, caught by the next build.

use sha2::{Digest as _, Sha256};
use std::io::{self, Read, Write};

/// Length in hex characters of a cache key
pub const KEY_HEX_LEN: usize = 16;

/// Incremental SHA-256 digest with hex-truncated output
pub struct Digest {
    inner: Sha256,
}

impl Digest {
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// Feed bytes into the digest
    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Stream an entire reader into the digest, returning the byte count
    pub fn update_reader<R: Read>(&mut self, reader: &mut R) -> io::Result<u64> {
        io::copy(reader, &mut DigestWriter(&mut self.inner))
    }

    /// Consume the digest, returning the first `len` hex characters
    pub fn finish_hex(self, len: usize) -> String {
        let mut hash = hex::encode(self.inner.finalize());
        hash.truncate(len);
        hash
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

struct DigestWriter<'a>(&'a mut Sha256);

impl Write for DigestWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
