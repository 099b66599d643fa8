//! Reusable in-memory gzip compressor.
//!
//! One [`StreamingCompressor`] lives per worker thread and is reset between
//! tiles, so the deflate engine is allocated once per thread instead of once
//! per tile.
//!
//! ## Output Layout (RFC 1952)
//!
//! ```text
//! [header : 10 bytes]  1f 8b 08 | flags 0 | mtime 0 (4) | xfl 0 | os 255
//! [deflate body]
//! [trailer: 8 bytes]   crc32 (LE) | input size mod 2^32 (LE)
//! ```

use std::io;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::{Compress, Compression, Crc, FlushCompress, Status};

use crate::error::{Result, TilerError};

/// Size of the stack buffer each deflate call writes into.
pub const SCRATCH_SIZE: usize = 4 * 1024;

const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0xff];

/// Gzip compressor writing into a growable buffer.
pub struct StreamingCompressor {
    engine: Compress,
    crc: Crc,
    buffer: Vec<u8>,
    finished: bool,
}

impl StreamingCompressor {
    /// Compressor at zlib's default level (6) and strategy.
    pub fn new() -> Self {
        let mut compressor = Self {
            engine: Compress::new(Compression::default(), false),
            crc: Crc::new(),
            buffer: Vec::with_capacity(SCRATCH_SIZE),
            finished: false,
        };
        compressor.buffer.extend_from_slice(&GZIP_HEADER);
        compressor
    }

    /// Drop accumulated output and rewind the engine for a new stream.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.crc.reset();
        self.buffer.clear();
        self.buffer.extend_from_slice(&GZIP_HEADER);
        self.finished = false;
    }

    /// Feed `data` into the current stream.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.finished {
            return Err(TilerError::Compression(
                "write after finish; reset the compressor first".into(),
            ));
        }
        self.crc.update(data);
        self.deflate_round(data, FlushCompress::None)
    }

    /// Flush the engine and append the gzip trailer.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.deflate_round(&[], FlushCompress::Finish)?;
        self.buffer.write_u32::<LittleEndian>(self.crc.sum())?;
        self.buffer.write_u32::<LittleEndian>(self.crc.amount())?;
        self.finished = true;
        Ok(())
    }

    /// Compressed stream; complete only after [`finish`](Self::finish).
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Run deflate until `input` is consumed and the engine has nothing left
    /// to drain into the scratch buffer.
    fn deflate_round(&mut self, mut input: &[u8], flush: FlushCompress) -> Result<()> {
        let finishing = matches!(flush, FlushCompress::Finish);
        let mut scratch = [0u8; SCRATCH_SIZE];

        loop {
            let in_before = self.engine.total_in();
            let out_before = self.engine.total_out();
            let status = self
                .engine
                .compress(input, &mut scratch, flush)
                .map_err(|e| TilerError::Compression(e.to_string()))?;
            let consumed = (self.engine.total_in() - in_before) as usize;
            let produced = (self.engine.total_out() - out_before) as usize;

            input = &input[consumed..];
            self.buffer.extend_from_slice(&scratch[..produced]);

            let drained = if finishing {
                matches!(status, Status::StreamEnd)
            } else {
                produced < SCRATCH_SIZE
            };
            if drained && input.is_empty() {
                break;
            }
            if consumed == 0 && produced == 0 {
                if finishing {
                    return Err(TilerError::Compression(
                        "deflate stalled before reaching stream end".into(),
                    ));
                }
                break;
            }
        }

        if !input.is_empty() {
            return Err(TilerError::Compression(format!(
                "deflate left {} input bytes unconsumed",
                input.len()
            )));
        }
        Ok(())
    }
}

impl Default for StreamingCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl io::Write for StreamingCompressor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
