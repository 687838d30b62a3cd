//! Raw frame stream format.
//!
//! A temperature frame is the grid's 768 values as native-endian `f32`,
//! 3072 bytes, written back to back with no header or delimiter. An RGB
//! frame is the 2304-byte color image. Consumers must know the frame size
//! out of band.

use crate::types::{ColorImage, TemperatureGrid, PIXELS, RGB_BYTES_PER_PIXEL};
use std::io::{self, Read, Write};
use thiserror::Error;

/// Bytes per temperature frame.
pub const FRAME_BYTES: usize = PIXELS * std::mem::size_of::<f32>();
/// Bytes per RGB frame.
pub const RGB_FRAME_BYTES: usize = PIXELS * RGB_BYTES_PER_PIXEL;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Serialize a grid into its wire bytes.
pub fn encode_temperatures(grid: &TemperatureGrid, buf: &mut [u8; FRAME_BYTES]) {
    for (chunk, value) in buf.chunks_exact_mut(4).zip(grid.values.iter()) {
        chunk.copy_from_slice(&value.to_ne_bytes());
    }
}

/// Fill a grid from wire bytes.
pub fn decode_temperatures(buf: &[u8; FRAME_BYTES], grid: &mut TemperatureGrid) {
    for (value, chunk) in grid.values.iter_mut().zip(buf.chunks_exact(4)) {
        *value = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}

/// Write one temperature frame and flush it through.
pub fn write_temperatures<W: Write>(sink: &mut W, grid: &TemperatureGrid) -> io::Result<()> {
    let mut buf = [0u8; FRAME_BYTES];
    encode_temperatures(grid, &mut buf);
    sink.write_all(&buf)?;
    sink.flush()
}

/// Write one RGB frame and flush it through.
pub fn write_rgb<W: Write>(sink: &mut W, image: &ColorImage) -> io::Result<()> {
    sink.write_all(&image.data)?;
    sink.flush()
}

/// Reads consecutive temperature frames from a byte stream.
pub struct FrameReader<R> {
    inner: R,
    buf: Box<[u8; FRAME_BYTES]>,
    frames_read: u64,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Box::new([0u8; FRAME_BYTES]),
            frames_read: 0,
        }
    }

    /// Number of complete frames read so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Read the next frame into `grid`.
    ///
    /// Returns `Ok(false)` on end of stream at a frame boundary. End of
    /// stream inside a frame is [`StreamError::Truncated`].
    pub fn read_frame(&mut self, grid: &mut TemperatureGrid) -> Result<bool, StreamError> {
        let mut filled = 0;
        while filled < FRAME_BYTES {
            match self.inner.read(&mut self.buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    return Err(StreamError::Truncated {
                        expected: FRAME_BYTES,
                        actual: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        decode_temperatures(&self.buf, grid);
        self.frames_read += 1;
        tracing::trace!(frame = self.frames_read, "frame decoded");
        Ok(true)
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<TemperatureGrid, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut grid = TemperatureGrid::new();
        match self.read_frame(&mut grid) {
            Ok(true) => Some(Ok(grid)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
