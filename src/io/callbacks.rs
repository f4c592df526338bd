use bytes::Bytes;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Outcome of a read callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    /// `n` bytes were placed at the start of the buffer.
    Filled(usize),
    /// The source is exhausted after the `n` bytes placed in the buffer.
    EndOfStream(usize),
}

pub type ReadFn = Box<dyn FnMut(&mut [u8]) -> io::Result<ReadResult> + Send>;
pub type WriteFn = Box<dyn FnMut(&[u8]) -> io::Result<usize> + Send>;
pub type SeekFn = Box<dyn FnMut(SeekFrom) -> io::Result<u64> + Send>;
pub type SizeFn = Box<dyn FnMut() -> io::Result<u64> + Send>;

/// The Rust side of a custom I/O session.
///
/// Input sessions need `read`, output sessions need `write`. Without `seek`
/// the native side sees a non-seekable stream. `size` answers size queries
/// directly; without it they are answered by seeking to the end and back.
#[derive(Default)]
pub struct IoCallbacks {
    pub(crate) read: Option<ReadFn>,
    pub(crate) write: Option<WriteFn>,
    pub(crate) seek: Option<SeekFn>,
    pub(crate) size: Option<SizeFn>,
}

impl IoCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read<F>(mut self, read: F) -> Self
    where
        F: FnMut(&mut [u8]) -> io::Result<ReadResult> + Send + 'static,
    {
        self.read = Some(Box::new(read));
        self
    }

    pub fn with_write<F>(mut self, write: F) -> Self
    where
        F: FnMut(&[u8]) -> io::Result<usize> + Send + 'static,
    {
        self.write = Some(Box::new(write));
        self
    }

    pub fn with_seek<F>(mut self, seek: F) -> Self
    where
        F: FnMut(SeekFrom) -> io::Result<u64> + Send + 'static,
    {
        self.seek = Some(Box::new(seek));
        self
    }

    pub fn with_size<F>(mut self, size: F) -> Self
    where
        F: FnMut() -> io::Result<u64> + Send + 'static,
    {
        self.size = Some(Box::new(size));
        self
    }

    /// Non-seekable input from any reader.
    pub fn from_reader<R: Read + Send + 'static>(mut reader: R) -> Self {
        IoCallbacks::new().with_read(move |buf| read_into(&mut reader, buf))
    }

    /// Seekable input; the reader is shared between the read and seek paths.
    pub fn from_seekable_reader<R: Read + Seek + Send + 'static>(reader: R) -> Self {
        let shared = std::sync::Arc::new(parking_lot::Mutex::new(reader));
        let for_seek = shared.clone();
        IoCallbacks::new()
            .with_read(move |buf| read_into(&mut *shared.lock(), buf))
            .with_seek(move |pos| for_seek.lock().seek(pos))
    }

    /// Non-seekable output to any writer.
    pub fn from_writer<W: Write + Send + 'static>(mut writer: W) -> Self {
        IoCallbacks::new().with_write(move |buf| write_from(&mut writer, buf))
    }

    /// Seekable output, e.g. a file that needs its header rewritten.
    pub fn from_seekable_writer<W: Write + Seek + Send + 'static>(writer: W) -> Self {
        let shared = std::sync::Arc::new(parking_lot::Mutex::new(writer));
        let for_seek = shared.clone();
        IoCallbacks::new()
            .with_write(move |buf| write_from(&mut *shared.lock(), buf))
            .with_seek(move |pos| for_seek.lock().seek(pos))
    }

    /// Seekable input over an in-memory buffer, with a known size.
    pub fn from_bytes(data: Bytes) -> Self {
        let len = data.len() as u64;
        IoCallbacks::from_seekable_reader(io::Cursor::new(data)).with_size(move || Ok(len))
    }

    pub fn has_read(&self) -> bool {
        self.read.is_some()
    }

    pub fn has_write(&self) -> bool {
        self.write.is_some()
    }

    pub fn has_seek(&self) -> bool {
        self.seek.is_some()
    }
}

impl fmt::Debug for IoCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoCallbacks")
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .field("seek", &self.seek.is_some())
            .field("size", &self.size.is_some())
            .finish()
    }
}

fn read_into<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<ReadResult> {
    if buf.is_empty() {
        return Ok(ReadResult::Filled(0));
    }
    loop {
        match reader.read(buf) {
            Ok(0) => return Ok(ReadResult::EndOfStream(0)),
            Ok(n) => return Ok(ReadResult::Filled(n)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn write_from<W: Write + ?Sized>(writer: &mut W, buf: &[u8]) -> io::Result<usize> {
    loop {
        match writer.write(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
