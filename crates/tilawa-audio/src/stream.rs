//! Growing in-memory buffer for a stream that is still being fetched.
//!
//! The fetch task appends chunks as they arrive while decoders read through
//! [`StreamReader`]s. A read past the buffered bytes blocks until more data is
//! appended or the buffer is finished.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Contents {
    bytes: Vec<u8>,
    finished: bool,
    failed: Option<String>,
}

/// Bytes of one stream, shared between the fetch task and its readers.
pub(crate) struct StreamBuffer {
    contents: Mutex<Contents>,
    grown: Condvar,
    expected_len: Option<u64>,
}

impl StreamBuffer {
    /// Creates an empty buffer. `expected_len` is the announced content length.
    pub fn new(expected_len: Option<u64>) -> Arc<Self> {
        Arc::new(Self {
            contents: Mutex::new(Contents::default()),
            grown: Condvar::new(),
            expected_len,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Contents> {
        self.contents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a chunk and wakes blocked readers. Returns the buffered length.
    pub fn append(&self, chunk: &[u8]) -> usize {
        let mut contents = self.lock();
        contents.bytes.extend_from_slice(chunk);
        self.grown.notify_all();
        contents.bytes.len()
    }

    /// Marks the stream as complete.
    pub fn finish(&self) {
        self.lock().finished = true;
        self.grown.notify_all();
    }

    /// Ends the stream with an error. Pending and later reads past the
    /// buffered bytes fail with `message`.
    pub fn fail(&self, message: impl Into<String>) {
        let mut contents = self.lock();
        contents.finished = true;
        contents.failed = Some(message.into());
        self.grown.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    pub fn reader(self: &Arc<Self>) -> StreamReader {
        StreamReader {
            buffer: self.clone(),
            position: 0,
        }
    }

    /// Blocks until the total length of the stream is known.
    fn total_len(&self) -> u64 {
        if let Some(len) = self.expected_len {
            return len;
        }
        let mut contents = self.lock();
        while !contents.finished {
            contents = self
                .grown
                .wait(contents)
                .unwrap_or_else(PoisonError::into_inner);
        }
        contents.bytes.len() as u64
    }
}

/// Blocking `Read + Seek` view of a [`StreamBuffer`].
pub(crate) struct StreamReader {
    buffer: Arc<StreamBuffer>,
    position: u64,
}

impl Read for StreamReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        let mut contents = self.buffer.lock();
        loop {
            let available = (contents.bytes.len() as u64).saturating_sub(self.position);
            if available > 0 {
                let start = self.position as usize;
                let count = out.len().min(available as usize);
                out[..count].copy_from_slice(&contents.bytes[start..start + count]);
                self.position += count as u64;
                return Ok(count);
            }
            if let Some(message) = contents.failed.as_ref() {
                return Err(io::Error::other(message.clone()));
            }
            if contents.finished {
                return Ok(0);
            }
            contents = self
                .buffer
                .grown
                .wait(contents)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Seek for StreamReader {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let position = match target {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
            SeekFrom::End(offset) => self.buffer.total_len().checked_add_signed(offset),
        };
        let Some(position) = position else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the stream",
            ));
        };
        self.position = position;
        Ok(position)
    }
}
