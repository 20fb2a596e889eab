//! Bounded byte pipe between a streaming crosswalk worker and the container writer.
//!
//! One worker thread per streamed section writes into a [`PipeWriter`]; the
//! foreground reads the [`StreamedSection`]. A worker failure travels through
//! the channel as [`PipeChunk::Failed`] and surfaces as a read error, so it
//! fails the dissemination instead of truncating the section.

use super::{CrosswalkError, CrosswalkResult, CrosswalkSubject, StreamingDisseminationCrosswalk};
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const CHUNK_SIZE: usize = 64 * 1024;

enum PipeChunk {
    Data(Vec<u8>),
    Done,
    Failed(String),
}

/// Producer end. Buffers up to one chunk before blocking on the channel.
pub struct PipeWriter {
    tx: SyncSender<PipeChunk>,
    buf: Vec<u8>,
}

impl PipeWriter {
    fn send(&self, chunk: PipeChunk) -> io::Result<()> {
        self.tx
            .send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"))
    }

    fn flush_buf(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK_SIZE));
        self.send(PipeChunk::Data(chunk))
    }

    /// Flush and mark the stream complete.
    pub fn close(mut self) -> io::Result<()> {
        self.flush_buf()?;
        self.send(PipeChunk::Done)
    }

    /// Abandon buffered data and send a failure token.
    pub fn fail(self, reason: impl Into<String>) {
        // Reader may already be gone.
        let _ = self.send(PipeChunk::Failed(reason.into()));
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = CHUNK_SIZE - self.buf.len();
        let n = room.min(data.len());
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() >= CHUNK_SIZE {
            self.flush_buf()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buf()
    }
}

/// Consumer end.
pub struct PipeReader {
    rx: Receiver<PipeChunk>,
    current: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pos < self.current.len() {
                let n = (self.current.len() - self.pos).min(buf.len());
                buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.finished || buf.is_empty() {
                return Ok(0);
            }
            match self.rx.recv() {
                Ok(PipeChunk::Data(chunk)) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Ok(PipeChunk::Done) => self.finished = true,
                Ok(PipeChunk::Failed(reason)) => return Err(io::Error::other(reason)),
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "producer exited without closing the pipe",
                    ))
                }
            }
        }
    }
}

/// Bounded pipe holding at most `capacity` chunks in flight.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (
        PipeWriter {
            tx,
            buf: Vec::with_capacity(CHUNK_SIZE),
        },
        PipeReader {
            rx,
            current: Vec::new(),
            pos: 0,
            finished: false,
        },
    )
}

/// A streamed metadata section being produced by a worker thread.
///
/// The foreground must drain it ([`StreamedSection::drain_into`]). Dropping it
/// undrained closes the reader end, which unblocks the worker, and joins it.
pub struct StreamedSection {
    name: String,
    mime: String,
    reader: Option<PipeReader>,
    worker: Option<JoinHandle<()>>,
}

impl StreamedSection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Copy the whole section into `out` and wait for the worker to exit.
    pub fn drain_into(mut self, out: &mut dyn Write) -> CrosswalkResult<u64> {
        let copied = match self.reader.as_mut() {
            Some(reader) => io::copy(reader, out).map_err(|e| CrosswalkError::StreamFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            }),
            None => Ok(0),
        };
        self.reader = None;
        let joined = self.join();
        let copied = copied?;
        joined?;
        Ok(copied)
    }

    fn join(&mut self) -> CrosswalkResult<()> {
        match self.worker.take() {
            Some(handle) => handle.join().map_err(|_| CrosswalkError::StreamFailed {
                name: self.name.clone(),
                reason: "worker panicked".to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Drop for StreamedSection {
    fn drop(&mut self) {
        self.reader = None;
        if let Err(e) = self.join() {
            tracing::warn!(section = %self.name, error = %e, "streamed section abandoned");
        }
    }
}

impl std::fmt::Debug for StreamedSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamedSection")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .finish_non_exhaustive()
    }
}

/// Start one worker thread running `xwalk` over `subject`.
pub fn spawn_streamed(
    name: &str,
    xwalk: Arc<dyn StreamingDisseminationCrosswalk>,
    subject: CrosswalkSubject,
    capacity: usize,
) -> CrosswalkResult<StreamedSection> {
    let (writer, reader) = pipe(capacity);
    let mime = xwalk.mime_type().to_string();
    let worker_name = name.to_string();
    let worker = thread::Builder::new()
        .name(format!("crosswalk-{}", name.to_ascii_lowercase()))
        .spawn(move || {
            let mut writer = writer;
            let result = xwalk
                .disseminate(&subject, &mut writer)
                .and_then(|()| writer.flush().map_err(CrosswalkError::from));
            match result {
                Ok(()) => {
                    if let Err(e) = writer.close() {
                        tracing::debug!(crosswalk = %worker_name, error = %e, "pipe closed early");
                    }
                }
                Err(e) => {
                    tracing::warn!(crosswalk = %worker_name, error = %e, "streaming crosswalk failed");
                    writer.fail(e.to_string());
                }
            }
        })?;
    tracing::debug!(crosswalk = %name, mime = %mime, "streaming crosswalk started");
    Ok(StreamedSection {
        name: name.to_string(),
        mime,
        reader: Some(reader),
        worker: Some(worker),
    })
}
