//! Deep copy by serialization.
//!
//! The network is written on a worker thread into a bounded channel of byte
//! chunks while the calling thread reads the same stream back. The channel
//! holds a few chunks only, so neither side can finish alone.
//!
//! Only XML and binary copies run in bounded memory. A JSON copy still goes
//! through the pipe, but the JSON codec materializes the whole document on
//! both ends (see [`crate::tree::json`]).

use std::io::{self, BufRead, BufWriter, Read, Write};
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use grit_core::{GritError, GritResult, Network};
use tracing::debug;

use crate::anonymizer::IdentityAnonymizer;
use crate::extensions::{ExtensionProviders, DEFAULT_EXTENSIONS};
use crate::network_serde::{read_with, write_with};
use crate::options::{ExportOptions, ImportOptions};
use crate::tree::TreeDataFormat;

const PIPE_CAPACITY: usize = 4;
const CHUNK_SIZE: usize = 64 * 1024;

/// Write end: every flushed buffer becomes one chunk.
struct PipeWriter {
    sender: Sender<Vec<u8>>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.sender
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "copy reader has stopped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read end: a closed channel is the end of the document.
struct PipeReader {
    receiver: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl PipeReader {
    fn new(receiver: Receiver<Vec<u8>>) -> Self {
        Self {
            receiver,
            chunk: Vec::new(),
            pos: 0,
        }
    }
}

impl BufRead for PipeReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos >= self.chunk.len() {
            match self.receiver.recv() {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(&[]),
            }
        }
        Ok(&self.chunk[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.chunk.len());
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

/// Copies `network` through a document in `format`, with the built-in
/// extension serializers.
pub fn copy(network: &Network, format: TreeDataFormat) -> GritResult<Network> {
    copy_with(network, format, &DEFAULT_EXTENSIONS)
}

pub fn copy_with(
    network: &Network,
    format: TreeDataFormat,
    providers: &ExtensionProviders,
) -> GritResult<Network> {
    let export = ExportOptions::default().with_format(format);
    let import = ImportOptions::default().with_format(format);
    let (sender, receiver) = bounded::<Vec<u8>>(PIPE_CAPACITY);

    let (written, read) = thread::scope(|scope| {
        let writer = scope.spawn(|| -> GritResult<()> {
            let mut sink = BufWriter::with_capacity(CHUNK_SIZE, PipeWriter { sender });
            write_with(network, &export, providers, &mut sink)?;
            sink.flush()?;
            Ok(())
        });
        // the reader is dropped before the join so a failed read unblocks
        // the writer
        let read = read_with(PipeReader::new(receiver), &import, providers, &IdentityAnonymizer);
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(GritError::Other("Copy writer thread panicked".into())));
        (written, read)
    });

    match (written, read) {
        (Err(e), _) if !e.is_broken_pipe() => Err(e),
        (_, read) => {
            let result = read?;
            debug!(network = %result.network.data.id, %format, "network copied");
            Ok(result.network)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_reader_spans_chunks() {
        let (sender, receiver) = bounded(2);
        let handle = thread::spawn(move || {
            for chunk in [b"ab".to_vec(), Vec::new(), b"cde".to_vec()] {
                sender.send(chunk).unwrap();
            }
        });
        let mut text = String::new();
        PipeReader::new(receiver).read_to_string(&mut text).unwrap();
        handle.join().unwrap();
        assert_eq!(text, "abcde");
    }

    #[test]
    fn test_pipe_writer_reports_broken_pipe() {
        let (sender, receiver) = bounded(1);
        drop(receiver);
        let err = PipeWriter { sender }.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
