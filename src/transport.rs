//! Byte sinks the drain task writes serialized records to
//!
//! The runtime treats the transport as opaque: `write` whole batches of
//! 32-byte records, `flush`, then `close` on shutdown. Only the drain thread
//! ever holds a transport, so implementations need no internal locking.
//!
//! [`open`] picks a sink from a path: an existing Unix domain socket is
//! connected to, anything else is opened as an append-only file.

use crate::error::{Result, TraceError};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Destination for serialized event records
pub trait Transport: Send {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

/// Builds a transport from the configured path; the drain task calls it
/// again after a failure
pub type TransportFactory = dyn Fn(&str) -> Result<Box<dyn Transport>> + Send + Sync;

/// Append-only file sink
///
/// Unbuffered: the drain thread already hands over whole batches, and a
/// failed batch must leave nothing behind that a later drop could flush.
/// A write that fails partway is truncated back off the file so the stream
/// stays a whole number of records when the batch is retried.
pub struct FileTransport {
    file: File,
}

impl FileTransport {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl Transport for FileTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let start = self.file.metadata()?.len();
        if let Err(e) = self.file.write_all(bytes) {
            if let Err(truncate) = self.file.set_len(start) {
                tracing::warn!(error = %truncate, "could not roll back partial batch");
            }
            return Err(e);
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }
}

/// Connected Unix domain socket sink
#[cfg(unix)]
pub struct UnixSocketTransport {
    stream: std::os::unix::net::UnixStream,
}

#[cfg(unix)]
impl UnixSocketTransport {
    pub fn connect(path: &Path) -> io::Result<Self> {
        let stream = std::os::unix::net::UnixStream::connect(path)?;
        Ok(Self { stream })
    }
}

#[cfg(unix)]
impl Transport for UnixSocketTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.stream.flush()?;
        self.stream.shutdown(std::net::Shutdown::Write)
    }
}

/// In-process sink sharing its buffer with every clone
#[derive(Clone, Default)]
pub struct MemoryTransport {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Transport for MemoryTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
fn is_socket(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(path)
        .map(|meta| meta.file_type().is_socket())
        .unwrap_or(false)
}

/// Open the sink named by `path`
pub fn open(path: &str) -> Result<Box<dyn Transport>> {
    let target = Path::new(path);
    let unavailable = |source| TraceError::TransportUnavailable {
        path: path.to_owned(),
        source,
    };

    #[cfg(unix)]
    {
        if is_socket(target) {
            let transport = UnixSocketTransport::connect(target).map_err(unavailable)?;
            tracing::debug!(path, "connected to socket transport");
            return Ok(Box::new(transport));
        }
    }

    let transport = FileTransport::create(target).map_err(unavailable)?;
    tracing::debug!(path, "opened file transport");
    Ok(Box::new(transport))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_transport_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.bin");
        let path_str = path.to_str().unwrap();

        let mut first = open(path_str).unwrap();
        first.write(&[1, 2, 3]).unwrap();
        first.close().unwrap();

        let mut second = open(path_str).unwrap();
        second.write(&[4]).unwrap();
        second.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_file_transport_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.bin");

        let mut transport = FileTransport::create(&path).unwrap();
        transport.write(&[7; 32]).unwrap();
        // visible without flush: nothing is held back in a buffer
        assert_eq!(std::fs::read(&path).unwrap(), vec![7; 32]);

        drop(transport);
        assert_eq!(std::fs::read(&path).unwrap().len(), 32);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_file_write_reports_error() {
        if !Path::new("/dev/full").exists() {
            return;
        }
        let mut transport = FileTransport::create(Path::new("/dev/full")).unwrap();
        assert!(transport.write(&[1; 64]).is_err());
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let err = open("/nonexistent-ucdbg-dir/trace.bin").err().unwrap();
        assert!(matches!(err, TraceError::TransportUnavailable { .. }));
    }

    #[test]
    fn test_memory_transport_shares_buffer() {
        let sink = MemoryTransport::new();
        let mut writer: Box<dyn Transport> = Box::new(sink.clone());
        writer.write(b"abc").unwrap();
        writer.close().unwrap();
        assert_eq!(sink.contents(), b"abc");
    }

    #[cfg(unix)]
    #[test]
    fn test_socket_transport_selected_for_socket_path() {
        use std::io::Read;
        use std::os::unix::net::UnixListener;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ucdbg.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let mut transport = open(path.to_str().unwrap()).unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        transport.write(&[9; 32]).unwrap();
        transport.close().unwrap();

        let mut received = Vec::new();
        peer.read_to_end(&mut received).unwrap();
        assert_eq!(received, vec![9; 32]);
    }
}
