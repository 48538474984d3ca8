//! Per-record hand-off to an out-of-process shipping agent.
//!
//! The sidecar strategy skips in-process batching entirely: each record is
//! serialized individually and pushed onto a named, fixed-capacity,
//! message-size-bounded inter-process channel (a non-blocking Unix datagram
//! socket; datagrams keep message boundaries and a full socket buffer
//! surfaces as `WouldBlock`). A companion agent in another process drains
//! the channel and forwards the records.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

use crate::error::{TraceError, TraceResult};
use crate::record::SpanRecord;
use crate::recorder::Recorder;

/// Size ceiling for one serialized record on the sidecar channel.
///
/// A record exceeding this is rejected with a logged warning instead of
/// being sent or truncated.
pub const MAX_SIDECAR_MESSAGE_SIZE: usize = 100 * 1024;

/// Recorder that pushes each record onto the sidecar channel.
#[derive(Debug)]
pub struct SidecarRecorder {
    socket: UnixDatagram,
    path: PathBuf,
    dropped_record_count: AtomicUsize,
}

impl SidecarRecorder {
    /// Connect to the sidecar channel at the given socket path.
    pub fn connect(path: impl AsRef<Path>) -> TraceResult<Self> {
        let path = path.as_ref().to_owned();
        let socket = UnixDatagram::unbound().map_err(TraceError::SidecarUnavailable)?;
        socket
            .connect(&path)
            .map_err(TraceError::SidecarUnavailable)?;
        socket
            .set_nonblocking(true)
            .map_err(TraceError::SidecarUnavailable)?;
        Ok(SidecarRecorder {
            socket,
            path,
            dropped_record_count: AtomicUsize::new(0),
        })
    }

    /// The socket path this recorder ships to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records dropped so far.
    pub fn dropped_records(&self) -> usize {
        self.dropped_record_count.load(Ordering::Relaxed)
    }

    fn drop_record(&self, reason: &str) {
        self.dropped_record_count.fetch_add(1, Ordering::Relaxed);
        warn!(path = %self.path.display(), reason, "dropping span record bound for sidecar");
    }
}

impl Recorder for SidecarRecorder {
    fn send(&self, record: SpanRecord) {
        let payload = match serde_json::to_vec(&record) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, "failed to serialize span record for sidecar");
                return;
            }
        };
        if payload.len() > MAX_SIDECAR_MESSAGE_SIZE {
            self.drop_record("record exceeds the sidecar message size ceiling");
            return;
        }
        if let Err(error) = self.socket.send(&payload) {
            if error.kind() == io::ErrorKind::WouldBlock {
                self.drop_record("sidecar channel is full");
            } else {
                self.drop_record("sidecar channel send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SpanRecord;

    fn test_record() -> SpanRecord {
        SpanRecord::builder()
            .trace_id(1)
            .name("test")
            .id(2)
            .parent_id(0)
            .timestamp(100)
            .duration(5)
            .build()
    }

    fn big_record() -> SpanRecord {
        SpanRecord::builder()
            .trace_id(1)
            .name("x".repeat(MAX_SIDECAR_MESSAGE_SIZE + 1))
            .id(2)
            .parent_id(0)
            .timestamp(100)
            .duration(5)
            .build()
    }

    #[test]
    fn connect_to_missing_channel_fails() {
        let result = SidecarRecorder::connect("/nonexistent/tracepipe-test.sock");
        assert!(matches!(result, Err(TraceError::SidecarUnavailable(_))));
    }

    #[test]
    fn records_arrive_one_message_each() {
        let dir = std::env::temp_dir().join(format!("tracepipe-sidecar-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("agent.sock");
        let _ = std::fs::remove_file(&path);
        let agent = UnixDatagram::bind(&path).unwrap();

        let recorder = SidecarRecorder::connect(&path).unwrap();
        recorder.send(test_record());
        recorder.send(test_record());

        let mut buf = vec![0u8; MAX_SIDECAR_MESSAGE_SIZE];
        for _ in 0..2 {
            let n = agent.recv(&mut buf).unwrap();
            let record: serde_json::Value = serde_json::from_slice(&buf[..n]).unwrap();
            assert_eq!(record["traceId"], 1);
            assert_eq!(record["name"], "test");
        }
        assert_eq!(recorder.dropped_records(), 0);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(&dir);
    }

    #[test]
    fn full_channel_drops_without_blocking_the_caller() {
        let dir = std::env::temp_dir().join(format!("tracepipe-sidecar-full-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("agent.sock");
        let _ = std::fs::remove_file(&path);
        // Bind the agent but never drain it, so the socket buffer
        // eventually fills and further sends fail with `WouldBlock`.
        let _agent = UnixDatagram::bind(&path).unwrap();

        let recorder = SidecarRecorder::connect(&path).unwrap();
        for _ in 0..100_000 {
            // Every send returns immediately whatever the buffer state.
            recorder.send(test_record());
            if recorder.dropped_records() > 0 {
                break;
            }
        }
        assert!(
            recorder.dropped_records() > 0,
            "an undrained channel must start dropping records"
        );

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(&dir);
    }

    #[test]
    fn oversized_records_are_rejected_not_truncated() {
        let dir = std::env::temp_dir().join(format!("tracepipe-sidecar-big-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("agent.sock");
        let _ = std::fs::remove_file(&path);
        let agent = UnixDatagram::bind(&path).unwrap();
        agent.set_nonblocking(true).unwrap();

        let recorder = SidecarRecorder::connect(&path).unwrap();
        recorder.send(big_record());
        assert_eq!(recorder.dropped_records(), 1);

        let mut buf = vec![0u8; 1024];
        assert!(agent.recv(&mut buf).is_err(), "nothing should be delivered");

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(&dir);
    }
}
