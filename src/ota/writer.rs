//! Streams a firmware image from the network into the update partition.
//!
//! Reads go through one fixed `CHUNK_SIZE` buffer, so peak memory does not
//! depend on the image size. An image is only committed when exactly the
//! expected number of bytes made it into flash; every other exit aborts the
//! update and leaves the running image untouched.

use core::fmt;

use anyhow::Result;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::config::UpdatePolicy;
use crate::network::ByteStream;

/// Largest single read handed to the sink
pub const CHUNK_SIZE: usize = 1280;

/// Persistent storage able to take a new firmware image
pub trait FlashUpdateSink {
    type Update<'a>: FlashUpdate
    where
        Self: 'a;

    /// Allocate the next update slot
    fn begin(&mut self) -> Result<Self::Update<'_>>;
}

/// One in-progress image write
pub trait FlashUpdate {
    /// Write `data`, returning how many bytes were accepted
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Validate the image and mark it bootable
    fn complete(self) -> Result<()>;

    /// Throw the partial image away
    fn abort(self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub bytes_written: u64,
    pub sha256: [u8; 32],
}

impl TransferReport {
    pub fn sha256_hex(&self) -> String {
        self.sha256.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteFailure {
    /// Sink accepted fewer bytes than it was given
    ShortWrite { offset: u64, offered: usize, accepted: usize },
    /// Connection closed before the announced length arrived
    PrematureClose { written: u64, expected: u64 },
    /// Nothing at all was received
    Empty,
    Read(String),
    Sink(String),
    Commit(String),
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortWrite { offset, offered, accepted } => write!(
                f,
                "short write at offset {}: {} of {} bytes accepted",
                offset, accepted, offered
            ),
            Self::PrematureClose { written, expected } => write!(
                f,
                "stream closed after {} of {} bytes",
                written, expected
            ),
            Self::Empty => write!(f, "received 0 bytes"),
            Self::Read(e) => write!(f, "read failed: {}", e),
            Self::Sink(e) => write!(f, "flash write failed: {}", e),
            Self::Commit(e) => write!(f, "image validation failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Image committed, the caller keeps running
    Committed(TransferReport),
    /// Image committed and the policy asks for a restart
    RestartRequested(TransferReport),
    /// No update slot could be opened
    BeginFailed(String),
    WriteError(WriteFailure),
}

/// Running counters for one transfer; dropped when the transfer ends
struct TransferState {
    bytes_written: u64,
    total_length: Option<u64>,
    last_percent: u64,
    hasher: Sha256,
}

impl TransferState {
    fn new(total_length: Option<u64>) -> Self {
        Self {
            bytes_written: 0,
            total_length,
            last_percent: 0,
            hasher: Sha256::new(),
        }
    }

    /// How much the next read may ask for
    fn next_read_len(&self) -> usize {
        match self.total_length {
            Some(total) => {
                let remaining = total.saturating_sub(self.bytes_written);
                usize::try_from(remaining).map_or(CHUNK_SIZE, |r| r.min(CHUNK_SIZE))
            }
            None => CHUNK_SIZE,
        }
    }

    fn record(&mut self, chunk: &[u8]) {
        self.bytes_written += chunk.len() as u64;
        self.hasher.update(chunk);

        // Log progress at each 10% increment
        if let Some(total) = self.total_length.filter(|t| *t > 0) {
            let percent = self.bytes_written * 100 / total;
            if percent / 10 > self.last_percent / 10 {
                info!("OTA: {}/{} bytes ({}%)", self.bytes_written, total, percent);
                self.last_percent = percent;
            }
        }
    }

    /// Final length check before committing
    fn check_complete(&self) -> Result<(), WriteFailure> {
        match self.total_length {
            _ if self.bytes_written == 0 => Err(WriteFailure::Empty),
            Some(expected) if self.bytes_written != expected => Err(WriteFailure::PrematureClose {
                written: self.bytes_written,
                expected,
            }),
            _ => Ok(()),
        }
    }

    fn into_report(self) -> TransferReport {
        TransferReport {
            bytes_written: self.bytes_written,
            sha256: self.hasher.finalize().into(),
        }
    }
}

/// Copy `source` into a fresh update slot of `sink`.
///
/// `on_progress(bytes_so_far, total)` runs after every chunk that reached
/// flash. With `total_length == None` the stream is read until it closes
/// and whatever arrived is committed.
pub fn stream<S, K>(
    source: &mut S,
    total_length: Option<u64>,
    sink: &mut K,
    on_progress: &mut dyn FnMut(u64, Option<u64>),
    policy: &UpdatePolicy,
) -> TransferOutcome
where
    S: ByteStream + ?Sized,
    K: FlashUpdateSink + ?Sized,
{
    let mut update = match sink.begin() {
        Ok(update) => update,
        Err(e) => {
            warn!("OTA: could not begin update: {:#}", e);
            return TransferOutcome::BeginFailed(format!("{:#}", e));
        }
    };

    match total_length {
        Some(total) => info!("OTA: streaming {} bytes", total),
        None => info!("OTA: streaming image of unknown size"),
    }

    let mut state = TransferState::new(total_length);
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let want = state.next_read_len();
        if want == 0 {
            break;
        }

        let bytes_read = match source.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return abort(update, WriteFailure::Read(format!("{:#}", e))),
        };

        let chunk = &buf[..bytes_read];
        let accepted = match update.write(chunk) {
            Ok(n) => n,
            Err(e) => return abort(update, WriteFailure::Sink(format!("{:#}", e))),
        };
        if accepted != bytes_read {
            let failure = WriteFailure::ShortWrite {
                offset: state.bytes_written,
                offered: bytes_read,
                accepted,
            };
            return abort(update, failure);
        }

        state.record(chunk);
        on_progress(state.bytes_written, state.total_length);
    }

    if let Err(failure) = state.check_complete() {
        return abort(update, failure);
    }

    debug!("OTA: all {} bytes written, validating image", state.bytes_written);
    if let Err(e) = update.complete() {
        warn!("OTA: image rejected: {:#}", e);
        return TransferOutcome::WriteError(WriteFailure::Commit(format!("{:#}", e)));
    }

    let report = state.into_report();
    info!(
        "OTA: image committed ({} bytes, sha256 {})",
        report.bytes_written,
        report.sha256_hex()
    );

    if policy.reboot_after_update {
        TransferOutcome::RestartRequested(report)
    } else {
        TransferOutcome::Committed(report)
    }
}

fn abort<U: FlashUpdate>(update: U, failure: WriteFailure) -> TransferOutcome {
    warn!("OTA: aborting update: {}", failure);
    if let Err(e) = update.abort() {
        warn!("OTA: abort failed: {:#}", e);
    }
    TransferOutcome::WriteError(failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpdateAction;
    use proptest::prelude::*;

    /// Serves `data` in reads of at most `max_read` bytes, then closes
    struct Source {
        data: Vec<u8>,
        pos: usize,
        max_read: usize,
        fail_at: Option<usize>,
    }

    impl Source {
        fn new(data: Vec<u8>, max_read: usize) -> Self {
            Self { data, pos: 0, max_read, fail_at: None }
        }
    }

    impl ByteStream for Source {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            if self.fail_at.map_or(false, |at| self.pos >= at) {
                anyhow::bail!("connection reset");
            }
            let n = buf.len().min(self.max_read).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[derive(Default)]
    struct Flash {
        image: Vec<u8>,
        largest_write: usize,
        begin_fails: bool,
        short_write_after: Option<usize>,
        reject_image: bool,
        completed: bool,
        aborted: bool,
    }

    struct FlashWrite<'a>(&'a mut Flash);

    impl FlashUpdateSink for Flash {
        type Update<'a> = FlashWrite<'a>;

        fn begin(&mut self) -> Result<FlashWrite<'_>> {
            if self.begin_fails {
                anyhow::bail!("no free OTA partition");
            }
            Ok(FlashWrite(self))
        }
    }

    impl FlashUpdate for FlashWrite<'_> {
        fn write(&mut self, data: &[u8]) -> Result<usize> {
            self.0.largest_write = self.0.largest_write.max(data.len());
            let accepted = match self.0.short_write_after {
                Some(limit) if self.0.image.len() + data.len() > limit => {
                    limit.saturating_sub(self.0.image.len())
                }
                _ => data.len(),
            };
            self.0.image.extend_from_slice(&data[..accepted]);
            Ok(accepted)
        }

        fn complete(self) -> Result<()> {
            if self.0.reject_image {
                anyhow::bail!("image header invalid");
            }
            self.0.completed = true;
            Ok(())
        }

        fn abort(self) -> Result<()> {
            self.0.aborted = true;
            Ok(())
        }
    }

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn no_boot() -> UpdatePolicy {
        UpdatePolicy::from_action(UpdateAction::UpdateButNoBoot)
    }

    #[test]
    fn test_complete_transfer_commits() {
        let data = image(5000);
        let mut source = Source::new(data.clone(), 4096);
        let mut flash = Flash::default();
        let mut calls = Vec::new();

        let outcome = stream(&mut source, Some(5000), &mut flash, &mut |n, t| calls.push((n, t)), &no_boot());

        match outcome {
            TransferOutcome::Committed(report) => {
                assert_eq!(report.bytes_written, 5000);
                assert_eq!(report.sha256, <[u8; 32]>::from(Sha256::digest(&data)));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(flash.completed && !flash.aborted);
        assert_eq!(flash.image, data);
        assert!(flash.largest_write <= CHUNK_SIZE);
        assert_eq!(calls.last(), Some(&(5000, Some(5000))));
    }

    #[test]
    fn test_reboot_policy_requests_restart() {
        let mut source = Source::new(image(100), 64);
        let mut flash = Flash::default();
        let outcome = stream(&mut source, Some(100), &mut flash, &mut |_, _| {}, &UpdatePolicy::default());
        assert!(matches!(outcome, TransferOutcome::RestartRequested(ref r) if r.bytes_written == 100));
        assert!(flash.completed);
    }

    #[test]
    fn test_premature_close_never_commits() {
        let mut source = Source::new(image(3000), 1000);
        let mut flash = Flash::default();
        let outcome = stream(&mut source, Some(4000), &mut flash, &mut |_, _| {}, &no_boot());
        assert_eq!(
            outcome,
            TransferOutcome::WriteError(WriteFailure::PrematureClose { written: 3000, expected: 4000 })
        );
        assert!(!flash.completed);
        assert!(flash.aborted);
    }

    #[test]
    fn test_short_write_aborts_immediately() {
        let mut source = Source::new(image(4000), 4000);
        let mut flash = Flash { short_write_after: Some(2000), ..Default::default() };
        let mut calls = 0;
        let outcome = stream(&mut source, Some(4000), &mut flash, &mut |_, _| calls += 1, &no_boot());
        assert_eq!(
            outcome,
            TransferOutcome::WriteError(WriteFailure::ShortWrite { offset: 1280, offered: 1280, accepted: 720 })
        );
        assert_eq!(calls, 1);
        assert!(flash.aborted && !flash.completed);
        // No further reads after the failed chunk
        assert_eq!(source.pos, 2560);
    }

    #[test]
    fn test_begin_failure() {
        let mut source = Source::new(image(10), 10);
        let mut flash = Flash { begin_fails: true, ..Default::default() };
        let outcome = stream(&mut source, Some(10), &mut flash, &mut |_, _| {}, &no_boot());
        assert!(matches!(outcome, TransferOutcome::BeginFailed(ref e) if e.contains("no free OTA partition")));
        assert_eq!(source.pos, 0);
    }

    #[test]
    fn test_read_error_aborts() {
        let mut source = Source::new(image(3000), 500);
        source.fail_at = Some(1000);
        let mut flash = Flash::default();
        let outcome = stream(&mut source, Some(3000), &mut flash, &mut |_, _| {}, &no_boot());
        assert!(matches!(outcome, TransferOutcome::WriteError(WriteFailure::Read(_))));
        assert!(flash.aborted);
    }

    #[test]
    fn test_rejected_image_is_write_error() {
        let mut source = Source::new(image(10), 10);
        let mut flash = Flash { reject_image: true, ..Default::default() };
        let outcome = stream(&mut source, Some(10), &mut flash, &mut |_, _| {}, &no_boot());
        assert!(matches!(outcome, TransferOutcome::WriteError(WriteFailure::Commit(_))));
        assert!(!flash.completed);
    }

    #[test]
    fn test_unknown_length_reads_until_close() {
        let data = image(2500);
        let mut source = Source::new(data.clone(), 700);
        let mut flash = Flash::default();
        let mut totals = Vec::new();
        let outcome = stream(&mut source, None, &mut flash, &mut |_, t| totals.push(t), &no_boot());
        assert!(matches!(outcome, TransferOutcome::Committed(ref r) if r.bytes_written == 2500));
        assert!(totals.iter().all(Option::is_none));
        assert_eq!(flash.image, data);
    }

    #[test]
    fn test_empty_stream_is_write_error() {
        let mut flash = Flash::default();
        let outcome = stream(&mut Source::new(vec![], 10), None, &mut flash, &mut |_, _| {}, &no_boot());
        assert_eq!(outcome, TransferOutcome::WriteError(WriteFailure::Empty));

        let outcome = stream(&mut Source::new(vec![], 10), Some(0), &mut flash, &mut |_, _| {}, &no_boot());
        assert_eq!(outcome, TransferOutcome::WriteError(WriteFailure::Empty));
        assert!(!flash.completed);
    }

    #[test]
    fn test_reads_stop_at_announced_length() {
        // Server sends more than Content-Length claims
        let mut source = Source::new(image(3000), 3000);
        let mut flash = Flash::default();
        let outcome = stream(&mut source, Some(2000), &mut flash, &mut |_, _| {}, &no_boot());
        assert!(matches!(outcome, TransferOutcome::Committed(ref r) if r.bytes_written == 2000));
        assert_eq!(source.pos, 2000);
    }

    #[test]
    fn test_sha256_hex() {
        let report = TransferReport { bytes_written: 0, sha256: [0xab; 32] };
        assert_eq!(report.sha256_hex(), "ab".repeat(32));
    }

    proptest! {
        #[test]
        fn prop_progress_is_monotonic(
            len in 1usize..10_000,
            max_read in 1usize..3000,
            known in any::<bool>(),
        ) {
            let mut source = Source::new(image(len), max_read);
            let mut flash = Flash::default();
            let total = if known { Some(len as u64) } else { None };
            let mut seen = Vec::new();
            let outcome = stream(&mut source, total, &mut flash, &mut |n, _| seen.push(n), &no_boot());

            prop_assert!(matches!(outcome, TransferOutcome::Committed(_)));
            prop_assert!(seen.windows(2).all(|w| w[0] <= w[1]));
            prop_assert_eq!(seen.last().copied(), Some(len as u64));
            prop_assert!(flash.largest_write <= CHUNK_SIZE);
        }

        #[test]
        fn prop_truncated_stream_never_commits(len in 1usize..5000, missing in 1u64..500) {
            let mut source = Source::new(image(len), 1024);
            let mut flash = Flash::default();
            let outcome = stream(&mut source, Some(len as u64 + missing), &mut flash, &mut |_, _| {}, &no_boot());
            let is_premature_close = matches!(outcome, TransferOutcome::WriteError(WriteFailure::PrematureClose { .. }));
            prop_assert!(is_premature_close);
            prop_assert!(!flash.completed);
        }
    }
}
