//! Read/decode/emit loop with statum typestates
//!
//! # State Machine
//!
//! ```text
//! Idle ──► Running ──► Closing ──► Terminated
//!             │                        ▲
//!             └──────► Failed ─────────┘
//! ```
//!
//! `Running` owns the only suspension point: one read of the source per
//! iteration, raced against the cancellation token. Both handles are
//! released on the way to `Terminated`, whichever path is taken.

use crate::bridge::error::BridgeError;
use crate::controller::{decode, ButtonMapVariant, ControllerSnapshot, Report, REPORT_LEN};
use crate::output::{emit, EventSink};
use statum::{machine, state};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Byte stream yielding one report per read.
pub type ReportStream = Box<dyn AsyncRead + Unpin>;

#[derive(Clone, Debug)]
pub struct BridgeSettings {
    pub variant: ButtonMapVariant,
    /// Fail when no read completes within this time. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Fail after this many short reads in a row. `None` never gives up.
    pub max_consecutive_short_reads: Option<u32>,
    pub stats_interval: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            variant: ButtonMapVariant::default(),
            read_timeout: None,
            max_consecutive_short_reads: None,
            stats_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Complete reports decoded and emitted
    pub reports: u64,
    /// Reads discarded for not being exactly one report long
    pub short_reads: u64,
}

#[state]
#[derive(Debug, Clone)]
pub enum BridgeState {
    Idle,
    Running,
    Closing,
    Failed,
    Terminated,
}

#[machine]
pub struct Bridge<S: BridgeState> {
    source: Option<ReportStream>,
    source_path: PathBuf,
    sink: Option<Box<dyn EventSink>>,
    settings: BridgeSettings,
    stats: BridgeStats,
    failure: Option<BridgeError>,
}

impl<S: BridgeState> Bridge<S> {
    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    fn release(&mut self) {
        if self.source.take().is_some() {
            debug!("Released source {}", self.source_path.display());
        }
        if self.sink.take().is_some() {
            debug!("Released virtual device");
        }
    }
}

impl Bridge<Idle> {
    /// Takes ownership of an already created virtual device.
    pub fn create(sink: Box<dyn EventSink>, settings: BridgeSettings) -> Self {
        debug!("Creating bridge with settings: {:?}", settings);
        Self::new(
            None,           // source
            PathBuf::new(), // source_path
            Some(sink),
            settings,
            BridgeStats::default(),
            None, // failure
        )
    }

    /// Hands the opened source to the loop.
    pub fn start(mut self, source: ReportStream, path: PathBuf) -> Bridge<Running> {
        info!(
            "Bridging {} using the {} button map",
            path.display(),
            self.settings.variant
        );
        self.source = Some(source);
        self.source_path = path;
        self.transition()
    }
}

/// How the running loop ended.
pub enum LoopExit {
    Cancelled(Bridge<Closing>),
    Failed(Bridge<Failed>),
}

impl LoopExit {
    /// Releases both handles and finishes the machine.
    pub fn terminate(self) -> Bridge<Terminated> {
        match self {
            LoopExit::Cancelled(bridge) => bridge.close(),
            LoopExit::Failed(bridge) => bridge.shutdown(),
        }
    }
}

impl Bridge<Running> {
    /// Runs until the token is cancelled or a fatal error occurs.
    pub async fn run(mut self, cancel: CancellationToken) -> LoopExit {
        info!("Starting report loop");

        match self.pump(&cancel).await {
            Ok(()) => {
                info!("Cancellation requested, leaving report loop");
                LoopExit::Cancelled(self.transition())
            }
            Err(e) => {
                debug!("Report loop failed: {}", e);
                self.failure = Some(e);
                LoopExit::Failed(self.transition())
            }
        }
    }

    /// `Ok(())` only on cancellation.
    async fn pump(&mut self, cancel: &CancellationToken) -> Result<(), BridgeError> {
        let source = self.source.as_mut().ok_or(BridgeError::Released)?;
        let sink = self.sink.as_mut().ok_or(BridgeError::Released)?;

        let mut buf: Report = [0; REPORT_LEN];
        let mut previous: Option<ControllerSnapshot> = None;
        let mut consecutive_short = 0u32;
        let mut last_stats = Instant::now();
        let mut reports_at_last_stats = 0u64;

        loop {
            let timeout = self.settings.read_timeout;
            let len = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                read = read_report(source, &mut buf, timeout, &self.source_path) => read?,
            };

            if len != REPORT_LEN {
                self.stats.short_reads += 1;
                consecutive_short += 1;
                trace!("Discarding {}-byte read", len);

                if let Some(limit) = self.settings.max_consecutive_short_reads {
                    if consecutive_short >= limit {
                        return Err(BridgeError::TooManyShortReads(consecutive_short));
                    }
                }
                continue;
            }
            consecutive_short = 0;

            let snapshot = decode(&buf, self.settings.variant);
            emit(&snapshot, previous.as_ref(), sink.as_mut()).map_err(BridgeError::Emit)?;
            self.stats.reports += 1;
            previous = Some(snapshot);

            let elapsed = last_stats.elapsed();
            if elapsed >= self.settings.stats_interval {
                let recent = self.stats.reports - reports_at_last_stats;
                info!(
                    "Bridge stats: {} reports in last {} seconds (avg {:.1}/sec), {} short reads",
                    recent,
                    elapsed.as_secs(),
                    recent as f64 / elapsed.as_secs_f64(),
                    self.stats.short_reads
                );
                last_stats = Instant::now();
                reports_at_last_stats = self.stats.reports;
            }
        }
    }
}

/// One read from the source. Interrupted reads count as empty; end of stream
/// is fatal since no further report can arrive.
async fn read_report(
    source: &mut ReportStream,
    buf: &mut Report,
    timeout: Option<Duration>,
    path: &Path,
) -> Result<usize, BridgeError> {
    let read = match timeout {
        Some(limit) => tokio::time::timeout(limit, source.read(buf))
            .await
            .map_err(|_| BridgeError::ReadTimeout(limit))?,
        None => source.read(buf).await,
    };

    match read {
        Ok(0) => Err(BridgeError::EndOfStream {
            path: path.to_path_buf(),
        }),
        Ok(len) => Ok(len),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
        Err(e) => Err(BridgeError::from_read(path.to_path_buf(), e)),
    }
}

impl Bridge<Closing> {
    pub fn close(mut self) -> Bridge<Terminated> {
        info!("Closing {}", self.source_path.display());
        self.release();
        self.transition()
    }
}

impl Bridge<Failed> {
    pub fn error(&self) -> Option<&BridgeError> {
        self.failure.as_ref()
    }

    pub fn shutdown(mut self) -> Bridge<Terminated> {
        self.release();
        self.transition()
    }
}

impl Bridge<Terminated> {
    pub fn is_released(&self) -> bool {
        self.source.is_none() && self.sink.is_none()
    }

    pub fn outcome(self) -> Result<BridgeStats, BridgeError> {
        info!(
            "Bridge terminated after {} reports ({} short reads)",
            self.stats.reports, self.stats.short_reads
        );
        match self.failure {
            Some(e) => Err(e),
            None => Ok(self.stats),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{AxisId, VirtualButton};
    use crate::output::sink::recording::{Recorded, RecordingSink};
    use crate::output::SinkError;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;
    use tokio_test::io::Builder;

    fn report_with(bytes: &[(usize, u8)]) -> Vec<u8> {
        let mut report = vec![0u8; REPORT_LEN];
        for &(offset, value) in bytes {
            report[offset] = value;
        }
        report
    }

    const TEST_NODE: &str = "/dev/hidraw-test";

    fn enodev() -> io::Error {
        io::Error::from_raw_os_error(libc::ENODEV)
    }

    fn running(
        source: ReportStream,
        sink: RecordingSink,
        settings: BridgeSettings,
    ) -> Bridge<Running> {
        Bridge::create(Box::new(sink), settings).start(source, PathBuf::from(TEST_NODE))
    }

    /// Yields scripted reads, then cancels the token and stays pending.
    struct ScriptedSource {
        reads: Vec<Vec<u8>>,
        polls: Arc<AtomicUsize>,
        dropped: Arc<AtomicBool>,
        cancel: Option<CancellationToken>,
    }

    impl AsyncRead for ScriptedSource {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.reads.is_empty() {
                if let Some(cancel) = &self.cancel {
                    cancel.cancel();
                }
                return Poll::Pending;
            }
            let data = self.reads.remove(0);
            buf.put_slice(&data);
            Poll::Ready(Ok(()))
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn short_read_is_discarded_before_valid_report() {
        let sink = RecordingSink::default();
        let source = Builder::new()
            .read(&[0u8; 40])
            .read(&report_with(&[(9, 16), (17, 200), (23, 255)]))
            .read_error(enodev())
            .build();

        let bridge = running(Box::new(source), sink.clone(), BridgeSettings::default());
        let exit = bridge.run(CancellationToken::new()).await;

        let LoopExit::Failed(failed) = exit else {
            panic!("expected failure once the device vanished");
        };
        assert!(matches!(failed.error(), Some(BridgeError::SourceDeviceGone { .. })));
        assert_eq!(
            failed.stats(),
            BridgeStats {
                reports: 1,
                short_reads: 1
            }
        );

        assert_eq!(sink.syncs(), 1);
        let events = sink.events();
        assert!(events.contains(&Recorded::Button(VirtualButton::South, true)));
        assert!(events.contains(&Recorded::Button(VirtualButton::East, false)));
        assert!(events.contains(&Recorded::Axis(AxisId::X, 73)));
        assert!(events.contains(&Recorded::Axis(AxisId::Z, 255)));

        let terminated = failed.shutdown();
        assert!(terminated.is_released());
        let err = terminated.outcome().unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn only_short_reads_emit_nothing() {
        let sink = RecordingSink::default();
        let source = Builder::new()
            .read(&[1, 2, 3])
            .read(&[0u8; 63])
            .read_error(enodev())
            .build();

        let exit = running(Box::new(source), sink.clone(), BridgeSettings::default())
            .run(CancellationToken::new())
            .await;

        assert!(matches!(exit, LoopExit::Failed(_)));
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn cancellation_releases_source_and_stops_reading() {
        let sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        let polls = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource {
            reads: vec![report_with(&[]), report_with(&[(10, 2)])],
            polls: polls.clone(),
            dropped: dropped.clone(),
            cancel: Some(cancel.clone()),
        };

        let exit = running(Box::new(source), sink.clone(), BridgeSettings::default())
            .run(cancel.clone())
            .await;

        let LoopExit::Cancelled(closing) = exit else {
            panic!("expected a clean shutdown");
        };
        // two reports plus the read that triggered the cancellation
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.syncs(), 2);
        assert!(!dropped.load(Ordering::SeqCst));

        let terminated = closing.close();
        assert!(dropped.load(Ordering::SeqCst));
        assert!(terminated.is_released());
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert_eq!(terminated.outcome().unwrap().reports, 2);
    }

    #[tokio::test]
    async fn cancelled_before_first_read() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let polls = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            reads: vec![report_with(&[])],
            polls: polls.clone(),
            dropped: Arc::new(AtomicBool::new(false)),
            cancel: None,
        };

        let exit = running(
            Box::new(source),
            RecordingSink::default(),
            BridgeSettings::default(),
        )
        .run(cancel)
        .await;

        assert!(matches!(exit, LoopExit::Cancelled(_)));
        assert_eq!(polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn interrupted_read_is_retried() {
        let sink = RecordingSink::default();
        let source = Builder::new()
            .read_error(io::Error::from(io::ErrorKind::Interrupted))
            .read(&report_with(&[]))
            .read_error(io::Error::from_raw_os_error(libc::EPROTO))
            .build();

        let exit = running(Box::new(source), sink.clone(), BridgeSettings::default())
            .run(CancellationToken::new())
            .await;

        let LoopExit::Failed(failed) = exit else {
            panic!("expected failure on EPROTO");
        };
        assert!(matches!(failed.error(), Some(BridgeError::Read { .. })));
        assert_eq!(failed.stats().reports, 1);
        assert_eq!(sink.syncs(), 1);
        assert_eq!(failed.shutdown().outcome().unwrap_err().exit_code(), 5);
    }

    #[tokio::test]
    async fn unplugged_node_is_device_gone() {
        let source = Builder::new()
            .read(&report_with(&[]))
            .read_error(io::Error::from_raw_os_error(libc::EIO))
            .build();

        let exit = running(
            Box::new(source),
            RecordingSink::default(),
            BridgeSettings::default(),
        )
        .run(CancellationToken::new())
        .await;

        let terminated = exit.terminate();
        assert!(terminated.is_released());
        let err = terminated.outcome().unwrap_err();
        assert!(matches!(err, BridgeError::SourceDeviceGone { .. }));
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn end_of_stream_stops_the_loop() {
        let sink = RecordingSink::default();
        let source = Builder::new().read(&[0u8; 12]).build();

        let exit = running(Box::new(source), sink.clone(), BridgeSettings::default())
            .run(CancellationToken::new())
            .await;

        let LoopExit::Failed(failed) = exit else {
            panic!("expected end of stream to be fatal");
        };
        assert!(matches!(failed.error(), Some(BridgeError::EndOfStream { .. })));
        assert_eq!(failed.stats().short_reads, 1);
        assert!(sink.events().is_empty());
        assert_eq!(failed.shutdown().outcome().unwrap_err().exit_code(), 5);
    }

    #[tokio::test]
    async fn short_read_breaker_trips() {
        let settings = BridgeSettings {
            max_consecutive_short_reads: Some(3),
            ..BridgeSettings::default()
        };
        let source = Builder::new().read(&[1]).read(&[2]).read(&[3]).build();

        let exit = running(Box::new(source), RecordingSink::default(), settings)
            .run(CancellationToken::new())
            .await;

        let LoopExit::Failed(failed) = exit else {
            panic!("expected the breaker to trip");
        };
        assert!(matches!(failed.error(), Some(BridgeError::TooManyShortReads(3))));
    }

    #[tokio::test]
    async fn stalled_source_times_out() {
        let settings = BridgeSettings {
            read_timeout: Some(Duration::from_millis(20)),
            ..BridgeSettings::default()
        };
        let source = ScriptedSource {
            reads: Vec::new(),
            polls: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicBool::new(false)),
            cancel: None,
        };

        let exit = running(Box::new(source), RecordingSink::default(), settings)
            .run(CancellationToken::new())
            .await;

        let LoopExit::Failed(failed) = exit else {
            panic!("expected a timeout");
        };
        assert!(matches!(failed.error(), Some(BridgeError::ReadTimeout(_))));
    }

    struct BrokenSink;

    impl EventSink for BrokenSink {
        fn button(&mut self, _: VirtualButton, _: bool) -> Result<(), SinkError> {
            Ok(())
        }

        fn axis(&mut self, _: AxisId, _: i32) -> Result<(), SinkError> {
            Ok(())
        }

        fn sync(&mut self) -> Result<(), SinkError> {
            Err(SinkError::Emit(io::Error::from(io::ErrorKind::BrokenPipe)))
        }
    }

    #[tokio::test]
    async fn emit_failure_is_fatal() {
        let source = Builder::new().read(&report_with(&[])).build();
        let exit = Bridge::create(Box::new(BrokenSink), BridgeSettings::default())
            .start(Box::new(source), PathBuf::from(TEST_NODE))
            .run(CancellationToken::new())
            .await;

        let terminated = exit.terminate();
        assert!(terminated.is_released());
        assert_eq!(terminated.outcome().unwrap_err().exit_code(), 6);
    }
}
