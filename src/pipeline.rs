//! Parallel Transform Coordinator: one reader, a pool of transform workers,
//! one writer, connected by two bounded queues.
//!
//! The reader owns the XML stream and is inherently sequential; everything
//! downstream of a parsed `Entry` — row encoding, profile masking's JSON
//! shape checks, and the spool writes themselves — is independent per entry,
//! which is where the worker pool earns its keep.

use std::io::{BufRead, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use tracing::{info, warn};

use crate::encoder::{self, EncodedEntry};
use crate::errors::Error;
use crate::model::{Entry, Profile};
use crate::spool::Spool;
use crate::utils::PipelineBars;
use crate::xml_parser::EntryParser;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Wraps the input stream to drive `PipelineBars::bytes_read` off the bytes
/// the reader actually consumes, without the reader itself knowing bars exist.
struct CountingReader<R> {
    inner: R,
    bar: indicatif::ProgressBar,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bar.inc(n as u64);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for CountingReader<R> {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.bar.inc(amt as u64);
    }
}

pub struct Outcome {
    pub release_tag: String,
    pub entries_processed: u64,
    pub entries_invalid: u64,
    pub row_counts: Vec<(&'static str, u64)>,
    pub spool_files: Vec<(&'static str, std::path::PathBuf)>,
}

/// Shared state for signalling cancellation across the reader, the worker
/// pool and the writer without giving any of them a reference to the others.
#[derive(Clone)]
struct Coordinator {
    cancel: Arc<AtomicBool>,
    fatal: Arc<Mutex<Option<Error>>>,
    entries_processed: Arc<AtomicU64>,
    entries_invalid: Arc<AtomicU64>,
    bars: PipelineBars,
}

impl Coordinator {
    fn new(cancel: Arc<AtomicBool>) -> Self {
        Coordinator {
            cancel,
            fatal: Arc::new(Mutex::new(None)),
            entries_processed: Arc::new(AtomicU64::new(0)),
            entries_invalid: Arc::new(AtomicU64::new(0)),
            // total bytes aren't known up front (the source is a decompressed
            // stream); the bar renders with an unknown total until finish.
            bars: PipelineBars::new(0),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Record a fatal error and trip cancellation for everyone else. Only
    /// the first fatal error is kept; later ones are almost always an
    /// artifact of other units noticing the cancellation and unwinding.
    fn fail(&self, err: Error) {
        let mut slot = self.fatal.lock().expect("fatal error mutex poisoned");
        if slot.is_none() {
            *slot = Some(err);
        }
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn take_fatal(&self) -> Option<Error> {
        self.fatal.lock().expect("fatal error mutex poisoned").take()
    }
}

/// Run one full transform pass over `input`, writing spool files under
/// `spool_dir`. On any outcome other than success the spool directory is
/// removed before returning, so callers never see partial spools.
///
/// `cancel`, if given, lets the caller (the Load Strategy Director, or a
/// signal handler in `main`) request early shutdown; the same flag is set
/// internally on a fatal transform error, so callers can also poll it to
/// notice a failure without waiting on the join.
pub fn run<R>(
    input: R,
    profile: Profile,
    worker_count: usize,
    queue_bound: usize,
    spool_dir: &Path,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<Outcome, Error>
where
    R: BufRead + Send + 'static,
{
    let worker_count = worker_count.max(1);
    let queue_bound = queue_bound.max(1);

    let coordinator = Coordinator::new(cancel.unwrap_or_else(|| Arc::new(AtomicBool::new(false))));
    let (work_tx, work_rx) = bounded::<Entry>(queue_bound);
    let (write_tx, write_rx) = bounded::<EncodedEntry>(queue_bound);

    let mut spool = Spool::create(spool_dir)?;
    let release_tag = Arc::new(Mutex::new(None));

    let counting_input = CountingReader { inner: input, bar: coordinator.bars.bytes_read.clone() };

    let outcome = std::thread::scope(|scope| -> Result<(), Error> {
        let reader_coordinator = coordinator.clone();
        let reader_release_tag = release_tag.clone();
        scope.spawn(move || {
            run_reader(counting_input, profile, work_tx, &reader_coordinator, &reader_release_tag);
        });

        for worker_id in 0..worker_count {
            let worker_coordinator = coordinator.clone();
            let work_rx = work_rx.clone();
            let write_tx = write_tx.clone();
            scope.spawn(move || {
                run_worker(worker_id, work_rx, write_tx, &worker_coordinator);
            });
        }
        // the coordinator only keeps clones alive through the workers; drop
        // the originals so the channel closes once every worker has exited.
        drop(work_rx);
        drop(write_tx);

        run_writer(write_rx, &mut spool, &coordinator);

        Ok(())
    });

    coordinator.bars.finish();
    outcome?;

    let entries_processed = coordinator.entries_processed.load(Ordering::SeqCst);
    let entries_invalid = coordinator.entries_invalid.load(Ordering::SeqCst);
    let fatal = coordinator.take_fatal();

    if let Some(err) = fatal {
        warn!(error = %err, "transform run failed, deleting partial spool files");
        std::fs::remove_dir_all(spool_dir).ok();
        return Err(err);
    }

    let row_counts = spool.row_counts();
    let spool_files = spool.finish()?;
    let release_tag = release_tag.lock().expect("release tag mutex poisoned").clone().unwrap_or_else(|| "unknown".to_string());

    info!(entries_processed, entries_invalid, release_tag = %release_tag, "transform coordinator finished");

    Ok(Outcome { release_tag, entries_processed, entries_invalid, row_counts, spool_files })
}

fn run_reader<R>(
    input: CountingReader<R>,
    profile: Profile,
    work_tx: crossbeam_channel::Sender<Entry>,
    coordinator: &Coordinator,
    release_tag: &Mutex<Option<String>>,
) where
    R: BufRead,
{
    let mut parser = EntryParser::new(input, profile);

    while let Some(result) = parser.next() {
        if coordinator.is_cancelled() {
            break;
        }

        match result {
            Ok(entry) => {
                let mut slot = release_tag.lock().expect("release tag mutex poisoned");
                if slot.is_none() {
                    *slot = parser.release_tag().map(|tag| tag.to_string());
                }
                drop(slot);

                if work_tx.send(entry).is_err() {
                    // downstream has hung up, nothing left to do
                    break;
                }
            }
            Err(Error::InvalidEntry(reason)) => {
                coordinator.entries_invalid.fetch_add(1, Ordering::SeqCst);
                coordinator.bars.entries_invalid.inc(1);
                warn!(reason = %reason, "skipping invalid entry");
            }
            Err(err) => {
                coordinator.fail(Error::TransformFailure(err.to_string()));
                break;
            }
        }
    }
    // dropping work_tx here closes the channel once the reader returns
}

fn run_worker(
    worker_id: usize,
    work_rx: crossbeam_channel::Receiver<Entry>,
    write_tx: crossbeam_channel::Sender<EncodedEntry>,
    coordinator: &Coordinator,
) {
    loop {
        if coordinator.is_cancelled() {
            return;
        }

        match work_rx.recv_timeout(POLL_INTERVAL) {
            Ok(entry) => {
                let encoded = encoder::encode(&entry);
                if let Err(err) = encoded.validate_shapes() {
                    coordinator.fail(err);
                    return;
                }

                coordinator.entries_processed.fetch_add(1, Ordering::SeqCst);
                coordinator.bars.entries_processed.inc(1);
                if write_tx.send(encoded).is_err() {
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!(worker_id, "transform worker exiting, reader closed its channel");
                return;
            }
        }
    }
}

fn run_writer(write_rx: crossbeam_channel::Receiver<EncodedEntry>, spool: &mut Spool, coordinator: &Coordinator) {
    loop {
        if coordinator.is_cancelled() {
            return;
        }

        match write_rx.recv_timeout(POLL_INTERVAL) {
            Ok(encoded) => {
                let row_count = encoded.row_count();
                if let Err(err) = encoded.write_to(spool) {
                    coordinator.fail(err);
                    return;
                }
                coordinator.bars.rows_written.inc(row_count);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<uniprot version="2024_01">
  <entry created="2020-01-01" modified="2024-03-01">
    <accession>P11111</accession>
    <name>TEST_HUMAN</name>
    <gene><name type="primary">GENEA</name></gene>
    <organism>
      <name type="scientific">Homo sapiens</name>
      <lineage><taxon>Eukaryota</taxon></lineage>
      <dbReference type="NCBI Taxonomy" id="9606"/>
    </organism>
    <dbReference type="GO" id="GO:0005515"/>
    <sequence length="4" mass="512">MKTI</sequence>
  </entry>
  <entry created="2020-01-01" modified="2024-03-01">
    <name>NO_ACCESSION</name>
    <organism>
      <name type="scientific">Homo sapiens</name>
      <dbReference type="NCBI Taxonomy" id="9606"/>
    </organism>
    <sequence length="4" mass="512">MKTI</sequence>
  </entry>
  <entry created="2020-01-01" modified="2024-03-01">
    <accession>P22222</accession>
    <name>TEST2_HUMAN</name>
    <organism>
      <name type="scientific">Mus musculus</name>
      <dbReference type="NCBI Taxonomy" id="10090"/>
    </organism>
    <sequence length="4" mass="512">MKTV</sequence>
  </entry>
</uniprot>"#;

    #[test]
    fn transforms_valid_entries_and_counts_invalid_ones() {
        let dir = std::env::temp_dir().join(format!("pipeline-test-{}", std::process::id()));
        let outcome = run(Cursor::new(SAMPLE.as_bytes()), Profile::Standard, 2, 4, &dir, None).unwrap();

        assert_eq!(outcome.entries_processed, 2);
        assert_eq!(outcome.entries_invalid, 1);
        assert_eq!(outcome.release_tag, "2024_01");

        let counts: std::collections::HashMap<_, _> = outcome.row_counts.into_iter().collect();
        assert_eq!(counts["proteins"], 2);
        assert_eq!(counts["taxonomy"], 2);
        assert_eq!(counts["genes"], 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn single_worker_still_drains_the_whole_stream() {
        let dir = std::env::temp_dir().join(format!("pipeline-test-single-{}", std::process::id()));
        let outcome = run(Cursor::new(SAMPLE.as_bytes()), Profile::Full, 1, 1, &dir, None).unwrap();
        assert_eq!(outcome.entries_processed, 2);
        std::fs::remove_dir_all(&dir).ok();
    }
}
