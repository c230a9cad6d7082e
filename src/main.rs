//! Binary entry point: wires configuration, logging, scanning, the worker pool, and the DP
//! ingestion/query clients together (`spec.md` §6, `SPEC_FULL.md` §10.4).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;

use dp_h5_ingest::cli::{Cli, Command};
use dp_h5_ingest::config::{CliOverrides, Settings};
use dp_h5_ingest::decode::decode_buckets;
use dp_h5_ingest::dp_client::{
    ingest::{AckStatus, IngestClient},
    query::QueryClient,
};
use dp_h5_ingest::model::{ProcessedFileCache, Timestamp};
use dp_h5_ingest::progress::ProgressTracker;
use dp_h5_ingest::request_builder::build_ingest_record;
use dp_h5_ingest::scanner::{filter_unprocessed, scan_h5_files};
use dp_h5_ingest::tracing_init::{self, TracingConfig};
use dp_h5_ingest::worker_pool::WorkerPool;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_init::init(TracingConfig::default()).map_err(|e| anyhow::anyhow!(e))?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;

    match cli.command {
        Some(Command::Decode { pv_names, pattern, begin, end, server }) => {
            runtime.block_on(run_decode(pv_names, pattern, begin, end, server))
        }
        None => {
            let root = cli.root.clone().context("ROOT directory is required unless a subcommand is given")?;
            let overrides = CliOverrides {
                server: cli.server.clone(),
                workers: cli.workers,
                batch_size: cli.batch_size,
                max_signals: cli.max_signals,
                streaming: cli.streaming,
                resume: cli.resume,
            };
            let settings = Settings::load().context("failed to load configuration")?.apply_cli_overrides(&overrides);
            runtime.block_on(run_ingest(root, settings))
        }
    }
}

async fn run_ingest(root: PathBuf, settings: Settings) -> anyhow::Result<()> {
    let run_epoch_secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let cache = Arc::new(ProcessedFileCache::open(&root).context("failed to open processed-file cache")?);
    let mut files = scan_h5_files(&root).context("failed to scan root directory")?;
    if settings.resume {
        files = filter_unprocessed(files, &cache);
    }
    let total = files.len();
    tracing::info!(total, root = %root.display(), "starting ingest run");

    let mut client = IngestClient::connect(
        &settings.ingest_server,
        settings.call_deadline_ms,
        settings.stream_deadline_ms,
        settings.workers.max(1) * 2,
    )
    .await
    .context("failed to connect to DP ingestion service")?;

    let provider_id = client
        .register_provider(
            "h5_to_dp",
            &std::collections::BTreeMap::new(),
            &["h5_ingest".to_string()],
            "H5 archive ingestion engine",
        )
        .await
        .context("provider registration failed")?;
    let provider_id = Arc::new(provider_id);

    let tracker = Arc::new(ProgressTracker::new(total, settings.progress_interval as usize));
    let watchdog = tracker.watchdog(settings.watchdog_hours);

    let pool = WorkerPool::new(settings.workers);
    let (result_tx, mut result_rx) = tokio::sync::mpsc::unbounded_channel();
    let rt_handle = tokio::runtime::Handle::current();

    for path in files {
        let tx = result_tx.clone();
        let provider_id = Arc::clone(&provider_id);
        let cache = Arc::clone(&cache);
        let settings = settings.clone();
        let rt_handle = rt_handle.clone();
        let client = client.clone();
        let tracker = Arc::clone(&tracker);
        pool.submit(move || {
            let started = Instant::now();
            let outcome = process_one_file(&path, &provider_id, run_epoch_secs, &settings, &rt_handle, client, &tracker);
            match &outcome {
                Ok(file_outcome) if !file_outcome.had_rejections => {
                    let _ = cache.mark_processed(&path);
                    tracing::info!(file = %path.display(), signals = file_outcome.signal_count, "file ingested");
                    let _ = tx.send(FileResult {
                        success: true,
                        signals: file_outcome.signal_count as u64,
                        bytes: file_outcome.bytes,
                        elapsed: started.elapsed(),
                    });
                }
                Ok(file_outcome) => {
                    // per-record rejections leave the file unmarked in the cache so a later
                    // resume run retries it (`spec.md` §4.F, §7 "Per-record RPC" row).
                    tracing::warn!(
                        file = %path.display(),
                        signals = file_outcome.signal_count,
                        "file had rejected records, not marking as processed"
                    );
                    let _ = tx.send(FileResult {
                        success: false,
                        signals: file_outcome.signal_count as u64,
                        bytes: file_outcome.bytes,
                        elapsed: started.elapsed(),
                    });
                }
                Err(e) => {
                    tracing::error!(file = %path.display(), error = %e, "file failed");
                    let _ = tx.send(FileResult { success: false, signals: 0, bytes: 0, elapsed: started.elapsed() });
                }
            }
        });
    }
    drop(result_tx);

    let mut completed = 0usize;
    while let Some(result) = result_rx.recv().await {
        tracker.record_file(result.success, result.signals, result.bytes, result.elapsed);
        completed += 1;
        if let Err(e) = watchdog.check(completed, total) {
            pool.request_stop();
            return Err(e).context("ingest run exceeded the watchdog deadline");
        }
    }

    pool.shutdown();
    tracker.emit_progress_line();

    if tracker.files_failed() > 0 {
        anyhow::bail!("{} of {} files failed to ingest", tracker.files_failed(), total);
    }
    Ok(())
}

struct FileResult {
    success: bool,
    signals: u64,
    bytes: u64,
    elapsed: std::time::Duration,
}

/// Outcome of ingesting one file's signals: how many were sent, how many bytes were read, and
/// whether any record was rejected by the DP service (per-record rejections don't surface as
/// an `Err` — see [`IngestClient::ingest_unary`]/[`IngestClient::ingest_streaming`]).
struct FileOutcome {
    signal_count: usize,
    bytes: u64,
    had_rejections: bool,
}

/// Reads one file and ingests every signal it contains, synchronously (this runs inside a
/// worker-pool thread, not the async runtime — HDF5 reads are blocking by nature).
///
/// Per-record rejections/errors are logged and counted on `tracker` but not retried; the file
/// is reported with `had_rejections = true` so the caller leaves it unmarked in the processed
/// cache (`spec.md` §4.F, §7 "Per-record RPC" row).
fn process_one_file(
    path: &std::path::Path,
    provider_id: &str,
    run_epoch_secs: u64,
    settings: &Settings,
    rt_handle: &tokio::runtime::Handle,
    mut client: IngestClient,
    tracker: &ProgressTracker,
) -> dp_h5_ingest::Result<FileOutcome> {
    let metadata = std::fs::metadata(path)?;
    let contents = dp_h5_ingest::hdf5_reader::read_file(path, settings.max_signals)?;
    let source_file = path.to_string_lossy().to_string();

    let records: Vec<_> = contents
        .signals
        .iter()
        .map(|signal| build_ingest_record(provider_id, signal, &source_file, run_epoch_secs))
        .collect();

    let batch_size = settings.clamped_batch_size() as usize;
    let streaming = settings.streaming;
    let signal_count = records.len();

    let had_rejections = rt_handle.block_on(async move {
        if streaming {
            let outcome = client.ingest_streaming(&records, batch_size, false).await?;
            for ack in &outcome.acks {
                if ack.status != AckStatus::Ack {
                    tracker.record_error();
                    tracing::warn!(
                        client_request_id = %ack.client_request_id,
                        message = ack.message.as_deref().unwrap_or(""),
                        "record rejected"
                    );
                }
            }
            dp_h5_ingest::Result::Ok(outcome.rejected > 0)
        } else {
            let mut had_rejections = false;
            for record in &records {
                let ack = client.ingest_unary(record, false).await?;
                if ack.status != AckStatus::Ack {
                    had_rejections = true;
                    tracker.record_error();
                    tracing::warn!(
                        client_request_id = %ack.client_request_id,
                        message = ack.message.as_deref().unwrap_or(""),
                        "record rejected"
                    );
                }
            }
            dp_h5_ingest::Result::Ok(had_rejections)
        }
    })?;

    Ok(FileOutcome { signal_count, bytes: metadata.len(), had_rejections })
}

async fn run_decode(
    pv_names: Vec<String>,
    pattern: Option<String>,
    begin: Option<String>,
    end: Option<String>,
    server: Option<String>,
) -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load configuration")?;
    let server = server.unwrap_or(settings.query_server.clone());
    let mut client = QueryClient::connect(&server, settings.call_deadline_ms, settings.stream_deadline_ms)
        .await
        .context("failed to connect to DP query service")?;

    let names = if let Some(pattern) = pattern {
        client
            .query_pv_metadata_by_pattern(&pattern)
            .await
            .context("PV pattern lookup failed")?
            .into_iter()
            .map(|info| info.pv_name)
            .collect()
    } else {
        pv_names
    };

    let begin = parse_timestamp_arg(begin.as_deref())?;
    let end = parse_timestamp_arg(end.as_deref())?;

    let buckets = client.query_data(begin, end, &names, false).await.context("query failed")?;
    let series = decode_buckets(&buckets);

    for s in &series {
        let summary = s.summarize();
        println!(
            "{}: n={} min={:.6} max={:.6} mean={:.6}",
            s.pv_name, summary.count, summary.min, summary.max, summary.mean
        );
    }
    Ok(())
}

fn parse_timestamp_arg(value: Option<&str>) -> anyhow::Result<Timestamp> {
    match value {
        None => Ok(Timestamp::new(0, 0)),
        Some(raw) => {
            let parsed = chrono::DateTime::parse_from_rfc3339(raw).context("expected an RFC 3339 timestamp")?;
            Ok(Timestamp::new(parsed.timestamp().max(0) as u64, 0))
        }
    }
}
