// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SyncEngine: lists a source tree, decides per-file STRM operations with a
//! bounded worker pool, and hands a metadata plan back to the Executor
//! (spec §4.4).

use crate::events::EngineEvents;
use crate::metadata::{PlanItem, PlanSourceStrategy};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strmsync_core::{
    DataServerKind, EventKind, EventOp, EventStatus, JobId, MetadataMode, ProgressCounters,
    StrmMode, TaskError, TaskRunEvent, TaskRunEventId, TaskRunId,
};
use strmsync_drivers::{
    build_strm_content, clean_posix_path, ContentBuilderConfig, Driver, ListOptions, RemoteEntry,
    StrmWriter, WriteOutcome,
};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// How existing metadata sidecars should be treated (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaStrategy {
    /// Write only when missing or stale.
    Update,
    /// Always (re)write.
    Overwrite,
    /// Never touch metadata.
    Skip,
}

impl MetaStrategy {
    pub fn from_sync_opts(opts: &strmsync_core::SyncOpts) -> Self {
        if opts.skip_meta {
            MetaStrategy::Skip
        } else if opts.overwrite_meta {
            MetaStrategy::Overwrite
        } else {
            MetaStrategy::Update
        }
    }
}

/// Everything the engine needs to run one attempt, assembled by the
/// Executor from a `Job` + `DataServer` pair (spec §4.4, §4.9).
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub job_id: JobId,
    pub task_run_id: TaskRunId,
    pub media_exts: Vec<String>,
    pub meta_exts: Vec<String>,
    pub exclude_dirs: Vec<String>,
    pub min_file_size_bytes: u64,
    pub max_concurrency: usize,
    pub dry_run: bool,
    pub force_update: bool,
    pub skip_existing: bool,
    pub mod_time_epsilon_seconds: i64,
    pub enable_orphan_cleanup: bool,
    pub orphan_cleanup_dry_run: bool,
    pub metadata_mode: MetadataMode,
    pub meta_strategy: MetaStrategy,
    pub content_config: ContentBuilderConfig,
    pub strm_mode: StrmMode,
    pub data_server_kind: DataServerKind,
    /// Copy (local mount) vs download (remote API) for metadata sidecars.
    pub prefer_mount: bool,
}

/// The outcome of one `run_once`: terminal stats for the STRM phase plus
/// the metadata plan the Executor hands to [`crate::metadata::MetadataReplicator`].
#[derive(Debug, Clone)]
pub struct EngineRunOutcome {
    pub stats: ProgressCounters,
    pub meta_plan: Vec<PlanItem>,
}

#[derive(Debug, Clone)]
struct WorkItem {
    source_path: String,
    remote_root: String,
    target_rel_path: String,
    mod_time: DateTime<Utc>,
}

#[derive(Default)]
struct AtomicCounters {
    total_files: AtomicU64,
    processed_files: AtomicU64,
    failed_files: AtomicU64,
    created_files: AtomicU64,
    updated_files: AtomicU64,
    skipped_files: AtomicU64,
    filtered_files: AtomicU64,
}

impl AtomicCounters {
    fn snapshot(&self) -> ProgressCounters {
        ProgressCounters {
            total_files: self.total_files.load(Ordering::Relaxed),
            processed_files: self.processed_files.load(Ordering::Relaxed),
            failed_files: self.failed_files.load(Ordering::Relaxed),
            created_files: self.created_files.load(Ordering::Relaxed),
            updated_files: self.updated_files.load(Ordering::Relaxed),
            skipped_files: self.skipped_files.load(Ordering::Relaxed),
            filtered_files: self.filtered_files.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}

/// Throttles progress reporting to the thresholds in spec §4.4.2: at least
/// every 1s of wall time, and every 128 processed items.
struct ProgressTicker {
    state: AsyncMutex<(std::time::Instant, u64)>,
}

impl ProgressTicker {
    fn new() -> Self {
        Self { state: AsyncMutex::new((std::time::Instant::now(), 0)) }
    }

    async fn maybe_report(&self, counters: &AtomicCounters, events: &Arc<dyn EngineEvents>) {
        let processed = counters.processed_files.load(Ordering::Relaxed);
        let should_report = {
            let mut guard = self.state.lock().await;
            let (last_report, last_processed) = *guard;
            let due = processed.saturating_sub(last_processed) >= 128
                || last_report.elapsed().as_secs() >= 1;
            if due {
                *guard = (std::time::Instant::now(), processed);
            }
            due
        };
        if should_report {
            events.on_progress(counters.snapshot()).await;
        }
    }

    async fn force_report(&self, counters: &AtomicCounters, events: &Arc<dyn EngineEvents>) {
        let mut guard = self.state.lock().await;
        *guard = (std::time::Instant::now(), counters.processed_files.load(Ordering::Relaxed));
        drop(guard);
        events.on_progress(counters.snapshot()).await;
    }
}

/// Lists a source tree, writes `.strm` files with bounded parallelism, and
/// builds the metadata plan — the actual "worker" machinery behind one
/// `TaskRun` attempt (spec §4.4).
pub struct SyncEngine {
    driver: Arc<dyn Driver>,
    writer: StrmWriter,
    options: EngineOptions,
    events: Arc<dyn EngineEvents>,
}

impl SyncEngine {
    pub fn new(
        driver: Arc<dyn Driver>,
        writer: StrmWriter,
        options: EngineOptions,
        events: Arc<dyn EngineEvents>,
    ) -> Self {
        Self { driver, writer, options, events }
    }

    /// Runs one full sync attempt: list, filter, emit STRM files, optionally
    /// clean orphans, and build the metadata plan (spec §4.4).
    pub async fn run_once(
        &self,
        remote_root: &str,
        cancel: CancellationToken,
    ) -> Result<EngineRunOutcome, TaskError> {
        let entries = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TaskError::cancelled()),
            res = self.driver.list(remote_root, ListOptions { recursive: true, max_depth: 100 }) => res?,
        };

        let counters = Arc::new(AtomicCounters::default());
        let mut work_items = Vec::new();
        let mut meta_candidates = Vec::new();

        for entry in &entries {
            if entry.is_dir {
                continue;
            }
            let relative = relative_path(&entry.path, remote_root);
            if is_excluded(&relative, &self.options.exclude_dirs) {
                counters.filtered_files.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            if meta_ext_allowed(&entry.path, &self.options.meta_exts) {
                meta_candidates.push((entry.clone(), relative.clone()));
                continue;
            }
            if !media_ext_allowed(&entry.path, &self.options.media_exts)
                || entry.size < self.options.min_file_size_bytes
            {
                counters.filtered_files.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            counters.total_files.fetch_add(1, Ordering::Relaxed);
            work_items.push(WorkItem {
                source_path: entry.path.clone(),
                remote_root: remote_root.to_string(),
                target_rel_path: with_strm_ext(&relative),
                mod_time: entry.mod_time,
            });
        }

        let visited = Arc::new(std::sync::Mutex::new(HashSet::<String>::new()));
        self.emit_all(work_items, &counters, &visited, &cancel).await;

        if cancel.is_cancelled() {
            self.events.on_progress(counters.snapshot()).await;
            return Err(TaskError::cancelled());
        }

        if self.options.enable_orphan_cleanup {
            let visited_snapshot = visited.lock().unwrap_or_else(|e| e.into_inner()).clone();
            self.clean_orphans(&visited_snapshot).await?;
        }

        let meta_plan = if self.options.metadata_mode == MetadataMode::None
            || self.options.meta_strategy == MetaStrategy::Skip
        {
            Vec::new()
        } else {
            self.build_meta_plan(meta_candidates).await
        };

        self.events.on_progress(counters.snapshot()).await;
        Ok(EngineRunOutcome { stats: counters.snapshot(), meta_plan })
    }

    async fn emit_all(
        &self,
        work_items: Vec<WorkItem>,
        counters: &Arc<AtomicCounters>,
        visited: &Arc<std::sync::Mutex<HashSet<String>>>,
        cancel: &CancellationToken,
    ) {
        let concurrency = self.options.max_concurrency.max(1);
        let (tx, rx) = mpsc::channel::<WorkItem>(concurrency);
        let rx = Arc::new(AsyncMutex::new(rx));
        let ticker = Arc::new(ProgressTicker::new());

        let mut workers = JoinSet::new();
        for _ in 0..concurrency {
            let rx = rx.clone();
            let writer = self.writer.clone();
            let events = self.events.clone();
            let options = self.options.clone();
            let counters = counters.clone();
            let visited = visited.clone();
            let ticker = ticker.clone();
            let cancel = cancel.clone();
            workers.spawn(async move {
                loop {
                    let item = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(item) = item else { break };
                    if cancel.is_cancelled() {
                        break;
                    }
                    visited.lock().unwrap_or_else(|e| e.into_inner()).insert(item.target_rel_path.clone());
                    process_strm_item(&item, &writer, &events, &options, &counters).await;
                    ticker.maybe_report(&counters, &events).await;
                }
            });
        }

        for item in work_items {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                send_res = tx.send(item) => { if send_res.is_err() { break; } }
            }
        }
        drop(tx);
        while workers.join_next().await.is_some() {}
        ticker.force_report(counters, &self.events).await;
    }

    async fn build_meta_plan(&self, candidates: Vec<(RemoteEntry, String)>) -> Vec<PlanItem> {
        let strategy = if self.options.data_server_kind == DataServerKind::Local
            || self.options.prefer_mount
        {
            PlanSourceStrategy::Copy
        } else {
            PlanSourceStrategy::Download
        };

        let mut plan = Vec::new();
        for (entry, relative) in candidates {
            let target_abs = self.writer.resolved_root().join(&relative);
            let fs_op = match tokio::fs::metadata(&target_abs).await {
                Ok(meta) => {
                    if self.options.meta_strategy == MetaStrategy::Overwrite {
                        EventOp::Update
                    } else {
                        let same_size = meta.len() == entry.size;
                        let existing_mtime: DateTime<Utc> = meta
                            .modified()
                            .map(DateTime::<Utc>::from)
                            .unwrap_or_else(|_| Utc::now());
                        let within_epsilon =
                            (existing_mtime - entry.mod_time).num_seconds().abs() <= 2;
                        if same_size && within_epsilon {
                            continue;
                        }
                        EventOp::Update
                    }
                }
                Err(_) => EventOp::Create,
            };
            plan.push(PlanItem {
                fs_op,
                source_strategy: strategy,
                source_path: entry.path.clone(),
                target_meta_path: relative,
                size: entry.size,
                mod_time: entry.mod_time,
            });
        }
        plan
    }

    async fn clean_orphans(&self, visited: &HashSet<String>) -> Result<(), TaskError> {
        let root = self.writer.resolved_root().to_path_buf();
        let candidates = tokio::task::spawn_blocking(move || collect_strm_files(&root))
            .await
            .map_err(|e| TaskError::transient(format!("orphan scan panicked: {e}")))??;

        for rel in candidates {
            if visited.contains(&rel) {
                continue;
            }
            let abs = self.writer.resolved_root().join(&rel);
            let Ok(content) = tokio::fs::read_to_string(&abs).await else {
                continue;
            };
            if self.source_still_exists(&content).await {
                continue;
            }
            let event_status = if self.options.orphan_cleanup_dry_run {
                EventStatus::Skipped
            } else if tokio::fs::remove_file(&abs).await.is_ok() {
                EventStatus::Success
            } else {
                EventStatus::Failed
            };
            self.events
                .on_file_event(TaskRunEvent {
                    id: TaskRunEventId::new(uuid::Uuid::new_v4().to_string()),
                    task_run_id: self.options.task_run_id.clone(),
                    job_id: self.options.job_id.clone(),
                    kind: EventKind::Strm,
                    op: EventOp::Delete,
                    status: event_status,
                    source_path: content,
                    target_path: rel,
                    error_message: None,
                    created_at: Utc::now(),
                })
                .await;
        }
        Ok(())
    }

    async fn source_still_exists(&self, source_path: &str) -> bool {
        let cleaned = clean_posix_path(source_path);
        let parent = cleaned.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
        let name = cleaned.rsplit('/').next().unwrap_or(&cleaned);
        match self.driver.list(parent, ListOptions { recursive: false, max_depth: 0 }).await {
            Ok(entries) => entries.iter().any(|e| !e.is_dir && e.name == name),
            Err(_) => true,
        }
    }
}

async fn process_strm_item(
    item: &WorkItem,
    writer: &StrmWriter,
    events: &Arc<dyn EngineEvents>,
    options: &EngineOptions,
    counters: &Arc<AtomicCounters>,
) {
    let content = match build_strm_content(
        &item.source_path,
        &item.remote_root,
        options.strm_mode,
        &options.content_config,
    ) {
        Ok(c) => c,
        Err(e) => {
            counters.processed_files.fetch_add(1, Ordering::Relaxed);
            counters.failed_files.fetch_add(1, Ordering::Relaxed);
            emit(
                events,
                options,
                EventOp::Create,
                EventStatus::Failed,
                item.source_path.clone(),
                item.target_rel_path.clone(),
                Some(e.to_string()),
            )
            .await;
            return;
        }
    };

    if options.dry_run {
        let target_abs = writer.resolved_root().join(&item.target_rel_path);
        let exists = tokio::fs::metadata(&target_abs).await.is_ok();
        let effective_skip = options.skip_existing && !options.force_update;
        let intended = if options.force_update {
            EventOp::Update
        } else if exists && effective_skip {
            EventOp::Skip
        } else if !exists {
            EventOp::Create
        } else {
            EventOp::Update
        };
        match intended {
            EventOp::Create => counters.created_files.fetch_add(1, Ordering::Relaxed),
            EventOp::Update => counters.updated_files.fetch_add(1, Ordering::Relaxed),
            _ => counters.skipped_files.fetch_add(1, Ordering::Relaxed),
        };
        counters.processed_files.fetch_add(1, Ordering::Relaxed);
        emit(
            events,
            options,
            intended,
            EventStatus::Skipped,
            item.source_path.clone(),
            item.target_rel_path.clone(),
            Some("dry_run".into()),
        )
        .await;
        return;
    }

    let effective_skip_existing = options.skip_existing && !options.force_update;
    let effective_epsilon =
        if options.force_update { -1 } else { options.mod_time_epsilon_seconds };

    match writer
        .write_strm(&item.target_rel_path, &content, item.mod_time, effective_skip_existing, effective_epsilon)
        .await
    {
        Ok(outcome) => {
            counters.processed_files.fetch_add(1, Ordering::Relaxed);
            let (op, status) = match outcome {
                WriteOutcome::Created => {
                    counters.created_files.fetch_add(1, Ordering::Relaxed);
                    (EventOp::Create, EventStatus::Success)
                }
                WriteOutcome::Updated => {
                    counters.updated_files.fetch_add(1, Ordering::Relaxed);
                    (EventOp::Update, EventStatus::Success)
                }
                WriteOutcome::Unchanged => {
                    counters.skipped_files.fetch_add(1, Ordering::Relaxed);
                    (EventOp::Skip, EventStatus::Success)
                }
                WriteOutcome::Skipped => {
                    counters.skipped_files.fetch_add(1, Ordering::Relaxed);
                    (EventOp::Skip, EventStatus::Skipped)
                }
            };
            emit(
                events,
                options,
                op,
                status,
                item.source_path.clone(),
                item.target_rel_path.clone(),
                None,
            )
            .await;
        }
        Err(e) => {
            counters.processed_files.fetch_add(1, Ordering::Relaxed);
            counters.failed_files.fetch_add(1, Ordering::Relaxed);
            emit(
                events,
                options,
                EventOp::Update,
                EventStatus::Failed,
                item.source_path.clone(),
                item.target_rel_path.clone(),
                Some(e.to_string()),
            )
            .await;
        }
    }
}

async fn emit(
    events: &Arc<dyn EngineEvents>,
    options: &EngineOptions,
    op: EventOp,
    status: EventStatus,
    source_path: String,
    target_path: String,
    error_message: Option<String>,
) {
    events
        .on_file_event(TaskRunEvent {
            id: TaskRunEventId::new(uuid::Uuid::new_v4().to_string()),
            task_run_id: options.task_run_id.clone(),
            job_id: options.job_id.clone(),
            kind: EventKind::Strm,
            op,
            status,
            source_path,
            target_path,
            error_message,
            created_at: Utc::now(),
        })
        .await;
}

fn relative_path(path: &str, remote_root: &str) -> String {
    let cleaned = clean_posix_path(path);
    let cleaned_root = clean_posix_path(remote_root);
    cleaned
        .strip_prefix(&cleaned_root)
        .unwrap_or(&cleaned)
        .trim_start_matches('/')
        .to_string()
}

fn is_excluded(relative: &str, exclude_dirs: &[String]) -> bool {
    exclude_dirs.iter().any(|d| {
        let prefix = d.trim_start_matches('/').trim_end_matches('/');
        if prefix.is_empty() {
            return false;
        }
        relative == prefix || relative.starts_with(&format!("{prefix}/"))
    })
}

fn ext_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
}

fn media_ext_allowed(path: &str, media_exts: &[String]) -> bool {
    if media_exts.is_empty() {
        return true;
    }
    match ext_of(path) {
        Some(e) => media_exts.iter().any(|x| x.eq_ignore_ascii_case(&e)),
        None => false,
    }
}

fn meta_ext_allowed(path: &str, meta_exts: &[String]) -> bool {
    if meta_exts.is_empty() {
        return false;
    }
    match ext_of(path) {
        Some(e) => meta_exts.iter().any(|x| x.eq_ignore_ascii_case(&e)),
        None => false,
    }
}

fn with_strm_ext(relative: &str) -> String {
    let p = Path::new(relative);
    p.with_extension("strm").to_string_lossy().replace('\\', "/")
}

fn collect_strm_files(root: &Path) -> Result<Vec<String>, TaskError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| TaskError::transient(format!("walk error: {e}")))?;
        if entry.file_type().is_dir() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("strm") {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        out.push(rel);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEvents;
    use strmsync_core::SyncOpts;
    use strmsync_drivers::FakeDriver;

    fn entry(path: &str, size: u64) -> RemoteEntry {
        RemoteEntry { path: path.into(), name: path.rsplit('/').next().unwrap_or(path).into(), is_dir: false, size, mod_time: Utc::now() }
    }

    fn base_options() -> EngineOptions {
        EngineOptions {
            job_id: JobId::new("job1"),
            task_run_id: TaskRunId::new("run1"),
            media_exts: vec![".mkv".into()],
            meta_exts: vec![".nfo".into()],
            exclude_dirs: vec!["movies/sample".into()],
            min_file_size_bytes: 0,
            max_concurrency: 2,
            dry_run: false,
            force_update: false,
            skip_existing: false,
            mod_time_epsilon_seconds: 0,
            enable_orphan_cleanup: false,
            orphan_cleanup_dry_run: false,
            metadata_mode: MetadataMode::None,
            meta_strategy: MetaStrategy::from_sync_opts(&SyncOpts::default()),
            content_config: ContentBuilderConfig {
                local_root: Some("/mnt/media".into()),
                base_url: None,
                replace_rules: Vec::new(),
            },
            strm_mode: StrmMode::Local,
            data_server_kind: DataServerKind::Local,
            prefer_mount: false,
        }
    }

    #[tokio::test]
    async fn writes_strm_for_media_and_skips_excluded_and_non_media() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new(
            DataServerKind::Local,
            vec![
                entry("/movies/a.mkv", 10),
                entry("/movies/sample/b.mkv", 10),
                entry("/movies/c.srt", 10),
            ],
        );
        let writer = StrmWriter::new(dir.path());
        let options = base_options();
        let engine = SyncEngine::new(Arc::new(driver), writer, options, Arc::new(NullEvents));

        let outcome = engine.run_once("/movies", CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.stats.total_files, 1);
        assert_eq!(outcome.stats.created_files, 1);
        assert_eq!(outcome.stats.filtered_files, 2);
        assert!(dir.path().join("a.strm").exists());
        assert!(!dir.path().join("sample/b.strm").exists());
    }

    #[tokio::test]
    async fn force_update_rewrites_even_when_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new(DataServerKind::Local, vec![entry("/movies/a.mkv", 10)]);
        let writer = StrmWriter::new(dir.path());
        let mut options = base_options();
        options.exclude_dirs.clear();
        let engine = SyncEngine::new(
            Arc::new(driver.clone()),
            writer.clone(),
            options.clone(),
            Arc::new(NullEvents),
        );
        engine.run_once("/movies", CancellationToken::new()).await.unwrap();

        options.force_update = true;
        let engine2 = SyncEngine::new(Arc::new(driver), writer, options, Arc::new(NullEvents));
        let outcome = engine2.run_once("/movies", CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.stats.updated_files, 1);
    }

    #[tokio::test]
    async fn builds_meta_plan_for_missing_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new(
            DataServerKind::Local,
            vec![entry("/movies/a.mkv", 10), entry("/movies/a.nfo", 5)],
        );
        let writer = StrmWriter::new(dir.path());
        let mut options = base_options();
        options.exclude_dirs.clear();
        options.metadata_mode = MetadataMode::Copy;
        let engine = SyncEngine::new(Arc::new(driver), writer, options, Arc::new(NullEvents));

        let outcome = engine.run_once("/movies", CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.meta_plan.len(), 1);
        assert_eq!(outcome.meta_plan[0].fs_op, EventOp::Create);
        assert_eq!(outcome.meta_plan[0].source_strategy, PlanSourceStrategy::Copy);
    }
}
