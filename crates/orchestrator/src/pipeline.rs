//! The scan pipeline: walk → classify → parse → update → persist.
//!
//! The walker fills a bounded work queue directly, so a full queue blocks
//! the walk until the workers catch up — the file list is never materialized
//! in memory. Each worker classifies a file against the signature cache and,
//! when the file changed, parses it; records flow over an MPSC channel to
//! the single-threaded coordinator, which applies graph transactions in
//! arrival order. Meta records commit as they arrive (in `batch_size`
//! groups); asset edge sets are staged until the pool drains so that
//! references to GUIDs first seen later in the same scan still resolve.
//! Deletions are detected after the walk completes, by comparing the visited
//! set against the signature cache.

use std::time::Instant;

use chrono::DateTime;
use chrono::Utc;
use crossbeam_channel::bounded;
use foldhash::HashMap;
use foldhash::HashSet;

use uref_database::change::ChangeDetector;
use uref_database::change::ChangeKind;
use uref_database::change::ChangeRecord;
use uref_database::signature::FileSignature;
use uref_database::signature::SignatureCache;
use uref_database::walker::WalkItem;
use uref_database::walker::WalkedFile;
use uref_database::walker::Walker;
use uref_graph::AssetNode;
use uref_graph::DependencyEdge;
use uref_graph::GraphError;
use uref_graph::GraphUpdater;
use uref_graph::Transaction;
use uref_guid::AssetKind;
use uref_guid::Guid;
use uref_guid::ImporterKind;
use uref_parser::ParsedAsset;
use uref_parser::ParsedFile;
use uref_parser::ParsedMeta;
use uref_parser::ParsedScript;
use uref_parser::ParseError;
use uref_parser::ParseErrorKind;
use uref_parser::Parser;
use uref_parser::ParserError;
use uref_parser::ParserOptions;

use crate::cancel::CancellationToken;
use crate::config::OrchestratorConfiguration;
use crate::error::OrchestratorError;
use crate::progress::ProgressEvent;
use crate::progress::ProgressSink;
use crate::progress::ScanStage;
use crate::report::IoErrorRecord;
use crate::report::ResolveWarning;
use crate::report::ScanMode;
use crate::report::ScanReport;

/// What workers and the walker send to the coordinator.
enum PipelineMessage {
    /// Every visited file produces one of these, parsed or not.
    Classified(ChangeRecord),
    /// The parse result of a changed file.
    Parsed(String, Result<Option<ParsedFile>, ParserError>),
    SkippedLarge { path: String, size: u64 },
    WalkFailed { path: String, message: String },
}

pub(crate) fn run(
    configuration: &OrchestratorConfiguration,
    mode: ScanMode,
    updater: &mut GraphUpdater,
    detector: &mut ChangeDetector,
    cancel: &CancellationToken,
    progress: &dyn ProgressSink,
) -> Result<ScanReport, OrchestratorError> {
    let started = Instant::now();
    let scan_id = detector.begin_scan();
    let mut report = ScanReport::new(scan_id, mode);

    let walker = Walker::new(configuration.walker_configuration())?;

    let worker_count = configuration.worker_count();
    let options = ParserOptions {
        max_structured_document_bytes: configuration.max_structured_document_bytes(),
        deadline: None,
    };
    let timeout = configuration.per_file_timeout;
    let reparse_unchanged = mode == ScanMode::Full;

    // Streamed classification state, accumulated by the coordinator.
    let mut records: Vec<ChangeRecord> = Vec::new();
    let mut visited: HashSet<String> = HashSet::default();
    let mut signatures: HashMap<String, FileSignature> = HashMap::default();
    let mut metas: Vec<ParsedMeta> = Vec::new();
    let mut staged_assets: Vec<ParsedAsset> = Vec::new();
    let mut staged_scripts: Vec<ParsedScript> = Vec::new();

    let (work_tx, work_rx) = bounded::<WalkedFile>(worker_count * 4);
    let (message_tx, message_rx) = bounded::<PipelineMessage>(1024);

    // Workers only read the cache; the exclusive borrow resumes after the
    // scope for deletion detection and the commit.
    let detector_view: &ChangeDetector = detector;

    let scope_result = std::thread::scope(|scope| -> Result<(), OrchestratorError> {
        // The walker thread. A full work queue blocks the send, which blocks
        // the walk: that is the pipeline's backpressure.
        {
            let message_tx = message_tx.clone();
            let cancel = cancel.clone();
            scope.spawn(move || {
                for item in walker.walk() {
                    if cancel.is_cancelled() {
                        break;
                    }

                    let delivered = match item {
                        WalkItem::File(file) => work_tx.send(file).is_ok(),
                        WalkItem::SkippedLarge { path, size } => {
                            message_tx.send(PipelineMessage::SkippedLarge { path, size }).is_ok()
                        }
                        WalkItem::Error(error) => message_tx
                            .send(PipelineMessage::WalkFailed {
                                path: error.path.to_string_lossy().into_owned(),
                                message: error.cause.to_string(),
                            })
                            .is_ok(),
                    };

                    if !delivered {
                        break;
                    }
                }
            });
        }

        for _ in 0..worker_count {
            let work_rx = work_rx.clone();
            let message_tx = message_tx.clone();
            let cancel = cancel.clone();

            scope.spawn(move || {
                let mut parser = Parser::new(options);

                while let Ok(file) = work_rx.recv() {
                    if cancel.is_cancelled() {
                        break;
                    }

                    let record = detector_view.classify_file(&file);
                    let reparse = match record.kind {
                        ChangeKind::New | ChangeKind::Modified => true,
                        ChangeKind::Unchanged => reparse_unchanged,
                        ChangeKind::Deleted => false,
                    };
                    let absolute = record.absolute.clone();
                    let path = record.path.clone();

                    if message_tx.send(PipelineMessage::Classified(record)).is_err() {
                        break;
                    }

                    if reparse && let Some(absolute) = absolute {
                        parser.set_deadline(Some(Instant::now() + timeout));
                        let result = parser.parse(&absolute, &path);

                        if message_tx.send(PipelineMessage::Parsed(path, result)).is_err() {
                            break;
                        }
                    }
                }
            });
        }
        drop(work_rx);
        drop(message_tx);

        // The coordinator: the single consumer applying transactions in
        // arrival order. After a fatal failure the channel is still drained
        // so every worker can finish and the scope can join.
        let mut failure: Option<OrchestratorError> = None;
        while let Ok(message) = message_rx.recv() {
            match message {
                PipelineMessage::Classified(record) => {
                    *report.changes.entry(record.kind.to_string()).or_insert(0) += 1;
                    report.files_walked += 1;

                    if let Some(signature) = record.new_signature {
                        signatures.insert(record.path.clone(), signature);
                    }
                    visited.insert(record.path.clone());
                    records.push(record);

                    if report.files_walked % 256 == 0 {
                        progress.report(ProgressEvent {
                            stage: ScanStage::Walking,
                            processed: report.files_walked,
                            total: 0,
                            message: String::new(),
                        });
                    }
                }
                PipelineMessage::Parsed(path, result) => {
                    if failure.is_none()
                        && let Err(error) = handle_parse_outcome(
                            result,
                            updater,
                            detector_view.cache(),
                            &signatures,
                            &mut metas,
                            &mut staged_assets,
                            &mut staged_scripts,
                            configuration.batch_size,
                            &mut report,
                        )
                    {
                        failure = Some(error);
                    }

                    if report.files_parsed > 0 && report.files_parsed % 64 == 0 {
                        progress.report(ProgressEvent {
                            stage: ScanStage::Parsing,
                            processed: report.files_parsed,
                            total: 0,
                            message: path,
                        });
                    }
                }
                PipelineMessage::SkippedLarge { path, size } => {
                    report.files_skipped_large += 1;
                    report.parse_errors.push(ParseError::new(
                        path,
                        ParseErrorKind::TooLarge,
                        format!("{} bytes exceeds the configured limit", size),
                    ));
                }
                PipelineMessage::WalkFailed { path, message } => {
                    report.io_errors.push(IoErrorRecord { path, message });
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    });
    scope_result?;

    if cancel.is_cancelled() {
        report.cancelled = true;
    }

    commit_meta_batch(updater, detector.cache(), &signatures, std::mem::take(&mut metas), &mut report)?;

    // Apply staged edge sets, script annotations, and deletions, unless the
    // scan was cancelled: an interrupted walk means the unvisited remainder
    // must not be mistaken for deletions, and staged transactions never
    // entered the queue.
    if !report.cancelled {
        progress.report(ProgressEvent {
            stage: ScanStage::Updating,
            processed: 0,
            total: staged_assets.len(),
            message: String::new(),
        });

        commit_script_batch(updater, std::mem::take(&mut staged_scripts), &mut report)?;

        let assets = std::mem::take(&mut staged_assets);
        for chunk in assets.chunks(configuration.batch_size.max(1)) {
            commit_asset_batch(updater, chunk, &signatures, &mut report)?;
        }

        let deleted = detector.detect_deleted(&visited);
        let mut deleted_paths = Vec::with_capacity(deleted.len());
        for record in deleted {
            *report.changes.entry(record.kind.to_string()).or_insert(0) += 1;
            deleted_paths.push(record.path.clone());
            records.push(record);
        }
        commit_deletions(updater, &deleted_paths, &mut report)?;
    }

    // Persist. A cancelled scan leaves both stores untouched, so the next
    // run redoes the interrupted work.
    if !report.cancelled {
        progress.report(ProgressEvent { stage: ScanStage::Persisting, processed: 0, total: 2, message: String::new() });

        detector.commit(&records);
        detector.cache().save(&configuration.signature_cache_path())?;

        let store = updater.store();
        let store = store.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        uref_graph::save_graph(&store, &configuration.graph_snapshot_path(), configuration.backup_enabled)?;
    }

    report.updater_stats = updater.stats();
    report.changed_guids.sort_unstable();
    report.changed_guids.dedup();
    report.duration_ms = started.elapsed().as_millis() as u64;

    Ok(report)
}

/// Routes one parse result: meta records commit in batches, asset and script
/// records are staged, failures accumulate in the report.
fn handle_parse_outcome(
    result: Result<Option<ParsedFile>, ParserError>,
    updater: &mut GraphUpdater,
    cache: &SignatureCache,
    signatures: &HashMap<String, FileSignature>,
    metas: &mut Vec<ParsedMeta>,
    staged_assets: &mut Vec<ParsedAsset>,
    staged_scripts: &mut Vec<ParsedScript>,
    batch_size: usize,
    report: &mut ScanReport,
) -> Result<(), OrchestratorError> {
    match result {
        Ok(Some(ParsedFile::Meta(meta))) => {
            report.files_parsed += 1;
            metas.push(meta);
            if metas.len() >= batch_size {
                commit_meta_batch(updater, cache, signatures, std::mem::take(metas), report)?;
            }
        }
        Ok(Some(ParsedFile::Asset(asset))) => {
            report.files_parsed += 1;
            report.fallback_documents += asset.fallback_documents;
            staged_assets.push(asset);
        }
        Ok(Some(ParsedFile::Script(script))) => {
            report.files_parsed += 1;
            staged_scripts.push(script);
        }
        Ok(None) => {}
        Err(ParserError::Io { path, cause }) => {
            report.io_errors.push(IoErrorRecord { path, message: cause.to_string() });
        }
        Err(ParserError::Parse(error)) => {
            report.parse_errors.push(error);
        }
    }

    Ok(())
}

fn timestamp_from_mtime(mtime_ns: u128) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(mtime_ns.min(i64::MAX as u128) as i64)
}

/// Builds the node a meta record describes, merging in what the store
/// already knows (analysis state survives a meta-only reparse).
///
/// The companion asset's signature may not have streamed in yet when the
/// meta commits, so the lookup falls back to the persistent cache and then
/// to the meta file's own signature; the asset batch refreshes the stat
/// fields once every signature is in.
fn node_from_meta(
    meta: &ParsedMeta,
    signatures: &HashMap<String, FileSignature>,
    cache: &SignatureCache,
    existing: Option<&AssetNode>,
) -> AssetNode {
    let extension = meta.asset_path.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    let mut kind = AssetKind::from_extension(&extension);
    if kind == AssetKind::Unknown
        && let Some(hint) = meta.importer_kind.asset_kind_hint()
    {
        kind = hint;
    }

    let signature = signatures
        .get(&meta.asset_path)
        .or_else(|| cache.get(&meta.asset_path))
        .or_else(|| signatures.get(&meta.path));

    let mut node = AssetNode::new(meta.guid, meta.asset_path.clone(), kind);
    node.size_bytes = signature.map_or(0, |signature| signature.size);
    node.last_modified = signature
        .map(|signature| timestamp_from_mtime(signature.mtime_ns))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    node.content_hash = signature.and_then(|signature| signature.content_hash);
    node.importer_metadata = meta.importer_metadata.clone();
    node.is_analyzed = existing.is_some_and(|existing| existing.is_analyzed);

    node
}

/// Node equality modulo `last_modified`: an mtime bump with identical
/// everything-else is not a semantic change and produces no mutation.
fn node_changed(existing: &AssetNode, candidate: &AssetNode) -> bool {
    let mut comparable = candidate.clone();
    comparable.last_modified = existing.last_modified;

    comparable != *existing
}

fn commit_meta_batch(
    updater: &mut GraphUpdater,
    cache: &SignatureCache,
    signatures: &HashMap<String, FileSignature>,
    metas: Vec<ParsedMeta>,
    report: &mut ScanReport,
) -> Result<(), OrchestratorError> {
    if metas.is_empty() {
        return Ok(());
    }

    let mut transaction = updater.begin();

    {
        let store = updater.store();
        let store = store.read().unwrap_or_else(std::sync::PoisonError::into_inner);

        for meta in &metas {
            if meta.importer_kind == ImporterKind::Unknown
                && let Some(raw) = &meta.raw_importer
            {
                report.parse_errors.push(ParseError::new(
                    meta.path.clone(),
                    ParseErrorKind::UnknownImporter,
                    format!("importer `{}` is not recognized", raw),
                ));
            }

            let existing = store.node(meta.guid);
            let node = node_from_meta(meta, signatures, cache, existing);

            match existing {
                Some(existing) => {
                    if node_changed(existing, &node) {
                        transaction.update_node(node);
                        report.changed_guids.push(meta.guid);
                    }
                }
                None => {
                    transaction.add_node(node);
                    report.changed_guids.push(meta.guid);
                }
            }
        }
    }

    commit(updater, transaction, report)
}

fn commit_script_batch(
    updater: &mut GraphUpdater,
    scripts: Vec<ParsedScript>,
    report: &mut ScanReport,
) -> Result<(), OrchestratorError> {
    if scripts.is_empty() {
        return Ok(());
    }

    let mut transaction = updater.begin();

    {
        let store = updater.store();
        let store = store.read().unwrap_or_else(std::sync::PoisonError::into_inner);

        for script in &scripts {
            let Some(guid) = store.resolve_path(&script.path) else {
                // The script's meta is missing or failed to parse; its own
                // record already explains why.
                continue;
            };

            let Some(existing) = store.node(guid) else { continue };

            let mut node = existing.clone();
            node.is_analyzed = true;
            if script.declares_create_asset_menu {
                node.importer_metadata.insert("createAssetMenu".to_string(), serde_json::Value::Bool(true));
            }

            if node_changed(existing, &node) {
                transaction.update_node(node);
            }
        }
    }

    commit(updater, transaction, report)
}

fn commit_asset_batch(
    updater: &mut GraphUpdater,
    assets: &[ParsedAsset],
    signatures: &HashMap<String, FileSignature>,
    report: &mut ScanReport,
) -> Result<(), OrchestratorError> {
    let mut transaction = updater.begin();

    {
        let store = updater.store();
        let store = store.read().unwrap_or_else(std::sync::PoisonError::into_inner);

        for asset in assets {
            let Some(source) = store.resolve_path(&asset.path) else {
                report.resolve_warnings.push(ResolveWarning {
                    source_path: asset.path.clone(),
                    target: Guid::from_u128(0),
                    context_path: None,
                    reason: "no meta file declares a GUID for this asset".to_string(),
                });
                continue;
            };

            let mut edges = Vec::with_capacity(asset.references.len());
            for reference in &asset.references {
                let resolvable = store.node(reference.target).is_some_and(|node| node.active);
                if !resolvable {
                    report.resolve_warnings.push(ResolveWarning {
                        source_path: asset.path.clone(),
                        target: reference.target,
                        context_path: reference.context_path.clone(),
                        reason: format!("target {} is unknown or inactive", reference.target),
                    });
                    continue;
                }

                edges.push(DependencyEdge {
                    source,
                    target: reference.target,
                    dep_kind: reference.dep_kind,
                    strength: reference.strength,
                    context_path: reference.context_path.clone(),
                    component_type: reference.component_type.clone(),
                    property_name: reference.property_name.clone(),
                    source_file_id: reference.source_file_id,
                    active: true,
                });
            }

            if let Some(existing) = store.node(source) {
                let mut node = existing.clone();
                node.is_analyzed = true;

                // The meta may have committed before this asset's signature
                // streamed in; the stat fields are now authoritative.
                if let Some(signature) = signatures.get(&asset.path) {
                    node.size_bytes = signature.size;
                    node.last_modified = timestamp_from_mtime(signature.mtime_ns);
                    node.content_hash = signature.content_hash;
                }

                if node_changed(existing, &node) {
                    transaction.update_node(node);
                }
            }

            transaction.replace_edges_from(source, edges);
            report.changed_guids.push(source);
        }
    }

    commit(updater, transaction, report)
}

fn commit_deletions(
    updater: &mut GraphUpdater,
    deleted_paths: &[String],
    report: &mut ScanReport,
) -> Result<(), OrchestratorError> {
    if deleted_paths.is_empty() {
        return Ok(());
    }

    let mut transaction = updater.begin();
    let mut seen: HashSet<Guid> = HashSet::default();

    {
        let store = updater.store();
        let store = store.read().unwrap_or_else(std::sync::PoisonError::into_inner);

        for path in deleted_paths {
            let asset_path = path.strip_suffix(".meta").unwrap_or(path);
            let Some(guid) = store.resolve_path(asset_path) else { continue };

            if store.node(guid).is_some_and(|node| node.active) && seen.insert(guid) {
                transaction.remove_node(guid);
                report.changed_guids.push(guid);
            }
        }
    }

    commit(updater, transaction, report)
}

/// Commits one transaction, folding the outcome into the report. Conflicts
/// abort only their own transaction; invariant violations abort the scan.
fn commit(
    updater: &mut GraphUpdater,
    transaction: Transaction,
    report: &mut ScanReport,
) -> Result<(), OrchestratorError> {
    if transaction.is_empty() {
        return Ok(());
    }

    match updater.commit(transaction) {
        Ok(outcome) => {
            report.transactions_committed += 1;
            report.nodes_upserted += outcome.nodes_upserted;
            report.nodes_deactivated += outcome.nodes_deactivated;
            report.edges.added += outcome.edges.added;
            report.edges.removed += outcome.edges.removed;
            report.edges.updated += outcome.edges.updated;
            report.edges.unchanged += outcome.edges.unchanged;

            Ok(())
        }
        Err(GraphError::Conflict(conflict)) => {
            report.transactions_failed += 1;
            report.conflicts.push(conflict.to_string());
            tracing::warn!("Transaction rejected: {}.", conflict);

            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}
