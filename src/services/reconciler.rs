//! Periodic reconciliation: find input objects whose destination is missing
//! and relocate them.
//!
//! Correctness never depends on the reactive trigger having fired. A scan
//! enumerates the input prefix lazily page by page, skips anything already
//! present at its destination, and isolates every per-item failure so one
//! bad object never stops the batch.

use super::{
    classifier::Route,
    image_check::ExtensionAllowList,
    object_store::{StorageError, StorageResult},
    relocation::RelocationService,
};
use crate::{
    errors::ProcessingError,
    models::{
        object::ObjectInfo,
        report::{ItemOutcome, OutcomeStatus, ScanReport},
    },
};
use chrono::Utc;
use futures::{
    Stream, StreamExt, TryStreamExt,
    future::ready,
    stream,
};
use std::{
    sync::{Mutex, PoisonError},
    time::Instant,
};
use tracing::{info, warn};

pub const DEFAULT_SCAN_CONCURRENCY: usize = 4;
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Always empty or ending in `/`.
    input_prefix: String,
    pub extensions: ExtensionAllowList,
    pub concurrency: usize,
    pub page_size: usize,
}

impl ReconcilerSettings {
    pub fn new(input_prefix: &str, extensions: ExtensionAllowList) -> Self {
        let trimmed = input_prefix.trim_matches('/');
        let input_prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        };
        Self {
            input_prefix,
            extensions,
            concurrency: DEFAULT_SCAN_CONCURRENCY,
            page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn input_prefix(&self) -> &str {
        &self.input_prefix
    }
}

pub struct Reconciler {
    relocation: RelocationService,
    settings: ReconcilerSettings,
}

impl Reconciler {
    pub fn new(relocation: RelocationService, settings: ReconcilerSettings) -> Self {
        Self {
            relocation,
            settings,
        }
    }

    /// Whether `key` is a source object the pipeline should process.
    pub fn is_input_key(&self, key: &str) -> bool {
        key.starts_with(self.settings.input_prefix.as_str())
            && !key.ends_with('/')
            && !self.relocation.classifier().is_processed_key(key)
    }

    /// Run one full scan. Always returns a report; an enumeration failure
    /// is recorded in it after the items seen so far have been processed.
    pub async fn run(&self) -> ScanReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        let classifier = self.relocation.classifier();
        let enumeration_error: Mutex<Option<String>> = Mutex::new(None);

        info!(
            prefix = %self.settings.input_prefix(),
            concurrency = self.settings.concurrency,
            "reconciliation scan started"
        );

        // The paged stream ends after yielding its first error.
        let outcomes: Vec<ItemOutcome> = self
            .enumerate()
            .filter_map(|item| {
                ready(match item {
                    Ok(info) if !classifier.is_processed_key(&info.key) => Some(info),
                    Ok(_) => None,
                    Err(err) => {
                        *enumeration_error
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
                        None
                    }
                })
            })
            .map(|info| self.reconcile_entry(info.key))
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;

        let enumeration_error = enumeration_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let report = ScanReport::from_outcomes(started_at, &outcomes, enumeration_error);
        if let Some(err) = &report.enumeration_error {
            warn!(error = %err, "enumeration failed, scan cut short");
        }
        info!(
            scanned = report.scanned,
            succeeded = report.succeeded,
            skipped_already_processed = report.skipped_already_processed,
            skipped_not_image = report.skipped_not_image,
            failed = report.failed,
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "reconciliation scan finished"
        );
        report
    }

    /// Lazily page through the input prefix.
    fn enumerate(&self) -> impl Stream<Item = StorageResult<ObjectInfo>> + '_ {
        let store = self.relocation.store();
        let prefix = self.settings.input_prefix.as_str();
        let page_size = self.settings.page_size;

        // State: `None` once the last page has been served.
        stream::try_unfold(Some(None::<String>), move |cursor| async move {
            let Some(start_after) = cursor else {
                return Ok(None);
            };
            let page = store
                .list_page(prefix, start_after.as_deref(), page_size)
                .await?;
            let next = page.next_start_after.map(Some);
            let items = stream::iter(page.objects.into_iter().map(Ok::<_, StorageError>));
            Ok::<_, StorageError>(Some((items, next)))
        })
        .try_flatten()
    }

    async fn reconcile_entry(&self, key: String) -> ItemOutcome {
        let outcome = self.reconcile(key).await;
        let identity = outcome.matched.as_ref().map(|m| m.to_string());
        match &outcome.status {
            OutcomeStatus::Failed { reason } => warn!(
                source_key = %outcome.key,
                identity = identity.as_deref(),
                destination_key = outcome.destination_key.as_deref(),
                outcome = outcome.status.label(),
                reason = %reason,
                "scan item failed"
            ),
            OutcomeStatus::Relocated => {}
            status => info!(
                source_key = %outcome.key,
                identity = identity.as_deref(),
                destination_key = outcome.destination_key.as_deref(),
                outcome = status.label(),
                "scan item skipped"
            ),
        }
        outcome
    }

    async fn reconcile(&self, key: String) -> ItemOutcome {
        if !self.settings.extensions.allows(&key) {
            return ItemOutcome::new(key, OutcomeStatus::SkippedNotImage);
        }

        let route = match self.relocation.classifier().classify_and_route(&key) {
            Ok(route) => route,
            Err(err) => return failed(key, None, err),
        };

        let store = self.relocation.store();
        match store.exists(&route.destination_key).await {
            Ok(true) => {
                return ItemOutcome::new(key, OutcomeStatus::SkippedAlreadyProcessed)
                    .routed(route.matched, route.destination_key);
            }
            Ok(false) => {}
            Err(source) => {
                let err = ProcessingError::ReadFailed {
                    key: route.destination_key.clone(),
                    source,
                };
                return failed(key, Some(route), err);
            }
        }

        let content = match store.read(&key).await {
            Ok(content) => content,
            Err(source) => {
                let err = ProcessingError::ReadFailed {
                    key: key.clone(),
                    source,
                };
                return failed(key, Some(route), err);
            }
        };

        match self.relocation.relocate(&route, content).await {
            Ok(_) => ItemOutcome::new(key, OutcomeStatus::Relocated)
                .routed(route.matched, route.destination_key),
            Err(err) => failed(key, Some(route), err),
        }
    }
}

fn failed(key: String, route: Option<Route>, err: ProcessingError) -> ItemOutcome {
    let outcome = ItemOutcome::new(
        key,
        OutcomeStatus::Failed {
            reason: err.to_string(),
        },
    );
    match route {
        Some(route) => outcome.routed(route.matched, route.destination_key),
        None => outcome,
    }
}
