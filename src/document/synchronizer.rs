//! Waiting for virtual documents to catch up with host versions.
//!
//! Request handlers call [`DocumentSynchronizer::try_synchronize`] before
//! forwarding a request to a projected document. The synchronizer listens to
//! [`DocumentManager`] change events and wakes waiters whose required version
//! has been reached. It subscribes as a final listener, so a waiter resumes
//! only after downstream servers have been sent the content it waited for.
//!
//! # Race freedom
//!
//! A waiter is registered *before* the current snapshot is inspected. An update
//! landing between registration and inspection is observed either by the
//! inspection or by the listener, never by neither.
//!
//! # Teardown
//!
//! Each wait owns a [`WaiterGuard`] that removes the registration on drop, so
//! success, timeout, cancellation and a dropped future all leave the pending
//! table clean.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::manager::{
    DocumentChangeListener, DocumentManager, LspDocumentChangeEvent, LspDocumentChangeKind,
};
use super::virtual_document::{VirtualDocumentKind, VirtualDocumentSnapshot};

const LOG_TARGET: &str = "razor_bridge::sync";

/// Default upper bound for a version wait.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a synchronization did not produce a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFailure {
    /// The host document is not tracked.
    DocumentNotFound,
    Cancelled,
    TimedOut,
    /// A newer request for the same projection replaced this one.
    Superseded,
    /// The host document was closed while waiting.
    DocumentRemoved,
    /// The projection is flagged inconsistent and awaits a full-content update.
    Desynchronized,
}

/// Result of a synchronization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synchronized(VirtualDocumentSnapshot),
    Failed {
        reason: SyncFailure,
        /// Version the projection had reached when the wait ended.
        last_known_version: Option<i32>,
    },
}

impl SyncOutcome {
    pub fn is_synchronized(&self) -> bool {
        matches!(self, SyncOutcome::Synchronized(_))
    }

    pub fn snapshot(&self) -> Option<&VirtualDocumentSnapshot> {
        match self {
            SyncOutcome::Synchronized(snapshot) => Some(snapshot),
            SyncOutcome::Failed { .. } => None,
        }
    }

    pub fn into_snapshot(self) -> Option<VirtualDocumentSnapshot> {
        match self {
            SyncOutcome::Synchronized(snapshot) => Some(snapshot),
            SyncOutcome::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<SyncFailure> {
        match self {
            SyncOutcome::Synchronized(_) => None,
            SyncOutcome::Failed { reason, .. } => Some(*reason),
        }
    }

    pub fn last_known_version(&self) -> Option<i32> {
        match self {
            SyncOutcome::Synchronized(snapshot) => snapshot.host_document_version(),
            SyncOutcome::Failed {
                last_known_version, ..
            } => *last_known_version,
        }
    }
}

type SyncKey = (Url, VirtualDocumentKind);

enum Signal {
    Reached(VirtualDocumentSnapshot),
    Superseded,
    Removed,
    Desynchronized,
}

struct PendingSync {
    id: u64,
    /// `None` waits for the projection's first update.
    required_version: Option<i32>,
    reject_on_newer: bool,
    tx: oneshot::Sender<Signal>,
}

impl PendingSync {
    fn is_reached_by(&self, snapshot: &VirtualDocumentSnapshot) -> bool {
        match self.required_version {
            Some(required) => snapshot.satisfies(required),
            None => snapshot.host_document_version().is_some(),
        }
    }
}

/// How a wait treats a host document that is not tracked yet.
#[derive(Clone, Copy, PartialEq, Eq)]
enum MissingDocument {
    Fail,
    Wait,
}

pub struct DocumentSynchronizer {
    documents: Arc<DocumentManager>,
    pending: DashMap<SyncKey, Vec<PendingSync>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl DocumentSynchronizer {
    pub fn new(documents: Arc<DocumentManager>, timeout: Duration) -> Self {
        Self {
            documents,
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    /// Create a synchronizer and subscribe it to `documents`.
    pub fn attach(documents: Arc<DocumentManager>, timeout: Duration) -> Arc<Self> {
        let synchronizer = Arc::new(Self::new(documents.clone(), timeout));
        let listener: Arc<dyn DocumentChangeListener> = synchronizer.clone();
        documents.subscribe_final(&listener);
        synchronizer
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait until the `kind` projection of `host_uri` reflects
    /// `required_version`, bounded by the configured timeout.
    pub async fn try_synchronize(
        &self,
        host_uri: &Url,
        kind: VirtualDocumentKind,
        required_version: i32,
        cancel: &CancellationToken,
        reject_on_newer_parallel_request: bool,
    ) -> SyncOutcome {
        self.wait(
            host_uri,
            kind,
            Some(required_version),
            cancel,
            reject_on_newer_parallel_request,
            self.timeout,
            MissingDocument::Fail,
        )
        .await
    }

    /// Wait for the first update of a projection, e.g. right after a document
    /// is opened and before the Razor server has produced any output.
    pub async fn wait_for_virtual_document(
        &self,
        host_uri: &Url,
        kind: VirtualDocumentKind,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> SyncOutcome {
        self.wait(
            host_uri,
            kind,
            None,
            cancel,
            false,
            timeout,
            MissingDocument::Wait,
        )
        .await
    }

    /// Number of registered waiters; exposed for diagnostics and tests.
    pub fn pending_count(&self) -> usize {
        self.pending.iter().map(|entry| entry.value().len()).sum()
    }

    #[allow(clippy::too_many_arguments)]
    async fn wait(
        &self,
        host_uri: &Url,
        kind: VirtualDocumentKind,
        required_version: Option<i32>,
        cancel: &CancellationToken,
        reject_on_newer: bool,
        timeout: Duration,
        missing: MissingDocument,
    ) -> SyncOutcome {
        if cancel.is_cancelled() {
            return self.failed(host_uri, kind, SyncFailure::Cancelled);
        }

        let key: SyncKey = (host_uri.clone(), kind);
        let (guard, mut rx) = self.register(&key, required_version, reject_on_newer);

        match self.documents.try_get_document(host_uri) {
            None if missing == MissingDocument::Fail => {
                log::debug!(
                    target: LOG_TARGET,
                    "Cannot synchronize {} projection of untracked {}",
                    kind,
                    host_uri
                );
                return SyncOutcome::Failed {
                    reason: SyncFailure::DocumentNotFound,
                    last_known_version: None,
                };
            }
            None => {}
            Some(document) => {
                if let Some(snapshot) = document.virtual_document(kind) {
                    if snapshot.is_desynchronized() {
                        log::warn!(
                            target: LOG_TARGET,
                            "{} projection of {} is desynchronized",
                            kind,
                            host_uri
                        );
                        return SyncOutcome::Failed {
                            reason: SyncFailure::Desynchronized,
                            last_known_version: snapshot.host_document_version(),
                        };
                    }
                    let reached = match required_version {
                        Some(required) => snapshot.satisfies(required),
                        None => snapshot.host_document_version().is_some(),
                    };
                    if reached {
                        return SyncOutcome::Synchronized(snapshot.clone());
                    }
                }
            }
        }

        log::debug!(
            target: LOG_TARGET,
            "Waiting for {} projection of {} to reach {:?}",
            kind,
            host_uri,
            required_version
        );

        let reason = tokio::select! {
            biased;
            _ = cancel.cancelled() => SyncFailure::Cancelled,
            signal = &mut rx => match signal {
                Ok(Signal::Reached(snapshot)) => return SyncOutcome::Synchronized(snapshot),
                Ok(Signal::Superseded) => SyncFailure::Superseded,
                Ok(Signal::Removed) => SyncFailure::DocumentRemoved,
                Ok(Signal::Desynchronized) => SyncFailure::Desynchronized,
                // Sender dropped without a signal: the entry was torn down.
                Err(_) => SyncFailure::DocumentRemoved,
            },
            _ = tokio::time::sleep(timeout) => SyncFailure::TimedOut,
        };
        drop(guard);

        log::debug!(
            target: LOG_TARGET,
            "Synchronization of {} projection of {} to {:?} ended: {:?}",
            kind,
            host_uri,
            required_version,
            reason
        );
        self.failed(host_uri, kind, reason)
    }

    fn register(
        &self,
        key: &SyncKey,
        required_version: Option<i32>,
        reject_on_newer: bool,
    ) -> (WaiterGuard<'_>, oneshot::Receiver<Signal>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.pending.entry(key.clone()).or_default();

        // Older opted-in waiters for an equal or lower version are obsolete.
        if let Some(required) = required_version {
            let (superseded, kept): (Vec<_>, Vec<_>) =
                std::mem::take(&mut *waiters).into_iter().partition(|w| {
                    w.reject_on_newer && w.required_version.is_some_and(|v| v <= required)
                });
            *waiters = kept;
            for waiter in superseded {
                let _ = waiter.tx.send(Signal::Superseded);
            }
        }

        waiters.push(PendingSync {
            id,
            required_version,
            reject_on_newer,
            tx,
        });
        drop(waiters);

        (
            WaiterGuard {
                pending: &self.pending,
                key: key.clone(),
                id,
            },
            rx,
        )
    }

    fn failed(&self, host_uri: &Url, kind: VirtualDocumentKind, reason: SyncFailure) -> SyncOutcome {
        let last_known_version = self
            .documents
            .try_get_document(host_uri)
            .and_then(|doc| doc.virtual_document(kind)?.host_document_version());
        SyncOutcome::Failed {
            reason,
            last_known_version,
        }
    }

    fn resolve_reached(&self, snapshot: &VirtualDocumentSnapshot, host_uri: &Url) {
        let key: SyncKey = (host_uri.clone(), snapshot.kind());
        let Some(mut waiters) = self.pending.get_mut(&key) else {
            return;
        };
        let (reached, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut *waiters)
            .into_iter()
            .partition(|w| w.is_reached_by(snapshot));
        *waiters = waiting;
        drop(waiters);

        for waiter in reached {
            let _ = waiter.tx.send(Signal::Reached(snapshot.clone()));
        }
    }

    fn resolve_desynchronized(&self, host_uri: &Url, kind: VirtualDocumentKind) {
        let Some((_, waiters)) = self.pending.remove(&(host_uri.clone(), kind)) else {
            return;
        };
        log::warn!(
            target: LOG_TARGET,
            "Failing {} waiter(s) on desynchronized {} projection of {}",
            waiters.len(),
            kind,
            host_uri
        );
        for waiter in waiters {
            let _ = waiter.tx.send(Signal::Desynchronized);
        }
    }

    fn resolve_removed(&self, host_uri: &Url) {
        for kind in VirtualDocumentKind::ALL {
            let Some((_, waiters)) = self.pending.remove(&(host_uri.clone(), kind)) else {
                continue;
            };
            for waiter in waiters {
                let _ = waiter.tx.send(Signal::Removed);
            }
        }
    }
}

impl DocumentChangeListener for DocumentSynchronizer {
    fn changed(&self, event: &LspDocumentChangeEvent) {
        let Some(host_uri) = event.host_uri() else {
            return;
        };
        match event.kind {
            LspDocumentChangeKind::VirtualDocumentChanged => {
                if let Some(snapshot) = &event.virtual_new {
                    self.resolve_reached(snapshot, host_uri);
                }
            }
            LspDocumentChangeKind::VirtualDocumentDesynchronized => {
                if let Some(snapshot) = &event.virtual_new {
                    self.resolve_desynchronized(host_uri, snapshot.kind());
                }
            }
            LspDocumentChangeKind::Removed => self.resolve_removed(host_uri),
            LspDocumentChangeKind::Added | LspDocumentChangeKind::HostVersionChanged => {}
        }
    }
}

/// Removes one waiter registration when dropped.
struct WaiterGuard<'a> {
    pending: &'a DashMap<SyncKey, Vec<PendingSync>>,
    key: SyncKey,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut waiters) = self.pending.get_mut(&self.key) {
            waiters.retain(|w| w.id != self.id);
        }
        self.pending.remove_if(&self.key, |_, waiters| waiters.is_empty());
    }
}
