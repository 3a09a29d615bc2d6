//! Process-wide registry of host documents.
//!
//! The manager owns every [`LspDocument`] and is the only place that mutates
//! them. All mutation goes through one internal mutex; change listeners are
//! notified after the mutex is released, iterating over a snapshot of the
//! listener list, so a listener may call back into the manager.
//!
//! Listeners run in subscription order. Final listeners, registered with
//! [`DocumentManager::subscribe_final`], run after all others; waiters use
//! this so they never resume ahead of the document mirrors.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use url::Url;

use super::lsp_document::{LspDocument, LspDocumentSnapshot};
use super::virtual_document::{
    UpdateError, UpdateState, VirtualDocumentKind, VirtualDocumentSnapshot,
};
use crate::text::TextChange;

const LOG_TARGET: &str = "razor_bridge::documents";

/// Identifies one editor view (pane) showing a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LspDocumentChangeKind {
    Added,
    Removed,
    HostVersionChanged,
    VirtualDocumentChanged,
    /// An update was refused and left the projection flagged
    /// desynchronized. `virtual_new` is the flagged snapshot.
    VirtualDocumentDesynchronized,
}

/// A change raised by the [`DocumentManager`].
///
/// `old`/`new` are the host snapshots around the change (`old` is `None` for
/// `Added`, `new` is `None` for `Removed`). The virtual fields are set only for
/// `VirtualDocumentChanged` and `VirtualDocumentDesynchronized`; `virtual_old`
/// is `None` on the first update of a projection.
#[derive(Debug, Clone)]
pub struct LspDocumentChangeEvent {
    pub kind: LspDocumentChangeKind,
    pub old: Option<LspDocumentSnapshot>,
    pub new: Option<LspDocumentSnapshot>,
    pub virtual_old: Option<VirtualDocumentSnapshot>,
    pub virtual_new: Option<VirtualDocumentSnapshot>,
}

impl LspDocumentChangeEvent {
    /// URI of the host document the event concerns.
    pub fn host_uri(&self) -> Option<&Url> {
        self.new
            .as_ref()
            .or(self.old.as_ref())
            .map(LspDocumentSnapshot::uri)
    }
}

/// Receives document change events.
///
/// Called synchronously on the mutating thread, outside the manager lock.
/// Implementations should hand off anything slow.
pub trait DocumentChangeListener: Send + Sync {
    fn changed(&self, event: &LspDocumentChangeEvent);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateVirtualDocumentError {
    #[error("no tracked document for {0}")]
    DocumentNotFound(Url),
    #[error(transparent)]
    Update(#[from] UpdateError),
}

struct TrackedDocument {
    document: LspDocument,
    views: HashSet<ViewId>,
}

type Listeners = Vec<Weak<dyn DocumentChangeListener>>;

/// Listeners are notified in subscription order, every [`subscribe`] listener
/// before any [`subscribe_final`] listener.
///
/// [`subscribe`]: DocumentManager::subscribe
/// [`subscribe_final`]: DocumentManager::subscribe_final
#[derive(Default)]
pub struct DocumentManager {
    documents: Mutex<HashMap<Url, TrackedDocument>>,
    listeners: RwLock<Listeners>,
    final_listeners: RwLock<Listeners>,
}

impl DocumentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Only a weak reference is kept; the caller owns the
    /// listener's lifetime.
    pub fn subscribe(&self, listener: &Arc<dyn DocumentChangeListener>) {
        register(&self.listeners, listener);
    }

    /// Register a listener that sees each event only after every
    /// [`subscribe`](Self::subscribe)d listener has handled it.
    ///
    /// Used by waiters, which must not resume before downstream servers have
    /// been sent the content they are waiting for.
    pub fn subscribe_final(&self, listener: &Arc<dyn DocumentChangeListener>) {
        register(&self.final_listeners, listener);
    }

    /// Register `view` for the buffer at `uri`, creating the host document on
    /// the first registration.
    pub fn track_document(&self, uri: &Url, version: i32, view: ViewId) -> LspDocumentSnapshot {
        let (snapshot, added) = {
            let mut documents = self.lock();
            match documents.get_mut(uri) {
                Some(tracked) => {
                    tracked.views.insert(view);
                    (tracked.document.snapshot(), false)
                }
                None => {
                    let document = LspDocument::new(uri.clone(), version);
                    let snapshot = document.snapshot();
                    documents.insert(
                        uri.clone(),
                        TrackedDocument {
                            document,
                            views: HashSet::from([view]),
                        },
                    );
                    (snapshot, true)
                }
            }
        };

        if added {
            log::debug!(target: LOG_TARGET, "Tracking {} at version {}", uri, version);
            self.notify(&LspDocumentChangeEvent {
                kind: LspDocumentChangeKind::Added,
                old: None,
                new: Some(snapshot.clone()),
                virtual_old: None,
                virtual_new: None,
            });
        }
        snapshot
    }

    /// Deregister `view`; the host document is dropped with its last view.
    pub fn untrack_document(&self, uri: &Url, view: ViewId) {
        let removed = {
            let mut documents = self.lock();
            let Some(tracked) = documents.get_mut(uri) else {
                log::debug!(target: LOG_TARGET, "Untrack for unknown document {}", uri);
                return;
            };
            tracked.views.remove(&view);
            if tracked.views.is_empty() {
                documents.remove(uri).map(|t| t.document.snapshot())
            } else {
                None
            }
        };

        if let Some(old) = removed {
            log::debug!(target: LOG_TARGET, "Stopped tracking {}", uri);
            self.notify(&LspDocumentChangeEvent {
                kind: LspDocumentChangeKind::Removed,
                old: Some(old),
                new: None,
                virtual_old: None,
                virtual_new: None,
            });
        }
    }

    pub fn try_get_document(&self, uri: &Url) -> Option<LspDocumentSnapshot> {
        self.lock().get(uri).map(|t| t.document.snapshot())
    }

    /// Snapshots of every tracked document.
    pub fn documents(&self) -> Vec<LspDocumentSnapshot> {
        self.lock().values().map(|t| t.document.snapshot()).collect()
    }

    /// Record an editor edit that moved the host document to `version`.
    ///
    /// Returns `false` when the document is unknown or the version regresses.
    pub fn update_host_document_version(&self, uri: &Url, version: i32) -> bool {
        self.update_host_document_inner(uri, version, None)
    }

    /// Like [`update_host_document_version`](Self::update_host_document_version),
    /// also recording the editor buffer's new content.
    pub fn update_host_document(&self, uri: &Url, version: i32, text: &str) -> bool {
        self.update_host_document_inner(uri, version, Some(text))
    }

    fn update_host_document_inner(&self, uri: &Url, version: i32, text: Option<&str>) -> bool {
        let (old, new) = {
            let mut documents = self.lock();
            let Some(tracked) = documents.get_mut(uri) else {
                return false;
            };
            let old = tracked.document.snapshot();
            if let Err(current) = tracked.document.set_version(version) {
                log::error!(
                    target: LOG_TARGET,
                    "Host version for {} went backwards: {} -> {}",
                    uri,
                    current,
                    version
                );
                return false;
            }
            if let Some(text) = text {
                tracked.document.set_text(text);
            }
            (old, tracked.document.snapshot())
        };

        self.notify(&LspDocumentChangeEvent {
            kind: LspDocumentChangeKind::HostVersionChanged,
            old: Some(old),
            new: Some(new),
            virtual_old: None,
            virtual_new: None,
        });
        true
    }

    /// Apply a buffer update from the Razor server to a projection.
    ///
    /// Updating an untracked document is a caller bug and asserts in debug
    /// builds. Callers racing the editor closing the document use
    /// [`try_update_virtual_document`](Self::try_update_virtual_document).
    pub fn update_virtual_document(
        &self,
        uri: &Url,
        kind: VirtualDocumentKind,
        changes: &[TextChange],
        host_document_version: i32,
        state: UpdateState,
    ) -> Result<VirtualDocumentSnapshot, UpdateVirtualDocumentError> {
        let result =
            self.try_update_virtual_document(uri, kind, changes, host_document_version, state);
        debug_assert!(
            !matches!(result, Err(UpdateVirtualDocumentError::DocumentNotFound(_))),
            "virtual document update for untracked {uri}"
        );
        result
    }

    /// Like [`update_virtual_document`](Self::update_virtual_document), for
    /// updates that may arrive after the document was closed.
    pub fn try_update_virtual_document(
        &self,
        uri: &Url,
        kind: VirtualDocumentKind,
        changes: &[TextChange],
        host_document_version: i32,
        state: UpdateState,
    ) -> Result<VirtualDocumentSnapshot, UpdateVirtualDocumentError> {
        let (event, result) = {
            let mut documents = self.lock();
            let Some(tracked) = documents.get_mut(uri) else {
                log::debug!(
                    target: LOG_TARGET,
                    "{} buffer update for untracked document {}",
                    kind,
                    uri
                );
                return Err(UpdateVirtualDocumentError::DocumentNotFound(uri.clone()));
            };
            let old = tracked.document.snapshot();
            match tracked
                .document
                .update_virtual_document(kind, changes, host_document_version, state)
            {
                Ok((virtual_old, virtual_new)) => {
                    let event = LspDocumentChangeEvent {
                        kind: LspDocumentChangeKind::VirtualDocumentChanged,
                        old: Some(old),
                        new: Some(tracked.document.snapshot()),
                        virtual_old,
                        virtual_new: Some(virtual_new.clone()),
                    };
                    (Some(event), Ok(virtual_new))
                }
                Err(e) => {
                    let flagged = tracked
                        .document
                        .virtual_document(kind)
                        .map(|doc| doc.current_snapshot().clone())
                        .filter(VirtualDocumentSnapshot::is_desynchronized);
                    let event = flagged.map(|flagged| LspDocumentChangeEvent {
                        kind: LspDocumentChangeKind::VirtualDocumentDesynchronized,
                        old: Some(old),
                        new: Some(tracked.document.snapshot()),
                        virtual_old: None,
                        virtual_new: Some(flagged),
                    });
                    (event, Err(UpdateVirtualDocumentError::Update(e)))
                }
            }
        };

        if result.is_ok() {
            log::debug!(
                target: LOG_TARGET,
                "{} projection of {} now at version {}",
                kind,
                uri,
                host_document_version
            );
        }
        if let Some(event) = event {
            self.notify(&event);
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Url, TrackedDocument>> {
        match self.documents.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn notify(&self, event: &LspDocumentChangeEvent) {
        let mut listeners = live(&self.listeners);
        listeners.extend(live(&self.final_listeners));
        for listener in listeners {
            listener.changed(event);
        }
    }
}

fn register(listeners: &RwLock<Listeners>, listener: &Arc<dyn DocumentChangeListener>) {
    let mut listeners = match listeners.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    listeners.retain(|weak| weak.strong_count() > 0);
    listeners.push(Arc::downgrade(listener));
}

/// Snapshot of the listeners still alive, in subscription order.
fn live(listeners: &RwLock<Listeners>) -> Vec<Arc<dyn DocumentChangeListener>> {
    match listeners.read() {
        Ok(guard) => guard.iter().filter_map(Weak::upgrade).collect(),
        Err(poisoned) => poisoned.into_inner().iter().filter_map(Weak::upgrade).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<LspDocumentChangeEvent>>,
    }

    impl RecordingListener {
        fn kinds(&self) -> Vec<LspDocumentChangeKind> {
            self.events.lock().unwrap().iter().map(|e| e.kind).collect()
        }
    }

    impl DocumentChangeListener for RecordingListener {
        fn changed(&self, event: &LspDocumentChangeEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn uri() -> Url {
        Url::parse("file:///app/Pages/Index.razor").unwrap()
    }

    fn manager_with_listener() -> (DocumentManager, Arc<RecordingListener>) {
        let manager = DocumentManager::new();
        let listener = Arc::new(RecordingListener::default());
        let dyn_listener: Arc<dyn DocumentChangeListener> = listener.clone();
        manager.subscribe(&dyn_listener);
        (manager, listener)
    }

    #[test]
    fn tracking_first_view_adds_document() {
        let (manager, listener) = manager_with_listener();
        manager.track_document(&uri(), 1, ViewId(1));
        manager.track_document(&uri(), 1, ViewId(2));

        assert_eq!(listener.kinds(), vec![LspDocumentChangeKind::Added]);
        assert_eq!(manager.try_get_document(&uri()).unwrap().version(), 1);
    }

    #[test]
    fn untracking_last_view_removes_document() {
        let (manager, listener) = manager_with_listener();
        manager.track_document(&uri(), 1, ViewId(1));
        manager.track_document(&uri(), 1, ViewId(2));

        manager.untrack_document(&uri(), ViewId(1));
        assert!(manager.try_get_document(&uri()).is_some());

        manager.untrack_document(&uri(), ViewId(2));
        assert!(manager.try_get_document(&uri()).is_none());
        assert_eq!(
            listener.kinds(),
            vec![LspDocumentChangeKind::Added, LspDocumentChangeKind::Removed]
        );
    }

    #[test]
    fn unknown_document_lookup_returns_none() {
        let manager = DocumentManager::new();
        assert!(manager.try_get_document(&uri()).is_none());
        assert!(!manager.update_host_document_version(&uri(), 2));
    }

    #[test]
    fn host_version_updates_are_monotonic() {
        let (manager, listener) = manager_with_listener();
        manager.track_document(&uri(), 5, ViewId(1));

        assert!(manager.update_host_document_version(&uri(), 6));
        assert!(!manager.update_host_document_version(&uri(), 4));

        assert_eq!(manager.try_get_document(&uri()).unwrap().version(), 6);
        assert_eq!(
            listener.kinds(),
            vec![
                LspDocumentChangeKind::Added,
                LspDocumentChangeKind::HostVersionChanged
            ]
        );
    }

    #[test]
    fn host_text_is_recorded_with_version() {
        let manager = DocumentManager::new();
        manager.track_document(&uri(), 1, ViewId(1));
        assert_eq!(manager.try_get_document(&uri()).unwrap().text(), None);

        assert!(manager.update_host_document(&uri(), 2, "@page \"/\""));
        let snapshot = manager.try_get_document(&uri()).unwrap();
        assert_eq!(snapshot.version(), 2);
        assert_eq!(snapshot.text(), Some("@page \"/\""));
    }

    #[test]
    fn virtual_update_raises_event_with_old_and_new_snapshots() {
        let (manager, listener) = manager_with_listener();
        manager.track_document(&uri(), 1, ViewId(1));

        manager
            .update_virtual_document(
                &uri(),
                VirtualDocumentKind::CSharp,
                &[TextChange::insert(0, "class A {}")],
                1,
                UpdateState::default(),
            )
            .unwrap();
        manager
            .update_virtual_document(
                &uri(),
                VirtualDocumentKind::CSharp,
                &[TextChange::new(6, 1, "B")],
                2,
                UpdateState::default(),
            )
            .unwrap();

        let events = listener.events.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.kind, LspDocumentChangeKind::VirtualDocumentChanged);
        assert_eq!(last.virtual_old.as_ref().unwrap().text(), "class A {}");
        assert_eq!(last.virtual_new.as_ref().unwrap().text(), "class B {}");
        assert_eq!(
            last.new
                .as_ref()
                .unwrap()
                .virtual_document(VirtualDocumentKind::CSharp)
                .unwrap()
                .host_document_version(),
            Some(2)
        );
        assert!(
            last.old
                .as_ref()
                .unwrap()
                .virtual_document(VirtualDocumentKind::CSharp)
                .is_some()
        );
    }

    #[test]
    fn refused_update_raises_no_event() {
        let (manager, listener) = manager_with_listener();
        manager.track_document(&uri(), 1, ViewId(1));
        manager
            .update_virtual_document(
                &uri(),
                VirtualDocumentKind::Html,
                &[],
                3,
                UpdateState::default(),
            )
            .unwrap();

        let err = manager
            .update_virtual_document(
                &uri(),
                VirtualDocumentKind::Html,
                &[],
                2,
                UpdateState::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            UpdateVirtualDocumentError::Update(UpdateError::VersionRegression { .. })
        ));
        assert_eq!(listener.kinds().len(), 2);
    }

    struct ReentrantListener {
        manager: Weak<DocumentManager>,
        observed: Mutex<Vec<Option<i32>>>,
    }

    impl DocumentChangeListener for ReentrantListener {
        fn changed(&self, event: &LspDocumentChangeEvent) {
            let Some(manager) = self.manager.upgrade() else {
                return;
            };
            let uri = event.host_uri().unwrap().clone();
            let version = manager.try_get_document(&uri).map(|doc| doc.version());
            self.observed.lock().unwrap().push(version);
        }
    }

    #[test]
    fn listeners_may_call_back_into_manager() {
        let manager = Arc::new(DocumentManager::new());
        let listener = Arc::new(ReentrantListener {
            manager: Arc::downgrade(&manager),
            observed: Mutex::new(Vec::new()),
        });
        let dyn_listener: Arc<dyn DocumentChangeListener> = listener.clone();
        manager.subscribe(&dyn_listener);

        manager.track_document(&uri(), 7, ViewId(1));

        assert_eq!(*listener.observed.lock().unwrap(), vec![Some(7)]);
    }

    #[test]
    fn dropped_listener_is_not_called() {
        let manager = DocumentManager::new();
        {
            let listener: Arc<dyn DocumentChangeListener> = Arc::new(RecordingListener::default());
            manager.subscribe(&listener);
        }
        manager.track_document(&uri(), 1, ViewId(1));
        assert!(manager.try_get_document(&uri()).is_some());
    }

    #[test]
    fn update_leaving_projection_desynchronized_raises_event() {
        let (manager, listener) = manager_with_listener();
        manager.track_document(&uri(), 1, ViewId(1));
        manager
            .update_virtual_document(
                &uri(),
                VirtualDocumentKind::CSharp,
                &[TextChange::insert(0, "abc")],
                1,
                UpdateState::default(),
            )
            .unwrap();

        let err = manager
            .update_virtual_document(
                &uri(),
                VirtualDocumentKind::CSharp,
                &[TextChange::insert(0, "x"), TextChange::insert(1, "y")],
                2,
                UpdateState::previous_was_empty(true),
            )
            .unwrap_err();
        assert_eq!(err, UpdateVirtualDocumentError::Update(UpdateError::Desynchronized));

        let events = listener.events.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.kind, LspDocumentChangeKind::VirtualDocumentDesynchronized);
        let flagged = last.virtual_new.as_ref().unwrap();
        assert!(flagged.is_desynchronized());
        assert_eq!(flagged.kind(), VirtualDocumentKind::CSharp);
        assert_eq!(flagged.host_document_version(), Some(1));
    }

    #[test]
    fn updating_untracked_document_is_reported_not_asserted() {
        let (manager, listener) = manager_with_listener();
        let err = manager
            .try_update_virtual_document(
                &uri(),
                VirtualDocumentKind::Html,
                &[TextChange::insert(0, "<p/>")],
                1,
                UpdateState::default(),
            )
            .unwrap_err();
        assert_eq!(err, UpdateVirtualDocumentError::DocumentNotFound(uri()));
        assert!(listener.kinds().is_empty());
    }

    struct OrderListener {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl DocumentChangeListener for OrderListener {
        fn changed(&self, _event: &LspDocumentChangeEvent) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    #[test]
    fn final_listeners_run_after_all_others() {
        let manager = DocumentManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let listener = |name| -> Arc<dyn DocumentChangeListener> {
            Arc::new(OrderListener {
                name,
                log: log.clone(),
            })
        };
        let waiters = listener("waiters");
        let mirror = listener("mirror");
        let audit = listener("audit");
        manager.subscribe_final(&waiters);
        manager.subscribe(&mirror);
        manager.subscribe(&audit);

        manager.track_document(&uri(), 1, ViewId(1));

        assert_eq!(*log.lock().unwrap(), vec!["mirror", "audit", "waiters"]);
    }

    #[test]
    fn update_errors_describe_themselves() {
        let err = UpdateVirtualDocumentError::from(UpdateError::VersionRegression {
            current: 3,
            requested: 2,
        });
        assert_eq!(
            err.to_string(),
            "update for version 2 is older than current version 3"
        );
        assert_eq!(
            UpdateVirtualDocumentError::DocumentNotFound(uri()).to_string(),
            format!("no tracked document for {}", uri())
        );
    }
}
