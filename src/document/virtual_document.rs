//! Virtual (projected) documents.
//!
//! A virtual document holds the generated C# or HTML text for one host Razor
//! document. It is a mutable container that hands out immutable
//! [`VirtualDocumentSnapshot`]s; every snapshot records the host document
//! version whose edits it reflects.
//!
//! # Desynchronization
//!
//! The Razor server sends incremental changes computed against its own copy of
//! the projected buffer, together with a `previous_was_empty` hint. When that
//! hint disagrees with our buffer, the two copies have diverged. A single
//! change inserted at `(0,0)` is the server re-sending the whole buffer, so it
//! replaces our content. Anything else cannot be repaired locally: the
//! document is flagged desynchronized and refuses incremental edits (and
//! synchronization) until such a full-content update arrives.

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::text::{ChangeOutOfBounds, TextChange, apply_changes};

const LOG_TARGET: &str = "razor_bridge::documents";

/// The language a virtual document is projected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VirtualDocumentKind {
    CSharp,
    Html,
}

impl VirtualDocumentKind {
    pub const ALL: [VirtualDocumentKind; 2] = [VirtualDocumentKind::CSharp, VirtualDocumentKind::Html];

    /// Suffix appended to the host URI path to form the virtual URI.
    pub fn uri_suffix(self) -> &'static str {
        match self {
            VirtualDocumentKind::CSharp => "__virtual.cs",
            VirtualDocumentKind::Html => "__virtual.html",
        }
    }

    /// LSP `languageId` used when opening the document downstream.
    pub fn language_id(self) -> &'static str {
        match self {
            VirtualDocumentKind::CSharp => "csharp",
            VirtualDocumentKind::Html => "html",
        }
    }
}

impl fmt::Display for VirtualDocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VirtualDocumentKind::CSharp => f.write_str("C#"),
            VirtualDocumentKind::Html => f.write_str("HTML"),
        }
    }
}

/// Build the virtual document URI for a host document.
///
/// `file:///p/Index.razor` becomes `file:///p/Index.razor__virtual.cs` for C#.
/// Query and fragment of the host URI are preserved.
pub fn virtual_document_uri(host_uri: &Url, kind: VirtualDocumentKind) -> Url {
    let mut uri = host_uri.clone();
    uri.set_path(&format!("{}{}", host_uri.path(), kind.uri_suffix()));
    uri
}

/// Caller-supplied context for an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateState {
    /// The sender's belief about whether the buffer was empty before this
    /// batch. `None` when the sender does not say.
    pub previous_was_empty: Option<bool>,
}

impl UpdateState {
    pub fn previous_was_empty(previous_was_empty: bool) -> Self {
        Self {
            previous_was_empty: Some(previous_was_empty),
        }
    }
}

/// Why an update was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    /// The update carries a host version older than the current snapshot.
    #[error("update for version {requested} is older than current version {current}")]
    VersionRegression { current: i32, requested: i32 },
    /// Sender and receiver disagree on the buffer content and the batch is not
    /// a full-content update.
    #[error("virtual document is desynchronized")]
    Desynchronized,
    /// A change does not fit the buffer.
    #[error(transparent)]
    ChangeOutOfBounds(#[from] ChangeOutOfBounds),
}

/// Immutable view of a virtual document at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDocumentSnapshot {
    uri: Url,
    kind: VirtualDocumentKind,
    text: Arc<str>,
    host_document_version: Option<i32>,
    desynchronized: bool,
}

impl VirtualDocumentSnapshot {
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn kind(&self) -> VirtualDocumentKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Host version whose edits this snapshot reflects; `None` before the
    /// first update.
    pub fn host_document_version(&self) -> Option<i32> {
        self.host_document_version
    }

    pub fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    /// Whether this snapshot reflects at least `required_version`.
    pub fn satisfies(&self, required_version: i32) -> bool {
        !self.desynchronized
            && self
                .host_document_version
                .is_some_and(|version| version >= required_version)
    }
}

/// Mutable projected buffer.
#[derive(Debug, Clone)]
pub struct VirtualDocument {
    current: VirtualDocumentSnapshot,
}

impl VirtualDocument {
    pub fn new(host_uri: &Url, kind: VirtualDocumentKind) -> Self {
        Self {
            current: VirtualDocumentSnapshot {
                uri: virtual_document_uri(host_uri, kind),
                kind,
                text: Arc::from(""),
                host_document_version: None,
                desynchronized: false,
            },
        }
    }

    pub fn kind(&self) -> VirtualDocumentKind {
        self.current.kind
    }

    pub fn uri(&self) -> &Url {
        &self.current.uri
    }

    pub fn current_snapshot(&self) -> &VirtualDocumentSnapshot {
        &self.current
    }

    /// Apply a batch of incremental changes produced at `host_document_version`.
    ///
    /// An empty batch is a legal update that only advances the version.
    pub fn update(
        &mut self,
        changes: &[TextChange],
        host_document_version: i32,
        state: UpdateState,
    ) -> Result<VirtualDocumentSnapshot, UpdateError> {
        if let Some(current) = self.current.host_document_version
            && host_document_version < current
        {
            log::error!(
                target: LOG_TARGET,
                "Out-of-order update for {}: version {} arrived after {}",
                self.current.uri,
                host_document_version,
                current
            );
            return Err(UpdateError::VersionRegression {
                current,
                requested: host_document_version,
            });
        }

        let new_text = if self.current.desynchronized {
            let Some(text) = full_content(changes, state) else {
                log::debug!(
                    target: LOG_TARGET,
                    "Dropping incremental update {} for desynchronized {}",
                    host_document_version,
                    self.current.uri
                );
                return Err(UpdateError::Desynchronized);
            };
            log::info!(
                target: LOG_TARGET,
                "Full-content update resynchronized {}",
                self.current.uri
            );
            text.to_string()
        } else if state
            .previous_was_empty
            .is_some_and(|was_empty| was_empty != self.current.text.is_empty())
        {
            self.recover_from_mismatch(changes, host_document_version)?
        } else {
            match apply_changes(&self.current.text, changes) {
                Ok(text) => text,
                Err(e) => {
                    log::error!(
                        target: LOG_TARGET,
                        "Change does not fit {} at version {}: {:?}; marking desynchronized",
                        self.current.uri,
                        host_document_version,
                        e
                    );
                    self.current.desynchronized = true;
                    return Err(UpdateError::ChangeOutOfBounds(e));
                }
            }
        };

        self.current = VirtualDocumentSnapshot {
            uri: self.current.uri.clone(),
            kind: self.current.kind,
            text: Arc::from(new_text),
            host_document_version: Some(host_document_version),
            desynchronized: false,
        };
        Ok(self.current.clone())
    }

    fn recover_from_mismatch(
        &mut self,
        changes: &[TextChange],
        host_document_version: i32,
    ) -> Result<String, UpdateError> {
        let buffer_was_empty = self.current.text.is_empty();
        if let [change] = changes
            && change.is_origin_insert()
        {
            log::error!(
                target: LOG_TARGET,
                "Empty/non-empty mismatch on {} at version {} (buffer empty: {}); \
                 replacing whole buffer with the single origin insert",
                self.current.uri,
                host_document_version,
                buffer_was_empty
            );
            return Ok(change.new_text.clone());
        }

        log::error!(
            target: LOG_TARGET,
            "Unrecoverable empty/non-empty mismatch on {} at version {} ({} changes, buffer empty: {}); \
             waiting for a full-content update",
            self.current.uri,
            host_document_version,
            changes.len(),
            buffer_was_empty
        );
        self.current.desynchronized = true;
        Err(UpdateError::Desynchronized)
    }
}

/// The replacement text of a batch that re-sends the whole buffer.
fn full_content(changes: &[TextChange], state: UpdateState) -> Option<&str> {
    match changes {
        [change] if state.previous_was_empty == Some(true) && change.is_origin_insert() => {
            Some(change.new_text.as_str())
        }
        _ => None,
    }
}
