//! Host documents: one editor buffer and the virtual documents projected from it.

use std::sync::Arc;

use url::Url;

use super::virtual_document::{
    UpdateError, UpdateState, VirtualDocument, VirtualDocumentKind, VirtualDocumentSnapshot,
};
use crate::text::TextChange;

/// Mutable host document owned by the [`DocumentManager`](super::DocumentManager).
#[derive(Debug, Clone)]
pub struct LspDocument {
    uri: Url,
    version: i32,
    /// Editor buffer content, when the host supplies it.
    text: Option<Arc<str>>,
    /// Sorted by kind: C# before HTML.
    virtual_documents: Vec<VirtualDocument>,
}

impl LspDocument {
    pub fn new(uri: Url, version: i32) -> Self {
        Self {
            uri,
            version,
            text: None,
            virtual_documents: Vec::new(),
        }
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Record a new editor version. Lower versions are refused and the current
    /// one is returned as the error.
    pub fn set_version(&mut self, version: i32) -> Result<(), i32> {
        if version < self.version {
            return Err(self.version);
        }
        self.version = version;
        Ok(())
    }

    pub fn set_text(&mut self, text: impl Into<Arc<str>>) {
        self.text = Some(text.into());
    }

    pub fn virtual_document(&self, kind: VirtualDocumentKind) -> Option<&VirtualDocument> {
        self.virtual_documents.iter().find(|doc| doc.kind() == kind)
    }

    /// Apply an update to the `kind` projection, creating it on first use.
    ///
    /// Returns the previous and the new virtual snapshot.
    pub fn update_virtual_document(
        &mut self,
        kind: VirtualDocumentKind,
        changes: &[TextChange],
        host_document_version: i32,
        state: UpdateState,
    ) -> Result<(Option<VirtualDocumentSnapshot>, VirtualDocumentSnapshot), UpdateError> {
        let index = match self
            .virtual_documents
            .binary_search_by_key(&kind, VirtualDocument::kind)
        {
            Ok(index) => index,
            Err(insert_at) => {
                self.virtual_documents
                    .insert(insert_at, VirtualDocument::new(&self.uri, kind));
                insert_at
            }
        };
        let document = &mut self.virtual_documents[index];
        let old = document
            .current_snapshot()
            .host_document_version()
            .is_some()
            .then(|| document.current_snapshot().clone());
        let new = document.update(changes, host_document_version, state)?;
        Ok((old, new))
    }

    pub fn snapshot(&self) -> LspDocumentSnapshot {
        LspDocumentSnapshot {
            uri: self.uri.clone(),
            version: self.version,
            text: self.text.clone(),
            virtual_documents: self
                .virtual_documents
                .iter()
                .map(|doc| doc.current_snapshot().clone())
                .collect(),
        }
    }
}

/// Immutable view of a host document and its projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LspDocumentSnapshot {
    uri: Url,
    version: i32,
    text: Option<Arc<str>>,
    virtual_documents: Vec<VirtualDocumentSnapshot>,
}

impl LspDocumentSnapshot {
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Razor source text, if the editor has supplied it.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn virtual_documents(&self) -> &[VirtualDocumentSnapshot] {
        &self.virtual_documents
    }

    pub fn virtual_document(&self, kind: VirtualDocumentKind) -> Option<&VirtualDocumentSnapshot> {
        self.virtual_documents.iter().find(|doc| doc.kind() == kind)
    }
}
