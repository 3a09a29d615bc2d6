//! Host and virtual document model.
//!
//! A Razor file tracked by the editor is a host [`LspDocument`]. The Razor
//! language server projects it into generated C# and HTML buffers, which live
//! here as [`VirtualDocument`]s owned by the host. The [`DocumentManager`] is
//! the registry and mutation surface; the [`DocumentSynchronizer`] lets request
//! handlers wait for a projection to catch up with a host version.

pub mod lsp_document;
pub mod manager;
pub mod synchronizer;
pub mod virtual_document;

pub use lsp_document::{LspDocument, LspDocumentSnapshot};
pub use manager::{
    DocumentChangeListener, DocumentManager, LspDocumentChangeEvent, LspDocumentChangeKind,
    UpdateVirtualDocumentError, ViewId,
};
pub use synchronizer::{DocumentSynchronizer, SyncFailure, SyncOutcome};
pub use virtual_document::{
    UpdateError, UpdateState, VirtualDocument, VirtualDocumentKind, VirtualDocumentSnapshot,
    virtual_document_uri,
};

/// File extensions handled as Razor host documents.
const RAZOR_EXTENSIONS: [&str; 2] = ["razor", "cshtml"];

/// Whether a URI or path names a Razor file.
pub fn is_razor_file(path: &str) -> bool {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| RAZOR_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}
