//! File values carried through a request.
//!
//! Uploaded multipart files are stored under `request.<field>`;
//! action-produced streams under `action.<name>`. Content is buffered on
//! first read so a file can be consumed more than once in a single
//! request.

use once_cell::sync::OnceCell;
use std::sync::Arc;

/// A named binary payload with a lazily resolved MIME type.
#[derive(Clone)]
pub struct FileValue {
    name: String,
    content: Arc<Vec<u8>>,
    mime: Arc<OnceCell<String>>,
}

impl FileValue {
    /// Wrap buffered content under a file name.
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content: Arc::new(content),
            mime: Arc::new(OnceCell::new()),
        }
    }

    /// Original file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffered content. Cloning the handle shares the buffer.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// MIME type guessed from the file name, computed once.
    pub fn mime_type(&self) -> &str {
        self.mime.get_or_init(|| {
            mime_guess::from_path(&self.name).first_or_octet_stream().essence_str().to_string()
        })
    }
}

impl std::fmt::Debug for FileValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileValue")
            .field("name", &self.name)
            .field("len", &self.content.len())
            .finish()
    }
}
