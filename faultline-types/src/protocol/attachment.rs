use std::fmt;

/// The different types an attachment can have.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum AttachmentType {
    /// (default) A standard attachment without special meaning.
    Attachment,
    /// A minidump file that creates an error event and is symbolicated.
    Minidump,
    /// A plain-text log file whose tail is extracted into breadcrumbs
    /// during ingestion.
    Log,
}

impl Default for AttachmentType {
    fn default() -> Self {
        Self::Attachment
    }
}

impl AttachmentType {
    /// Gets the string value the collector expects for the attachment type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attachment => "event.attachment",
            Self::Minidump => "event.minidump",
            Self::Log => "event.log",
        }
    }
}

/// Represents an attachment item.
#[derive(Clone, Default, PartialEq)]
pub struct Attachment {
    /// The actual attachment data.
    pub buffer: Vec<u8>,
    /// The filename of the attachment.
    pub filename: String,
    /// The content type of the attachment payload.
    pub content_type: Option<String>,
    /// The special type of this attachment.
    pub ty: Option<AttachmentType>,
}

// Implement Debug manually, otherwise users will be sad when they get a dump
// of decimal encoded bytes to their console.
impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("buffer", &self.buffer.len())
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("type", &self.ty)
            .finish()
    }
}
