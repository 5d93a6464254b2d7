use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::attachment::Attachment;
use super::session::SessionUpdate;
use super::v1::Event;

/// Raised if an envelope cannot be parsed from a given input.
///
/// The envelope is a strict framing format. Any length mismatch, missing
/// delimiter or short header is a hard parse failure, never silently
/// tolerated.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Unexpected end of file.
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// Missing envelope header.
    #[error("missing envelope header")]
    MissingHeader,
    /// The envelope header carries no event id.
    #[error("envelope header is missing an event id")]
    MissingEventId,
    /// Missing item header.
    #[error("missing item header")]
    MissingItemHeader,
    /// Missing newline after header or payload.
    #[error("missing newline after header or payload")]
    MissingNewline,
    /// An item header declares a zero or missing payload length.
    #[error("invalid item payload length")]
    InvalidLength,
    /// Invalid envelope header.
    #[error("invalid envelope header")]
    InvalidHeader(#[source] serde_json::Error),
    /// Invalid item header.
    #[error("invalid item header")]
    InvalidItemHeader(#[source] serde_json::Error),
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    event_id: Option<Uuid>,
}

/// The type of an [`EnvelopeItem`].
///
/// The type tag both frames the payload on the wire and determines the rate
/// limiting category the item is accounted against.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnvelopeItemType {
    /// An error event.
    Event,
    /// A session update.
    Session,
    /// A transaction.
    Transaction,
    /// An attachment.
    Attachment,
    /// Any other item type, passed through verbatim.
    Unknown(String),
}

impl EnvelopeItemType {
    /// Returns the wire name of this item type.
    pub fn as_str(&self) -> &str {
        match self {
            EnvelopeItemType::Event => "event",
            EnvelopeItemType::Session => "session",
            EnvelopeItemType::Transaction => "transaction",
            EnvelopeItemType::Attachment => "attachment",
            EnvelopeItemType::Unknown(other) => other,
        }
    }
}

impl From<String> for EnvelopeItemType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "event" => EnvelopeItemType::Event,
            "session" => EnvelopeItemType::Session,
            "transaction" => EnvelopeItemType::Transaction,
            "attachment" => EnvelopeItemType::Attachment,
            _ => EnvelopeItemType::Unknown(value),
        }
    }
}

impl From<EnvelopeItemType> for String {
    fn from(value: EnvelopeItemType) -> Self {
        value.as_str().to_owned()
    }
}

#[derive(Serialize, Deserialize)]
struct EnvelopeItemHeader {
    r#type: EnvelopeItemType,
    length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
}

/// A single item of an [`Envelope`].
///
/// An item is a typed header plus an opaque byte payload. The header length
/// always matches the payload length exactly.
#[derive(Clone, PartialEq)]
pub struct EnvelopeItem {
    ty: EnvelopeItemType,
    content_type: Option<String>,
    filename: Option<String>,
    payload: Vec<u8>,
}

// Implement Debug manually, otherwise users will be sad when they get a dump
// of decimal encoded payload bytes to their console.
impl std::fmt::Debug for EnvelopeItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeItem")
            .field("type", &self.ty)
            .field("content_type", &self.content_type)
            .field("filename", &self.filename)
            .field("payload", &self.payload.len())
            .finish()
    }
}

impl EnvelopeItem {
    /// Creates a new item from a type and a raw payload.
    pub fn new(ty: EnvelopeItemType, payload: Vec<u8>) -> EnvelopeItem {
        EnvelopeItem {
            ty,
            content_type: None,
            filename: None,
            payload,
        }
    }

    /// Creates a new item carrying a JSON payload.
    pub fn from_json(ty: EnvelopeItemType, payload: Vec<u8>) -> EnvelopeItem {
        EnvelopeItem {
            ty,
            content_type: Some("application/json".into()),
            filename: None,
            payload,
        }
    }

    /// The type of this item.
    pub fn ty(&self) -> &EnvelopeItemType {
        &self.ty
    }

    /// The content type of the payload, if declared.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The filename of the payload, if declared.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// The raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn to_writer<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let header = EnvelopeItemHeader {
            r#type: self.ty.clone(),
            length: Some(self.payload.len()),
            content_type: self.content_type.clone(),
            filename: self.filename.clone(),
        };
        serde_json::to_writer(&mut *writer, &header)?;
        writeln!(writer)?;
        writer.write_all(&self.payload)?;
        writeln!(writer)?;
        Ok(())
    }
}

impl From<Event<'static>> for EnvelopeItem {
    fn from(event: Event<'static>) -> Self {
        let payload = serde_json::to_vec(&event).expect("event serialization is infallible");
        EnvelopeItem::from_json(EnvelopeItemType::Event, payload)
    }
}

impl From<SessionUpdate<'static>> for EnvelopeItem {
    fn from(session: SessionUpdate<'static>) -> Self {
        let payload = serde_json::to_vec(&session).expect("session serialization is infallible");
        EnvelopeItem::from_json(EnvelopeItemType::Session, payload)
    }
}

impl From<Attachment> for EnvelopeItem {
    fn from(attachment: Attachment) -> Self {
        EnvelopeItem {
            ty: EnvelopeItemType::Attachment,
            content_type: attachment.content_type,
            filename: Some(attachment.filename),
            payload: attachment.buffer,
        }
    }
}

/// An Iterator over the items of an Envelope.
#[derive(Clone)]
pub struct EnvelopeItemIter<'s> {
    inner: std::slice::Iter<'s, EnvelopeItem>,
}

impl<'s> Iterator for EnvelopeItemIter<'s> {
    type Item = &'s EnvelopeItem;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// The items contained in an [`Envelope`].
///
/// This may be a vector of [`EnvelopeItem`]s (the standard case) or an
/// opaque binary blob read back from the disk cache.
#[derive(Clone, PartialEq)]
enum Items {
    EnvelopeItems(Vec<EnvelopeItem>),
    Raw(Vec<u8>),
}

impl std::fmt::Debug for Items {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Items::EnvelopeItems(items) => f.debug_tuple("EnvelopeItems").field(items).finish(),
            Items::Raw(bytes) => f.debug_tuple("Raw").field(&bytes.len()).finish(),
        }
    }
}

impl Default for Items {
    fn default() -> Self {
        Self::EnvelopeItems(Default::default())
    }
}

impl Items {
    fn is_empty(&self) -> bool {
        match self {
            Items::EnvelopeItems(items) => items.is_empty(),
            Items::Raw(bytes) => bytes.is_empty(),
        }
    }
}

/// A faultline envelope.
///
/// An envelope is the wire container for ingestion. It holds one logical
/// submission which may span multiple items, some of which are related,
/// such as events and their attachments, while others, such as sessions,
/// are independent.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Envelope {
    event_id: Option<Uuid>,
    items: Items,
}

impl Envelope {
    /// Creates a new empty envelope.
    pub fn new() -> Envelope {
        Default::default()
    }

    /// Adds a new item to the envelope.
    ///
    /// The envelope adopts the event id of the first event item added to it.
    pub fn add_item<I>(&mut self, item: I)
    where
        I: Into<EnvelopeItem>,
    {
        let item = item.into();
        let Items::EnvelopeItems(ref mut items) = self.items else {
            return;
        };
        items.push(item);
    }

    /// Sets the event id recorded in the envelope header.
    pub fn set_event_id(&mut self, event_id: Uuid) {
        self.event_id = Some(event_id);
    }

    /// Creates an [`Iterator`] over all the [`EnvelopeItem`]s.
    ///
    /// An envelope holding raw bytes yields no items.
    pub fn items(&self) -> EnvelopeItemIter {
        let inner = match &self.items {
            Items::EnvelopeItems(items) => items.iter(),
            Items::Raw(_) => [].iter(),
        };

        EnvelopeItemIter { inner }
    }

    /// Returns the envelope's event id, if any.
    pub fn uuid(&self) -> Option<&Uuid> {
        self.event_id.as_ref()
    }

    /// Returns `true` if the envelope carries raw bytes instead of items.
    pub fn is_raw(&self) -> bool {
        matches!(self.items, Items::Raw(_))
    }

    /// Returns the [`Event`] contained in this envelope, if any.
    pub fn event(&self) -> Option<Event<'static>> {
        let Items::EnvelopeItems(ref items) = self.items else {
            return None;
        };

        items.iter().find_map(|item| match item.ty {
            EnvelopeItemType::Event => serde_json::from_slice(&item.payload).ok(),
            _ => None,
        })
    }

    /// Filters the envelope's items based on a predicate and returns a new
    /// envelope containing only the items for which it returned `true`.
    ///
    /// Attachments are additionally dropped when no event item survives, as
    /// they make no sense on their own. `None` is returned when no items
    /// remain. Raw envelopes cannot be inspected and pass unchanged.
    pub fn filter<P>(self, mut predicate: P) -> Option<Self>
    where
        P: FnMut(&EnvelopeItem) -> bool,
    {
        let Items::EnvelopeItems(items) = self.items else {
            return Some(self);
        };

        let mut kept = Vec::new();
        for item in items {
            if predicate(&item) {
                kept.push(item);
            }
        }

        if !kept.iter().any(|item| item.ty == EnvelopeItemType::Event) {
            kept.retain(|item| item.ty != EnvelopeItemType::Attachment);
        }

        if kept.is_empty() {
            None
        } else {
            Some(Envelope {
                event_id: self.event_id,
                items: Items::EnvelopeItems(kept),
            })
        }
    }

    /// Serializes the envelope into the given [`Write`].
    pub fn to_writer<W>(&self, mut writer: W) -> std::io::Result<()>
    where
        W: Write,
    {
        let items = match &self.items {
            Items::Raw(bytes) => return writer.write_all(bytes),
            Items::EnvelopeItems(items) => items,
        };

        // write the headers:
        match self.uuid() {
            Some(uuid) => writeln!(writer, r#"{{"event_id":"{}"}}"#, uuid.as_simple())?,
            _ => writeln!(writer, "{{}}")?,
        }

        // write each item:
        for item in items {
            item.to_writer(&mut writer)?;
        }

        Ok(())
    }

    /// Serializes the envelope into a byte buffer.
    pub fn to_vec(&self) -> std::io::Result<Vec<u8>> {
        let mut vec = Vec::new();
        self.to_writer(&mut vec)?;
        Ok(vec)
    }

    /// Parses an envelope from a slice of bytes.
    ///
    /// The byte-exact framing rules apply: the header line must be present
    /// and carry an event id, every item header must declare a positive
    /// payload length that matches the payload exactly, and payloads are
    /// separated by single newlines with at most one trailing newline at the
    /// end of the buffer.
    pub fn from_slice(slice: &[u8]) -> Result<Envelope, EnvelopeError> {
        if slice.is_empty() {
            return Err(EnvelopeError::UnexpectedEof);
        }

        let header_end = slice
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(EnvelopeError::MissingHeader)?;
        let header: EnvelopeHeader = serde_json::from_slice(&slice[..header_end])
            .map_err(EnvelopeError::InvalidHeader)?;
        let event_id = header.event_id.ok_or(EnvelopeError::MissingEventId)?;

        let items = Self::parse_items(slice, header_end + 1)?;

        Ok(Envelope {
            event_id: Some(event_id),
            items: Items::EnvelopeItems(items),
        })
    }

    /// Creates a new raw envelope from the given buffer.
    ///
    /// The resulting envelope has no `event_id` and the buffer is carried
    /// verbatim; it serializes back byte for byte.
    pub fn from_bytes_raw(bytes: Vec<u8>) -> Envelope {
        Envelope {
            event_id: None,
            items: Items::Raw(bytes),
        }
    }

    /// Parses an envelope from a file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Envelope, EnvelopeError> {
        let bytes = std::fs::read(path).map_err(|_| EnvelopeError::UnexpectedEof)?;
        Envelope::from_slice(&bytes)
    }

    /// Reads an envelope from a file without attempting to parse it.
    pub fn from_path_raw<P: AsRef<Path>>(path: P) -> std::io::Result<Envelope> {
        Ok(Self::from_bytes_raw(std::fs::read(path)?))
    }

    fn parse_items(slice: &[u8], mut offset: usize) -> Result<Vec<EnvelopeItem>, EnvelopeError> {
        let mut items = Vec::new();

        while offset < slice.len() {
            let header_end = slice[offset..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|pos| offset + pos)
                .ok_or(EnvelopeError::MissingItemHeader)?;
            let header: EnvelopeItemHeader = serde_json::from_slice(&slice[offset..header_end])
                .map_err(EnvelopeError::InvalidItemHeader)?;

            let length = match header.length {
                Some(length) if length > 0 => length,
                _ => return Err(EnvelopeError::InvalidLength),
            };

            let payload_start = header_end + 1;
            let payload_end = payload_start
                .checked_add(length)
                .ok_or(EnvelopeError::InvalidLength)?;
            if payload_end > slice.len() {
                return Err(EnvelopeError::UnexpectedEof);
            }

            items.push(EnvelopeItem {
                ty: header.r#type,
                content_type: header.content_type,
                filename: header.filename,
                payload: slice[payload_start..payload_end].to_vec(),
            });

            if payload_end == slice.len() {
                break;
            }

            // Each payload is terminated by a UNIX newline, which doubles as
            // the optional trailing terminator of the whole envelope.
            if slice[payload_end] != b'\n' {
                return Err(EnvelopeError::MissingNewline);
            }
            offset = payload_end + 1;
        }

        Ok(items)
    }
}

impl From<Event<'static>> for Envelope {
    fn from(event: Event<'static>) -> Self {
        let event_id = event.event_id;
        let mut envelope = Envelope {
            event_id: Some(event_id),
            ..Default::default()
        };
        envelope.add_item(EnvelopeItem::from(event));
        envelope
    }
}

impl From<SessionUpdate<'static>> for Envelope {
    fn from(session: SessionUpdate<'static>) -> Self {
        let mut envelope = Envelope::default();
        envelope.add_item(EnvelopeItem::from(session));
        envelope
    }
}
