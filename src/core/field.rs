//! Purpose: Decode one length-prefixed UTF-8 string field and cache its text view.
//! Exports: `StringField`.
//! Role: Leaf entity of a string region; built once at load, read by many threads.
//! Invariants: Construction consumes exactly `L + 2` bytes or fails without an entity.
//! Invariants: Payload bytes are fixed at construction; text is decoded at most once.
//! Invariants: Once cached, `text()` returns without taking any lock.
use std::borrow::Cow;
use std::fmt;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use bstr::{BStr, ByteSlice};

use crate::core::entity::{DataSetRef, OffsetEntity};
use crate::core::error::{Error, ErrorKind};
use crate::core::format;
use crate::core::reader::BinaryRead;

pub struct StringField {
    entity: OffsetEntity,
    payload: Box<[u8]>,
    text: OnceLock<Box<str>>,
    // Serializes the first decode so racing callers collapse into one.
    decode_lock: Mutex<()>,
    #[cfg(test)]
    decode_calls: AtomicUsize,
}

impl StringField {
    /// Reads a field from `reader`, which must be positioned at its length prefix.
    ///
    /// On success the reader sits on the first byte after the terminator. On
    /// failure the reader position is unspecified.
    pub fn read<R>(data_set: &DataSetRef, offset: u64, reader: &mut R) -> Result<Self, Error>
    where
        R: BinaryRead + ?Sized,
    {
        let payload = read_payload(reader).map_err(|err| with_context(err, data_set, offset))?;
        Ok(Self::new(data_set.clone(), offset, payload))
    }

    pub fn new(data_set: DataSetRef, offset: u64, payload: impl Into<Box<[u8]>>) -> Self {
        Self {
            entity: OffsetEntity::new(data_set, offset),
            payload: payload.into(),
            text: OnceLock::new(),
            decode_lock: Mutex::new(()),
            #[cfg(test)]
            decode_calls: AtomicUsize::new(0),
        }
    }

    pub fn entity(&self) -> &OffsetEntity {
        &self.entity
    }

    pub fn data_set(&self) -> &DataSetRef {
        self.entity.data_set()
    }

    pub fn offset(&self) -> u64 {
        self.entity.offset()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Bytes this field occupies on the stream, prefix and terminator included.
    pub fn encoded_len(&self) -> usize {
        format::encoded_len(self.payload.len())
    }

    pub fn is_materialized(&self) -> bool {
        self.text.get().is_some()
    }

    /// Returns the payload as text, decoding and caching it on first use.
    ///
    /// Invalid UTF-8 is reported as `InvalidEncoding` and is never cached, so
    /// every call on a corrupt field fails the same way.
    pub fn text(&self) -> Result<&str, Error> {
        if let Some(text) = self.cached() {
            return Ok(text);
        }

        let _guard = self
            .decode_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(text) = self.cached() {
            return Ok(text);
        }

        let decoded = self.decode()?;
        tracing::trace!(
            data_set = self.data_set().name(),
            offset = self.offset(),
            len = decoded.len(),
            "materialized string field"
        );
        let text: &str = self.text.get_or_init(move || decoded);
        Ok(text)
    }

    /// Returns the cached text if present, otherwise a lossy rendering of the
    /// payload. Never decodes into the cache.
    pub fn lossy_text(&self) -> Cow<'_, str> {
        match self.cached() {
            Some(text) => Cow::Borrowed(text),
            None => self.payload.to_str_lossy(),
        }
    }

    fn cached(&self) -> Option<&str> {
        self.text.get().map(|text| &**text)
    }

    fn decode(&self) -> Result<Box<str>, Error> {
        #[cfg(test)]
        self.decode_calls.fetch_add(1, Ordering::SeqCst);

        match std::str::from_utf8(&self.payload) {
            Ok(text) => Ok(Box::from(text)),
            Err(err) => {
                tracing::warn!(
                    data_set = self.data_set().name(),
                    offset = self.offset(),
                    valid_up_to = err.valid_up_to(),
                    "string field is not valid UTF-8"
                );
                let err = Error::new(ErrorKind::InvalidEncoding)
                    .with_message(format!(
                        "payload is not valid UTF-8 after {} bytes",
                        err.valid_up_to()
                    ))
                    .with_source(err);
                Err(with_context(err, self.data_set(), self.offset()))
            }
        }
    }
}

fn read_payload<R>(reader: &mut R) -> Result<Vec<u8>, Error>
where
    R: BinaryRead + ?Sized,
{
    let declared = reader.read_i16()?;
    let len = format::payload_len(declared)?;
    let payload = reader.read_bytes(len)?;
    reader.read_u8()?;
    Ok(payload)
}

fn with_context(err: Error, data_set: &DataSetRef, offset: u64) -> Error {
    let err = err.with_data_set(data_set.name()).with_offset(offset);
    match data_set.path() {
        Some(path) => err.with_path(path),
        None => err,
    }
}

impl PartialEq for StringField {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity && self.payload == other.payload
    }
}

impl Eq for StringField {}

impl PartialEq<str> for StringField {
    fn eq(&self, other: &str) -> bool {
        *self.payload == *other.as_bytes()
    }
}

impl PartialEq<&str> for StringField {
    fn eq(&self, other: &&str) -> bool {
        *self.payload == *other.as_bytes()
    }
}

impl fmt::Display for StringField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.text() {
            Ok(text) => f.write_str(text),
            Err(_) => f.write_str(&self.lossy_text()),
        }
    }
}

impl fmt::Debug for StringField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringField")
            .field("data_set", &self.data_set().name())
            .field("offset", &self.offset())
            .field("payload", &BStr::new(&self.payload))
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::StringField;
    use crate::core::entity::{DataSetRef, OffsetEntity};
    use std::borrow::Cow;
    use crate::core::error::ErrorKind;
    use crate::core::format::{self, MAX_PAYLOAD_LEN};
    use crate::core::reader::{BinaryRead, FieldReader};
    use std::sync::Barrier;
    use std::sync::atomic::Ordering;
    use std::thread;

    fn data_set() -> DataSetRef {
        DataSetRef::new("test-strings")
    }

    fn encoded(values: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        for value in values {
            format::encode_field(&mut buf, value.as_bytes()).expect("encode");
        }
        buf
    }

    fn decode_calls(field: &StringField) -> usize {
        field.decode_calls.load(Ordering::SeqCst)
    }

    #[test]
    fn example_field_decodes() {
        let bytes = [5, 0, b't', b'e', b's', b't', 0x00];
        let mut reader = FieldReader::new(&bytes[..]);
        let field = StringField::read(&data_set(), 0, &mut reader).expect("read");
        assert_eq!(field.payload(), b"test");
        assert_eq!(field.text().expect("text"), "test");
        assert_eq!(reader.position(), 7);
    }

    #[test]
    fn payload_round_trips_for_many_lengths() {
        let data_set = data_set();
        for n in [0usize, 1, 2, 127, 128, 255, 256, 4096, MAX_PAYLOAD_LEN] {
            let value = "x".repeat(n);
            let bytes = encoded(&[&value]);
            let mut reader = FieldReader::new(&bytes[..]);
            let field = StringField::read(&data_set, 0, &mut reader).expect("read");
            assert_eq!(field.len(), n);
            assert_eq!(field.payload(), value.as_bytes());
            assert_eq!(field.text().expect("text"), value);
            assert_eq!(reader.position() as usize, n + 3);
            assert_eq!(field.encoded_len(), n + 3);
        }
    }

    #[test]
    fn multibyte_text_decodes() {
        let bytes = encoded(&["Nokia Lumia 920 ünïcødé 📱"]);
        let mut reader = FieldReader::new(&bytes[..]);
        let field = StringField::read(&data_set(), 0, &mut reader).expect("read");
        assert_eq!(field.text().expect("text"), "Nokia Lumia 920 ünïcødé 📱");
    }

    #[test]
    fn adjacent_fields_read_back_to_back() {
        let data_set = data_set();
        let bytes = encoded(&["HardwareVendor", "", "Apple"]);
        let mut reader = FieldReader::new(&bytes[..]);

        let first = StringField::read(&data_set, reader.position(), &mut reader).expect("first");
        assert_eq!(reader.position(), 2 + 15);
        let second = StringField::read(&data_set, reader.position(), &mut reader).expect("second");
        assert_eq!(reader.position(), 17 + 3);
        let third = StringField::read(&data_set, reader.position(), &mut reader).expect("third");
        assert_eq!(reader.position() as usize, bytes.len());

        assert_eq!(first.text().expect("text"), "HardwareVendor");
        assert_eq!(first.offset(), 0);
        assert!(second.is_empty());
        assert_eq!(second.offset(), 17);
        assert_eq!(third.text().expect("text"), "Apple");
        assert_eq!(third.offset(), 20);
    }

    #[test]
    fn terminator_value_is_ignored() {
        let bytes = [3, 0, b'o', b'k', 0xEE, 2, 0, b'!', 0];
        let mut reader = FieldReader::new(&bytes[..]);
        let first = StringField::read(&data_set(), 0, &mut reader).expect("first");
        let second = StringField::read(&data_set(), 5, &mut reader).expect("second");
        assert_eq!(first, "ok");
        assert_eq!(second, "!");
    }

    #[test]
    fn non_positive_length_is_malformed() {
        for prefix in [[0u8, 0], [0xFF, 0xFF], [0x00, 0x80]] {
            let mut bytes = prefix.to_vec();
            bytes.extend_from_slice(b"abc\0");
            let mut reader = FieldReader::new(&bytes[..]);
            let err = StringField::read(&data_set(), 12, &mut reader).expect_err("should fail");
            assert_eq!(err.kind(), ErrorKind::MalformedLength);
            assert_eq!(err.offset(), Some(12));
            assert_eq!(err.data_set(), Some("test-strings"));
            assert_eq!(reader.position(), 2);
        }
    }

    #[test]
    fn short_streams_are_truncated() {
        let cases: [&[u8]; 4] = [
            &[],
            &[5],
            &[5, 0, b't', b'e'],
            &[5, 0, b't', b'e', b's', b't'],
        ];
        for bytes in cases {
            let mut reader = FieldReader::new(bytes);
            let err = StringField::read(&data_set(), 3, &mut reader).expect_err("should fail");
            assert_eq!(err.kind(), ErrorKind::Truncated);
            assert_eq!(err.offset(), Some(3));
        }
    }

    #[test]
    fn errors_carry_data_set_path() {
        let data_set = DataSetRef::with_path("names", "/data/names.blob");
        let mut reader = FieldReader::new(&[9u8, 0][..]);
        let err = StringField::read(&data_set, 0, &mut reader).expect_err("should fail");
        assert_eq!(
            err.path().map(|path| path.display().to_string()),
            Some("/data/names.blob".to_string())
        );
    }

    #[test]
    fn repeated_text_returns_same_reference() {
        let field = StringField::new(data_set(), 0, b"Android".to_vec());
        assert!(!field.is_materialized());
        let first = field.text().expect("text");
        let second = field.text().expect("text");
        assert!(std::ptr::eq(first, second));
        assert!(field.is_materialized());
        assert_eq!(decode_calls(&field), 1);
    }

    #[test]
    fn concurrent_first_access_decodes_once() {
        const THREADS: usize = 16;
        let field = StringField::new(data_set(), 0, "Samsung Galaxy S24".as_bytes().to_vec());
        let barrier = Barrier::new(THREADS);

        let addresses = thread::scope(|scope| {
            let handles = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        let text = field.text().expect("text");
                        assert_eq!(text, "Samsung Galaxy S24");
                        text.as_ptr() as usize
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("join"))
                .collect::<Vec<_>>()
        });

        assert_eq!(decode_calls(&field), 1);
        assert!(addresses.iter().all(|addr| *addr == addresses[0]));
    }

    #[test]
    fn invalid_utf8_is_not_cached() {
        let field = StringField::new(data_set(), 40, vec![b'o', b'k', 0xFF, 0xFE]);
        let err = field.text().expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidEncoding);
        assert_eq!(err.offset(), Some(40));
        assert!(!field.is_materialized());

        let err = field.text().expect_err("should fail again");
        assert_eq!(err.kind(), ErrorKind::InvalidEncoding);
        assert_eq!(decode_calls(&field), 2);
        assert_eq!(field.payload(), &[b'o', b'k', 0xFF, 0xFE]);
    }

    #[test]
    fn display_falls_back_to_lossy_text() {
        let valid = StringField::new(data_set(), 0, b"iPhone".to_vec());
        assert_eq!(valid.to_string(), "iPhone");

        let invalid = StringField::new(data_set(), 0, vec![b'a', 0xFF, b'b']);
        assert_eq!(invalid.to_string(), "a\u{FFFD}b");
    }

    #[test]
    fn lossy_text_after_failed_decode_does_not_decode_again() {
        let field = StringField::new(data_set(), 0, vec![b'x', 0xC0, b'y']);
        field.text().expect_err("should fail");
        assert_eq!(field.lossy_text(), "x\u{FFFD}y");
        assert_eq!(decode_calls(&field), 1);

        let valid = StringField::new(data_set(), 0, b"Pixel".to_vec());
        valid.text().expect("text");
        assert!(matches!(valid.lossy_text(), Cow::Borrowed("Pixel")));
        assert_eq!(decode_calls(&valid), 1);
    }

    #[test]
    fn entity_exposes_data_set_and_offset() {
        let shared = data_set();
        let field = StringField::new(shared.clone(), 21, b"Edge".to_vec());
        assert_eq!(field.entity(), &OffsetEntity::new(shared.clone(), 21));
        assert_eq!(field.entity().data_set(), &shared);
        assert_ne!(field.entity(), &OffsetEntity::new(data_set(), 21));
    }

    #[test]
    fn compares_against_str_without_decoding() {
        let field = StringField::new(data_set(), 0, b"Chrome".to_vec());
        assert_eq!(field, "Chrome");
        assert!(field != "Firefox");
        assert!(!field.is_materialized());
    }

    #[test]
    fn equality_requires_same_data_set() {
        let shared = data_set();
        let a = StringField::new(shared.clone(), 4, b"x".to_vec());
        let b = StringField::new(shared, 4, b"x".to_vec());
        let c = StringField::new(data_set(), 4, b"x".to_vec());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn debug_shows_escaped_payload() {
        let field = StringField::new(data_set(), 9, vec![b'h', b'i', 0xFF]);
        let debug = format!("{field:?}");
        assert!(debug.contains("offset: 9"));
        assert!(debug.contains(r#""hi\xff""#));
        assert!(debug.contains("materialized: false"));
    }

    #[test]
    fn fields_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StringField>();
    }
}
