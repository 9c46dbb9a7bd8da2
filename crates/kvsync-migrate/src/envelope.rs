use serde_json::Value;
use thiserror::Error;

/// Magic byte identifying a tagged kvsync record.
///
/// JSON text never starts with `0xCF`, so a tagged record can always be told
/// apart from a legacy untagged value by its first byte.
pub const MAGIC_BYTE: u8 = 0xCF;

/// Size of the tagged record header in bytes.
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// A record as it physically lives in a durable backend.
///
/// Binary format of the tagged form (5 bytes overhead):
/// ```text
/// [MAGIC: 0xCF][VERSION: u32 BE][PAYLOAD: JSON]
/// ```
///
/// The untagged form is the bare JSON encoding of the value.
///
/// # Example
///
/// ```
/// use kvsync_migrate::StoredRecord;
/// use serde_json::json;
///
/// let record = StoredRecord::for_version(2, json!({"name": "hello"}));
/// let bytes = record.to_bytes();
///
/// assert!(StoredRecord::bytes_are_tagged(&bytes));
/// let decoded = StoredRecord::from_bytes(&bytes).unwrap();
/// assert_eq!(decoded.version(), 2);
/// assert_eq!(decoded, record);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum StoredRecord {
    /// A raw application value with no version marker (implicitly version 0).
    Untagged(Value),
    /// A value carrying the schema version it was last migrated to.
    Tagged {
        /// Schema version of `value`.
        version: u32,
        /// The application value.
        value: Value,
    },
}

/// Error decoding a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Tagged data is too short to contain a header.
    #[error("data too short for version envelope")]
    TooShort,
    /// The payload is not valid JSON.
    #[error("invalid record payload: {0}")]
    InvalidPayload(String),
}

impl StoredRecord {
    /// Build the stored form for a value at `version`.
    ///
    /// Version 0 needs no tag, so the value is stored raw.
    pub fn for_version(version: u32, value: Value) -> Self {
        if version == 0 {
            Self::Untagged(value)
        } else {
            Self::Tagged { version, value }
        }
    }

    /// The version this record was last migrated to (0 if untagged).
    pub fn version(&self) -> u32 {
        match self {
            Self::Untagged(_) => 0,
            Self::Tagged { version, .. } => *version,
        }
    }

    /// Borrow the application value.
    pub fn value(&self) -> &Value {
        match self {
            Self::Untagged(value) | Self::Tagged { value, .. } => value,
        }
    }

    /// Take the application value, dropping the version marker.
    pub fn into_value(self) -> Value {
        match self {
            Self::Untagged(value) | Self::Tagged { value, .. } => value,
        }
    }

    /// Serialize to the physical byte form.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Untagged(value) => value.to_string().into_bytes(),
            Self::Tagged { version, value } => {
                let payload = value.to_string();
                let mut bytes = Vec::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
                bytes.push(MAGIC_BYTE);
                bytes.extend_from_slice(&version.to_be_bytes());
                bytes.extend_from_slice(payload.as_bytes());
                bytes
            }
        }
    }

    /// Parse the physical byte form.
    pub fn from_bytes(data: &[u8]) -> Result<Self, EnvelopeError> {
        if !Self::bytes_are_tagged(data) {
            let value = serde_json::from_slice(data)
                .map_err(|e| EnvelopeError::InvalidPayload(e.to_string()))?;
            return Ok(Self::Untagged(value));
        }

        let version = Self::peek_version(data)?;
        let value = serde_json::from_slice(&data[ENVELOPE_HEADER_SIZE..])
            .map_err(|e| EnvelopeError::InvalidPayload(e.to_string()))?;
        Ok(Self::Tagged { version, value })
    }

    /// Read the version without decoding the payload.
    pub fn peek_version(data: &[u8]) -> Result<u32, EnvelopeError> {
        if !Self::bytes_are_tagged(data) {
            return Ok(0);
        }
        let header: [u8; 4] = data
            .get(1..ENVELOPE_HEADER_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(EnvelopeError::TooShort)?;
        Ok(u32::from_be_bytes(header))
    }

    /// Returns `true` if this record carries a version tag.
    pub fn is_tagged(&self) -> bool {
        matches!(self, Self::Tagged { .. })
    }

    /// Check if bytes carry a version tag (start with the magic byte).
    pub fn bytes_are_tagged(data: &[u8]) -> bool {
        data.first() == Some(&MAGIC_BYTE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tagged_roundtrip() {
        let original = StoredRecord::for_version(3, json!({"a": [1, 2, 3]}));
        let decoded = StoredRecord::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn version_zero_is_untagged() {
        let record = StoredRecord::for_version(0, json!("plain"));
        assert_eq!(record, StoredRecord::Untagged(json!("plain")));
        assert_eq!(record.to_bytes(), b"\"plain\"");
    }

    #[test]
    fn legacy_json_decodes_as_untagged() {
        let decoded = StoredRecord::from_bytes(br#"{"name":"hello"}"#).unwrap();
        assert_eq!(decoded.version(), 0);
        assert_eq!(decoded.into_value(), json!({"name": "hello"}));
    }

    #[test]
    fn header_size() {
        let bytes = StoredRecord::for_version(1, json!(null)).to_bytes();
        assert_eq!(bytes.len(), ENVELOPE_HEADER_SIZE + "null".len());
        assert_eq!(&bytes[1..5], &1u32.to_be_bytes());
    }

    #[test]
    fn peek_version() {
        let bytes = StoredRecord::for_version(70_000, json!(1)).to_bytes();
        assert_eq!(StoredRecord::peek_version(&bytes).unwrap(), 70_000);
        assert_eq!(StoredRecord::peek_version(b"42").unwrap(), 0);
    }

    #[test]
    fn tag_detection() {
        assert!(StoredRecord::bytes_are_tagged(&[MAGIC_BYTE, 0, 0, 0, 1]));
        assert!(!StoredRecord::bytes_are_tagged(b"{}"));
        assert!(!StoredRecord::bytes_are_tagged(&[]));
    }

    #[test]
    fn record_reports_its_form() {
        assert!(StoredRecord::for_version(3, json!("x")).is_tagged());
        assert!(!StoredRecord::for_version(0, json!("x")).is_tagged());
        let decoded = StoredRecord::from_bytes(&StoredRecord::for_version(1, json!(1)).to_bytes()).unwrap();
        assert!(decoded.is_tagged());
        assert!(!StoredRecord::from_bytes(b"1").unwrap().is_tagged());
    }

    #[test]
    fn error_too_short() {
        assert_eq!(
            StoredRecord::from_bytes(&[MAGIC_BYTE, 0, 1]),
            Err(EnvelopeError::TooShort)
        );
    }

    #[test]
    fn error_invalid_payload() {
        assert!(matches!(
            StoredRecord::from_bytes(b"{not json"),
            Err(EnvelopeError::InvalidPayload(_))
        ));

        let mut bytes = vec![MAGIC_BYTE, 0, 0, 0, 2];
        bytes.extend_from_slice(b"[1,");
        assert!(matches!(
            StoredRecord::from_bytes(&bytes),
            Err(EnvelopeError::InvalidPayload(_))
        ));
    }
}
