//! The value envelope carried by every read and write.

use bytes::Bytes;
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::timestamp::Timestamp;

/// Typed payload with an end-to-end keyed checksum and an MVCC timestamp.
///
/// Exactly one of `bytes` / `integer` may be set; integer values
/// participate in atomic increment. The checksum covers `key || payload`,
/// so verification requires the same key the value was written under.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub bytes: Option<Bytes>,
    pub integer: Option<i64>,
    /// CRC-32/IEEE over `key || payload_bytes`. Absent checksum opts out of
    /// verification.
    pub checksum: Option<u32>,
    /// Timestamp of the MVCC version this value was read from. Unset on
    /// writes; the server assigns it.
    pub timestamp: Option<Timestamp>,
}

impl Value {
    /// A byte-payload value with no checksum yet.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: Some(bytes.into()),
            ..Self::default()
        }
    }

    /// An integer-payload value with no checksum yet.
    pub fn from_integer(integer: i64) -> Self {
        Self {
            integer: Some(integer),
            ..Self::default()
        }
    }

    /// Payload bytes as they enter the checksum: raw bytes, or the 8-byte
    /// big-endian form of the integer. `None` when no payload is set.
    fn payload_bytes(&self) -> Option<Bytes> {
        match (&self.bytes, self.integer) {
            (Some(bytes), _) => Some(bytes.clone()),
            (None, Some(integer)) => Some(Bytes::copy_from_slice(&integer.to_be_bytes())),
            (None, None) => None,
        }
    }

    /// True if both payload tags are set, which no well-formed envelope has.
    pub fn is_malformed(&self) -> bool {
        self.bytes.is_some() && self.integer.is_some()
    }

    /// Compute and store the keyed checksum. No-op when one is already set.
    pub fn init_checksum(&mut self, key: &[u8]) {
        if self.checksum.is_none() {
            self.checksum = Some(self.compute_checksum(key));
        }
    }

    /// Recompute the checksum and compare against the stored one.
    ///
    /// An absent checksum passes (verification is opt-in at write time).
    /// A malformed double-payload envelope always fails.
    pub fn verify(&self, key: &[u8]) -> Result<(), Error> {
        if self.is_malformed() {
            return Err(Error::Integrity {
                message: format!(
                    "both bytes and integer payloads set for key {:?}",
                    String::from_utf8_lossy(key)
                ),
            });
        }
        let Some(stored) = self.checksum else {
            return Ok(());
        };
        let computed = self.compute_checksum(key);
        if stored != computed {
            return Err(Error::Integrity {
                message: format!(
                    "invalid checksum ({stored:08x} != {computed:08x}) for key {:?}",
                    String::from_utf8_lossy(key)
                ),
            });
        }
        Ok(())
    }

    fn compute_checksum(&self, key: &[u8]) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(key);
        if let Some(payload) = self.payload_bytes() {
            hasher.update(&payload);
        }
        hasher.finalize()
    }
}

/// Storage-engine view of one MVCC version: a value or a tombstone.
///
/// Produced and consumed by the storage engine; the client only needs the
/// envelope to round-trip through it unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MvccValue {
    /// True for a deletion tombstone; implies `value` is absent.
    pub deleted: bool,
    pub value: Option<Value>,
}

impl MvccValue {
    /// Encode to the compact big-endian binary form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        out.push(self.deleted as u8);
        out.push(self.value.is_some() as u8);
        if let Some(value) = &self.value {
            match &value.bytes {
                Some(bytes) => {
                    out.push(TAG_BYTES);
                    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                    out.extend_from_slice(bytes);
                }
                None => match value.integer {
                    Some(integer) => {
                        out.push(TAG_INTEGER);
                        out.extend_from_slice(&integer.to_be_bytes());
                    }
                    None => out.push(TAG_NONE),
                },
            }
            match value.checksum {
                Some(checksum) => {
                    out.push(1);
                    out.extend_from_slice(&checksum.to_be_bytes());
                }
                None => out.push(0),
            }
            match value.timestamp {
                Some(ts) => {
                    out.push(1);
                    out.extend_from_slice(&ts.wall_time.to_be_bytes());
                    out.extend_from_slice(&ts.logical.to_be_bytes());
                }
                None => out.push(0),
            }
        }
        out
    }

    /// Decode the form produced by [`MvccValue::encode`].
    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let mut offset = 0usize;
        let deleted = read_u8(data, &mut offset)? != 0;
        let has_value = read_u8(data, &mut offset)? != 0;
        if !has_value {
            return Ok(Self {
                deleted,
                value: None,
            });
        }
        if deleted {
            return Err(Error::Integrity {
                message: "tombstone carries a value".to_string(),
            });
        }

        let mut value = Value::default();
        match read_u8(data, &mut offset)? {
            TAG_BYTES => {
                let len = read_u32(data, &mut offset)? as usize;
                if offset + len > data.len() {
                    return Err(short("value bytes"));
                }
                value.bytes = Some(Bytes::copy_from_slice(&data[offset..offset + len]));
                offset += len;
            }
            TAG_INTEGER => {
                value.integer = Some(read_i64(data, &mut offset)?);
            }
            TAG_NONE => {}
            other => {
                return Err(Error::Integrity {
                    message: format!("unknown payload tag {other}"),
                })
            }
        }
        if read_u8(data, &mut offset)? != 0 {
            value.checksum = Some(read_u32(data, &mut offset)?);
        }
        if read_u8(data, &mut offset)? != 0 {
            let wall_time = read_i64(data, &mut offset)?;
            let logical = read_u32(data, &mut offset)? as i32;
            value.timestamp = Some(Timestamp::new(wall_time, logical));
        }
        Ok(Self {
            deleted,
            value: Some(value),
        })
    }
}

const TAG_NONE: u8 = 0;
const TAG_BYTES: u8 = 1;
const TAG_INTEGER: u8 = 2;

fn short(what: &str) -> Error {
    Error::Integrity {
        message: format!("short {what}"),
    }
}

fn read_u8(data: &[u8], offset: &mut usize) -> Result<u8, Error> {
    if *offset + 1 > data.len() {
        return Err(short("u8"));
    }
    let out = data[*offset];
    *offset += 1;
    Ok(out)
}

fn read_u32(data: &[u8], offset: &mut usize) -> Result<u32, Error> {
    if *offset + 4 > data.len() {
        return Err(short("u32"));
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[*offset..*offset + 4]);
    *offset += 4;
    Ok(u32::from_be_bytes(buf))
}

fn read_i64(data: &[u8], offset: &mut usize) -> Result<i64, Error> {
    if *offset + 8 > data.len() {
        return Err(short("i64"));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[*offset..*offset + 8]);
    *offset += 8;
    Ok(i64::from_be_bytes(buf))
}
