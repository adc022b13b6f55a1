use crate::errors::{Result, SemfileError};

pub const RECORD_LEN: usize = 21;
pub const CONTENT_LEN: usize = RECORD_LEN - 1;
pub const TERMINATOR: u8 = b'\n';

/// One fixed-width message slot of the shared file.
///
/// Text bytes first, zero padding up to byte 19, `\n` at byte 20.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record {
    bytes: [u8; RECORD_LEN],
}

impl Record {
    pub fn encode(text: &str) -> Result<Record> {
        let content = text.as_bytes();
        if content.len() > CONTENT_LEN {
            return Err(SemfileError::Truncation {
                len: content.len(),
                max: CONTENT_LEN,
            });
        }
        if content.iter().any(|&b| b == 0 || b == TERMINATOR) {
            return Err(SemfileError::InvalidContent);
        }
        let mut bytes = [0u8; RECORD_LEN];
        bytes[..content.len()].copy_from_slice(content);
        bytes[CONTENT_LEN] = TERMINATOR;
        Ok(Record { bytes })
    }

    pub fn decode(bytes: &[u8; RECORD_LEN]) -> Result<String> {
        if bytes[CONTENT_LEN] != TERMINATOR {
            return Err(SemfileError::MalformedRecord("missing terminator"));
        }
        let content = &bytes[..CONTENT_LEN];
        let len = content.iter().position(|&b| b == 0).unwrap_or(CONTENT_LEN);
        if content[len..].iter().any(|&b| b != 0) {
            return Err(SemfileError::MalformedRecord("data after padding"));
        }
        String::from_utf8(content[..len].to_vec())
            .map_err(|_| SemfileError::MalformedRecord("content is not UTF-8"))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; RECORD_LEN] {
        &self.bytes
    }

    pub fn text(&self) -> Result<String> {
        Record::decode(&self.bytes)
    }
}
