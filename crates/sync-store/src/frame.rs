//! `json-row-frame-v1` ("SRF1") binary snapshot payload format (spec §4.6).
//!
//! Layout: 4-byte magic `SRF1`, then repeated frames of a 4-byte big-endian
//! length prefix followed by that many bytes of UTF-8 JSON (one row per
//! frame). The whole byte string is gzip-compressed by the caller; this
//! module only handles the uncompressed frame layer.

use std::io::Write;

use serde_json::Value;
use sync_wire::SyncError;

pub const MAGIC: &[u8; 4] = b"SRF1";

/// Encode rows into an uncompressed SRF1 frame payload.
pub fn encode_frames(rows: &[Value]) -> Result<Vec<u8>, SyncError> {
    let mut buf = Vec::with_capacity(MAGIC.len() + rows.len() * 64);
    buf.extend_from_slice(MAGIC);
    for row in rows {
        let json = serde_json::to_vec(row)
            .map_err(|e| SyncError::SnapshotFormatError(format!("row serialize failed: {e}")))?;
        let len: u32 = json
            .len()
            .try_into()
            .map_err(|_| SyncError::SnapshotRowTooLarge(json.len()))?;
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&json);
    }
    Ok(buf)
}

/// Decode an uncompressed SRF1 frame payload back into rows.
pub fn decode_frames(buf: &[u8]) -> Result<Vec<Value>, SyncError> {
    if buf.len() < MAGIC.len() || &buf[..MAGIC.len()] != MAGIC {
        return Err(SyncError::SnapshotFormatError(
            "missing or invalid SRF1 magic".to_string(),
        ));
    }
    let mut rows = Vec::new();
    let mut pos = MAGIC.len();
    while pos < buf.len() {
        if pos + 4 > buf.len() {
            return Err(SyncError::SnapshotFormatError(
                "truncated frame length prefix".to_string(),
            ));
        }
        let len = u32::from_be_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        if pos + len > buf.len() {
            return Err(SyncError::SnapshotFormatError(
                "truncated frame body".to_string(),
            ));
        }
        let row: Value = serde_json::from_slice(&buf[pos..pos + len])
            .map_err(|e| SyncError::SnapshotFormatError(format!("row deserialize failed: {e}")))?;
        rows.push(row);
        pos += len;
    }
    Ok(rows)
}

/// Encode rows as SRF1 frames, then gzip the whole payload.
pub fn encode_chunk(rows: &[Value]) -> Result<Vec<u8>, SyncError> {
    let frames = encode_frames(rows)?;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&frames)
        .map_err(|e| SyncError::Storage(format!("gzip write failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| SyncError::Storage(format!("gzip finish failed: {e}")))
}

/// Gunzip and decode a chunk body produced by [`encode_chunk`].
pub fn decode_chunk(gz: &[u8]) -> Result<Vec<Value>, SyncError> {
    use std::io::Read;
    let mut decoder = flate2::read::GzDecoder::new(gz);
    let mut frames = Vec::new();
    decoder
        .read_to_end(&mut frames)
        .map_err(|e| SyncError::Storage(format!("gunzip failed: {e}")))?;
    decode_frames(&frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_rows_through_gzip() {
        let rows = vec![json!({"id": "t1", "title": "A"}), json!(null), json!({"n": 1})];
        let chunk = encode_chunk(&rows).unwrap();
        assert!(chunk.len() < 10_000);
        let decoded = decode_chunk(&chunk).unwrap();
        assert_eq!(decoded, rows);
    }

    #[test]
    fn rejects_missing_magic() {
        let err = decode_frames(b"xxxx").unwrap_err();
        assert!(matches!(err, SyncError::SnapshotFormatError(_)));
    }

    #[test]
    fn empty_row_set_still_carries_magic() {
        let chunk = encode_chunk(&[]).unwrap();
        let decoded = decode_chunk(&chunk).unwrap();
        assert!(decoded.is_empty());
    }
}
