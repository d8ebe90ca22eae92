//! On-disk cache record framing.
//!
//! Layout: `[u32 little-endian total-length][UTF-8 JSON header][raw frame
//! bytes]`, where the length prefix covers header + data combined so a single
//! sized read buffers the whole record. The JSON header is self-delimiting
//! (streaming deserialization finds its end), so no second length field and
//! no manual offset arithmetic is needed. Each record is independently
//! parseable: invalidation is delete-by-filename and a truncated file simply
//! fails to decode.

use std::io::{Read, Write};

use crate::cache::entry::DiskEntryHeader;
use crate::foundation::error::{FrameloomError, FrameloomResult};

/// Sanity cap on a single record so a corrupt length prefix cannot trigger a
/// multi-gigabyte allocation.
const MAX_RECORD_LEN: usize = 512 * 1024 * 1024;

/// Serialize one cache record into `w`.
pub(crate) fn write_record<W: Write>(
    w: &mut W,
    header: &DiskEntryHeader,
    data: &[u8],
) -> FrameloomResult<()> {
    let header_json =
        serde_json::to_vec(header).map_err(|e| FrameloomError::serde(e.to_string()))?;

    let total = header_json.len() + data.len();
    let total = u32::try_from(total)
        .map_err(|_| FrameloomError::validation("cache record exceeds u32 length prefix"))?;

    w.write_all(&total.to_le_bytes())
        .map_err(anyhow::Error::from)?;
    w.write_all(&header_json).map_err(anyhow::Error::from)?;
    w.write_all(data).map_err(anyhow::Error::from)?;
    Ok(())
}

/// Read one cache record from `r`.
///
/// Returns an error for any truncated, oversized or malformed record; the
/// cache manager maps every such error to a miss.
pub(crate) fn read_record<R: Read>(r: &mut R) -> FrameloomResult<(DiskEntryHeader, Vec<u8>)> {
    let mut prefix = [0u8; 4];
    r.read_exact(&mut prefix).map_err(anyhow::Error::from)?;
    let total = u32::from_le_bytes(prefix) as usize;
    if total > MAX_RECORD_LEN {
        return Err(FrameloomError::serde(format!(
            "cache record length {total} exceeds sanity cap"
        )));
    }

    let mut buf = vec![0u8; total];
    r.read_exact(&mut buf).map_err(anyhow::Error::from)?;

    let mut stream = serde_json::Deserializer::from_slice(&buf).into_iter::<DiskEntryHeader>();
    let header = match stream.next() {
        Some(Ok(h)) => h,
        Some(Err(e)) => return Err(FrameloomError::serde(e.to_string())),
        None => return Err(FrameloomError::serde("cache record has no JSON header")),
    };
    let data_start = stream.byte_offset();
    drop(stream);

    Ok((header, buf.split_off(data_start)))
}
