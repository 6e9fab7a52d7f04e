//! Binary chunk decoding.
//!
//! A chunk body is a run of groups:
//!
//! ```text
//! host key (4) | count N (1) | [add-chunk ref (4), sub only] |
//!     N x ( path prefix (hash_len) | [chunk override (4), sub only, N > 1, not last] )
//! ```
//!
//! Field presence depends on both the chunk kind and the position inside the
//! group, so every read is bounds-checked and a short buffer is an error rather
//! than a silently shorter entry list.

use shavar_store::{ChunkKind, Entry, HostKey, PathPrefix};

use crate::error::ChunkError;

/// Width of a host key.
pub const HOST_KEY_LEN: usize = 4;

/// Widest path prefix a chunk may carry (a full SHA-256 digest).
pub const MAX_HASH_LEN: usize = 32;

/// Decodes one chunk body into entries.
///
/// Entries are attributed to `chunk` for add chunks. For sub chunks they carry the
/// add-chunk they countermand: the per-record override when present, otherwise the
/// group's add-chunk reference. A group with count 0 yields a single host-level
/// entry.
pub fn decode_chunk(
    chunk: u32,
    hash_len: usize,
    kind: ChunkKind,
    data: &[u8],
) -> Result<Vec<Entry>, ChunkError> {
    if hash_len == 0 || hash_len > MAX_HASH_LEN {
        return Err(ChunkError::InvalidHashLen { chunk, hash_len });
    }

    let mut reader = ChunkReader { chunk, data, offset: 0 };
    let mut entries = Vec::new();

    while reader.remaining() > 0 {
        let host_key = HostKey(reader.array("host key")?);
        let count = reader.array::<1>("count")?[0] as usize;
        let group_chunk = match kind {
            ChunkKind::Add => chunk,
            ChunkKind::Sub => u32::from_be_bytes(reader.array("add chunk reference")?),
        };

        if count == 0 {
            entries.push(Entry::new(host_key, PathPrefix::host_level(), group_chunk));
            continue;
        }

        for i in 0..count {
            let prefix = PathPrefix::from(reader.take(hash_len, "path prefix")?);
            let source_chunk = if kind == ChunkKind::Sub && count > 1 && i != count - 1 {
                u32::from_be_bytes(reader.array("chunk override")?)
            } else {
                group_chunk
            };
            entries.push(Entry::new(host_key, prefix, source_chunk));
        }
    }

    Ok(entries)
}

/// One `<a|s>:<chunk>:<hash_len>:<len>` record of a redirect body, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectChunk {
    pub kind: ChunkKind,
    pub number: u32,
    pub hash_len: usize,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectBody {
    pub chunks: Vec<RedirectChunk>,
    /// Headers of records with a type we don't handle. Their data was skipped.
    pub unknown: Vec<String>,
}

/// Splits a redirect body into its length-delimited chunk records and decodes each.
///
/// The whole body is decoded before anything is returned, so a caller applying the
/// result never sees half a redirect.
pub fn parse_redirect_body(body: &[u8]) -> Result<RedirectBody, ChunkError> {
    let mut parsed = RedirectBody::default();
    let mut pos = 0;

    while pos < body.len() {
        let Some(newline) = body[pos..].iter().position(|&b| b == b'\n') else {
            if body[pos..].iter().all(u8::is_ascii_whitespace) {
                break;
            }
            return Err(ChunkError::BadHeader {
                header: String::from_utf8_lossy(&body[pos..]).into_owned(),
            });
        };
        let raw_header = &body[pos..pos + newline];
        pos += newline + 1;

        if raw_header.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let header = RecordHeader::parse(raw_header)?;

        let available = body.len() - pos;
        if available < header.len {
            return Err(ChunkError::Truncated {
                chunk: header.number,
                offset: pos,
                field: "chunk data",
                needed: header.len,
                available,
            });
        }
        let data = &body[pos..pos + header.len];
        pos += header.len;

        match ChunkKind::from_wire_tag(&header.tag) {
            Some(kind) => {
                let entries = decode_chunk(header.number, header.hash_len, kind, data)?;
                parsed.chunks.push(RedirectChunk {
                    kind,
                    number: header.number,
                    hash_len: header.hash_len,
                    entries,
                });
            }
            None => parsed.unknown.push(header.raw),
        }
    }

    Ok(parsed)
}

struct RecordHeader {
    raw: String,
    tag: String,
    number: u32,
    hash_len: usize,
    len: usize,
}

impl RecordHeader {
    fn parse(raw: &[u8]) -> Result<Self, ChunkError> {
        let raw = String::from_utf8_lossy(raw).trim().to_string();
        let bad = || ChunkError::BadHeader { header: raw.clone() };

        let mut fields = raw.split(':');
        let (Some(tag), Some(number), Some(hash_len), Some(len), None) =
            (fields.next(), fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(bad());
        };

        Ok(Self {
            tag: tag.to_string(),
            number: number.parse().map_err(|_| bad())?,
            hash_len: hash_len.parse().map_err(|_| bad())?,
            len: len.parse().map_err(|_| bad())?,
            raw: raw.clone(),
        })
    }
}

struct ChunkReader<'a> {
    chunk: u32,
    data: &'a [u8],
    offset: usize,
}

impl<'a> ChunkReader<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], ChunkError> {
        if self.remaining() < n {
            return Err(ChunkError::Truncated {
                chunk: self.chunk,
                offset: self.offset,
                field,
                needed: n,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], ChunkError> {
        let bytes = self.take(N, field)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}
