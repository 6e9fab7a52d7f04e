//! Text framing of the shavar v2.2 exchanges: the `downloads` request and response,
//! `list` responses, and the `gethash` request/response pair.

use compact_str::CompactString;
use shavar_store::{ChunkKind, PathPrefix, ranges};
use shavar_verifier::{FULL_HASH_LEN, FullHash};

use crate::error::Error;

/// One line of a `downloads` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `n:<seconds>`: don't contact the service again before this many seconds pass.
    Delay(u64),
    /// `i:<list>`: following lines apply to this list.
    List(CompactString),
    /// `u:<url>`: fetch chunk data for the current list from here.
    Redirect(String),
    /// `ad:<ranges>` / `sd:<ranges>`: forget these chunks of the current list.
    Delete { kind: ChunkKind, chunks: Vec<u32> },
    /// A record type this client doesn't handle.
    Unknown(String),
    /// A known record type whose value doesn't parse.
    Malformed { line: String, reason: String },
}

/// Parses a `downloads` response into directives, one per non-empty line, in order.
pub fn parse_downloads_response(body: &str) -> Vec<Directive> {
    body.lines().map(str::trim).filter(|line| !line.is_empty()).map(parse_directive).collect()
}

fn parse_directive(line: &str) -> Directive {
    let Some((tag, value)) = line.split_once(':') else {
        return Directive::Unknown(line.to_string());
    };
    let malformed = |reason: String| Directive::Malformed { line: line.to_string(), reason };

    match tag {
        "n" => match value.parse() {
            Ok(secs) => Directive::Delay(secs),
            Err(e) => malformed(e.to_string()),
        },
        "i" if !value.is_empty() => Directive::List(value.into()),
        "u" if !value.is_empty() => Directive::Redirect(value.to_string()),
        "ad" | "sd" => {
            let kind = if tag == "ad" { ChunkKind::Add } else { ChunkKind::Sub };
            match ranges::expand(value) {
                Ok(chunks) => Directive::Delete { kind, chunks },
                Err(e) => malformed(e.to_string()),
            }
        }
        "i" | "u" => malformed("empty value".to_string()),
        _ => Directive::Unknown(line.to_string()),
    }
}

/// One list's line of a `downloads` request: `<list>;[a:<ranges>][:][s:<ranges>]\n`.
///
/// Either part is omitted when that kind has no chunks, and the separating colon
/// only appears when both are present.
pub fn request_line(list: &str, add_ranges: &str, sub_ranges: &str) -> String {
    let mut line = format!("{list};");
    if !add_ranges.is_empty() {
        line.push_str("a:");
        line.push_str(add_ranges);
    }
    if !sub_ranges.is_empty() {
        if !add_ranges.is_empty() {
            line.push(':');
        }
        line.push_str("s:");
        line.push_str(sub_ranges);
    }
    line.push('\n');
    line
}

/// Parses a `list` response: one list name per line.
pub fn parse_list_response(body: &str) -> Vec<CompactString> {
    body.lines().map(str::trim).filter(|line| !line.is_empty()).map(CompactString::from).collect()
}

/// Builds a `gethash` body for prefixes that all share one length.
///
/// ```text
/// <prefix_len>:<total_len>\n<raw prefix bytes>
/// ```
pub fn gethash_request(prefix_len: usize, prefixes: &[&PathPrefix]) -> Vec<u8> {
    let total = prefix_len * prefixes.len();
    let mut body = format!("{prefix_len}:{total}\n").into_bytes();
    body.reserve(total);
    for prefix in prefixes {
        body.extend_from_slice(prefix.as_bytes());
    }
    body
}

/// Parses a `gethash` response: repeated `<list>:<add_chunk>:<len>\n` headers, each
/// followed by `len` bytes of concatenated 32-byte hashes. An empty body means no
/// full hashes matched.
pub fn parse_gethash_response(body: &[u8]) -> Result<Vec<FullHash>, Error> {
    let malformed = |detail: String| Error::MalformedResponse { what: "gethash", detail };
    let mut hashes = Vec::new();
    let mut pos = 0;

    while pos < body.len() {
        let newline = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| malformed(format!("unterminated header at offset {pos}")))?;
        let header = String::from_utf8_lossy(&body[pos..pos + newline]).trim().to_string();
        pos += newline + 1;
        if header.is_empty() {
            continue;
        }

        let mut fields = header.split(':');
        let (Some(list), Some(add_chunk), Some(len), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed(format!("bad header '{header}'")));
        };
        let add_chunk: u32 =
            add_chunk.parse().map_err(|_| malformed(format!("bad add chunk in '{header}'")))?;
        let len: usize = len.parse().map_err(|_| malformed(format!("bad length in '{header}'")))?;

        if len % FULL_HASH_LEN != 0 {
            return Err(malformed(format!("length {len} is not a multiple of {FULL_HASH_LEN}")));
        }
        let data = body
            .get(pos..)
            .and_then(|rest| rest.get(..len))
            .ok_or_else(|| malformed(format!("'{header}' needs {len} bytes, {} left", body.len() - pos)))?;
        pos += len;

        for chunk in data.chunks_exact(FULL_HASH_LEN) {
            let mut hash = [0u8; FULL_HASH_LEN];
            hash.copy_from_slice(chunk);
            hashes.push(FullHash { list: list.into(), add_chunk, hash });
        }
    }

    Ok(hashes)
}
