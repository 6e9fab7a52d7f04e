/// Hex lookup table. Store members are written lowercase.
pub const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// Convert hex ASCII character to nibble value (0-15)
#[inline]
pub fn hex_to_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// Render bytes as lowercase hex, two characters per byte.
pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX_CHARS[(b >> 4) as usize] as char);
        out.push(HEX_CHARS[(b & 0x0f) as usize] as char);
    }
    out
}

/// Parse a hex string back into bytes. Returns `None` on odd length or a
/// non-hex character.
pub fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let bytes = s.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }

    bytes
        .chunks_exact(2)
        .map(|pair| Some((hex_to_nibble(pair[0])? << 4) | hex_to_nibble(pair[1])?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_nibble() {
        assert_eq!(hex_to_nibble(b'0'), Some(0));
        assert_eq!(hex_to_nibble(b'9'), Some(9));
        assert_eq!(hex_to_nibble(b'A'), Some(10));
        assert_eq!(hex_to_nibble(b'F'), Some(15));
        assert_eq!(hex_to_nibble(b'a'), Some(10));
        assert_eq!(hex_to_nibble(b'f'), Some(15));
        assert_eq!(hex_to_nibble(b'g'), None);
    }

    #[test]
    fn test_encode_hex() {
        assert_eq!(encode_hex(&[0xAA, 0xBB, 0xCC, 0xDD]), "aabbccdd");
        assert_eq!(encode_hex(&[0x00, 0x0f]), "000f");
        assert_eq!(encode_hex(&[]), "");
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("aabbccdd"), Some(vec![0xAA, 0xBB, 0xCC, 0xDD]));
        assert_eq!(decode_hex("AABB"), Some(vec![0xAA, 0xBB]));
        assert_eq!(decode_hex(""), Some(vec![]));
        assert_eq!(decode_hex("abc"), None);
        assert_eq!(decode_hex("zz"), None);
    }
}
