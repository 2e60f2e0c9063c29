//! Minimal distinguished-name helpers.
//!
//! The index never needs a full RFC 4514 parser. It only needs the value of
//! the leading relative name (`uid=alice,cn=users,...` -> `alice`) to tell
//! user members of a group apart from nested groups.

/// Value of the first attribute of the leading RDN, with escapes removed.
///
/// Returns `None` for an empty DN or an RDN without `=`. For a multi-valued
/// RDN (`cn=a+uid=b`) the first value wins.
pub fn leading_rdn_value(dn: &str) -> Option<String> {
    let rdn = leading_rdn(dn);
    let (_, value) = split_unescaped(rdn, '=')?;
    let value = match split_unescaped(value, '+') {
        Some((first, _)) => first,
        None => value,
    };
    let value = unescape(value.trim());
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// The leading RDN (everything up to the first unescaped comma).
pub fn leading_rdn(dn: &str) -> &str {
    match split_unescaped(dn, ',') {
        Some((rdn, _)) => rdn,
        None => dn,
    }
}

/// Lower-case a DN for use as a cache key or value.
pub fn normalize(dn: &str) -> String {
    dn.trim().to_lowercase()
}

fn split_unescaped(s: &str, sep: char) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == sep {
            return Some((&s[..idx], &s[idx + sep.len_utf8()..]));
        }
    }
    None
}

fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            // Hex pair (\2C) or a single escaped special character (\,).
            if let Some(byte) = hex_pair(bytes.get(i + 1), bytes.get(i + 2)) {
                out.push(byte);
                i += 3;
                continue;
            }
            out.push(bytes[i + 1]);
            i += 2;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_pair(hi: Option<&u8>, lo: Option<&u8>) -> Option<u8> {
    let hi = (*hi? as char).to_digit(16)?;
    let lo = (*lo? as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}
