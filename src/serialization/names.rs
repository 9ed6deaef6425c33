//! Reserved keys and marker prefixes of the wire format.

use std::borrow::Cow;

pub const TYPE_KEY: &str = "_type";
pub const URI_KEY: &str = "_uri";
pub const REF_KEY: &str = "_ref";
/// `_type` of a query result envelope.
pub const RESULT_TYPE: &str = "__result__";
/// Payload key of a boxed scalar (`{"_type":"Int32","value":5}`).
pub const BOXED_VALUE_KEY: &str = "value";

const ESCAPE: char = '^';
const RESERVED_LEADING: [char; 4] = ['^', '-', '*', '!'];

/// Leading marker of a key in a delta payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMarker {
    Plain,
    /// `-key` removed dictionary key, `-@id` removed collection item
    Removed,
    /// `!prop` full replace
    Replace,
    /// `*@id` modified collection item
    Modified,
}

impl KeyMarker {
    pub fn prefix(self) -> &'static str {
        match self {
            KeyMarker::Plain => "",
            KeyMarker::Removed => "-",
            KeyMarker::Replace => "!",
            KeyMarker::Modified => "*",
        }
    }
}

/// Prefixes `^` to names whose first character is reserved.
pub fn escape_key(name: &str) -> Cow<'_, str> {
    if name.starts_with(RESERVED_LEADING) {
        Cow::Owned(format!("{}{}", ESCAPE, name))
    } else {
        Cow::Borrowed(name)
    }
}

/// Inverse of [`escape_key`].
pub fn unescape_key(key: &str) -> &str {
    key.strip_prefix(ESCAPE).unwrap_or(key)
}

/// Marker prefix plus escaped name.
pub fn marked_key(marker: KeyMarker, name: &str) -> String {
    format!("{}{}", marker.prefix(), escape_key(name))
}

/// Splits a key into its marker and the unescaped name behind it.
pub fn split_marker(key: &str) -> (KeyMarker, &str) {
    let (marker, rest) = match key.chars().next() {
        Some('-') => (KeyMarker::Removed, &key[1..]),
        Some('!') => (KeyMarker::Replace, &key[1..]),
        Some('*') => (KeyMarker::Modified, &key[1..]),
        _ => (KeyMarker::Plain, key),
    };
    (marker, unescape_key(rest))
}

/// `@id` in `*@id` / `-@id` item markers.
pub fn item_marker_name(name: &str) -> Option<&str> {
    name.strip_prefix('@')
}

#[test]
fn test_reserved_names_round_trip() {
    for name in ["fubu", "^fubu", "-fubu", "*x", "!y", "a-b"] {
        let key = marked_key(KeyMarker::Removed, name);
        assert_eq!(split_marker(&key), (KeyMarker::Removed, name));
        assert_eq!(split_marker(&escape_key(name)), (KeyMarker::Plain, name));
    }
    assert_eq!(marked_key(KeyMarker::Removed, "fubu"), "-fubu");
    assert_eq!(marked_key(KeyMarker::Removed, "^fubu"), "-^^fubu");
}
