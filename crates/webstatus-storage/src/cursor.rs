//! Opaque pagination tokens and the page contract shared by list calls.
//!
//! A cursor is any serde struct holding what is needed to resume a stable
//! ordering (last-seen sort keys, plus running totals for aggregates). It is
//! JSON-encoded and then base64url-encoded without padding. Cursor structs
//! should be `#[serde(deny_unknown_fields)]` so a token minted for another
//! list shape is rejected as [`StorageError::InvalidCursorFormat`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

pub fn encode_cursor<T: Serialize>(cursor: &T) -> Result<String, StorageError> {
    let json = serde_json::to_vec(cursor)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

pub fn decode_cursor<T: DeserializeOwned>(token: &str) -> Result<T, StorageError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| StorageError::InvalidCursorFormat(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| StorageError::InvalidCursorFormat(e.to_string()))
}

/// Decodes an optional page token.
pub fn decode_page_token<T: DeserializeOwned>(
    token: Option<&str>,
) -> Result<Option<T>, StorageError> {
    token.map(decode_cursor).transpose()
}

/// One page of a list call.
///
/// `next_page_token` is present iff the page is full: more rows may exist.
/// A short page is the last one.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// Builds a page, minting the next token from the last item when
    /// exactly `page_size` items came back.
    pub fn from_rows<C, F>(items: Vec<T>, page_size: usize, cursor_for: F) -> Result<Self, StorageError>
    where
        C: Serialize,
        F: FnOnce(&T) -> C,
    {
        let next_page_token = match items.last() {
            Some(last) if items.len() == page_size => Some(encode_cursor(&cursor_for(last))?),
            _ => None,
        };
        Ok(Page {
            items,
            next_page_token,
        })
    }
}

/// Clamps a requested page size to at least one row, as the SQL LIMIT.
pub fn page_limit(page_size: usize) -> (usize, i64) {
    let size = page_size.max(1);
    (size, i64::try_from(size).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct KeyCursor {
        last_key: String,
        last_id: i64,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct CountCursor {
        last_date: String,
        cumulative: i64,
    }

    #[test]
    fn garbage_is_invalid_cursor() {
        let err = decode_cursor::<KeyCursor>("!!not base64!!").unwrap_err();
        assert!(matches!(err, StorageError::InvalidCursorFormat(_)));

        let not_json = URL_SAFE_NO_PAD.encode(b"plain text");
        let err = decode_cursor::<KeyCursor>(&not_json).unwrap_err();
        assert!(matches!(err, StorageError::InvalidCursorFormat(_)));
    }

    #[test]
    fn cursor_of_another_shape_is_rejected() {
        let token = encode_cursor(&CountCursor {
            last_date: "2024-01-01".into(),
            cumulative: 3,
        })
        .unwrap();
        let err = decode_cursor::<KeyCursor>(&token).unwrap_err();
        assert!(matches!(err, StorageError::InvalidCursorFormat(_)));
    }

    #[test]
    fn tokens_are_url_safe() {
        let token = encode_cursor(&KeyCursor {
            last_key: "???>>>".repeat(10),
            last_id: -1,
        })
        .unwrap();
        assert!(!token.contains('+') && !token.contains('/') && !token.contains('='));
    }

    #[test]
    fn next_token_only_on_full_page() {
        let cursor = |k: &&str| KeyCursor {
            last_key: k.to_string(),
            last_id: 0,
        };
        let full = Page::from_rows(vec!["a", "b"], 2, cursor).unwrap();
        let token = full.next_page_token.unwrap();
        assert_eq!(decode_cursor::<KeyCursor>(&token).unwrap().last_key, "b");

        let short = Page::from_rows(vec!["a"], 2, cursor).unwrap();
        assert!(short.next_page_token.is_none());

        let empty = Page::from_rows(Vec::<&str>::new(), 2, cursor).unwrap();
        assert!(empty.next_page_token.is_none());
    }

    #[test]
    fn missing_token_decodes_to_none() {
        assert_eq!(decode_page_token::<KeyCursor>(None).unwrap(), None);
    }

    #[test]
    fn page_limit_is_at_least_one() {
        assert_eq!(page_limit(0), (1, 1));
        assert_eq!(page_limit(25), (25, 25));
    }

    proptest! {
        #[test]
        fn cursor_round_trips(last_key in ".*", last_id in any::<i64>()) {
            let cursor = KeyCursor { last_key, last_id };
            let token = encode_cursor(&cursor).unwrap();
            prop_assert_eq!(decode_cursor::<KeyCursor>(&token).unwrap(), cursor);
        }
    }
}
