//! Query-string and form-body encoding
//!
//! Every outbound payload in the flow (the authorization URL query and both
//! token endpoint bodies) is produced by [`encode_query`]. Keys and values
//! are percent-encoded with the RFC 3986 unreserved set, so a space becomes
//! `%20` and a literal `+` becomes `%2B`. [`decode_query`] is the inverse and
//! additionally accepts `+` as a space, which covers what browsers and
//! providers send back.

use std::collections::HashMap;

/// Encodes ordered key/value pairs as `k1=v1&k2=v2`.
///
/// Pair order is preserved. An empty slice yields an empty string.
///
/// # Examples
///
/// ```
/// use loopauth::auth::query::encode_query;
///
/// let encoded = encode_query(&[("scope", "a b"), ("x", "1+1")]);
/// assert_eq!(encoded, "scope=a%20b&x=1%2B1");
/// assert_eq!(encode_query::<&str, &str>(&[]), "");
/// ```
pub fn encode_query<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    pairs
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                urlencoding::encode(k.as_ref()),
                urlencoding::encode(v.as_ref())
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Decodes a query string into a map.
///
/// Each `&`-separated pair is split on its first `=`; a pair without `=`
/// maps to an empty value and pairs with an empty key are skipped.
/// Duplicate keys keep the last occurrence.
pub fn decode_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}
