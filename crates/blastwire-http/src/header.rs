use bytes::{Bytes, BytesMut};

use blastwire_core::codec::{Deferred, Encode};
use blastwire_core::{Decode, IncomingStream, WireResult};

use crate::error::{HttpError, HttpResult};

/// Wire form of a header section: names with every value they carry.
pub type Fields = Vec<(String, Vec<Bytes>)>;

/// An HTTP header as a name and a raw byte value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: Bytes,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The value as UTF-8, if it is valid UTF-8.
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// An ordered collection of HTTP headers.
///
/// Preserves insertion order and supports duplicate header names
/// (e.g., multiple `Set-Cookie` headers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<Header>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Bytes>) {
        self.entries.push(Header::new(name, value));
    }

    /// Get the first header value matching `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.entries
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| &h.value)
    }

    /// Like [`get`](HeaderMap::get), as UTF-8.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .and_then(Header::value_str)
    }

    /// Get all header values matching `name` (case-insensitive).
    pub fn get_all(&self, name: &str) -> Vec<&Bytes> {
        self.entries
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| &h.value)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|h| h.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Header> {
        self.entries
    }

    /// Group values by exact name, in order of each name's first appearance.
    pub fn to_fields(&self) -> Fields {
        let mut fields: Fields = Vec::new();
        for header in &self.entries {
            match fields.iter_mut().find(|(name, _)| *name == header.name) {
                Some((_, values)) => values.push(header.value.clone()),
                None => fields.push((header.name.clone(), vec![header.value.clone()])),
            }
        }
        fields
    }

    /// Flatten a header section, keeping every value of every name.
    pub fn from_fields(fields: Fields) -> Self {
        fields
            .into_iter()
            .flat_map(|(name, values)| {
                values
                    .into_iter()
                    .map(move |value| Header::new(name.clone(), value))
            })
            .collect()
    }

    /// Values grouped under lowercase names, as handed back to the host.
    pub fn to_multimap(&self) -> std::collections::BTreeMap<String, Vec<String>> {
        let mut map = std::collections::BTreeMap::<String, Vec<String>>::new();
        for header in &self.entries {
            map.entry(header.name.to_ascii_lowercase())
                .or_default()
                .push(String::from_utf8_lossy(&header.value).into_owned());
        }
        map
    }
}

impl FromIterator<Header> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = Header>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<(String, String)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(n, v)| Header::new(n, v))
                .collect(),
        }
    }
}

impl From<&http::HeaderMap> for HeaderMap {
    fn from(headers: &http::HeaderMap) -> Self {
        headers
            .iter()
            .map(|(name, value)| {
                Header::new(name.as_str(), Bytes::copy_from_slice(value.as_bytes()))
            })
            .collect()
    }
}

impl TryFrom<&HeaderMap> for http::HeaderMap {
    type Error = HttpError;

    fn try_from(headers: &HeaderMap) -> HttpResult<Self> {
        let mut map = http::HeaderMap::with_capacity(headers.len());
        for header in headers.iter() {
            let name = http::HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|_| HttpError::InvalidHeader(header.name.clone()))?;
            let value = http::HeaderValue::from_bytes(&header.value)
                .map_err(|_| HttpError::InvalidHeader(header.name.clone()))?;
            map.append(name, value);
        }
        Ok(map)
    }
}

impl Encode for HeaderMap {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        self.to_fields().encode(buf)
    }
}

#[async_trait::async_trait]
impl Decode for HeaderMap {
    async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self> {
        Ok(Self::from_fields(Fields::decode(r, path).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_map_insert_and_get() {
        let mut map = HeaderMap::new();
        map.insert("Content-Type", "text/html");
        assert_eq!(map.get_str("content-type"), Some("text/html"));
        assert_eq!(map.get("Content-Type").map(|v| &v[..]), Some(&b"text/html"[..]));
        assert!(map.get("X-Missing").is_none());
    }

    #[test]
    fn duplicate_names_group_into_one_field() {
        let mut map = HeaderMap::new();
        map.insert("Set-Cookie", "a=1");
        map.insert("X-A", "1");
        map.insert("Set-Cookie", "b=2");

        let fields = map.to_fields();
        assert_eq!(
            fields,
            vec![
                (
                    "Set-Cookie".to_string(),
                    vec![Bytes::from("a=1"), Bytes::from("b=2")]
                ),
                ("X-A".to_string(), vec![Bytes::from("1")]),
            ]
        );
        assert_eq!(map.get_all("set-cookie").len(), 2);
    }

    #[test]
    fn fields_flatten_without_loss() {
        let fields: Fields = vec![
            ("a".into(), vec![Bytes::from("1"), Bytes::from("2")]),
            ("b".into(), vec![]),
            ("a".into(), vec![Bytes::from("3")]),
        ];
        let map = HeaderMap::from_fields(fields);
        let values: Vec<_> = map.get_all("a").into_iter().cloned().collect();
        assert_eq!(values, vec!["1", "2", "3"]);
        assert!(!map.contains("b"));
    }

    #[test]
    fn multimap_lowercases_names() {
        let mut map = HeaderMap::new();
        map.insert("X-Multi", "1");
        map.insert("x-multi", "2");
        let multi = map.to_multimap();
        assert_eq!(multi["x-multi"], vec!["1", "2"]);
    }

    #[test]
    fn http_crate_conversions() {
        let mut map = HeaderMap::new();
        map.insert("Accept", "*/*");
        map.insert("Accept", "text/plain");
        let converted = http::HeaderMap::try_from(&map).unwrap();
        assert_eq!(converted.get_all("accept").iter().count(), 2);

        let back = HeaderMap::from(&converted);
        assert_eq!(back.get_all("accept").len(), 2);

        let mut bad = HeaderMap::new();
        bad.insert("bad name", "x");
        assert!(matches!(
            http::HeaderMap::try_from(&bad),
            Err(HttpError::InvalidHeader(name)) if name == "bad name"
        ));
    }
}
