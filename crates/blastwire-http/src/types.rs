//! wasi:http value types: method, scheme and error code.
//!
//! Discriminants follow the declaration order of the `wasi:http/types`
//! interface, so they must not be reordered.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::BytesMut;

use blastwire_core::codec::{Deferred, put_discriminant, read_discriminant};
use blastwire_core::{
    Decode, Encode, IncomingStream, RecordDecoder, RecordEncoder, WireError, WireResult,
};

// ── Method ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    /// Any extension method, kept verbatim.
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Connect => "CONNECT",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Patch => "PATCH",
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    /// Exact, case-sensitive match on the standard names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "CONNECT" => Self::Connect,
            "OPTIONS" => Self::Options,
            "TRACE" => Self::Trace,
            "PATCH" => Self::Patch,
            other => Self::Other(other.to_string()),
        })
    }
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(method) => method,
            Err(never) => match never {},
        }
    }
}

impl From<&http::Method> for Method {
    fn from(method: &http::Method) -> Self {
        Self::from(method.as_str())
    }
}

impl Encode for Method {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        let discriminant = match &self {
            Self::Get => 0,
            Self::Head => 1,
            Self::Post => 2,
            Self::Put => 3,
            Self::Delete => 4,
            Self::Connect => 5,
            Self::Options => 6,
            Self::Trace => 7,
            Self::Patch => 8,
            Self::Other(_) => 9,
        };
        put_discriminant(buf, discriminant);
        if let Self::Other(other) = self {
            other.encode(buf)?;
        }
        Ok(None)
    }
}

#[async_trait]
impl Decode for Method {
    async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self> {
        Ok(match read_discriminant(r).await? {
            0 => Self::Get,
            1 => Self::Head,
            2 => Self::Post,
            3 => Self::Put,
            4 => Self::Delete,
            5 => Self::Connect,
            6 => Self::Options,
            7 => Self::Trace,
            8 => Self::Patch,
            9 => Self::Other(String::decode(r, path).await?),
            value => {
                return Err(WireError::UnknownDiscriminant {
                    kind: "method",
                    value,
                });
            }
        })
    }
}

// ── Scheme ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Scheme {
    Http,
    Https,
    Other(String),
}

impl Scheme {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Scheme {
    /// Exact, case-sensitive match on `http` and `https`.
    fn from(s: &str) -> Self {
        match s {
            "http" => Self::Http,
            "https" => Self::Https,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Encode for Scheme {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        match self {
            Self::Http => put_discriminant(buf, 0),
            Self::Https => put_discriminant(buf, 1),
            Self::Other(other) => {
                put_discriminant(buf, 2);
                other.encode(buf)?;
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Decode for Scheme {
    async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self> {
        match read_discriminant(r).await? {
            0 => Ok(Self::Http),
            1 => Ok(Self::Https),
            2 => Ok(Self::Other(String::decode(r, path).await?)),
            value => Err(WireError::UnknownDiscriminant {
                kind: "scheme",
                value,
            }),
        }
    }
}

// ── Error code payloads ─────────────────────────────────────────────

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DnsErrorPayload {
    pub rcode: Option<String>,
    pub info_code: Option<u16>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TlsAlertReceivedPayload {
    pub alert_id: Option<u8>,
    pub alert_message: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldSizePayload {
    pub field_name: Option<String>,
    pub field_size: Option<u32>,
}

/// Implements `Encode`/`Decode` for a record of inline fields.
macro_rules! inline_record {
    ($ty:ident { $($field:ident),+ $(,)? }) => {
        impl Encode for $ty {
            fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
                let Self { $($field),+ } = self;
                let rec = RecordEncoder::new(buf);
                $(let rec = rec.field(stringify!($field), $field)?;)+
                match rec.finish() {
                    None => Ok(None),
                    Some(_) => Err(WireError::UnexpectedDeferred(stringify!($ty))),
                }
            }
        }

        #[async_trait]
        impl Decode for $ty {
            async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self> {
                let mut rec = RecordDecoder::new(r, path);
                Ok(Self {
                    $($field: rec.field(stringify!($field)).await?,)+
                })
            }
        }
    };
}

inline_record!(DnsErrorPayload { rcode, info_code });
inline_record!(TlsAlertReceivedPayload { alert_id, alert_message });
inline_record!(FieldSizePayload { field_name, field_size });

// ── Error code ──────────────────────────────────────────────────────

/// The error a handler returns instead of a response.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    DnsTimeout,
    DnsError(DnsErrorPayload),
    DestinationNotFound,
    DestinationUnavailable,
    DestinationIpProhibited,
    DestinationIpUnroutable,
    ConnectionRefused,
    ConnectionTerminated,
    ConnectionTimeout,
    ConnectionReadTimeout,
    ConnectionWriteTimeout,
    ConnectionLimitReached,
    TlsProtocolError,
    TlsCertificateError,
    TlsAlertReceived(TlsAlertReceivedPayload),
    HttpRequestDenied,
    HttpRequestLengthRequired,
    HttpRequestBodySize(Option<u64>),
    HttpRequestMethodInvalid,
    HttpRequestUriInvalid,
    HttpRequestUriTooLong,
    HttpRequestHeaderSectionSize(Option<u32>),
    HttpRequestHeaderSize(Option<FieldSizePayload>),
    HttpRequestTrailerSectionSize(Option<u32>),
    HttpRequestTrailerSize(FieldSizePayload),
    HttpResponseIncomplete,
    HttpResponseHeaderSectionSize(Option<u32>),
    HttpResponseHeaderSize(FieldSizePayload),
    HttpResponseBodySize(Option<u64>),
    HttpResponseTrailerSectionSize(Option<u32>),
    HttpResponseTrailerSize(FieldSizePayload),
    HttpResponseTransferCoding(Option<String>),
    HttpResponseContentCoding(Option<String>),
    HttpResponseTimeout,
    HttpUpgradeFailed,
    HttpProtocolError,
    LoopDetected,
    ConfigurationError,
    InternalError(Option<String>),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InternalError(Some(message)) => write!(f, "internal error: {message}"),
            Self::DnsError(DnsErrorPayload {
                rcode: Some(rcode), ..
            }) => write!(f, "DNS error: {rcode}"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

impl Encode for ErrorCode {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        macro_rules! tag {
            ($d:expr) => {{
                put_discriminant(buf, $d);
                Ok(None)
            }};
            ($d:expr, $payload:expr) => {{
                put_discriminant(buf, $d);
                $payload.encode(buf)
            }};
        }
        match self {
            Self::DnsTimeout => tag!(0),
            Self::DnsError(p) => tag!(1, p),
            Self::DestinationNotFound => tag!(2),
            Self::DestinationUnavailable => tag!(3),
            Self::DestinationIpProhibited => tag!(4),
            Self::DestinationIpUnroutable => tag!(5),
            Self::ConnectionRefused => tag!(6),
            Self::ConnectionTerminated => tag!(7),
            Self::ConnectionTimeout => tag!(8),
            Self::ConnectionReadTimeout => tag!(9),
            Self::ConnectionWriteTimeout => tag!(10),
            Self::ConnectionLimitReached => tag!(11),
            Self::TlsProtocolError => tag!(12),
            Self::TlsCertificateError => tag!(13),
            Self::TlsAlertReceived(p) => tag!(14, p),
            Self::HttpRequestDenied => tag!(15),
            Self::HttpRequestLengthRequired => tag!(16),
            Self::HttpRequestBodySize(p) => tag!(17, p),
            Self::HttpRequestMethodInvalid => tag!(18),
            Self::HttpRequestUriInvalid => tag!(19),
            Self::HttpRequestUriTooLong => tag!(20),
            Self::HttpRequestHeaderSectionSize(p) => tag!(21, p),
            Self::HttpRequestHeaderSize(p) => tag!(22, p),
            Self::HttpRequestTrailerSectionSize(p) => tag!(23, p),
            Self::HttpRequestTrailerSize(p) => tag!(24, p),
            Self::HttpResponseIncomplete => tag!(25),
            Self::HttpResponseHeaderSectionSize(p) => tag!(26, p),
            Self::HttpResponseHeaderSize(p) => tag!(27, p),
            Self::HttpResponseBodySize(p) => tag!(28, p),
            Self::HttpResponseTrailerSectionSize(p) => tag!(29, p),
            Self::HttpResponseTrailerSize(p) => tag!(30, p),
            Self::HttpResponseTransferCoding(p) => tag!(31, p),
            Self::HttpResponseContentCoding(p) => tag!(32, p),
            Self::HttpResponseTimeout => tag!(33),
            Self::HttpUpgradeFailed => tag!(34),
            Self::HttpProtocolError => tag!(35),
            Self::LoopDetected => tag!(36),
            Self::ConfigurationError => tag!(37),
            Self::InternalError(p) => tag!(38, p),
        }
    }
}

#[async_trait]
impl Decode for ErrorCode {
    async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self> {
        Ok(match read_discriminant(r).await? {
            0 => Self::DnsTimeout,
            1 => Self::DnsError(Decode::decode(r, path).await?),
            2 => Self::DestinationNotFound,
            3 => Self::DestinationUnavailable,
            4 => Self::DestinationIpProhibited,
            5 => Self::DestinationIpUnroutable,
            6 => Self::ConnectionRefused,
            7 => Self::ConnectionTerminated,
            8 => Self::ConnectionTimeout,
            9 => Self::ConnectionReadTimeout,
            10 => Self::ConnectionWriteTimeout,
            11 => Self::ConnectionLimitReached,
            12 => Self::TlsProtocolError,
            13 => Self::TlsCertificateError,
            14 => Self::TlsAlertReceived(Decode::decode(r, path).await?),
            15 => Self::HttpRequestDenied,
            16 => Self::HttpRequestLengthRequired,
            17 => Self::HttpRequestBodySize(Decode::decode(r, path).await?),
            18 => Self::HttpRequestMethodInvalid,
            19 => Self::HttpRequestUriInvalid,
            20 => Self::HttpRequestUriTooLong,
            21 => Self::HttpRequestHeaderSectionSize(Decode::decode(r, path).await?),
            22 => Self::HttpRequestHeaderSize(Decode::decode(r, path).await?),
            23 => Self::HttpRequestTrailerSectionSize(Decode::decode(r, path).await?),
            24 => Self::HttpRequestTrailerSize(Decode::decode(r, path).await?),
            25 => Self::HttpResponseIncomplete,
            26 => Self::HttpResponseHeaderSectionSize(Decode::decode(r, path).await?),
            27 => Self::HttpResponseHeaderSize(Decode::decode(r, path).await?),
            28 => Self::HttpResponseBodySize(Decode::decode(r, path).await?),
            29 => Self::HttpResponseTrailerSectionSize(Decode::decode(r, path).await?),
            30 => Self::HttpResponseTrailerSize(Decode::decode(r, path).await?),
            31 => Self::HttpResponseTransferCoding(Decode::decode(r, path).await?),
            32 => Self::HttpResponseContentCoding(Decode::decode(r, path).await?),
            33 => Self::HttpResponseTimeout,
            34 => Self::HttpUpgradeFailed,
            35 => Self::HttpProtocolError,
            36 => Self::LoopDetected,
            37 => Self::ConfigurationError,
            38 => Self::InternalError(Decode::decode(r, path).await?),
            value => {
                return Err(WireError::UnknownDiscriminant {
                    kind: "error-code",
                    value,
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blastwire_core::codec::encode_to_bytes;
    use blastwire_core::mem;
    use tokio::io::AsyncWriteExt;

    async fn decode_from<T: Decode>(bytes: &[u8]) -> WireResult<T> {
        let (mut w, mut r) = mem::pipe();
        w.write_all(bytes).await?;
        w.shutdown().await?;
        T::decode(&mut r, &[]).await
    }

    #[test]
    fn method_mapping_is_exact() {
        assert_eq!(Method::from("POST"), Method::Post);
        assert_eq!(Method::from("PROPFIND"), Method::Other("PROPFIND".into()));
        assert_eq!(Method::from("get"), Method::Other("get".into()));
        assert_eq!(Method::from(&http::Method::PATCH), Method::Patch);
        assert_eq!(Method::Other("PROPFIND".into()).as_str(), "PROPFIND");
    }

    #[test]
    fn scheme_mapping_is_exact() {
        assert_eq!(Scheme::from("http"), Scheme::Http);
        assert_eq!(Scheme::from("https"), Scheme::Https);
        assert_eq!(Scheme::from("ftp"), Scheme::Other("ftp".into()));
        assert_eq!(Scheme::from("HTTP"), Scheme::Other("HTTP".into()));
    }

    #[test]
    fn discriminants_follow_declaration_order() {
        let (get, _) = encode_to_bytes(Method::Get).unwrap();
        assert_eq!(&get[..], &[0]);
        let (patch, _) = encode_to_bytes(Method::Patch).unwrap();
        assert_eq!(&patch[..], &[8]);
        let (other, _) = encode_to_bytes(Method::Other("PROPFIND".into())).unwrap();
        assert_eq!(&other[..], b"\x09\x08PROPFIND");
        let (ftp, _) = encode_to_bytes(Scheme::Other("ftp".into())).unwrap();
        assert_eq!(&ftp[..], b"\x02\x03ftp");
    }

    #[tokio::test]
    async fn other_method_survives_the_wire() {
        let (bytes, _) = encode_to_bytes(Method::Other("PROPFIND".into())).unwrap();
        let method: Method = decode_from(&bytes).await.unwrap();
        assert_eq!(method.as_str(), "PROPFIND");
    }

    #[tokio::test]
    async fn error_codes_with_payloads() {
        let codes = vec![
            ErrorCode::DnsTimeout,
            ErrorCode::DnsError(DnsErrorPayload {
                rcode: Some("NXDOMAIN".into()),
                info_code: Some(3),
            }),
            ErrorCode::TlsAlertReceived(TlsAlertReceivedPayload {
                alert_id: Some(40),
                alert_message: None,
            }),
            ErrorCode::HttpRequestHeaderSize(Some(FieldSizePayload {
                field_name: Some("cookie".into()),
                field_size: Some(9000),
            })),
            ErrorCode::HttpResponseBodySize(None),
            ErrorCode::InternalError(Some("boom".into())),
        ];
        for code in codes {
            let (bytes, deferred) = encode_to_bytes(code.clone()).unwrap();
            assert!(deferred.is_none());
            assert_eq!(decode_from::<ErrorCode>(&bytes).await.unwrap(), code);
        }
    }

    #[tokio::test]
    async fn unknown_error_code_is_rejected() {
        let err = decode_from::<ErrorCode>(&[39]).await.unwrap_err();
        assert!(matches!(
            err,
            WireError::UnknownDiscriminant {
                kind: "error-code",
                value: 39
            }
        ));
    }

    #[test]
    fn internal_error_displays_its_message() {
        let code = ErrorCode::InternalError(Some("handler panicked".into()));
        assert_eq!(code.to_string(), "internal error: handler panicked");
        assert_eq!(ErrorCode::LoopDetected.to_string(), "LoopDetected");
    }
}
