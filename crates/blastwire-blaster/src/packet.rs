//! The `xk6:wrpc/blaster` packet record.
//!
//! ```text
//! packet { id: string, payload: list<u8>, mem-burn-mb: u64,
//!          cpu-burn-ms: u64, wait-ms: u64 }
//! ```

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use blastwire_core::codec::Deferred;
use blastwire_core::{Decode, Encode, IncomingStream, RecordDecoder, RecordEncoder, WireResult};

/// One unit of synthetic work sent to a blaster component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub id: String,
    pub payload: Bytes,
    /// Megabytes the component should hold for the duration of the call.
    pub mem_burn_mb: u64,
    /// Milliseconds the component should spin.
    pub cpu_burn_ms: u64,
    /// Milliseconds the component should sleep.
    pub wait_ms: u64,
}

impl Encode for Packet {
    fn encode(self, buf: &mut BytesMut) -> WireResult<Option<Deferred>> {
        Ok(RecordEncoder::new(buf)
            .field("id", self.id)?
            .field("payload", self.payload)?
            .field("mem_burn_mb", self.mem_burn_mb)?
            .field("cpu_burn_ms", self.cpu_burn_ms)?
            .field("wait_ms", self.wait_ms)?
            .finish())
    }
}

#[async_trait]
impl Decode for Packet {
    async fn decode(r: &mut IncomingStream, path: &[u32]) -> WireResult<Self> {
        let mut rec = RecordDecoder::new(r, path);
        Ok(Self {
            id: rec.field("id").await?,
            payload: rec.field("payload").await?,
            mem_burn_mb: rec.field("mem_burn_mb").await?,
            cpu_burn_ms: rec.field("cpu_burn_ms").await?,
            wait_ms: rec.field("wait_ms").await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blastwire_core::codec::encode_to_bytes;

    #[test]
    fn layout_is_field_ordered() {
        let packet = Packet {
            id: "ab".into(),
            payload: Bytes::from_static(b"\x01\x02\x03"),
            mem_burn_mb: 1,
            cpu_burn_ms: 300,
            wait_ms: 0,
        };
        let (bytes, deferred) = encode_to_bytes(packet).unwrap();
        assert!(deferred.is_none());
        assert_eq!(
            &bytes[..],
            &[2, b'a', b'b', 3, 1, 2, 3, 1, 0xac, 0x02, 0][..]
        );
    }

    #[tokio::test]
    async fn decodes_what_it_encodes() {
        use tokio::io::AsyncWriteExt;

        let packet = Packet {
            id: "4e0c".into(),
            payload: Bytes::from_static(b"payload"),
            mem_burn_mb: 64,
            cpu_burn_ms: 5,
            wait_ms: 1_000,
        };
        let (bytes, _) = encode_to_bytes(packet.clone()).unwrap();
        let (w, mut r) = blastwire_core::mem::pipe();
        let mut root = w.index(&[]).unwrap();
        root.write_all(&bytes).await.unwrap();
        root.shutdown().await.unwrap();

        assert_eq!(Packet::decode(&mut r, &[]).await.unwrap(), packet);
    }
}
