use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, trace};
use uuid::Uuid;

use blastwire_core::config::BlasterConfig;
use blastwire_core::stats::{CallStats, Outcome, StatsSnapshot};
use blastwire_core::{CallContext, Decode, IncomingStream, Invoker, WireError, WireResult, call};

use crate::error::{BlastError, BlastResult};
use crate::packet::Packet;

/// Per-call workload options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BlastOptions {
    pub cpu_burn_ms: u64,
    pub memory_burn_mb: u64,
    pub wait_ms: u64,
    /// Sent as the packet payload when non-empty.
    pub payload: String,
    /// Overrides the client timeout when positive.
    pub timeout_ms: u64,
    /// Merged over the client tags for this call.
    pub tags: BTreeMap<String, String>,
}

impl BlastOptions {
    /// Parse options from a JSON object, as handed over by a scripting host.
    pub fn from_json(json: &str) -> BlastResult<Self> {
        serde_json::from_str(json).map_err(|e| BlastError::InvalidOptions(e.to_string()))
    }

    fn packet(&self, id: String) -> Packet {
        Packet {
            id,
            payload: Bytes::from(self.payload.clone().into_bytes()),
            mem_burn_mb: self.memory_burn_mb,
            cpu_burn_ms: self.cpu_burn_ms,
            wait_ms: self.wait_ms,
        }
    }
}

/// Empty result of `blast`, decoded once the component closes its result
/// stream.
struct Completed;

#[async_trait]
impl Decode for Completed {
    async fn decode(r: &mut IncomingStream, _path: &[u32]) -> WireResult<Self> {
        let mut trailing = [0u8; 1];
        match r.read(&mut trailing).await? {
            0 => Ok(Completed),
            _ => Err(WireError::InvalidValue("unexpected bytes after empty result".into())),
        }
    }
}

/// Invoke `blast` with `packet` and wait for the component to finish.
pub async fn blast(
    cx: &CallContext,
    invoker: &dyn Invoker,
    instance: &str,
    function: &str,
    packet: Packet,
) -> WireResult<()> {
    let Completed = call(cx, invoker, instance, function, packet).await?;
    Ok(())
}

#[derive(Clone)]
pub struct BlasterClient {
    invoker: Arc<dyn Invoker>,
    config: BlasterConfig,
    tags: BTreeMap<String, String>,
    stats: Arc<CallStats>,
}

impl BlasterClient {
    pub fn new(invoker: Arc<dyn Invoker>, config: BlasterConfig) -> Self {
        Self {
            invoker,
            config,
            tags: BTreeMap::new(),
            stats: Arc::new(CallStats::new()),
        }
    }

    /// Builder method: tags attached to every call's log events.
    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn timeout(&self, options: &BlastOptions) -> Duration {
        if options.timeout_ms > 0 {
            Duration::from_millis(options.timeout_ms)
        } else {
            self.config.timeout()
        }
    }

    /// Send one packet with a fresh id.
    pub async fn blast(&self, options: &BlastOptions) -> BlastResult<()> {
        let started = Instant::now();
        let id = Uuid::new_v4().to_string();
        let mut tags = self.tags.clone();
        tags.extend(options.tags.clone());
        trace!(%id, ?tags, "sending blast packet");

        let cx = CallContext::with_timeout(self.timeout(options));
        let packet = options.packet(id.clone());
        let result = blast(
            &cx,
            self.invoker.as_ref(),
            &self.config.instance,
            &self.config.function,
            packet,
        )
        .await;

        match result {
            Ok(()) => {
                self.stats.record(Outcome::Valid, started.elapsed());
                Ok(())
            }
            Err(e) => {
                debug!(%id, ?tags, error = %e, "blast failed");
                self.stats.record(Outcome::TransportError, started.elapsed());
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for BlasterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlasterClient")
            .field("config", &self.config)
            .field("tags", &self.tags)
            .finish()
    }
}

/// [`BlasterClient`] for synchronous hosts.
pub struct BlockingBlasterClient {
    runtime: tokio::runtime::Runtime,
    inner: BlasterClient,
}

impl BlockingBlasterClient {
    pub fn new(invoker: Arc<dyn Invoker>, config: BlasterConfig) -> BlastResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("blastwire-blaster")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            inner: BlasterClient::new(invoker, config),
        })
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats()
    }

    pub fn blast(&self, options: &BlastOptions) -> BlastResult<()> {
        self.runtime.block_on(self.inner.blast(options))
    }
}
