//! JSON-lines client for an external mesh gateway.
//!
//! The gateway is a separate process owning the mesh stack (bearer, keys,
//! segmentation). This client writes one request per line and reads one
//! reply per line:
//!
//! ```text
//! -> {"id":7,"op":"cadence_get","params":{"element":"0x1001","app_key":0,"property_id":79}}
//! <- {"id":7,"result":{"property_id":79,"cadence":{...}}}
//! <- {"id":8,"error":"no such element"}
//! ```
//!
//! A reply that arrives after its request already timed out carries a stale
//! id and is discarded when the next request reads the stream. A request
//! that was cut off while being written, or a lost connection, leaves the
//! stream unusable; the next call opens a fresh connection first.

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use super::{
    CadenceSet, CadenceStatus, CallParams, Pacer, PublicationGet, PublicationSet,
    PublicationStatus, SensorDescriptor, TransportClient, TransportError,
};
use crate::logutil::escape_log;
use crate::mesh::{KeyIndex, UnicastAddress};

#[derive(Debug, Serialize)]
struct Request<'a, P> {
    id: u64,
    op: &'a str,
    params: &'a P,
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: u64,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ElementQuery {
    element: UnicastAddress,
    app_key: KeyIndex,
}

#[derive(Debug, Serialize)]
struct CadenceQuery {
    element: UnicastAddress,
    app_key: KeyIndex,
    property_id: u16,
}

pub struct GatewayClient {
    address: String,
    connect_timeout: Duration,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    /// Set while a request is being written and after a connection error.
    broken: bool,
    next_id: u64,
    pacer: Pacer,
}

async fn open(
    address: &str,
    connect_timeout: Duration,
) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf), TransportError> {
    let stream = match timeout(connect_timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(TransportError::Connection(format!(
                "cannot connect to gateway {address}: {e}"
            )))
        }
        Err(_) => return Err(TransportError::Timeout(connect_timeout)),
    };
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();
    Ok((BufReader::new(read_half), write_half))
}

impl GatewayClient {
    pub async fn connect(address: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let (reader, writer) = open(address, connect_timeout).await?;
        info!("Connected to mesh gateway at {}", address);
        Ok(Self {
            address: address.to_string(),
            connect_timeout,
            reader,
            writer,
            broken: false,
            next_id: 1,
            pacer: Pacer::new(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        warn!("Reconnecting to mesh gateway at {} after an incomplete exchange", self.address);
        let (reader, writer) = open(&self.address, self.connect_timeout).await?;
        self.reader = reader;
        self.writer = writer;
        self.broken = false;
        Ok(())
    }

    async fn call<P, R>(&mut self, op: &str, params: &P, call: CallParams) -> Result<R, TransportError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        if self.broken {
            self.reconnect().await?;
        }
        let id = self.next_id;
        self.next_id += 1;
        let mut line = serde_json::to_string(&Request { id, op, params })
            .map_err(|e| TransportError::Protocol(format!("cannot encode {op}: {e}")))?;
        line.push('\n');
        debug!("gateway -> {}", escape_log(line.trim_end()));

        let reader = &mut self.reader;
        let writer = &mut self.writer;
        let broken = &mut self.broken;
        let outcome = self
            .pacer
            .run(call, async move {
                *broken = true;
                writer
                    .write_all(line.as_bytes())
                    .await
                    .map_err(|e| TransportError::Connection(e.to_string()))?;
                *broken = false;
                loop {
                    let mut buf = String::new();
                    let read = reader
                        .read_line(&mut buf)
                        .await
                        .map_err(|e| TransportError::Connection(e.to_string()))?;
                    if read == 0 {
                        return Err(TransportError::Connection(
                            "gateway closed the connection".to_string(),
                        ));
                    }
                    let reply: Reply = match serde_json::from_str(buf.trim()) {
                        Ok(reply) => reply,
                        Err(e) => {
                            warn!("Ignoring malformed gateway line ({}): {}", e, escape_log(&buf));
                            continue;
                        }
                    };
                    if reply.id != id {
                        debug!("Discarding stale gateway reply id={} (waiting for {})", reply.id, id);
                        continue;
                    }
                    return match (reply.result, reply.error) {
                        (_, Some(error)) => Err(TransportError::Remote(error)),
                        (Some(result), None) => Ok(result),
                        (None, None) => Err(TransportError::Protocol(format!(
                            "reply {id} carries neither result nor error"
                        ))),
                    };
                }
            })
            .await;
        if matches!(outcome, Err(TransportError::Connection(_))) {
            self.broken = true;
        }
        serde_json::from_value(outcome?)
            .map_err(|e| TransportError::Protocol(format!("unexpected {op} reply: {e}")))
    }
}

impl TransportClient for GatewayClient {
    async fn get_publication(
        &mut self,
        request: &PublicationGet,
        params: CallParams,
    ) -> Result<PublicationStatus, TransportError> {
        self.call("publication_get", request, params).await
    }

    async fn set_publication(
        &mut self,
        request: &PublicationSet,
        params: CallParams,
    ) -> Result<PublicationStatus, TransportError> {
        self.call("publication_set", request, params).await
    }

    async fn descriptor_get(
        &mut self,
        element: UnicastAddress,
        app_key: KeyIndex,
        params: CallParams,
    ) -> Result<Vec<SensorDescriptor>, TransportError> {
        self.call("descriptor_get", &ElementQuery { element, app_key }, params)
            .await
    }

    async fn cadence_get(
        &mut self,
        element: UnicastAddress,
        app_key: KeyIndex,
        property_id: u16,
        params: CallParams,
    ) -> Result<CadenceStatus, TransportError> {
        let query = CadenceQuery {
            element,
            app_key,
            property_id,
        };
        self.call("cadence_get", &query, params).await
    }

    async fn cadence_set(
        &mut self,
        request: &CadenceSet,
        params: CallParams,
    ) -> Result<CadenceStatus, TransportError> {
        self.call("cadence_set", request, params).await
    }
}
