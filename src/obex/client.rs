// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! OBEX client session over any async byte stream.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::header::{HeaderSet, BODY, END_OF_BODY, PREFIXED_HEADER_LEN};
use super::packet::{
    read_packet, RequestPacket, ResponseCode, ResponsePacket, ABORT, DISCONNECT, FINAL_BIT, GET,
    MAX_PACKET_SIZE, MIN_PACKET_SIZE, PREFIX_LEN, PUT,
};
use super::ObexError;

const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Client side of one OBEX connection.
///
/// Every exchange is raced against `cancel`; once the token fires all
/// further I/O fails with [`ObexError::Cancelled`].
pub struct ObexClient<T> {
    transport: T,
    local_max: usize,
    max_packet_size: usize,
    connection_id: Option<u32>,
    connected: bool,
    cancel: CancellationToken,
}

impl<T> ObexClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(transport: T, max_packet_size: usize, cancel: CancellationToken) -> Self {
        let local_max = max_packet_size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE);
        Self {
            transport,
            local_max,
            max_packet_size: local_max,
            connection_id: None,
            connected: false,
            cancel,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Packet size agreed with the peer.
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    pub fn connection_id(&self) -> Option<u32> {
        self.connection_id
    }

    /// Send CONNECT and negotiate the packet size.
    ///
    /// Returns the peer's response; the session is only considered
    /// connected when the response code is OK.
    pub async fn connect(&mut self, headers: HeaderSet) -> Result<ResponsePacket, ObexError> {
        let request = RequestPacket::connect(self.local_max as u16, headers);
        let response = self.exchange(request, true).await?;

        if response.code != ResponseCode::OK {
            warn!("OBEX CONNECT refused: {}", response.code);
            return Ok(response);
        }

        let peer_max = response
            .connect
            .map(|p| p.max_packet_size as usize)
            .unwrap_or(MIN_PACKET_SIZE);
        self.max_packet_size = self.local_max.min(peer_max).max(MIN_PACKET_SIZE);
        self.connection_id = response.headers.connection_id();
        self.connected = true;

        debug!(
            "OBEX connected, packet size {} (ours {}, peer {}), connection id {:?}",
            self.max_packet_size, self.local_max, peer_max, self.connection_id
        );
        Ok(response)
    }

    /// Send DISCONNECT if still connected. Safe to call repeatedly.
    pub async fn disconnect(&mut self) -> Result<(), ObexError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;

        if self.cancel.is_cancelled() {
            debug!("Skipping OBEX DISCONNECT, transport already torn down");
            return Ok(());
        }

        let request = RequestPacket::new(DISCONNECT, self.with_connection_id(HeaderSet::new()));
        match tokio::time::timeout(DISCONNECT_TIMEOUT, self.exchange(request, false)).await {
            Ok(Ok(resp)) => debug!("OBEX DISCONNECT answered with {}", resp.code),
            Ok(Err(e)) => debug!("OBEX DISCONNECT failed: {}", e),
            Err(_) => warn!("OBEX DISCONNECT timed out"),
        }
        Ok(())
    }

    /// Shut down the write half of the transport.
    pub async fn close(mut self) -> Result<(), ObexError> {
        self.disconnect().await?;
        self.transport.shutdown().await?;
        Ok(())
    }

    /// Start a PUT operation carrying `headers` in its first packet.
    pub fn put(&mut self, headers: HeaderSet) -> Result<Operation<'_, T>, ObexError> {
        self.begin(PUT, headers)
    }

    /// Start a GET operation carrying `headers` in its first packet.
    pub fn get(&mut self, headers: HeaderSet) -> Result<Operation<'_, T>, ObexError> {
        self.begin(GET, headers)
    }

    fn begin(&mut self, opcode: u8, headers: HeaderSet) -> Result<Operation<'_, T>, ObexError> {
        if !self.connected {
            return Err(ObexError::NotConnected);
        }
        let pending = self.with_connection_id(headers);
        Ok(Operation {
            client: self,
            opcode,
            pending,
            response: HeaderSet::new(),
            code: None,
            body: Vec::new(),
            finished: false,
            done: false,
        })
    }

    fn with_connection_id(&self, mut headers: HeaderSet) -> HeaderSet {
        if let Some(id) = self.connection_id {
            headers.set_connection_id(id);
        }
        headers
    }

    async fn exchange(
        &mut self,
        request: RequestPacket,
        connect_response: bool,
    ) -> Result<ResponsePacket, ObexError> {
        let bytes = request.encode()?;
        if bytes.len() > self.max_packet_size {
            return Err(ObexError::PacketTooLarge {
                size: bytes.len(),
                max: self.max_packet_size,
            });
        }

        let cancel = self.cancel.clone();
        let transport = &mut self.transport;
        let io = async move {
            transport.write_all(&bytes).await?;
            transport.flush().await?;
            read_packet(transport).await
        };

        let raw = tokio::select! {
            _ = cancel.cancelled() => return Err(ObexError::Cancelled),
            result = io => result?,
        };
        ResponsePacket::decode(&raw, connect_response)
    }
}

/// One PUT or GET operation in progress.
///
/// Headers handed to `put`/`get` go out with the first packet. Response
/// headers from every packet are merged, and BODY/END-OF-BODY payloads
/// are accumulated for `take_body`.
pub struct Operation<'a, T> {
    client: &'a mut ObexClient<T>,
    opcode: u8,
    pending: HeaderSet,
    response: HeaderSet,
    code: Option<ResponseCode>,
    body: Vec<u8>,
    finished: bool,
    done: bool,
}

impl<'a, T> Operation<'a, T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Largest body slice that fits in the next request packet.
    pub fn max_body_size(&self) -> usize {
        self.client
            .max_packet_size
            .saturating_sub(PREFIX_LEN + self.pending.encoded_len() + PREFIXED_HEADER_LEN)
    }

    /// Send `data` in one or more non-final packets.
    ///
    /// Stops at the first response other than CONTINUE and returns it.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<ResponseCode, ObexError> {
        if self.done || self.finished {
            return Err(ObexError::OperationFinished);
        }

        let mut rest = data;
        loop {
            let room = self.max_body_size();
            if room == 0 {
                return Err(ObexError::PacketTooLarge {
                    size: self.pending.encoded_len(),
                    max: self.client.max_packet_size,
                });
            }
            let take = rest.len().min(room);
            let fresh = self.client.with_connection_id(HeaderSet::new());
            let mut headers = std::mem::replace(&mut self.pending, fresh);
            headers.set_body(rest[..take].to_vec(), false);
            rest = &rest[take..];

            let code = self.send(self.opcode, headers).await?;
            if code != ResponseCode::CONTINUE {
                self.done = true;
                return Ok(code);
            }
            if rest.is_empty() {
                return Ok(code);
            }
        }
    }

    /// Send the final request packet.
    ///
    /// For PUT this carries an empty END-OF-BODY. For GET, the returned
    /// code is CONTINUE while the peer has more response packets; use
    /// `continue_get` or `read_to_end` to drain them.
    pub async fn finish(&mut self) -> Result<ResponseCode, ObexError> {
        if self.done {
            return self.code.ok_or(ObexError::OperationFinished);
        }
        if self.finished {
            return Err(ObexError::OperationFinished);
        }
        self.finished = true;

        let mut headers = std::mem::take(&mut self.pending);
        if self.opcode == PUT {
            headers.set_body(Vec::new(), true);
        }
        let code = self.send(self.opcode | FINAL_BIT, headers).await?;
        if code != ResponseCode::CONTINUE {
            self.done = true;
        }
        Ok(code)
    }

    /// Ask for the next GET response packet.
    pub async fn continue_get(&mut self) -> Result<ResponseCode, ObexError> {
        if self.done || !self.finished || self.opcode != GET {
            return Err(ObexError::OperationFinished);
        }
        let headers = self.client.with_connection_id(HeaderSet::new());
        let code = self.send(GET | FINAL_BIT, headers).await?;
        if code != ResponseCode::CONTINUE {
            self.done = true;
        }
        Ok(code)
    }

    /// Finish the request and drain every response packet.
    pub async fn read_to_end(&mut self) -> Result<ResponseCode, ObexError> {
        let mut code = if self.finished {
            self.code.ok_or(ObexError::OperationFinished)?
        } else {
            self.finish().await?
        };
        while code == ResponseCode::CONTINUE && !self.done {
            code = self.continue_get().await?;
        }
        Ok(code)
    }

    /// Abort the operation. A no-op when the peer already ended it.
    pub async fn abort(&mut self) -> Result<(), ObexError> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        let headers = self.client.with_connection_id(HeaderSet::new());
        let resp = self
            .client
            .exchange(RequestPacket::new(ABORT, headers), false)
            .await?;
        debug!("OBEX ABORT answered with {}", resp.code);
        Ok(())
    }

    /// Last response code, if any packet has been answered.
    pub fn response_code(&self) -> Option<ResponseCode> {
        self.code
    }

    /// LENGTH header announced by the peer.
    pub fn length(&self) -> Option<u32> {
        self.response.length()
    }

    pub fn response_headers(&self) -> &HeaderSet {
        &self.response
    }

    /// Body bytes received so far.
    pub fn take_body(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.body)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    async fn send(&mut self, opcode: u8, headers: HeaderSet) -> Result<ResponseCode, ObexError> {
        let result = self
            .client
            .exchange(RequestPacket::new(opcode, headers), false)
            .await;
        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        if let Some((chunk, _)) = resp.headers.body() {
            self.body.extend_from_slice(chunk);
        }
        for (id, value) in resp.headers.iter() {
            if id != BODY && id != END_OF_BODY {
                let _ = self.response.set(id, value.clone());
            }
        }
        self.code = Some(resp.code);
        Ok(resp.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obex::packet::ConnectParams;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    async fn reply(server: &mut DuplexStream, resp: ResponsePacket) -> RequestPacket {
        let raw = read_packet(server).await.unwrap();
        let req = RequestPacket::decode(&raw).unwrap();
        server.write_all(&resp.encode().unwrap()).await.unwrap();
        req
    }

    fn connect_ok(max: u16, id: u32) -> ResponsePacket {
        let mut headers = HeaderSet::new();
        headers.set_connection_id(id);
        let mut resp = ResponsePacket::new(ResponseCode::OK, headers);
        resp.connect = Some(ConnectParams::new(max));
        resp
    }

    #[tokio::test]
    async fn test_connect_negotiates_smaller_size() {
        let (client_io, mut server) = tokio::io::duplex(70000);
        let mut client = ObexClient::new(client_io, 65000, CancellationToken::new());

        let peer = tokio::spawn(async move { reply(&mut server, connect_ok(1024, 7)).await });
        let resp = client.connect(HeaderSet::new()).await.unwrap();
        let req = peer.await.unwrap();

        assert_eq!(resp.code, ResponseCode::OK);
        assert_eq!(req.connect.unwrap().max_packet_size, 65000);
        assert_eq!(client.max_packet_size(), 1024);
        assert_eq!(client.connection_id(), Some(7));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_write_chunk_splits_to_packet_size() {
        let (client_io, mut server) = tokio::io::duplex(70000);
        let mut client = ObexClient::new(client_io, 300, CancellationToken::new());

        let peer = tokio::spawn(async move {
            reply(&mut server, connect_ok(300, 1)).await;
            let mut sizes = Vec::new();
            for _ in 0..3 {
                let req = reply(
                    &mut server,
                    ResponsePacket::new(ResponseCode::CONTINUE, HeaderSet::new()),
                )
                .await;
                assert!(!req.is_final());
                sizes.push(req.headers.body().unwrap().0.len());
            }
            sizes
        });

        client.connect(HeaderSet::new()).await.unwrap();
        let mut op = client.put(HeaderSet::new()).unwrap();
        let code = op.write_chunk(&[0u8; 700]).await.unwrap();
        assert_eq!(code, ResponseCode::CONTINUE);

        let sizes = peer.await.unwrap();
        assert_eq!(sizes.iter().sum::<usize>(), 700);
        assert!(sizes.iter().all(|s| *s + 3 + 5 + 3 <= 300));
    }

    #[tokio::test]
    async fn test_refusal_ends_operation() {
        let (client_io, mut server) = tokio::io::duplex(70000);
        let mut client = ObexClient::new(client_io, 65000, CancellationToken::new());

        let peer = tokio::spawn(async move {
            reply(&mut server, connect_ok(65000, 1)).await;
            reply(
                &mut server,
                ResponsePacket::new(ResponseCode::FORBIDDEN, HeaderSet::new()),
            )
            .await;
        });

        client.connect(HeaderSet::new()).await.unwrap();
        let mut op = client.put(HeaderSet::new()).unwrap();
        assert_eq!(op.write_chunk(b"data").await.unwrap(), ResponseCode::FORBIDDEN);
        assert!(op.is_done());
        assert!(matches!(
            op.write_chunk(b"more").await,
            Err(ObexError::OperationFinished)
        ));
        // Abort after a refusal sends nothing.
        op.abort().await.unwrap();
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_get_collects_body_across_packets() {
        let (client_io, mut server) = tokio::io::duplex(70000);
        let mut client = ObexClient::new(client_io, 65000, CancellationToken::new());

        let peer = tokio::spawn(async move {
            reply(&mut server, connect_ok(65000, 1)).await;
            let mut first = HeaderSet::new();
            first.set_length(6);
            first.set_body(b"abc".to_vec(), false);
            let req = reply(&mut server, ResponsePacket::new(ResponseCode::CONTINUE, first)).await;
            assert!(req.is_get() && req.is_final());
            let mut second = HeaderSet::new();
            second.set_body(b"def".to_vec(), true);
            reply(&mut server, ResponsePacket::new(ResponseCode::OK, second)).await;
        });

        client.connect(HeaderSet::new()).await.unwrap();
        let mut op = client.get(HeaderSet::new()).unwrap();
        assert_eq!(op.read_to_end().await.unwrap(), ResponseCode::OK);
        assert_eq!(op.length(), Some(6));
        assert_eq!(op.take_body(), b"abcdef");
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_exchange() {
        let (client_io, _server) = tokio::io::duplex(70000);
        let cancel = CancellationToken::new();
        let mut client = ObexClient::new(client_io, 65000, cancel.clone());

        cancel.cancel();
        let err = client.connect(HeaderSet::new()).await.unwrap_err();
        assert!(matches!(err, ObexError::Cancelled));
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_quiet() {
        let (client_io, mut server) = tokio::io::duplex(70000);
        let mut client = ObexClient::new(client_io, 65000, CancellationToken::new());

        let peer = tokio::spawn(async move {
            reply(&mut server, connect_ok(65000, 3)).await;
            let req = reply(&mut server, ResponsePacket::new(ResponseCode::OK, HeaderSet::new())).await;
            assert_eq!(req.opcode, DISCONNECT);
            assert_eq!(req.headers.connection_id(), Some(3));
        });

        client.connect(HeaderSet::new()).await.unwrap();
        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
        peer.await.unwrap();
    }
}
