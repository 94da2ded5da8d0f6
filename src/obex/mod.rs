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

//! OBEX client framing.
//!
//! Only the subset the printing profile needs: CONNECT, DISCONNECT, PUT,
//! GET and ABORT requests with the headers BPP puts on the wire.

mod client;
pub mod header;
pub mod packet;

pub use client::{ObexClient, Operation};
pub use header::{HeaderSet, HeaderValue};
pub use packet::{
    read_packet, ConnectParams, RequestPacket, ResponseCode, ResponsePacket, MAX_PACKET_SIZE,
    MIN_PACKET_SIZE,
};

/// Errors raised by the OBEX layer.
#[derive(Debug, thiserror::Error)]
pub enum ObexError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed packet: {0}")]
    Malformed(String),
    #[error("packet of {size} bytes exceeds maximum of {max}")]
    PacketTooLarge { size: usize, max: usize },
    #[error("OBEX session not connected")]
    NotConnected,
    #[error("transport closed by remote")]
    Disconnected,
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation already finished")]
    OperationFinished,
}

impl ObexError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}
