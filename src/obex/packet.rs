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

//! Packet framing: opcode/response byte, 16-bit big-endian total length,
//! optional CONNECT fields, then headers.

use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::header::HeaderSet;
use super::ObexError;

pub const CONNECT: u8 = 0x80;
pub const DISCONNECT: u8 = 0x81;
pub const PUT: u8 = 0x02;
pub const GET: u8 = 0x03;
pub const ABORT: u8 = 0xFF;
pub const FINAL_BIT: u8 = 0x80;

pub const OBEX_VERSION: u8 = 0x10;

/// Smallest packet size a peer may negotiate.
pub const MIN_PACKET_SIZE: usize = 255;

/// Upper bound on the negotiated packet size.
pub const MAX_PACKET_SIZE: usize = 65000;

/// Opcode/response byte plus length.
pub const PREFIX_LEN: usize = 3;

/// Version, flags and max packet size in CONNECT packets.
const CONNECT_FIELDS_LEN: usize = 4;

/// OBEX response code, final bit included.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(u8);

impl ResponseCode {
    pub const CONTINUE: Self = Self(0x90);
    pub const OK: Self = Self(0xA0);
    pub const BAD_REQUEST: Self = Self(0xC0);
    pub const UNAUTHORIZED: Self = Self(0xC1);
    pub const FORBIDDEN: Self = Self(0xC3);
    pub const NOT_FOUND: Self = Self(0xC4);
    pub const NOT_ACCEPTABLE: Self = Self(0xC6);
    pub const UNSUPPORTED_TYPE: Self = Self(0xCF);
    pub const INTERNAL_ERROR: Self = Self(0xD0);
    pub const SERVICE_UNAVAILABLE: Self = Self(0xD3);

    pub const fn from_u8(code: u8) -> Self {
        Self(code)
    }

    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// CONTINUE or OK; anything else ends the operation.
    pub fn is_accepted(self) -> bool {
        self == Self::CONTINUE || self == Self::OK
    }

    fn name(self) -> &'static str {
        match self {
            Self::CONTINUE => "Continue",
            Self::OK => "OK",
            Self::BAD_REQUEST => "Bad Request",
            Self::UNAUTHORIZED => "Unauthorized",
            Self::FORBIDDEN => "Forbidden",
            Self::NOT_FOUND => "Not Found",
            Self::NOT_ACCEPTABLE => "Not Acceptable",
            Self::UNSUPPORTED_TYPE => "Unsupported Media Type",
            Self::INTERNAL_ERROR => "Internal Server Error",
            Self::SERVICE_UNAVAILABLE => "Service Unavailable",
            _ => "Unknown",
        }
    }
}

impl fmt::Debug for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.0)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Extra fields carried by CONNECT requests and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectParams {
    pub version: u8,
    pub flags: u8,
    pub max_packet_size: u16,
}

impl ConnectParams {
    pub fn new(max_packet_size: u16) -> Self {
        Self {
            version: OBEX_VERSION,
            flags: 0,
            max_packet_size,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        out.push(self.flags);
        out.extend_from_slice(&self.max_packet_size.to_be_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self, ObexError> {
        if bytes.len() < CONNECT_FIELDS_LEN {
            return Err(ObexError::malformed("truncated CONNECT fields"));
        }
        Ok(Self {
            version: bytes[0],
            flags: bytes[1],
            max_packet_size: u16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }
}

/// A request sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPacket {
    pub opcode: u8,
    pub connect: Option<ConnectParams>,
    pub headers: HeaderSet,
}

impl RequestPacket {
    pub fn new(opcode: u8, headers: HeaderSet) -> Self {
        Self {
            opcode,
            connect: None,
            headers,
        }
    }

    pub fn connect(max_packet_size: u16, headers: HeaderSet) -> Self {
        Self {
            opcode: CONNECT,
            connect: Some(ConnectParams::new(max_packet_size)),
            headers,
        }
    }

    pub fn is_final(&self) -> bool {
        self.opcode & FINAL_BIT != 0
    }

    pub fn is_put(&self) -> bool {
        self.opcode & !FINAL_BIT == PUT
    }

    pub fn is_get(&self) -> bool {
        self.opcode & !FINAL_BIT == GET
    }

    pub fn encode(&self) -> Result<Vec<u8>, ObexError> {
        encode_packet(self.opcode, self.connect.as_ref(), &self.headers)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ObexError> {
        let (opcode, body) = split_prefix(bytes)?;
        let (connect, headers) = if opcode == CONNECT {
            let params = ConnectParams::decode(body)?;
            (Some(params), &body[CONNECT_FIELDS_LEN..])
        } else {
            (None, body)
        };
        Ok(Self {
            opcode,
            connect,
            headers: HeaderSet::decode(headers)?,
        })
    }
}

/// A response sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePacket {
    pub code: ResponseCode,
    pub connect: Option<ConnectParams>,
    pub headers: HeaderSet,
}

impl ResponsePacket {
    pub fn new(code: ResponseCode, headers: HeaderSet) -> Self {
        Self {
            code,
            connect: None,
            headers,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ObexError> {
        encode_packet(self.code.as_u8(), self.connect.as_ref(), &self.headers)
    }

    /// Decode a response. CONNECT responses carry extra fields, which the
    /// caller must announce since the response byte alone does not say so.
    pub fn decode(bytes: &[u8], connect_response: bool) -> Result<Self, ObexError> {
        let (code, body) = split_prefix(bytes)?;
        let (connect, headers) = if connect_response {
            let params = ConnectParams::decode(body)?;
            (Some(params), &body[CONNECT_FIELDS_LEN..])
        } else {
            (None, body)
        };
        Ok(Self {
            code: ResponseCode::from_u8(code),
            connect,
            headers: HeaderSet::decode(headers)?,
        })
    }
}

fn encode_packet(
    code: u8,
    connect: Option<&ConnectParams>,
    headers: &HeaderSet,
) -> Result<Vec<u8>, ObexError> {
    let connect_len = if connect.is_some() { CONNECT_FIELDS_LEN } else { 0 };
    let total = PREFIX_LEN + connect_len + headers.encoded_len();
    if total > u16::MAX as usize {
        return Err(ObexError::PacketTooLarge {
            size: total,
            max: u16::MAX as usize,
        });
    }
    let mut out = Vec::with_capacity(total);
    out.push(code);
    out.extend_from_slice(&(total as u16).to_be_bytes());
    if let Some(params) = connect {
        params.encode(&mut out);
    }
    headers.encode(&mut out);
    Ok(out)
}

fn split_prefix(bytes: &[u8]) -> Result<(u8, &[u8]), ObexError> {
    if bytes.len() < PREFIX_LEN {
        return Err(ObexError::malformed("packet shorter than prefix"));
    }
    let len = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
    if len != bytes.len() {
        return Err(ObexError::malformed(format!(
            "declared length {} but got {} bytes",
            len,
            bytes.len()
        )));
    }
    Ok((bytes[0], &bytes[PREFIX_LEN..]))
}

/// Read one complete packet from the transport.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ObexError> {
    let mut prefix = [0u8; PREFIX_LEN];
    if let Err(e) = reader.read_exact(&mut prefix).await {
        return Err(match e.kind() {
            std::io::ErrorKind::UnexpectedEof => ObexError::Disconnected,
            _ => ObexError::Io(e),
        });
    }
    let len = u16::from_be_bytes([prefix[1], prefix[2]]) as usize;
    if len < PREFIX_LEN {
        return Err(ObexError::malformed(format!("packet length {} too small", len)));
    }
    let mut packet = vec![0u8; len];
    packet[..PREFIX_LEN].copy_from_slice(&prefix);
    if let Err(e) = reader.read_exact(&mut packet[PREFIX_LEN..]).await {
        return Err(match e.kind() {
            std::io::ErrorKind::UnexpectedEof => ObexError::Disconnected,
            _ => ObexError::Io(e),
        });
    }
    Ok(packet)
}
