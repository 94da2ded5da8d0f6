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

//! OBEX headers.
//!
//! The two high bits of a header identifier select its encoding:
//! `00` null-terminated UTF-16BE text, `01` length-prefixed bytes,
//! `10` a single byte, `11` a 4-byte big-endian integer.

use super::ObexError;

pub const NAME: u8 = 0x01;
pub const DESCRIPTION: u8 = 0x05;
pub const TYPE: u8 = 0x42;
pub const TARGET: u8 = 0x46;
pub const BODY: u8 = 0x48;
pub const END_OF_BODY: u8 = 0x49;
pub const WHO: u8 = 0x4A;
pub const APPLICATION_PARAMETER: u8 = 0x4C;
pub const LENGTH: u8 = 0xC3;
pub const CONNECTION_ID: u8 = 0xCB;

const KIND_MASK: u8 = 0xC0;
const KIND_TEXT: u8 = 0x00;
const KIND_BYTES: u8 = 0x40;
const KIND_BYTE: u8 = 0x80;
const KIND_U32: u8 = 0xC0;

/// Size of the identifier plus 16-bit length prefix.
pub const PREFIXED_HEADER_LEN: usize = 3;

/// Value of a single header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Text(String),
    Bytes(Vec<u8>),
    Byte(u8),
    U32(u32),
}

impl HeaderValue {
    fn encoded_len(&self) -> usize {
        match self {
            Self::Text(s) if s.is_empty() => PREFIXED_HEADER_LEN,
            Self::Text(s) => PREFIXED_HEADER_LEN + (s.encode_utf16().count() + 1) * 2,
            Self::Bytes(b) => PREFIXED_HEADER_LEN + b.len(),
            Self::Byte(_) => 2,
            Self::U32(_) => 5,
        }
    }
}

/// Ordered set of headers carried by one packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    headers: Vec<(u8, HeaderValue)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any previous value with the same identifier.
    ///
    /// Fails when the value does not match the encoding implied by `id`.
    pub fn set(&mut self, id: u8, value: HeaderValue) -> Result<(), ObexError> {
        let kind_ok = matches!(
            (id & KIND_MASK, &value),
            (KIND_TEXT, HeaderValue::Text(_))
                | (KIND_BYTES, HeaderValue::Bytes(_))
                | (KIND_BYTE, HeaderValue::Byte(_))
                | (KIND_U32, HeaderValue::U32(_))
        );
        if !kind_ok {
            return Err(ObexError::malformed(format!(
                "header 0x{:02X} cannot hold {:?}",
                id, value
            )));
        }
        self.put(id, value);
        Ok(())
    }

    pub fn set_name(&mut self, name: &str) {
        self.put(NAME, HeaderValue::Text(name.to_string()));
    }

    /// MIME type; OBEX carries it as null-terminated ASCII.
    pub fn set_type(&mut self, mime: &str) {
        let mut bytes = mime.as_bytes().to_vec();
        bytes.push(0);
        self.put(TYPE, HeaderValue::Bytes(bytes));
    }

    pub fn set_target(&mut self, target: &[u8]) {
        self.put(TARGET, HeaderValue::Bytes(target.to_vec()));
    }

    pub fn set_who(&mut self, who: &[u8]) {
        self.put(WHO, HeaderValue::Bytes(who.to_vec()));
    }

    pub fn set_length(&mut self, length: u32) {
        self.put(LENGTH, HeaderValue::U32(length));
    }

    pub fn set_app_param(&mut self, param: Vec<u8>) {
        self.put(APPLICATION_PARAMETER, HeaderValue::Bytes(param));
    }

    pub fn set_body(&mut self, body: Vec<u8>, end: bool) {
        let id = if end { END_OF_BODY } else { BODY };
        self.put(id, HeaderValue::Bytes(body));
    }

    /// Connection ID must be the first header of a request.
    pub fn set_connection_id(&mut self, id: u32) {
        self.headers.retain(|(h, _)| *h != CONNECTION_ID);
        self.headers.insert(0, (CONNECTION_ID, HeaderValue::U32(id)));
    }

    fn put(&mut self, id: u8, value: HeaderValue) {
        match self.headers.iter_mut().find(|(h, _)| *h == id) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((id, value)),
        }
    }

    pub fn get(&self, id: u8) -> Option<&HeaderValue> {
        self.headers.iter().find(|(h, _)| *h == id).map(|(_, v)| v)
    }

    pub fn remove(&mut self, id: u8) -> Option<HeaderValue> {
        let idx = self.headers.iter().position(|(h, _)| *h == id)?;
        Some(self.headers.remove(idx).1)
    }

    pub fn name(&self) -> Option<&str> {
        match self.get(NAME)? {
            HeaderValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> Option<String> {
        match self.get(TYPE)? {
            HeaderValue::Bytes(b) => {
                let trimmed = b.strip_suffix(&[0]).unwrap_or(b);
                Some(String::from_utf8_lossy(trimmed).into_owned())
            }
            _ => None,
        }
    }

    pub fn length(&self) -> Option<u32> {
        match self.get(LENGTH)? {
            HeaderValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn connection_id(&self) -> Option<u32> {
        match self.get(CONNECTION_ID)? {
            HeaderValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    fn bytes(&self, id: u8) -> Option<&[u8]> {
        match self.get(id)? {
            HeaderValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<&[u8]> {
        self.bytes(TARGET)
    }

    pub fn who(&self) -> Option<&[u8]> {
        self.bytes(WHO)
    }

    pub fn app_param(&self) -> Option<&[u8]> {
        self.bytes(APPLICATION_PARAMETER)
    }

    /// Body bytes from either BODY or END-OF-BODY, with the end flag.
    pub fn body(&self) -> Option<(&[u8], bool)> {
        if let Some(b) = self.bytes(END_OF_BODY) {
            return Some((b, true));
        }
        self.bytes(BODY).map(|b| (b, false))
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &HeaderValue)> {
        self.headers.iter().map(|(id, v)| (*id, v))
    }

    /// Number of bytes these headers take on the wire.
    pub fn encoded_len(&self) -> usize {
        self.headers.iter().map(|(_, v)| v.encoded_len()).sum()
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        for (id, value) in &self.headers {
            out.push(*id);
            match value {
                HeaderValue::Text(s) => {
                    let len = value.encoded_len() as u16;
                    out.extend_from_slice(&len.to_be_bytes());
                    if !s.is_empty() {
                        for unit in s.encode_utf16() {
                            out.extend_from_slice(&unit.to_be_bytes());
                        }
                        out.extend_from_slice(&[0, 0]);
                    }
                }
                HeaderValue::Bytes(b) => {
                    let len = value.encoded_len() as u16;
                    out.extend_from_slice(&len.to_be_bytes());
                    out.extend_from_slice(b);
                }
                HeaderValue::Byte(b) => out.push(*b),
                HeaderValue::U32(v) => out.extend_from_slice(&v.to_be_bytes()),
            }
        }
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Self, ObexError> {
        let mut set = HeaderSet::new();
        while !bytes.is_empty() {
            let id = bytes[0];
            let (value, used) = match id & KIND_MASK {
                KIND_BYTE => {
                    let b = *bytes
                        .get(1)
                        .ok_or_else(|| ObexError::malformed("truncated byte header"))?;
                    (HeaderValue::Byte(b), 2)
                }
                KIND_U32 => {
                    if bytes.len() < 5 {
                        return Err(ObexError::malformed("truncated 4-byte header"));
                    }
                    let v = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
                    (HeaderValue::U32(v), 5)
                }
                kind => {
                    if bytes.len() < PREFIXED_HEADER_LEN {
                        return Err(ObexError::malformed("truncated header prefix"));
                    }
                    let len = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
                    if len < PREFIXED_HEADER_LEN || len > bytes.len() {
                        return Err(ObexError::malformed(format!(
                            "header 0x{:02X} length {} out of range",
                            id, len
                        )));
                    }
                    let payload = &bytes[PREFIXED_HEADER_LEN..len];
                    let value = if kind == KIND_TEXT {
                        HeaderValue::Text(decode_utf16(payload)?)
                    } else {
                        HeaderValue::Bytes(payload.to_vec())
                    };
                    (value, len)
                }
            };
            set.headers.push((id, value));
            bytes = &bytes[used..];
        }
        Ok(set)
    }
}

fn decode_utf16(payload: &[u8]) -> Result<String, ObexError> {
    if payload.len() % 2 != 0 {
        return Err(ObexError::malformed("odd-length unicode header"));
    }
    let units: Vec<u16> = payload
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .take_while(|u| *u != 0)
        .collect();
    String::from_utf16(&units).map_err(|_| ObexError::malformed("invalid UTF-16 in header"))
}
