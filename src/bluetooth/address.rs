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

//! Device addresses and the printing profile's identifiers.

use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Bluetooth base UUID, used to widen 16-bit service classes.
const BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;

/// OBEX TARGET of the Direct Printing (job) channel.
pub const DPS_TARGET: Uuid = Uuid::from_u128(0x00000001_0000_1000_8000_0002EE000001);

/// OBEX TARGET of the Printing Status (event) channel.
pub const STS_TARGET: Uuid = Uuid::from_u128(0x00000123_0000_1000_8000_0002EE000001);

/// SDP service class the printer is queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceClass {
    DirectPrinting,
    PrintingStatus,
}

impl ServiceClass {
    pub fn uuid16(&self) -> u16 {
        match self {
            ServiceClass::DirectPrinting => 0x1118,
            ServiceClass::PrintingStatus => 0x1123,
        }
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::from_u128(BASE_UUID | ((self.uuid16() as u128) << 96))
    }

    /// OBEX TARGET used once the channel is connected.
    pub fn obex_target(&self) -> Uuid {
        match self {
            ServiceClass::DirectPrinting => DPS_TARGET,
            ServiceClass::PrintingStatus => STS_TARGET,
        }
    }
}

/// Bluetooth device address in canonical upper-case form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress([u8; 6]);

impl DeviceAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }

    /// True when the address begins with the given `XX:XX:XX` prefix.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.to_string().starts_with(&prefix.to_ascii_uppercase())
    }
}

impl FromStr for DeviceAddress {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(anyhow!("invalid Bluetooth address: {}", s));
        }
        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(anyhow!("invalid Bluetooth address: {}", s));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| anyhow!("invalid Bluetooth address: {}", s))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

#[cfg(feature = "bluez")]
impl From<bluer::Address> for DeviceAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(feature = "bluez")]
impl From<DeviceAddress> for bluer::Address {
    fn from(addr: DeviceAddress) -> Self {
        bluer::Address::new(addr.0)
    }
}
