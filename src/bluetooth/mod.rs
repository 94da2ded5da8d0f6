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

//! Bluetooth communication module.
//!
//! Resolves and opens the RFCOMM channels of a printer and watches the
//! link while a job is running.

mod address;
mod connection;
#[cfg(feature = "bluez")]
mod monitor;

pub use address::{DeviceAddress, ServiceClass, DPS_TARGET, STS_TARGET};
#[cfg(feature = "bluez")]
pub use connection::BluezConnector;
pub use connection::{BoxedTransport, Connector, Transport};
#[cfg(feature = "bluez")]
pub use monitor::watch;
