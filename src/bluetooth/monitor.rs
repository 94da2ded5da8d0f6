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

//! Link monitor: force-closes a transfer when the adapter powers off or
//! the printer drops the ACL link.

use anyhow::Result;
use bluer::{Adapter, AdapterEvent, AdapterProperty, DeviceEvent, DeviceProperty};
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::DeviceAddress;
use crate::bpp::TransferHandle;

const PRINTER_DISCONNECTED: &str = "Printer got disconnected!!";
const BLUETOOTH_OFF: &str = "Bluetooth turned off";

/// Watch `device` until the transfer behind `handle` finishes.
pub async fn watch(adapter: Adapter, device: DeviceAddress, handle: TransferHandle) -> Result<()> {
    let dev = adapter.device(device.into())?;
    let adapter_events = adapter.events().await?;
    let device_events = dev.events().await?;
    tokio::pin!(adapter_events);
    tokio::pin!(device_events);

    debug!("Watching link to {}", device);

    loop {
        tokio::select! {
            _ = handle.closed() => break,
            event = adapter_events.next() => match event {
                Some(AdapterEvent::PropertyChanged(AdapterProperty::Powered(false))) => {
                    warn!("Adapter {} powered off", adapter.name());
                    handle.force_close(BLUETOOTH_OFF);
                    break;
                }
                Some(_) => {}
                None => break,
            },
            event = device_events.next() => match event {
                Some(DeviceEvent::PropertyChanged(DeviceProperty::Connected(false))) => {
                    info!("{} disconnected", device);
                    handle.force_close(PRINTER_DISCONNECTED);
                    break;
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    debug!("Stopped watching {}", device);
    Ok(())
}
