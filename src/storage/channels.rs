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

//! Cached SDP results per printer.

use anyhow::Result;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::ShareStore;
use crate::bluetooth::{DeviceAddress, ServiceClass};

impl ShareStore {
    /// Cached RFCOMM channel for a service on a device.
    pub fn channel(&self, device: &DeviceAddress, service: ServiceClass) -> Result<Option<u8>> {
        let conn = self.conn.lock();
        let channel = conn
            .query_row(
                "SELECT channel FROM channels WHERE device = ?1 AND uuid16 = ?2",
                params![device.to_string(), service.uuid16()],
                |row| row.get::<_, u8>(0),
            )
            .optional()?;
        Ok(channel)
    }

    pub fn set_channel(&self, device: &DeviceAddress, service: ServiceClass, channel: u8) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO channels (device, uuid16, channel) VALUES (?1, ?2, ?3)",
            params![device.to_string(), service.uuid16(), channel],
        )?;
        debug!("Cached {:?} channel {} for {}", service, channel, device);
        Ok(())
    }

    pub fn remove_channel(&self, device: &DeviceAddress, service: ServiceClass) -> Result<()> {
        self.conn.lock().execute(
            "DELETE FROM channels WHERE device = ?1 AND uuid16 = ?2",
            params![device.to_string(), service.uuid16()],
        )?;
        Ok(())
    }

    /// Document formats the printer reported last time, if known.
    pub fn formats(&self, device: &DeviceAddress) -> Result<Option<Vec<String>>> {
        let conn = self.conn.lock();
        let formats: Option<Option<String>> = conn
            .query_row(
                "SELECT formats FROM printers WHERE device = ?1",
                [device.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(formats.flatten().map(|f| {
            f.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }))
    }

    pub fn set_printer(&self, device: &DeviceAddress, name: Option<&str>, formats: &[String]) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO printers (device, name, formats) VALUES (?1, ?2, ?3)",
            params![device.to_string(), name, formats.join(",")],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_cache() {
        let store = ShareStore::open_in_memory().unwrap();
        let dev: DeviceAddress = "00:11:22:33:44:55".parse().unwrap();

        assert_eq!(store.channel(&dev, ServiceClass::DirectPrinting).unwrap(), None);
        store.set_channel(&dev, ServiceClass::DirectPrinting, 3).unwrap();
        store.set_channel(&dev, ServiceClass::PrintingStatus, 5).unwrap();
        assert_eq!(store.channel(&dev, ServiceClass::DirectPrinting).unwrap(), Some(3));

        store.remove_channel(&dev, ServiceClass::DirectPrinting).unwrap();
        assert_eq!(store.channel(&dev, ServiceClass::DirectPrinting).unwrap(), None);
        assert_eq!(store.channel(&dev, ServiceClass::PrintingStatus).unwrap(), Some(5));
    }

    #[test]
    fn test_printer_formats() {
        let store = ShareStore::open_in_memory().unwrap();
        let dev: DeviceAddress = "00:11:22:33:44:55".parse().unwrap();
        assert!(store.formats(&dev).unwrap().is_none());

        let formats = vec!["application/pdf".to_string(), "image/jpeg".to_string()];
        store.set_printer(&dev, Some("Office"), &formats).unwrap();
        assert_eq!(store.formats(&dev).unwrap(), Some(formats));
    }
}
