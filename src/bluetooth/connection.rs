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

//! Opening RFCOMM channels to a printer.

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::address::{DeviceAddress, ServiceClass};

/// Byte stream an OBEX session runs over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

pub type BoxedTransport = Box<dyn Transport>;

/// Access to the local Bluetooth stack.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Whether the local adapter is powered.
    async fn is_powered(&self) -> Result<bool>;

    /// Look up the RFCOMM channel of `service` on `device` via SDP.
    async fn resolve_channel(
        &self,
        device: DeviceAddress,
        service: ServiceClass,
    ) -> Result<Option<u8>>;

    /// Open an RFCOMM stream to `channel` on `device`.
    async fn connect(&self, device: DeviceAddress, channel: u8) -> Result<BoxedTransport>;
}

#[cfg(feature = "bluez")]
mod bluez {
    use super::*;
    use anyhow::anyhow;
    use bluer::rfcomm::{Profile, ReqError, Role, SocketAddr, Stream};
    use bluer::{Adapter, Session};
    use futures::StreamExt;
    use std::time::Duration;
    use tracing::{debug, info, warn};

    const PROFILE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connector backed by BlueZ.
    pub struct BluezConnector {
        session: Session,
        adapter: Adapter,
    }

    impl BluezConnector {
        pub async fn new() -> Result<Self> {
            let session = Session::new().await?;
            debug!("BlueZ session created");

            let adapter = session.default_adapter().await?;
            info!("Using Bluetooth adapter: {}", adapter.name());

            Ok(Self { session, adapter })
        }

        pub fn adapter(&self) -> &Adapter {
            &self.adapter
        }
    }

    #[async_trait]
    impl Connector for BluezConnector {
        async fn is_powered(&self) -> Result<bool> {
            Ok(self.adapter.is_powered().await?)
        }

        /// BlueZ keeps SDP records to itself, so the channel is learned by
        /// letting it connect a client profile and reading the peer address.
        async fn resolve_channel(
            &self,
            device: DeviceAddress,
            service: ServiceClass,
        ) -> Result<Option<u8>> {
            let addr: bluer::Address = device.into();
            let dev = self.adapter.device(addr)?;
            let uuid = service.uuid();

            if let Some(uuids) = dev.uuids().await? {
                if !uuids.contains(&uuid) {
                    debug!("{} does not advertise {:?}", device, service);
                    return Ok(None);
                }
            }

            let profile = Profile {
                uuid,
                role: Some(Role::Client),
                require_authentication: Some(false),
                require_authorization: Some(false),
                auto_connect: Some(false),
                ..Default::default()
            };
            let mut handle = self.session.register_profile(profile).await?;

            let connect = dev.connect_profile(&uuid);
            tokio::pin!(connect);
            let accept = async {
                let mut connect_done = false;
                loop {
                    tokio::select! {
                        res = &mut connect, if !connect_done => {
                            connect_done = true;
                            res?;
                        }
                        req = handle.next() => {
                            let req = req.ok_or_else(|| anyhow!("profile handle closed"))?;
                            if req.device() == addr {
                                return Ok::<_, anyhow::Error>(req.accept()?);
                            }
                            req.reject(ReqError::Rejected);
                        }
                    }
                }
            };

            let stream = tokio::time::timeout(PROFILE_CONNECT_TIMEOUT, accept)
                .await
                .map_err(|_| anyhow!("SDP lookup of {:?} on {} timed out", service, device))??;

            let channel = stream.peer_addr()?.channel;
            drop(stream);
            info!("{} exposes {:?} on RFCOMM channel {}", device, service, channel);
            Ok(Some(channel))
        }

        async fn connect(&self, device: DeviceAddress, channel: u8) -> Result<BoxedTransport> {
            let target = SocketAddr::new(device.into(), channel);
            debug!("Connecting RFCOMM {} channel {}", device, channel);
            match Stream::connect(target).await {
                Ok(stream) => Ok(Box::new(stream)),
                Err(e) => {
                    warn!("RFCOMM connect to {} channel {} failed: {}", device, channel, e);
                    Err(e.into())
                }
            }
        }
    }
}

#[cfg(feature = "bluez")]
pub use bluez::BluezConnector;
