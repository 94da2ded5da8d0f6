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

//! Basic Printing Profile sender.
//!
//! A print job runs over two RFCOMM channels. The job channel
//! ([`JobSession`]) carries the SOAP requests and the document itself;
//! the status channel ([`EventSession`]) polls GetEvent while the printer
//! works. [`Transfer`] owns both and decides when each one stops.

mod event;
pub mod quirks;
mod result;
mod session;
mod share;
mod status;
mod transfer;

use std::time::Duration;

use crate::config::Config;
use crate::events::SessionSender;
use crate::obex::MAX_PACKET_SIZE;
use crate::soap::JobTicket;
use crate::storage::ShareStore;

pub use event::EventSession;
pub use result::{print_result_msg, ResultInputs};
pub use session::JobSession;
pub use share::{Batch, BatchStatus, Direction, FileHint, SendFileInfo, Share};
pub use status::{ShareStatus, StatusError};
pub use transfer::{Transfer, TransferHandle, TransferOutcome};

/// Delay before the job channel sends OBEX CONNECT.
const SESSION_START_DELAY: Duration = Duration::from_millis(100);

/// What every session needs besides its transport.
#[derive(Clone)]
pub struct SessionContext {
    pub store: ShareStore,
    pub events: SessionSender,
    pub ticket: JobTicket,
    pub max_packet_size: usize,
    /// Sleep between job-channel iterations with nothing to do.
    pub idle_poll: Duration,
    /// Interval between GetEvent requests.
    pub event_poll: Duration,
    pub start_delay: Duration,
}

impl SessionContext {
    pub fn new(store: ShareStore, events: SessionSender, config: &Config) -> Self {
        Self {
            store,
            events,
            ticket: config.job.clone(),
            max_packet_size: config.transfer.max_packet_size.min(MAX_PACKET_SIZE),
            idle_poll: Duration::from_millis(config.transfer.idle_poll_ms),
            event_poll: Duration::from_millis(config.transfer.event_poll_ms),
            start_delay: SESSION_START_DELAY,
        }
    }
}
