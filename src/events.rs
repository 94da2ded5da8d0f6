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

//! Messages exchanged between the sessions, the coordinator and the
//! front end.

use std::fmt;
use tokio::sync::mpsc;

use crate::bluetooth::BoxedTransport;
use crate::bpp::{BatchStatus, Share, ShareStatus, StatusError};
use crate::soap::PrinterAttributes;

/// Which of the two RFCOMM channels a message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Direct printing channel carrying SOAP requests and the document.
    Job,
    /// Printing status channel carrying GetEvent.
    Status,
}

/// Signals from the job and status sessions.
#[derive(Debug)]
pub enum SessionMessage {
    /// GetPrinterAttributes succeeded.
    AttributesReceived(PrinterAttributes),
    /// CreateJob succeeded with this job id.
    JobCreated(u32),
    /// Document upload started or stopped.
    FileSending(bool),
    /// Bytes of the current document acknowledged so far.
    Progress { share_id: i64, sent: u64, total: u64 },
    /// The current share was delivered.
    ShareComplete(Share),
    /// A request or the upload failed.
    SessionError { share: Share, error: StatusError },
    /// The job channel has exited. Sent exactly once.
    SessionComplete(Share),
    /// Status channel connected or disconnected.
    StatusConnChange(bool),
    /// A GetEvent reply was folded into the status state.
    EventReport { job_state: String, printer_state: String },
    /// The status channel has nothing more to report.
    EventComplete,
    /// The status channel has exited.
    SessionStop,
}

/// Everything the coordinator reacts to.
pub enum TransferEvent {
    /// Channels found in the cache or via SDP. `None` means the lookup failed.
    SdpResult { job: Option<u8>, status: Option<u8> },
    RfcommConnected {
        kind: ChannelKind,
        transport: BoxedTransport,
    },
    RfcommError { kind: ChannelKind, reason: String },
    /// A connect attempt is taking too long.
    ConnectTimeout(ChannelKind),
    GetPrinterAttributes,
    CreateJob,
    GetEvent,
    SendDocument,
    Cancel,
    StartEventChannel,
    /// Bluetooth went away underneath the transfer.
    ForceClose(String),
    Session(SessionMessage),
}

impl fmt::Debug for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferEvent::SdpResult { job, status } => f
                .debug_struct("SdpResult")
                .field("job", job)
                .field("status", status)
                .finish(),
            TransferEvent::RfcommConnected { kind, .. } => {
                f.debug_struct("RfcommConnected").field("kind", kind).finish()
            }
            TransferEvent::RfcommError { kind, reason } => f
                .debug_struct("RfcommError")
                .field("kind", kind)
                .field("reason", reason)
                .finish(),
            TransferEvent::ConnectTimeout(kind) => write!(f, "ConnectTimeout({:?})", kind),
            TransferEvent::GetPrinterAttributes => write!(f, "GetPrinterAttributes"),
            TransferEvent::CreateJob => write!(f, "CreateJob"),
            TransferEvent::GetEvent => write!(f, "GetEvent"),
            TransferEvent::SendDocument => write!(f, "SendDocument"),
            TransferEvent::Cancel => write!(f, "Cancel"),
            TransferEvent::StartEventChannel => write!(f, "StartEventChannel"),
            TransferEvent::ForceClose(reason) => write!(f, "ForceClose({})", reason),
            TransferEvent::Session(msg) => write!(f, "Session({:?})", msg),
        }
    }
}

/// Progress reported to whoever drives the transfer.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferUpdate {
    /// Job channel is up and the printer can be queried.
    Connected,
    /// Printer attributes arrived; the job can be created.
    PrinterReady(PrinterAttributes),
    JobCreated(u32),
    StatusChannelConnected(bool),
    Progress { share_id: i64, sent: u64, total: u64 },
    PrinterEvent { job_state: String, printer_state: String },
    ShareFinished { share_id: i64, status: ShareStatus },
    /// Any open dialogs for this transfer should go away.
    CloseSurfaces,
    /// Final outcome. Nothing follows.
    Finished {
        batch: BatchStatus,
        message: Option<String>,
    },
}

pub type EventSender = mpsc::UnboundedSender<TransferEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransferEvent>;
pub type UpdateSender = mpsc::UnboundedSender<TransferUpdate>;
pub type UpdateReceiver = mpsc::UnboundedReceiver<TransferUpdate>;

/// Sender handed to sessions; wraps every message as a [`TransferEvent`].
#[derive(Debug, Clone)]
pub struct SessionSender(EventSender);

impl SessionSender {
    pub fn new(tx: EventSender) -> Self {
        Self(tx)
    }

    /// Returns false once the coordinator is gone.
    pub fn send(&self, msg: SessionMessage) -> bool {
        self.0.send(TransferEvent::Session(msg)).is_ok()
    }
}
