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

//! Job channel state shared between the session task and the coordinator.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Step of the SOAP exchange the job channel should perform next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoapProcess {
    Standby,
    Processing,
    GetAttribute,
    CreateJob,
    GetEvent,
    SendDocument,
    Cancel,
    Cancelling,
    Cancelled,
    Done,
}

impl SoapProcess {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoapProcess::Standby => "STANDBY",
            SoapProcess::Processing => "PROCESSING",
            SoapProcess::GetAttribute => "GETATTRIBUTE",
            SoapProcess::CreateJob => "CREATJOB",
            SoapProcess::GetEvent => "GETEVENT",
            SoapProcess::SendDocument => "SENDDOCUMENT",
            SoapProcess::Cancel => "CANCEL",
            SoapProcess::Cancelling => "CANCELLING",
            SoapProcess::Cancelled => "CANCELLED",
            SoapProcess::Done => "DONE",
        }
    }

    /// Part of the cancel chain.
    pub fn is_cancel(&self) -> bool {
        matches!(
            self,
            SoapProcess::Cancel | SoapProcess::Cancelling | SoapProcess::Cancelled
        )
    }

    /// Whether `self -> next` is allowed.
    ///
    /// Once a cancel is requested only `Cancel -> Cancelling -> Cancelled`
    /// may follow, and nothing leaves `Done`.
    pub fn can_move_to(&self, next: SoapProcess) -> bool {
        match self {
            SoapProcess::Done => false,
            SoapProcess::Cancel => matches!(next, SoapProcess::Cancel | SoapProcess::Cancelling),
            SoapProcess::Cancelling => next == SoapProcess::Cancelled,
            SoapProcess::Cancelled => false,
            _ => true,
        }
    }
}

/// Job channel state.
#[derive(Debug)]
pub struct JobState {
    /// Current SOAP step.
    process: Mutex<SoapProcess>,

    /// Set while the status channel is connected.
    event_connected: AtomicBool,

    /// Set while a request is waiting on the printer.
    waiting_for_remote: AtomicBool,

    wake: Notify,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            process: Mutex::new(SoapProcess::Standby),
            event_connected: AtomicBool::new(false),
            waiting_for_remote: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }
}

impl JobState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn process(&self) -> SoapProcess {
        *self.process.lock()
    }

    /// Request a transition. Returns false when the state machine refuses it.
    pub fn request(&self, next: SoapProcess) -> bool {
        let mut current = self.process.lock();
        if !current.can_move_to(next) {
            if *current != next {
                warn!(
                    "Ignoring SOAP step {} while in {}",
                    next.as_str(),
                    current.as_str()
                );
            }
            return false;
        }
        debug!("SOAP step {} -> {}", current.as_str(), next.as_str());
        *current = next;
        drop(current);
        self.wake.notify_one();
        true
    }

    /// Move to `next` only if the current step is still `expected`.
    pub fn advance(&self, expected: SoapProcess, next: SoapProcess) -> bool {
        let mut current = self.process.lock();
        if *current != expected || !current.can_move_to(next) {
            return false;
        }
        debug!("SOAP step {} -> {}", current.as_str(), next.as_str());
        *current = next;
        true
    }

    /// Terminal step once the session loop has exited.
    pub(crate) fn close(&self) {
        *self.process.lock() = SoapProcess::Done;
        self.wake.notify_one();
    }

    pub fn set_event_connected(&self, connected: bool) {
        self.event_connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_event_connected(&self) -> bool {
        self.event_connected.load(Ordering::SeqCst)
    }

    pub fn set_waiting_for_remote(&self, waiting: bool) {
        self.waiting_for_remote.store(waiting, Ordering::SeqCst);
    }

    pub fn is_waiting_for_remote(&self) -> bool {
        self.waiting_for_remote.load(Ordering::SeqCst)
    }

    /// Wake the session loop early.
    pub fn notify(&self) {
        self.wake.notify_one();
    }

    pub(crate) async fn notified(&self) {
        self.wake.notified().await
    }
}
