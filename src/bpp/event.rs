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

//! Status channel session: polls GetEvent until the job is over.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::session::{soap_request, SoapReply};
use super::SessionContext;
use crate::bluetooth::STS_TARGET;
use crate::events::SessionMessage;
use crate::obex::{HeaderSet, ObexClient};
use crate::soap::{self, SoapRequest, SoapState};

/// Handle to a running status channel.
pub struct EventSession {
    connected: Arc<AtomicBool>,
    interrupt: CancellationToken,
    io_cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl EventSession {
    /// Spawn the status channel task. `soap` is the accumulator the job
    /// channel fills, so job state and reasons end up in one place.
    pub fn start<T>(
        transport: T,
        job_id: u32,
        soap: Arc<Mutex<SoapState>>,
        ctx: SessionContext,
    ) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let connected = Arc::new(AtomicBool::new(false));
        let interrupt = CancellationToken::new();
        let io_cancel = CancellationToken::new();

        info!("Starting status channel for job {}", job_id);

        let task = EventTask {
            client: ObexClient::new(transport, ctx.max_packet_size, io_cancel.clone()),
            job_id,
            soap,
            connected: connected.clone(),
            interrupt: interrupt.clone(),
            ctx,
        };
        let handle = tokio::spawn(task.run());

        Self {
            connected,
            interrupt,
            io_cancel,
            task: Some(handle),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Disconnect the status channel. Safe to call more than once.
    pub fn stop(&self) {
        if self.interrupt.is_cancelled() {
            return;
        }
        info!("Stopping status channel");
        self.interrupt.cancel();
    }

    pub fn abort_io(&self) {
        self.io_cancel.cancel();
    }

    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Status channel task failed: {}", e);
            }
        }
    }
}

struct EventTask<T> {
    client: ObexClient<T>,
    job_id: u32,
    soap: Arc<Mutex<SoapState>>,
    connected: Arc<AtomicBool>,
    interrupt: CancellationToken,
    ctx: SessionContext,
}

impl<T> EventTask<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn run(mut self) {
        {
            let mut soap = self.soap.lock();
            if soap.job_id.is_none() {
                soap.set_job_id(self.job_id);
            }
        }

        if self.connect().await {
            self.poll_events().await;
        }

        if let Err(e) = self.client.disconnect().await {
            warn!("Status channel disconnect failed: {}", e);
        }
        if self.connected.swap(false, Ordering::SeqCst) {
            self.emit(SessionMessage::StatusConnChange(false));
        }
        debug!("Status channel stopped");
        self.emit(SessionMessage::SessionStop);
    }

    async fn connect(&mut self) -> bool {
        let mut headers = HeaderSet::new();
        headers.set_target(STS_TARGET.as_bytes());

        let result = tokio::select! {
            r = self.client.connect(headers) => r,
            _ = self.interrupt.cancelled() => return false,
        };
        match result {
            Ok(_) if self.client.is_connected() => {
                info!("Status channel connected");
                self.connected.store(true, Ordering::SeqCst);
                self.emit(SessionMessage::StatusConnChange(true));
                true
            }
            Ok(resp) => {
                warn!("Printer refused status channel: {}", resp.code);
                false
            }
            Err(e) => {
                error!("Status channel connect error: {}", e);
                false
            }
        }
    }

    /// Issue GetEvent until the job is finished or the printer refuses.
    async fn poll_events(&mut self) {
        let mut complete = false;

        while !self.interrupt.is_cancelled() {
            if !complete {
                complete = self.get_event().await;
                if complete {
                    self.emit(SessionMessage::EventComplete);
                }
            }

            tokio::select! {
                _ = self.interrupt.cancelled() => {}
                _ = tokio::time::sleep(self.ctx.event_poll) => {}
            }
        }
    }

    /// One GetEvent round trip. Returns true once nothing more is expected.
    async fn get_event(&mut self) -> bool {
        let message = soap::build(SoapRequest::GetEvent, &self.soap.lock(), &self.ctx.ticket);
        let reply = soap_request(&mut self.client, SoapRequest::GetEvent, &message, None).await;

        match reply {
            Ok(SoapReply::Accepted(body)) => {
                let (job_state, printer_state, done) = {
                    let mut soap = self.soap.lock();
                    soap.parse(SoapRequest::GetEvent, &body);
                    (
                        soap.job_status.clone(),
                        soap.printer_state.clone(),
                        soap.is_job_terminal() && !soap.file_sending,
                    )
                };
                debug!("Job {} is {} (printer {})", self.job_id, job_state, printer_state);
                self.emit(SessionMessage::EventReport {
                    job_state,
                    printer_state,
                });
                done
            }
            Ok(SoapReply::Refused(code)) => {
                warn!("Printer refused GetEvent: {}", code);
                self.soap.lock().event_status = code.as_u8();
                true
            }
            Err(e) => {
                error!("GetEvent failed: {}", e);
                true
            }
        }
    }

    fn emit(&self, msg: SessionMessage) {
        if !self.ctx.events.send(msg) {
            debug!("Coordinator gone, dropping status message");
        }
    }
}
