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

//! Job channel session.
//!
//! One task owns the OBEX connection to the printer's Direct Printing
//! service. It polls the shared [`JobState`] once per iteration and runs
//! whichever SOAP step the coordinator asked for: GetPrinterAttributes,
//! CreateJob, the document PUT, or CancelJob.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::quirks::{apply_remote_device_quirks, effective_mimetype, job_id_app_param};
use super::share::{FileHint, SendFileInfo, Share};
use super::status::{ShareStatus, StatusError};
use super::SessionContext;
use crate::bluetooth::DPS_TARGET;
use crate::events::SessionMessage;
use crate::obex::{HeaderSet, ObexClient, ObexError, ResponseCode};
use crate::soap::{self, SoapRequest, SoapState, SOAP_MIME_TYPE};
use crate::state::{JobState, SoapProcess};
use crate::storage::ShareStore;

/// Length of the LENGTH header on the wire, counted when enlarging chunks.
const LENGTH_HEADER_LEN: usize = 5;

/// Answer to a SOAP request.
#[derive(Debug)]
pub(super) enum SoapReply {
    /// Response body, already cut to the announced LENGTH.
    Accepted(String),
    /// The printer answered with something other than CONTINUE or OK.
    Refused(ResponseCode),
}

/// Send one SOAP message as an OBEX GET and collect the reply.
pub(super) async fn soap_request<T>(
    client: &mut ObexClient<T>,
    request: SoapRequest,
    message: &str,
    state: Option<&JobState>,
) -> Result<SoapReply, StatusError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    debug!("SOAP request {} ({} bytes)", request.as_str(), message.len());

    let mut headers = HeaderSet::new();
    headers.set_type(SOAP_MIME_TYPE);
    let mut op = client.get(headers)?;

    if let Some(state) = state {
        state.set_waiting_for_remote(true);
    }
    let written = op.write_chunk(message.as_bytes()).await;
    if let Some(state) = state {
        state.set_waiting_for_remote(false);
    }

    let code = written?;
    if !code.is_accepted() {
        debug!("{} refused while sending: {}", request.as_str(), code);
        return Ok(SoapReply::Refused(code));
    }

    let code = if op.is_done() {
        code
    } else {
        op.read_to_end().await?
    };
    if code != ResponseCode::OK {
        debug!("{} failed: {}", request.as_str(), code);
        return Ok(SoapReply::Refused(code));
    }

    let mut body = op.take_body();
    if let Some(expected) = op.length() {
        let expected = expected as usize;
        if body.len() < expected {
            warn!(
                "SOAP response short by {} bytes ({} of {})",
                expected - body.len(),
                body.len(),
                expected
            );
            return Err(StatusError::new(ShareStatus::ObexDataError));
        }
        body.truncate(expected);
    }
    Ok(SoapReply::Accepted(
        String::from_utf8_lossy(&body).into_owned(),
    ))
}

/// Status of a finished document PUT, from the last response code.
fn classify_put_response(code: Option<ResponseCode>) -> ShareStatus {
    match code {
        Some(ResponseCode::OK) => ShareStatus::Success,
        Some(ResponseCode::UNSUPPORTED_TYPE) => ShareStatus::NotAcceptable,
        Some(ResponseCode::FORBIDDEN) | Some(ResponseCode::NOT_ACCEPTABLE) => ShareStatus::Forbidden,
        Some(_) => ShareStatus::UnhandledObexCode,
        None => ShareStatus::ConnectionError,
    }
}

/// Fill `buf` from `reader`, stopping early only at end of file.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn log_store(result: anyhow::Result<()>) {
    if let Err(e) = result {
        error!("Failed to persist share update: {}", e);
    }
}

/// Handle to a running job channel.
pub struct JobSession {
    state: Arc<JobState>,
    soap: Arc<Mutex<SoapState>>,
    shares: mpsc::UnboundedSender<Share>,
    interrupt: CancellationToken,
    io_cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl JobSession {
    /// Spawn the session task over an already connected transport.
    pub fn start<T>(transport: T, share: Share, ctx: SessionContext) -> Self
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let state = JobState::new();
        let soap = Arc::new(Mutex::new(SoapState::new()));
        let (shares, shares_rx) = mpsc::unbounded_channel();
        let interrupt = CancellationToken::new();
        let io_cancel = CancellationToken::new();

        info!("Starting job channel session for share {}", share.id);

        let task = SessionTask {
            client: ObexClient::new(transport, ctx.max_packet_size, io_cancel.clone()),
            share,
            file_info: None,
            waiting_for_share: true,
            state: state.clone(),
            soap: soap.clone(),
            shares_rx,
            interrupt: interrupt.clone(),
            ctx,
        };
        let handle = tokio::spawn(task.run());

        Self {
            state,
            soap,
            shares,
            interrupt,
            io_cancel,
            task: Some(handle),
        }
    }

    /// Shared SOAP step and channel flags.
    pub fn state(&self) -> Arc<JobState> {
        self.state.clone()
    }

    /// SOAP accumulator shared with the status channel.
    pub fn soap(&self) -> Arc<Mutex<SoapState>> {
        self.soap.clone()
    }

    /// Queue the next document of the batch.
    pub fn add_share(&self, share: Share) {
        if self.shares.send(share).is_err() {
            warn!("Job channel already exited, share dropped");
        }
        self.state.notify();
    }

    /// Ask the session loop to exit. It disconnects and reports
    /// `SessionComplete` once, however often this is called.
    pub fn stop(&self) {
        if self.interrupt.is_cancelled() {
            debug!("Job channel stop already in progress");
            return;
        }
        info!("Stopping job channel");
        self.interrupt.cancel();
        self.state.notify();
    }

    /// Tear down in-flight OBEX I/O. Any blocked exchange fails with
    /// `ObexError::Cancelled`.
    pub fn abort_io(&self) {
        self.io_cancel.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Wait for the session task to exit.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Job channel task failed: {}", e);
            }
        }
    }
}

struct SessionTask<T> {
    client: ObexClient<T>,
    /// Share currently being printed.
    share: Share,
    file_info: Option<Result<SendFileInfo, ShareStatus>>,
    waiting_for_share: bool,
    state: Arc<JobState>,
    soap: Arc<Mutex<SoapState>>,
    shares_rx: mpsc::UnboundedReceiver<Share>,
    interrupt: CancellationToken,
    ctx: SessionContext,
}

impl<T> SessionTask<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn run(mut self) {
        self.state.advance(SoapProcess::Standby, SoapProcess::GetAttribute);

        tokio::select! {
            _ = tokio::time::sleep(self.ctx.start_delay) => {}
            _ = self.interrupt.cancelled() => {
                debug!("Job channel interrupted before connecting");
            }
        }

        if !self.interrupt.is_cancelled() {
            let share = self.share.clone();
            self.accept_share(share).await;
            self.connect().await;
        }

        while !self.interrupt.is_cancelled() {
            while let Ok(share) = self.shares_rx.try_recv() {
                self.accept_share(share).await;
            }

            match self.state.process() {
                SoapProcess::GetAttribute => {
                    if self
                        .state
                        .advance(SoapProcess::GetAttribute, SoapProcess::Processing)
                    {
                        match self.send_soap_request(SoapRequest::GetPrinterAttributes).await {
                            Ok(()) => {
                                let attrs = self.soap.lock().attributes.clone();
                                self.emit(SessionMessage::AttributesReceived(attrs));
                            }
                            Err(e) => self.session_error(ShareStatus::Canceled, e),
                        }
                    }
                }
                SoapProcess::CreateJob => {
                    if self
                        .state
                        .advance(SoapProcess::CreateJob, SoapProcess::Processing)
                    {
                        match self.send_soap_request(SoapRequest::CreateJob).await {
                            Ok(()) => {
                                let job_id = self.soap.lock().job_id_u32();
                                match job_id {
                                    Some(id) => {
                                        info!("Printer created job {}", id);
                                        self.emit(SessionMessage::JobCreated(id));
                                    }
                                    None => warn!("CreateJob succeeded without a job id"),
                                }
                            }
                            Err(e) => self.session_error(ShareStatus::Canceled, e),
                        }
                    }
                }
                SoapProcess::SendDocument if !self.waiting_for_share => self.do_send().await,
                SoapProcess::Cancel => {
                    if self
                        .state
                        .advance(SoapProcess::Cancel, SoapProcess::Cancelling)
                    {
                        self.cancel_job().await;
                    }
                }
                _ => self.idle().await,
            }
        }

        if let Err(e) = self.client.disconnect().await {
            warn!("OBEX disconnect failed: {}", e);
        }
        self.state.close();
        info!("Job channel session complete for share {}", self.share.id);
        self.emit(SessionMessage::SessionComplete(self.share.clone()));
    }

    async fn idle(&mut self) {
        tokio::select! {
            _ = self.interrupt.cancelled() => {}
            _ = self.state.notified() => {}
            Some(share) = self.shares_rx.recv() => self.accept_share(share).await,
            _ = tokio::time::sleep(self.ctx.idle_poll) => {}
        }
    }

    async fn connect(&mut self) {
        let mut headers = HeaderSet::new();
        headers.set_target(DPS_TARGET.as_bytes());

        self.state.set_waiting_for_remote(true);
        match self.client.connect(headers).await {
            Ok(_) if self.client.is_connected() => debug!(
                "OBEX session created, packet size {}",
                self.client.max_packet_size()
            ),
            Ok(resp) => warn!("Printer refused OBEX connect: {}", resp.code),
            Err(e) => error!("OBEX session connect error: {}", e),
        }
        self.state.set_waiting_for_remote(false);
    }

    /// Prepare a share for sending and record what is known about it.
    async fn accept_share(&mut self, share: Share) {
        debug!("Processing share {}", share.id);
        let info = SendFileInfo::generate(&share).await;
        match &info {
            Ok(info) => {
                debug!(
                    "Document {} ({} bytes, {})",
                    info.file_name, info.length, info.mime_type
                );
                let hint = FileHint {
                    file_name: info.file_name.clone(),
                    length: info.length,
                    mime_type: info.mime_type.clone(),
                };
                log_store(self.ctx.store.update_file_info(share.id, &hint));
            }
            Err(status) => {
                warn!("Share {} has no usable document", share.id);
                log_store(self.ctx.store.update_status(share.id, *status));
            }
        }
        self.share = share;
        self.file_info = Some(info);
        self.waiting_for_share = false;
    }

    async fn send_soap_request(&mut self, request: SoapRequest) -> Result<(), StatusError> {
        let message = soap::build(request, &self.soap.lock(), &self.ctx.ticket);
        let reply = soap_request(&mut self.client, request, &message, Some(&*self.state)).await?;
        match reply {
            SoapReply::Accepted(body) => {
                self.soap.lock().parse(request, &body);
                Ok(())
            }
            SoapReply::Refused(code) => {
                self.soap.lock().refusal = code.as_u8() as i32;
                Err(StatusError::new(ShareStatus::from_refusal(code)))
            }
        }
    }

    async fn cancel_job(&mut self) {
        if self.state.is_event_connected() {
            info!("Sending CancelJob");
            match self.send_soap_request(SoapRequest::CancelJob).await {
                Ok(()) => {
                    self.state
                        .advance(SoapProcess::Cancelling, SoapProcess::Cancelled);
                }
                Err(e) => self.session_error(ShareStatus::Canceled, e),
            }
        } else {
            self.state
                .advance(SoapProcess::Cancelling, SoapProcess::Cancelled);
            self.session_error(
                ShareStatus::Canceled,
                StatusError::new(ShareStatus::Canceled),
            );
        }
    }

    async fn do_send(&mut self) {
        debug!("Sending document for share {}", self.share.id);
        // Set before the outcome so a failure is reported once.
        self.waiting_for_share = true;

        let result = if !self.client.is_connected() {
            debug!("No OBEX connection");
            let status = ShareStatus::ConnectionError;
            log_store(self.ctx.store.update_status(self.share.id, status));
            Err(StatusError::new(status))
        } else {
            match self.file_info.take() {
                Some(Ok(info)) => self.send_file(info).await,
                Some(Err(status)) => Err(StatusError::new(status)),
                None => Err(StatusError::new(ShareStatus::FileError)),
            }
        };

        self.soap.lock().file_sending = false;
        self.emit(SessionMessage::FileSending(false));

        match result {
            Ok(()) => {
                self.share.status = ShareStatus::Success;
                self.emit(SessionMessage::ShareComplete(self.share.clone()));
            }
            Err(e) => {
                let status = e.status;
                self.session_error(status, e);
            }
        }
    }

    async fn send_file(&mut self, mut info: SendFileInfo) -> Result<(), StatusError> {
        let Some(job_id) = self.soap.lock().job_id else {
            warn!("Cannot send document without a job id");
            return Err(StatusError::new(ShareStatus::ObexDataError));
        };

        info!(
            "Sending {} ({}, {} bytes)",
            info.file_name, info.mime_type, info.length
        );

        self.soap.lock().file_sending = true;
        self.emit(SessionMessage::FileSending(true));

        let share_id = self.share.id;
        let store = self.ctx.store.clone();
        let events = self.ctx.events.clone();
        let state = self.state.clone();
        let soap = self.soap.clone();
        let interrupt = self.interrupt.clone();

        let mime_type = effective_mimetype(&info.mime_type, &info.file_name);
        let app_param = job_id_app_param(job_id);
        let mut headers = HeaderSet::new();
        headers.set_name(&info.file_name);
        headers.set_type(&mime_type);
        headers.set_app_param(app_param.to_vec());
        apply_remote_device_quirks(&mut headers, &info.destination, &info.file_name);
        log_store(store.update_status(share_id, ShareStatus::Running));
        headers.set_length(info.length.min(u32::MAX as u64) as u32);

        state.set_waiting_for_remote(true);
        let op = self.client.put(headers);
        state.set_waiting_for_remote(false);
        let mut op = match op {
            Ok(op) => op,
            Err(e) => {
                error!("Cannot start document PUT: {}", e);
                let status = ShareStatus::ObexDataError;
                log_store(store.update_status(share_id, status));
                return Err(StatusError::with_cause(status, e));
            }
        };

        log_store(store.update_progress(share_id, 0));
        log_store(store.update_status(share_id, ShareStatus::Running));

        let total = info.length;
        let mut position: u64 = 0;
        let mut proceed = false;
        let mut code: Option<ResponseCode> = None;

        let transfer: Result<(), ObexError> = async {
            let first_size = op.max_body_size();
            let mut buffer = vec![0u8; first_size];

            if !interrupt.is_cancelled() && position != total {
                let n = read_full(&mut info.reader, &mut buffer).await?;
                state.set_waiting_for_remote(true);
                let sent = op.write_chunk(&buffer[..n]).await;
                state.set_waiting_for_remote(false);
                let c = sent?;
                position += n as u64;
                code = Some(c);
                debug!("First document packet: {} bytes, {}", n, c);

                if c.is_accepted() {
                    proceed = true;
                    log_store(store.update_progress(share_id, position));
                    events.send(SessionMessage::Progress {
                        share_id,
                        sent: position,
                        total,
                    });
                } else {
                    info!("Printer rejected document: {}", c);
                    soap.lock().printer_state_reason = "Printer reject operation".to_string();
                }
            }

            // Only the connection id travels after the first packet.
            let enlarged = first_size
                + (info.file_name.len() + 3)
                + (info.mime_type.len() + 3)
                + (app_param.len() + 3)
                + LENGTH_HEADER_LEN;
            let chunk_size = enlarged.min(op.max_body_size()).max(1);
            buffer.resize(chunk_size, 0);

            while !interrupt.is_cancelled()
                && proceed
                && position != total
                && state.process() != SoapProcess::Cancel
            {
                let n = read_full(&mut info.reader, &mut buffer).await?;
                if n == 0 {
                    warn!("Document ended after {} of {} bytes", position, total);
                    break;
                }
                let c = op.write_chunk(&buffer[..n]).await?;
                code = Some(c);
                if !c.is_accepted() {
                    proceed = false;
                } else {
                    position += n as u64;
                    log_store(store.update_progress(share_id, position));
                    events.send(SessionMessage::Progress {
                        share_id,
                        sent: position,
                        total,
                    });
                }
            }
            Ok::<(), ObexError>(())
        }
        .await;

        if let Err(e) = transfer {
            error!("Document transfer failed at {} of {}: {}", position, total, e);
            let status = ShareStatus::UnknownError;
            log_store(store.update_status(share_id, status));
            return Err(StatusError::with_cause(status, e));
        }

        let mut aborted = None;
        if state.process() == SoapProcess::Cancel {
            state.advance(SoapProcess::Cancel, SoapProcess::Cancelling);
            if let Err(e) = op.abort().await {
                warn!("OBEX abort failed: {}", e);
            }
            drop(op);
            info!(
                "Document {} interrupted at {} of {}",
                info.file_name, position, total
            );
            let message = soap::build(SoapRequest::CancelJob, &soap.lock(), &self.ctx.ticket);
            match soap_request(&mut self.client, SoapRequest::CancelJob, &message, Some(&*state)).await {
                Ok(SoapReply::Accepted(body)) => {
                    soap.lock().parse(SoapRequest::CancelJob, &body);
                    state.advance(SoapProcess::Cancelling, SoapProcess::Cancelled);
                }
                Ok(SoapReply::Refused(c)) => warn!("CancelJob refused: {}", c),
                Err(e) => warn!("CancelJob failed: {}", e),
            }
            aborted = Some(ShareStatus::Canceled);
        } else if matches!(
            code,
            Some(ResponseCode::FORBIDDEN)
                | Some(ResponseCode::NOT_ACCEPTABLE)
                | Some(ResponseCode::UNSUPPORTED_TYPE)
        ) {
            info!("Printer rejected {} ({})", info.file_name, info.mime_type);
        } else if !interrupt.is_cancelled() && position == total {
            info!("Document {} sent ({} bytes)", info.file_name, total);
            state.set_waiting_for_remote(true);
            let finished = op.finish().await;
            state.set_waiting_for_remote(false);
            match finished {
                Ok(c) => code = Some(c),
                Err(e) => {
                    error!("Final document packet failed: {}", e);
                    let status = ShareStatus::UnknownError;
                    log_store(store.update_status(share_id, status));
                    return Err(StatusError::with_cause(status, e));
                }
            }
        } else {
            if let Err(e) = op.abort().await {
                warn!("OBEX abort failed: {}", e);
            }
            info!(
                "Document {} interrupted at {} of {}",
                info.file_name, position, total
            );
            aborted = Some(ShareStatus::Canceled);
        }

        let status = aborted.unwrap_or_else(|| classify_put_response(code));
        if status != ShareStatus::Success {
            info!("Document PUT finished with {}", status);
        }
        if matches!(status, ShareStatus::Forbidden | ShareStatus::NotAcceptable) {
            soap.lock().refusal = status.code();
        }
        log_store(store.update_status(share_id, status));
        self.share.current_bytes = position;
        self.share.total_bytes = total;

        if status == ShareStatus::Success {
            Ok(())
        } else {
            Err(StatusError::new(status))
        }
    }

    fn session_error(&mut self, status: ShareStatus, error: StatusError) {
        warn!("Job channel error: {} ({})", error, status);
        self.share.status = status;
        self.emit(SessionMessage::SessionError {
            share: self.share.clone(),
            error,
        });
    }

    fn emit(&self, msg: SessionMessage) {
        if !self.ctx.events.send(msg) {
            debug!("Coordinator gone, dropping session message");
        }
    }
}

/// Persist the final status of a share outside a running session.
pub(super) fn persist_status(store: &ShareStore, share_id: i64, status: ShareStatus) {
    log_store(store.update_status(share_id, status));
}
