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

//! Transfer coordinator.
//!
//! Owns a batch, the job channel and the status channel. Every message
//! from the sessions, the connect tasks and the front end lands on one
//! queue and is handled in order by [`Transfer::run`].
//!
//! The status channel is only connected after the job channel, and on
//! the way down it is stopped first whenever it is connected. The job
//! channel's `SessionComplete` ends the transfer.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::event::EventSession;
use super::quirks::is_supported_format;
use super::result::{print_result_msg, ResultInputs};
use super::session::{persist_status, JobSession};
use super::share::{Batch, BatchStatus, Direction, FileHint, Share};
use super::status::ShareStatus;
use super::SessionContext;
use crate::bluetooth::{BoxedTransport, Connector, ServiceClass};
use crate::config::Config;
use crate::events::{
    ChannelKind, EventReceiver, EventSender, SessionMessage, SessionSender, TransferEvent,
    TransferUpdate, UpdateReceiver, UpdateSender,
};
use crate::soap::SoapState;
use crate::state::{JobState, SoapProcess};
use crate::storage::ShareStore;

/// Message shown when the printer's services cannot be found.
const SDP_FAILED_MSG: &str = "Connection fail with the Printer";

/// Grace period for the status channel to disconnect once the job is over.
const EVENT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// How a transfer ended.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub batch: BatchStatus,
    pub message: Option<String>,
    pub shares: Vec<Share>,
}

/// Cloneable front-end handle to a running [`Transfer`].
#[derive(Clone)]
pub struct TransferHandle {
    events: EventSender,
    updates: Arc<Mutex<Option<UpdateReceiver>>>,
}

impl TransferHandle {
    fn post(&self, event: TransferEvent) {
        if self.events.send(event).is_err() {
            debug!("Transfer already finished");
        }
    }

    pub fn get_printer_attributes(&self) {
        self.post(TransferEvent::GetPrinterAttributes);
    }

    pub fn create_job(&self) {
        self.post(TransferEvent::CreateJob);
    }

    pub fn get_event(&self) {
        self.post(TransferEvent::GetEvent);
    }

    pub fn send_document(&self) {
        self.post(TransferEvent::SendDocument);
    }

    pub fn start_event_channel(&self) {
        self.post(TransferEvent::StartEventChannel);
    }

    /// User cancel.
    pub fn cancel(&self) {
        self.post(TransferEvent::Cancel);
    }

    /// Bluetooth went away underneath the job.
    pub fn force_close(&self, reason: impl Into<String>) {
        self.post(TransferEvent::ForceClose(reason.into()));
    }

    /// Progress stream for the front end. Only the first caller gets it.
    pub fn updates(&self) -> Option<UpdateReceiver> {
        self.updates.lock().take()
    }

    /// Resolves once the transfer has finished.
    pub async fn closed(&self) {
        self.events.closed().await
    }
}

/// Coordinator settings taken from the config file.
#[derive(Debug, Clone)]
struct Settings {
    connect_timeout: Duration,
    fail_debounce: Duration,
    supported_formats: Vec<String>,
}

pub struct Transfer {
    batch: Batch,
    settings: Settings,
    ctx: SessionContext,
    store: ShareStore,
    connector: Arc<dyn Connector>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    updates: UpdateSender,

    session: Option<JobSession>,
    event_session: Option<EventSession>,
    job_state: Option<Arc<JobState>>,
    soap: Option<Arc<Mutex<SoapState>>>,
    current_share: Option<Share>,

    job_channel: Option<u8>,
    status_channel: Option<u8>,
    connect_job: Option<JoinHandle<()>>,
    connect_status: Option<JoinHandle<()>>,
    sdp_task: Option<JoinHandle<()>>,

    result_message: Option<String>,
    transfer_status: i32,
    cancelled: bool,
    force_close: Option<String>,
    finished: bool,
}

impl Transfer {
    pub fn new(
        config: &Config,
        store: ShareStore,
        connector: Arc<dyn Connector>,
        batch: Batch,
    ) -> (Self, TransferHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates, updates_rx) = mpsc::unbounded_channel();
        let ctx = SessionContext::new(store.clone(), SessionSender::new(events_tx.clone()), config);

        let handle = TransferHandle {
            events: events_tx.clone(),
            updates: Arc::new(Mutex::new(Some(updates_rx))),
        };
        let transfer = Self {
            batch,
            settings: Settings {
                connect_timeout: Duration::from_secs(config.bluetooth.connect_timeout_secs),
                fail_debounce: Duration::from_millis(config.transfer.fail_debounce_ms),
                supported_formats: config.printer.supported_formats.clone(),
            },
            ctx,
            store,
            connector,
            events_tx,
            events_rx,
            updates,
            session: None,
            event_session: None,
            job_state: None,
            soap: None,
            current_share: None,
            job_channel: None,
            status_channel: None,
            connect_job: None,
            connect_status: None,
            sdp_task: None,
            result_message: None,
            transfer_status: 0,
            cancelled: false,
            force_close: None,
            finished: false,
        };
        (transfer, handle)
    }

    /// Drive the batch to completion.
    pub async fn run(mut self) -> TransferOutcome {
        info!(
            "Starting transfer of batch {} to {}",
            self.batch.id, self.batch.destination
        );

        self.start().await;

        while !self.finished {
            let Some(event) = self.events_rx.recv().await else {
                break;
            };
            self.dispatch(event).await;
        }

        self.shutdown().await;

        let message = self.result_message.clone();
        info!(
            "Batch {} {}: {}",
            self.batch.id,
            self.batch.status.as_str(),
            message.as_deref().unwrap_or("no result")
        );
        self.update(TransferUpdate::Finished {
            batch: self.batch.status,
            message: message.clone(),
        });

        TransferOutcome {
            batch: self.batch.status,
            message,
            shares: self.batch.shares().to_vec(),
        }
    }

    async fn start(&mut self) {
        if let Some(share) = self.batch.pending_share() {
            persist_status(&self.store, share.id, ShareStatus::Pending);
        }

        match self.connector.is_powered().await {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                error!("Cannot start transfer while Bluetooth is off");
                self.mark_batch_failed(ShareStatus::UnknownError).await;
                self.batch.status = BatchStatus::Failed;
                self.finished = true;
                return;
            }
        }

        let destination = self.batch.destination;
        let cached_formats = match self.store.formats(&destination) {
            Ok(formats) => formats,
            Err(e) => {
                warn!("Cannot read cached printer formats: {}", e);
                None
            }
        };
        let formats = cached_formats
            .clone()
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| self.settings.supported_formats.clone());

        if let Some(share) = self.batch.pending_share().cloned() {
            let file_name = share
                .uri
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !is_supported_format(&formats, &share.mime_type, &file_name) {
                warn!(
                    "Printer does not accept {} ({}), formats: {:?}",
                    file_name, share.mime_type, formats
                );
                self.mark_batch_failed(ShareStatus::NotAcceptable).await;
                self.batch.status = BatchStatus::Failed;
                self.result_message =
                    Some(format!("Printer does not support {}", share.mime_type));
                self.finished = true;
                return;
            }
        }

        let job = self.cached_channel(ServiceClass::DirectPrinting);
        let status = self.cached_channel(ServiceClass::PrintingStatus);
        if let (Some(job), Some(status)) = (job, status) {
            debug!(
                "Job channel {} and status channel {} from cache for {}",
                job, status, destination
            );
            self.post(TransferEvent::SdpResult {
                job: Some(job),
                status: Some(status),
            });
            return;
        }

        debug!("Service channels of {} not cached, running SDP", destination);
        let connector = self.connector.clone();
        let tx = self.events_tx.clone();
        self.sdp_task = Some(tokio::spawn(async move {
            let resolve = |service| {
                let connector = connector.clone();
                async move {
                    match connector.resolve_channel(destination, service).await {
                        Ok(channel) => channel,
                        Err(e) => {
                            warn!("SDP for {:?} failed: {}", service, e);
                            None
                        }
                    }
                }
            };
            let job = resolve(ServiceClass::DirectPrinting).await;
            let status = resolve(ServiceClass::PrintingStatus).await;
            let _ = tx.send(TransferEvent::SdpResult { job, status });
        }));
    }

    fn cached_channel(&self, service: ServiceClass) -> Option<u8> {
        match self.store.channel(&self.batch.destination, service) {
            Ok(channel) => channel,
            Err(e) => {
                warn!("Cannot read channel cache: {}", e);
                None
            }
        }
    }

    async fn dispatch(&mut self, event: TransferEvent) {
        debug!("Transfer event {:?}", event);
        match event {
            TransferEvent::SdpResult { job, status } => self.on_sdp_result(job, status).await,
            TransferEvent::RfcommConnected { kind, transport } => {
                self.on_rfcomm_connected(kind, transport)
            }
            TransferEvent::RfcommError { kind, reason } => {
                self.on_rfcomm_error(kind, &reason).await
            }
            TransferEvent::ConnectTimeout(kind) => self.on_connect_timeout(kind).await,
            TransferEvent::GetPrinterAttributes => self.trigger(SoapProcess::GetAttribute),
            TransferEvent::CreateJob => self.trigger(SoapProcess::CreateJob),
            TransferEvent::GetEvent => self.trigger(SoapProcess::GetEvent),
            TransferEvent::SendDocument => self.trigger(SoapProcess::SendDocument),
            TransferEvent::Cancel => {
                self.cancelled = true;
                self.cancel().await;
            }
            TransferEvent::StartEventChannel => self.start_event_channel(),
            TransferEvent::ForceClose(reason) => {
                warn!("Emergency stop: {}", reason);
                self.force_close = Some(reason);
                self.cancel().await;
                self.update(TransferUpdate::CloseSurfaces);
            }
            TransferEvent::Session(msg) => self.on_session_message(msg).await,
        }
    }

    async fn on_sdp_result(&mut self, job: Option<u8>, status: Option<u8>) {
        self.sdp_task = None;
        let Some(job) = job else {
            error!("SDP query failed for {}", self.batch.destination);
            self.mark_batch_failed(ShareStatus::ConnectionError).await;
            self.batch.status = BatchStatus::Failed;
            self.result_message = Some(SDP_FAILED_MSG.to_string());
            self.update(TransferUpdate::CloseSurfaces);
            self.finished = true;
            return;
        };
        if status.is_none() {
            warn!("Printer has no status channel, job will run without events");
        }
        self.job_channel = Some(job);
        self.status_channel = status;
        self.connect(ChannelKind::Job, job);
    }

    /// Open an RFCOMM channel in the background, with a timeout message.
    fn connect(&mut self, kind: ChannelKind, channel: u8) {
        info!("Connecting {:?} channel {}", kind, channel);
        let connector = self.connector.clone();
        let destination = self.batch.destination;
        let tx = self.events_tx.clone();
        let task = tokio::spawn(async move {
            let event = match connector.connect(destination, channel).await {
                Ok(transport) => TransferEvent::RfcommConnected { kind, transport },
                Err(e) => TransferEvent::RfcommError {
                    kind,
                    reason: e.to_string(),
                },
            };
            let _ = tx.send(event);
        });
        *self.connect_slot(kind) = Some(task);

        let tx = self.events_tx.clone();
        let timeout = self.settings.connect_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(TransferEvent::ConnectTimeout(kind));
        });
    }

    fn connect_slot(&mut self, kind: ChannelKind) -> &mut Option<JoinHandle<()>> {
        match kind {
            ChannelKind::Job => &mut self.connect_job,
            ChannelKind::Status => &mut self.connect_status,
        }
    }

    fn on_rfcomm_connected(&mut self, kind: ChannelKind, transport: BoxedTransport) {
        *self.connect_slot(kind) = None;
        self.cache_channels();

        match kind {
            ChannelKind::Job => self.start_job_session(transport),
            ChannelKind::Status => self.start_event_session(transport),
        }
    }

    fn cache_channels(&self) {
        let destination = &self.batch.destination;
        let mut result = Ok(());
        if let Some(job) = self.job_channel {
            result = result.and(
                self.store
                    .set_channel(destination, ServiceClass::DirectPrinting, job),
            );
        }
        if let Some(status) = self.status_channel {
            result = result.and(
                self.store
                    .set_channel(destination, ServiceClass::PrintingStatus, status),
            );
        }
        if let Err(e) = result {
            warn!("Cannot cache service channels: {}", e);
        }
    }

    fn start_job_session(&mut self, transport: BoxedTransport) {
        if self.session.is_some() {
            warn!("Job channel connected twice, dropping the new transport");
            return;
        }
        self.batch.status = BatchStatus::Running;
        let Some(share) = self.batch.take_pending() else {
            error!("Job channel connected but the batch has nothing to send");
            return;
        };
        info!(
            "Start session for share {} of batch {}",
            share.id, self.batch.id
        );
        self.current_share = Some(share.clone());

        let session = JobSession::start(transport, share, self.ctx.clone());
        self.job_state = Some(session.state());
        self.soap = Some(session.soap());
        self.session = Some(session);
        self.update(TransferUpdate::Connected);
    }

    fn start_event_channel(&mut self) {
        let Some(channel) = self.status_channel else {
            warn!("Status channel has not been discovered");
            self.update(TransferUpdate::StatusChannelConnected(false));
            return;
        };
        if self.session.is_none() {
            warn!("Status channel requested before the job channel connected");
            return;
        }
        if self.event_session.is_some() || self.connect_status.is_some() {
            debug!("Status channel already started");
            return;
        }
        self.connect(ChannelKind::Status, channel);
    }

    fn start_event_session(&mut self, transport: BoxedTransport) {
        let Some(soap) = self.soap.clone() else {
            warn!("Status channel connected without a job channel");
            return;
        };
        if self.event_session.is_some() {
            return;
        }
        let job_id = soap.lock().job_id_u32().unwrap_or_else(|| {
            warn!("Starting status channel before a job was created");
            0
        });
        self.event_session = Some(EventSession::start(
            transport,
            job_id,
            soap,
            self.ctx.clone(),
        ));
    }

    async fn on_rfcomm_error(&mut self, kind: ChannelKind, reason: &str) {
        error!("RFCOMM {:?} connect failed: {}", kind, reason);
        *self.connect_slot(kind) = None;

        let destination = self.batch.destination;
        for service in [ServiceClass::DirectPrinting, ServiceClass::PrintingStatus] {
            if let Err(e) = self.store.remove_channel(&destination, service) {
                warn!("Cannot clear cached channel: {}", e);
            }
        }

        self.mark_batch_failed(ShareStatus::ConnectionError).await;
        self.batch.status = BatchStatus::Failed;
        self.transfer_status = ShareStatus::ConnectionError.code();
        self.update(TransferUpdate::CloseSurfaces);
        self.print_result_msg();

        match &self.session {
            // The job channel's completion ends the transfer.
            Some(session) => session.stop(),
            None => self.finished = true,
        }
    }

    async fn on_connect_timeout(&mut self, kind: ChannelKind) {
        let Some(task) = self.connect_slot(kind).take() else {
            return;
        };
        if task.is_finished() {
            return;
        }
        task.abort();
        self.on_rfcomm_error(kind, "connect timed out").await;
    }

    fn trigger(&self, process: SoapProcess) {
        match &self.job_state {
            Some(state) => {
                state.request(process);
            }
            None => warn!("Ignoring {} before the job channel is up", process.as_str()),
        }
    }

    async fn cancel(&mut self) {
        info!("Cancelling batch {}", self.batch.id);
        if let Some(state) = &self.job_state {
            state.request(SoapProcess::Cancel);
            if self.event_session.is_some() {
                if let Some(soap) = &self.soap {
                    soap.lock().mark_cancelled();
                }
            }
            return;
        }

        // Nothing connected yet: drop the attempts and give up here.
        for task in [
            self.sdp_task.take(),
            self.connect_job.take(),
            self.connect_status.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
        self.mark_batch_cancelled();
        self.update(TransferUpdate::CloseSurfaces);
        self.print_result_msg();
        self.finished = true;
    }

    async fn on_session_message(&mut self, msg: SessionMessage) {
        match msg {
            SessionMessage::AttributesReceived(attrs) => {
                if !attrs.document_formats.is_empty() {
                    if let Err(e) = self.store.set_printer(
                        &self.batch.destination,
                        attrs.name.as_deref(),
                        &attrs.document_formats,
                    ) {
                        warn!("Cannot cache printer formats: {}", e);
                    }
                }
                self.update(TransferUpdate::PrinterReady(attrs));
            }
            SessionMessage::JobCreated(id) => self.update(TransferUpdate::JobCreated(id)),
            SessionMessage::FileSending(sending) => {
                debug!("File sending: {}", sending);
                if let Some(soap) = &self.soap {
                    soap.lock().file_sending = sending;
                }
            }
            SessionMessage::Progress {
                share_id,
                sent,
                total,
            } => {
                if let Some(share) = self.batch.share_mut(share_id) {
                    share.current_bytes = sent;
                    share.total_bytes = total;
                }
                self.update(TransferUpdate::Progress {
                    share_id,
                    sent,
                    total,
                });
            }
            SessionMessage::StatusConnChange(connected) => {
                if let Some(state) = &self.job_state {
                    state.set_event_connected(connected);
                }
                self.update(TransferUpdate::StatusChannelConnected(connected));
            }
            SessionMessage::EventReport {
                job_state,
                printer_state,
            } => self.update(TransferUpdate::PrinterEvent {
                job_state,
                printer_state,
            }),
            SessionMessage::ShareComplete(share) => self.on_share_complete(share),
            SessionMessage::EventComplete => {
                debug!("Status channel reports the job is over");
                if let Some(event) = &self.event_session {
                    event.stop();
                }
            }
            SessionMessage::SessionStop => {
                let sending = self
                    .soap
                    .as_ref()
                    .map(|s| s.lock().file_sending)
                    .unwrap_or(false);
                if !sending {
                    if let Some(session) = &self.session {
                        session.stop();
                    }
                }
            }
            SessionMessage::SessionError { share, error } => {
                warn!("Session error on share {}: {}", share.id, error);
                self.record_share(&share);
                if self.event_connected() {
                    if let Some(event) = &self.event_session {
                        event.stop();
                    }
                } else if let Some(session) = &self.session {
                    session.stop();
                }
            }
            SessionMessage::SessionComplete(share) => self.on_session_complete(share),
        }
    }

    fn on_share_complete(&mut self, share: Share) {
        info!("Share {} delivered", share.id);
        self.record_share(&share);
        self.update(TransferUpdate::ShareFinished {
            share_id: share.id,
            status: share.status,
        });

        if let Some(next) = self.batch.take_pending() {
            info!("Continuing with share {} of batch {}", next.id, self.batch.id);
            self.current_share = Some(next.clone());
            if let Some(session) = &self.session {
                session.add_share(next);
            }
            return;
        }

        debug!("All shares of batch {} sent", self.batch.id);
        let completed = self
            .soap
            .as_ref()
            .map(|s| s.lock().job_status == "completed")
            .unwrap_or(false);
        let event_connected = self.event_connected();
        if completed && event_connected {
            if let Some(event) = &self.event_session {
                event.stop();
            }
        } else if !event_connected {
            if let Some(session) = &self.session {
                session.stop();
            }
        }
    }

    fn on_session_complete(&mut self, share: Share) {
        info!("Job channel closed for batch {}", self.batch.id);
        self.record_share(&share);

        let job_status = self
            .soap
            .as_ref()
            .map(|s| s.lock().job_status.clone())
            .unwrap_or_default();

        let finished = if self.event_session.is_some() {
            job_status == "completed"
        } else {
            share.status == ShareStatus::Success && self.batch.status != BatchStatus::Failed
        };

        if finished {
            self.batch.status = BatchStatus::Finished;
            self.tick_share_status(&share);
        } else {
            self.batch.status = BatchStatus::Failed;
            let status = if share.status.code() > ShareStatus::Success.code() {
                share.status
            } else {
                ShareStatus::UnknownError
            };
            self.mark_batch_error(&share, status);
        }

        self.update(TransferUpdate::CloseSurfaces);
        self.print_result_msg();
        self.finished = true;
    }

    fn event_connected(&self) -> bool {
        self.event_session
            .as_ref()
            .map(EventSession::is_connected)
            .unwrap_or(false)
    }

    /// Mirror a share reported by a session into the batch.
    fn record_share(&mut self, share: &Share) {
        if let Some(entry) = self.batch.share_mut(share.id) {
            entry.status = share.status;
            entry.current_bytes = share.current_bytes;
            entry.total_bytes = share.total_bytes;
        }
        if let Some(current) = self.current_share.as_mut() {
            if current.id == share.id {
                *current = share.clone();
            }
        }
    }

    /// Mark every unfinished share failed with `reason`, or with the
    /// current share's own error if it has one.
    pub(crate) async fn mark_batch_failed(&mut self, mut reason: ShareStatus) {
        if !self.settings.fail_debounce.is_zero() {
            tokio::time::sleep(self.settings.fail_debounce).await;
        }

        debug!("Marking unfinished shares of batch {} failed", self.batch.id);
        if let Some(current) = &self.current_share {
            if current.status.is_error() {
                reason = current.status;
            }
            if current.direction == Direction::Inbound {
                if let Some(file) = &current.file_name {
                    remove_partial_file(file);
                }
            }
        }

        let store = self.store.clone();
        for share in self.batch.shares_mut() {
            if share.status.is_completed() {
                continue;
            }
            share.status = reason;
            persist_status(&store, share.id, reason);
            match share.direction {
                Direction::Outbound => {
                    if let Some(hint) = FileHint::for_share(share) {
                        if let Err(e) = store.update_file_info(share.id, &hint) {
                            warn!("Cannot record file hint: {}", e);
                        }
                    }
                }
                Direction::Inbound => {
                    if let Some(file) = &share.file_name {
                        remove_partial_file(file);
                    }
                }
            }
        }
    }

    pub(crate) fn mark_batch_error(&mut self, share: &Share, status: ShareStatus) {
        debug!("Share {} failed with {}", share.id, status);
        persist_status(&self.store, share.id, status);
        if let Err(e) = self.store.update_direction(share.id, share.direction) {
            warn!("Cannot update share {}: {}", share.id, e);
        }
        if let Some(entry) = self.batch.share_mut(share.id) {
            entry.status = status;
        }
    }

    pub(crate) fn mark_batch_cancelled(&mut self) {
        let Some(id) = self.batch.pending_share().map(|s| s.id) else {
            return;
        };
        self.batch.status = BatchStatus::Failed;
        if let Some(share) = self.batch.share_mut(id) {
            share.status = ShareStatus::Canceled;
        }
        persist_status(&self.store, id, ShareStatus::Canceled);
    }

    /// Touch the share record so watchers see the batch change.
    fn tick_share_status(&self, share: &Share) {
        if let Err(e) = self.store.update_direction(share.id, share.direction) {
            warn!("Cannot update share {}: {}", share.id, e);
        }
    }

    /// Settle the result message. Later calls never replace it.
    fn print_result_msg(&mut self) {
        if self.result_message.is_some() {
            return;
        }
        let snapshot = self.soap.as_ref().map(|s| s.lock().clone());
        let inputs = ResultInputs {
            event: self
                .event_session
                .as_ref()
                .and(snapshot.as_ref()),
            job_refusal: self
                .session
                .as_ref()
                .and(snapshot.as_ref())
                .map(|s| s.refusal),
            transfer_status: self.transfer_status,
            cancelled: self.cancelled,
        };
        self.result_message = print_result_msg(&inputs).or_else(|| {
            self.force_close
                .as_ref()
                .map(|reason| format!("Printing failed due to \"{}\"", reason))
        });
        if let Some(msg) = &self.result_message {
            info!("{}", msg);
        }
    }

    async fn shutdown(&mut self) {
        for task in [
            self.sdp_task.take(),
            self.connect_job.take(),
            self.connect_status.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }

        if let Some(mut event) = self.event_session.take() {
            event.stop();
            if tokio::time::timeout(EVENT_SHUTDOWN_GRACE, event.join())
                .await
                .is_err()
            {
                warn!("Status channel did not disconnect in time");
                event.abort_io();
            }
        }
        if let Some(mut session) = self.session.take() {
            session.stop();
            session.join().await;
        }
    }

    fn post(&self, event: TransferEvent) {
        let _ = self.events_tx.send(event);
    }

    fn update(&self, update: TransferUpdate) {
        let _ = self.updates.send(update);
    }
}

fn remove_partial_file(path: &str) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!("Cannot remove partial file {}: {}", path, e);
    }
}
