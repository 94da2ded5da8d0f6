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

//! Scripted BPP printer and connector shared by the integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

use bpp_print::bluetooth::{BoxedTransport, Connector, DeviceAddress, ServiceClass};
use bpp_print::bpp::TransferHandle;
use bpp_print::config::Config;
use bpp_print::events::TransferUpdate;
use bpp_print::obex::packet::{ABORT, CONNECT, DISCONNECT};
use bpp_print::obex::{
    read_packet, ConnectParams, HeaderSet, RequestPacket, ResponseCode, ResponsePacket,
    MAX_PACKET_SIZE,
};

pub const PRINTER: DeviceAddress = DeviceAddress::new([0x00, 0x1B, 0xDC, 0x01, 0x02, 0x03]);
pub const JOB_CHANNEL: u8 = 3;
pub const STATUS_CHANNEL: u8 = 5;

/// How the scripted printer answers.
#[derive(Debug, Clone)]
pub struct PrinterScript {
    pub name: String,
    pub formats: Vec<String>,
    pub job_id: u32,
    /// Final response to a document PUT.
    pub document_response: ResponseCode,
    /// Answer the n-th packet of a document (counted from 1) with this
    /// code instead of CONTINUE.
    pub reject_packet: Option<(usize, ResponseCode)>,
    /// Job states reported once `expected_documents` arrived. The last
    /// one repeats.
    pub job_states: Vec<String>,
    pub expected_documents: usize,
    /// Reported with every GetEvent when set.
    pub state_reason: Option<String>,
    /// SOAP actions refused with the given code.
    pub refuse: Vec<(String, ResponseCode)>,
}

impl Default for PrinterScript {
    fn default() -> Self {
        Self {
            name: "Mock Printer".to_string(),
            formats: vec!["text/plain".to_string(), "application/pdf".to_string()],
            job_id: 7,
            document_response: ResponseCode::OK,
            reject_packet: None,
            job_states: vec!["processing".to_string(), "completed".to_string()],
            expected_documents: 1,
            state_reason: None,
            refuse: Vec::new(),
        }
    }
}

impl PrinterScript {
    pub fn refusing(mut self, action: &str, code: ResponseCode) -> Self {
        self.refuse.push((action.to_string(), code));
        self
    }
}

/// What the printer saw.
#[derive(Debug, Default)]
pub struct PrinterLog {
    pub targets: Vec<Vec<u8>>,
    pub soap_actions: Vec<String>,
    pub documents: Vec<Vec<u8>>,
    pub document_headers: Vec<HeaderSet>,
    /// BODY length of every document PUT packet, final one included.
    pub put_bodies: Vec<usize>,
    pub aborts: usize,
    pub disconnects: usize,
    events_served: usize,
}

pub type SharedLog = Arc<Mutex<PrinterLog>>;

/// Serve one OBEX connection until the client goes away.
pub async fn serve<S>(mut stream: S, script: Arc<PrinterScript>, log: SharedLog)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut soap_body: Vec<u8> = Vec::new();
    let mut document: Option<Vec<u8>> = None;
    let mut packets = 0;

    loop {
        let Ok(raw) = read_packet(&mut stream).await else {
            break;
        };
        let Ok(request) = RequestPacket::decode(&raw) else {
            break;
        };

        let response = if request.opcode == CONNECT {
            log.lock()
                .targets
                .push(request.headers.target().unwrap_or_default().to_vec());
            let mut headers = HeaderSet::new();
            headers.set_connection_id(1);
            ResponsePacket {
                code: ResponseCode::OK,
                connect: Some(ConnectParams::new(MAX_PACKET_SIZE as u16)),
                headers,
            }
        } else if request.opcode == DISCONNECT {
            log.lock().disconnects += 1;
            ok()
        } else if request.opcode == ABORT {
            log.lock().aborts += 1;
            document = None;
            soap_body.clear();
            ok()
        } else if request.is_put() {
            let first = document.is_none();
            if first {
                packets = 0;
                log.lock().document_headers.push(request.headers.clone());
            }
            packets += 1;
            let doc = document.get_or_insert_with(Vec::new);
            let body_len = request.headers.body().map_or(0, |(chunk, _)| chunk.len());
            if let Some((chunk, _)) = request.headers.body() {
                doc.extend_from_slice(chunk);
            }
            log.lock().put_bodies.push(body_len);
            if let Some((at, code)) = script.reject_packet {
                if at == packets {
                    document = None;
                    send(&mut stream, ResponsePacket::new(code, HeaderSet::new())).await;
                    continue;
                }
            }
            if request.is_final() {
                let doc = document.take().unwrap_or_default();
                if script.document_response == ResponseCode::OK {
                    log.lock().documents.push(doc);
                }
                ResponsePacket::new(script.document_response, HeaderSet::new())
            } else {
                ResponsePacket::new(ResponseCode::CONTINUE, HeaderSet::new())
            }
        } else if request.is_get() {
            if let Some((chunk, _)) = request.headers.body() {
                soap_body.extend_from_slice(chunk);
            }
            if !request.is_final() {
                ResponsePacket::new(ResponseCode::CONTINUE, HeaderSet::new())
            } else {
                let text = String::from_utf8_lossy(&soap_body).into_owned();
                soap_body.clear();
                soap_reply(&text, &script, &log)
            }
        } else {
            ResponsePacket::new(ResponseCode::BAD_REQUEST, HeaderSet::new())
        };

        send(&mut stream, response).await;
    }
}

fn ok() -> ResponsePacket {
    ResponsePacket::new(ResponseCode::OK, HeaderSet::new())
}

async fn send<S: AsyncWrite + Unpin>(stream: &mut S, response: ResponsePacket) {
    if let Ok(bytes) = response.encode() {
        let _ = stream.write_all(&bytes).await;
        let _ = stream.flush().await;
    }
}

fn soap_action(request: &str) -> String {
    request
        .split("SOAPACTION:")
        .nth(1)
        .and_then(|rest| rest.split('#').nth(1))
        .and_then(|rest| rest.split('"').next())
        .unwrap_or_default()
        .to_string()
}

fn soap_reply(request: &str, script: &PrinterScript, log: &SharedLog) -> ResponsePacket {
    let action = soap_action(request);
    log.lock().soap_actions.push(action.clone());

    if let Some((_, code)) = script.refuse.iter().find(|(a, _)| *a == action) {
        return ResponsePacket::new(*code, HeaderSet::new());
    }

    let inner = match action.as_str() {
        "GetPrinterAttributes" => {
            let formats: String = script
                .formats
                .iter()
                .map(|f| format!("<DocumentFormat>{}</DocumentFormat>", f))
                .collect();
            format!(
                "<PrinterName>{}</PrinterName><PrinterState>idle</PrinterState>\
                 <DocumentFormatsSupported>{}</DocumentFormatsSupported>",
                script.name, formats
            )
        }
        "CreateJob" => format!("<JobId>{}</JobId>", script.job_id),
        "CancelJob" => format!("<JobId>{}</JobId>", script.job_id),
        "GetEvent" => {
            let mut log = log.lock();
            let state = if log.documents.len() < script.expected_documents {
                "waiting".to_string()
            } else {
                let index = log.events_served.min(script.job_states.len().saturating_sub(1));
                log.events_served += 1;
                script
                    .job_states
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| "processing".to_string())
            };
            let reason = script
                .state_reason
                .as_ref()
                .map(|r| format!("<PrinterStateReasons>{}</PrinterStateReasons>", r))
                .unwrap_or_default();
            format!(
                "<JobId>{}</JobId><JobState>{}</JobState>\
                 <PrinterState>processing</PrinterState>{}",
                script.job_id, state, reason
            )
        }
        _ => String::new(),
    };

    let body = format!(
        "<s:Envelope><s:Body><u:{action}Response>{inner}\
         <OperationStatus>0x0000</OperationStatus></u:{action}Response></s:Body></s:Envelope>",
        action = action,
        inner = inner
    );
    let mut headers = HeaderSet::new();
    headers.set_length(body.len() as u32);
    headers.set_body(body.into_bytes(), true);
    ResponsePacket::new(ResponseCode::OK, headers)
}

/// Client end of a fresh connection to the scripted printer.
pub fn connect_printer(script: Arc<PrinterScript>, log: SharedLog) -> tokio::io::DuplexStream {
    let (client, server) = tokio::io::duplex(256 * 1024);
    tokio::spawn(serve(server, script, log));
    client
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Serve,
    Fail,
    Hang,
}

/// Connector that hands out connections to the scripted printer.
pub struct MockConnector {
    pub powered: bool,
    pub job_channel: Option<u8>,
    pub status_channel: Option<u8>,
    pub behavior: ConnectBehavior,
    pub script: Arc<PrinterScript>,
    pub log: SharedLog,
    pub resolves: AtomicUsize,
    pub connects: Mutex<Vec<u8>>,
}

impl MockConnector {
    pub fn new(script: PrinterScript) -> Self {
        Self {
            powered: true,
            job_channel: Some(JOB_CHANNEL),
            status_channel: Some(STATUS_CHANNEL),
            behavior: ConnectBehavior::Serve,
            script: Arc::new(script),
            log: SharedLog::default(),
            resolves: AtomicUsize::new(0),
            connects: Mutex::new(Vec::new()),
        }
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn is_powered(&self) -> Result<bool> {
        Ok(self.powered)
    }

    async fn resolve_channel(
        &self,
        _device: DeviceAddress,
        service: ServiceClass,
    ) -> Result<Option<u8>> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        Ok(match service {
            ServiceClass::DirectPrinting => self.job_channel,
            ServiceClass::PrintingStatus => self.status_channel,
        })
    }

    async fn connect(&self, _device: DeviceAddress, channel: u8) -> Result<BoxedTransport> {
        self.connects.lock().push(channel);
        match self.behavior {
            ConnectBehavior::Serve => Ok(Box::new(connect_printer(
                self.script.clone(),
                self.log.clone(),
            ))),
            ConnectBehavior::Fail => Err(anyhow!("connection refused")),
            ConnectBehavior::Hang => {
                futures::future::pending::<()>().await;
                Err(anyhow!("unreachable"))
            }
        }
    }
}

/// Config with short timers.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.bluetooth.connect_timeout_secs = 1;
    config.transfer.idle_poll_ms = 10;
    config.transfer.event_poll_ms = 10;
    config.transfer.fail_debounce_ms = 0;
    config
}

pub fn write_document(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}

/// What the front end does once the printer created the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontEnd {
    /// Start the status channel, then send the document.
    Print,
    /// Cancel without starting the status channel.
    CancelAfterJob,
    /// Start the status channel, then cancel.
    CancelWithStatus,
    /// Report a lost link without starting the status channel.
    DisconnectAfterJob,
}

/// Drive `handle` like the command line does. Returns every update seen.
pub fn drive(handle: TransferHandle, front_end: FrontEnd) -> JoinHandle<Vec<TransferUpdate>> {
    let mut updates = handle.updates().expect("updates already taken");
    tokio::spawn(async move {
        let mut seen = Vec::new();
        let mut status_handled = false;
        while let Some(update) = updates.recv().await {
            match &update {
                TransferUpdate::PrinterReady(_) => handle.create_job(),
                TransferUpdate::JobCreated(_) => match front_end {
                    FrontEnd::Print | FrontEnd::CancelWithStatus => handle.start_event_channel(),
                    FrontEnd::CancelAfterJob => handle.cancel(),
                    FrontEnd::DisconnectAfterJob => {
                        handle.force_close("Printer got disconnected!!")
                    }
                },
                TransferUpdate::StatusChannelConnected(_) if !status_handled => {
                    status_handled = true;
                    match front_end {
                        FrontEnd::CancelWithStatus => handle.cancel(),
                        _ => handle.send_document(),
                    }
                }
                _ => {}
            }
            seen.push(update);
        }
        seen
    })
}
