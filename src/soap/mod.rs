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

//! SOAP messages carried in OBEX GET requests.
//!
//! Requests are built from a [`JobTicket`] and the current [`SoapState`];
//! replies are folded back into the same state by [`SoapState::parse`].

mod xml;

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::{debug, warn};

pub use xml::{element_text, elements_text};

/// OBEX TYPE header of SOAP requests.
pub const SOAP_MIME_TYPE: &str = "x-obex/bt-SOAP";

const SERVICE_URN: &str = "urn:schemas-bluetooth-org:service:Printer:1";

/// Default printer state reason, meaning nothing to report.
pub const NO_REASON: &str = "none";

/// Default operation status, meaning success.
pub const OPERATION_OK: &str = "0x0000";

/// Printer operations used by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoapRequest {
    GetPrinterAttributes,
    CreateJob,
    CancelJob,
    GetEvent,
}

impl SoapRequest {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoapRequest::GetPrinterAttributes => "GET_PR_ATTR",
            SoapRequest::CreateJob => "CREATE_JOB",
            SoapRequest::CancelJob => "CANCEL_JOB",
            SoapRequest::GetEvent => "GET_EVENT",
        }
    }

    fn action(&self) -> &'static str {
        match self {
            SoapRequest::GetPrinterAttributes => "GetPrinterAttributes",
            SoapRequest::CreateJob => "CreateJob",
            SoapRequest::CancelJob => "CancelJob",
            SoapRequest::GetEvent => "GetEvent",
        }
    }
}

/// Print options sent with CreateJob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobTicket {
    pub job_name: String,
    pub user_name: String,
    pub copies: u32,
    /// `one-sided`, `two-sided-long-edge` or `two-sided-short-edge`.
    pub sides: String,
    pub number_up: u32,
    /// `portrait`, `landscape`, `reverse-landscape` or `reverse-portrait`.
    pub orientation: String,
    pub media_size: String,
    pub print_quality: String,
    pub cancel_on_lost_link: bool,
}

impl Default for JobTicket {
    fn default() -> Self {
        Self {
            job_name: "bpp-print".to_string(),
            user_name: std::env::var("USER").unwrap_or_else(|_| "user".to_string()),
            copies: 1,
            sides: "one-sided".to_string(),
            number_up: 1,
            orientation: "portrait".to_string(),
            media_size: "iso_a4_210x297mm".to_string(),
            print_quality: "normal".to_string(),
            cancel_on_lost_link: true,
        }
    }
}

/// Attributes returned by GetPrinterAttributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrinterAttributes {
    pub name: Option<String>,
    pub location: Option<String>,
    pub state: Option<String>,
    pub document_formats: Vec<String>,
    pub color_supported: Option<bool>,
    pub max_copies: Option<u32>,
    pub queued_jobs: Option<u32>,
}

/// Everything learned from the printer's SOAP replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapState {
    /// Job id in stored byte order (least significant byte first).
    pub job_id: Option<[u8; 4]>,
    /// Last `JobState` reported, empty until one arrives.
    pub job_status: String,
    pub printer_state: String,
    pub printer_state_reason: String,
    pub operation_status: String,
    /// Document bytes are being PUT on the job channel.
    pub file_sending: bool,
    pub cancel_requested: bool,
    /// Response code of a refused GetEvent, 0 if none.
    pub event_status: u8,
    /// Last refusal recorded by the job channel, 0 if none.
    pub refusal: i32,
    pub attributes: PrinterAttributes,
}

impl Default for SoapState {
    fn default() -> Self {
        Self {
            job_id: None,
            job_status: String::new(),
            printer_state: String::new(),
            printer_state_reason: NO_REASON.to_string(),
            operation_status: OPERATION_OK.to_string(),
            file_sending: false,
            cancel_requested: false,
            event_status: 0,
            refusal: 0,
            attributes: PrinterAttributes::default(),
        }
    }
}

impl SoapState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_id_u32(&self) -> Option<u32> {
        self.job_id.map(u32::from_le_bytes)
    }

    pub fn set_job_id(&mut self, id: u32) {
        self.job_id = Some(id.to_le_bytes());
    }

    /// Job has reached a state it will not leave.
    pub fn is_job_terminal(&self) -> bool {
        is_terminal_job_state(&self.job_status)
    }

    /// Record a user cancel. Later non-terminal job states are ignored.
    pub fn mark_cancelled(&mut self) {
        self.cancel_requested = true;
        self.job_status = "cancelled".to_string();
    }

    /// Fold a reply to `request` into the state.
    pub fn parse(&mut self, request: SoapRequest, body: &str) {
        debug!("Parsing {} response ({} bytes)", request.as_str(), body.len());

        if let Some(status) = element_text(body, "OperationStatus") {
            self.operation_status = status;
        }

        match request {
            SoapRequest::GetPrinterAttributes => self.parse_attributes(body),
            SoapRequest::CreateJob => match element_text(body, "JobId") {
                Some(id) => match parse_number(&id) {
                    Some(id) => self.set_job_id(id),
                    None => warn!("Printer sent unparsable JobId {:?}", id),
                },
                None => warn!("CreateJob response carries no JobId"),
            },
            SoapRequest::CancelJob => {}
            SoapRequest::GetEvent => {
                if let Some(state) = element_text(body, "JobState") {
                    self.update_job_status(state);
                }
                if let Some(state) = element_text(body, "PrinterState") {
                    self.printer_state = state;
                }
                if let Some(reason) = element_text(body, "PrinterStateReasons") {
                    self.printer_state_reason = if reason.is_empty() {
                        NO_REASON.to_string()
                    } else {
                        reason
                    };
                }
            }
        }
    }

    fn update_job_status(&mut self, state: String) {
        if self.cancel_requested && !is_terminal_job_state(&state) {
            debug!("Keeping cancelled job status over {:?}", state);
            return;
        }
        self.job_status = state;
    }

    fn parse_attributes(&mut self, body: &str) {
        let attrs = &mut self.attributes;
        attrs.name = element_text(body, "PrinterName").or(attrs.name.take());
        attrs.location = element_text(body, "PrinterLocation").or(attrs.location.take());
        if let Some(state) = element_text(body, "PrinterState") {
            self.printer_state = state.clone();
            attrs.state = Some(state);
        }
        let formats = elements_text(body, "DocumentFormat");
        if !formats.is_empty() {
            attrs.document_formats = formats;
        }
        if let Some(color) = element_text(body, "ColorSupported") {
            attrs.color_supported = Some(color.eq_ignore_ascii_case("true"));
        }
        if let Some(copies) = element_text(body, "MaxCopiesSupported") {
            attrs.max_copies = parse_number(&copies);
        }
        if let Some(queued) = element_text(body, "QueuedJobCount") {
            attrs.queued_jobs = parse_number(&queued);
        }
    }
}

/// Job states after which the printer reports nothing more.
pub fn is_terminal_job_state(state: &str) -> bool {
    matches!(state, "completed" | "aborted" | "cancelled" | "stopped")
}

fn parse_number(text: &str) -> Option<u32> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Serialize a request as the HTTP-style header block plus envelope.
pub fn build(request: SoapRequest, state: &SoapState, ticket: &JobTicket) -> String {
    let mut inner = String::new();
    let job_id = state.job_id_u32().unwrap_or(0);

    match request {
        SoapRequest::GetPrinterAttributes => {
            inner.push_str("<RequestedPrinterAttributes>\r\n");
            for attr in [
                "PrinterName",
                "PrinterLocation",
                "PrinterState",
                "PrinterStateReasons",
                "DocumentFormatsSupported",
                "ColorSupported",
                "MaxCopiesSupported",
                "QueuedJobCount",
            ] {
                let _ = write!(inner, "<PrinterAttribute>{}</PrinterAttribute>\r\n", attr);
            }
            inner.push_str("</RequestedPrinterAttributes>\r\n");
        }
        SoapRequest::CreateJob => {
            let _ = write!(
                inner,
                "<JobName>{}</JobName>\r\n\
                 <JobOriginatingUserName>{}</JobOriginatingUserName>\r\n\
                 <Copies>{}</Copies>\r\n\
                 <Sides>{}</Sides>\r\n\
                 <NumberUp>{}</NumberUp>\r\n\
                 <OrientationRequested>{}</OrientationRequested>\r\n\
                 <MediaSize>{}</MediaSize>\r\n\
                 <PrintQuality>{}</PrintQuality>\r\n\
                 <CancelOnLostLink>{}</CancelOnLostLink>\r\n",
                xml::escape(&ticket.job_name),
                xml::escape(&ticket.user_name),
                ticket.copies,
                xml::escape(&ticket.sides),
                ticket.number_up,
                xml::escape(&ticket.orientation),
                xml::escape(&ticket.media_size),
                xml::escape(&ticket.print_quality),
                ticket.cancel_on_lost_link,
            );
        }
        SoapRequest::CancelJob | SoapRequest::GetEvent => {
            let _ = write!(inner, "<JobId>{}</JobId>\r\n", job_id);
        }
    }

    let action = request.action();
    let envelope = format!(
        "<s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\r\n\
         <s:Body>\r\n\
         <u:{action} xmlns:u=\"{urn}\">\r\n\
         {inner}\
         </u:{action}>\r\n\
         </s:Body>\r\n\
         </s:Envelope>\r\n",
        action = action,
        urn = SERVICE_URN,
        inner = inner,
    );

    format!(
        "CONTENT-LENGTH: {}\r\n\
         CONTENT-TYPE: text/xml; charset=\"utf-8\"\r\n\
         SOAPACTION: \"{}#{}\"\r\n\r\n{}",
        envelope.len(),
        SERVICE_URN,
        action,
        envelope
    )
}
