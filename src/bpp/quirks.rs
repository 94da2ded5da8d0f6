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

//! Workarounds for printers and for file types with unreliable MIME types.

use tracing::info;

use crate::bluetooth::DeviceAddress;
use crate::obex::HeaderSet;

/// Application parameter tag carrying the job id in a document PUT.
pub const APP_PARAM_JOB_ID: u8 = 0x01;

/// Printers with this address prefix reject names with more than one dot.
const MULTI_DOT_PREFIX: &str = "00:04:48";

/// Application parameter block for a job id kept in stored byte order.
///
/// The stored bytes go out reversed: `[tag, 4, b3, b2, b1, b0]`.
pub fn job_id_app_param(job_id: [u8; 4]) -> [u8; 6] {
    [
        APP_PARAM_JOB_ID,
        4,
        job_id[3],
        job_id[2],
        job_id[1],
        job_id[0],
    ]
}

/// Name the printer at `destination` will accept for `file_name`, if it
/// differs from `file_name`.
pub fn quirk_file_name(destination: &DeviceAddress, file_name: &str) -> Option<String> {
    if !destination.has_prefix(MULTI_DOT_PREFIX) {
        return None;
    }
    let last_dot = file_name.rfind('.')?;
    let (stem, ext) = file_name.split_at(last_dot);
    if !stem.contains('.') {
        return None;
    }
    Some(format!("{}{}", stem.replace('.', "_"), ext))
}

/// Rewrite the NAME header for printers with filename quirks.
pub fn apply_remote_device_quirks(
    headers: &mut HeaderSet,
    destination: &DeviceAddress,
    file_name: &str,
) {
    if let Some(renamed) = quirk_file_name(destination, file_name) {
        info!(
            "Sending file \"{}\" as \"{}\" to work around printer filename quirk",
            file_name, renamed
        );
        headers.set_name(&renamed);
    }
}

/// MIME type implied by well-known extensions whose reported type is
/// often wrong. `None` keeps the reported type, as does a document with
/// no type at all.
pub fn check_unknown_mimetype(mime_type: &str, file_name: &str) -> Option<&'static str> {
    if mime_type.is_empty() {
        return None;
    }
    const TABLE: [(&str, &str); 6] = [
        (".vcf", "text/x-vcard"),
        (".vcs", "text/x-vcalendar"),
        (".vmg", "text/x-vmessage"),
        (".ical", "text/calendar"),
        (".msg", "text/x-vmessage"),
        (".htm", "application/vnd.pwg-xhtml-print+xml"),
    ];
    TABLE
        .iter()
        .find(|(ext, _)| file_name.ends_with(ext))
        .map(|(_, mime)| *mime)
}

/// MIME type to put on the wire for a document.
pub fn effective_mimetype(mime_type: &str, file_name: &str) -> String {
    check_unknown_mimetype(mime_type, file_name)
        .map(str::to_string)
        .unwrap_or_else(|| mime_type.to_string())
}

/// Whether a document type is printable given the printer's formats.
/// An empty list accepts everything.
pub fn is_supported_format(supported: &[String], mime_type: &str, file_name: &str) -> bool {
    if supported.is_empty() {
        return true;
    }
    let matches = |mime: &str| supported.iter().any(|f| f.contains(mime));
    if matches(mime_type) {
        return true;
    }
    check_unknown_mimetype(mime_type, file_name)
        .map(matches)
        .unwrap_or(false)
}
