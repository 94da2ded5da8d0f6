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

//! The one-line result shown when a print job ends.

use crate::soap::{SoapState, NO_REASON, OPERATION_OK};

/// Job states reported to the user as "Printing has been ...".
const REPORTED_JOB_STATES: [&str; 4] = ["stopped", "aborted", "cancelled", "unknown"];

/// What the coordinator knows when the job ends.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultInputs<'a> {
    /// SOAP state, when a status channel was started.
    pub event: Option<&'a SoapState>,
    /// Refusal recorded by the job channel, when one was started.
    pub job_refusal: Option<i32>,
    /// Transfer-level failure code, 0 if none.
    pub transfer_status: i32,
    pub cancelled: bool,
}

/// Pick the most specific explanation available. The first match wins.
pub fn print_result_msg(inputs: &ResultInputs<'_>) -> Option<String> {
    if let Some(soap) = inputs.event {
        if soap.printer_state_reason != NO_REASON {
            return Some(format!(
                "Printing Fail due to \"{}\"",
                soap.printer_state_reason
            ));
        }
        if soap.operation_status != OPERATION_OK {
            return Some(format!(
                "Printer Operation Fail ({})",
                soap.operation_status
            ));
        }
        if REPORTED_JOB_STATES.contains(&soap.job_status.as_str()) {
            return Some(format!("Printing has been {}", soap.job_status));
        }
        if soap.event_status != 0 {
            return Some(refused(soap.event_status as i32));
        }
        if soap.job_status == "completed" {
            return Some("Printing Completed Successfully".to_string());
        }
    }

    if let Some(code) = inputs.job_refusal.filter(|c| *c != 0) {
        return Some(refused(code));
    }
    if inputs.transfer_status != 0 {
        return Some(refused(inputs.transfer_status));
    }
    if inputs.cancelled {
        return Some("Printing has been cancelled".to_string());
    }
    None
}

fn refused(code: i32) -> String {
    format!("Printer refused request(0x{:x})", code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soap() -> SoapState {
        SoapState::new()
    }

    #[test]
    fn test_reason_beats_everything() {
        let mut state = soap();
        state.printer_state_reason = "media-jam".into();
        state.operation_status = "0x0401".into();
        state.job_status = "aborted".into();
        let inputs = ResultInputs {
            event: Some(&state),
            ..Default::default()
        };
        assert_eq!(
            print_result_msg(&inputs).as_deref(),
            Some("Printing Fail due to \"media-jam\"")
        );
    }

    #[test]
    fn test_priority_order() {
        let mut state = soap();
        state.operation_status = "0x0401".into();
        state.job_status = "aborted".into();
        let msg = |s: &SoapState| {
            print_result_msg(&ResultInputs {
                event: Some(s),
                ..Default::default()
            })
        };
        assert_eq!(msg(&state).as_deref(), Some("Printer Operation Fail (0x0401)"));

        state.operation_status = OPERATION_OK.into();
        assert_eq!(msg(&state).as_deref(), Some("Printing has been aborted"));

        state.job_status = "printing".into();
        state.event_status = 0xC3;
        assert_eq!(msg(&state).as_deref(), Some("Printer refused request(0xc3)"));

        state.event_status = 0;
        state.job_status = "completed".into();
        assert_eq!(msg(&state).as_deref(), Some("Printing Completed Successfully"));
    }

    #[test]
    fn test_fallbacks_without_status_channel() {
        let inputs = ResultInputs {
            job_refusal: Some(403),
            transfer_status: 497,
            cancelled: true,
            ..Default::default()
        };
        assert_eq!(
            print_result_msg(&inputs).as_deref(),
            Some("Printer refused request(0x193)")
        );

        let inputs = ResultInputs {
            job_refusal: Some(0),
            transfer_status: 497,
            ..Default::default()
        };
        assert_eq!(
            print_result_msg(&inputs).as_deref(),
            Some("Printer refused request(0x1f1)")
        );

        let inputs = ResultInputs {
            cancelled: true,
            ..Default::default()
        };
        assert_eq!(
            print_result_msg(&inputs).as_deref(),
            Some("Printing has been cancelled")
        );
        assert_eq!(print_result_msg(&ResultInputs::default()), None);
    }

    #[test]
    fn test_status_channel_without_verdict_falls_through() {
        let mut state = soap();
        state.job_status = "printing".into();
        let inputs = ResultInputs {
            event: Some(&state),
            job_refusal: Some(0xC6),
            ..Default::default()
        };
        assert_eq!(
            print_result_msg(&inputs).as_deref(),
            Some("Printer refused request(0xc6)")
        );
    }
}
