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

//! Property tests for the wire helpers, quirks and the SOAP step machine.

use proptest::prelude::*;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::sync::CancellationToken;

use bpp_print::bluetooth::DeviceAddress;
use bpp_print::bpp::quirks::{
    check_unknown_mimetype, job_id_app_param, quirk_file_name, APP_PARAM_JOB_ID,
};
use bpp_print::obex::packet::CONNECT;
use bpp_print::obex::{
    read_packet, ConnectParams, HeaderSet, HeaderValue, ObexClient, RequestPacket, ResponseCode,
    ResponsePacket,
};
use bpp_print::soap::SoapState;
use bpp_print::state::{JobState, SoapProcess};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Answer CONNECT with `max`, every non-final PUT with CONTINUE and the
/// final one with OK. Returns the body bytes seen and the packet sizes.
async fn accept_put(mut server: DuplexStream, max: u16) -> (usize, Vec<usize>) {
    let mut total = 0;
    let mut sizes = Vec::new();
    loop {
        let Ok(raw) = read_packet(&mut server).await else {
            break;
        };
        let req = RequestPacket::decode(&raw).unwrap();
        let resp = if req.opcode == CONNECT {
            let mut resp = ResponsePacket::new(ResponseCode::OK, HeaderSet::new());
            resp.connect = Some(ConnectParams::new(max));
            resp
        } else {
            sizes.push(raw.len());
            if let Some((chunk, _)) = req.headers.body() {
                total += chunk.len();
            }
            let code = if req.is_final() {
                ResponseCode::OK
            } else {
                ResponseCode::CONTINUE
            };
            ResponsePacket::new(code, HeaderSet::new())
        };
        server.write_all(&resp.encode().unwrap()).await.unwrap();
        if req.is_put() && req.is_final() {
            break;
        }
    }
    (total, sizes)
}

fn arb_step() -> impl Strategy<Value = SoapProcess> {
    prop_oneof![
        Just(SoapProcess::Standby),
        Just(SoapProcess::Processing),
        Just(SoapProcess::GetAttribute),
        Just(SoapProcess::CreateJob),
        Just(SoapProcess::GetEvent),
        Just(SoapProcess::SendDocument),
        Just(SoapProcess::Cancel),
        Just(SoapProcess::Cancelling),
        Just(SoapProcess::Cancelled),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Every byte of the document arrives, whatever the chunking, and no
    /// request packet exceeds the negotiated size.
    #[test]
    fn written_bytes_match_declared_length(
        len in 0usize..20_000,
        max in 255u16..4096,
        chunk in 1usize..4096,
    ) {
        let (total, sizes, code) = runtime().block_on(async move {
            let (client_io, server) = tokio::io::duplex(70_000);
            let peer = tokio::spawn(accept_put(server, max));

            let mut client = ObexClient::new(client_io, 65_000, CancellationToken::new());
            client.connect(HeaderSet::new()).await.unwrap();

            let mut headers = HeaderSet::new();
            headers.set_name("page.txt");
            headers.set_length(len as u32);
            let data = vec![0x5Au8; len];
            let mut op = client.put(headers).unwrap();
            for piece in data.chunks(chunk.min(max as usize)) {
                let code = op.write_chunk(piece).await.unwrap();
                assert_eq!(code, ResponseCode::CONTINUE);
            }
            let code = op.finish().await.unwrap();
            drop(op);
            drop(client);

            let (total, sizes) = peer.await.unwrap();
            (total, sizes, code)
        });

        prop_assert_eq!(code, ResponseCode::OK);
        prop_assert_eq!(total, len);
        prop_assert!(sizes.iter().all(|s| *s <= max as usize));
    }

    /// A refusal ends the operation after one exchange.
    #[test]
    fn refusal_ends_put_immediately(raw in any::<u8>()) {
        let refusal = ResponseCode::from_u8(raw | 0x80);
        prop_assume!(refusal != ResponseCode::CONTINUE && refusal != ResponseCode::OK);

        let (packets, code, again) = runtime().block_on(async move {
            let (client_io, mut server) = tokio::io::duplex(70_000);
            let peer = tokio::spawn(async move {
                let mut puts = 0;
                while let Ok(raw) = read_packet(&mut server).await {
                    let req = RequestPacket::decode(&raw).unwrap();
                    let resp = if req.opcode == CONNECT {
                        let mut resp = ResponsePacket::new(ResponseCode::OK, HeaderSet::new());
                        resp.connect = Some(ConnectParams::new(1024));
                        resp
                    } else {
                        if req.is_put() {
                            puts += 1;
                        }
                        ResponsePacket::new(refusal, HeaderSet::new())
                    };
                    if server.write_all(&resp.encode().unwrap()).await.is_err() {
                        break;
                    }
                }
                puts
            });

            let mut client = ObexClient::new(client_io, 65_000, CancellationToken::new());
            client.connect(HeaderSet::new()).await.unwrap();
            let mut op = client.put(HeaderSet::new()).unwrap();
            let code = op.write_chunk(&[1u8; 3000]).await.unwrap();
            let again = op.write_chunk(&[2u8; 10]).await.is_err();
            drop(op);
            drop(client);
            (peer.await.unwrap(), code, again)
        });

        prop_assert_eq!(packets, 1);
        prop_assert_eq!(code, refusal);
        prop_assert!(again);
    }

    /// Once a cancel is accepted the job channel never goes back to work.
    #[test]
    fn cancel_chain_never_resumes_work(
        before in proptest::collection::vec(arb_step(), 0..8),
        after in proptest::collection::vec(arb_step(), 1..16),
    ) {
        let state = JobState::new();
        for step in before {
            state.request(step);
        }
        prop_assume!(state.request(SoapProcess::Cancel));

        for step in after {
            state.request(step);
            state.advance(SoapProcess::Cancel, SoapProcess::Cancelling);
            prop_assert!(state.process().is_cancel());
            prop_assert!(!matches!(
                state.process(),
                SoapProcess::GetAttribute | SoapProcess::CreateJob | SoapProcess::SendDocument
            ));
        }
    }

    /// Dotted stems are flattened for the affected vendor only.
    #[test]
    fn filename_quirk_keeps_last_dot(
        parts in proptest::collection::vec("[a-z0-9]{1,6}", 1..5),
        ext in "[a-z]{2,4}",
        tail in any::<[u8; 3]>(),
    ) {
        let name = format!("{}.{}", parts.join("."), ext);
        let quirky = DeviceAddress::new([0x00, 0x04, 0x48, tail[0], tail[1], tail[2]]);
        let plain = DeviceAddress::new([0x00, 0x1B, 0xDC, tail[0], tail[1], tail[2]]);

        prop_assert_eq!(quirk_file_name(&plain, &name), None);
        match quirk_file_name(&quirky, &name) {
            Some(renamed) => {
                prop_assert!(parts.len() > 1);
                prop_assert_eq!(renamed.matches('.').count(), 1);
                prop_assert_eq!(renamed, format!("{}.{}", parts.join("_"), ext));
            }
            None => prop_assert_eq!(parts.len(), 1),
        }
    }

    /// The block carries the stored little-endian id most significant byte first.
    #[test]
    fn job_id_parameter_reverses_stored_order(id in any::<u32>()) {
        let mut soap = SoapState::new();
        soap.set_job_id(id);
        let stored = soap.job_id.unwrap();
        let param = job_id_app_param(stored);

        prop_assert_eq!(param[0], APP_PARAM_JOB_ID);
        prop_assert_eq!(param[1], 4);
        prop_assert_eq!(&param[2..], &id.to_be_bytes()[..]);
        prop_assert_eq!(&param[2..], [stored[3], stored[2], stored[1], stored[0]]);
    }

    /// Only listed extensions override the reported type.
    #[test]
    fn unknown_extensions_keep_reported_type(
        stem in "[a-z]{1,8}",
        ext in "[a-z]{1,4}",
        mime in "[a-z]{1,6}/[a-z]{1,6}",
    ) {
        let name = format!("{}.{}", stem, ext);
        let listed = ["vcf", "vcs", "vmg", "ical", "msg", "htm"].contains(&ext.as_str());
        let corrected = check_unknown_mimetype(&mime, &name);
        prop_assert_eq!(corrected.is_some(), listed);
        prop_assert_eq!(check_unknown_mimetype("", &name), None);
    }

    /// Headers survive an encode/decode pass in order.
    #[test]
    fn header_set_decodes_what_it_encodes(
        name in "[ -~]{1,40}",
        length in any::<u32>(),
        param in proptest::collection::vec(any::<u8>(), 1..32),
    ) {
        let mut headers = HeaderSet::new();
        headers.set_name(&name);
        headers.set_length(length);
        headers.set_app_param(param.clone());

        let mut raw = Vec::new();
        headers.encode(&mut raw);
        prop_assert_eq!(raw.len(), headers.encoded_len());

        let decoded = HeaderSet::decode(&raw).unwrap();
        prop_assert_eq!(decoded.name(), Some(name.as_str()));
        prop_assert_eq!(decoded.length(), Some(length));
        prop_assert_eq!(decoded.app_param(), Some(&param[..]));
        prop_assert!(matches!(
            decoded.get(bpp_print::obex::header::LENGTH),
            Some(HeaderValue::U32(_))
        ));
    }
}
