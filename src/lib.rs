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

//! Bluetooth Basic Printing Profile sender.
//!
//! Prints documents on a BPP printer over two OBEX sessions: the job
//! channel carries SOAP requests and the document, the status channel
//! reports job progress.

pub mod bluetooth;
pub mod bpp;
pub mod config;
pub mod events;
pub mod obex;
pub mod soap;
pub mod state;
pub mod storage;
