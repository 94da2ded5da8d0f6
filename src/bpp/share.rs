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

//! Shares, batches and the file handle prepared for sending.

use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::BufReader;
use tracing::{debug, warn};

use super::status::ShareStatus;
use crate::bluetooth::DeviceAddress;

/// Read buffer in front of the document file.
const FILE_BUFFER_SIZE: usize = 0x4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    pub fn code(&self) -> i32 {
        match self {
            Direction::Outbound => 0,
            Direction::Inbound => 1,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Direction::Inbound,
            _ => Direction::Outbound,
        }
    }
}

/// One file to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    pub id: i64,
    pub uri: PathBuf,
    pub mime_type: String,
    pub destination: DeviceAddress,
    pub direction: Direction,
    pub status: ShareStatus,
    pub total_bytes: u64,
    pub current_bytes: u64,
    /// Received file for inbound shares, name hint for outbound ones.
    pub file_name: Option<String>,
}

impl Share {
    pub fn outbound(uri: impl Into<PathBuf>, mime_type: &str, destination: DeviceAddress) -> Self {
        Self {
            id: 0,
            uri: uri.into(),
            mime_type: mime_type.to_string(),
            destination,
            direction: Direction::Outbound,
            status: ShareStatus::Pending,
            total_bytes: 0,
            current_bytes: 0,
            file_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    Running,
    Finished,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Running => "running",
            BatchStatus::Finished => "finished",
            BatchStatus::Failed => "failed",
        }
    }
}

/// Shares sent over one connection.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: i64,
    pub destination: DeviceAddress,
    pub direction: Direction,
    pub status: BatchStatus,
    shares: Vec<Share>,
}

impl Batch {
    pub fn new(id: i64, destination: DeviceAddress, shares: Vec<Share>) -> Self {
        Self {
            id,
            destination,
            direction: Direction::Outbound,
            status: BatchStatus::Pending,
            shares,
        }
    }

    /// First share that has not been started yet.
    pub fn pending_share(&self) -> Option<&Share> {
        self.shares
            .iter()
            .find(|s| s.status == ShareStatus::Pending)
    }

    /// Claim the next pending share, marking it running.
    pub fn take_pending(&mut self) -> Option<Share> {
        let share = self
            .shares
            .iter_mut()
            .find(|s| s.status == ShareStatus::Pending)?;
        share.status = ShareStatus::Running;
        Some(share.clone())
    }

    pub fn share(&self, id: i64) -> Option<&Share> {
        self.shares.iter().find(|s| s.id == id)
    }

    pub fn share_mut(&mut self, id: i64) -> Option<&mut Share> {
        self.shares.iter_mut().find(|s| s.id == id)
    }

    pub fn shares(&self) -> &[Share] {
        &self.shares
    }

    pub fn shares_mut(&mut self) -> impl Iterator<Item = &mut Share> {
        self.shares.iter_mut()
    }
}

/// What is known about a document without opening it for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHint {
    pub file_name: String,
    pub length: u64,
    pub mime_type: String,
}

impl FileHint {
    pub fn for_share(share: &Share) -> Option<Self> {
        let file_name = file_name_of(&share.uri)?;
        let length = std::fs::metadata(&share.uri).ok()?.len();
        Some(Self {
            file_name,
            length,
            mime_type: share.mime_type.clone(),
        })
    }
}

/// An opened document ready to be PUT.
#[derive(Debug)]
pub struct SendFileInfo {
    pub file_name: String,
    pub mime_type: String,
    pub length: u64,
    pub destination: DeviceAddress,
    pub reader: BufReader<File>,
}

impl SendFileInfo {
    /// Open the share's document. Missing, unreadable or empty files
    /// yield `FileError`.
    pub async fn generate(share: &Share) -> Result<Self, ShareStatus> {
        let file_name = file_name_of(&share.uri).ok_or(ShareStatus::FileError)?;
        let file = match File::open(&share.uri).await {
            Ok(f) => f,
            Err(e) => {
                warn!("Cannot open {:?}: {}", share.uri, e);
                return Err(ShareStatus::FileError);
            }
        };
        let length = file
            .metadata()
            .await
            .map_err(|_| ShareStatus::FileError)?
            .len();
        if length == 0 {
            debug!("Refusing empty document {:?}", share.uri);
            return Err(ShareStatus::FileError);
        }
        Ok(Self {
            file_name,
            mime_type: share.mime_type.clone(),
            length,
            destination: share.destination,
            reader: BufReader::with_capacity(FILE_BUFFER_SIZE, file),
        })
    }
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn addr() -> DeviceAddress {
        DeviceAddress::new([0, 1, 2, 3, 4, 5])
    }

    #[test]
    fn test_take_pending_marks_running() {
        let mut batch = Batch::new(
            1,
            addr(),
            vec![
                Share::outbound("/tmp/a.pdf", "application/pdf", addr()),
                Share::outbound("/tmp/b.pdf", "application/pdf", addr()),
            ],
        );
        let first = batch.take_pending().unwrap();
        assert_eq!(first.uri, PathBuf::from("/tmp/a.pdf"));
        assert_eq!(batch.pending_share().unwrap().uri, PathBuf::from("/tmp/b.pdf"));
        batch.take_pending().unwrap();
        assert!(batch.take_pending().is_none());
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::File::create(&path).unwrap();

        let share = Share::outbound(&path, "text/plain", addr());
        assert_eq!(
            SendFileInfo::generate(&share).await.unwrap_err(),
            ShareStatus::FileError
        );
    }

    #[tokio::test]
    async fn test_generate_reads_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"hello printer")
            .unwrap();

        let share = Share::outbound(&path, "text/plain", addr());
        let info = SendFileInfo::generate(&share).await.unwrap();
        assert_eq!(info.file_name, "doc.txt");
        assert_eq!(info.length, 13);

        let hint = FileHint::for_share(&share).unwrap();
        assert_eq!(hint.length, 13);
    }
}
