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

//! Share records using SQLite.

use anyhow::{anyhow, Result};
use chrono::Local;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::bluetooth::DeviceAddress;
use crate::bpp::{Direction, FileHint, Share, ShareStatus};

/// Share database manager.
#[derive(Clone)]
pub struct ShareStore {
    pub(super) conn: Arc<Mutex<Connection>>,
}

impl ShareStore {
    /// Create or open the share database.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("shares.db");
        info!("Opening share database: {:?}", db_path);

        let conn = Connection::open(&db_path)?;
        Self::init(conn)
    }

    /// In-memory database, for tests and one-shot runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS shares (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uri TEXT NOT NULL,
                filename_hint TEXT,
                total_bytes INTEGER NOT NULL DEFAULT 0,
                mimetype TEXT NOT NULL,
                current_bytes INTEGER NOT NULL DEFAULT 0,
                status INTEGER NOT NULL,
                direction INTEGER NOT NULL,
                destination TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS channels (
                device TEXT NOT NULL,
                uuid16 INTEGER NOT NULL,
                channel INTEGER NOT NULL,
                PRIMARY KEY (device, uuid16)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS printers (
                device TEXT PRIMARY KEY,
                name TEXT,
                formats TEXT
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Persist a new share and return it with its assigned id.
    pub fn insert(&self, share: &Share) -> Result<Share> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO shares (uri, filename_hint, total_bytes, mimetype, current_bytes,
                                 status, direction, destination, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                share.uri.to_string_lossy().into_owned(),
                share.file_name,
                share.total_bytes as i64,
                share.mime_type,
                share.current_bytes as i64,
                share.status.code(),
                share.direction.code(),
                share.destination.to_string(),
                Local::now().timestamp(),
            ],
        )?;
        let mut stored = share.clone();
        stored.id = conn.last_insert_rowid();
        debug!("Inserted share {} for {:?}", stored.id, stored.uri);
        Ok(stored)
    }

    pub fn get(&self, id: i64) -> Result<Option<Share>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, uri, filename_hint, total_bytes, mimetype, current_bytes,
                        status, direction, destination
                 FROM shares WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i32>(6)?,
                        row.get::<_, i32>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, uri, hint, total, mime, current, status, direction, dest)) = row else {
            return Ok(None);
        };
        let destination: DeviceAddress = dest
            .parse()
            .map_err(|e| anyhow!("share {} has bad destination: {}", id, e))?;

        Ok(Some(Share {
            id,
            uri: PathBuf::from(uri),
            mime_type: mime,
            destination,
            direction: Direction::from_code(direction),
            status: ShareStatus::from_code(status),
            total_bytes: total as u64,
            current_bytes: current as u64,
            file_name: hint,
        }))
    }

    pub fn update_status(&self, id: i64, status: ShareStatus) -> Result<()> {
        self.conn.lock().execute(
            "UPDATE shares SET status = ?1 WHERE id = ?2",
            params![status.code(), id],
        )?;
        Ok(())
    }

    /// Bytes acknowledged by the printer so far.
    pub fn update_progress(&self, id: i64, current_bytes: u64) -> Result<()> {
        self.conn.lock().execute(
            "UPDATE shares SET current_bytes = ?1 WHERE id = ?2",
            params![current_bytes as i64, id],
        )?;
        Ok(())
    }

    /// Record file name, size and type once the document has been opened.
    pub fn update_file_info(&self, id: i64, hint: &FileHint) -> Result<()> {
        self.conn.lock().execute(
            "UPDATE shares SET filename_hint = ?1, total_bytes = ?2, mimetype = ?3 WHERE id = ?4",
            params![hint.file_name, hint.length as i64, hint.mime_type, id],
        )?;
        Ok(())
    }

    /// Rewrites the direction column. Used to tick a record so observers
    /// notice the batch changed.
    pub fn update_direction(&self, id: i64, direction: Direction) -> Result<()> {
        self.conn.lock().execute(
            "UPDATE shares SET direction = ?1, timestamp = ?2 WHERE id = ?3",
            params![direction.code(), Local::now().timestamp(), id],
        )?;
        Ok(())
    }
}
