pub mod dedup;
pub mod export;
pub mod group;
pub mod import;
pub mod reset;
pub mod run;
pub mod seed;
pub mod stats;
pub mod talks;

use std::path::PathBuf;

use rusqlite::Connection;
use talkbridge_core::config::EffectiveConfig;
use talkbridge_core::db::open_store;
use talkbridge_core::error::ErrorCode;
use talkbridge_core::sync_group::{SyncGroup, get_sync_group};

use crate::output::{OutputMode, fail};

/// Everything a command handler needs besides its own arguments.
#[derive(Debug)]
pub struct CmdContext {
    pub output: OutputMode,
    pub config: EffectiveConfig,
    pub db_path: PathBuf,
}

impl CmdContext {
    /// Open the store, rendering [`ErrorCode::StoreOpenFailed`] on failure.
    pub fn open_store(&self) -> anyhow::Result<Connection> {
        open_store(&self.db_path).map_err(|err| {
            fail(
                self.output,
                ErrorCode::StoreOpenFailed,
                format!("cannot open {}: {err:#}", self.db_path.display()),
            )
        })
    }

    /// Load a sync group or render [`ErrorCode::SyncGroupNotFound`].
    pub fn require_group(&self, conn: &Connection, id: i64) -> anyhow::Result<SyncGroup> {
        get_sync_group(conn, id)?.ok_or_else(|| {
            fail(
                self.output,
                ErrorCode::SyncGroupNotFound,
                format!("sync group {id} not found"),
            )
        })
    }
}
