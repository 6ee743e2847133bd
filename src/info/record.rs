//! Snapshot records
//!
//! Each backend contributes one [`BurstBufferInfo`] to the snapshot packed by
//! the driver. The layout is version-tagged so older readers can refuse data
//! they do not understand.

use super::size::{NO_VAL, INFINITE};
use crate::error::{Error, Result};
use crate::pack::{PackBuffer, Unpacker};
use serde::{Deserialize, Serialize};

/// Protocol version written by this build
pub const PROTOCOL_VERSION: u16 = 2;
/// Oldest protocol version this build can still read and write
pub const MIN_PROTOCOL_VERSION: u16 = 1;

fn check_protocol(version: u16) -> Result<()> {
    if (MIN_PROTOCOL_VERSION..=PROTOCOL_VERSION).contains(&version) {
        Ok(())
    } else {
        Err(Error::UnsupportedProtocol(version))
    }
}

// =============================================================================
// Reservation State
// =============================================================================

/// Lifecycle state of one burst buffer reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BbState {
    Allocated = 1,
    StagingIn = 2,
    StagedIn = 3,
    Running = 4,
    StagingOut = 5,
    StagedOut = 6,
    Teardown = 7,
    Complete = 8,
}

impl BbState {
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            1 => BbState::Allocated,
            2 => BbState::StagingIn,
            3 => BbState::StagedIn,
            4 => BbState::Running,
            5 => BbState::StagingOut,
            6 => BbState::StagedOut,
            7 => BbState::Teardown,
            8 => BbState::Complete,
            _ => return None,
        })
    }
}

impl std::fmt::Display for BbState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BbState::Allocated => write!(f, "allocated"),
            BbState::StagingIn => write!(f, "staging-in"),
            BbState::StagedIn => write!(f, "staged-in"),
            BbState::Running => write!(f, "running"),
            BbState::StagingOut => write!(f, "staging-out"),
            BbState::StagedOut => write!(f, "staged-out"),
            BbState::Teardown => write!(f, "teardown"),
            BbState::Complete => write!(f, "complete"),
        }
    }
}

// =============================================================================
// Reservation
// =============================================================================

/// One active reservation held by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationInfo {
    /// Persistent reservation name, absent for per-job buffers
    pub name: Option<String>,
    pub array_job_id: u32,
    pub array_task_id: Option<u32>,
    pub job_id: u32,
    pub size: u32,
    pub state: BbState,
    pub user_id: u32,
}

impl ReservationInfo {
    fn pack(&self, buffer: &mut PackBuffer) {
        buffer.pack_str(self.name.as_deref());
        buffer.pack32(self.array_job_id);
        buffer.pack32(self.array_task_id.unwrap_or(NO_VAL));
        buffer.pack32(self.job_id);
        buffer.pack32(self.size);
        buffer.pack16(self.state as u16);
        buffer.pack32(self.user_id);
    }

    fn unpack(reader: &mut Unpacker<'_>) -> Result<Self> {
        let name = reader.unpack_str()?;
        let array_job_id = reader.unpack32()?;
        let array_task_id = match reader.unpack32()? {
            NO_VAL => None,
            task => Some(task),
        };
        let job_id = reader.unpack32()?;
        let size = reader.unpack32()?;
        let raw_state = reader.unpack16()?;
        let state = BbState::from_u16(raw_state)
            .ok_or_else(|| Error::Internal(format!("unknown reservation state {}", raw_state)))?;
        let user_id = reader.unpack32()?;

        Ok(Self {
            name,
            array_job_id,
            array_task_id,
            job_id,
            size,
            state,
            user_id,
        })
    }
}

// =============================================================================
// Backend Record
// =============================================================================

/// Capacity, policy and reservations of one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstBufferInfo {
    /// Backend type name
    pub name: String,
    pub allow_users: Option<String>,
    pub deny_users: Option<String>,
    pub get_sys_state: Option<String>,
    pub start_stage_in: Option<String>,
    pub start_stage_out: Option<String>,
    pub stop_stage_in: Option<String>,
    pub stop_stage_out: Option<String>,
    pub job_size_limit: u32,
    /// Priority boost granted to jobs whose stage-in completed
    pub prio_boost: u32,
    pub total_space: u32,
    pub user_size_limit: u32,
    pub reservations: Vec<ReservationInfo>,
}

impl BurstBufferInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allow_users: None,
            deny_users: None,
            get_sys_state: None,
            start_stage_in: None,
            start_stage_out: None,
            stop_stage_in: None,
            stop_stage_out: None,
            job_size_limit: INFINITE,
            prio_boost: 0,
            total_space: 0,
            user_size_limit: INFINITE,
            reservations: Vec::new(),
        }
    }

    /// Append this record, tagged with `protocol_version`
    pub fn pack(&self, buffer: &mut PackBuffer, protocol_version: u16) -> Result<()> {
        check_protocol(protocol_version)?;

        buffer.pack16(protocol_version);
        buffer.pack_str(Some(&self.name));
        buffer.pack_str(self.allow_users.as_deref());
        buffer.pack_str(self.deny_users.as_deref());
        buffer.pack_str(self.get_sys_state.as_deref());
        buffer.pack_str(self.start_stage_in.as_deref());
        buffer.pack_str(self.start_stage_out.as_deref());
        buffer.pack_str(self.stop_stage_in.as_deref());
        buffer.pack_str(self.stop_stage_out.as_deref());
        buffer.pack32(self.job_size_limit);
        buffer.pack32(self.prio_boost);
        buffer.pack32(self.total_space);
        buffer.pack32(self.user_size_limit);

        // Version 1 readers predate reservation reporting
        if protocol_version >= 2 {
            buffer.pack32(self.reservations.len() as u32);
            for resv in &self.reservations {
                resv.pack(buffer);
            }
        }
        Ok(())
    }

    pub fn unpack(reader: &mut Unpacker<'_>) -> Result<Self> {
        let protocol_version = reader.unpack16()?;
        check_protocol(protocol_version)?;

        let mut info = Self::new(reader.unpack_str()?.unwrap_or_default());
        info.allow_users = reader.unpack_str()?;
        info.deny_users = reader.unpack_str()?;
        info.get_sys_state = reader.unpack_str()?;
        info.start_stage_in = reader.unpack_str()?;
        info.start_stage_out = reader.unpack_str()?;
        info.stop_stage_in = reader.unpack_str()?;
        info.stop_stage_out = reader.unpack_str()?;
        info.job_size_limit = reader.unpack32()?;
        info.prio_boost = reader.unpack32()?;
        info.total_space = reader.unpack32()?;
        info.user_size_limit = reader.unpack32()?;

        if protocol_version >= 2 {
            let count = reader.unpack32()?;
            for _ in 0..count {
                info.reservations.push(ReservationInfo::unpack(reader)?);
            }
        }
        Ok(info)
    }
}

// =============================================================================
// Whole Snapshot
// =============================================================================

/// Decoded `state_pack` output: one record per contributing backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstBufferInfoMsg {
    pub records: Vec<BurstBufferInfo>,
}

impl BurstBufferInfoMsg {
    /// Decode a snapshot: record count followed by that many records
    pub fn unpack(data: &[u8]) -> Result<Self> {
        let mut reader = Unpacker::new(data);
        let count = reader.unpack32()?;
        let mut records = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            records.push(BurstBufferInfo::unpack(&mut reader)?);
        }
        Ok(Self { records })
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}
