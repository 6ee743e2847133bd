//! Generic burst buffer backend
//!
//! Models a single shared pool of fast storage. Space is reserved per job when
//! the job is admitted during stage-in and released when its stage-out
//! completes. Staging itself is simulated: each transfer takes a configured
//! number of polls.

use crate::config::DriverConfig;
use crate::domain::job::{JobDescriptor, JobRecord};
use crate::domain::ports::{BurstBufferPlugin, StageStatus};
use crate::error::{codes, Error, Result};
use crate::info::record::{BbState, BurstBufferInfo, ReservationInfo};
use crate::info::size::{self, deserialize_size, format_size, is_node_count, is_unlimited};
use crate::pack::PackBuffer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Type name used in `burst_buffer_type`
pub const GENERIC_PLUGIN_TYPE: &str = "generic";

const PLUGIN_NAME: &str = "burst_buffer/generic";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the generic backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenericBackendConfig {
    /// Pool capacity
    #[serde(deserialize_with = "deserialize_size")]
    pub total_space: u32,
    /// Largest buffer a single job may request
    #[serde(deserialize_with = "deserialize_size")]
    pub job_size_limit: u32,
    /// Most space one user may hold at once
    #[serde(deserialize_with = "deserialize_size")]
    pub user_size_limit: u32,
    /// Priority boost for jobs whose stage-in completed
    pub prio_boost: u32,
    /// Only these users may request buffers
    pub allow_users: Option<Vec<u32>>,
    /// These users may not request buffers
    pub deny_users: Option<Vec<u32>>,
    pub get_sys_state: Option<String>,
    pub start_stage_in: Option<String>,
    pub start_stage_out: Option<String>,
    pub stop_stage_in: Option<String>,
    pub stop_stage_out: Option<String>,
    /// Polls answered with "underway" before stage-in completes
    pub stage_in_polls: u32,
    /// Polls answered with "underway" before stage-out completes
    pub stage_out_polls: u32,
}

impl Default for GenericBackendConfig {
    fn default() -> Self {
        Self {
            total_space: 100 * 1024, // 100TB
            job_size_limit: size::INFINITE,
            user_size_limit: size::INFINITE,
            prio_boost: 0,
            allow_users: None,
            deny_users: None,
            get_sys_state: None,
            start_stage_in: None,
            start_stage_out: None,
            stop_stage_in: None,
            stop_stage_out: None,
            stage_in_polls: 1,
            stage_out_polls: 1,
        }
    }
}

impl GenericBackendConfig {
    pub fn validate(&self) -> Result<()> {
        if self.allow_users.is_some() && self.deny_users.is_some() {
            return Err(Error::Configuration(
                "allow_users and deny_users are mutually exclusive".into(),
            ));
        }
        if is_node_count(self.total_space) {
            return Err(Error::Configuration(
                "total_space must be a capacity, not a node count".into(),
            ));
        }
        Ok(())
    }

    /// Check the access control list for a user
    pub fn permits(&self, user_id: u32) -> bool {
        if let Some(allow) = &self.allow_users {
            return allow.contains(&user_id);
        }
        if let Some(deny) = &self.deny_users {
            return !deny.contains(&user_id);
        }
        true
    }
}

fn join_users(users: &Option<Vec<u32>>) -> Option<String> {
    users.as_ref().map(|list| {
        list.iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    })
}

// =============================================================================
// Request Parsing
// =============================================================================

/// Extract the `size=` token of a burst buffer request.
/// Returns `None` when the request does not name a size.
pub fn requested_size(spec: &str) -> Result<Option<u32>> {
    for token in spec.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            if key.eq_ignore_ascii_case("size") {
                return size::parse_size(value).map(Some);
            }
        }
    }
    Ok(None)
}

/// Rewrite the `size=` token to canonical gigabytes
fn canonical_request(spec: &str, size: u32) -> String {
    spec.split_whitespace()
        .map(|token| match token.split_once('=') {
            Some((key, _)) if key.eq_ignore_ascii_case("size") => format!("size={}GB", size),
            _ => token.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Reservation
// =============================================================================

#[derive(Debug, Clone)]
struct Reservation {
    array_job_id: u32,
    array_task_id: Option<u32>,
    user_id: u32,
    size: u32,
    state: BbState,
    /// Remaining "underway" answers for the transfer in progress
    polls_left: u32,
}

// =============================================================================
// Generic Backend
// =============================================================================

/// In-memory burst buffer pool
#[derive(Debug)]
pub struct GenericBackend {
    config: GenericBackendConfig,
    /// Reservations by job id
    reservations: BTreeMap<u32, Reservation>,
    used_space: u64,
}

impl GenericBackend {
    /// Create a new generic backend
    pub fn new(config: GenericBackendConfig) -> Result<Self> {
        config.validate()?;
        info!(
            total_space = %format_size(config.total_space),
            "Created generic burst buffer backend"
        );
        Ok(Self {
            config,
            reservations: BTreeMap::new(),
            used_space: 0,
        })
    }

    /// Space currently reserved, in GB
    pub fn used_space(&self) -> u64 {
        self.used_space
    }

    /// Number of jobs holding a reservation
    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    fn user_usage(&self, user_id: u32) -> u64 {
        self.reservations
            .values()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.size as u64)
            .sum()
    }

    fn fits(&self, user_id: u32, size: u32) -> bool {
        let size = size as u64;
        if !is_unlimited(self.config.total_space)
            && self.used_space + size > self.config.total_space as u64
        {
            return false;
        }
        if !is_unlimited(self.config.user_size_limit)
            && self.user_usage(user_id) + size > self.config.user_size_limit as u64
        {
            return false;
        }
        true
    }

    fn recompute_usage(&mut self) {
        self.used_space = self.reservations.values().map(|r| r.size as u64).sum();
    }

    fn release(&mut self, job_id: u32) {
        if let Some(resv) = self.reservations.remove(&job_id) {
            self.used_space = self.used_space.saturating_sub(resv.size as u64);
            debug!(job_id, size = %format_size(resv.size), "Released burst buffer");
        }
    }

    fn reject(&self, code: u32, reason: String) -> Error {
        Error::backend(PLUGIN_NAME, "job_validate", code, reason)
    }

    fn info(&self) -> BurstBufferInfo {
        let mut info = BurstBufferInfo::new(GENERIC_PLUGIN_TYPE);
        info.allow_users = join_users(&self.config.allow_users);
        info.deny_users = join_users(&self.config.deny_users);
        info.get_sys_state = self.config.get_sys_state.clone();
        info.start_stage_in = self.config.start_stage_in.clone();
        info.start_stage_out = self.config.start_stage_out.clone();
        info.stop_stage_in = self.config.stop_stage_in.clone();
        info.stop_stage_out = self.config.stop_stage_out.clone();
        info.job_size_limit = self.config.job_size_limit;
        info.prio_boost = self.config.prio_boost;
        info.total_space = self.config.total_space;
        info.user_size_limit = self.config.user_size_limit;
        info.reservations = self
            .reservations
            .iter()
            .map(|(job_id, resv)| ReservationInfo {
                name: None,
                array_job_id: resv.array_job_id,
                array_task_id: resv.array_task_id,
                job_id: *job_id,
                size: resv.size,
                state: resv.state,
                user_id: resv.user_id,
            })
            .collect();
        info
    }
}

impl BurstBufferPlugin for GenericBackend {
    fn plugin_type(&self) -> &str {
        GENERIC_PLUGIN_TYPE
    }

    fn load_state(&mut self, init_config: bool) -> Result<()> {
        self.recompute_usage();
        if init_config {
            info!(
                total_space = %format_size(self.config.total_space),
                reservations = self.reservations.len(),
                "Generic burst buffer state loaded"
            );
        }
        if !is_unlimited(self.config.total_space)
            && self.used_space > self.config.total_space as u64
        {
            warn!(
                used = self.used_space,
                total = self.config.total_space,
                "Burst buffer pool over-committed"
            );
        }
        Ok(())
    }

    fn state_pack(&self, buffer: &mut PackBuffer, protocol_version: u16) -> Result<()> {
        self.info().pack(buffer, protocol_version)
    }

    fn reconfig(&mut self, config: &DriverConfig) -> Result<()> {
        config.generic.validate()?;
        self.config = config.generic.clone();
        self.recompute_usage();
        info!("Generic burst buffer parameters reloaded");
        Ok(())
    }

    fn job_validate(&mut self, job_desc: &mut JobDescriptor, submit_uid: u32) -> Result<()> {
        let size = match requested_size(&job_desc.burst_buffer) {
            Ok(Some(size)) => size,
            Ok(None) => return Ok(()),
            Err(e) => return Err(self.reject(codes::INVALID_REQUEST, e.to_string())),
        };

        debug!(
            job = %job_desc.name,
            user_id = job_desc.user_id,
            submit_uid,
            size = %format_size(size),
            "Validating burst buffer request"
        );

        if !self.config.permits(job_desc.user_id) {
            return Err(self.reject(
                codes::PERMISSION,
                format!("user {} may not use burst buffers", job_desc.user_id),
            ));
        }
        if size == 0 || is_unlimited(size) || is_node_count(size) {
            return Err(self.reject(
                codes::INVALID_REQUEST,
                format!("unsupported size {}", format_size(size)),
            ));
        }
        if !is_unlimited(self.config.job_size_limit) && size > self.config.job_size_limit {
            return Err(self.reject(
                codes::SIZE_LIMIT,
                format!(
                    "size {} exceeds job limit {}",
                    format_size(size),
                    format_size(self.config.job_size_limit)
                ),
            ));
        }
        if !is_unlimited(self.config.total_space) && size > self.config.total_space {
            return Err(self.reject(
                codes::SIZE_LIMIT,
                format!(
                    "size {} exceeds total space {}",
                    format_size(size),
                    format_size(self.config.total_space)
                ),
            ));
        }

        job_desc.burst_buffer = canonical_request(&job_desc.burst_buffer, size);
        Ok(())
    }

    fn job_try_stage_in(&mut self, queue: &[&JobRecord]) -> Result<()> {
        for job in queue {
            if self.reservations.contains_key(&job.job_id) {
                continue;
            }
            let size = match requested_size(&job.burst_buffer) {
                Ok(Some(size)) if !is_node_count(size) && !is_unlimited(size) => size,
                Ok(_) => continue,
                Err(e) => {
                    warn!(job = %job, error = %e, "Skipping malformed burst buffer request");
                    continue;
                }
            };

            // Admission follows queue order: once a job does not fit, later
            // jobs must wait even if they are smaller.
            if !self.fits(job.user_id, size) {
                debug!(job = %job, size = %format_size(size), "Burst buffer space exhausted");
                break;
            }

            self.reservations.insert(
                job.job_id,
                Reservation {
                    array_job_id: job.array_job_id,
                    array_task_id: job.array_task_id,
                    user_id: job.user_id,
                    size,
                    state: BbState::StagingIn,
                    polls_left: self.config.stage_in_polls,
                },
            );
            self.used_space += size as u64;
            info!(job = %job, size = %format_size(size), "Stage-in started");
        }
        Ok(())
    }

    fn job_test_stage_in(&mut self, job: &JobRecord) -> StageStatus {
        match requested_size(&job.burst_buffer) {
            Ok(None) => return StageStatus::Complete,
            Ok(Some(_)) => {}
            Err(_) => return StageStatus::Fatal,
        }

        let Some(resv) = self.reservations.get_mut(&job.job_id) else {
            return StageStatus::Underway;
        };

        match resv.state {
            BbState::Allocated | BbState::StagingIn => {
                if resv.polls_left > 0 {
                    resv.polls_left -= 1;
                    StageStatus::Underway
                } else {
                    resv.state = BbState::StagedIn;
                    StageStatus::Complete
                }
            }
            _ => StageStatus::Complete,
        }
    }

    fn job_start_stage_out(&mut self, job: &JobRecord) -> Result<()> {
        let stage_out_polls = self.config.stage_out_polls;
        match self.reservations.get_mut(&job.job_id) {
            Some(resv) if resv.state == BbState::StagingOut => {}
            Some(resv) => {
                resv.state = BbState::StagingOut;
                resv.polls_left = stage_out_polls;
                info!(job = %job, "Stage-out started");
            }
            None => debug!(job = %job, "No burst buffer to stage out"),
        }
        Ok(())
    }

    fn job_test_stage_out(&mut self, job: &JobRecord) -> StageStatus {
        let Some(resv) = self.reservations.get_mut(&job.job_id) else {
            return StageStatus::Complete;
        };

        if resv.state != BbState::StagingOut {
            return StageStatus::Underway;
        }
        if resv.polls_left > 0 {
            resv.polls_left -= 1;
            return StageStatus::Underway;
        }

        self.release(job.job_id);
        StageStatus::Complete
    }

    fn fini(&mut self) -> Result<()> {
        if !self.reservations.is_empty() {
            warn!(
                reservations = self.reservations.len(),
                "Dropping burst buffer reservations on shutdown"
            );
        }
        self.reservations.clear();
        self.used_space = 0;
        Ok(())
    }
}
