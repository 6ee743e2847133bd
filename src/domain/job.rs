//! Job views consumed by the driver
//!
//! The job table belongs to the scheduler. The driver only reads
//! [`JobRecord`]s and hands [`JobDescriptor`]s to backends for validation.

use serde::{Deserialize, Serialize};

/// Scheduler-side job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completing,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Completing => write!(f, "completing"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A live job as seen through the scheduler's job table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: u32,
    /// Array master job id, 0 when not part of an array
    #[serde(default)]
    pub array_job_id: u32,
    #[serde(default)]
    pub array_task_id: Option<u32>,
    #[serde(default)]
    pub user_id: u32,
    pub state: JobState,
    /// Burst buffer request, empty when none was requested
    #[serde(default)]
    pub burst_buffer: String,
    /// Expected start time in epoch seconds, 0 (or negative) when unknown
    #[serde(default)]
    pub start_time: i64,
}

impl JobRecord {
    /// Create a pending job with no burst buffer request
    pub fn new(job_id: u32, user_id: u32) -> Self {
        Self {
            job_id,
            array_job_id: 0,
            array_task_id: None,
            user_id,
            state: JobState::Pending,
            burst_buffer: String::new(),
            start_time: 0,
        }
    }

    pub fn with_burst_buffer(mut self, spec: impl Into<String>) -> Self {
        self.burst_buffer = spec.into();
        self
    }

    pub fn with_start_time(mut self, start_time: i64) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_array(mut self, array_job_id: u32, array_task_id: u32) -> Self {
        self.array_job_id = array_job_id;
        self.array_task_id = Some(array_task_id);
        self
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.state == JobState::Pending
    }

    #[inline]
    pub fn has_burst_buffer(&self) -> bool {
        !self.burst_buffer.is_empty()
    }

    #[inline]
    pub fn start_time_known(&self) -> bool {
        self.start_time > 0
    }
}

impl std::fmt::Display for JobRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.array_task_id {
            Some(task) => write!(f, "JobId={}_{}({})", self.array_job_id, task, self.job_id),
            None => write!(f, "JobId={}", self.job_id),
        }
    }
}

/// A job submission request, open to mutation by backends during validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub name: String,
    pub user_id: u32,
    #[serde(default)]
    pub burst_buffer: String,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl JobDescriptor {
    pub fn new(name: impl Into<String>, user_id: u32) -> Self {
        Self {
            name: name.into(),
            user_id,
            ..Default::default()
        }
    }

    pub fn with_burst_buffer(mut self, spec: impl Into<String>) -> Self {
        self.burst_buffer = spec.into();
        self
    }
}
