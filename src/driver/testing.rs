//! Scripted backends for driver tests

use crate::backends::BackendCatalog;
use crate::config::DriverConfig;
use crate::domain::job::{JobDescriptor, JobRecord};
use crate::domain::ports::{BoxedPlugin, BurstBufferPlugin, StageStatus};
use crate::error::{Error, Result};
use crate::info::BurstBufferInfo;
use crate::pack::PackBuffer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Shared {
    loads: AtomicUsize,
    finis: AtomicUsize,
    /// Set while any scripted backend is inside a call
    in_flight: AtomicBool,
    /// Calls that started while another call was still running
    overlaps: AtomicUsize,
    calls: Mutex<Vec<String>>,
    queues: Mutex<Vec<(String, Vec<u32>)>>,
    templates: Mutex<HashMap<String, MockPlugin>>,
}

/// Backend whose every answer is preset by the test
#[derive(Debug, Clone)]
pub struct MockPlugin {
    pub name: String,
    pub load_state_error: Option<u32>,
    pub reconfig_error: Option<u32>,
    pub validate_error: Option<u32>,
    pub try_stage_in_error: Option<u32>,
    pub stage_out_error: Option<u32>,
    pub pack_error: Option<u32>,
    pub fini_error: Option<u32>,
    pub stage_in_status: StageStatus,
    pub stage_out_status: StageStatus,
    /// Whether `state_pack` writes a record
    pub pack_record: bool,
    /// Appended to the descriptor's request by `job_validate`
    pub validate_suffix: Option<String>,
    shared: Arc<Shared>,
}

impl MockPlugin {
    fn new(name: &str, shared: Arc<Shared>) -> Self {
        Self {
            name: name.to_string(),
            load_state_error: None,
            reconfig_error: None,
            validate_error: None,
            try_stage_in_error: None,
            stage_out_error: None,
            pack_error: None,
            fini_error: None,
            stage_in_status: StageStatus::Complete,
            stage_out_status: StageStatus::Complete,
            pack_record: true,
            validate_suffix: None,
            shared,
        }
    }

    /// Record a call and mark it in flight until the guard drops
    fn called(&self, operation: &str) -> InFlight<'_> {
        if self.shared.in_flight.swap(true, Ordering::SeqCst) {
            self.shared.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.shared
            .calls
            .lock()
            .push(format!("{}:{}", self.name, operation));
        std::thread::yield_now();
        InFlight(&self.shared)
    }

    fn outcome(&self, operation: &str, code: Option<u32>) -> Result<()> {
        match code {
            Some(code) => Err(Error::backend(
                self.name.clone(),
                operation,
                code,
                format!("scripted failure {}", code),
            )),
            None => Ok(()),
        }
    }
}

struct InFlight<'a>(&'a Shared);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

impl BurstBufferPlugin for MockPlugin {
    fn plugin_type(&self) -> &str {
        &self.name
    }

    fn load_state(&mut self, _init_config: bool) -> Result<()> {
        let _call = self.called("load_state");
        self.outcome("load_state", self.load_state_error)
    }

    fn state_pack(&self, buffer: &mut PackBuffer, protocol_version: u16) -> Result<()> {
        let _call = self.called("state_pack");
        if let Some(code) = self.pack_error {
            return self.outcome("state_pack", Some(code));
        }
        if self.pack_record {
            BurstBufferInfo::new(self.name.clone()).pack(buffer, protocol_version)?;
        }
        Ok(())
    }

    fn reconfig(&mut self, _config: &DriverConfig) -> Result<()> {
        let _call = self.called("reconfig");
        self.outcome("reconfig", self.reconfig_error)
    }

    fn job_validate(&mut self, job_desc: &mut JobDescriptor, _submit_uid: u32) -> Result<()> {
        let _call = self.called("job_validate");
        if let Some(suffix) = &self.validate_suffix {
            job_desc.burst_buffer.push_str(suffix);
        }
        self.outcome("job_validate", self.validate_error)
    }

    fn job_try_stage_in(&mut self, queue: &[&JobRecord]) -> Result<()> {
        let _call = self.called("job_try_stage_in");
        self.shared.queues.lock().push((
            self.name.clone(),
            queue.iter().map(|job| job.job_id).collect(),
        ));
        self.outcome("job_try_stage_in", self.try_stage_in_error)
    }

    fn job_test_stage_in(&mut self, _job: &JobRecord) -> StageStatus {
        let _call = self.called("job_test_stage_in");
        self.stage_in_status
    }

    fn job_start_stage_out(&mut self, _job: &JobRecord) -> Result<()> {
        let _call = self.called("job_start_stage_out");
        self.outcome("job_start_stage_out", self.stage_out_error)
    }

    fn job_test_stage_out(&mut self, _job: &JobRecord) -> StageStatus {
        let _call = self.called("job_test_stage_out");
        self.stage_out_status
    }

    fn fini(&mut self) -> Result<()> {
        let _call = self.called("fini");
        self.shared.finis.fetch_add(1, Ordering::SeqCst);
        self.outcome("fini", self.fini_error)
    }
}

/// Builds catalogs of [`MockPlugin`]s and observes what they were asked
pub struct MockCatalog {
    names: Vec<String>,
    failing: Vec<String>,
    shared: Arc<Shared>,
}

impl MockCatalog {
    pub fn new(names: &[&str]) -> Self {
        let shared = Arc::new(Shared::default());
        {
            let mut templates = shared.templates.lock();
            for name in names {
                templates.insert(name.to_string(), MockPlugin::new(name, shared.clone()));
            }
        }
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            failing: Vec::new(),
            shared,
        }
    }

    /// Register a type whose construction always fails
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.push(name.to_string());
        self
    }

    /// Adjust the script of every instance of `name` created from now on
    pub fn configure(&self, name: &str, f: impl FnOnce(&mut MockPlugin)) {
        if let Some(template) = self.shared.templates.lock().get_mut(name) {
            f(template);
        }
    }

    pub fn catalog(&self) -> BackendCatalog {
        let mut catalog = BackendCatalog::empty();
        for name in &self.names {
            let shared = self.shared.clone();
            let name = name.clone();
            catalog.register(&name.clone(), move |_config| {
                shared.loads.fetch_add(1, Ordering::SeqCst);
                let plugin = shared
                    .templates
                    .lock()
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| Error::Internal(format!("no script for {}", name)))?;
                Ok(Box::new(plugin) as BoxedPlugin)
            });
        }
        for name in &self.failing {
            let name = name.clone();
            catalog.register(&name.clone(), move |_config| {
                Err(Error::Configuration(format!("{} refuses to load", name)))
            });
        }
        catalog
    }

    pub fn loads(&self) -> usize {
        self.shared.loads.load(Ordering::SeqCst)
    }

    /// Backend calls that overlapped another backend call
    pub fn overlaps(&self) -> usize {
        self.shared.overlaps.load(Ordering::SeqCst)
    }

    pub fn finis(&self) -> usize {
        self.shared.finis.load(Ordering::SeqCst)
    }

    /// Every backend call so far, as `name:operation`
    pub fn calls(&self) -> Vec<String> {
        self.shared.calls.lock().clone()
    }

    /// Calls of one operation, as backend names in call order
    pub fn calls_of(&self, operation: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| {
                let (name, op) = call.split_once(':')?;
                (op == operation).then(|| name.to_string())
            })
            .collect()
    }

    /// Queues passed to `job_try_stage_in`, as job ids per backend
    pub fn queues(&self) -> Vec<(String, Vec<u32>)> {
        self.shared.queues.lock().clone()
    }
}
