//! In-memory provider implementations.
//!
//! One `InMemoryCloud` stands in for every remote dependency at once:
//! balancers, target groups, listeners, the weighted record set, and the
//! edge protection association list. Tests and the standalone simulator
//! wire a single `Arc<InMemoryCloud>` into each trait seam.
//!
//! The cloud counts every mutating call it receives, which is how tests
//! prove that read-only paths stayed read-only and that repeated
//! enforcement passes converge instead of thrashing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use flotilla_core::{
    Arn, ChangeInfo, ChangeStatus, CreateLoadBalancerSpec, CreateTargetGroupSpec, epoch_secs,
    ForwardTarget, ListenerDescriptor, LoadBalancerDescriptor, LoadBalancerState, RecordAction,
    RecordChange, TargetAddress, TargetGroupDescriptor, WeightedRecord, WorkflowKind,
};

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{
    DnsProvider, EdgeProtectionProvider, LoadBalancerPage, LoadBalancerProvider, Notice,
    Notifier, SuspendSwitch, TaskDiscovery,
};

struct LbEntry {
    descriptor: LoadBalancerDescriptor,
    /// Remaining describes that still report `provisioning`.
    pending_polls: u32,
}

struct TgEntry {
    descriptor: TargetGroupDescriptor,
    /// Balancer the group is reachable from, set when a listener
    /// forward references it.
    lb_arn: Option<Arn>,
    targets: Vec<TargetAddress>,
}

#[derive(Default)]
struct CloudState {
    load_balancers: Vec<LbEntry>,
    target_groups: Vec<TgEntry>,
    listeners: Vec<ListenerDescriptor>,
    records: Vec<WeightedRecord>,
    /// Change id to remaining polls that still report `PENDING`.
    changes: HashMap<String, u32>,
    edge_associated: Vec<Arn>,
    backend_targets: Vec<TargetAddress>,
    /// Associations that survive a disassociate call until cleared.
    sticky_edge: HashSet<Arn>,
    /// When set, association calls fail as unavailable.
    edge_down: bool,
    /// Applied to each newly created balancer.
    provisioning_polls: u32,
    /// Applied to each newly submitted change.
    change_pending_polls: u32,
    /// Remaining delete_target_group calls that fail as in-use.
    group_delete_in_use: u32,
    seq: u64,
}

/// Simulated cloud holding every resource kind the control plane touches.
pub struct InMemoryCloud {
    zone_id: String,
    page_size: usize,
    state: Mutex<CloudState>,
    mutations: AtomicU64,
}

impl InMemoryCloud {
    pub const DEFAULT_ZONE: &'static str = "Z-FLEET-SIM";

    pub fn new() -> Self {
        Self {
            zone_id: Self::DEFAULT_ZONE.to_string(),
            page_size: 100,
            state: Mutex::new(CloudState::default()),
            mutations: AtomicU64::new(0),
        }
    }

    pub fn with_zone(mut self, zone_id: impl Into<String>) -> Self {
        self.zone_id = zone_id.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Total mutating provider calls received, including failed ones.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    // ── seeding and scripting ───────────────────────────────────────────

    pub async fn seed_backend_target(&self, address: TargetAddress) {
        self.state.lock().await.backend_targets.push(address);
    }

    /// Install a balancer directly, bypassing provisioning.
    pub async fn seed_load_balancer(
        &self,
        name: &str,
        state: LoadBalancerState,
        tags: HashMap<String, String>,
    ) -> LoadBalancerDescriptor {
        let mut guard = self.state.lock().await;
        guard.seq += 1;
        let descriptor = LoadBalancerDescriptor {
            arn: format!("arn:sim:loadbalancer/{name}/{:04}", guard.seq),
            name: name.to_string(),
            dns_name: format!("{}.sim.example.com", name.to_ascii_lowercase()),
            canonical_zone_id: "Z0SIMELB".to_string(),
            state,
            tags,
        };
        guard.load_balancers.push(LbEntry { descriptor: descriptor.clone(), pending_polls: 0 });
        descriptor
    }

    pub async fn seed_record(&self, record: WeightedRecord) {
        self.state.lock().await.records.push(record);
    }

    pub async fn seed_association(&self, arn: &Arn) {
        let mut guard = self.state.lock().await;
        if !guard.edge_associated.contains(arn) {
            guard.edge_associated.push(arn.clone());
        }
    }

    /// New balancers report `provisioning` for this many describes.
    pub async fn script_provisioning_polls(&self, polls: u32) {
        self.state.lock().await.provisioning_polls = polls;
    }

    /// New changes report `PENDING` for this many status polls.
    pub async fn script_change_pending_polls(&self, polls: u32) {
        self.state.lock().await.change_pending_polls = polls;
    }

    /// The next `calls` target group deletions fail as in-use.
    pub async fn script_group_delete_in_use(&self, calls: u32) {
        self.state.lock().await.group_delete_in_use = calls;
    }

    /// Make a disassociate call succeed without removing the association.
    pub async fn script_sticky_association(&self, arn: &Arn) {
        self.state.lock().await.sticky_edge.insert(arn.clone());
    }

    /// Fail associate and disassociate calls until restored.
    pub async fn script_edge_outage(&self, down: bool) {
        self.state.lock().await.edge_down = down;
    }

    // ── inspection for tests and the simulator ──────────────────────────

    pub async fn load_balancers(&self) -> Vec<LoadBalancerDescriptor> {
        self.state.lock().await.load_balancers.iter().map(|e| e.descriptor.clone()).collect()
    }

    pub async fn target_groups(&self) -> Vec<TargetGroupDescriptor> {
        self.state.lock().await.target_groups.iter().map(|e| e.descriptor.clone()).collect()
    }

    pub async fn listeners(&self) -> Vec<ListenerDescriptor> {
        self.state.lock().await.listeners.clone()
    }

    pub async fn records(&self) -> Vec<WeightedRecord> {
        self.state.lock().await.records.clone()
    }

    pub async fn registered_targets(&self, group_arn: &Arn) -> Vec<TargetAddress> {
        self.state
            .lock()
            .await
            .target_groups
            .iter()
            .find(|e| &e.descriptor.arn == group_arn)
            .map(|e| e.targets.clone())
            .unwrap_or_default()
    }

    fn check_zone(&self, zone_id: &str) -> ProviderResult<()> {
        if zone_id == self.zone_id {
            Ok(())
        } else {
            Err(ProviderError::NotFound(format!("hosted zone {zone_id}")))
        }
    }
}

impl Default for InMemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

fn record_key_matches(record: &WeightedRecord, other: &WeightedRecord) -> bool {
    record.name.eq_ignore_ascii_case(&other.name)
        && record.set_identifier == other.set_identifier
}

#[async_trait]
impl LoadBalancerProvider for InMemoryCloud {
    async fn list_load_balancers(
        &self,
        page_token: Option<String>,
    ) -> ProviderResult<LoadBalancerPage> {
        let guard = self.state.lock().await;
        let offset = match page_token {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ProviderError::InvalidRequest(format!("bad page token {token:?}")))?,
        };
        let end = (offset + self.page_size).min(guard.load_balancers.len());
        let load_balancers = guard.load_balancers[offset..end]
            .iter()
            .map(|e| e.descriptor.clone())
            .collect();
        let next_token = (end < guard.load_balancers.len()).then(|| end.to_string());
        Ok(LoadBalancerPage { load_balancers, next_token })
    }

    async fn describe_tags(
        &self,
        arns: &[Arn],
    ) -> ProviderResult<HashMap<Arn, HashMap<String, String>>> {
        let guard = self.state.lock().await;
        let mut out = HashMap::new();
        for arn in arns {
            if let Some(entry) = guard.load_balancers.iter().find(|e| &e.descriptor.arn == arn) {
                out.insert(arn.clone(), entry.descriptor.tags.clone());
            }
        }
        Ok(out)
    }

    async fn describe_load_balancers(
        &self,
        arns: &[Arn],
    ) -> ProviderResult<Vec<LoadBalancerDescriptor>> {
        let mut guard = self.state.lock().await;
        let mut out = Vec::new();
        for arn in arns {
            if let Some(entry) = guard.load_balancers.iter_mut().find(|e| &e.descriptor.arn == arn)
            {
                let mut descriptor = entry.descriptor.clone();
                if entry.pending_polls > 0 {
                    entry.pending_polls -= 1;
                    descriptor.state = LoadBalancerState::Provisioning;
                }
                out.push(descriptor);
            }
        }
        Ok(out)
    }

    async fn create_load_balancer(
        &self,
        spec: &CreateLoadBalancerSpec,
    ) -> ProviderResult<LoadBalancerDescriptor> {
        self.mutated();
        let mut guard = self.state.lock().await;
        if guard.load_balancers.iter().any(|e| e.descriptor.name == spec.name) {
            return Err(ProviderError::Conflict(format!(
                "load balancer name {} already exists",
                spec.name
            )));
        }
        guard.seq += 1;
        let descriptor = LoadBalancerDescriptor {
            arn: format!("arn:sim:loadbalancer/{}/{:04}", spec.name, guard.seq),
            name: spec.name.clone(),
            dns_name: format!("{}.sim.example.com", spec.name.to_ascii_lowercase()),
            canonical_zone_id: "Z0SIMELB".to_string(),
            state: LoadBalancerState::Active,
            tags: spec.tags.clone(),
        };
        let pending_polls = guard.provisioning_polls;
        guard
            .load_balancers
            .push(LbEntry { descriptor: descriptor.clone(), pending_polls });
        info!(name = %spec.name, arn = %descriptor.arn, "created load balancer");
        Ok(descriptor)
    }

    async fn delete_load_balancer(&self, arn: &Arn) -> ProviderResult<()> {
        self.mutated();
        let mut guard = self.state.lock().await;
        let before = guard.load_balancers.len();
        guard.load_balancers.retain(|e| &e.descriptor.arn != arn);
        if guard.load_balancers.len() == before {
            return Err(ProviderError::NotFound(format!("load balancer {arn}")));
        }
        guard.listeners.retain(|l| !l.arn.starts_with(arn.as_str()));
        info!(%arn, "deleted load balancer");
        Ok(())
    }

    async fn describe_target_groups(
        &self,
        lb_arn: &Arn,
    ) -> ProviderResult<Vec<TargetGroupDescriptor>> {
        let guard = self.state.lock().await;
        Ok(guard
            .target_groups
            .iter()
            .filter(|e| e.lb_arn.as_ref() == Some(lb_arn))
            .map(|e| e.descriptor.clone())
            .collect())
    }

    async fn create_target_group(
        &self,
        spec: &CreateTargetGroupSpec,
    ) -> ProviderResult<TargetGroupDescriptor> {
        self.mutated();
        let mut guard = self.state.lock().await;
        guard.seq += 1;
        let descriptor = TargetGroupDescriptor {
            arn: format!("arn:sim:targetgroup/{}/{:04}", spec.name, guard.seq),
            name: spec.name.clone(),
        };
        guard.target_groups.push(TgEntry {
            descriptor: descriptor.clone(),
            lb_arn: None,
            targets: Vec::new(),
        });
        Ok(descriptor)
    }

    async fn register_target(
        &self,
        group_arn: &Arn,
        address: &TargetAddress,
    ) -> ProviderResult<()> {
        self.mutated();
        let mut guard = self.state.lock().await;
        let entry = guard
            .target_groups
            .iter_mut()
            .find(|e| &e.descriptor.arn == group_arn)
            .ok_or_else(|| ProviderError::NotFound(format!("target group {group_arn}")))?;
        entry.targets.push(address.clone());
        Ok(())
    }

    async fn delete_target_group(&self, arn: &Arn) -> ProviderResult<()> {
        self.mutated();
        let mut guard = self.state.lock().await;
        if guard.group_delete_in_use > 0 {
            guard.group_delete_in_use -= 1;
            debug!(%arn, "target group still in use");
            return Err(ProviderError::ResourceInUse(format!("target group {arn}")));
        }
        let before = guard.target_groups.len();
        guard.target_groups.retain(|e| &e.descriptor.arn != arn);
        if guard.target_groups.len() == before {
            return Err(ProviderError::NotFound(format!("target group {arn}")));
        }
        Ok(())
    }

    async fn create_listener(
        &self,
        lb_arn: &Arn,
        port: u16,
        forward: &[ForwardTarget],
    ) -> ProviderResult<ListenerDescriptor> {
        self.mutated();
        let mut guard = self.state.lock().await;
        if !guard.load_balancers.iter().any(|e| &e.descriptor.arn == lb_arn) {
            return Err(ProviderError::NotFound(format!("load balancer {lb_arn}")));
        }
        if forward.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "listener needs at least one forward target".to_string(),
            ));
        }
        guard.seq += 1;
        let listener = ListenerDescriptor {
            arn: format!("{lb_arn}/listener/{:04}", guard.seq),
            port,
            forward: forward.to_vec(),
        };
        for target in forward {
            if let Some(entry) = guard
                .target_groups
                .iter_mut()
                .find(|e| e.descriptor.arn == target.target_group_arn)
            {
                entry.lb_arn = Some(lb_arn.clone());
            }
        }
        guard.listeners.push(listener.clone());
        Ok(listener)
    }
}

#[async_trait]
impl DnsProvider for InMemoryCloud {
    async fn list_records(
        &self,
        zone_id: &str,
        record_name: &str,
    ) -> ProviderResult<Vec<WeightedRecord>> {
        self.check_zone(zone_id)?;
        let guard = self.state.lock().await;
        let wanted = record_name.trim_end_matches('.').to_ascii_lowercase();
        Ok(guard
            .records
            .iter()
            .filter(|r| r.name.trim_end_matches('.').to_ascii_lowercase() == wanted)
            .cloned()
            .collect())
    }

    async fn change_records(
        &self,
        zone_id: &str,
        change: &RecordChange,
        comment: &str,
    ) -> ProviderResult<ChangeInfo> {
        self.mutated();
        self.check_zone(zone_id)?;
        let mut guard = self.state.lock().await;
        match change.action {
            RecordAction::Create => {
                if guard.records.iter().any(|r| record_key_matches(r, &change.record)) {
                    return Err(ProviderError::Conflict(format!(
                        "record {} / {} already exists",
                        change.record.name, change.record.set_identifier
                    )));
                }
                guard.records.push(change.record.clone());
            }
            RecordAction::Upsert => {
                if let Some(existing) =
                    guard.records.iter_mut().find(|r| record_key_matches(r, &change.record))
                {
                    *existing = change.record.clone();
                } else {
                    guard.records.push(change.record.clone());
                }
            }
            RecordAction::Delete => {
                let before = guard.records.len();
                guard.records.retain(|r| !record_key_matches(r, &change.record));
                if guard.records.len() == before {
                    return Err(ProviderError::NotFound(format!(
                        "record {} / {}",
                        change.record.name, change.record.set_identifier
                    )));
                }
            }
        }
        guard.seq += 1;
        let id = format!("change-{:04}", guard.seq);
        let pending = guard.change_pending_polls;
        guard.changes.insert(id.clone(), pending);
        debug!(change_id = %id, action = ?change.action, comment, "applied record change");
        Ok(ChangeInfo {
            id,
            status: if pending == 0 { ChangeStatus::InSync } else { ChangeStatus::Pending },
            submitted_at: epoch_secs(),
        })
    }

    async fn change_status(&self, change_id: &str) -> ProviderResult<ChangeStatus> {
        let mut guard = self.state.lock().await;
        let remaining = guard
            .changes
            .get_mut(change_id)
            .ok_or_else(|| ProviderError::NotFound(format!("change {change_id}")))?;
        if *remaining > 0 {
            *remaining -= 1;
            Ok(ChangeStatus::Pending)
        } else {
            Ok(ChangeStatus::InSync)
        }
    }
}

#[async_trait]
impl EdgeProtectionProvider for InMemoryCloud {
    async fn associate(&self, resource_arn: &Arn) -> ProviderResult<()> {
        self.mutated();
        let mut guard = self.state.lock().await;
        if guard.edge_down {
            return Err(ProviderError::Unavailable("edge protection api".to_string()));
        }
        if !guard.edge_associated.contains(resource_arn) {
            guard.edge_associated.push(resource_arn.clone());
        }
        Ok(())
    }

    async fn disassociate(&self, resource_arn: &Arn) -> ProviderResult<()> {
        self.mutated();
        let mut guard = self.state.lock().await;
        if guard.edge_down {
            return Err(ProviderError::Unavailable("edge protection api".to_string()));
        }
        if guard.sticky_edge.contains(resource_arn) {
            debug!(arn = %resource_arn, "association held by script");
            return Ok(());
        }
        guard.edge_associated.retain(|a| a != resource_arn);
        Ok(())
    }

    async fn list_associated(&self) -> ProviderResult<Vec<Arn>> {
        Ok(self.state.lock().await.edge_associated.clone())
    }
}

#[async_trait]
impl TaskDiscovery for InMemoryCloud {
    async fn backend_targets(&self) -> ProviderResult<Vec<TargetAddress>> {
        Ok(self.state.lock().await.backend_targets.clone())
    }
}

/// Suspend flags held in process memory.
#[derive(Default)]
pub struct InMemorySuspendSwitch {
    add: AtomicBool,
    remove: AtomicBool,
}

impl InMemorySuspendSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, workflow: WorkflowKind) -> &AtomicBool {
        match workflow {
            WorkflowKind::Add => &self.add,
            WorkflowKind::Remove => &self.remove,
        }
    }
}

#[async_trait]
impl SuspendSwitch for InMemorySuspendSwitch {
    async fn is_suspended(&self, workflow: WorkflowKind) -> ProviderResult<bool> {
        Ok(self.flag(workflow).load(Ordering::SeqCst))
    }

    async fn set_suspended(&self, workflow: WorkflowKind, suspended: bool) -> ProviderResult<()> {
        self.flag(workflow).store(suspended, Ordering::SeqCst);
        Ok(())
    }
}

/// Captures notices for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notices(&self) -> Vec<Notice> {
        self.notices.lock().await.clone()
    }

    pub async fn subjects(&self) -> Vec<String> {
        self.notices.lock().await.iter().map(|n| n.subject.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: &Notice) -> ProviderResult<()> {
        self.notices.lock().await.push(notice.clone());
        Ok(())
    }
}

/// Emits notices to the log stream; the simulator's default channel.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: &Notice) -> ProviderResult<()> {
        info!(subject = %notice.subject, "notification dispatched");
        debug!(message = %notice.message, "notification body");
        Ok(())
    }
}
