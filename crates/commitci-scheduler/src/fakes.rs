//! In-memory collaborators shared by the tests in this crate.

use async_trait::async_trait;
use commitci_core::{
    BuildService, BuildStatus, BuildTarget, CommitDescriptor, CommitterRecord, Error,
    JobScheduler, MappingStore, PlatformSource, Result, TaskId, VersionControl,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub component: String,
    pub branch: String,
    pub commit: CommitDescriptor,
    pub staging: bool,
}

#[derive(Default)]
struct SchedulerState {
    dispatchers: HashMap<String, (String, PlatformSource)>,
    workers: HashSet<(String, String)>,
    dispatcher_writes: usize,
    worker_creations: usize,
    triggers: Vec<Trigger>,
}

/// Scheduler with a fixed set of nodes that records every mutation.
pub struct FakeScheduler {
    nodes: HashSet<String>,
    reject_triggers: bool,
    state: Mutex<SchedulerState>,
}

impl FakeScheduler {
    pub fn with_nodes(nodes: &[&str]) -> Self {
        Self {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            reject_triggers: false,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn rejecting_triggers(mut self) -> Self {
        self.reject_triggers = true;
        self
    }

    pub fn has_dispatcher(&self, component: &str) -> bool {
        self.state.lock().unwrap().dispatchers.contains_key(component)
    }

    pub fn dispatcher_count(&self) -> usize {
        self.state.lock().unwrap().dispatchers.len()
    }

    pub fn dispatcher_writes(&self) -> usize {
        self.state.lock().unwrap().dispatcher_writes
    }

    pub fn has_worker(&self, component: &str, branch: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .workers
            .contains(&(component.to_string(), branch.to_string()))
    }

    pub fn worker_creations(&self) -> usize {
        self.state.lock().unwrap().worker_creations
    }

    pub fn triggers(&self) -> Vec<Trigger> {
        self.state.lock().unwrap().triggers.clone()
    }
}

#[async_trait]
impl JobScheduler for FakeScheduler {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn node_exists(&self, slave: &str) -> Result<bool> {
        Ok(self.nodes.contains(slave))
    }

    async fn ensure_dispatcher_job(
        &self,
        component: &str,
        slave: &str,
        platform: &PlatformSource,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.dispatcher_writes += 1;
        state
            .dispatchers
            .insert(component.to_string(), (slave.to_string(), platform.clone()));
        Ok(())
    }

    async fn remove_dispatcher_job(&self, component: &str) -> Result<()> {
        self.state.lock().unwrap().dispatchers.remove(component);
        Ok(())
    }

    async fn ensure_worker_job(
        &self,
        component: &str,
        branch: &str,
        _slave: &str,
        _platform: &PlatformSource,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state
            .workers
            .insert((component.to_string(), branch.to_string()))
        {
            state.worker_creations += 1;
        }
        Ok(())
    }

    async fn trigger_worker_job(
        &self,
        component: &str,
        branch: &str,
        commit: &CommitDescriptor,
        staging: bool,
    ) -> Result<()> {
        if self.reject_triggers {
            return Err(Error::Scheduling("trigger rejected (503): queue offline".into()));
        }
        self.state.lock().unwrap().triggers.push(Trigger {
            component: component.to_string(),
            branch: branch.to_string(),
            commit: commit.clone(),
            staging,
        });
        Ok(())
    }
}

/// How the fake build service answers a submission.
#[derive(Debug, Clone)]
pub enum Submit {
    Accept(&'static str),
    Unavailable,
    Reject,
}

/// One scripted poll answer.
#[derive(Debug, Clone, Copy)]
pub enum Poll {
    Status(BuildStatus),
    Unavailable,
}

#[derive(Default)]
struct BuildState {
    submissions: Vec<(BuildTarget, PathBuf)>,
    polls: HashMap<TaskId, VecDeque<Poll>>,
    poll_counts: HashMap<TaskId, usize>,
}

/// Build service answering from a per-target script. The last poll answer of
/// each task repeats forever.
pub struct FakeBuildService {
    submit: HashMap<String, Submit>,
    state: Mutex<BuildState>,
}

impl FakeBuildService {
    pub fn new() -> Self {
        Self {
            submit: HashMap::new(),
            state: Mutex::new(BuildState::default()),
        }
    }

    pub fn on_submit(mut self, target: &str, submit: Submit) -> Self {
        self.submit.insert(target.to_string(), submit);
        self
    }

    pub fn on_poll(self, task_id: &str, polls: &[Poll]) -> Self {
        self.state
            .lock()
            .unwrap()
            .polls
            .insert(TaskId::new(task_id), polls.iter().copied().collect());
        self
    }

    /// Every target accepted and eventually successful.
    pub fn succeeding(targets: &[(&str, &'static str)]) -> Self {
        targets.iter().fold(Self::new(), |service, (target, task)| {
            service
                .on_submit(target, Submit::Accept(*task))
                .on_poll(task, &[
                    Poll::Status(BuildStatus::Running),
                    Poll::Status(BuildStatus::Success),
                ])
        })
    }

    pub fn submissions(&self) -> Vec<(BuildTarget, PathBuf)> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn poll_count(&self, task_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .poll_counts
            .get(&TaskId::new(task_id))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl BuildService for FakeBuildService {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn submit(&self, target: &BuildTarget, working_dir: &Path) -> Result<TaskId> {
        self.state
            .lock()
            .unwrap()
            .submissions
            .push((target.clone(), working_dir.to_path_buf()));
        match self.submit.get(target.as_str()) {
            Some(Submit::Accept(task)) => Ok(TaskId::new(*task)),
            Some(Submit::Unavailable) => Err(Error::BuildServiceUnavailable(
                "connection refused".into(),
            )),
            Some(Submit::Reject) | None => Err(Error::SubmissionRejected(format!(
                "unknown build target {}",
                target
            ))),
        }
    }

    async fn poll_status(&self, task_id: &TaskId) -> Result<BuildStatus> {
        let mut state = self.state.lock().unwrap();
        *state.poll_counts.entry(task_id.clone()).or_default() += 1;
        let script = state
            .polls
            .get_mut(task_id)
            .ok_or_else(|| Error::Internal(format!("no script for task {}", task_id)))?;
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().copied()
        };
        match next {
            Some(Poll::Status(status)) => Ok(status),
            Some(Poll::Unavailable) => Err(Error::BuildServiceUnavailable(
                "hub unreachable".into(),
            )),
            None => Ok(BuildStatus::Pending),
        }
    }
}

/// Version control that knows a fixed set of branches.
pub struct FakeVcs {
    branches: HashSet<String>,
    author_email: String,
    stale_head: Option<String>,
    head: Mutex<String>,
    checkouts: Mutex<Vec<(PathBuf, String, Option<String>)>>,
}

pub const FAKE_TIP: &str = "0123456789abcdef0123456789abcdef01234567";

impl FakeVcs {
    pub fn with_branches(branches: &[&str], author_email: &str) -> Self {
        Self {
            branches: branches.iter().map(|b| b.to_string()).collect(),
            author_email: author_email.to_string(),
            stale_head: None,
            head: Mutex::new(String::new()),
            checkouts: Mutex::new(Vec::new()),
        }
    }

    /// Every checkout ends on `head`, whatever revision was asked for.
    pub fn stuck_at(mut self, head: &str) -> Self {
        self.stale_head = Some(head.to_string());
        self
    }

    pub fn checkouts(&self) -> Vec<(PathBuf, String, Option<String>)> {
        self.checkouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn checkout(&self, dir: &Path, branch: &str, revision: Option<&str>) -> Result<()> {
        if !self.branches.contains(branch) {
            return Err(Error::Checkout(format!(
                "'origin/{}' is not a commit and a branch '{}' cannot be created from it",
                branch, branch
            )));
        }
        *self.head.lock().unwrap() = self
            .stale_head
            .as_deref()
            .or(revision)
            .unwrap_or(FAKE_TIP)
            .to_string();
        self.checkouts.lock().unwrap().push((
            dir.to_path_buf(),
            branch.to_string(),
            revision.map(str::to_string),
        ));
        Ok(())
    }

    async fn current_commit_author_email(&self, _dir: &Path) -> Result<String> {
        Ok(self.author_email.clone())
    }

    async fn head_revision(&self, _dir: &Path) -> Result<String> {
        Ok(self.head.lock().unwrap().clone())
    }
}

/// Mapping store collecting records in memory.
#[derive(Default)]
pub struct FakeMappingStore {
    records: Mutex<Vec<CommitterRecord>>,
}

impl FakeMappingStore {
    pub fn records(&self) -> Vec<CommitterRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl MappingStore for FakeMappingStore {
    async fn append(&self, record: &CommitterRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
