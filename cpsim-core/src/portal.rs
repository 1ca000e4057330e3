//! The network boundary.
//!
//! The core never models the network itself; it hands messages to a
//! `NetworkPortal` and reacts to exactly one of two outcomes per message:
//! delivered after some latency, or lost. The portal also owns the per-host
//! task schedulers consulted for contended service time.
//!
//! `SimpleNetwork` is the built-in collaborator: a link table with latency,
//! bandwidth, and loss probability, plus single-server schedulers per host
//! and accelerator. It is deliberately not packet-accurate.

use crate::model::desc::{DevExecDict, ExpParamsDesc, TopoDesc};
use crate::msg::CmpPtnMsg;
use crate::types::{CpId, ExecId, FuncIdx, Priority, SimTime};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use tracing::debug;

/// Outcome of handing a message to the network, resolved immediately so the
/// bridge can schedule the one callback the contract allows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NetVerdict {
    Deliver { latency: SimTime },
    /// The drop is observed after `after` of simulated transit.
    Lost { after: SimTime },
}

/// Work handed to a task scheduler: enough to run the owning function's
/// class exit when the simulated resource frees. Opaque to the portal.
#[derive(Debug)]
pub struct Task {
    pub cp_id: CpId,
    pub func: FuncIdx,
    pub method: String,
    pub msg: CmpPtnMsg,
}

/// What a scheduler did with a submitted task.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// The server was idle; the task runs now and completes at this time.
    Started { completion: SimTime },
    /// The server is busy; the task waits, ranked by priority.
    Queued,
}

pub trait NetworkPortal {
    /// CPU model of an endpoint, used as the key into exec-time tables.
    fn endpt_cpu_model(&self, endpt: &str) -> Option<String>;

    /// Accelerator model present on an endpoint, if configured.
    fn endpt_accel_model(&self, endpt: &str, accel: &str) -> Option<String>;

    /// Carry `n_bytes` from `src` to `dst`. Exactly one of delivery or loss
    /// comes back, as a verdict the event bridge turns into a callback.
    #[allow(clippy::too_many_arguments)]
    fn enter_network(
        &mut self,
        now: SimTime,
        src: &str,
        dst: &str,
        n_bytes: u64,
        exec_id: ExecId,
        is_pckt: bool,
        rate: f64,
    ) -> NetVerdict;

    /// Hand `service` seconds of work to the endpoint's CPU scheduler.
    /// `None` means the host is unknown.
    fn submit_task(
        &mut self,
        host: &str,
        now: SimTime,
        service: SimTime,
        priority: Priority,
        task: Task,
    ) -> Option<SubmitOutcome>;

    /// Hand work to a named accelerator instead of the host CPU.
    #[allow(clippy::too_many_arguments)]
    fn submit_accel_task(
        &mut self,
        host: &str,
        accel: &str,
        now: SimTime,
        service: SimTime,
        priority: Priority,
        task: Task,
    ) -> Option<SubmitOutcome>;

    /// The running task on a scheduler reached its completion time: take it,
    /// and start the best waiting task. Returns the finished task and the
    /// completion time of the one that just started, if any.
    fn task_done(
        &mut self,
        host: &str,
        accel: Option<&str>,
        now: SimTime,
    ) -> (Option<Task>, Option<SimTime>);

    /// Fold a background offered load into an endpoint's service model.
    fn add_background_load(&mut self, endpt: &str, rate: f64, srv_time: SimTime);
}

// ─── Task scheduler ───────────────────────────────────────────

/// A task parked behind a busy server. Highest priority pops first; FIFO
/// within a priority.
#[derive(Debug)]
struct Waiting {
    priority: Priority,
    seq: u64,
    service: SimTime,
    task: Task,
}

impl PartialEq for Waiting {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiting {}

impl PartialOrd for Waiting {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiting {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Single-server priority queue. An idle server starts a submission
/// immediately; a busy one parks it, and each completion starts the
/// highest-priority waiter. Background load inflates service times by
/// `1 / (1 - utilization)`.
#[derive(Debug, Default)]
pub struct TaskScheduler {
    bg_util: f64,
    running: Option<(SimTime, Task)>,
    waiting: BinaryHeap<Waiting>,
    next_seq: u64,
}

impl TaskScheduler {
    pub fn submit(
        &mut self,
        now: SimTime,
        service: SimTime,
        priority: Priority,
        task: Task,
    ) -> SubmitOutcome {
        if self.running.is_some() {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.waiting.push(Waiting {
                priority,
                seq,
                service,
                task,
            });
            return SubmitOutcome::Queued;
        }
        let completion = now + self.inflate(service);
        self.running = Some((completion, task));
        SubmitOutcome::Started { completion }
    }

    /// Take the finished task and start the best waiter, if any.
    pub fn complete(&mut self, now: SimTime) -> (Option<Task>, Option<SimTime>) {
        let done = self.running.take().map(|(_, task)| task);
        let started = match self.waiting.pop() {
            Some(w) => {
                let completion = now + self.inflate(w.service);
                self.running = Some((completion, w.task));
                Some(completion)
            }
            None => None,
        };
        (done, started)
    }

    pub fn add_background(&mut self, rate: f64, srv_time: SimTime) {
        // Cap just below saturation so a misconfigured load degrades instead
        // of dividing by zero.
        self.bg_util = (self.bg_util + rate * srv_time).min(0.99);
    }

    fn inflate(&self, service: SimTime) -> SimTime {
        if self.bg_util > 0.0 && self.bg_util < 1.0 {
            service / (1.0 - self.bg_util)
        } else {
            service
        }
    }
}

// ─── Built-in network model ───────────────────────────────────

#[derive(Clone, Debug)]
struct Link {
    latency: SimTime,
    bandwidth: f64,
    pr_loss: f64,
}

struct Endpt {
    cpu_model: String,
    accel_models: BTreeMap<String, String>,
    cpu: TaskScheduler,
    accels: HashMap<String, TaskScheduler>,
}

pub struct SimpleNetwork {
    endpts: HashMap<String, Endpt>,
    links: HashMap<(String, String), Link>,
    default_link: Link,
    /// Mean per-hop device forwarding delay, from the device exec list.
    dev_delay: SimTime,
    rng: ChaCha12Rng,
}

impl SimpleNetwork {
    pub fn new(topo: &TopoDesc, params: &ExpParamsDesc, dev_exec: &DevExecDict, seed: u64) -> Self {
        let endpts = topo
            .endpts
            .iter()
            .map(|e| {
                let accels = e
                    .accels
                    .keys()
                    .map(|name| (name.clone(), TaskScheduler::default()))
                    .collect();
                (
                    e.name.clone(),
                    Endpt {
                        cpu_model: e.cpu_model.clone(),
                        accel_models: e.accels.clone(),
                        cpu: TaskScheduler::default(),
                        accels,
                    },
                )
            })
            .collect();
        let links = topo
            .links
            .iter()
            .map(|l| {
                (
                    (l.src.clone(), l.dst.clone()),
                    Link {
                        latency: l.latency,
                        bandwidth: l.bandwidth,
                        pr_loss: l.pr_loss,
                    },
                )
            })
            .collect();
        let dev_delay = if dev_exec.times.is_empty() {
            0.0
        } else {
            dev_exec.times.values().sum::<f64>() / dev_exec.times.len() as f64
        };
        Self {
            endpts,
            links,
            default_link: Link {
                latency: params.default_latency,
                bandwidth: params.default_bandwidth,
                pr_loss: params.default_pr_loss,
            },
            dev_delay,
            rng: ChaCha12Rng::seed_from_u64(seed ^ 0x6e65_7470_6f72_7461),
        }
    }

    fn link(&self, src: &str, dst: &str) -> &Link {
        self.links
            .get(&(src.to_string(), dst.to_string()))
            .unwrap_or(&self.default_link)
    }
}

impl NetworkPortal for SimpleNetwork {
    fn endpt_cpu_model(&self, endpt: &str) -> Option<String> {
        self.endpts.get(endpt).map(|e| e.cpu_model.clone())
    }

    fn endpt_accel_model(&self, endpt: &str, accel: &str) -> Option<String> {
        self.endpts
            .get(endpt)
            .and_then(|e| e.accel_models.get(accel).cloned())
    }

    fn enter_network(
        &mut self,
        _now: SimTime,
        src: &str,
        dst: &str,
        n_bytes: u64,
        exec_id: ExecId,
        is_pckt: bool,
        rate: f64,
    ) -> NetVerdict {
        let link = self.link(src, dst).clone();
        let transit = if !is_pckt && rate > 0.0 {
            // Flow: sender-limited, then link-limited.
            let eff = if link.bandwidth > 0.0 {
                rate.min(link.bandwidth)
            } else {
                rate
            };
            link.latency + self.dev_delay + n_bytes as f64 / eff
        } else if link.bandwidth > 0.0 {
            link.latency + self.dev_delay + n_bytes as f64 / link.bandwidth
        } else {
            link.latency + self.dev_delay
        };

        if link.pr_loss > 0.0 && self.rng.gen::<f64>() < link.pr_loss {
            debug!(src, dst, exec_id, "network dropped message");
            return NetVerdict::Lost { after: transit };
        }
        NetVerdict::Deliver { latency: transit }
    }

    fn submit_task(
        &mut self,
        host: &str,
        now: SimTime,
        service: SimTime,
        priority: Priority,
        task: Task,
    ) -> Option<SubmitOutcome> {
        self.endpts
            .get_mut(host)
            .map(|e| e.cpu.submit(now, service, priority, task))
    }

    fn submit_accel_task(
        &mut self,
        host: &str,
        accel: &str,
        now: SimTime,
        service: SimTime,
        priority: Priority,
        task: Task,
    ) -> Option<SubmitOutcome> {
        self.endpts
            .get_mut(host)
            .and_then(|e| e.accels.get_mut(accel))
            .map(|s| s.submit(now, service, priority, task))
    }

    fn task_done(
        &mut self,
        host: &str,
        accel: Option<&str>,
        now: SimTime,
    ) -> (Option<Task>, Option<SimTime>) {
        let Some(e) = self.endpts.get_mut(host) else {
            return (None, None);
        };
        let sched = match accel {
            Some(name) => match e.accels.get_mut(name) {
                Some(s) => s,
                None => return (None, None),
            },
            None => &mut e.cpu,
        };
        sched.complete(now)
    }

    fn add_background_load(&mut self, endpt: &str, rate: f64, srv_time: SimTime) {
        if let Some(e) = self.endpts.get_mut(endpt) {
            e.cpu.add_background(rate, srv_time);
        }
    }
}
