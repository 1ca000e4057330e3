//! The runtime facade.
//!
//! `Runtime` bundles what the handlers need: pattern instances, the class
//! registry, the event timeline, the network portal, timing tables, the
//! tracker, and the trace manager. It owns model build, the run loop, and
//! the four bridge handlers (`enter_func`, `exit_func`, `re_enter`,
//! `lost_msg`) every class behavior composes with.

use crate::class::{EntryOutcome, FuncClassRegistry, FuncRef, MethodPair};
use crate::error::{BuildErrors, CoreError, VerifyError};
use crate::events::Event;
use crate::func::CmpPtnFuncInstance;
use crate::model::desc::{
    CompPatternDict, CpInitDict, CpInitList, FuncExecDict, MappingDict, SharedCfgDict,
};
use crate::model::verify::verify_model;
use crate::msg::CmpPtnMsg;
use crate::pattern::{finalize_edge_tables, CmpPtnInstance};
use crate::portal::{NetVerdict, NetworkPortal};
use crate::sim::{evt_pri, EventQueue};
use crate::timing::FuncExecTable;
use crate::trace::{TraceKind, TraceMgr};
use crate::tracking::ExecTracker;
use crate::types::{
    CpId, ExecId, FuncIdx, MsgAddr, ObjId, SimTime, DEFAULT_METHOD, RETURN_METHOD,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Run-wide options fixed at build time.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub seed: u64,
    pub stop_time: Option<SimTime>,
    pub trace: bool,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("model_digest", &self.model_digest)
            .finish_non_exhaustive()
    }
}

pub struct Runtime {
    pub registry: FuncClassRegistry,
    pub cpis: Vec<CmpPtnInstance>,
    cp_index: HashMap<CpId, usize>,
    cp_by_name: HashMap<String, CpId>,
    pub evtq: EventQueue,
    pub portal: Box<dyn NetworkPortal>,
    pub trace_mgr: TraceMgr,
    pub tracker: ExecTracker,
    pub timing: FuncExecTable,
    next_exec_id: ExecId,
    stop_time: Option<SimTime>,
    /// SHA-256 over the canonical model inputs, stamped on outputs.
    pub model_digest: String,
}

impl Runtime {
    /// Build a runtime from model inputs with the built-in classes.
    pub fn build(
        cp_dict: &CompPatternDict,
        init_dict: &CpInitDict,
        func_exec: &FuncExecDict,
        shared: &SharedCfgDict,
        mapping: &MappingDict,
        portal: Box<dyn NetworkPortal>,
        opts: RunOptions,
    ) -> Result<Self, CoreError> {
        Self::build_with_registry(
            FuncClassRegistry::with_builtins(),
            cp_dict,
            init_dict,
            func_exec,
            shared,
            mapping,
            portal,
            opts,
        )
    }

    /// Build with a caller-supplied registry (extra classes must already be
    /// registered; patterns referencing unregistered classes fail the build).
    #[allow(clippy::too_many_arguments)]
    pub fn build_with_registry(
        registry: FuncClassRegistry,
        cp_dict: &CompPatternDict,
        init_dict: &CpInitDict,
        func_exec: &FuncExecDict,
        shared: &SharedCfgDict,
        mapping: &MappingDict,
        portal: Box<dyn NetworkPortal>,
        opts: RunOptions,
    ) -> Result<Self, CoreError> {
        let mut errs = verify_model(&registry, cp_dict, init_dict, mapping);

        let timing = FuncExecTable::from_desc(func_exec);
        let empty_init = CpInitList::default();
        let mut cpis = Vec::new();
        let mut next_obj_id: ObjId = 1;
        for (idx, (name, desc)) in cp_dict.patterns.iter().enumerate() {
            let init = init_dict.init.get(name).unwrap_or(&empty_init);
            let cpi = CmpPtnInstance::build(
                idx as CpId + 1,
                name,
                desc,
                init,
                shared,
                mapping,
                &registry,
                opts.seed,
                &mut next_obj_id,
                &mut errs,
            );
            cpis.push(cpi);
        }
        errs.extend(finalize_edge_tables(&mut cpis));
        errs.extend(check_timing_refs(&cpis, &timing));
        if !errs.is_empty() {
            return Err(CoreError::Build(BuildErrors(errs)));
        }

        // Not an error, but a modeler almost never wants a function no
        // chain can reach.
        for cpi in &cpis {
            let roots: Vec<String> = cpi
                .funcs
                .iter()
                .filter(|f| {
                    f.is_initiating
                        || f.in_edge_method_code.keys().any(|k| k.cp_id != cpi.id)
                })
                .map(|f| f.label.clone())
                .collect();
            for label in cpi.graph.unreachable_from(&roots) {
                let background = cpi
                    .func(&label)
                    .map(|f| f.class_name == "bckgrndLd")
                    .unwrap_or(false);
                if !background {
                    warn!(
                        pattern = %cpi.name,
                        func = %label,
                        "function is unreachable from any initiator"
                    );
                }
            }
        }

        let cp_index = cpis.iter().enumerate().map(|(i, c)| (c.id, i)).collect();
        let cp_by_name = cpis.iter().map(|c| (c.name.clone(), c.id)).collect();

        let mut trace_mgr = TraceMgr::new(opts.trace);
        for cpi in &cpis {
            for f in &cpi.funcs {
                trace_mgr.add_name(f.id, format!("{}:{}", cpi.name, f.label), &f.class_name);
            }
        }

        let model_digest = digest_inputs(cp_dict, init_dict, func_exec, shared, mapping);
        info!(
            patterns = cpis.len(),
            digest = %model_digest,
            "model built"
        );

        Ok(Self {
            registry,
            cpis,
            cp_index,
            cp_by_name,
            evtq: EventQueue::new(),
            portal,
            trace_mgr,
            tracker: ExecTracker::new(),
            timing,
            next_exec_id: 1,
            stop_time: opts.stop_time,
            model_digest,
        })
    }

    // ─── Lookup helpers ───────────────────────────────────────

    pub fn now(&self) -> SimTime {
        self.evtq.now()
    }

    pub fn cpi(&self, cp_id: CpId) -> Result<&CmpPtnInstance, CoreError> {
        self.cp_index
            .get(&cp_id)
            .map(|&i| &self.cpis[i])
            .ok_or(CoreError::UnknownCp(cp_id))
    }

    pub fn cpi_mut(&mut self, cp_id: CpId) -> Result<&mut CmpPtnInstance, CoreError> {
        match self.cp_index.get(&cp_id) {
            Some(&i) => Ok(&mut self.cpis[i]),
            None => Err(CoreError::UnknownCp(cp_id)),
        }
    }

    pub fn cp_id_by_name(&self, name: &str) -> Option<CpId> {
        self.cp_by_name.get(name).copied()
    }

    pub fn func(&self, fref: FuncRef) -> Result<&CmpPtnFuncInstance, CoreError> {
        Ok(&self.cpi(fref.cp_id)?.funcs[fref.func])
    }

    pub fn func_mut(&mut self, fref: FuncRef) -> Result<&mut CmpPtnFuncInstance, CoreError> {
        Ok(&mut self.cpi_mut(fref.cp_id)?.funcs[fref.func])
    }

    /// Resolve a service name through a pattern's services map.
    pub fn resolve_service(&self, cp_id: CpId, service: &str) -> Option<MsgAddr> {
        let cpi = self.cpi(cp_id).ok()?;
        let target = cpi.services.get(service)?;
        let dst_cp = self.cp_id_by_name(&target.cp)?;
        let dst_cpi = self.cpi(dst_cp).ok()?;
        dst_cpi.func_idx(&target.label)?;
        Some(MsgAddr::new(dst_cp, target.label.clone()))
    }

    // ─── Timing helpers ───────────────────────────────────────

    /// Simulated cost of `op` on the function's host CPU.
    pub fn exec_time_on_host(
        &mut self,
        host: &str,
        op: &str,
        pckt_len: u64,
    ) -> Result<SimTime, CoreError> {
        let model = self
            .portal
            .endpt_cpu_model(host)
            .ok_or_else(|| CoreError::UnknownEndpt(host.to_string()))?;
        self.timing.exec_time(op, &model, pckt_len)
    }

    /// Simulated cost of `op` on a named accelerator of the host.
    pub fn exec_time_on_accel(
        &mut self,
        host: &str,
        accel: &str,
        op: &str,
        pckt_len: u64,
    ) -> Result<SimTime, CoreError> {
        let model =
            self.portal
                .endpt_accel_model(host, accel)
                .ok_or_else(|| CoreError::UnknownAccel {
                    endpt: host.to_string(),
                    accel: accel.to_string(),
                })?;
        self.timing.exec_time(op, &model, pckt_len)
    }

    // ─── Scheduling helpers for class handlers ────────────────
    //
    // Function-bound events carry the function's scheduling priority, so
    // same-time events run in priority order.

    pub fn schedule_class_exit(
        &mut self,
        fref: FuncRef,
        method: &str,
        msg: CmpPtnMsg,
        delay: SimTime,
    ) -> Result<(), CoreError> {
        let pri = evt_pri(self.func(fref)?.priority);
        self.evtq.schedule_pri(
            delay,
            pri,
            Event::ClassExit {
                cp_id: fref.cp_id,
                func: fref.func,
                method: method.to_string(),
                msg: Box::new(msg),
            },
        );
        Ok(())
    }

    pub fn schedule_exit_func(
        &mut self,
        fref: FuncRef,
        exec_id: ExecId,
        delay: SimTime,
    ) -> Result<(), CoreError> {
        let pri = evt_pri(self.func(fref)?.priority);
        self.evtq.schedule_pri(
            delay,
            pri,
            Event::ExitFunc {
                cp_id: fref.cp_id,
                func: fref.func,
                exec_id,
            },
        );
        Ok(())
    }

    /// Wake a host (or accelerator) scheduler when its running task is due.
    pub fn schedule_task_done(&mut self, host: &str, accel: Option<&str>, at: SimTime) {
        self.evtq.schedule_at(
            at,
            Event::TaskDone {
                host: host.to_string(),
                accel: accel.map(str::to_string),
            },
        );
    }

    // ─── Run loop ─────────────────────────────────────────────

    /// Schedule initiations and background loads, then drain the timeline.
    pub fn run(&mut self) -> Result<(), CoreError> {
        self.schedule_initiations();
        let stop = self.stop_time;
        while let Some((_, event)) = self.evtq.next(stop) {
            self.handle_event(event)?;
        }
        info!(
            events = self.evtq.executed(),
            time = self.evtq.now(),
            "timeline drained"
        );
        Ok(())
    }

    fn schedule_initiations(&mut self) {
        let mut plans: Vec<(CpId, FuncIdx, u64, u64)> = Vec::new();
        let mut bckgrnd: Vec<(CpId, FuncIdx)> = Vec::new();
        for cpi in &self.cpis {
            for (idx, f) in cpi.funcs.iter().enumerate() {
                if let Some(plan) = &f.init_plan {
                    plans.push((cpi.id, idx, plan.batch.max(1), evt_pri(f.priority)));
                }
                if f.class_name == "bckgrndLd" {
                    bckgrnd.push((cpi.id, idx));
                }
            }
        }
        // Chains mint at time zero; the initiating class staggers their
        // departures, so the start offset counts toward tracked latency.
        for (cp_id, func, batch, pri) in plans {
            for _ in 0..batch {
                self.evtq.schedule_pri(
                    0.0,
                    pri,
                    Event::EnterFunc {
                        cp_id,
                        func,
                        msg: None,
                    },
                );
            }
        }
        for (cp_id, func) in bckgrnd {
            self.evtq.schedule(0.0, Event::BckgrndLd { cp_id, func });
        }
    }

    pub fn handle_event(&mut self, event: Event) -> Result<(), CoreError> {
        debug!(kind = event.kind(), now = self.evtq.now(), "event");
        match event {
            Event::EnterFunc { cp_id, func, msg } => self.enter_func(cp_id, func, msg.map(|b| *b)),
            Event::ClassExit {
                cp_id,
                func,
                method,
                msg,
            } => {
                let fref = FuncRef { cp_id, func };
                let pair = self.method_pair(fref, &method)?;
                (pair.exit)(self, fref, &method, *msg)
            }
            Event::ExitFunc {
                cp_id,
                func,
                exec_id,
            } => self.exit_func(cp_id, func, exec_id),
            Event::ReEnter { cp_id, func, msg } => self.re_enter(cp_id, func, *msg),
            Event::LostMsg { cp_id, msg } => self.lost_msg(cp_id, *msg),
            Event::TaskDone { host, accel } => self.task_done(host, accel),
            Event::BckgrndLd { cp_id, func } => self.register_bckgrnd(cp_id, func),
        }
    }

    /// A scheduler's running task finished: run its class exit and wake the
    /// scheduler again for the task it started next.
    fn task_done(&mut self, host: String, accel: Option<String>) -> Result<(), CoreError> {
        let now = self.evtq.now();
        let (done, next) = self.portal.task_done(&host, accel.as_deref(), now);
        if let Some(task) = done {
            let fref = FuncRef {
                cp_id: task.cp_id,
                func: task.func,
            };
            let pri = evt_pri(self.func(fref)?.priority);
            self.evtq.schedule_pri(
                0.0,
                pri,
                Event::ClassExit {
                    cp_id: task.cp_id,
                    func: task.func,
                    method: task.method,
                    msg: Box::new(task.msg),
                },
            );
        }
        if let Some(completion) = next {
            self.schedule_task_done(&host, accel.as_deref(), completion);
        }
        Ok(())
    }

    fn method_pair(&self, fref: FuncRef, method: &str) -> Result<MethodPair, CoreError> {
        let f = self.func(fref)?;
        f.methods
            .get(method)
            .or_else(|| f.methods.get(DEFAULT_METHOD))
            .copied()
            .ok_or_else(|| CoreError::UnknownFunc {
                cp_id: fref.cp_id,
                label: format!("{} (method '{}')", f.label, method),
            })
    }

    // ─── Bridge handlers ──────────────────────────────────────

    /// A message arrives at a function; `None` mints a chain from the
    /// function's init template.
    pub fn enter_func(
        &mut self,
        cp_id: CpId,
        func: FuncIdx,
        msg: Option<CmpPtnMsg>,
    ) -> Result<(), CoreError> {
        let fref = FuncRef { cp_id, func };
        let now = self.evtq.now();

        if !self.func(fref)?.active {
            return Ok(());
        }

        let mut msg = match msg {
            Some(m) => m,
            None => match self.mint_initiation(cp_id, func)? {
                Some(m) => m,
                None => return Ok(()),
            },
        };

        let (label, cp_name) = {
            let cpi = self.cpi(cp_id)?;
            (cpi.funcs[func].label.clone(), cpi.name.clone())
        };

        if msg.start {
            self.tracker.start_rec_exec(
                msg.exec_id,
                format!("{}:{}", cp_name, label),
                cp_id,
                &label,
                now,
            )?;
            msg.start = false;
        } else {
            self.tracker.add_waypoint(msg.exec_id, cp_id, &label, now);
        }

        let (obj_id, trace, method) = {
            let f = self.func_mut(fref)?;
            f.calls += 1;
            let method = f
                .method_code_for(&msg.prev, &msg.msg_type)
                .map(|s| s.to_string())
                .or_else(|| {
                    // A service response addressed directly back to its
                    // requester needs no declared reverse edge.
                    (msg.msg_type.starts_with("return-")
                        && f.methods.contains_key(RETURN_METHOD))
                    .then(|| RETURN_METHOD.to_string())
                });
            (f.id, f.trace, method)
        };

        if trace {
            let compact = msg.compact();
            self.trace_mgr.add_trace(
                now,
                msg.exec_id,
                obj_id,
                TraceKind::Enter,
                msg.is_pckt(),
                msg.rate,
                compact,
            );
        }

        let Some(method) = method else {
            warn!(
                func = %format!("{}:{}", cp_name, label),
                prev = %msg.prev,
                msg_type = %msg.msg_type,
                "arrival matches no in-edge; dropping message"
            );
            return self.abandon_exec(cp_id, &msg);
        };

        let Ok(pair) = self.method_pair(fref, &method) else {
            warn!(
                func = %format!("{}:{}", cp_name, label),
                method = %method,
                "class handles no such method; dropping message"
            );
            return self.abandon_exec(cp_id, &msg);
        };

        // Settle the record when the entry handler consumed or dropped the
        // message instead of scheduling further work.
        match (pair.entry)(self, fref, &method, msg)? {
            EntryOutcome::Scheduled => Ok(()),
            EntryOutcome::Consumed(msg) => self.finalize_exec(fref, &msg),
            EntryOutcome::Abandoned(msg) => self.abandon_exec(cp_id, &msg),
        }
    }

    /// Clone the init template into a fresh chain.
    fn mint_initiation(&mut self, cp_id: CpId, func: FuncIdx) -> Result<Option<CmpPtnMsg>, CoreError> {
        let exec_id = self.next_exec_id;
        let cpi = self.cpi_mut(cp_id)?;
        let f = &cpi.funcs[func];
        let Some(plan) = &f.init_plan else {
            warn!(label = %f.label, "non-initiating function asked to initiate");
            return Ok(None);
        };
        let addr = MsgAddr::new(cp_id, f.label.clone());
        let mut m = plan.template.clone();
        m.exec_id = exec_id;
        m.start = true;
        m.srt = addr.clone();
        m.prev = addr.clone();
        m.next = addr.clone();
        m.end_pts.srt = Some(addr);
        cpi.summary.started += 1;
        self.next_exec_id += 1;
        Ok(Some(m))
    }

    /// Generic completion: route each buffered response to its next hop.
    pub fn exit_func(&mut self, cp_id: CpId, func: FuncIdx, exec_id: ExecId) -> Result<(), CoreError> {
        let fref = FuncRef { cp_id, func };
        let now = self.evtq.now();
        let (resps, obj_id, trace, src_host, src_label) = {
            let f = self.func_mut(fref)?;
            (
                f.func_resp(exec_id),
                f.id,
                f.trace,
                f.host.clone(),
                f.label.clone(),
            )
        };
        if trace {
            self.trace_mgr.add_trace(
                now,
                exec_id,
                obj_id,
                TraceKind::Exit,
                true,
                0.0,
                String::new(),
            );
        }

        for mut r in resps {
            if r.next.is_empty() {
                warn!(exec_id, src = %src_label, "message reached an empty next label; ending chain");
                self.abandon_exec(cp_id, &r)?;
                continue;
            }
            let dst_cp = r.next.cp_id;
            let dst_info = self.cpi(dst_cp).ok().and_then(|cpi| {
                cpi.func_idx(&r.next.label).map(|idx| {
                    let f = &cpi.funcs[idx];
                    (idx, f.host.clone(), evt_pri(f.priority))
                })
            });
            let Some((dst_idx, dst_host, dst_pri)) = dst_info else {
                warn!(exec_id, dst = %r.next, "response targets an unknown destination; dropping");
                self.abandon_exec(cp_id, &r)?;
                continue;
            };
            r.prev = MsgAddr::new(cp_id, src_label.clone());

            if dst_host == src_host {
                self.evtq.schedule_pri(
                    0.0,
                    dst_pri,
                    Event::EnterFunc {
                        cp_id: dst_cp,
                        func: dst_idx,
                        msg: Some(Box::new(r)),
                    },
                );
                continue;
            }

            let verdict = self.portal.enter_network(
                now,
                &src_host,
                &dst_host,
                r.msg_len,
                exec_id,
                r.is_pckt(),
                r.rate,
            );
            if trace {
                let compact = r.compact();
                self.trace_mgr.add_trace(
                    now,
                    exec_id,
                    obj_id,
                    TraceKind::Send,
                    r.is_pckt(),
                    r.rate,
                    compact,
                );
            }
            *self
                .cpi_mut(dst_cp)?
                .active_cnt
                .entry(exec_id)
                .or_insert(0) += 1;
            match verdict {
                NetVerdict::Deliver { latency } => {
                    self.evtq.schedule_pri(
                        latency,
                        dst_pri,
                        Event::ReEnter {
                            cp_id: dst_cp,
                            func: dst_idx,
                            msg: Box::new(r),
                        },
                    );
                }
                NetVerdict::Lost { after } => {
                    self.evtq.schedule(
                        after,
                        Event::LostMsg {
                            cp_id: dst_cp,
                            msg: Box::new(r),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Successful network delivery: hand straight to `enter_func`.
    pub fn re_enter(&mut self, cp_id: CpId, func: FuncIdx, msg: CmpPtnMsg) -> Result<(), CoreError> {
        let now = self.evtq.now();
        {
            let cpi = self.cpi_mut(cp_id)?;
            if let Some(cnt) = cpi.active_cnt.get_mut(&msg.exec_id) {
                *cnt -= 1;
                if *cnt <= 0 {
                    cpi.active_cnt.remove(&msg.exec_id);
                }
            }
        }
        let (obj_id, pri) = {
            let f = &self.cpi(cp_id)?.funcs[func];
            (f.id, evt_pri(f.priority))
        };
        self.trace_mgr.add_trace(
            now,
            msg.exec_id,
            obj_id,
            TraceKind::Arrive,
            msg.is_pckt(),
            msg.rate,
            msg.compact(),
        );
        self.evtq.schedule_pri(
            0.0,
            pri,
            Event::EnterFunc {
                cp_id,
                func,
                msg: Some(Box::new(msg)),
            },
        );
        Ok(())
    }

    /// Network loss: decrement the destination's active count; at zero the
    /// chain is finished as lost and reported, never crashed on.
    pub fn lost_msg(&mut self, cp_id: CpId, msg: CmpPtnMsg) -> Result<(), CoreError> {
        let exec_id = msg.exec_id;
        let now = self.evtq.now();
        let (drained, name) = {
            let cpi = self.cpi_mut(cp_id)?;
            let cnt = cpi.active_cnt.entry(exec_id).or_insert(1);
            *cnt -= 1;
            let drained = *cnt <= 0;
            if drained {
                cpi.active_cnt.remove(&exec_id);
                cpi.summary.lost += 1;
            }
            (drained, cpi.name.clone())
        };
        if drained {
            self.tracker.lost_exec(exec_id);
            warn!(
                pattern = %name,
                exec_id,
                msg_type = %msg.msg_type,
                origin = ?msg.end_pts.srt,
                "execution lost in the network"
            );
            let obj_id = {
                let cpi = self.cpi(cp_id)?;
                cpi.func_idx(&msg.next.label)
                    .map(|i| cpi.funcs[i].id)
                    .unwrap_or(0)
            };
            self.trace_mgr.add_trace(
                now,
                exec_id,
                obj_id,
                TraceKind::Lost,
                msg.is_pckt(),
                msg.rate,
                msg.compact(),
            );
        }
        Ok(())
    }

    /// Fold a background-load function's offered rate into its host model.
    fn register_bckgrnd(&mut self, cp_id: CpId, func: FuncIdx) -> Result<(), CoreError> {
        let fref = FuncRef { cp_id, func };
        let (host, rate, srv_time) = {
            let f = self.func(fref)?;
            let cfg = f.cfg_as::<crate::classes::BckgrndLdCfg>()?;
            (f.host.clone(), cfg.rate, cfg.srv_time)
        };
        self.portal.add_background_load(&host, rate, srv_time);
        debug!(host = %host, rate, srv_time, "registered background load");
        Ok(())
    }

    /// Close out a chain whose entry handler consumed its message: the
    /// record gets a completion sample and the bookkeeping clears.
    pub fn finalize_exec(&mut self, fref: FuncRef, msg: &CmpPtnMsg) -> Result<(), CoreError> {
        let now = self.evtq.now();
        self.tracker.end_rec_exec(msg.exec_id, now);
        let cpi = self.cpi_mut(fref.cp_id)?;
        cpi.summary.completed += 1;
        cpi.active_cnt.remove(&msg.exec_id);
        if msg.srt.cp_id != fref.cp_id {
            if let Ok(src_cpi) = self.cpi_mut(msg.srt.cp_id) {
                src_cpi.active_cnt.remove(&msg.exec_id);
            }
        }
        Ok(())
    }

    /// Close out a chain whose message was dropped on a logged path: the
    /// open execution record (if any) is discarded without a sample, so the
    /// tracker never carries an orphan.
    pub fn abandon_exec(&mut self, cp_id: CpId, msg: &CmpPtnMsg) -> Result<(), CoreError> {
        let had_record = self.tracker.abandon_exec(msg.exec_id).is_some();
        let cpi = self.cpi_mut(cp_id)?;
        cpi.active_cnt.remove(&msg.exec_id);
        if had_record {
            cpi.summary.abandoned += 1;
        }
        if msg.srt.cp_id != cp_id {
            if let Ok(src_cpi) = self.cpi_mut(msg.srt.cp_id) {
                src_cpi.active_cnt.remove(&msg.exec_id);
            }
        }
        Ok(())
    }

    /// Exec-id allocator for callers that mint messages outside initiation.
    pub fn alloc_exec_id(&mut self) -> ExecId {
        let id = self.next_exec_id;
        self.next_exec_id += 1;
        id
    }
}

/// Every timing code referenced by a `processPckt` cfg must exist in the
/// exec tables. CPU-model coverage is checked lazily at first use since the
/// model depends on the host the portal reports.
fn check_timing_refs(cpis: &[CmpPtnInstance], timing: &FuncExecTable) -> Vec<VerifyError> {
    let mut errs = Vec::new();
    for cpi in cpis {
        for f in &cpi.funcs {
            if f.class_name != "processPckt" {
                continue;
            }
            let Ok(cfg) = f.cfg_as::<crate::classes::ProcessPcktCfg>() else {
                continue;
            };
            for m in cfg.msg2msg.values() {
                if !timing.has_op(&m.timing) {
                    errs.push(VerifyError::on(
                        format!("{}:{}", cpi.name, f.label),
                        format!("timing code '{}' has no exec-time entry", m.timing),
                    ));
                }
            }
        }
    }
    errs
}

fn digest_inputs(
    cp_dict: &CompPatternDict,
    init_dict: &CpInitDict,
    func_exec: &FuncExecDict,
    shared: &SharedCfgDict,
    mapping: &MappingDict,
) -> String {
    let mut hasher = Sha256::new();
    for chunk in [
        serde_json::to_vec(cp_dict),
        serde_json::to_vec(init_dict),
        serde_json::to_vec(func_exec),
        serde_json::to_vec(shared),
        serde_json::to_vec(mapping),
    ]
    .into_iter()
    .flatten()
    {
        hasher.update(&chunk);
    }
    let out = hasher.finalize();
    out.iter().map(|b| format!("{:02x}", b)).collect()
}
