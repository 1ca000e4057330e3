//! Pattern instances and their construction.
//!
//! A `CmpPtnInstance` is the runtime realization of one pattern description:
//! function instances with decoded cfgs, the graph view, a deterministic RNG
//! stream, and per-execution bookkeeping. Construction runs in two phases:
//! per-pattern building, then a global pass that resolves every dispatch
//! table once all instances exist.

use crate::class::FuncClassRegistry;
use crate::error::VerifyError;
use crate::func::{CmpPtnFuncInstance, InEdgeKey, OutEdge};
use crate::graph::CmpPtnGraph;
use crate::model::desc::{
    CompPatternDesc, CpInitList, MappingDict, ServiceDesc, SharedCfgDict,
};
use crate::types::{
    CpId, ExecId, FuncIdx, ObjId, Priority, DEFAULT_METHOD, INITIATE_MSG_TYPE,
};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::collections::{BTreeMap, HashMap};

/// Lifetime counters for chains that started or ended in this pattern.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecSummary {
    pub started: u64,
    pub completed: u64,
    pub lost: u64,
    /// Chains closed on a logged drop path, without a completion sample.
    pub abandoned: u64,
}

pub struct CmpPtnInstance {
    pub id: CpId,
    pub name: String,
    pub funcs: Vec<CmpPtnFuncInstance>,
    pub func_by_label: HashMap<String, FuncIdx>,
    pub graph: CmpPtnGraph,
    pub services: BTreeMap<String, ServiceDesc>,
    pub rng: ChaCha12Rng,
    /// Outstanding network-borne messages per execution targeting this CPI.
    pub active_cnt: HashMap<ExecId, i64>,
    pub summary: ExecSummary,
}

impl CmpPtnInstance {
    /// Build one instance from its description. Diagnostics accumulate in
    /// `errs`; a non-empty result still comes back so later patterns can be
    /// checked in the same pass, but must be discarded on error.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        id: CpId,
        name: &str,
        desc: &CompPatternDesc,
        init: &CpInitList,
        shared: &SharedCfgDict,
        mapping: &MappingDict,
        registry: &FuncClassRegistry,
        seed: u64,
        next_obj_id: &mut ObjId,
        errs: &mut Vec<VerifyError>,
    ) -> Self {
        let labels: Vec<String> = desc.functions.iter().map(|f| f.label.clone()).collect();
        let mut graph = CmpPtnGraph::new(labels.clone());
        for e in &desc.edges {
            if let Err(err) = graph.add_edge(&e.src_label, &e.msg_type, &e.dst_label, &e.method_code)
            {
                errs.push(prefixed(name, err));
            }
        }
        for x in &desc.ext_edges {
            if let Err(err) =
                graph.add_ext_edge(&x.src_label, &x.msg_type, &x.dst_cp, &x.dst_label, &x.method_code)
            {
                errs.push(prefixed(name, err));
            }
        }

        let bindings = mapping.map.get(name);
        let mut funcs = Vec::with_capacity(desc.functions.len());
        let mut func_by_label = HashMap::new();

        for fd in &desc.functions {
            if func_by_label.contains_key(&fd.label) {
                errs.push(VerifyError::on(
                    format!("{}:{}", name, fd.label),
                    "duplicate function label",
                ));
                continue;
            }
            let element = format!("{}:{}", name, fd.label);
            let class = match registry.get(&fd.class) {
                Ok(c) => c,
                Err(_) => {
                    errs.push(VerifyError::on(
                        element,
                        format!("function class '{}' is not registered", fd.class),
                    ));
                    continue;
                }
            };

            let (raw, format) = cfg_source(name, &fd.label, &fd.class, init, shared);
            let cfg = match class.decode_cfg(&raw, format) {
                Ok(cfg) => cfg,
                Err(detail) => {
                    errs.push(VerifyError::on(
                        element,
                        format!("cfg failed to decode: {}", detail),
                    ));
                    continue;
                }
            };
            for problem in class.validate_cfg(cfg.as_ref()) {
                errs.push(VerifyError::on(element.clone(), problem));
            }

            let (host, priority) = match bindings.and_then(|b| b.get(&fd.label)) {
                Some(binding) => Priority::parse_binding(binding),
                None => {
                    errs.push(VerifyError::on(element.clone(), "no host mapping"));
                    (String::new(), Priority::default())
                }
            };

            let state = class.init_state(cfg.as_ref());
            let init_plan = class.init_plan(cfg.as_ref());
            let trace = class.trace_enabled(cfg.as_ref());
            let obj_id = *next_obj_id;
            *next_obj_id += 1;

            func_by_label.insert(fd.label.clone(), funcs.len());
            funcs.push(CmpPtnFuncInstance {
                id: obj_id,
                cp_id: id,
                label: fd.label.clone(),
                class_name: fd.class.clone(),
                host,
                priority,
                active: true,
                trace,
                calls: 0,
                cfg,
                state,
                methods: class.methods(),
                is_initiating: init_plan.is_some(),
                init_plan,
                in_edge_method_code: HashMap::new(),
                out_edges: Vec::new(),
                msg2idx: HashMap::new(),
                msg_resp: HashMap::new(),
            });
        }

        Self {
            id,
            name: name.to_string(),
            funcs,
            func_by_label,
            graph,
            services: desc.services.clone(),
            rng: ChaCha12Rng::seed_from_u64(seed ^ id),
            active_cnt: HashMap::new(),
            summary: ExecSummary::default(),
        }
    }

    pub fn func_idx(&self, label: &str) -> Option<FuncIdx> {
        self.func_by_label.get(label).copied()
    }

    pub fn func(&self, label: &str) -> Option<&CmpPtnFuncInstance> {
        self.func_idx(label).map(|i| &self.funcs[i])
    }
}

/// Per-function cfg wins over a shared group's; an absent cfg decodes as the
/// class defaults.
fn cfg_source(
    pattern: &str,
    label: &str,
    class: &str,
    init: &CpInitList,
    shared: &SharedCfgDict,
) -> (String, crate::types::CfgFormat) {
    if let Some(raw) = init.cfgs.get(label) {
        let raw = if raw.trim().is_empty() {
            "{}".to_string()
        } else {
            raw.clone()
        };
        return (raw, init.format);
    }
    for group in shared.groups.values() {
        if group.class == class
            && group
                .instances
                .iter()
                .any(|t| t.pattern == pattern && t.label == label)
        {
            return (group.cfg_str.clone(), group.format);
        }
    }
    ("{}".to_string(), crate::types::CfgFormat::Yaml)
}

fn prefixed(pattern: &str, err: VerifyError) -> VerifyError {
    match err.element {
        Some(el) => VerifyError::on(format!("{}:{}", pattern, el), err.message),
        None => VerifyError::on(pattern, err.message),
    }
}

// ─── Global edge-table pass ───────────────────────────────────

struct FuncPlan {
    cp_idx: usize,
    func_idx: FuncIdx,
    initiating: bool,
    in_edges: Vec<(InEdgeKey, String)>,
    out_edges: Vec<OutEdge>,
}

/// Build every dispatch table after all instances exist. Internal in-edges,
/// external in-edges, ordered out-edges (initiation self-loops skipped), and
/// the `msgType → outEdge` index.
pub fn finalize_edge_tables(cpis: &mut [CmpPtnInstance]) -> Vec<VerifyError> {
    let mut errs = Vec::new();
    let name_to_idx: HashMap<String, usize> = cpis
        .iter()
        .enumerate()
        .map(|(i, cpi)| (cpi.name.clone(), i))
        .collect();

    let mut plans: Vec<FuncPlan> = Vec::new();

    for (cp_idx, cpi) in cpis.iter().enumerate() {
        for (func_idx, f) in cpi.funcs.iter().enumerate() {
            let mut plan = FuncPlan {
                cp_idx,
                func_idx,
                initiating: f.is_initiating,
                in_edges: Vec::new(),
                out_edges: Vec::new(),
            };

            // Internal in-edges, self-edges included: a self-edge records an
            // initiation and supplies the initiate method code.
            let mut seen_in: HashMap<String, String> = HashMap::new();
            for (src, msg_type, method) in cpi.graph.in_edges(&f.label) {
                if let Some(other_src) = seen_in.get(&msg_type) {
                    errs.push(VerifyError::on(
                        format!("{}:{}", cpi.name, f.label),
                        format!(
                            "in-edges from '{}' and '{}' share message type '{}'",
                            other_src, src, msg_type
                        ),
                    ));
                    continue;
                }
                seen_in.insert(msg_type.clone(), src.clone());
                if src == f.label {
                    plan.initiating = true;
                }
                plan.in_edges.push((
                    InEdgeKey {
                        cp_id: cpi.id,
                        label: src,
                        msg_type,
                    },
                    method,
                ));
            }

            // An initiating class with no declared self-edge still accepts
            // its own minted message.
            if f.is_initiating
                && !plan
                    .in_edges
                    .iter()
                    .any(|(k, _)| k.label == f.label && k.cp_id == cpi.id)
            {
                plan.in_edges.push((
                    InEdgeKey {
                        cp_id: cpi.id,
                        label: f.label.clone(),
                        msg_type: INITIATE_MSG_TYPE.to_string(),
                    },
                    DEFAULT_METHOD.to_string(),
                ));
            }

            // Internal out-edges; initiation self-loops are not routes.
            for (dst, msg_type, _method) in cpi.graph.out_edges(&f.label) {
                if dst == f.label {
                    continue;
                }
                let Some(dst_idx) = cpi.func_idx(&dst) else {
                    continue; // already reported by add_edge
                };
                plan.out_edges.push(OutEdge {
                    cp_id: cpi.id,
                    func: dst_idx,
                    label: dst,
                    msg_type,
                });
            }

            // External out-edges sourced here.
            for x in cpi.graph.ext_edges() {
                if x.src_label != f.label {
                    continue;
                }
                let Some(&dst_cp_idx) = name_to_idx.get(&x.dst_cp) else {
                    errs.push(VerifyError::on(
                        format!("{}:{}", cpi.name, f.label),
                        format!("external edge targets unknown pattern '{}'", x.dst_cp),
                    ));
                    continue;
                };
                let dst_cpi = &cpis[dst_cp_idx];
                let Some(dst_idx) = dst_cpi.func_idx(&x.dst_label) else {
                    errs.push(VerifyError::on(
                        format!("{}:{}", cpi.name, f.label),
                        format!(
                            "external edge targets unknown function '{}:{}'",
                            x.dst_cp, x.dst_label
                        ),
                    ));
                    continue;
                };
                plan.out_edges.push(OutEdge {
                    cp_id: dst_cpi.id,
                    func: dst_idx,
                    label: x.dst_label.clone(),
                    msg_type: x.msg_type.clone(),
                });
            }

            plans.push(plan);
        }
    }

    // External in-edges: walk every source pattern's ext edges and install
    // the method code at the destination.
    let mut ext_in: Vec<(usize, FuncIdx, InEdgeKey, String)> = Vec::new();
    for cpi in cpis.iter() {
        for x in cpi.graph.ext_edges() {
            let Some(&dst_cp_idx) = name_to_idx.get(&x.dst_cp) else {
                continue; // reported above
            };
            let Some(dst_idx) = cpis[dst_cp_idx].func_idx(&x.dst_label) else {
                continue;
            };
            ext_in.push((
                dst_cp_idx,
                dst_idx,
                InEdgeKey {
                    cp_id: cpi.id,
                    label: x.src_label.clone(),
                    msg_type: x.msg_type.clone(),
                },
                x.method_code.clone(),
            ));
        }
    }

    // Apply.
    for plan in plans {
        let cpi_name = cpis[plan.cp_idx].name.clone();
        let f = &mut cpis[plan.cp_idx].funcs[plan.func_idx];
        f.is_initiating = plan.initiating;
        for (key, method) in plan.in_edges {
            f.in_edge_method_code.insert(key, method);
        }
        for (idx, edge) in plan.out_edges.iter().enumerate() {
            if f.msg2idx.insert(edge.msg_type.clone(), idx).is_some() {
                errs.push(VerifyError::on(
                    format!("{}:{}", cpi_name, f.label),
                    format!("conflicting out-edges for message type '{}'", edge.msg_type),
                ));
            }
        }
        f.out_edges = plan.out_edges;
    }
    for (cp_idx, func_idx, key, method) in ext_in {
        cpis[cp_idx].funcs[func_idx]
            .in_edge_method_code
            .insert(key, method);
    }

    // Service maps must point at real functions.
    let service_checks: Vec<(String, String, String, String)> = cpis
        .iter()
        .flat_map(|cpi| {
            cpi.services.iter().map(move |(svc, target)| {
                (
                    cpi.name.clone(),
                    svc.clone(),
                    target.cp.clone(),
                    target.label.clone(),
                )
            })
        })
        .collect();
    for (owner, svc, cp, label) in service_checks {
        let ok = name_to_idx
            .get(&cp)
            .map(|&i| cpis[i].func_idx(&label).is_some())
            .unwrap_or(false);
        if !ok {
            errs.push(VerifyError::on(
                owner,
                format!("service '{}' targets unknown function '{}:{}'", svc, cp, label),
            ));
        }
    }

    errs
}
