//! End-to-end scenarios driving full models through the runtime.

use cpsim_core::classes::SrvReqState;
use cpsim_core::engine::{RunOptions, Runtime};
use cpsim_core::error::CoreError;
use cpsim_core::func::InEdgeKey;
use cpsim_core::model::desc::{
    CompPatternDict, CpInitDict, FuncExecDict, MappingDict, SharedCfgDict, TopoDesc,
};
use cpsim_core::msg::{CmpPtnMsg, XferHint};
use cpsim_core::portal::SimpleNetwork;
use cpsim_core::tracking::MsrType;
use cpsim_core::types::MsgAddr;

fn build(cp: &str, init: &str, exec: &str, map: &str, topo: &str, seed: u64) -> Runtime {
    try_build(cp, init, exec, map, topo, seed).unwrap()
}

fn try_build(
    cp: &str,
    init: &str,
    exec: &str,
    map: &str,
    topo: &str,
    seed: u64,
) -> Result<Runtime, CoreError> {
    let cp: CompPatternDict = serde_yaml::from_str(cp).unwrap();
    let init: CpInitDict = serde_yaml::from_str(init).unwrap();
    let exec: FuncExecDict = serde_yaml::from_str(exec).unwrap();
    let map: MappingDict = serde_yaml::from_str(map).unwrap();
    let topo: TopoDesc = serde_yaml::from_str(topo).unwrap();
    let portal = SimpleNetwork::new(&topo, &Default::default(), &Default::default(), seed);
    Runtime::build(
        &cp,
        &init,
        &exec,
        &SharedCfgDict::default(),
        &map,
        Box::new(portal),
        RunOptions {
            seed,
            stop_time: None,
            trace: false,
        },
    )
}

fn drain(rt: &mut Runtime) {
    while let Some((_, ev)) = rt.evtq.next(None) {
        rt.handle_event(ev).unwrap();
    }
}

const ONE_HOST: &str = "endpts: [{ name: h1, cpu_model: x86 }]";

// ─── Scenario A: single-hop start → finish ────────────────────

#[test]
fn single_hop_start_to_finish() {
    let cp = r#"
patterns:
  solo:
    functions:
      - { class: start, label: src }
      - { class: finish, label: sink }
    edges:
      - { src_label: src, msg_type: ping, dst_label: sink }
"#;
    let init = r#"
init:
  solo:
    msgs:
      - { msg_type: ping, pckt_len: 1000, msg_len: 1500 }
    cfgs:
      src: |
        msg_type: ping
        pckt_len: 1000
        msg_len: 1500
        start_time: 0.001
"#;
    let map = "map: { solo: { src: h1, sink: h1 } }";
    let mut rt = build(cp, init, "{}", map, ONE_HOST, 1);
    rt.run().unwrap();

    let group = &rt.tracker.groups()["solo:src"];
    assert_eq!(group.finished.n, 1);
    assert!((group.finished.sum - 0.001).abs() < 1e-12);

    let cpi = &rt.cpis[0];
    assert_eq!(cpi.summary.started, 1);
    assert_eq!(cpi.summary.completed, 1);
    assert_eq!(cpi.summary.lost, 0);
    assert_eq!(rt.tracker.active_count(), 0);
}

// ─── Scenario B: processPckt on an accelerator ────────────────

#[test]
fn accelerated_packet_processing() {
    let cp = r#"
patterns:
  flow:
    functions:
      - { class: start, label: src }
      - { class: processPckt, label: crypt }
      - { class: finish, label: sink }
    edges:
      - { src_label: src, msg_type: cleartext, dst_label: crypt }
      - { src_label: crypt, msg_type: ciphertext, dst_label: sink }
"#;
    let init = r#"
init:
  flow:
    msgs:
      - { msg_type: cleartext, pckt_len: 1000, msg_len: 1500 }
      - { msg_type: ciphertext, pckt_len: 1000, msg_len: 1500 }
    cfgs:
      src: |
        msg_type: cleartext
        pckt_len: 1000
        msg_len: 1500
      crypt: |
        msg2msg:
          cleartext: { out: ciphertext, timing: encrypt }
        accel_name: crypto
"#;
    // Two calibration points on an exact line through the origin, so the
    // least-squares prediction at 1000 bytes is exactly 1 ms.
    let exec = r#"
times:
  encrypt:
    - { cpu_model: accel-v1, pckt_len: 500, exec_time: 0.0005 }
    - { cpu_model: accel-v1, pckt_len: 2000, exec_time: 0.002 }
"#;
    let map = "map: { flow: { src: h1, crypt: h1, sink: h1 } }";
    let topo = r#"
endpts:
  - { name: h1, cpu_model: x86, accels: { crypto: accel-v1 } }
"#;
    let mut rt = build(cp, init, exec, map, topo, 1);
    rt.run().unwrap();

    let group = &rt.tracker.groups()["flow:src"];
    assert_eq!(group.finished.n, 1);
    assert!(
        (group.finished.sum - 0.001).abs() < 1e-12,
        "latency {}",
        group.finished.sum
    );
    assert_eq!(rt.cpis[0].summary.completed, 1);
}

// ─── Scenario C: cross-pattern transfer via carried header ────

#[test]
fn transfer_follows_carried_header() {
    let cp = r#"
patterns:
  alpha:
    functions:
      - { class: start, label: src }
      - { class: transfer, label: hop }
    edges:
      - { src_label: src, msg_type: ping, dst_label: hop }
    ext_edges:
      - { src_label: hop, msg_type: q, dst_cp: beta, dst_label: svcA }
  beta:
    functions:
      - { class: finish, label: svcA }
"#;
    let init = r#"
init:
  alpha:
    msgs:
      - { msg_type: ping, pckt_len: 100, msg_len: 100 }
      - { msg_type: q, pckt_len: 100, msg_len: 100 }
    cfgs:
      src: |
        msg_type: ping
        pckt_len: 100
        msg_len: 100
"#;
    let map = "map: { alpha: { src: h1, hop: h1 }, beta: { svcA: h1 } }";
    let mut rt = build(cp, init, "{}", map, ONE_HOST, 1);

    let alpha = rt.cp_id_by_name("alpha").unwrap();
    let beta = rt.cp_id_by_name("beta").unwrap();
    let hop = rt.cpi(alpha).unwrap().func_idx("hop").unwrap();

    let exec_id = rt.alloc_exec_id();
    let mut msg = CmpPtnMsg::template("ping", 100, 100);
    msg.exec_id = exec_id;
    msg.srt = MsgAddr::new(alpha, "src");
    msg.prev = MsgAddr::new(alpha, "src");
    msg.next = MsgAddr::new(alpha, "hop");
    msg.xfer = Some(XferHint {
        cp_id: beta,
        label: "svcA".to_string(),
        msg_type: "q".to_string(),
    });

    rt.enter_func(alpha, hop, Some(msg)).unwrap();
    drain(&mut rt);

    let beta_cpi = rt.cpi(beta).unwrap();
    assert_eq!(beta_cpi.summary.completed, 1);
    // Same host, zero-delay hops only.
    assert_eq!(rt.evtq.now(), 0.0);
}

#[test]
fn transfer_falls_back_to_configured_target() {
    let cp = r#"
patterns:
  alpha:
    functions:
      - { class: start, label: src }
      - { class: transfer, label: hop }
    edges:
      - { src_label: src, msg_type: ping, dst_label: hop }
    ext_edges:
      - { src_label: hop, msg_type: q, dst_cp: beta, dst_label: svcA }
  beta:
    functions:
      - { class: finish, label: svcA }
"#;
    let init = r#"
init:
  alpha:
    msgs:
      - { msg_type: ping, pckt_len: 100, msg_len: 100 }
      - { msg_type: q, pckt_len: 100, msg_len: 100 }
    cfgs:
      src: |
        msg_type: ping
        pckt_len: 100
        msg_len: 100
      hop: |
        x_cp: beta
        x_label: svcA
        x_msg_type: q
"#;
    let map = "map: { alpha: { src: h1, hop: h1 }, beta: { svcA: h1 } }";
    let mut rt = build(cp, init, "{}", map, ONE_HOST, 1);
    rt.run().unwrap();

    let beta = rt.cp_id_by_name("beta").unwrap();
    assert_eq!(rt.cpi(beta).unwrap().summary.completed, 1);
}

// ─── Scenario D: srvReq bypass ────────────────────────────────

#[test]
fn srv_req_bypass_passes_through() {
    let cp = r#"
patterns:
  bp:
    functions:
      - { class: start, label: src }
      - { class: srvReq, label: req }
      - { class: finish, label: sink }
    edges:
      - { src_label: src, msg_type: ping, dst_label: req }
      - { src_label: req, msg_type: ping, dst_label: sink }
"#;
    let init = r#"
init:
  bp:
    msgs:
      - { msg_type: ping, pckt_len: 100, msg_len: 100 }
    cfgs:
      src: |
        msg_type: ping
        pckt_len: 100
        msg_len: 100
      req: "bypass: true"
"#;
    let map = "map: { bp: { src: h1, req: h1, sink: h1 } }";
    let mut rt = build(cp, init, "{}", map, ONE_HOST, 1);
    rt.run().unwrap();

    let group = &rt.tracker.groups()["bp:src"];
    assert_eq!(group.finished.n, 1);
    assert_eq!(group.finished.sum, 0.0);
    assert_eq!(rt.cpis[0].summary.completed, 1);
}

// ─── Invariant 5: service round-trip ──────────────────────────

#[test]
fn service_round_trip_returns_to_caller() {
    let cp = r#"
patterns:
  svc:
    functions:
      - { class: start, label: src }
      - { class: srvReq, label: req }
      - { class: srvRsp, label: resp }
      - { class: finish, label: sink }
    edges:
      - { src_label: src, msg_type: ping, dst_label: req }
      - { src_label: req, msg_type: auth, dst_label: resp }
      - { src_label: req, msg_type: pong, dst_label: sink }
"#;
    let init = r#"
init:
  svc:
    msgs:
      - { msg_type: ping, pckt_len: 1000, msg_len: 1000 }
      - { msg_type: auth, pckt_len: 1000, msg_len: 1000 }
      - { msg_type: pong, pckt_len: 1000, msg_len: 1000 }
    cfgs:
      src: |
        msg_type: ping
        pckt_len: 1000
        msg_len: 1000
      req: |
        srv_op: auth
        msg2msg:
          ping: pong
      resp: |
        timing_code:
          auth: hash
"#;
    let exec = r#"
times:
  hash:
    - { cpu_model: x86, pckt_len: 1000, exec_time: 0.002 }
"#;
    let map = "map: { svc: { src: h1, req: h1, resp: h1, sink: h1 } }";
    let mut rt = build(cp, init, exec, map, ONE_HOST, 1);
    rt.run().unwrap();

    let group = &rt.tracker.groups()["svc:src"];
    assert_eq!(group.finished.n, 1);
    assert!(
        (group.finished.sum - 0.002).abs() < 1e-12,
        "round trip {}",
        group.finished.sum
    );
    assert_eq!(rt.cpis[0].summary.completed, 1);

    // The response edge was resolved once and cached.
    let cpi = &rt.cpis[0];
    let req = cpi.func("req").unwrap();
    let state = req.state_ref::<SrvReqState>().unwrap();
    let cached = state.rsp_edge_idx.unwrap();
    assert_eq!(req.out_edges[cached].label, "resp");
    // And the per-exec request type was consumed on return.
    assert!(state.msg_type_in.is_empty());
}

// ─── Scenario E: network loss ─────────────────────────────────

#[test]
fn network_loss_reported_once() {
    let cp = r#"
patterns:
  lossy:
    functions:
      - { class: start, label: src }
      - { class: finish, label: sink }
    edges:
      - { src_label: src, msg_type: ping, dst_label: sink }
"#;
    let init = r#"
init:
  lossy:
    msgs:
      - { msg_type: ping, pckt_len: 1000, msg_len: 1500 }
    cfgs:
      src: |
        msg_type: ping
        pckt_len: 1000
        msg_len: 1500
"#;
    let map = "map: { lossy: { src: h1, sink: h2 } }";
    let topo = r#"
endpts:
  - { name: h1, cpu_model: x86 }
  - { name: h2, cpu_model: x86 }
links:
  - { src: h1, dst: h2, latency: 0.001, pr_loss: 1.0 }
"#;
    let mut rt = build(cp, init, "{}", map, topo, 1);
    rt.run().unwrap();

    let cpi = &rt.cpis[0];
    assert_eq!(cpi.summary.started, 1);
    assert_eq!(cpi.summary.completed, 0);
    assert_eq!(cpi.summary.lost, 1);
    assert!(cpi.active_cnt.is_empty());
    // The lost chain left no completion sample behind.
    assert!(rt.tracker.groups().get("lossy:src").is_none());
    assert_eq!(rt.tracker.active_count(), 0);
}

// ─── Scenario F: measurement classification ───────────────────

fn measure_model(groups: &str) -> (String, String, String, String) {
    let cp = r#"
patterns:
  probe:
    functions:
      - { class: start, label: src }
      - { class: measure, label: m1 }
      - { class: measure, label: m2 }
      - { class: finish, label: sink }
    edges:
      - { src_label: src, msg_type: ping, dst_label: m1 }
      - { src_label: m1, msg_type: ping, dst_label: m2 }
      - { src_label: m2, msg_type: ping, dst_label: sink }
"#
    .to_string();
    let init = format!(
        r#"
init:
  probe:
    msgs:
      - {{ msg_type: ping, pckt_len: 1000, msg_len: 1500 }}
    cfgs:
      src: |
        msg_type: ping
        pckt_len: 1000
        msg_len: 1500
        batch: 2
        interarrival: 0.5
      m1: |
        msr_name: rtt
        msr_op: start
        groups: [{groups}]
      m2: |
        msr_name: rtt
        msr_op: end
        groups: [{groups}]
"#,
        groups = groups
    );
    let map = "map: { probe: { src: h1, m1: h1, m2: h2, sink: h2 } }".to_string();
    let topo = r#"
endpts:
  - { name: h1, cpu_model: x86 }
  - { name: h2, cpu_model: x86 }
links:
  - { src: h1, dst: h2, latency: 0.25 }
"#
    .to_string();
    (cp, init, map, topo)
}

#[test]
fn measure_bndwdth_aggregate_merges_execs() {
    let (cp, init, map, topo) = measure_model("Bndwdth, Aggregate");
    let mut rt = build(&cp, &init, "{}", &map, &topo, 1);
    rt.run().unwrap();

    let group = &rt.tracker.groups()["rtt#bndwdth"];
    assert_eq!(group.kind, MsrType::Bndwdth);
    assert_eq!(group.finished.n, 2);
    // 1500 bytes over a 0.25 s span, both chains.
    assert!((group.finished.sum - 2.0 * 1500.0 / 0.25).abs() < 1e-9);

    let records = rt.tracker.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].measure_name, "rtt");
    assert_eq!(records[0].src_dev, "h1");
    assert_eq!(records[0].dst_dev, "h2");
    assert!((records[0].latency - 0.25).abs() < 1e-12);
}

#[test]
fn measure_default_groups_stay_per_exec() {
    let (cp, init, map, topo) = measure_model("Latency");
    let mut rt = build(&cp, &init, "{}", &map, &topo, 1);
    rt.run().unwrap();

    assert_eq!(rt.tracker.groups()["rtt:1"].finished.n, 1);
    assert_eq!(rt.tracker.groups()["rtt:2"].finished.n, 1);
    for key in ["rtt:1", "rtt:2"] {
        let g = &rt.tracker.groups()[key];
        assert_eq!(g.kind, MsrType::Latency);
        assert!((g.finished.sum - 0.25).abs() < 1e-12);
    }

    // Chain tracking saw both executions end at the sink.
    let chains = &rt.tracker.groups()["probe:src"];
    assert_eq!(chains.finished.n, 2);
    assert!((chains.finished.sum - 1.0).abs() < 1e-9);
}

// ─── Invariant 2: edge-table completeness ─────────────────────

#[test]
fn edge_tables_cover_internal_and_external_edges() {
    let cp = r#"
patterns:
  alpha:
    functions:
      - { class: start, label: src }
      - { class: processPckt, label: work }
    edges:
      - { src_label: src, msg_type: ping, dst_label: work }
    ext_edges:
      - { src_label: work, msg_type: done, dst_cp: beta, dst_label: sink }
  beta:
    functions:
      - { class: finish, label: sink }
"#;
    let init = r#"
init:
  alpha:
    msgs:
      - { msg_type: ping, pckt_len: 100, msg_len: 100 }
      - { msg_type: done, pckt_len: 100, msg_len: 100 }
    cfgs:
      src: |
        msg_type: ping
        pckt_len: 100
        msg_len: 100
      work: |
        msg2msg:
          ping: { out: done, timing: noop }
"#;
    let map = "map: { alpha: { src: h1, work: h1 }, beta: { sink: h1 } }";
    let rt = build(cp, init, "{}", map, ONE_HOST, 1);

    let alpha = rt.cp_id_by_name("alpha").unwrap();
    let beta = rt.cp_id_by_name("beta").unwrap();

    // Internal edge: work's in-table and src's out-edges line up.
    let work = rt.cpi(alpha).unwrap().func("work").unwrap();
    assert!(work.in_edge_method_code.contains_key(&InEdgeKey {
        cp_id: alpha,
        label: "src".to_string(),
        msg_type: "ping".to_string(),
    }));
    let src = rt.cpi(alpha).unwrap().func("src").unwrap();
    assert!(src
        .out_edges
        .iter()
        .any(|e| e.cp_id == alpha && e.label == "work" && e.msg_type == "ping"));

    // External edge: sink's in-table and work's out-edges line up.
    let sink = rt.cpi(beta).unwrap().func("sink").unwrap();
    assert!(sink.in_edge_method_code.contains_key(&InEdgeKey {
        cp_id: alpha,
        label: "work".to_string(),
        msg_type: "done".to_string(),
    }));
    assert!(work
        .out_edges
        .iter()
        .any(|e| e.cp_id == beta && e.label == "sink" && e.msg_type == "done"));
}

// ─── Shared cfg groups ────────────────────────────────────────

#[test]
fn shared_cfg_group_fills_missing_cfgs() {
    let cp: CompPatternDict = serde_yaml::from_str(
        r#"
patterns:
  grp:
    functions:
      - { class: start, label: src }
      - { class: processPckt, label: work }
      - { class: finish, label: sink }
    edges:
      - { src_label: src, msg_type: ping, dst_label: work }
      - { src_label: work, msg_type: pong, dst_label: sink }
"#,
    )
    .unwrap();
    let init: CpInitDict = serde_yaml::from_str(
        r#"
init:
  grp:
    msgs:
      - { msg_type: ping, pckt_len: 500, msg_len: 500 }
      - { msg_type: pong, pckt_len: 500, msg_len: 500 }
    cfgs:
      src: |
        msg_type: ping
        pckt_len: 500
        msg_len: 500
"#,
    )
    .unwrap();
    // `work` has no per-function cfg; the group supplies it.
    let shared: SharedCfgDict = serde_yaml::from_str(
        r#"
groups:
  stock-workers:
    class: processPckt
    instances:
      - { pattern: grp, label: work }
    cfg_str: |
      msg2msg:
        ping: { out: pong, timing: noop }
"#,
    )
    .unwrap();
    let exec = FuncExecDict::default();
    let map: MappingDict =
        serde_yaml::from_str("map: { grp: { src: h1, work: h1, sink: h1 } }").unwrap();
    let topo: TopoDesc = serde_yaml::from_str(ONE_HOST).unwrap();
    let portal = SimpleNetwork::new(&topo, &Default::default(), &Default::default(), 1);

    let mut rt = Runtime::build(
        &cp,
        &init,
        &exec,
        &shared,
        &map,
        Box::new(portal),
        RunOptions::default(),
    )
    .unwrap();
    rt.run().unwrap();

    assert_eq!(rt.cpis[0].summary.completed, 1);
    // noop costs nothing, so the chain completes at its departure time.
    assert_eq!(rt.tracker.groups()["grp:src"].finished.sum, 0.0);
}

// ─── Build-error aggregation ──────────────────────────────────

#[test]
fn build_aggregates_every_diagnostic() {
    let cp = r#"
patterns:
  broken:
    functions:
      - { class: ghostClass, label: a }
      - { class: finish, label: b }
    edges:
      - { src_label: a, msg_type: ping, dst_label: b }
"#;
    // No message catalog, unknown class, and no host mapping for b.
    let err = try_build(cp, "{}", "{}", "map: { broken: { a: h1 } }", ONE_HOST, 1).unwrap_err();
    match err {
        CoreError::Build(errs) => {
            assert!(errs.0.len() >= 3, "expected several diagnostics: {}", errs);
            let text = format!("{}", errs);
            assert!(text.contains("ghostClass"));
            assert!(text.contains("message list"));
            assert!(text.contains("no host mapping"));
        }
        other => panic!("expected a build error, got {:?}", other),
    }
}

// ─── Error policy at the dispatch boundary ────────────────────

fn crypt_model() -> Runtime {
    let cp = r#"
patterns:
  flow:
    functions:
      - { class: start, label: src }
      - { class: processPckt, label: crypt }
      - { class: finish, label: sink }
    edges:
      - { src_label: src, msg_type: cleartext, dst_label: crypt }
      - { src_label: crypt, msg_type: ciphertext, dst_label: sink }
"#;
    let init = r#"
init:
  flow:
    msgs:
      - { msg_type: cleartext, pckt_len: 1000, msg_len: 1500 }
      - { msg_type: ciphertext, pckt_len: 1000, msg_len: 1500 }
    cfgs:
      src: |
        msg_type: cleartext
        pckt_len: 1000
        msg_len: 1500
      crypt: |
        msg2msg:
          cleartext: { out: ciphertext, timing: noop }
"#;
    let map = "map: { flow: { src: h1, crypt: h1, sink: h1 } }";
    build(cp, init, "{}", map, ONE_HOST, 1)
}

#[test]
fn unresolved_arrival_is_dropped_not_fatal() {
    let mut rt = crypt_model();
    let flow = rt.cp_id_by_name("flow").unwrap();
    let crypt = rt.cpi(flow).unwrap().func_idx("crypt").unwrap();

    let exec_id = rt.alloc_exec_id();
    let mut msg = CmpPtnMsg::template("cleartext", 1500, 1000);
    msg.exec_id = exec_id;
    msg.start = true;
    msg.prev = MsgAddr::new(flow, "ghost");
    msg.next = MsgAddr::new(flow, "crypt");

    rt.enter_func(flow, crypt, Some(msg)).unwrap();
    assert!(rt.evtq.is_empty(), "dropped arrival must schedule nothing");
    assert_eq!(rt.cpis[0].summary.completed, 0);
    // The record opened by the first hop settles as abandoned, not orphaned.
    assert_eq!(rt.tracker.active_count(), 0);
    assert_eq!(rt.cpis[0].summary.abandoned, 1);
}

#[test]
fn duplicate_exec_start_is_fatal() {
    let mut rt = crypt_model();
    let flow = rt.cp_id_by_name("flow").unwrap();
    let crypt = rt.cpi(flow).unwrap().func_idx("crypt").unwrap();

    let exec_id = rt.alloc_exec_id();
    let mut msg = CmpPtnMsg::template("cleartext", 1500, 1000);
    msg.exec_id = exec_id;
    msg.start = true;
    msg.prev = MsgAddr::new(flow, "src");
    msg.next = MsgAddr::new(flow, "crypt");

    rt.enter_func(flow, crypt, Some(msg.clone())).unwrap();
    let err = rt.enter_func(flow, crypt, Some(msg)).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateExec(id) if id == exec_id));
}

// ─── Drops settle the execution record ────────────────────────

#[test]
fn transfer_without_target_abandons_chain() {
    let cp = r#"
patterns:
  stuck:
    functions:
      - { class: start, label: src }
      - { class: transfer, label: hop }
    edges:
      - { src_label: src, msg_type: ping, dst_label: hop }
"#;
    let init = r#"
init:
  stuck:
    msgs:
      - { msg_type: ping, pckt_len: 100, msg_len: 100 }
    cfgs:
      src: |
        msg_type: ping
        pckt_len: 100
        msg_len: 100
"#;
    let map = "map: { stuck: { src: h1, hop: h1 } }";
    let mut rt = build(cp, init, "{}", map, ONE_HOST, 1);
    rt.run().unwrap();

    let cpi = &rt.cpis[0];
    assert_eq!(cpi.summary.started, 1);
    assert_eq!(cpi.summary.completed, 0);
    assert_eq!(cpi.summary.abandoned, 1);
    assert_eq!(rt.tracker.active_count(), 0);
    assert!(rt.tracker.groups().get("stuck:src").is_none());
}

#[test]
fn srv_rsp_without_return_address_abandons_chain() {
    let cp = r#"
patterns:
  oneway:
    functions:
      - { class: start, label: src }
      - { class: srvRsp, label: resp }
    edges:
      - { src_label: src, msg_type: auth, dst_label: resp }
"#;
    let init = r#"
init:
  oneway:
    msgs:
      - { msg_type: auth, pckt_len: 100, msg_len: 100 }
    cfgs:
      src: |
        msg_type: auth
        pckt_len: 100
        msg_len: 100
      resp: |
        timing_code:
          auth: noop
"#;
    let map = "map: { oneway: { src: h1, resp: h1 } }";
    let mut rt = build(cp, init, "{}", map, ONE_HOST, 1);
    rt.run().unwrap();

    let cpi = &rt.cpis[0];
    assert_eq!(cpi.summary.abandoned, 1);
    assert_eq!(rt.tracker.active_count(), 0);
}

// ─── Priority wins same-time contention ───────────────────────

#[test]
fn higher_priority_function_takes_the_host_first() {
    // Two identical chains contend for one host CPU at the same instant.
    // The worker in `zeta` outranks the one in `alpha`, so it must win even
    // though `alpha` sorts first everywhere else.
    let cp = r#"
patterns:
  alpha:
    functions:
      - { class: start, label: src }
      - { class: processPckt, label: work }
      - { class: finish, label: sink }
    edges:
      - { src_label: src, msg_type: job, dst_label: work }
      - { src_label: work, msg_type: done, dst_label: sink }
  zeta:
    functions:
      - { class: start, label: src }
      - { class: processPckt, label: work }
      - { class: finish, label: sink }
    edges:
      - { src_label: src, msg_type: job, dst_label: work }
      - { src_label: work, msg_type: done, dst_label: sink }
"#;
    let cfgs = r#"
    msgs:
      - { msg_type: job, pckt_len: 1000, msg_len: 1000 }
      - { msg_type: done, pckt_len: 1000, msg_len: 1000 }
    cfgs:
      src: |
        msg_type: job
        pckt_len: 1000
        msg_len: 1000
      work: |
        msg2msg:
          job: { out: done, timing: crunch }
"#;
    let init = format!("init:\n  alpha:{cfgs}  zeta:{cfgs}");
    let exec = r#"
times:
  crunch:
    - { cpu_model: x86, pckt_len: 1000, exec_time: 0.01 }
"#;
    let map = r#"
map:
  alpha: { src: h1, work: 'h1,1', sink: h1 }
  zeta: { src: h1, work: 'h1,5', sink: h1 }
"#;
    let mut rt = build(cp, &init, exec, map, ONE_HOST, 1);
    rt.run().unwrap();

    let zeta = &rt.tracker.groups()["zeta:src"];
    let alpha = &rt.tracker.groups()["alpha:src"];
    assert_eq!(zeta.finished.n, 1);
    assert_eq!(alpha.finished.n, 1);
    assert!(
        (zeta.finished.sum - 0.01).abs() < 1e-9,
        "high-priority chain ran first: {}",
        zeta.finished.sum
    );
    assert!(
        (alpha.finished.sum - 0.02).abs() < 1e-9,
        "low-priority chain waited: {}",
        alpha.finished.sum
    );
}

// ─── Random interarrival spacing replays deterministically ────

#[test]
fn random_spacing_replays_with_same_seed() {
    let cp = r#"
patterns:
  poisson:
    functions:
      - { class: start, label: src }
      - { class: finish, label: sink }
    edges:
      - { src_label: src, msg_type: ping, dst_label: sink }
"#;
    let init = r#"
init:
  poisson:
    msgs:
      - { msg_type: ping, pckt_len: 100, msg_len: 100 }
    cfgs:
      src: |
        msg_type: ping
        pckt_len: 100
        msg_len: 100
        batch: 5
        interarrival: 0.1
        random_spacing: true
"#;
    let map = "map: { poisson: { src: h1, sink: h1 } }";

    let mut sums = Vec::new();
    for _ in 0..2 {
        let mut rt = build(cp, init, "{}", map, ONE_HOST, 42);
        rt.run().unwrap();
        let group = &rt.tracker.groups()["poisson:src"];
        assert_eq!(group.finished.n, 5);
        sums.push(group.finished.sum);
    }
    assert_eq!(sums[0], sums[1], "same seed must replay exactly");
    assert!(sums[0] > 0.0, "random gaps must stagger departures");
}

// ─── Cross-host hop pays network latency ──────────────────────

#[test]
fn cross_host_hop_pays_link_latency() {
    let cp = r#"
patterns:
  wan:
    functions:
      - { class: start, label: src }
      - { class: finish, label: sink }
    edges:
      - { src_label: src, msg_type: ping, dst_label: sink }
"#;
    let init = r#"
init:
  wan:
    msgs:
      - { msg_type: ping, pckt_len: 1000, msg_len: 1000000 }
    cfgs:
      src: |
        msg_type: ping
        pckt_len: 1000
        msg_len: 1000000
"#;
    let map = "map: { wan: { src: h1, sink: h2 } }";
    let topo = r#"
endpts:
  - { name: h1, cpu_model: x86 }
  - { name: h2, cpu_model: x86 }
links:
  - { src: h1, dst: h2, latency: 0.001, bandwidth: 1000000 }
"#;
    let mut rt = build(cp, init, "{}", map, topo, 1);
    rt.run().unwrap();

    // 1 MB over 1 MB/s plus 1 ms of latency.
    let group = &rt.tracker.groups()["wan:src"];
    assert_eq!(group.finished.n, 1);
    assert!(
        (group.finished.sum - 1.001).abs() < 1e-9,
        "latency {}",
        group.finished.sum
    );
}
