//! Description-level invariant checks.
//!
//! Runs before instance construction and aggregates everything it finds;
//! structural checks that need built instances (edge-table conflicts,
//! cross-pattern targets, cfg decoding) happen during the build itself and
//! land in the same aggregate.

use crate::class::FuncClassRegistry;
use crate::error::VerifyError;
use crate::model::desc::{CompPatternDict, CpInitDict, MappingDict};
use crate::types::INITIATE_MSG_TYPE;
use std::collections::HashSet;

pub fn verify_model(
    _registry: &FuncClassRegistry,
    cp_dict: &CompPatternDict,
    init_dict: &CpInitDict,
    mapping: &MappingDict,
) -> Vec<VerifyError> {
    let mut errs = Vec::new();

    if cp_dict.patterns.is_empty() {
        errs.push(VerifyError::new("no patterns declared"));
    }

    for (name, desc) in &cp_dict.patterns {
        let labels: HashSet<&str> = desc.functions.iter().map(|f| f.label.as_str()).collect();
        let catalog: HashSet<&str> = init_dict
            .init
            .get(name)
            .map(|init| init.msgs.iter().map(|m| m.msg_type.as_str()).collect())
            .unwrap_or_default();

        // Every edge's message type must be cataloged. Initiation self-edges
        // are markers, not traffic, and are exempt.
        for e in &desc.edges {
            if e.src_label == e.dst_label || e.msg_type == INITIATE_MSG_TYPE {
                continue;
            }
            if !catalog.contains(e.msg_type.as_str()) {
                errs.push(VerifyError::on(
                    format!("{}:{}", name, e.src_label),
                    format!("edge message type '{}' is not in the message list", e.msg_type),
                ));
            }
        }
        for x in &desc.ext_edges {
            if !catalog.contains(x.msg_type.as_str()) {
                errs.push(VerifyError::on(
                    format!("{}:{}", name, x.src_label),
                    format!(
                        "external edge message type '{}' is not in the message list",
                        x.msg_type
                    ),
                ));
            }
            if !cp_dict.patterns.contains_key(&x.dst_cp) {
                errs.push(VerifyError::on(
                    format!("{}:{}", name, x.src_label),
                    format!("external edge targets undeclared pattern '{}'", x.dst_cp),
                ));
            } else if !cp_dict.patterns[&x.dst_cp]
                .functions
                .iter()
                .any(|f| f.label == x.dst_label)
            {
                errs.push(VerifyError::on(
                    format!("{}:{}", name, x.src_label),
                    format!(
                        "external edge targets undeclared function '{}:{}'",
                        x.dst_cp, x.dst_label
                    ),
                ));
            }
        }

        // Init-list cfg keys must name declared functions.
        if let Some(init) = init_dict.init.get(name) {
            for label in init.cfgs.keys() {
                if !labels.contains(label.as_str()) {
                    errs.push(VerifyError::on(
                        name.clone(),
                        format!("init cfg for undeclared function '{}'", label),
                    ));
                }
            }
        }

        // Mapping entries must name declared functions.
        if let Some(bindings) = mapping.map.get(name) {
            for label in bindings.keys() {
                if !labels.contains(label.as_str()) {
                    errs.push(VerifyError::on(
                        name.clone(),
                        format!("mapping for undeclared function '{}'", label),
                    ));
                }
            }
        }
    }

    for name in init_dict.init.keys() {
        if !cp_dict.patterns.contains_key(name) {
            errs.push(VerifyError::on(
                name.clone(),
                "init list names an undeclared pattern",
            ));
        }
    }
    for name in mapping.map.keys() {
        if !cp_dict.patterns.contains_key(name) {
            errs.push(VerifyError::on(
                name.clone(),
                "mapping names an undeclared pattern",
            ));
        }
    }

    errs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::desc::*;

    fn one_pattern() -> CompPatternDict {
        let mut dict = CompPatternDict::default();
        dict.patterns.insert(
            "p".to_string(),
            CompPatternDesc {
                functions: vec![
                    FuncDesc {
                        class: "start".into(),
                        label: "src".into(),
                    },
                    FuncDesc {
                        class: "finish".into(),
                        label: "sink".into(),
                    },
                ],
                edges: vec![EdgeDesc {
                    src_label: "src".into(),
                    msg_type: "ping".into(),
                    dst_label: "sink".into(),
                    method_code: "default".into(),
                }],
                ext_edges: vec![],
                services: Default::default(),
            },
        );
        dict
    }

    fn catalog_for(msg_type: &str) -> CpInitDict {
        let mut init = CpInitDict::default();
        init.init.insert(
            "p".to_string(),
            CpInitList {
                msgs: vec![MsgDesc {
                    msg_type: msg_type.into(),
                    pckt_len: 100,
                    msg_len: 100,
                }],
                cfgs: Default::default(),
                format: Default::default(),
            },
        );
        init
    }

    #[test]
    fn clean_model_verifies() {
        let reg = FuncClassRegistry::with_builtins();
        let errs = verify_model(
            &reg,
            &one_pattern(),
            &catalog_for("ping"),
            &MappingDict::default(),
        );
        assert!(errs.is_empty(), "{:?}", errs);
    }

    #[test]
    fn uncataloged_edge_type_flagged() {
        let reg = FuncClassRegistry::with_builtins();
        let errs = verify_model(
            &reg,
            &one_pattern(),
            &catalog_for("pong"),
            &MappingDict::default(),
        );
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("'ping'"));
    }

    #[test]
    fn dangling_references_flagged() {
        let reg = FuncClassRegistry::with_builtins();
        let mut init = catalog_for("ping");
        init.init
            .get_mut("p")
            .unwrap()
            .cfgs
            .insert("ghost".into(), "{}".into());
        let mut mapping = MappingDict::default();
        mapping
            .map
            .insert("q".into(), Default::default());
        let errs = verify_model(&reg, &one_pattern(), &init, &mapping);
        assert_eq!(errs.len(), 2);
    }
}
