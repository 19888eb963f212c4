//! Canonical module rendering
//!
//! Known keys come out in a fixed order, then unknown keys in the order they
//! were read. Absent optional keys and empty lists are omitted. Output is
//! two-space indented JSON with a trailing newline, so rendering a parsed
//! rendering reproduces it byte for byte.

use reqsync_model::module::ModuleMetadata;
use reqsync_model::{Module, ModuleKind, Requirement, Validation};
use serde_json::{Map, Value};

/// Render a module as canonical JSON text
///
/// # Errors
/// Only if a carried value cannot be encoded, which `serde_json::Value`
/// never produces.
pub fn render_module(module: &Module) -> serde_json::Result<String> {
    let mut text = serde_json::to_string_pretty(&module_value(module))?;
    text.push('\n');
    Ok(text)
}

/// Canonical JSON value of a module
#[must_use]
pub fn module_value(module: &Module) -> Value {
    let mut out = Map::new();
    if let Some(meta) = &module.metadata {
        out.insert("_metadata".into(), metadata_value(meta));
    }
    if !module.imports.is_empty() {
        out.insert(
            "imports".into(),
            Value::Array(module.imports.iter().cloned().map(Value::String).collect()),
        );
    }
    if !module.requirements.is_empty() || module.kind == ModuleKind::Module {
        out.insert(
            "requirements".into(),
            Value::Array(module.requirements.iter().map(requirement_value).collect()),
        );
    }
    spill(&mut out, &module.extra);
    Value::Object(out)
}

fn metadata_value(meta: &ModuleMetadata) -> Value {
    let mut out = Map::new();
    put_str(&mut out, "module", meta.module.as_deref());
    put_str(&mut out, "owner", meta.owner.as_deref());
    put_str(&mut out, "last_validated_at", meta.last_validated_at.as_deref());
    spill(&mut out, &meta.extra);
    Value::Object(out)
}

fn requirement_value(req: &Requirement) -> Value {
    let mut out = Map::new();
    out.insert("id".into(), Value::String(req.id.clone()));
    put_str(&mut out, "title", req.title.as_deref());
    put_str(&mut out, "description", req.description.as_deref());
    put_str(&mut out, "criticality", req.criticality.as_ref().map(|c| c.as_str()));
    put_str(&mut out, "status", req.declared_status.as_ref().map(|s| s.as_str()));
    put_str(&mut out, "operational_target_id", req.operational_target_id.as_deref());
    if !req.children.is_empty() {
        out.insert(
            "children".into(),
            Value::Array(req.children.iter().cloned().map(Value::String).collect()),
        );
    }
    if !req.validations.is_empty() {
        out.insert(
            "validation".into(),
            Value::Array(req.validations.iter().map(validation_value).collect()),
        );
    }
    put_value(&mut out, "notes", req.notes.as_ref());
    put_value(&mut out, "metadata", req.metadata.as_ref());
    spill(&mut out, &req.extra);
    Value::Object(out)
}

fn validation_value(v: &Validation) -> Value {
    let mut out = Map::new();
    match v.extra.get("type") {
        Some(raw) if v.kind.as_str().is_empty() => {
            out.insert("type".into(), raw.clone());
        }
        _ => put_str(&mut out, "type", Some(v.kind.as_str()).filter(|k| !k.is_empty())),
    }
    put_str(&mut out, "ref", v.reference.as_deref());
    put_str(&mut out, "workflow_id", v.workflow_id.as_deref());
    put_str(&mut out, "phase", v.phase.as_deref());
    put_str(&mut out, "status", v.declared_status.as_ref().map(|s| s.as_str()));
    put_value(&mut out, "metadata", v.metadata.as_ref());
    spill(&mut out, &v.extra);
    Value::Object(out)
}

fn put_str(out: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn put_value(out: &mut Map<String, Value>, key: &str, value: Option<&Value>) {
    if let Some(value) = value {
        out.insert(key.to_string(), value.clone());
    }
}

fn spill(out: &mut Map<String, Value>, extra: &indexmap::IndexMap<String, Value>) {
    for (key, value) in extra {
        if !out.contains_key(key) {
            out.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn round(text: &str) -> String {
        let parsed = parse_module(Path::new("/s/requirements/m/module.json"), text.as_bytes())
            .unwrap();
        render_module(&parsed.module).unwrap()
    }

    #[test]
    fn known_keys_are_reordered_and_unknown_keys_kept() {
        let input = r#"{
          "requirements": [
            {"zeta": 1, "status": "pending", "id": "R", "alpha": 2, "title": "T",
             "validation": [{"ref": "a.test.ts", "custom": true, "type": "test"}]}
          ],
          "_metadata": {"owner": "qa", "module": "m"},
          "extra_top": "x"
        }"#;
        let expected = r#"{
  "_metadata": {
    "module": "m",
    "owner": "qa"
  },
  "requirements": [
    {
      "id": "R",
      "title": "T",
      "status": "pending",
      "validation": [
        {
          "type": "test",
          "ref": "a.test.ts",
          "custom": true
        }
      ],
      "zeta": 1,
      "alpha": 2
    }
  ],
  "extra_top": "x"
}
"#;
        assert_eq!(round(input), expected);
    }

    #[test]
    fn rendering_is_a_fixed_point() {
        let input = r#"{"requirements": [{"id": "R", "criticality": "p1", "children": [],
            "notes": ["n"], "validation": [{"type": "Automation", "phase": "e2e"}]}]}"#;
        let once = round(input);
        assert_eq!(round(&once), once);
    }

    #[test]
    fn authored_validation_text_survives_rewrite() {
        let input = r#"{"requirements": [{"id": "R", "validation": [
            {"type": "", "ref": "", "workflow_id": "", "phase": "e2e", "status": "planned"}
        ]}]}"#;
        let expected = r#"{
  "requirements": [
    {
      "id": "R",
      "validation": [
        {
          "type": "",
          "ref": "",
          "workflow_id": "",
          "phase": "e2e",
          "status": "planned"
        }
      ]
    }
  ]
}
"#;
        assert_eq!(round(input), expected);
    }

    #[test]
    fn module_keeps_empty_requirements_but_index_does_not() {
        assert_eq!(round("{}"), "{\n  \"requirements\": []\n}\n");

        let parsed =
            parse_module(Path::new("/s/requirements/index.json"), br#"{"imports": ["a"]}"#)
                .unwrap();
        assert_eq!(
            render_module(&parsed.module).unwrap(),
            "{\n  \"imports\": [\n    \"a\"\n  ]\n}\n"
        );
    }

    fn requirement_json() -> impl proptest::strategy::Strategy<Value = Value> {
        use proptest::prelude::*;
        (
            "[A-Z]{1,3}-[0-9]{1,3}",
            proptest::option::of("[a-zA-Z ]{0,12}"),
            proptest::option::of(prop_oneof!["P0", "p1", "P2", "weird"]),
            proptest::option::of(prop_oneof!["pending", "Complete", "in-progress", ""]),
            proptest::collection::vec(("[a-z]{1,6}", any::<i32>()), 0..3),
        )
            .prop_map(|(id, title, criticality, status, extra)| {
                let mut r = Map::new();
                for (k, v) in extra {
                    r.insert(format!("x_{k}"), Value::from(v));
                }
                r.insert("id".into(), Value::from(id));
                if let Some(t) = title {
                    r.insert("title".into(), Value::from(t));
                }
                if let Some(c) = criticality {
                    r.insert("criticality".into(), Value::from(c));
                }
                if let Some(st) = status {
                    r.insert("status".into(), Value::from(st));
                }
                Value::Object(r)
            })
    }

    proptest::proptest! {
        #[test]
        fn canonical_form_is_stable(requirements in proptest::collection::vec(requirement_json(), 0..5)) {
            let input = serde_json::json!({"requirements": requirements}).to_string();
            let once = round(&input);
            proptest::prop_assert_eq!(round(&once), once);
        }
    }
}
