//! Renders the difference between two JSON documents as a JSON patch.
//!
//! Mutations performed by the broker only ever add to a manifest, so the diff is restricted to
//! `add` operations: new object members become a single `add` of the whole member and grown
//! arrays become one `add` per appended element. A mutated document that removes or replaces
//! anything is rejected rather than rendered.

use json_patch::{jsonptr::PointerBuf, AddOperation, Patch, PatchOperation};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NonAdditive {
    #[error("mutation removes {0:?}")]
    Removed(String),

    #[error("mutation replaces {0:?}")]
    Replaced(String),
}

/// Computes the `add` operations that transform `original` into `mutated`.
///
/// Operations are ordered so that applying them in sequence is valid: array elements are
/// appended at ascending indices. Equal documents produce an empty patch.
pub fn diff(original: &Value, mutated: &Value) -> Result<Patch, NonAdditive> {
    let mut ops = Vec::new();
    diff_into(&mut PointerBuf::root(), original, mutated, &mut ops)?;
    Ok(Patch(ops))
}

fn diff_into(
    path: &mut PointerBuf,
    original: &Value,
    mutated: &Value,
    ops: &mut Vec<PatchOperation>,
) -> Result<(), NonAdditive> {
    match (original, mutated) {
        (Value::Object(prior), Value::Object(next)) => {
            if let Some(key) = prior.keys().find(|k| !next.contains_key(*k)) {
                path.push_back(key);
                return Err(NonAdditive::Removed(path.to_string()));
            }

            for (key, value) in next {
                path.push_back(key);
                match prior.get(key) {
                    Some(prior) => diff_into(path, prior, value, ops)?,
                    None => ops.push(add(path, value)),
                }
                path.pop_back();
            }
        }

        (Value::Array(prior), Value::Array(next)) => {
            if next.len() < prior.len() {
                path.push_back(next.len());
                return Err(NonAdditive::Removed(path.to_string()));
            }

            for (idx, value) in next.iter().enumerate() {
                path.push_back(idx);
                match prior.get(idx) {
                    Some(prior) => diff_into(path, prior, value, ops)?,
                    None => ops.push(add(path, value)),
                }
                path.pop_back();
            }
        }

        (prior, next) if prior == next => {}

        _ => return Err(NonAdditive::Replaced(path.to_string())),
    }

    Ok(())
}

fn add(path: &PointerBuf, value: &Value) -> PatchOperation {
    PatchOperation::Add(AddOperation {
        path: path.clone(),
        value: value.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ops(patch: &Patch) -> Vec<(String, Value)> {
        patch
            .0
            .iter()
            .map(|op| match op {
                PatchOperation::Add(AddOperation { path, value }) => (path.to_string(), value.clone()),
                op => panic!("unexpected operation: {op:?}"),
            })
            .collect()
    }

    #[test]
    fn equal_documents_produce_empty_patch() {
        let doc = json!({"spec": {"containers": [{"name": "app"}]}});
        let patch = diff(&doc, &doc).unwrap();
        assert!(patch.0.is_empty());
        assert_eq!(serde_json::to_string(&patch).unwrap(), "[]");
    }

    #[test]
    fn new_member_is_added_whole() {
        let original = json!({"spec": {"containers": [{"name": "app"}]}});
        let mutated = json!({"spec": {"containers": [{"name": "app", "env": [{"name": "A"}]}]}});
        assert_eq!(
            ops(&diff(&original, &mutated).unwrap()),
            vec![(
                "/spec/containers/0/env".to_string(),
                json!([{"name": "A"}])
            )]
        );
    }

    #[test]
    fn grown_arrays_are_appended_in_order() {
        let original = json!({"env": [{"name": "A"}]});
        let mutated = json!({"env": [{"name": "A"}, {"name": "B"}, {"name": "C"}]});
        assert_eq!(
            ops(&diff(&original, &mutated).unwrap()),
            vec![
                ("/env/1".to_string(), json!({"name": "B"})),
                ("/env/2".to_string(), json!({"name": "C"})),
            ]
        );
    }

    #[test]
    fn pointer_segments_are_escaped() {
        let original = json!({"metadata": {"annotations": {}}});
        let mutated = json!({"metadata": {"annotations": {"eks.amazonaws.com/role-arn": "r", "a~b": "c"}}});
        let paths = ops(&diff(&original, &mutated).unwrap())
            .into_iter()
            .map(|(path, _)| path)
            .collect::<Vec<_>>();
        assert!(paths.contains(&"/metadata/annotations/eks.amazonaws.com~1role-arn".to_string()));
        assert!(paths.contains(&"/metadata/annotations/a~0b".to_string()));
    }

    #[test]
    fn removals_are_rejected() {
        let original = json!({"spec": {"a": 1, "b": 2}});
        let mutated = json!({"spec": {"a": 1}});
        assert_eq!(
            diff(&original, &mutated).unwrap_err(),
            NonAdditive::Removed("/spec/b".to_string())
        );

        let original = json!({"list": [1, 2]});
        let mutated = json!({"list": [1]});
        assert_eq!(
            diff(&original, &mutated).unwrap_err(),
            NonAdditive::Removed("/list/1".to_string())
        );
    }

    #[test]
    fn replacements_are_rejected() {
        let original = json!({"spec": {"image": "a", "ports": [80]}});
        let mutated = json!({"spec": {"image": "b", "ports": [80]}});
        assert_eq!(
            diff(&original, &mutated).unwrap_err(),
            NonAdditive::Replaced("/spec/image".to_string())
        );

        let original = json!({"spec": {"env": null}});
        let mutated = json!({"spec": {"env": []}});
        assert_eq!(
            diff(&original, &mutated).unwrap_err(),
            NonAdditive::Replaced("/spec/env".to_string())
        );
    }

    #[test]
    fn applying_the_patch_reproduces_the_mutation() {
        let original = json!({
            "kind": "Pod",
            "spec": {
                "containers": [
                    {"name": "a", "env": [{"name": "X", "value": "1"}]},
                    {"name": "b"},
                ],
            },
        });
        let mutated = json!({
            "kind": "Pod",
            "spec": {
                "containers": [
                    {"name": "a", "env": [{"name": "X", "value": "1"}, {"name": "Y", "value": "2"}]},
                    {"name": "b", "env": [{"name": "Y", "value": "2"}]},
                    {"name": "c"},
                ],
            },
        });

        let patch = diff(&original, &mutated).unwrap();
        let mut doc = original.clone();
        json_patch::patch(&mut doc, &patch).unwrap();
        assert_eq!(doc, mutated);
    }
}
