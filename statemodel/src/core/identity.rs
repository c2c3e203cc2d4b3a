//! Deterministic identity hashing for states, actions and composite keys.
//!
//! Every value is serialized with a one-byte type tag and, where variable in
//! size, a length prefix before it reaches SHA-256. Two differently shaped
//! tuples therefore never share a preimage, which plain string concatenation
//! cannot guarantee.

use sha2::{Digest, Sha256};

use crate::core::error::{ModelError, Result};
use crate::core::types::{TagValue, TagValues};

const TAG_DOMAIN: &[u8] = b"statemodel/tags/v1";
const COMPOSITE_DOMAIN: &[u8] = b"statemodel/composite/v1";

/// Bytes of the digest kept in an identifier (32 hex chars).
const ID_BYTES: usize = 16;

/// Hash identity-defining tag values into a stable identifier.
///
/// Pure and stable across processes. An empty tag map means no abstraction
/// tags were configured, which is a configuration error rather than an empty id.
pub fn compute_id(values: &TagValues) -> Result<String> {
    if values.is_empty() {
        return Err(ModelError::configuration(
            "no identity-defining tag values to hash",
        ));
    }

    let mut hasher = Sha256::new();
    hasher.update(TAG_DOMAIN);
    hasher.update((values.len() as u64).to_le_bytes());
    for (name, value) in values {
        write_framed(&mut hasher, name.as_bytes());
        write_framed(&mut hasher, &encode_value(value));
    }
    Ok(finish(hasher))
}

/// Hash already-computed sub-identities into one composite identifier.
///
/// Used for scoped action ids, navigable ids and store-level edge keys.
pub fn composite_id<S: AsRef<str>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(COMPOSITE_DOMAIN);
    hasher.update((parts.len() as u64).to_le_bytes());
    for part in parts {
        write_framed(&mut hasher, part.as_ref().as_bytes());
    }
    finish(hasher)
}

/// Identifier of a state model: one per application, version and abstraction level.
///
/// Tag lists are sorted first so configuration order is irrelevant.
pub fn model_identifier(
    application_name: &str,
    application_version: &str,
    state_tags: &[String],
    action_tags: &[String],
) -> String {
    let mut state_tags = state_tags.to_vec();
    state_tags.sort();
    state_tags.dedup();
    let mut action_tags = action_tags.to_vec();
    action_tags.sort();
    action_tags.dedup();

    let mut parts = vec![
        "model".to_string(),
        application_name.to_string(),
        application_version.to_string(),
        state_tags.len().to_string(),
    ];
    parts.extend(state_tags);
    parts.push(action_tags.len().to_string());
    parts.extend(action_tags);
    composite_id(&parts)
}

fn write_framed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn finish(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    hex::encode(&digest[..ID_BYTES])
}

fn encode_value(value: &TagValue) -> Vec<u8> {
    let mut out = Vec::new();
    match value {
        TagValue::Text(text) => {
            out.push(b's');
            frame_into(&mut out, text.as_bytes());
        }
        TagValue::Integer(number) => {
            out.push(b'i');
            out.extend_from_slice(&number.to_le_bytes());
        }
        TagValue::Float(number) => {
            out.push(b'f');
            out.extend_from_slice(&canonical_f64(*number).to_le_bytes());
        }
        TagValue::Boolean(flag) => {
            out.push(b'b');
            out.push(u8::from(*flag));
        }
        TagValue::Coord(coord) => {
            out.push(b'c');
            for bits in coord.canonical_bits() {
                out.extend_from_slice(&bits.to_le_bytes());
            }
        }
        TagValue::Set(items) => {
            out.push(b'S');
            let mut encoded: Vec<Vec<u8>> = items.iter().map(encode_value).collect();
            encoded.sort();
            encoded.dedup();
            out.extend_from_slice(&(encoded.len() as u64).to_le_bytes());
            for item in &encoded {
                frame_into(&mut out, item);
            }
        }
        TagValue::List(items) => {
            out.push(b'L');
            out.extend_from_slice(&(items.len() as u64).to_le_bytes());
            for item in items {
                frame_into(&mut out, &encode_value(item));
            }
        }
    }
    out
}

fn frame_into(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}

fn canonical_f64(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Coord3D;
    use std::collections::HashSet;

    fn tags(pairs: &[(&str, TagValue)]) -> TagValues {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn compute_id_is_independent_of_insertion_order() {
        let mut forward = TagValues::new();
        forward.insert("title".to_string(), TagValue::from("Lobby"));
        forward.insert("health".to_string(), TagValue::from(100_i64));
        let mut backward = TagValues::new();
        backward.insert("health".to_string(), TagValue::from(100_i64));
        backward.insert("title".to_string(), TagValue::from("Lobby"));

        assert_eq!(
            compute_id(&forward).expect("id"),
            compute_id(&backward).expect("id")
        );
    }

    #[test]
    fn compute_id_normalizes_set_element_order() {
        let a = tags(&[(
            "entities",
            TagValue::Set(vec![TagValue::from("door1"), TagValue::from("button1")]),
        )]);
        let b = tags(&[(
            "entities",
            TagValue::Set(vec![TagValue::from("button1"), TagValue::from("door1")]),
        )]);
        assert_eq!(compute_id(&a).expect("id"), compute_id(&b).expect("id"));
    }

    #[test]
    fn compute_id_keeps_list_order_significant() {
        let a = tags(&[(
            "path",
            TagValue::List(vec![TagValue::from("a"), TagValue::from("b")]),
        )]);
        let b = tags(&[(
            "path",
            TagValue::List(vec![TagValue::from("b"), TagValue::from("a")]),
        )]);
        assert_ne!(compute_id(&a).expect("id"), compute_id(&b).expect("id"));
    }

    #[test]
    fn compute_id_rejects_empty_tag_set() {
        let err = compute_id(&TagValues::new()).expect_err("empty tags");
        assert!(matches!(err, ModelError::Configuration(_)));
    }

    #[test]
    fn compute_id_distinguishes_value_types() {
        let text = tags(&[("v", TagValue::from("1"))]);
        let number = tags(&[("v", TagValue::from(1_i64))]);
        let flag = tags(&[("v", TagValue::from(true))]);
        let ids: HashSet<String> = [text, number, flag]
            .iter()
            .map(|values| compute_id(values).expect("id"))
            .collect();
        assert_eq!(ids.len(), 3);
    }

    /// Shapes that collide under naive concatenation ("ab"+"c" vs "a"+"bc").
    #[test]
    fn composite_id_is_unambiguous_across_shapes() {
        assert_ne!(composite_id(&["ab", "c"]), composite_id(&["a", "bc"]));
        assert_ne!(composite_id(&["a", ""]), composite_id(&["a"]));
    }

    /// No collisions across a grid of realistic observations.
    #[test]
    fn compute_id_has_no_collisions_on_position_grid() {
        let mut seen = HashSet::new();
        for x in -10..10 {
            for z in -10..10 {
                for active in [true, false] {
                    let values = tags(&[
                        (
                            "agentPosition",
                            TagValue::Coord(Coord3D::new(x as f32 * 0.5, 0.0, z as f32 * 0.5)),
                        ),
                        ("door1", TagValue::from(active)),
                    ]);
                    assert!(seen.insert(compute_id(&values).expect("id")));
                }
            }
        }
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn model_identifier_ignores_tag_order() {
        let a = model_identifier(
            "lab",
            "1.0",
            &["b".to_string(), "a".to_string()],
            &["kind".to_string()],
        );
        let b = model_identifier(
            "lab",
            "1.0",
            &["a".to_string(), "b".to_string()],
            &["kind".to_string()],
        );
        assert_eq!(a, b);
        assert_ne!(
            a,
            model_identifier("lab", "1.1", &["a".to_string()], &["kind".to_string()])
        );
    }

    #[test]
    fn ids_are_32_hex_chars() {
        let id = compute_id(&tags(&[("title", TagValue::from("x"))])).expect("id");
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
