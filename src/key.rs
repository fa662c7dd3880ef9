//! Operation key derivation.
//!
//! Key = djb2(normalized query || stable JSON of variables || extra components)
//!
//! The hash walks UTF-16 code units with 32-bit wrapping arithmetic. It only partitions
//! the cache and the dedup table; collisions are possible and accepted.

use crate::document::QuerySource;
use crate::types::Variables;
use serde_json::Value;

/// 32-bit operation fingerprint
pub type OperationKey = u32;

const HASH_SEED: u32 = 5381;

/// djb2 over UTF-16 code units
pub fn hash(input: &str) -> u32 {
    input.encode_utf16().fold(HASH_SEED, |h, unit| {
        h.wrapping_shl(5).wrapping_add(h).wrapping_add(u32::from(unit))
    })
}

/// Serialize JSON with object keys sorted at every depth
pub fn stable_stringify(value: &Value) -> String {
    let mut out = String::new();
    write_stable(value, &mut out);
    out
}

fn write_stable(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_stable(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_stable(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Derive the key for a query, its variables and any extra discriminators.
///
/// Absent variables contribute nothing; an empty map contributes `{}`.
pub fn query_key(
    query: &QuerySource,
    variables: Option<&Variables>,
    components: &[&str],
) -> OperationKey {
    let query = query.normalize().unwrap_or_default();
    let variables = variables
        .map(|vars| stable_stringify(&Value::Object(vars.clone())))
        .unwrap_or_default();

    hash(&format!("{}{}{}", query, variables, components.concat()))
}
