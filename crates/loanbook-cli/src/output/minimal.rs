use serde_json::Value;

use super::{cell, flatten};

/// Headline figure of each command, most specific first.
const PRIORITY_KEYS: [&str; 8] = [
    "terms.total_due",
    "penalty_amount",
    "allocation.overpayment",
    "remaining.total",
    "ledger_consistent",
    "vault_total",
    "outstanding",
    "status",
];

/// Print just the key answer value from the output.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let Value::Object(map) = result else {
        println!("{}", cell(result));
        return;
    };

    let flat = flatten(map);
    for key in PRIORITY_KEYS {
        if let Some((_, val)) = flat.iter().find(|(k, v)| k == key && !v.is_null()) {
            println!("{}", cell(val));
            return;
        }
    }
    if let Some((key, val)) = flat.first() {
        println!("{}: {}", key, cell(val));
    }
}
