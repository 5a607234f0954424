use serde_json::Value;

/// Headline figures, most specific first.
const PRIORITY_KEYS: [&str; 8] = [
    "total_friction",
    "effective_rate",
    "total_tax",
    "tax",
    "vat",
    "net_amount",
    "allowed",
    "net",
];

/// Print just the headline answer: the first priority key present in the
/// result, else its first field.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    match result_obj {
        Value::Object(map) => {
            let headline = PRIORITY_KEYS
                .iter()
                .find_map(|key| map.get(*key).filter(|v| !v.is_null()));
            match headline {
                Some(val) => println!("{}", format_minimal(val)),
                None => {
                    if let Some((key, val)) = map.iter().next() {
                        println!("{}: {}", key, format_minimal(val));
                    }
                }
            }
        }
        Value::Array(arr) => println!("{}", arr.len()),
        other => println!("{}", format_minimal(other)),
    }
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
