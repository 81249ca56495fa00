//! `.out` file formatting

use crate::table::{DeleteOutcome, Entry};

/// Written before a WAIT with a non-zero delay
pub const WAITING: &str = "Waiting...\n";

/// `[(k,v)(k2,KVSERROR)]\n`
pub fn format_read(results: &[(String, Option<String>)]) -> String {
    let mut out = String::from("[");
    for (key, value) in results {
        match value {
            Some(value) => out.push_str(&format!("({},{})", key, value)),
            None => out.push_str(&format!("({},KVSERROR)", key)),
        }
    }
    out.push_str("]\n");
    out
}

/// `[(k,KVSMISSING)...]\n`, or `None` when every key was deleted
pub fn format_delete(results: &[(String, DeleteOutcome)]) -> Option<String> {
    let missing: String = results
        .iter()
        .filter(|(_, outcome)| *outcome == DeleteOutcome::Missing)
        .map(|(key, _)| format!("({},KVSMISSING)", key))
        .collect();

    if missing.is_empty() {
        None
    } else {
        Some(format!("[{}]\n", missing))
    }
}

/// One SHOW/backup line: `(k, v)\n`
pub fn format_entry(key: &str, value: &str) -> String {
    format!("({}, {})\n", key, value)
}

pub fn format_show(entries: &[Entry]) -> String {
    entries
        .iter()
        .map(|e| format_entry(&e.key, &e.value))
        .collect()
}
