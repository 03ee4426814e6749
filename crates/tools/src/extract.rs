//! Structured-data extraction from page material.
//!
//! Scans raw page text for syntactically balanced brace-delimited
//! substrings and parses each as JSON. Malformed candidates are skipped
//! silently.

use serde_json::Value;

use crate::browser::page::PageSources;

/// Every parseable JSON object found in `text`, in scan order. A balanced
/// candidate that parses consumes its span, so nested objects are not
/// re-reported; one that fails to parse is stepped past so inner objects
/// still get a chance.
pub fn extract_json_objects(text: &str) -> Vec<Value> {
    let chars: Vec<char> = text.chars().collect();
    let mut found = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            if let Some(end) = find_balanced_end(&chars, i) {
                let candidate: String = chars[i..=end].iter().collect();
                if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
                    found.push(value);
                    i = end + 1;
                    continue;
                }
            }
        }
        i += 1;
    }
    found
}

/// Index of the brace closing the one at `start`, tracking string literals
/// and escapes so braces inside strings don't count.
fn find_balanced_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, &c) in chars.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Scan all extraction sources of a page: body text, inline scripts, meta
/// content attributes, and JSON-LD blocks.
pub fn scan_page_sources(sources: &PageSources) -> Vec<Value> {
    let mut found = extract_json_objects(&sources.body_text);
    for script in &sources.scripts {
        found.extend(extract_json_objects(script));
    }
    for meta in &sources.metas {
        found.extend(extract_json_objects(meta));
    }
    for block in &sources.json_ld {
        found.extend(extract_json_objects(block));
    }
    found
}
