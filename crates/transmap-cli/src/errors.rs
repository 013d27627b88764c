//! Better error messages with actionable suggestions.

use rhi_transmap_core::{ConverterRegistry, Schema, Ty};
use std::path::Path;

/// Build an error message for a type the schema does not define.
pub fn unknown_type_error(ty: &Ty, schema: &Schema) -> String {
    let mut msg = format!("Type '{}' is not defined in the schema", ty);

    let names: Vec<&str> = schema.types().map(|desc| desc.name.as_str()).collect();
    let missing = undefined_name(ty, schema).unwrap_or_default();
    if let Some(suggestion) = find_similar(missing, &names) {
        msg.push_str(&format!(".\n\nDid you mean '{}'?", suggestion));
    } else if names.is_empty() {
        msg.push_str(". The schema defines no types.");
    } else {
        msg.push_str(".\n\nUse 'transmap types' to list the schema's types.");
    }

    msg
}

/// The first named type inside `ty` that the schema does not define.
pub fn undefined_name<'a>(ty: &'a Ty, schema: &Schema) -> Option<&'a str> {
    match ty {
        Ty::Named(name) if !schema.contains(name.as_str()) => Some(name.as_str()),
        Ty::Optional(inner) | Ty::Array(inner) | Ty::List(inner) => undefined_name(inner, schema),
        _ => None,
    }
}

/// Build an error message for an unknown converter id.
pub fn unknown_converter_error(id: &str, registry: &ConverterRegistry) -> String {
    let mut msg = format!("Unknown converter '{}'", id);
    let ids: Vec<&str> = registry.declarations().map(|decl| decl.id.as_str()).collect();
    if let Some(suggestion) = find_similar(id, &ids) {
        msg.push_str(&format!(".\n\nDid you mean '{}'?", suggestion));
    } else {
        msg.push_str(".\n\nUse 'transmap converters' to list them.");
    }
    msg
}

/// Build an error message for file read errors.
pub fn file_read_error(path: &Path, err: &std::io::Error) -> String {
    use std::io::ErrorKind;

    let mut msg = format!("Failed to read '{}'", path.display());

    match err.kind() {
        ErrorKind::NotFound => {
            msg.push_str(": file not found");

            if let Some(suggestions) = find_similar_files(path) {
                if !suggestions.is_empty() {
                    msg.push_str(&format!(".\n\nDid you mean: {}?", suggestions.join(", ")));
                }
            }
        }
        ErrorKind::PermissionDenied => {
            msg.push_str(": permission denied. Check file permissions.");
        }
        _ => {
            msg.push_str(&format!(": {}", err));
        }
    }

    msg
}

/// Find the closest candidate (for typo suggestions).
fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let lower = input.to_lowercase();
    candidates
        .iter()
        .copied()
        .filter(|c| *c != input)
        .map(|c| (levenshtein(&lower, &c.to_lowercase()), c))
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, c)| c)
}

/// Simple Levenshtein distance for short strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Find similar files in the same directory (for "did you mean" suggestions).
fn find_similar_files(path: &Path) -> Option<Vec<String>> {
    let filename = path.file_name()?.to_str()?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let entries = std::fs::read_dir(parent).ok()?;
    let mut suggestions = Vec::new();

    for entry in entries.flatten() {
        if let Some(name) = entry.file_name().to_str() {
            if levenshtein(filename, name) <= 2 && name != filename {
                suggestions.push(name.to_string());
            }
        }
    }

    suggestions.sort();
    suggestions.truncate(3);
    Some(suggestions)
}
