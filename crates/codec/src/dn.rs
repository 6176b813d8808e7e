//! Distinguished-name normalization and country extraction.
//!
//! The normalizer is format-agnostic (comma, slash and escaped-comma forms)
//! but not schema-aware: no OID matching rules, no per-attribute syntaxes.
//! It keeps the recognized attributes {C, O, OU, CN, serialNumber}, lowercases
//! values, drops all whitespace (interior whitespace included, to survive
//! inconsistent spacing across contributors), sorts by attribute name and
//! joins with `|`. It is the sole DN equality primitive in the subsystem.

/// Attributes that participate in the canonical form.
const RECOGNIZED: [&str; 5] = ["c", "cn", "o", "ou", "serialnumber"];

/// Split a DN into `(attribute, value)` pairs in source order. Attribute
/// names are lowercased; values keep their original case and spacing.
/// Accepts `CN=X, O=Y` and `/CN=X/O=Y` forms; `\,` escapes survive splitting.
pub fn parse_rdns(dn: &str) -> Vec<(String, String)> {
    let trimmed = dn.trim();
    let use_slash = !trimmed.contains(',') && trimmed.contains('/');
    let sep = if use_slash { '/' } else { ',' };

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in trimmed.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .filter_map(|p| {
            let p = p.trim();
            let eq = p.find('=')?;
            let attr = p[..eq].trim().to_ascii_lowercase();
            let value = p[eq + 1..].trim().to_string();
            if attr.is_empty() {
                None
            } else {
                Some((attr, value))
            }
        })
        .collect()
}

/// Canonical form of `dn`, suitable only for equality comparison.
pub fn normalize(dn: &str) -> String {
    let mut components: Vec<String> = parse_rdns(dn)
        .into_iter()
        .filter(|(attr, _)| RECOGNIZED.contains(&attr.as_str()))
        .map(|(attr, value)| {
            // Whitespace and separator characters are dropped from values so
            // the canonical form survives a second pass unchanged.
            let folded: String = value
                .chars()
                .filter(|c| !c.is_whitespace() && !matches!(c, ',' | '|' | '/'))
                .collect::<String>()
                .to_lowercase();
            format!("{attr}={folded}")
        })
        .collect();
    components.sort();
    components.join("|")
}

/// Whether two DNs are equal under normalization.
pub fn equivalent(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// First recognized country RDN, uppercased. ISO 3166 alpha-2/3 only.
pub fn extract_country(dn: &str) -> Option<String> {
    parse_rdns(dn)
        .into_iter()
        .find(|(attr, value)| {
            attr == "c"
                && (2..=3).contains(&value.len())
                && value.chars().all(|c| c.is_ascii_alphabetic())
        })
        .map(|(_, value)| value.to_ascii_uppercase())
}

/// First CN value in source order, used for human-readable chain paths.
pub fn first_cn(dn: &str) -> Option<String> {
    parse_rdns(dn).into_iter().find(|(attr, _)| attr == "cn").map(|(_, v)| v)
}

/// A cheap pre-filter key for repository DN lookups: the longest recognized
/// component value of the normalized form. The repository widens candidate
/// sets with a substring match on this key; normalized equality is the
/// authoritative post-filter.
pub fn prefilter_key(dn: &str) -> Option<String> {
    normalize(dn)
        .split('|')
        .filter_map(|comp| comp.split_once('=').map(|(_, v)| v.to_string()))
        .filter(|v| !v.is_empty())
        .max_by_key(String::len)
}
