//! Names declared by the host code around embedded templates.
//!
//! Templates in embedded files see the host module's bindings, so a path head
//! naming an import or a module-level `const` is a local, not a registry
//! lookup. Collection is pattern-based: it recognises declaration shapes and
//! does not try to resolve scopes.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::regions::TemplateRegion;

struct HostPatterns {
    default_import: Regex,
    named_imports: Regex,
    namespace_import: Regex,
    variable: Regex,
    object_pattern: Regex,
    array_pattern: Regex,
    function: Regex,
    class: Regex,
    identifier: Regex,
}

impl HostPatterns {
    fn new() -> Self {
        Self {
            default_import: Regex::new(r"\bimport\s+(?:type\s+)?([A-Za-z_$][\w$]*)\s*(?:,|\bfrom\b)")
                .expect("valid default import regex"),
            named_imports: Regex::new(r"\bimport\s+(?:type\s+)?(?:[A-Za-z_$][\w$]*\s*,\s*)?\{([^}]*)\}")
                .expect("valid named import regex"),
            namespace_import: Regex::new(r"\bimport\s+(?:[A-Za-z_$][\w$]*\s*,\s*)?\*\s*as\s+([A-Za-z_$][\w$]*)")
                .expect("valid namespace import regex"),
            variable: Regex::new(r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)")
                .expect("valid variable regex"),
            object_pattern: Regex::new(r"\b(?:const|let|var)\s*\{([^}]*)\}")
                .expect("valid object pattern regex"),
            array_pattern: Regex::new(r"\b(?:const|let|var)\s*\[([^\]]*)\]")
                .expect("valid array pattern regex"),
            function: Regex::new(r"\bfunction\s*\*?\s*([A-Za-z_$][\w$]*)")
                .expect("valid function regex"),
            class: Regex::new(r"\bclass\s+([A-Za-z_$][\w$]*)").expect("valid class regex"),
            identifier: Regex::new(r"^[A-Za-z_$][\w$]*$").expect("valid identifier regex"),
        }
    }
}

fn patterns() -> &'static HostPatterns {
    static PATTERNS: OnceLock<HostPatterns> = OnceLock::new();
    PATTERNS.get_or_init(HostPatterns::new)
}

/// Names declared anywhere in `host`, ignoring the text of `regions`.
#[must_use]
pub fn collect_host_bindings(host: &str, regions: &[TemplateRegion]) -> BTreeSet<String> {
    let text = blank_regions(host, regions);
    let p = patterns();
    let mut names = BTreeSet::new();

    for re in [
        &p.default_import,
        &p.namespace_import,
        &p.variable,
        &p.function,
        &p.class,
    ] {
        names.extend(re.captures_iter(&text).map(|c| c[1].to_string()));
    }

    for caps in p.named_imports.captures_iter(&text) {
        for spec in caps[1].split(',') {
            // `a as b` binds `b`; `type T` binds `T`.
            let local = spec.rsplit(" as ").next().unwrap_or(spec).trim();
            let local = local.strip_prefix("type ").unwrap_or(local).trim();
            if p.identifier.is_match(local) {
                names.insert(local.to_string());
            }
        }
    }

    for caps in p.object_pattern.captures_iter(&text) {
        for field in caps[1].split(',') {
            // `a: b = 1` binds `b`; `...rest` binds `rest`.
            let field = field.split('=').next().unwrap_or(field);
            let local = field.rsplit(':').next().unwrap_or(field).trim();
            let local = local.trim_start_matches("...");
            if p.identifier.is_match(local) {
                names.insert(local.to_string());
            }
        }
    }

    for caps in p.array_pattern.captures_iter(&text) {
        for element in caps[1].split(',') {
            let element = element.split('=').next().unwrap_or(element).trim();
            let local = element.trim_start_matches("...");
            if p.identifier.is_match(local) {
                names.insert(local.to_string());
            }
        }
    }

    names
}

/// Replace template text with spaces so DSL content cannot look like
/// declarations. Byte offsets are preserved.
fn blank_regions(host: &str, regions: &[TemplateRegion]) -> String {
    let mut out = String::with_capacity(host.len());
    let mut cursor = 0;
    for region in regions {
        let (start, end) = (region.outer.start, region.outer.end);
        if start < cursor || end > host.len() {
            continue;
        }
        out.push_str(&host[cursor..start]);
        out.extend(host[start..end].chars().map(|c| if c == '\n' { '\n' } else { ' ' }));
        cursor = end;
    }
    out.push_str(&host[cursor..]);
    out
}
