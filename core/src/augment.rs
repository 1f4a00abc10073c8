//! Diagnostic augmentation.
//!
//! A raw checker diagnostic is mapped back to the original document and, when
//! the construct that produced its synthetic span is recognised, rewritten
//! into template terms. Rules are an ordered table; the most specific match
//! wins and ties go to the earlier rule. A diagnostic no rule claims passes
//! through with only its location translated.

use std::sync::OnceLock;

use regex::Regex;
use trellis_transform::{
    BackingModule, ConstructKind, ConstructRecord, DirectForm, Invocation, InvocationForm,
};
use trellis_types::{Diagnostic, SourceId, Span};

use crate::checker::CheckerDiagnostic;

const CODE_WRONG_ARGUMENT_COUNT: u32 = 2554;
const CODE_TOO_FEW_ARGUMENTS_AT_LEAST: u32 = 2555;
const CODE_NOT_ASSIGNABLE: u32 = 2322;
const CODE_ARGUMENT_NOT_ASSIGNABLE: u32 = 2345;
const CODE_IMPLICIT_ANY_INDEX: u32 = 7053;
const CODE_NO_OVERLOAD: u32 = 2769;

const NAMED_ARGS_NOTE: &str = "Note that named args are passed together as a final argument, so \
     they collectively increase the given arg count by 1.";

const ATTR_VALUE_MESSAGE: &str = "Only primitive values (see `AttrValue` in the template DSL \
     declarations) are assignable as HTML attributes. If you want to set an event listener, \
     consider using the `{{on}}` modifier instead.";

const CONTENT_VALUE_MESSAGE: &str = "Only primitive values and certain DOM objects (see \
     `ContentValue` in the template DSL declarations) are usable as top-level template content.";

const NOT_INVOKABLE_MESSAGE: &str =
    "The given value does not appear to be usable as a component, modifier or helper.";

const TOO_WIDE_MESSAGE: &str = "The type of this expression doesn't appear to be a valid value to \
     pass the {{component}} helper. If possible, you may need to give the expression a narrower \
     type, for example `'component-a' | 'component-b'` rather than `string`.";

const DIRECT_INVOCATION_PREFIX: &str = "The {{component}} helper can't be used to directly \
     invoke a component under Trellis. Consider first binding the result to a variable, e.g. \
     '{{#let (component 'component-name') as |ComponentName|}}' and then invoking it as ";

/// One entry of the rule table.
struct Rule {
    id: &'static str,
    codes: &'static [u32],
    specificity: u8,
    applies: fn(&CheckerDiagnostic, &ConstructRecord) -> bool,
    rewrite: fn(&CheckerDiagnostic, &ConstructRecord, &BackingModule) -> Rewrite,
}

struct Rewrite {
    message: String,
    /// Original span to report at, replacing the mapped location.
    anchor: Option<Span>,
}

const RULES: &[Rule] = &[
    Rule {
        id: "named-args-arity",
        codes: &[CODE_WRONG_ARGUMENT_COUNT],
        specificity: 3,
        applies: named_args_arity_applies,
        rewrite: named_args_arity_rewrite,
    },
    Rule {
        id: "arity",
        codes: &[CODE_WRONG_ARGUMENT_COUNT, CODE_TOO_FEW_ARGUMENTS_AT_LEAST],
        specificity: 2,
        applies: arity_applies,
        rewrite: arity_rewrite,
    },
    Rule {
        id: "attribute-value",
        codes: &[CODE_NOT_ASSIGNABLE],
        specificity: 2,
        applies: attribute_value_applies,
        rewrite: attribute_value_rewrite,
    },
    Rule {
        id: "content-value",
        codes: &[CODE_ARGUMENT_NOT_ASSIGNABLE],
        specificity: 1,
        applies: content_value_applies,
        rewrite: content_value_rewrite,
    },
    Rule {
        id: "direct-component-invocation",
        codes: &[CODE_ARGUMENT_NOT_ASSIGNABLE],
        specificity: 3,
        applies: direct_invocation_applies,
        rewrite: direct_invocation_rewrite,
    },
    Rule {
        id: "unknown-global",
        codes: &[CODE_IMPLICIT_ANY_INDEX],
        specificity: 2,
        applies: unknown_global_applies,
        rewrite: unknown_global_rewrite,
    },
    Rule {
        id: "unknown-component-name",
        codes: &[CODE_NO_OVERLOAD],
        specificity: 3,
        applies: unknown_component_applies,
        rewrite: unknown_component_rewrite,
    },
    Rule {
        id: "component-name-too-wide",
        codes: &[CODE_NO_OVERLOAD],
        specificity: 3,
        applies: too_wide_applies,
        rewrite: too_wide_rewrite,
    },
    Rule {
        id: "not-invokable",
        codes: &[CODE_NO_OVERLOAD],
        specificity: 1,
        applies: not_invokable_applies,
        rewrite: not_invokable_rewrite,
    },
];

/// Translate one raw diagnostic into original terms.
///
/// Returns `None` when the diagnostic lands entirely in generated scaffolding.
/// The returned source says which of the module's originals it belongs to.
#[must_use]
pub fn augment(raw: &CheckerDiagnostic, module: &BackingModule) -> Option<(SourceId, Diagnostic)> {
    let Some((mapped_source, mapped)) = module.mapping().synthetic_to_original(raw.span) else {
        tracing::debug!(
            path = %module.virtual_path().display(),
            span = %raw.span,
            code = ?raw.code,
            "Dropping diagnostic with no original location"
        );
        return None;
    };

    let (source, span, message, rule) = match select_rule(raw, module) {
        Some((rule, record)) => {
            let rewrite = (rule.rewrite)(raw, record, module);
            match rewrite.anchor {
                // Construct records always describe template text.
                Some(anchor) => (SourceId::PRIMARY, anchor, rewrite.message, Some(rule.id)),
                None => (mapped_source, mapped, rewrite.message, Some(rule.id)),
            }
        }
        None => (mapped_source, mapped, raw.message.clone(), None),
    };

    let file = module.source(source)?;
    let mut diagnostic = Diagnostic::new(span, file.lines().range(span), raw.severity, message)
        .with_tags(raw.tags.clone());
    if let Some(code) = raw.code {
        diagnostic = diagnostic.with_code(code);
    }
    if let Some(rule) = rule {
        diagnostic = diagnostic.with_rule(rule);
    }
    Some((source, diagnostic))
}

/// The best rule and the record it claims the diagnostic through.
fn select_rule<'m>(
    raw: &CheckerDiagnostic,
    module: &'m BackingModule,
) -> Option<(&'static Rule, &'m ConstructRecord)> {
    let code = raw.code?;
    let mut best: Option<(&'static Rule, &'m ConstructRecord)> = None;
    for record in module.records_containing(raw.span) {
        for rule in RULES {
            if !rule.codes.contains(&code) || !(rule.applies)(raw, record) {
                continue;
            }
            if best.is_none_or(|(current, _)| rule.specificity > current.specificity) {
                best = Some((rule, record));
            }
        }
    }
    best
}

// ── Arity ───────────────────────────────────────────────────────────────

struct ArgumentCount {
    max: Option<usize>,
    got: usize,
}

impl ArgumentCount {
    fn parse(message: &str) -> Option<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"Expected (at least )?(\d+)(?:-(\d+))? arguments?, but got (\d+)")
                .expect("valid argument count regex")
        });
        let captures = pattern.captures(message)?;
        let min: usize = captures[2].parse().ok()?;
        let max = match (captures.get(1), captures.get(3)) {
            (Some(_), _) => None,
            (None, Some(max)) => Some(max.as_str().parse().ok()?),
            (None, None) => Some(min),
        };
        let got = captures[4].parse().ok()?;
        Some(Self { max, got })
    }

    fn too_many(&self) -> bool {
        self.max.is_some_and(|max| self.got > max)
    }
}

fn invocation(record: &ConstructRecord) -> Option<&Invocation> {
    match &record.kind {
        ConstructKind::Invocation(invocation) => Some(invocation),
        _ => None,
    }
}

/// Whether the invocation itself is at fault rather than something nested
/// inside one of its arguments.
fn claims_arity<'a>(
    raw: &CheckerDiagnostic,
    record: &'a ConstructRecord,
) -> Option<&'a Invocation> {
    let invocation = invocation(record)?;
    let nested = invocation
        .arguments
        .iter()
        .any(|argument| argument.contains(raw.span) && *argument != raw.span);
    (!nested).then_some(invocation)
}

fn arity_anchor(invocation: &Invocation, record: &ConstructRecord) -> Span {
    invocation.original_arguments.unwrap_or(record.original)
}

fn named_args_arity_applies(raw: &CheckerDiagnostic, record: &ConstructRecord) -> bool {
    claims_arity(raw, record).is_some_and(|invocation| {
        invocation.has_named_args
            && ArgumentCount::parse(&raw.message).is_some_and(|count| count.too_many())
    })
}

fn named_args_arity_rewrite(
    raw: &CheckerDiagnostic,
    record: &ConstructRecord,
    _module: &BackingModule,
) -> Rewrite {
    Rewrite {
        message: format!("{} {NAMED_ARGS_NOTE}", raw.message.trim_end()),
        anchor: invocation(record).map(|invocation| arity_anchor(invocation, record)),
    }
}

fn arity_applies(raw: &CheckerDiagnostic, record: &ConstructRecord) -> bool {
    claims_arity(raw, record).is_some() && ArgumentCount::parse(&raw.message).is_some()
}

fn arity_rewrite(
    raw: &CheckerDiagnostic,
    record: &ConstructRecord,
    _module: &BackingModule,
) -> Rewrite {
    Rewrite {
        message: raw.message.clone(),
        anchor: invocation(record).map(|invocation| arity_anchor(invocation, record)),
    }
}

fn not_invokable_applies(raw: &CheckerDiagnostic, record: &ConstructRecord) -> bool {
    invocation(record).is_some_and(|invocation| {
        invocation.form == InvocationForm::Resolved && invocation.callee_expr.contains(raw.span)
    })
}

fn not_invokable_rewrite(
    raw: &CheckerDiagnostic,
    record: &ConstructRecord,
    module: &BackingModule,
) -> Rewrite {
    Rewrite {
        message: prefixed(NOT_INVOKABLE_MESSAGE, &raw.message),
        anchor: invocation(record).and_then(|invocation| original_of(module, invocation.callee)),
    }
}

// ── Values ──────────────────────────────────────────────────────────────

fn attribute_value_applies(raw: &CheckerDiagnostic, record: &ConstructRecord) -> bool {
    matches!(record.kind, ConstructKind::AttributeValue { target, value }
        if raw.span == target || raw.span == value)
}

fn attribute_value_rewrite(
    raw: &CheckerDiagnostic,
    record: &ConstructRecord,
    module: &BackingModule,
) -> Rewrite {
    let anchor = match record.kind {
        ConstructKind::AttributeValue { value, .. } => original_of(module, value),
        _ => None,
    };
    Rewrite {
        message: prefixed(ATTR_VALUE_MESSAGE, &raw.message),
        anchor,
    }
}

fn content_value_applies(raw: &CheckerDiagnostic, record: &ConstructRecord) -> bool {
    matches!(record.kind, ConstructKind::ContentValue { value, direct_component: None }
        if raw.span == value)
}

fn content_value_rewrite(
    raw: &CheckerDiagnostic,
    record: &ConstructRecord,
    module: &BackingModule,
) -> Rewrite {
    let anchor = match record.kind {
        ConstructKind::ContentValue { value, .. } => original_of(module, value),
        _ => None,
    };
    Rewrite {
        message: prefixed(CONTENT_VALUE_MESSAGE, &raw.message),
        anchor,
    }
}

/// Only the rejected content value itself; errors inside the curried
/// arguments keep their own rule and location.
fn direct_invocation_applies(raw: &CheckerDiagnostic, record: &ConstructRecord) -> bool {
    matches!(
        record.kind,
        ConstructKind::ContentValue {
            value,
            direct_component: Some(_),
        } if raw.span == value
    )
}

fn direct_invocation_rewrite(
    raw: &CheckerDiagnostic,
    record: &ConstructRecord,
    _module: &BackingModule,
) -> Rewrite {
    let example = match record.kind {
        ConstructKind::ContentValue {
            direct_component: Some(DirectForm::Block),
            ..
        } => "'<ComponentName @arg={{value}}>...</ComponentName>'.",
        _ => "'<ComponentName @arg={{value}} />'.",
    };
    Rewrite {
        message: prefixed(&format!("{DIRECT_INVOCATION_PREFIX}{example}"), &raw.message),
        anchor: Some(record.original),
    }
}

// ── Globals ─────────────────────────────────────────────────────────────

fn unknown_global_applies(_raw: &CheckerDiagnostic, record: &ConstructRecord) -> bool {
    matches!(record.kind, ConstructKind::GlobalLookup { .. })
}

fn unknown_global_rewrite(
    raw: &CheckerDiagnostic,
    record: &ConstructRecord,
    _module: &BackingModule,
) -> Rewrite {
    let name = match &record.kind {
        ConstructKind::GlobalLookup { name } => name.as_str(),
        _ => "",
    };
    let guidance = format!(
        "Unknown name '{name}'. If this isn't a typo, you may be missing a registry entry for \
         this value; see the Template Registry page in the Trellis documentation for more details."
    );
    Rewrite {
        message: prefixed(&guidance, &raw.message),
        anchor: Some(record.original),
    }
}

/// The checker's overload failure names the `keyof` constraint when the
/// argument is not one of the registry's keys.
fn is_name_failure(raw: &CheckerDiagnostic) -> bool {
    raw.message.contains("keyof")
}

fn unknown_component_applies(raw: &CheckerDiagnostic, record: &ConstructRecord) -> bool {
    matches!(record.kind, ConstructKind::ComponentByName { literal: Some(_), .. })
        && is_name_failure(raw)
}

fn unknown_component_rewrite(
    raw: &CheckerDiagnostic,
    record: &ConstructRecord,
    module: &BackingModule,
) -> Rewrite {
    let (name, anchor) = match &record.kind {
        ConstructKind::ComponentByName { argument, literal } => (
            literal.as_deref().unwrap_or_default(),
            original_of(module, *argument),
        ),
        _ => ("", None),
    };
    let guidance = format!(
        "Unknown component name '{name}'. If this isn't a typo, you may be missing a registry \
         entry for this name; see the Template Registry page in the Trellis documentation for \
         more details."
    );
    Rewrite {
        message: prefixed(&guidance, &raw.message),
        anchor,
    }
}

fn too_wide_applies(raw: &CheckerDiagnostic, record: &ConstructRecord) -> bool {
    matches!(record.kind, ConstructKind::ComponentByName { literal: None, .. })
        && is_name_failure(raw)
}

fn too_wide_rewrite(
    raw: &CheckerDiagnostic,
    record: &ConstructRecord,
    module: &BackingModule,
) -> Rewrite {
    let anchor = match record.kind {
        ConstructKind::ComponentByName { argument, .. } => original_of(module, argument),
        _ => None,
    };
    Rewrite {
        message: prefixed(TOO_WIDE_MESSAGE, &raw.message),
        anchor,
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

/// Guidance first, then the checker's own explanation.
fn prefixed(guidance: &str, original: &str) -> String {
    format!("{guidance}\n{original}")
}

fn original_of(module: &BackingModule, synthetic: Span) -> Option<Span> {
    module
        .mapping()
        .synthetic_to_original(synthetic)
        .filter(|(source, _)| *source == SourceId::PRIMARY)
        .map(|(_, span)| span)
}
