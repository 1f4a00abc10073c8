//! Notes the generator leaves about which template construct produced which
//! synthetic code, so diagnostics can be explained in template terms.

use trellis_types::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructRecord {
    /// Synthetic span of the whole lowered construct.
    pub extent: Span,
    /// Original span of the whole construct.
    pub original: Span,
    pub kind: ConstructKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructKind {
    Invocation(Invocation),
    /// An attribute assignment; `target` is the assignment's left-hand side.
    AttributeValue { target: Span, value: Span },
    /// Argument of `emitContent`.
    ContentValue {
        value: Span,
        direct_component: Option<DirectForm>,
    },
    /// `__reg.Globals["name"]`.
    GlobalLookup { name: String },
    /// `__dsl.componentByName(__reg.Globals, arg)`.
    ComponentByName {
        argument: Span,
        /// The name when the argument is a string literal.
        literal: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationForm {
    /// A helper, modifier or component invoked through `resolve`.
    Resolved,
    /// `{{yield}}`.
    Yield,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub form: InvocationForm,
    /// `__dsl.resolve(callee)` or `__dsl.yieldToBlock(...)`.
    pub callee_expr: Span,
    /// The value passed to `resolve`.
    pub callee: Span,
    /// Each synthetic argument, the named-args object last.
    pub arguments: Vec<Span>,
    pub has_named_args: bool,
    /// Original span of the argument list, absent when there are no arguments.
    pub original_arguments: Option<Span>,
}

/// How `component` was invoked directly in content position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectForm {
    /// `{{component ...}}`
    Inline,
    /// `{{#component ...}}...{{/component}}`
    Block,
}
