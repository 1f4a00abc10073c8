//! Lowering of template regions into backing TypeScript.
//!
//! Every construct lowers to code whose type-checking behaviour mirrors the
//! template semantics. Mapping segments are recorded only for leaves (names,
//! literals, host text), so segments never nest; whole constructs are
//! described by [`ConstructRecord`]s instead.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::path::Path;
use std::slice;

use trellis_config::{DocumentKind, Profile};
use trellis_syntax::ast::{
    AttrValue, Attribute, BlockNode, BlockParam, Call, ConcatPart, ConcatValue, ElementNode,
    Expression, HashPair, Literal, LiteralValue, MustacheNode, Node, PathExpression, PathHead,
    PathSegment, SubExpression,
};
use trellis_syntax::{Placement, TemplateRegion};
use trellis_types::{LineIndex, SourceId, Span};

use crate::context::{ConstructKind, ConstructRecord, DirectForm, Invocation, InvocationForm};
use crate::directives::{self, Directive};
use crate::module::{BackingModule, GenerationIssue, SourceFile};
use crate::writer::CodeWriter;

/// Heads with built-in lowerings, unless shadowed by a local binding.
const KEYWORDS: &[&str] = &[
    "component",
    "each",
    "each-in",
    "has-block",
    "has-block-params",
    "if",
    "let",
    "unless",
    "yield",
];

const COMPANION_SOURCE: SourceId = SourceId::new(1);

/// A script paired with a template-only file.
#[derive(Debug, Clone, Copy)]
pub struct Companion<'a> {
    pub path: &'a Path,
    pub text: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerateInput<'a> {
    /// Path the checker sees the backing module under.
    pub virtual_path: &'a Path,
    pub path: &'a Path,
    pub text: &'a str,
    pub kind: DocumentKind,
    /// Only meaningful for [`DocumentKind::Template`].
    pub companion: Option<Companion<'a>>,
}

/// Build the backing module for one document.
///
/// Parse failures do not fail generation: the affected region lowers to an
/// opaque expression and the failure is recorded as a [`GenerationIssue`].
#[must_use]
pub fn generate(input: &GenerateInput<'_>, profile: &Profile) -> BackingModule {
    let mut generator = Generator::new(input, profile);
    match input.kind {
        DocumentKind::Embedded => generator.embedded(),
        DocumentKind::Template => generator.template(input.companion),
        DocumentKind::Script => return BackingModule::identity(input.virtual_path, input.text),
    }
    generator.finish(input)
}

struct Generator<'a> {
    out: CodeWriter,
    text: &'a str,
    profile: &'a Profile,
    dsl: String,
    host_bindings: BTreeSet<String>,
    scopes: Vec<Vec<String>>,
    records: Vec<ConstructRecord>,
    directives: Vec<Directive>,
    issues: Vec<GenerationIssue>,
    next_local: usize,
    regions: usize,
}

impl<'a> Generator<'a> {
    fn new(input: &GenerateInput<'a>, profile: &'a Profile) -> Self {
        Self {
            out: CodeWriter::new(),
            text: input.text,
            profile,
            dsl: format!("({{}} as typeof import({}))", quote(profile.dsl_module())),
            host_bindings: BTreeSet::new(),
            scopes: Vec::new(),
            records: Vec::new(),
            directives: Vec::new(),
            issues: Vec::new(),
            next_local: 0,
            regions: 0,
        }
    }

    fn finish(mut self, input: &GenerateInput<'_>) -> BackingModule {
        if self.regions > 0 {
            self.registry();
        }
        let mut sources = vec![SourceFile::new(input.path, input.text)];
        if let (DocumentKind::Template, Some(companion)) = (input.kind, input.companion) {
            sources.push(SourceFile::new(companion.path, companion.text));
        }
        let (text, mapping) = self.out.finish();
        let mut records = self.records;
        records.sort_by_key(|r| (r.extent.start, Reverse(r.extent.end)));
        tracing::debug!(
            path = %input.virtual_path.display(),
            bytes = text.len(),
            segments = mapping.len(),
            issues = self.issues.len(),
            "Generated backing module"
        );
        BackingModule {
            virtual_path: input.virtual_path.to_path_buf(),
            lines: LineIndex::new(&text),
            mapping,
            records,
            directives: self.directives,
            issues: self.issues,
            sources,
        }
    }

    // ── Documents ───────────────────────────────────────────────────────

    fn embedded(&mut self) {
        let regions = match trellis_syntax::scan_regions(self.text) {
            Ok(regions) => regions,
            Err(err) => {
                self.issue(err.span, err.to_string());
                self.host(0, err.span.start);
                return;
            }
        };
        if self.profile.strict() {
            self.host_bindings = trellis_syntax::collect_host_bindings(self.text, &regions);
        }
        let mut cursor = 0;
        for region in &regions {
            self.host(cursor, region.outer.start);
            self.region(region);
            cursor = region.outer.end;
        }
        self.host(cursor, self.text.len());
    }

    fn template(&mut self, companion: Option<Companion<'_>>) {
        let region = TemplateRegion::whole_file(self.text.len());
        let dsl = self.dsl.clone();
        match companion {
            Some(companion) => {
                self.out.verbatim(
                    COMPANION_SOURCE,
                    Span::new(0, companion.text.len()),
                    companion.text,
                );
                if !companion.text.is_empty() && !companion.text.ends_with('\n') {
                    self.out.newline();
                }
                let stem = companion
                    .path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or("index");
                self.out.write(&format!(
                    "{dsl}.templateForBackingValue((null as unknown as typeof import({})).default, ",
                    quote(&format!("./{stem}"))
                ));
                self.body(&region);
                self.out.line(");");
            }
            None => {
                self.out
                    .write(&format!("export default {dsl}.templateExpression("));
                self.body(&region);
                self.out.line(");");
            }
        }
    }

    fn host(&mut self, start: usize, end: usize) {
        if start < end {
            let span = Span::new(start, end);
            self.out.verbatim(SourceId::PRIMARY, span, span.slice(self.text));
        }
    }

    fn region(&mut self, region: &TemplateRegion) {
        let dsl = self.dsl.clone();
        match region.placement {
            Placement::ClassMember => {
                self.out
                    .write(&format!("static {{ {dsl}.templateForBackingValue(this, "));
                self.body(region);
                self.out.write("); }");
            }
            Placement::Expression => {
                self.out.write(&format!("{dsl}.templateExpression("));
                self.body(region);
                self.out.write(")");
            }
            Placement::ModuleDefault | Placement::Companion => {
                self.out
                    .write(&format!("export default {dsl}.templateExpression("));
                self.body(region);
                self.out.write(");");
            }
        }
    }

    fn body(&mut self, region: &TemplateRegion) {
        self.regions += 1;
        self.out.write(&format!(
            "function (__ctx, __dsl: typeof import({})) {{",
            quote(self.profile.dsl_module())
        ));
        self.out.newline();
        self.out.indent();
        match trellis_syntax::parse(region.inner.slice(self.text), region.inner.start) {
            Ok(template) => {
                directives::collect(
                    &template,
                    region.inner,
                    SourceId::PRIMARY,
                    &mut self.directives,
                    &mut self.issues,
                );
                self.nodes(&template.body);
            }
            Err(err) => {
                self.issue(err.span, err.to_string());
                self.out.line("(null as any);");
            }
        }
        self.out.dedent();
        self.out.write("}");
    }

    fn registry(&mut self) {
        let registry = self.profile.registry().clone();
        self.out.newline();
        self.out.open_brace("declare namespace __reg ");
        self.out.open_brace("interface Globals ");
        for (name, ty) in registry.iter() {
            self.out.line(&format!("{}: {ty};", quote(name)));
        }
        self.out.close_brace("");
        self.out.line("const Globals: Globals;");
        self.out.close_brace("");
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn nodes<'n>(&mut self, nodes: impl IntoIterator<Item = &'n Node>) {
        for node in nodes {
            match node {
                Node::Text(_) | Node::Comment(_) => {}
                Node::Mustache(mustache) => self.content(mustache),
                Node::Block(block) => self.block(block),
                Node::Element(element) => self.element(element),
                Node::Partial(partial) => {
                    self.issue(partial.span, "Partials are not supported in typed templates.");
                    self.out.line("(null as any);");
                }
            }
        }
    }

    fn content(&mut self, mustache: &MustacheNode) {
        let call = &mustache.call;
        match self.keyword(call) {
            Some("yield") => {
                self.yield_to_block(call);
                self.out.line(";");
            }
            Some("component") => {
                self.emit_content(mustache.span, Some(DirectForm::Inline), |g| {
                    g.direct_component(call);
                });
            }
            _ => self.emit_content(mustache.span, None, |g| g.value(mustache)),
        }
    }

    fn emit_content(
        &mut self,
        original: Span,
        direct_component: Option<DirectForm>,
        value: impl FnOnce(&mut Self),
    ) {
        let start = self.out.mark();
        self.out.write("__dsl.emitContent(");
        let value_start = self.out.mark();
        value(self);
        let value_span = Span::new(value_start, self.out.offset());
        self.out.write(")");
        self.record(
            start,
            original,
            ConstructKind::ContentValue {
                value: value_span,
                direct_component,
            },
        );
        self.out.line(";");
    }

    fn block(&mut self, block: &BlockNode) {
        match self.keyword(&block.call) {
            Some("if") => self.conditional_block(block, false),
            Some("unless") => self.conditional_block(block, true),
            Some("each") => self.each_block(block, "iterate"),
            Some("each-in") => self.each_block(block, "iterateEntries"),
            Some("let") => self.let_block(block),
            Some("component") => self.direct_component_block(block),
            _ => self.component_block(block),
        }
    }

    fn conditional_block(&mut self, block: &BlockNode, negate: bool) {
        self.out.write("if (");
        self.condition(block.call.params.first(), negate);
        self.out.write(") ");
        self.out.open_brace("");
        self.nodes(&block.program.body);
        match &block.inverse {
            Some(inverse) => {
                self.out.dedent();
                self.out.open_brace("} else ");
                self.nodes(&inverse.body);
                self.out.close_brace("");
            }
            None => self.out.close_brace(""),
        }
    }

    fn each_block(&mut self, block: &BlockNode, iterator: &str) {
        self.out.write("for (const [");
        self.declare(&block.program.params);
        self.out.write(&format!("] of __dsl.{iterator}("));
        self.optional_expression(block.call.params.first());
        self.out.write(")) ");
        self.out.open_brace("");
        self.scoped(&block.program.params, &block.program.body);
        self.out.close_brace("");
        if let Some(inverse) = &block.inverse {
            self.out.open_brace("");
            self.nodes(&inverse.body);
            self.out.close_brace("");
        }
    }

    fn let_block(&mut self, block: &BlockNode) {
        let params = &block.program.params;
        self.out.open_brace("");
        for (i, value) in block.call.params.iter().enumerate() {
            if let Some(param) = params.get(i) {
                self.out.write("const ");
                self.declare(slice::from_ref(param));
                self.out.write(" = ");
            }
            self.expression(value);
            self.out.line(";");
        }
        for param in params.iter().skip(block.call.params.len()) {
            self.out.write("const ");
            self.declare(slice::from_ref(param));
            self.out.line(" = undefined;");
        }
        self.scoped(params, &block.program.body);
        self.out.close_brace("");
    }

    /// `{{#component ...}}`: rejected as content, but the body still checks.
    fn direct_component_block(&mut self, block: &BlockNode) {
        self.emit_content(block.span, Some(DirectForm::Block), |g| {
            g.direct_component(&block.call);
        });
        self.out.open_brace("");
        if !block.program.params.is_empty() {
            self.out.write("const [");
            self.declare(&block.program.params);
            self.out.line("] = [] as any[];");
        }
        self.scoped(&block.program.params, &block.program.body);
        self.out.close_brace("");
        if let Some(inverse) = &block.inverse {
            self.out.open_brace("");
            self.nodes(&inverse.body);
            self.out.close_brace("");
        }
    }

    fn component_block(&mut self, block: &BlockNode) {
        let local = self.fresh("__blk");
        self.out.open_brace("");
        self.out
            .write(&format!("const {local} = __dsl.emitComponent("));
        self.invocation(&block.call);
        self.out.line(");");
        self.yielded(&local, "default", &block.program.params, &block.program.body);
        if let Some(inverse) = &block.inverse {
            self.yielded(&local, "else", &inverse.params, &inverse.body);
        }
        self.out.close_brace("");
    }

    /// A block body receiving the params a component yields to `name`.
    fn yielded<'n>(
        &mut self,
        local: &str,
        name: &str,
        params: &[BlockParam],
        body: impl IntoIterator<Item = &'n Node>,
    ) {
        self.out.open_brace("");
        if !params.is_empty() {
            self.out.write("const [");
            self.declare(params);
            self.out
                .line(&format!("] = {local}.blockParams[{}];", quote(name)));
        }
        self.scopes.push(params.iter().map(|p| p.name.clone()).collect());
        self.nodes(body);
        self.scopes.pop();
        self.out.close_brace("");
    }

    fn scoped(&mut self, params: &[BlockParam], body: &[Node]) {
        self.scopes.push(params.iter().map(|p| p.name.clone()).collect());
        self.nodes(body);
        self.scopes.pop();
    }

    fn declare(&mut self, params: &[BlockParam]) {
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.out.write(", ");
            }
            self.out
                .mapped(SourceId::PRIMARY, param.span, &local_name(&param.name));
        }
    }

    // ── Elements ────────────────────────────────────────────────────────

    fn element(&mut self, element: &ElementNode) {
        if element.is_named_block() {
            self.issue(
                element.tag_span,
                format!(
                    "Named block <{}> is only valid directly inside a component invocation.",
                    element.tag
                ),
            );
            self.nodes(&element.children);
        } else if element.is_component() {
            self.component_element(element);
        } else {
            self.html_element(element);
        }
    }

    fn html_element(&mut self, element: &ElementNode) {
        let local = self.fresh("__el");
        self.out.open_brace("");
        self.out.line(&format!(
            "const {local} = __dsl.emitElement({});",
            quote(&element.tag)
        ));
        for arg in &element.args {
            self.issue(
                arg.span,
                format!(
                    "Arguments such as '@{}' can only be passed to components.",
                    arg.name
                ),
            );
        }
        self.element_features(&local, element);
        self.nodes(&element.children);
        self.out.close_brace("");
    }

    fn component_element(&mut self, element: &ElementNode) {
        let local = self.fresh("__blk");
        self.out.open_brace("");
        self.out
            .write(&format!("const {local} = __dsl.emitComponent("));

        let start = self.out.mark();
        self.out.write("__dsl.resolve(");
        let callee_start = self.out.mark();
        self.anchored_path(&tag_path(&element.tag, element.tag_span), element.span);
        let callee = Span::new(callee_start, self.out.offset());
        self.out.write(")");
        let callee_expr = Span::new(start, self.out.offset());
        self.out.write("(");
        let mut arguments = Vec::new();
        if !element.args.is_empty() {
            let args_start = self.out.mark();
            self.component_args(&element.args);
            arguments.push(Span::new(args_start, self.out.offset()));
        }
        self.out.write(")");
        let original_arguments = element
            .args
            .iter()
            .map(|arg| arg.span)
            .reduce(Span::cover);
        self.record(
            start,
            original_arguments.map_or(element.tag_span, |args| element.tag_span.cover(args)),
            ConstructKind::Invocation(Invocation {
                form: InvocationForm::Resolved,
                callee_expr,
                callee,
                arguments,
                has_named_args: !element.args.is_empty(),
                original_arguments,
            }),
        );
        self.out.line(");");

        self.element_features(&local, element);

        let (named, default): (Vec<&Node>, Vec<&Node>) = element
            .children
            .iter()
            .partition(|child| matches!(child, Node::Element(e) if e.is_named_block()));
        if !element.block_params.is_empty() || default.iter().any(|child| !child.is_trivia()) {
            self.yielded(&local, "default", &element.block_params, default);
        }
        for child in named {
            if let Node::Element(block) = child {
                let name = block.tag.trim_start_matches(':');
                self.yielded(&local, name, &block.block_params, &block.children);
            }
        }
        self.out.close_brace("");
    }

    /// Attributes, modifiers and `...attributes`, shared by both element forms.
    fn element_features(&mut self, local: &str, element: &ElementNode) {
        for attribute in &element.attributes {
            self.attribute(local, attribute);
        }
        for modifier in &element.modifiers {
            self.out
                .write(&format!("__dsl.applyModifier({local}.element, "));
            self.invocation(&modifier.call);
            self.out.line(");");
        }
        if element.splattributes.is_some() {
            self.out.line(&format!(
                "__dsl.applySplattributes(__ctx.element, {local}.element);"
            ));
        }
    }

    fn attribute(&mut self, local: &str, attribute: &Attribute) {
        let target_text = format!("{local}.attributes[{}]", quote(&attribute.name));
        match &attribute.value {
            AttrValue::Valueless | AttrValue::Text(_) => {}
            AttrValue::Mustache(mustache) => {
                let start = self.out.mark();
                let target = self
                    .out
                    .anchored(SourceId::PRIMARY, mustache.call.span, &target_text);
                self.out.write(" = ");
                let value_start = self.out.mark();
                self.value(mustache);
                let value = Span::new(value_start, self.out.offset());
                self.record(
                    start,
                    mustache.call.span,
                    ConstructKind::AttributeValue { target, value },
                );
                self.out.line(";");
            }
            AttrValue::Concat(concat) => {
                self.out.write(&format!("{target_text} = "));
                self.concat(concat);
                self.out.line(";");
            }
        }
    }

    fn component_args(&mut self, args: &[Attribute]) {
        self.out.write("{ ");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.out.write(", ");
            }
            let key = Span::new(arg.name_span.start + 1, arg.name_span.end);
            self.property_key(&arg.name, key);
            self.out.write(": ");
            match &arg.value {
                AttrValue::Valueless => self.out.write("\"\""),
                AttrValue::Text(text) => {
                    self.out
                        .mapped(SourceId::PRIMARY, text.span, &quote(&text.value));
                }
                AttrValue::Mustache(mustache) => self.value(mustache),
                AttrValue::Concat(concat) => self.concat(concat),
            }
        }
        self.out.write(" }");
    }

    fn concat(&mut self, concat: &ConcatValue) {
        self.out.write("`");
        for part in &concat.parts {
            match part {
                ConcatPart::Text(text) => self.out.write(&escape_template_text(&text.value)),
                ConcatPart::Mustache(mustache) => {
                    self.out.write("${");
                    self.value(mustache);
                    self.out.write("}");
                }
            }
        }
        self.out.write("`");
    }

    // ── Expressions ─────────────────────────────────────────────────────

    /// A mustache's value in content, attribute or argument position.
    fn value(&mut self, mustache: &MustacheNode) {
        let call = &mustache.call;
        match self.keyword(call) {
            Some("if") => return self.inline_conditional(call, false),
            Some("unless") => return self.inline_conditional(call, true),
            Some(keyword @ ("has-block" | "has-block-params")) => {
                return self.has_block(call, keyword);
            }
            Some("component") => return self.component_by_name(call),
            _ => {}
        }
        if call.has_arguments() {
            self.invocation(call);
        } else if let Expression::Path(path) = &call.callee {
            self.bare_invocation(path, mustache.span);
        } else {
            self.expression(&call.callee);
        }
    }

    fn expression(&mut self, expression: &Expression) {
        match expression {
            Expression::Path(path) => self.path(path),
            Expression::Literal(literal) => self.literal(literal),
            Expression::SubExpression(sub) => self.sub_expression(sub),
        }
    }

    fn optional_expression(&mut self, expression: Option<&Expression>) {
        match expression {
            Some(expression) => self.expression(expression),
            None => self.out.write("undefined"),
        }
    }

    fn sub_expression(&mut self, sub: &SubExpression) {
        let call = &sub.call;
        match self.keyword(call) {
            Some("if") => self.inline_conditional(call, false),
            Some("unless") => self.inline_conditional(call, true),
            Some(keyword @ ("has-block" | "has-block-params")) => self.has_block(call, keyword),
            Some("component") => self.component_by_name(call),
            _ => self.invocation(call),
        }
    }

    fn literal(&mut self, literal: &Literal) {
        let text = match &literal.value {
            LiteralValue::String(value) => quote(value),
            LiteralValue::Number(raw) => raw.clone(),
            LiteralValue::Boolean(value) => value.to_string(),
            LiteralValue::Null => "null".to_string(),
            LiteralValue::Undefined => "undefined".to_string(),
        };
        self.out.mapped(SourceId::PRIMARY, literal.span, &text);
    }

    fn path(&mut self, path: &PathExpression) {
        self.anchored_path(path, path.span);
    }

    /// A path whose unknown-global record reports at `anchor`.
    fn anchored_path(&mut self, path: &PathExpression, anchor: Span) {
        match &path.head {
            PathHead::This { span } => {
                self.out.write("__ctx.");
                self.out.mapped(SourceId::PRIMARY, *span, "this");
            }
            PathHead::Arg { name, span } => {
                self.out.write("__ctx.args");
                self.member(name, Span::new(span.start + 1, span.end), false);
            }
            PathHead::Var { name, span } => {
                if self.is_local(name) {
                    self.out.mapped(SourceId::PRIMARY, *span, &local_name(name));
                } else {
                    self.global(name, *span, anchor);
                }
            }
        }
        for segment in &path.tail {
            self.member(&segment.name, segment.span, true);
        }
    }

    fn global(&mut self, name: &str, span: Span, anchor: Span) {
        let start = self.out.mark();
        self.out.write("__reg.Globals[\"");
        self.out.mapped(SourceId::PRIMARY, span, name);
        self.out.write("\"]");
        self.record(
            start,
            anchor,
            ConstructKind::GlobalLookup {
                name: name.to_string(),
            },
        );
    }

    fn member(&mut self, name: &str, span: Span, optional: bool) {
        let dot = if optional { "?." } else { "." };
        if is_identifier(name) {
            self.out.write(dot);
            self.out.mapped(SourceId::PRIMARY, span, name);
        } else {
            self.out.write(if optional { "?.[\"" } else { "[\"" });
            self.out.mapped(SourceId::PRIMARY, span, name);
            self.out.write("\"]");
        }
    }

    fn property_key(&mut self, name: &str, span: Span) {
        if is_identifier(name) {
            self.out.mapped(SourceId::PRIMARY, span, name);
        } else {
            self.out.write("\"");
            self.out.mapped(SourceId::PRIMARY, span, name);
            self.out.write("\"");
        }
    }

    /// `__dsl.resolve(callee)(positional..., { named })`.
    fn invocation(&mut self, call: &Call) {
        let start = self.out.mark();
        self.out.write("__dsl.resolve(");
        let callee_start = self.out.mark();
        self.expression(&call.callee);
        let callee = Span::new(callee_start, self.out.offset());
        self.out.write(")");
        let callee_expr = Span::new(start, self.out.offset());
        self.out.write("(");
        let arguments = self.arguments(&call.params, &call.hash.pairs);
        self.out.write(")");
        self.record(
            start,
            call.span,
            ConstructKind::Invocation(Invocation {
                form: InvocationForm::Resolved,
                callee_expr,
                callee,
                arguments,
                has_named_args: !call.hash.pairs.is_empty(),
                original_arguments: call.arguments_span(),
            }),
        );
    }

    fn arguments(&mut self, params: &[Expression], named: &[HashPair]) -> Vec<Span> {
        let mut spans = Vec::with_capacity(params.len() + 1);
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.out.write(", ");
            }
            let start = self.out.mark();
            self.expression(param);
            spans.push(Span::new(start, self.out.offset()));
        }
        if !named.is_empty() {
            if !params.is_empty() {
                self.out.write(", ");
            }
            let start = self.out.mark();
            self.named_args(named);
            spans.push(Span::new(start, self.out.offset()));
        }
        spans
    }

    fn named_args(&mut self, pairs: &[HashPair]) {
        if pairs.is_empty() {
            self.out.write("{}");
            return;
        }
        self.out.write("{ ");
        for (i, pair) in pairs.iter().enumerate() {
            if i > 0 {
                self.out.write(", ");
            }
            self.property_key(&pair.key, pair.key_span);
            self.out.write(": ");
            self.expression(&pair.value);
        }
        self.out.write(" }");
    }

    /// `{{yield a b to="name"}}`
    fn yield_to_block(&mut self, call: &Call) {
        let start = self.out.mark();
        self.out.write("__dsl.yieldToBlock(__ctx, ");
        match call.hash.get("to") {
            Some(Expression::Literal(Literal {
                value: LiteralValue::String(name),
                span,
            })) => {
                let block = if name == "inverse" { "else" } else { name };
                self.out.mapped(SourceId::PRIMARY, *span, &quote(block));
            }
            Some(other) => self.expression(other),
            None => self.out.write("\"default\""),
        }
        self.out.write(")");
        let callee_expr = Span::new(start, self.out.offset());
        self.out.write("(");
        let arguments = self.arguments(&call.params, &[]);
        self.out.write(")");
        let original_arguments = call
            .params
            .iter()
            .map(Expression::span)
            .reduce(Span::cover);
        self.record(
            start,
            call.span,
            ConstructKind::Invocation(Invocation {
                form: InvocationForm::Yield,
                callee_expr,
                callee: callee_expr,
                arguments,
                has_named_args: false,
                original_arguments,
            }),
        );
    }

    /// `{{name}}` with no arguments: invoked when the value is invokable,
    /// emitted as is otherwise. Arity errors report at the whole mustache.
    fn bare_invocation(&mut self, path: &PathExpression, original: Span) {
        let start = self.out.mark();
        self.out.write("__dsl.resolveOrReturn(");
        let callee_start = self.out.mark();
        self.path(path);
        let callee = Span::new(callee_start, self.out.offset());
        self.out.write(")");
        let callee_expr = Span::new(start, self.out.offset());
        self.out.write("()");
        self.record(
            start,
            original,
            ConstructKind::Invocation(Invocation {
                form: InvocationForm::Resolved,
                callee_expr,
                callee,
                arguments: Vec::new(),
                has_named_args: false,
                original_arguments: None,
            }),
        );
    }

    /// `{{component ...}}` in content position. `directComponent` never
    /// returns valid content, whatever the name resolves to.
    fn direct_component(&mut self, call: &Call) {
        self.out
            .anchored(SourceId::PRIMARY, call.callee.span(), "__dsl.directComponent");
        self.out.write("(");
        self.component_by_name(call);
        self.out.write(")");
    }

    /// `(component name named...)`
    fn component_by_name(&mut self, call: &Call) {
        let extra = call.params.get(1..).unwrap_or_default();
        let curried = !call.hash.pairs.is_empty() || !extra.is_empty();
        if curried {
            self.out.write("__dsl.curryComponent(");
        }
        let start = self.out.mark();
        self.out.write("__dsl.componentByName(__reg.Globals, ");
        let argument_start = self.out.mark();
        let name = call.params.first();
        self.optional_expression(name);
        let argument = Span::new(argument_start, self.out.offset());
        self.out.write(")");
        self.record(
            start,
            call.span,
            ConstructKind::ComponentByName {
                argument,
                literal: name.and_then(Expression::as_string_literal).map(str::to_string),
            },
        );
        if curried {
            self.out.write(", ");
            self.named_args(&call.hash.pairs);
            for param in extra {
                self.out.write(", ");
                self.expression(param);
            }
            self.out.write(")");
        }
    }

    fn inline_conditional(&mut self, call: &Call, negate: bool) {
        self.out.write("(");
        self.condition(call.params.first(), negate);
        self.out.write(" ? ");
        self.optional_expression(call.params.get(1));
        self.out.write(" : ");
        self.optional_expression(call.params.get(2));
        self.out.write(")");
    }

    fn condition(&mut self, condition: Option<&Expression>, negate: bool) {
        if negate {
            self.out.write("!(");
        }
        self.optional_expression(condition);
        if negate {
            self.out.write(")");
        }
    }

    fn has_block(&mut self, call: &Call, keyword: &str) {
        let helper = if keyword == "has-block" {
            "hasBlock"
        } else {
            "hasBlockParams"
        };
        self.out.write(&format!("__dsl.{helper}(__ctx, "));
        match call.params.first() {
            Some(name) => self.expression(name),
            None => self.out.write("\"default\""),
        }
        self.out.write(")");
    }

    // ── Bookkeeping ─────────────────────────────────────────────────────

    fn keyword(&self, call: &Call) -> Option<&'static str> {
        let name = call.keyword()?;
        let keyword = KEYWORDS.iter().copied().find(|k| *k == name)?;
        (!self.is_local(keyword)).then_some(keyword)
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .rev()
            .any(|frame| frame.iter().any(|local| local == name))
            || (self.profile.strict() && self.host_bindings.contains(name))
    }

    fn fresh(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}{}", self.next_local);
        self.next_local += 1;
        name
    }

    fn record(&mut self, start: usize, original: Span, kind: ConstructKind) {
        self.records.push(ConstructRecord {
            extent: Span::new(start, self.out.offset()),
            original,
            kind,
        });
    }

    fn issue(&mut self, span: Span, message: impl Into<String>) {
        self.issues
            .push(GenerationIssue::new(SourceId::PRIMARY, span, message));
    }
}

/// `Foo.bar`, `@item` or `this.Comp` as a path expression.
fn tag_path(tag: &str, span: Span) -> PathExpression {
    let mut offset = span.start;
    let mut parts = tag.split('.').map(|part| {
        let part_span = Span::new(offset, offset + part.len());
        offset += part.len() + 1;
        (part, part_span)
    });
    let head = match parts.next() {
        Some(("this", span)) => PathHead::This { span },
        Some((part, span)) if part.starts_with('@') => PathHead::Arg {
            name: part[1..].to_string(),
            span,
        },
        Some((part, span)) => PathHead::Var {
            name: part.to_string(),
            span,
        },
        None => PathHead::Var {
            name: String::new(),
            span,
        },
    };
    let tail = parts
        .map(|(name, span)| PathSegment {
            name: name.to_string(),
            span,
        })
        .collect();
    PathExpression { span, head, tail }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Block params may contain `-`, which TypeScript identifiers cannot.
fn local_name(name: &str) -> String {
    name.replace('-', "_")
}

fn quote(text: &str) -> String {
    serde_json::Value::from(text).to_string()
}

fn escape_template_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('`', "\\`")
        .replace("${", "\\${")
        .replace('\n', "\\n")
}
