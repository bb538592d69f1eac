//! Structural extractor for Python sources.
//!
//! Walks the tree-sitter AST collecting class/method symbols, import and
//! call relationships, and query call-sites. String literals passed to
//! calls (or bound to names) are reconstructed into their literal query
//! form; interpolation holes become `?` placeholders and the site is
//! flagged as dynamically constructed.

use crate::error::CoreError;
use crate::extract::query;
use crate::extract::{ExtractedFile, RelationFact, SymbolFact};
use crate::model::{CallSite, EdgeKind, NodeKind, QueryVerb};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tree_sitter::{Node, Parser};

#[derive(Clone, Default)]
struct Scope {
    class: Option<String>,
    function: Option<String>,
}

impl Scope {
    /// Qualname of the innermost enclosing symbol, if any.
    fn enclosing(&self) -> Option<String> {
        self.function.clone().or_else(|| self.class.clone())
    }
}

struct Reconstructed {
    text: String,
    dynamic: bool,
    /// Whether the literal fragments themselves carried bind markers,
    /// before interpolation holes were substituted.
    had_markers: bool,
}

pub struct PythonExtractor {
    parser: Parser,
}

impl PythonExtractor {
    pub fn new() -> Result<Self, CoreError> {
        let mut parser = Parser::new();
        let language = tree_sitter_python::LANGUAGE;
        parser
            .set_language(&language.into())
            .map_err(|err| CoreError::Parser(err.to_string()))?;
        Ok(Self { parser })
    }

    /// Extract structural facts and call-sites. Returns `None` when the
    /// parser produces no tree at all; the caller falls back to the line
    /// scanner in that case.
    pub fn extract(&mut self, file_path: &str, source: &str) -> Option<ExtractedFile> {
        let tree = self.parser.parse(source, None)?;
        let mut out = ExtractedFile::default();
        let scope = Scope::default();
        walk(tree.root_node(), &scope, source, file_path, &mut out);
        Some(out)
    }
}

fn walk(node: Node<'_>, scope: &Scope, source: &str, file_path: &str, out: &mut ExtractedFile) {
    match node.kind() {
        "class_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source);
                out.symbols.push(SymbolFact {
                    kind: NodeKind::Class,
                    name: name.clone(),
                    qualname: name.clone(),
                    line: line_of(node),
                    end_line: end_line_of(node),
                });
                let inner = Scope {
                    class: Some(name),
                    function: None,
                };
                if let Some(body) = node.child_by_field_name("body") {
                    walk_children(body, &inner, source, file_path, out);
                }
                return;
            }
        }
        "function_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source);
                let qualname = match &scope.class {
                    Some(class) => format!("{class}.{name}"),
                    None => name.clone(),
                };
                out.symbols.push(SymbolFact {
                    kind: NodeKind::Method,
                    name,
                    qualname: qualname.clone(),
                    line: line_of(node),
                    end_line: end_line_of(node),
                });
                let inner = Scope {
                    class: scope.class.clone(),
                    function: Some(qualname),
                };
                if let Some(body) = node.child_by_field_name("body") {
                    walk_children(body, &inner, source, file_path, out);
                }
                return;
            }
        }
        "import_statement" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                let module_node = match child.kind() {
                    "dotted_name" => Some(child),
                    "aliased_import" => child.child_by_field_name("name"),
                    _ => None,
                };
                if let Some(module_node) = module_node {
                    push_import(out, node_text(module_node, source));
                }
            }
            return;
        }
        "import_from_statement" => {
            if let Some(module_node) = node.child_by_field_name("module_name") {
                let raw = node_text(module_node, source);
                let module = raw.trim_start_matches('.').to_string();
                if !module.is_empty() {
                    push_import(out, module);
                }
            }
            return;
        }
        "call" => {
            handle_call(node, scope, source, file_path, out);
            // Fall through: nested calls inside arguments still matter.
        }
        "assignment" => {
            handle_assignment(node, scope, source, file_path, out);
        }
        _ => {}
    }
    walk_children(node, scope, source, file_path, out);
}

fn walk_children(
    node: Node<'_>,
    scope: &Scope,
    source: &str,
    file_path: &str,
    out: &mut ExtractedFile,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        walk(child, scope, source, file_path, out);
    }
}

fn push_import(out: &mut ExtractedFile, module: String) {
    out.relations.push(RelationFact {
        kind: EdgeKind::Imports,
        source_qualname: None,
        target: module.clone(),
        target_is_module: true,
    });
    out.relations.push(RelationFact {
        kind: EdgeKind::DependsOn,
        source_qualname: None,
        target: module,
        target_is_module: true,
    });
}

fn handle_call(node: Node<'_>, scope: &Scope, source: &str, file_path: &str, out: &mut ExtractedFile) {
    let Some(function) = node.child_by_field_name("function") else {
        return;
    };
    let callee = query::normalize(&node_text(function, source));

    out.relations.push(RelationFact {
        kind: EdgeKind::Calls,
        source_qualname: scope.enclosing(),
        target: callee.clone(),
        target_is_module: false,
    });

    let Some(arguments) = node.child_by_field_name("arguments") else {
        return;
    };
    let mut cursor = arguments.walk();
    for arg in arguments.named_children(&mut cursor) {
        let Some(rebuilt) = reconstruct(arg, source) else {
            continue;
        };
        if let Some(site) = call_site_from(&rebuilt, arg, scope, file_path) {
            let mut site = site;
            site.context.insert("callee".to_string(), callee.clone());
            site.context.insert(
                "snippet".to_string(),
                truncate(&query::normalize(&node_text(node, source)), 160),
            );
            out.call_sites.push(site);
        }
    }
}

fn handle_assignment(
    node: Node<'_>,
    scope: &Scope,
    source: &str,
    file_path: &str,
    out: &mut ExtractedFile,
) {
    let Some(right) = node.child_by_field_name("right") else {
        return;
    };
    // Calls on the right-hand side are covered by the call handler.
    if right.kind() == "call" {
        return;
    }
    let Some(rebuilt) = reconstruct(right, source) else {
        return;
    };
    if let Some(mut site) = call_site_from(&rebuilt, right, scope, file_path) {
        if let Some(left) = node.child_by_field_name("left") {
            site.context
                .insert("binding".to_string(), node_text(left, source));
        }
        out.call_sites.push(site);
    }
}

fn call_site_from(
    rebuilt: &Reconstructed,
    node: Node<'_>,
    scope: &Scope,
    file_path: &str,
) -> Option<CallSite> {
    let normalized = query::normalize(&rebuilt.text);
    let verb = query::infer_verb(&normalized);
    if verb == QueryVerb::Unknown {
        return None;
    }
    let mut context = BTreeMap::new();
    if rebuilt.dynamic {
        context.insert("dynamic_construction".to_string(), "true".to_string());
        context.insert(
            "bind_markers".to_string(),
            rebuilt.had_markers.to_string(),
        );
    }
    Some(CallSite {
        file_path: file_path.to_string(),
        line: line_of(node),
        method: scope.function.as_ref().map(|qualname| {
            qualname
                .rsplit('.')
                .next()
                .unwrap_or(qualname)
                .to_string()
        }),
        class: scope.class.clone(),
        query: normalized,
        verb,
        context,
    })
}

/// Rebuild the literal form of a string-producing expression.
///
/// Interpolation holes (f-string fields, `.format` holes, `%`-operator
/// conversions) are substituted so rule matching still sees the query
/// shape, and the site is marked dynamic.
fn reconstruct(node: Node<'_>, source: &str) -> Option<Reconstructed> {
    match node.kind() {
        "string" => {
            let mut text = String::new();
            let mut dynamic = false;
            let is_fstring = node
                .child(0)
                .map(|start| node_text(start, source).to_ascii_lowercase().contains('f'))
                .unwrap_or(false);
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                match child.kind() {
                    "string_content" => {
                        text.push_str(&node_text(child, source));
                    }
                    // Escapes such as \n act as whitespace in the query.
                    "escape_sequence" => text.push(' '),
                    "interpolation" => {
                        if is_fstring {
                            text.push('?');
                            dynamic = true;
                        } else {
                            text.push_str(&node_text(child, source));
                        }
                    }
                    _ => {}
                }
            }
            let had_markers = query::has_bind_markers(&text);
            Some(Reconstructed {
                text,
                dynamic,
                had_markers,
            })
        }
        "concatenated_string" => {
            // Adjacent literals are one logical literal, not dynamic
            // construction by themselves.
            let mut text = String::new();
            let mut dynamic = false;
            let mut had_markers = false;
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                let part = reconstruct(child, source)?;
                text.push_str(&part.text);
                dynamic |= part.dynamic;
                had_markers |= part.had_markers;
            }
            Some(Reconstructed {
                text,
                dynamic,
                had_markers,
            })
        }
        "parenthesized_expression" => {
            let mut cursor = node.walk();
            let inner = node.named_children(&mut cursor).next()?;
            reconstruct(inner, source)
        }
        "binary_operator" => {
            let operator = node
                .child_by_field_name("operator")
                .map(|op| node_text(op, source))?;
            let left = node.child_by_field_name("left")?;
            let right = node.child_by_field_name("right")?;
            match operator.as_str() {
                "+" => {
                    let left = reconstruct(left, source);
                    let right = reconstruct(right, source);
                    if left.is_none() && right.is_none() {
                        return None;
                    }
                    let mut text = String::new();
                    let mut had_markers = false;
                    for part in [left, right] {
                        match part {
                            Some(part) => {
                                text.push_str(&part.text);
                                had_markers |= part.had_markers;
                            }
                            None => text.push('?'),
                        }
                    }
                    Some(Reconstructed {
                        text,
                        dynamic: true,
                        had_markers,
                    })
                }
                "%" => {
                    let template = reconstruct(left, source)?;
                    let had_markers = query::has_bind_markers(
                        &percent_hole_re().replace_all(&template.text, ""),
                    );
                    let text = percent_hole_re()
                        .replace_all(&template.text, "?")
                        .into_owned();
                    Some(Reconstructed {
                        text,
                        dynamic: true,
                        had_markers,
                    })
                }
                _ => None,
            }
        }
        "call" => {
            // "...".format(args): reconstruct the receiver template.
            let function = node.child_by_field_name("function")?;
            if function.kind() != "attribute" {
                return None;
            }
            let attribute = function.child_by_field_name("attribute")?;
            if node_text(attribute, source) != "format" {
                return None;
            }
            let receiver = function.child_by_field_name("object")?;
            let template = reconstruct(receiver, source)?;
            let text = format_hole_re()
                .replace_all(&template.text, "?")
                .into_owned();
            Some(Reconstructed {
                text,
                dynamic: true,
                had_markers: template.had_markers,
            })
        }
        _ => None,
    }
}

fn percent_hole_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // %%-escapes aside, conversions like %s / %d / %(name)s are holes. The
    // bare %s doubles as the python driver's bind marker, so marker
    // detection runs on the hole-free template.
    RE.get_or_init(|| Regex::new(r"%\(\w+\)[sdf]|%[sdf]").unwrap())
}

fn format_hole_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").unwrap())
}

fn line_of(node: Node<'_>) -> i64 {
    node.start_position().row as i64 + 1
}

fn end_line_of(node: Node<'_>) -> i64 {
    node.end_position().row as i64 + 1
}

fn node_text(node: Node<'_>, source: &str) -> String {
    source
        .get(node.start_byte()..node.end_byte())
        .unwrap_or("")
        .to_string()
}

fn truncate(value: &str, max_bytes: usize) -> String {
    if value.len() <= max_bytes {
        return value.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}
