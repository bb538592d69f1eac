use crate::error::CoreError;
use crate::model::{CallSite, EdgeKind, NodeKind};
use std::path::Path;

pub mod fallback;
pub mod python;
pub mod query;
pub mod scan;

/// A structural symbol observed in a source file.
#[derive(Debug, Clone)]
pub struct SymbolFact {
    pub kind: NodeKind,
    pub name: String,
    /// Qualified within the file: `Class`, `Class.method` or `function`.
    pub qualname: String,
    pub line: i64,
    pub end_line: i64,
}

/// A structural relationship observed in a source file.
#[derive(Debug, Clone)]
pub struct RelationFact {
    pub kind: EdgeKind,
    /// Enclosing symbol qualname; `None` means file scope.
    pub source_qualname: Option<String>,
    /// Either a dotted module path (imports) or a callee expression.
    pub target: String,
    pub target_is_module: bool,
}

/// Everything extracted from one file. Call-sites feed the detector
/// registry; symbols and relations feed the graph builder. Both come from
/// the same pass, so detection and graph building cannot diverge.
#[derive(Debug, Default)]
pub struct ExtractedFile {
    pub call_sites: Vec<CallSite>,
    pub symbols: Vec<SymbolFact>,
    pub relations: Vec<RelationFact>,
}

/// Facade over the structural extractor and the line scanner.
pub struct Extractor {
    python: python::PythonExtractor,
    scanner: fallback::FallbackScanner,
}

impl Extractor {
    pub fn new() -> Result<Self, CoreError> {
        Ok(Self {
            python: python::PythonExtractor::new()?,
            scanner: fallback::FallbackScanner::new(),
        })
    }

    /// Extract call-sites and structural facts from one file.
    ///
    /// The structural path is used where a grammar exists; a failed parse
    /// falls back to the line scanner instead of aborting the file.
    /// Call-sites come back in source order.
    pub fn extract(&mut self, rel_path: &str, source: &str) -> ExtractedFile {
        let language = scan::language_for_path(Path::new(rel_path)).unwrap_or("unknown");
        if scan::is_structural_language(language) {
            if let Some(mut extracted) = self.python.extract(rel_path, source) {
                extracted
                    .call_sites
                    .sort_by_key(|site| site.line);
                return extracted;
            }
            eprintln!("cqlint: structural parse failed for {rel_path}, falling back to line scan");
        }
        ExtractedFile {
            call_sites: self.scanner.scan(rel_path, source),
            symbols: Vec::new(),
            relations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QueryVerb;

    #[test]
    fn python_goes_through_structural_path() {
        let mut extractor = Extractor::new().unwrap();
        let extracted = extractor.extract(
            "svc.py",
            "def f(s):\n    s.execute(\"SELECT a FROM b WHERE id = ?\")\n",
        );
        assert_eq!(extracted.call_sites.len(), 1);
        assert!(!extracted.symbols.is_empty());
    }

    #[test]
    fn other_languages_use_line_scan() {
        let mut extractor = Extractor::new().unwrap();
        let extracted = extractor.extract(
            "Dao.java",
            "class Dao { void f() { session.execute(\"DELETE FROM t WHERE id = ?\"); } }\n",
        );
        assert_eq!(extracted.call_sites.len(), 1);
        assert_eq!(extracted.call_sites[0].verb, QueryVerb::Delete);
        assert!(extracted.symbols.is_empty());
    }

    #[test]
    fn call_sites_are_in_source_order() {
        let mut extractor = Extractor::new().unwrap();
        let extracted = extractor.extract(
            "multi.py",
            concat!(
                "def a(s):\n",
                "    s.execute(\"SELECT x FROM t1 WHERE id = ?\")\n",
                "def b(s):\n",
                "    s.execute(\"SELECT y FROM t2 WHERE id = ?\")\n",
            ),
        );
        assert_eq!(extracted.call_sites.len(), 2);
        assert!(extracted.call_sites[0].line < extracted.call_sites[1].line);
    }
}
