use anyhow::{Context, Result};
use blake3::Hasher;
use ignore::WalkBuilder;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub hash: String,
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct LanguageSpec {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    /// Whether a structural (tree-sitter) extractor exists for the
    /// language; everything else goes through the line scanner.
    pub structural: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub no_ignore: bool,
}

impl ScanOptions {
    pub fn new(no_ignore: bool) -> Self {
        Self { no_ignore }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { no_ignore: false }
    }
}

static LANGUAGE_SPECS: &[LanguageSpec] = &[
    LanguageSpec {
        name: "python",
        extensions: &["py", "pyi"],
        structural: true,
    },
    LanguageSpec {
        name: "java",
        extensions: &["java"],
        structural: false,
    },
    LanguageSpec {
        name: "javascript",
        extensions: &["js", "jsx", "mjs", "cjs"],
        structural: false,
    },
    LanguageSpec {
        name: "typescript",
        extensions: &["ts", "tsx", "mts", "cts"],
        structural: false,
    },
    LanguageSpec {
        name: "go",
        extensions: &["go"],
        structural: false,
    },
    LanguageSpec {
        name: "csharp",
        extensions: &["cs"],
        structural: false,
    },
    LanguageSpec {
        name: "ruby",
        extensions: &["rb"],
        structural: false,
    },
    LanguageSpec {
        name: "scala",
        extensions: &["scala"],
        structural: false,
    },
    LanguageSpec {
        name: "kotlin",
        extensions: &["kt", "kts"],
        structural: false,
    },
    LanguageSpec {
        name: "cql",
        extensions: &["cql"],
        structural: false,
    },
];

pub fn language_specs() -> &'static [LanguageSpec] {
    LANGUAGE_SPECS
}

pub fn scan_repo(repo_root: &Path) -> Result<Vec<ScannedFile>> {
    scan_repo_with_options(repo_root, ScanOptions::default())
}

pub fn scan_repo_with_options(repo_root: &Path, options: ScanOptions) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();
    let mut builder = WalkBuilder::new(repo_root);
    if options.no_ignore {
        builder
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false);
    } else {
        builder
            .ignore(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .require_git(false);
    }
    let walker = builder
        .hidden(false)
        .filter_entry(|entry| !is_ignored_entry(entry))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                eprintln!("cqlint: walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let language = match detect_language(path) {
            Some(value) => value,
            None => continue,
        };
        let rel_path = normalize_rel_path(repo_root, path)?;
        let hash = hash_file(path).with_context(|| format!("hash {}", path.display()))?;
        files.push(ScannedFile {
            rel_path,
            abs_path: path.to_path_buf(),
            hash,
            language: language.to_string(),
        });
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

fn is_ignored_entry(entry: &ignore::DirEntry) -> bool {
    match entry.file_name() {
        name if name == OsStr::new(".cqlint") => true,
        name if name == OsStr::new(".git") => true,
        _ => false,
    }
}

fn detect_language(path: &Path) -> Option<&'static str> {
    let ext = path.extension().and_then(|ext| ext.to_str())?;
    for spec in LANGUAGE_SPECS {
        if spec.extensions.iter().any(|candidate| *candidate == ext) {
            return Some(spec.name);
        }
    }
    None
}

pub fn language_for_path(path: &Path) -> Option<&'static str> {
    detect_language(path)
}

pub fn is_structural_language(language: &str) -> bool {
    LANGUAGE_SPECS
        .iter()
        .any(|spec| spec.name == language && spec.structural)
}

pub fn normalize_rel_path(repo_root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(repo_root).with_context(|| {
        format!(
            "strip prefix {} from {}",
            repo_root.display(),
            path.display()
        )
    })?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|comp| comp.as_os_str().to_str().map(|s| s.to_string()))
        .collect();
    Ok(parts.join("/"))
}

fn hash_file(path: &Path) -> Result<String> {
    let data = fs::read(path)?;
    let mut hasher = Hasher::new();
    hasher.update(&data);
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_detection_by_extension() {
        assert_eq!(language_for_path(Path::new("app/service.py")), Some("python"));
        assert_eq!(language_for_path(Path::new("Dao.java")), Some("java"));
        assert_eq!(language_for_path(Path::new("schema.cql")), Some("cql"));
        assert_eq!(language_for_path(Path::new("README.md")), None);
    }

    #[test]
    fn only_python_is_structural() {
        assert!(is_structural_language("python"));
        assert!(!is_structural_language("java"));
        assert!(!is_structural_language("unknown"));
    }

    #[test]
    fn scan_finds_sources_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("a.py"), "y = 2\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip me\n").unwrap();
        let files = scan_repo(dir.path()).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.py"]);
        assert_eq!(files[0].language, "python");
        assert_eq!(files[0].hash.len(), 64);
    }
}
