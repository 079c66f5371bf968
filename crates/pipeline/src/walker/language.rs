//! Language detection by extension, with a shebang heuristic for scripts.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Language tag of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Java,
    C,
    Cpp,
    CSharp,
    Php,
    Ruby,
    Go,
    Rust,
    Swift,
    Kotlin,
    Scala,
    R,
    Matlab,
    Bash,
    Sql,
    Html,
    Css,
    Scss,
    Sass,
    Xml,
    Json,
    Yaml,
    Toml,
    Ini,
    Markdown,
    Text,
    Unknown,
}

impl Language {
    /// Lowercase tag used in records and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Php => "php",
            Language::Ruby => "ruby",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Scala => "scala",
            Language::R => "r",
            Language::Matlab => "matlab",
            Language::Bash => "bash",
            Language::Sql => "sql",
            Language::Html => "html",
            Language::Css => "css",
            Language::Scss => "scss",
            Language::Sass => "sass",
            Language::Xml => "xml",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Ini => "ini",
            Language::Markdown => "markdown",
            Language::Text => "text",
            Language::Unknown => "unknown",
        }
    }

    pub fn from_extension(ext: &str) -> Language {
        match ext.to_lowercase().as_str() {
            "py" | "pyi" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" => Language::TypeScript,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" => Language::Cpp,
            "cs" => Language::CSharp,
            "php" => Language::Php,
            "rb" => Language::Ruby,
            "go" => Language::Go,
            "rs" => Language::Rust,
            "swift" => Language::Swift,
            "kt" | "kts" => Language::Kotlin,
            "scala" => Language::Scala,
            "r" => Language::R,
            "m" => Language::Matlab,
            "sh" | "bash" => Language::Bash,
            "sql" => Language::Sql,
            "html" | "htm" => Language::Html,
            "css" => Language::Css,
            "scss" => Language::Scss,
            "sass" => Language::Sass,
            "xml" => Language::Xml,
            "json" => Language::Json,
            "yaml" | "yml" => Language::Yaml,
            "toml" => Language::Toml,
            "ini" | "cfg" | "conf" => Language::Ini,
            "md" | "markdown" => Language::Markdown,
            "txt" => Language::Text,
            _ => Language::Unknown,
        }
    }

    /// Interpreter named on a `#!` line.
    pub fn from_shebang(first_line: &str) -> Language {
        let Some(rest) = first_line.strip_prefix("#!") else {
            return Language::Unknown;
        };
        // "/usr/bin/env python3 -u" -> "python3"
        let mut words = rest.split_whitespace();
        let mut program = words.next().unwrap_or_default();
        if program.ends_with("/env") {
            program = words.find(|w| !w.starts_with('-')).unwrap_or_default();
        }
        let name = program.rsplit('/').next().unwrap_or_default();

        if name.starts_with("python") {
            Language::Python
        } else if matches!(name, "bash" | "sh" | "zsh" | "dash") {
            Language::Bash
        } else if name.starts_with("ruby") {
            Language::Ruby
        } else if matches!(name, "node" | "nodejs" | "deno") {
            Language::JavaScript
        } else {
            Language::Unknown
        }
    }

    /// Detect from the path, falling back to the shebang of extension-less files.
    pub fn detect(path: &Path, text: &str) -> Language {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => Language::from_extension(ext),
            None => Language::from_shebang(text.lines().next().unwrap_or_default()),
        }
    }

    /// Parse a language tag ("python", "java") or an extension ("py").
    pub fn from_name(name: &str) -> Language {
        let lower = name.trim().to_lowercase();
        serde_json::from_value(serde_json::Value::String(lower.clone()))
            .unwrap_or_else(|_| Language::from_extension(&lower))
    }

    pub fn is_known(&self) -> bool {
        *self != Language::Unknown
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_table() {
        assert_eq!(Language::from_extension("PY"), Language::Python);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("yml"), Language::Yaml);
        assert_eq!(Language::from_extension("conf"), Language::Ini);
        assert_eq!(Language::from_extension("bin"), Language::Unknown);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Language::from_name("Python"), Language::Python);
        assert_eq!(Language::from_name("javascript"), Language::JavaScript);
        assert_eq!(Language::from_name("py"), Language::Python);
        assert_eq!(Language::from_name("klingon"), Language::Unknown);
    }

    #[test]
    fn test_shebang() {
        assert_eq!(
            Language::from_shebang("#!/usr/bin/env python3"),
            Language::Python
        );
        assert_eq!(Language::from_shebang("#!/bin/bash -e"), Language::Bash);
        assert_eq!(Language::from_shebang("#!/usr/bin/env -S node"), Language::JavaScript);
        assert_eq!(Language::from_shebang("print('hi')"), Language::Unknown);
    }

    #[test]
    fn test_detect_prefers_extension() {
        assert_eq!(
            Language::detect(Path::new("tool.rb"), "#!/usr/bin/env python"),
            Language::Ruby
        );
        assert_eq!(
            Language::detect(Path::new("bin/deploy"), "#!/bin/sh\necho hi"),
            Language::Bash
        );
    }

    #[test]
    fn test_serde_tag() {
        assert_eq!(
            serde_json::to_string(&Language::CSharp).unwrap(),
            "\"csharp\""
        );
    }
}
