//! Per-language symbol heuristics.
//!
//! Each profile names how a symbol's extent is found (`Boundary`), which
//! lines declare a symbol, and which lines directly above a declaration
//! belong to it (doc comments, decorators, attributes).

use crate::walker::Language;
use locodata_core::{AppError, AppResult};
use regex::Regex;
use std::collections::HashMap;

/// How the end of a symbol is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Body is the balanced `{ ... }` following the declaration
    Braces,
    /// Body is every following line indented deeper than the declaration,
    /// plus an optional closing keyword line at the same indent
    Indentation { closing: Option<&'static str> },
    /// Markdown: a section runs to the next heading
    Headings,
}

/// What the brace lexer treats as comments and strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexRules {
    pub slash_comments: bool,
    pub hash_comments: bool,
    pub block_comments: bool,
    /// Backtick strings, possibly spanning lines
    pub backtick_strings: bool,
    /// `'a` is a lifetime or label, not an unterminated literal
    pub lifetimes: bool,
}

const C_LIKE: LexRules = LexRules {
    slash_comments: true,
    hash_comments: false,
    block_comments: true,
    backtick_strings: false,
    lifetimes: false,
};

const HASH_ONLY: LexRules = LexRules {
    slash_comments: false,
    hash_comments: true,
    block_comments: false,
    backtick_strings: false,
    lifetimes: false,
};

/// Words that look like a declaration name but start a statement.
const STOPWORDS: [&str; 16] = [
    "if", "else", "for", "while", "switch", "return", "new", "catch", "throw", "do", "try",
    "case", "sizeof", "elif", "when", "await",
];

#[derive(Debug)]
pub struct LanguageProfile {
    pub boundary: Boundary,
    pub lex: LexRules,
    declarations: Vec<Regex>,
    leading: &'static [&'static str],
}

impl LanguageProfile {
    fn new(
        boundary: Boundary,
        lex: LexRules,
        patterns: &[&str],
        leading: &'static [&'static str],
    ) -> AppResult<Self> {
        let declarations = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    AppError::Other(format!("Invalid declaration pattern {}: {}", p, e))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            boundary,
            lex,
            declarations,
            leading,
        })
    }

    /// Name declared on `line`, if any.
    pub fn declared_name(&self, line: &str) -> Option<String> {
        for pattern in &self.declarations {
            if let Some(caps) = pattern.captures(line) {
                let name = caps.name("name")?.as_str().trim();
                let first_word = line.split_whitespace().next().unwrap_or_default();
                if name.is_empty() || STOPWORDS.contains(&name) || STOPWORDS.contains(&first_word)
                {
                    continue;
                }
                return Some(name.to_string());
            }
        }
        None
    }

    /// Whether `line` is a comment, decorator or attribute that belongs to
    /// the declaration below it.
    pub fn is_leading(&self, line: &str) -> bool {
        let trimmed = line.trim_start();
        self.leading.iter().any(|prefix| trimmed.starts_with(prefix))
    }
}

const IDENT: &str = r"[A-Za-z_$][\w$]*";

fn rust() -> AppResult<LanguageProfile> {
    LanguageProfile::new(
        Boundary::Braces,
        LexRules {
            lifetimes: true,
            ..C_LIKE
        },
        &[
            r#"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:(?:const|async|unsafe|extern(?:\s+"[^"]*")?)\s+)*fn\s+(?P<name>[A-Za-z_]\w*)"#,
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|union|mod)\s+(?P<name>[A-Za-z_]\w*)",
            r"^\s*(?:unsafe\s+)?impl\b(?:\s*<[^>]*>)?\s+(?:[^{]*?\s+for\s+)?(?P<name>[A-Za-z_][\w:]*)",
            r"^\s*macro_rules!\s+(?P<name>[A-Za-z_]\w*)",
        ],
        &["///", "//", "#[", "#!", "/*", "*"],
    )
}

fn python() -> AppResult<LanguageProfile> {
    LanguageProfile::new(
        Boundary::Indentation { closing: None },
        LexRules::default(),
        &[
            r"^\s*(?:async\s+)?def\s+(?P<name>[A-Za-z_]\w*)",
            r"^\s*class\s+(?P<name>[A-Za-z_]\w*)",
        ],
        &["@", "#"],
    )
}

fn ruby() -> AppResult<LanguageProfile> {
    LanguageProfile::new(
        Boundary::Indentation {
            closing: Some("end"),
        },
        LexRules::default(),
        &[
            r"^\s*def\s+(?P<name>(?:self\.)?[A-Za-z_]\w*[?!=]?)",
            r"^\s*(?:class|module)\s+(?P<name>[A-Z][\w:]*)",
        ],
        &["#"],
    )
}

fn javascript(typescript: bool) -> AppResult<LanguageProfile> {
    let function = format!(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(?P<name>{IDENT})"
    );
    let class = format!(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(?P<name>{IDENT})"
    );
    let arrow = format!(
        r"^\s*(?:export\s+)?(?:const|let|var)\s+(?P<name>{IDENT})\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=]+)?=>|{IDENT}\s*=>)"
    );
    let method = format!(
        r"^\s+(?:(?:public|private|protected|static|async|readonly|get|set)\s+)*(?P<name>{IDENT})\s*\([^;]*\)\s*(?::[^{{]+)?\{{"
    );
    let mut patterns = vec![function, class, arrow, method];
    if typescript {
        patterns.push(format!(
            r"^\s*(?:export\s+)?(?:declare\s+)?(?:interface|enum|namespace)\s+(?P<name>{IDENT})"
        ));
    }
    let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();

    LanguageProfile::new(
        Boundary::Braces,
        LexRules {
            backtick_strings: true,
            ..C_LIKE
        },
        &patterns,
        &["//", "/*", "*", "@"],
    )
}

fn go() -> AppResult<LanguageProfile> {
    LanguageProfile::new(
        Boundary::Braces,
        LexRules {
            backtick_strings: true,
            ..C_LIKE
        },
        &[
            r"^func\s+(?:\([^)]*\)\s*)?(?P<name>[A-Za-z_]\w*)",
            r"^type\s+(?P<name>[A-Za-z_]\w*)\s+(?:struct|interface)",
        ],
        &["//"],
    )
}

fn java() -> AppResult<LanguageProfile> {
    LanguageProfile::new(
        Boundary::Braces,
        C_LIKE,
        &[
            r"^\s*(?:(?:public|protected|private|static|final|abstract|sealed|non-sealed|strictfp)\s+)*(?:class|interface|enum|record|@interface)\s+(?P<name>[A-Za-z_]\w*)",
            r"^\s*(?:(?:public|protected|private|static|final|abstract|synchronized|native|default)\s+)*(?:<[^>]+>\s+)?[\w<>\[\],.?]+\s+(?P<name>[A-Za-z_]\w*)\s*\([^;]*$",
        ],
        &["//", "/*", "*", "@"],
    )
}

fn csharp() -> AppResult<LanguageProfile> {
    LanguageProfile::new(
        Boundary::Braces,
        C_LIKE,
        &[
            r"^\s*(?:(?:public|private|protected|internal|static|sealed|abstract|partial|readonly|unsafe)\s+)*(?:class|interface|struct|enum|record|namespace)\s+(?P<name>[A-Za-z_][\w.]*)",
            r"^\s*(?:(?:public|private|protected|internal|static|virtual|override|abstract|async|sealed|extern|unsafe)\s+)*[\w<>\[\],.?]+\s+(?P<name>[A-Za-z_]\w*)\s*\([^;]*$",
        ],
        &["//", "/*", "*", "["],
    )
}

fn kotlin() -> AppResult<LanguageProfile> {
    LanguageProfile::new(
        Boundary::Braces,
        C_LIKE,
        &[
            r"^\s*(?:(?:public|private|protected|internal|open|abstract|sealed|data|enum|inner|override|suspend|inline|annotation)\s+)*(?:class|interface|object|fun)\s+(?:<[^>]+>\s+)?(?:[\w.]+\.)?(?P<name>[A-Za-z_]\w*)",
        ],
        &["//", "/*", "*", "@"],
    )
}

fn scala() -> AppResult<LanguageProfile> {
    LanguageProfile::new(
        Boundary::Braces,
        C_LIKE,
        &[
            r"^\s*(?:(?:private|protected|final|sealed|abstract|implicit|override|case|lazy)\s+)*(?:class|trait|object|def)\s+(?P<name>[A-Za-z_]\w*)",
        ],
        &["//", "/*", "*", "@"],
    )
}

fn swift() -> AppResult<LanguageProfile> {
    LanguageProfile::new(
        Boundary::Braces,
        C_LIKE,
        &[
            r"^\s*(?:(?:public|private|fileprivate|internal|open|final|static|class|override|mutating)\s+)*(?:func|class|struct|enum|protocol|extension|actor)\s+(?P<name>[A-Za-z_]\w*)",
        ],
        &["//", "/*", "*", "@"],
    )
}

fn c_family() -> AppResult<LanguageProfile> {
    LanguageProfile::new(
        Boundary::Braces,
        C_LIKE,
        &[
            r"^\s*(?:template\s*<[^>]*>\s*)?(?:class|struct|union|enum(?:\s+class)?|namespace)\s+(?P<name>[A-Za-z_]\w*)",
            r"^(?:[\w:*&<>,~]+\s+)+\**&?(?P<name>[A-Za-z_~][\w:~]*)\s*\([^;]*$",
            r"^(?P<name>[A-Za-z_]\w*::~?[A-Za-z_]\w*)\s*\(",
        ],
        &["//", "/*", "*", "template"],
    )
}

fn php() -> AppResult<LanguageProfile> {
    LanguageProfile::new(
        Boundary::Braces,
        LexRules {
            hash_comments: true,
            ..C_LIKE
        },
        &[
            r"^\s*(?:(?:public|private|protected|static|final|abstract)\s+)*function\s+&?(?P<name>[A-Za-z_]\w*)",
            r"^\s*(?:(?:final|abstract|readonly)\s+)*(?:class|interface|trait|enum)\s+(?P<name>[A-Za-z_]\w*)",
        ],
        &["//", "/*", "*", "#["],
    )
}

fn bash() -> AppResult<LanguageProfile> {
    LanguageProfile::new(
        Boundary::Braces,
        HASH_ONLY,
        &[
            r"^\s*function\s+(?P<name>[A-Za-z_][\w-]*)",
            r"^\s*(?P<name>[A-Za-z_][\w-]*)\s*\(\)",
        ],
        &["#"],
    )
}

fn r_lang() -> AppResult<LanguageProfile> {
    LanguageProfile::new(
        Boundary::Braces,
        HASH_ONLY,
        &[r"^\s*(?P<name>[A-Za-z_.][\w.]*)\s*(?:<-|=)\s*function\b"],
        &["#"],
    )
}

fn markdown() -> AppResult<LanguageProfile> {
    LanguageProfile::new(
        Boundary::Headings,
        LexRules::default(),
        &[r"^#{1,6}\s+(?P<name>.*?)\s*#*\s*$"],
        &[],
    )
}

/// Compile the profile table.
pub fn build_profiles() -> AppResult<HashMap<Language, LanguageProfile>> {
    let mut profiles = HashMap::new();
    profiles.insert(Language::Rust, rust()?);
    profiles.insert(Language::Python, python()?);
    profiles.insert(Language::Ruby, ruby()?);
    profiles.insert(Language::JavaScript, javascript(false)?);
    profiles.insert(Language::TypeScript, javascript(true)?);
    profiles.insert(Language::Go, go()?);
    profiles.insert(Language::Java, java()?);
    profiles.insert(Language::CSharp, csharp()?);
    profiles.insert(Language::Kotlin, kotlin()?);
    profiles.insert(Language::Scala, scala()?);
    profiles.insert(Language::Swift, swift()?);
    profiles.insert(Language::C, c_family()?);
    profiles.insert(Language::Cpp, c_family()?);
    profiles.insert(Language::Php, php()?);
    profiles.insert(Language::Bash, bash()?);
    profiles.insert(Language::R, r_lang()?);
    profiles.insert(Language::Markdown, markdown()?);
    Ok(profiles)
}
