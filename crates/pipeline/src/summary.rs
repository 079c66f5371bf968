//! Repository overview: language mix, detected stack, manifest files.

use crate::walker::{Language, SourceFile};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Manifest files reported when present at the repository root.
const MANIFESTS: [&str; 8] = [
    "requirements.txt",
    "package.json",
    "pom.xml",
    "build.gradle",
    "Cargo.toml",
    "go.mod",
    "Gemfile",
    "composer.json",
];

/// Extra dependency files scanned for stack indicators.
const DEPENDENCY_FILES: [&str; 3] = ["pyproject.toml", "setup.py", "Pipfile"];

/// Stack indicator: name, path markers, dependency markers.
///
/// Path markers match anywhere in a lowercased relative path. Dependency
/// markers match the lowercased text of manifest and dependency files.
type Indicator = (&'static str, &'static [&'static str], &'static [&'static str]);

const FRAMEWORKS: [Indicator; 11] = [
    ("Django", &["manage.py"], &["django"]),
    ("Flask", &[], &["flask"]),
    ("FastAPI", &[], &["fastapi", "uvicorn"]),
    ("Express", &[], &["\"express\""]),
    ("React", &[".jsx", ".tsx"], &["\"react\""]),
    ("Vue", &[".vue"], &["\"vue\""]),
    ("Spring", &[], &["springframework", "spring-boot"]),
    ("Rails", &["config/routes.rb"], &["rails"]),
    ("Laravel", &["artisan"], &["laravel/framework"]),
    ("Axum", &[], &["axum"]),
    ("Tokio", &[], &["tokio"]),
];

const DATABASES: [Indicator; 5] = [
    ("SQLite", &[".db", ".sqlite"], &["sqlite"]),
    ("PostgreSQL", &[], &["postgres", "psycopg"]),
    ("MySQL", &[], &["mysql"]),
    ("MongoDB", &[], &["mongo"]),
    ("Redis", &[], &["redis"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageCount {
    pub language: Language,
    pub files: usize,
}

/// Short structured description of a repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSummary {
    pub name: String,
    pub total_files: usize,
    /// Sorted by file count, most common first
    pub languages: Vec<LanguageCount>,
    pub average_file_size: u64,
    pub frameworks: Vec<String>,
    pub databases: Vec<String>,
    pub manifests: Vec<String>,
}

impl RepoSummary {
    /// Plain-text form used in prompts.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Repository: {}\nFiles: {} (average {} bytes)\n",
            self.name, self.total_files, self.average_file_size
        );

        if !self.languages.is_empty() {
            let langs: Vec<String> = self
                .languages
                .iter()
                .map(|l| format!("{} ({})", l.language, l.files))
                .collect();
            out.push_str(&format!("Languages: {}\n", langs.join(", ")));
        }
        if !self.frameworks.is_empty() {
            out.push_str(&format!("Frameworks: {}\n", self.frameworks.join(", ")));
        }
        if !self.databases.is_empty() {
            out.push_str(&format!("Databases: {}\n", self.databases.join(", ")));
        }
        if !self.manifests.is_empty() {
            out.push_str(&format!("Configuration files: {}\n", self.manifests.join(", ")));
        }

        out.trim_end().to_string()
    }
}

/// Accumulates a summary while files stream past.
#[derive(Debug, Default)]
pub struct SummaryBuilder {
    name: String,
    counts: BTreeMap<Language, usize>,
    total_size: u64,
    files: usize,
    frameworks: BTreeSet<&'static str>,
    databases: BTreeSet<&'static str>,
    manifests: BTreeSet<String>,
}

impl SummaryBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn observe(&mut self, file: &SourceFile) {
        self.files += 1;
        self.total_size += file.size;
        *self.counts.entry(file.language).or_insert(0) += 1;

        let file_name = file.path.rsplit('/').next().unwrap_or(&file.path);
        let is_manifest = MANIFESTS.contains(&file_name);
        if is_manifest && !file.path.contains('/') {
            self.manifests.insert(file_name.to_string());
        }

        let path = file.path.to_lowercase();
        let text = (is_manifest || DEPENDENCY_FILES.contains(&file_name))
            .then(|| file.text.to_lowercase());

        detect(&FRAMEWORKS, &path, text.as_deref(), &mut self.frameworks);
        detect(&DATABASES, &path, text.as_deref(), &mut self.databases);
    }

    pub fn finish(self) -> RepoSummary {
        let mut languages: Vec<LanguageCount> = self
            .counts
            .into_iter()
            .map(|(language, files)| LanguageCount { language, files })
            .collect();
        // Stable sort keeps the tag order among equal counts
        languages.sort_by(|a, b| b.files.cmp(&a.files));

        let average_file_size = if self.files > 0 {
            self.total_size / self.files as u64
        } else {
            0
        };

        let manifests = MANIFESTS
            .iter()
            .filter(|m| self.manifests.contains(**m))
            .map(|m| m.to_string())
            .collect();

        RepoSummary {
            name: self.name,
            total_files: self.files,
            languages,
            average_file_size,
            frameworks: self.frameworks.into_iter().map(String::from).collect(),
            databases: self.databases.into_iter().map(String::from).collect(),
            manifests,
        }
    }
}

fn detect(
    indicators: &[Indicator],
    path: &str,
    text: Option<&str>,
    found: &mut BTreeSet<&'static str>,
) {
    for (name, path_markers, dependency_markers) in indicators {
        let by_path = path_markers.iter().any(|m| path.contains(m));
        let by_dependency = text.is_some_and(|t| dependency_markers.iter().any(|m| t.contains(m)));
        if by_path || by_dependency {
            found.insert(*name);
        }
    }
}
