//! CodeQA dataset answering.
//!
//! A split directory `<lang>/<split>/` holds `<split>.code`,
//! `<split>.question` and `<split>.answer`, aligned line by line. Each line
//! becomes one `codeqa-answer` task whose chunk is that line of the `.code`
//! file.

use crate::chunk::{calculate_hash, chunk_id, Chunk, Strategy};
use crate::context::ContextBundle;
use crate::task::GenerationTask;
use crate::walker::Language;
use locodata_core::{AppError, AppResult};
use serde_json::json;
use std::path::{Path, PathBuf};

/// Path recorded for code that did not come from a file.
pub const SNIPPET_PATH: &str = "<snippet>";

/// One aligned code/question/answer line.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeqaItem {
    /// 1-based line number in every file of the split
    pub line: usize,
    pub code: String,
    pub question: String,
    pub answer: String,
    pub start_byte: usize,
    pub end_byte: usize,
}

/// A loaded split.
#[derive(Debug, Clone)]
pub struct CodeqaDataset {
    pub split: String,
    pub language: Language,
    pub code_path: PathBuf,
    pub items: Vec<CodeqaItem>,
}

impl CodeqaDataset {
    /// Load `dir`, keeping at most `limit` items.
    pub fn load(dir: &Path, limit: Option<usize>) -> AppResult<Self> {
        let split = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::Config(format!("Invalid dataset directory {:?}", dir)))?
            .to_string();
        let language = dir
            .parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .map(Language::from_name)
            .unwrap_or(Language::Unknown);

        let code_path = dir.join(format!("{}.code", split));
        let code = read_split_file(&code_path)?;
        let questions = read_split_file(&dir.join(format!("{}.question", split)))?;
        let answers = read_split_file(&dir.join(format!("{}.answer", split)))?;

        let code_lines = lines_with_offsets(&code);
        let questions: Vec<&str> = questions.lines().collect();
        let answers: Vec<&str> = answers.lines().collect();
        if code_lines.len() != questions.len() || code_lines.len() != answers.len() {
            tracing::warn!(
                code = code_lines.len(),
                questions = questions.len(),
                answers = answers.len(),
                "Dataset split files differ in length, extra lines ignored"
            );
        }

        let take = limit.unwrap_or(usize::MAX);
        let items = code_lines
            .into_iter()
            .zip(questions)
            .zip(answers)
            .take(take)
            .enumerate()
            .map(|(i, (((text, start, end), question), answer))| CodeqaItem {
                line: i + 1,
                code: text.to_string(),
                question: question.trim().to_string(),
                answer: answer.trim().to_string(),
                start_byte: start,
                end_byte: end,
            })
            .collect::<Vec<_>>();

        tracing::info!(
            split = %split,
            language = %language,
            items = items.len(),
            "Loaded dataset split"
        );

        Ok(Self {
            split,
            language,
            code_path,
            items,
        })
    }

    /// One `codeqa-answer` task per item, ground truth carried as extra metadata.
    pub fn tasks(&self) -> Vec<GenerationTask> {
        let path = self.code_path.to_string_lossy().replace('\\', "/");
        self.items
            .iter()
            .map(|item| {
                let chunk = line_chunk(&path, self.language, item);
                GenerationTask::codeqa(ContextBundle::bare(chunk), item.question.clone())
                    .with_extra(json!({
                        "groundTruth": item.answer,
                        "split": self.split,
                        "language": self.language.as_str(),
                        "line": item.line,
                    }))
            })
            .collect()
    }
}

fn read_split_file(path: &Path) -> AppResult<String> {
    if !path.is_file() {
        return Err(AppError::Config(format!("Dataset file {:?} not found", path)));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Lines without terminators, with the byte range of their content.
fn lines_with_offsets(text: &str) -> Vec<(&str, usize, usize)> {
    let mut offset = 0;
    text.split_inclusive('\n')
        .map(|raw| {
            let start = offset;
            offset += raw.len();
            let line = raw.trim_end_matches(['\n', '\r']);
            (line, start, start + line.len())
        })
        .collect()
}

fn line_chunk(path: &str, language: Language, item: &CodeqaItem) -> Chunk {
    Chunk {
        id: chunk_id(path, &(item.start_byte..item.end_byte), &item.code),
        path: path.to_string(),
        ordinal: item.line - 1,
        start_line: item.line,
        end_line: item.line,
        start_byte: item.start_byte,
        end_byte: item.end_byte,
        text: item.code.clone(),
        symbol: None,
        signature: None,
        strategy: Strategy::Fixed,
        oversized: false,
        language,
        hash: calculate_hash(&item.code),
    }
}

/// A standalone code/question task with no repository behind it.
pub fn snippet_task(code: &str, question: &str, language: Language) -> GenerationTask {
    let lines = code.lines().count().max(1);
    let chunk = Chunk {
        id: chunk_id(SNIPPET_PATH, &(0..code.len()), code),
        path: SNIPPET_PATH.to_string(),
        ordinal: 0,
        start_line: 1,
        end_line: lines,
        start_byte: 0,
        end_byte: code.len(),
        text: code.to_string(),
        symbol: None,
        signature: None,
        strategy: Strategy::Fixed,
        oversized: false,
        language,
        hash: calculate_hash(code),
    };
    GenerationTask::codeqa(ContextBundle::bare(chunk), question)
}

/// One task per question about the same snippet, numbered from 1 in
/// `questionIndex`.
pub fn snippet_tasks(code: &str, questions: &[String], language: Language) -> Vec<GenerationTask> {
    questions
        .iter()
        .enumerate()
        .map(|(i, question)| {
            snippet_task(code, question, language).with_extra(json!({ "questionIndex": i + 1 }))
        })
        .collect()
}
