//! Chunk cascade properties over a mixed corpus.

use crate::chunk::{Chunk, Chunker};
use crate::walker::Language;
use locodata_core::ChunkingConfig;
use std::collections::HashSet;

fn chunker(max_lines: usize, max_chars: usize) -> Chunker {
    Chunker::new(&ChunkingConfig {
        max_lines,
        max_chars,
    })
    .unwrap()
}

fn rust_source() -> String {
    let mut text = String::from("use std::fmt;\n\n/// A point.\n#[derive(Debug)]\npub struct Point {\n    x: i32,\n    y: i32,\n}\n\n");
    text.push_str("impl Point {\n");
    for i in 0..6 {
        text.push_str(&format!(
            "    pub fn shift_{i}(&mut self) {{\n        self.x += {i};\n        self.y -= {i};\n    }}\n\n"
        ));
    }
    text.push_str("}\n\nimpl fmt::Display for Point {\n    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {\n        write!(f, \"({}, {})\", self.x, self.y)\n    }\n}\n");
    text
}

fn python_source() -> String {
    let mut text = String::from("import os\n\n\n@cached\ndef load(path):\n");
    for i in 0..25 {
        text.push_str(&format!("    value_{i} = os.path.join(path, '{i}')\n"));
    }
    text.push_str("\n\nclass Store:\n    def get(self, key):\n        return self.data[key]\n\n    def put(self, key, value):\n        self.data[key] = value\n");
    text
}

fn corpus() -> Vec<(&'static str, Language, String)> {
    vec![
        ("src/point.rs", Language::Rust, rust_source()),
        ("app/load.py", Language::Python, python_source()),
        (
            "docs/guide.md",
            Language::Markdown,
            "# Guide\n\nIntro text.\n\n## Install\n\n```sh\n# not a heading\ncargo build\n```\n\n## Use\n\nRun it.\n".to_string(),
        ),
        (
            "web/min.js",
            Language::JavaScript,
            format!("{}\n", "var a=1;".repeat(120)),
        ),
        (
            "notes.txt",
            Language::Text,
            (1..=40).map(|i| format!("line {i}\n")).collect(),
        ),
        ("crlf.py", Language::Python, "def a():\r\n    return 1\r\n\r\ndef b():\r\n    return 2".to_string()),
        ("unicode.py", Language::Python, "def grüße():\n    return 'héllo wörld ✓'\n".to_string()),
    ]
}

fn assert_partition(path: &str, text: &str, chunks: &[Chunk]) {
    let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(joined, text, "{} chunks do not reassemble the file", path);

    let total_lines = text.lines().count();
    assert_eq!(chunks.first().map(|c| c.start_line), Some(1), "{}", path);
    assert_eq!(chunks.last().map(|c| c.end_line), Some(total_lines), "{}", path);
    assert_eq!(chunks.first().map(|c| c.start_byte), Some(0), "{}", path);
    assert_eq!(chunks.last().map(|c| c.end_byte), Some(text.len()), "{}", path);

    for (i, pair) in chunks.windows(2).enumerate() {
        assert_eq!(pair[0].end_line + 1, pair[1].start_line, "{} line gap after chunk {}", path, i);
        assert_eq!(pair[0].end_byte, pair[1].start_byte, "{} byte gap after chunk {}", path, i);
    }
    for (ordinal, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.ordinal, ordinal);
        assert_eq!(&text[chunk.start_byte..chunk.end_byte], chunk.text);
    }

    let ids: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids.len(), chunks.len(), "{} has duplicate chunk ids", path);
}

fn content_lines(text: &str) -> Vec<&str> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].to_vec(),
        _ => Vec::new(),
    }
}

#[test]
fn test_chunks_partition_every_file() {
    let chunker = chunker(12, 600);
    for (path, language, text) in corpus() {
        let chunks = chunker.chunk_text(path, language, &text).unwrap();
        assert!(!chunks.is_empty(), "{} produced no chunks", path);
        assert_partition(path, &text, &chunks);
    }
}

#[test]
fn test_chunks_respect_budget_unless_flagged() {
    let chunker = chunker(12, 600);
    for (path, language, text) in corpus() {
        for chunk in chunker.chunk_text(path, language, &text).unwrap() {
            if chunk.oversized {
                continue;
            }
            // blank lines merged onto the edges do not count
            let content = content_lines(&chunk.text);
            assert!(content.len() <= 12, "{} {}", path, chunk.location());
            let chars: usize = content.iter().map(|l| l.chars().count()).sum();
            assert!(chars <= 600, "{} {}", path, chunk.location());
        }
    }
}

#[test]
fn test_chunking_is_idempotent() {
    let chunker = chunker(12, 600);
    for (path, language, text) in corpus() {
        let first = chunker.chunk_text(path, language, &text).unwrap();
        let second = chunker.chunk_text(path, language, &text).unwrap();
        assert_eq!(first, second, "{}", path);
    }
}

#[test]
fn test_python_functions_become_named_chunks() {
    let mut text = String::from("def alpha(x):\n");
    for i in 0..19 {
        text.push_str(&format!("    x = x + {}\n", i));
    }
    text.push_str("def beta(y):\n");
    for i in 0..29 {
        text.push_str(&format!("    y = y * {}\n", i));
    }
    assert_eq!(text.lines().count(), 50);

    let chunks = chunker(30, 100_000)
        .chunk_text("calc.py", Language::Python, &text)
        .unwrap();

    assert_eq!(chunks.len(), 2);
    assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 20));
    assert_eq!((chunks[1].start_line, chunks[1].end_line), (21, 50));
    assert_eq!(chunks[0].symbol.as_deref(), Some("alpha"));
    assert_eq!(chunks[1].symbol.as_deref(), Some("beta"));
}

#[test]
fn test_editing_one_function_keeps_other_ids() {
    let before = "def a():\n    return 1\n\ndef b():\n    return 2\n";
    let after = "def a():\n    return 1\n\ndef b():\n    return 2 + 2\n";
    let chunker = chunker(3, 1000);

    let old = chunker.chunk_text("m.py", Language::Python, before).unwrap();
    let new = chunker.chunk_text("m.py", Language::Python, after).unwrap();

    assert_eq!(old.len(), 2);
    assert_eq!(old[0].id, new[0].id);
    assert_ne!(old[1].id, new[1].id);
}

#[test]
fn test_same_text_in_other_file_gets_other_id() {
    let text = "fn main() {}\n";
    let chunker = chunker(10, 1000);
    let a = chunker.chunk_text("a.rs", Language::Rust, text).unwrap();
    let b = chunker.chunk_text("b.rs", Language::Rust, text).unwrap();
    assert_ne!(a[0].id, b[0].id);
    assert_eq!(a[0].hash, b[0].hash);
}
