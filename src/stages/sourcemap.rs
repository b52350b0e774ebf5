// src/stages/sourcemap.rs

//! Line-level source maps (revision 3).
//!
//! Each generated line maps to column 0 of one original line, which is
//! enough for browser devtools to show the right file and line.

use serde::Serialize;

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineMapping {
    source: usize,
    original_line: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SourceMapBuilder {
    file: String,
    sources: Vec<String>,
    sources_content: Vec<String>,
    lines: Vec<Option<LineMapping>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceMapJson<'a> {
    version: u8,
    file: &'a str,
    sources: &'a [String],
    sources_content: &'a [String],
    names: [&'a str; 0],
    mappings: String,
}

impl SourceMapBuilder {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    /// Register an original source; returns its index.
    pub fn add_source(&mut self, name: impl Into<String>, content: impl Into<String>) -> usize {
        self.sources.push(name.into());
        self.sources_content.push(content.into());
        self.sources.len() - 1
    }

    /// The next generated line came from `original_line` (0-based) of `source`.
    pub fn map_line(&mut self, source: usize, original_line: u32) {
        self.lines.push(Some(LineMapping {
            source,
            original_line,
        }));
    }

    /// The next generated line has no original (wrapper code).
    pub fn unmapped_line(&mut self) {
        self.lines.push(None);
    }

    pub fn generated_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn mappings(&self) -> String {
        let mut out = String::new();
        let mut prev_source: i64 = 0;
        let mut prev_line: i64 = 0;

        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            let Some(mapping) = line else {
                continue;
            };
            let source = mapping.source as i64;
            let original = i64::from(mapping.original_line);

            encode_vlq(0, &mut out);
            encode_vlq(source - prev_source, &mut out);
            encode_vlq(original - prev_line, &mut out);
            encode_vlq(0, &mut out);

            prev_source = source;
            prev_line = original;
        }
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&SourceMapJson {
            version: 3,
            file: &self.file,
            sources: &self.sources,
            sources_content: &self.sources_content,
            names: [],
            mappings: self.mappings(),
        })
    }
}

/// Append the base64 VLQ encoding of `value` to `out`.
pub fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq: u64 = if value < 0 {
        ((value.unsigned_abs()) << 1) | 1
    } else {
        (value as u64) << 1
    };

    loop {
        let mut digit = (vlq & 0b1_1111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b10_0000;
        }
        out.push(BASE64[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}
