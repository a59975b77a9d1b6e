use std::sync::LazyLock;

use regex::Regex;

use super::numbers::looks_numeric;

// code, name, preparation code, tail (preparation text + value run)
static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{7})\s+([^0-9]+?)\s+([0-9]{1,2})\s+(.+)$").unwrap());

pub const DEFAULT_MIN_LINE_LEN: usize = 20;

/// One data row as it appears on the page, before any value is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub code: u32,
    pub name: String,
    pub preparation_code: u8,
    pub preparation: String,
    pub tokens: Vec<String>,
}

/// Rows recognized on one page plus the line counts the pass metrics need.
#[derive(Debug, Default)]
pub struct PageRows {
    pub rows: Vec<RawRow>,
    pub candidates: usize,
    pub unmatched: usize,
    pub short: usize,
}

#[derive(Debug, Clone)]
pub struct LineParser {
    min_line_len: usize,
}

impl Default for LineParser {
    fn default() -> Self {
        LineParser::new(DEFAULT_MIN_LINE_LEN)
    }
}

impl LineParser {
    pub fn new(min_line_len: usize) -> Self {
        LineParser { min_line_len }
    }

    /// Trimmed, non-blank lines long enough to hold a full row.
    pub fn candidate_lines<'a>(&self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        let min = self.min_line_len;
        text.lines()
            .map(str::trim)
            .filter(move |l| !l.is_empty() && l.chars().count() >= min)
    }

    /// Lazily yield every row on the page. Header, footer and wrapped lines are skipped.
    pub fn rows<'a>(&'a self, text: &'a str) -> impl Iterator<Item = RawRow> + 'a {
        self.candidate_lines(text).filter_map(|l| self.parse_line(l))
    }

    pub fn parse_page(&self, text: &str) -> PageRows {
        let mut out = PageRows::default();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if line.chars().count() < self.min_line_len {
                out.short += 1;
                continue;
            }
            out.candidates += 1;
            match self.parse_line(line) {
                Some(row) => out.rows.push(row),
                None => out.unmatched += 1,
            }
        }
        out
    }

    pub fn parse_line(&self, line: &str) -> Option<RawRow> {
        let caps = ROW_RE.captures(line.trim())?;
        let code = caps[1].parse::<u32>().ok()?;
        let name = caps[2].trim().to_string();
        let preparation_code = caps[3].parse::<u8>().ok()?;

        // the value run is the longest all-numeric suffix, so a stray dash in
        // the preparation text cannot open it early
        let tail: Vec<&str> = caps[4].split_whitespace().collect();
        let split = tail.len() - tail.iter().rev().take_while(|t| looks_numeric(t)).count();
        if split == 0 || split == tail.len() || name.is_empty() {
            return None;
        }

        Some(RawRow {
            code,
            name,
            preparation_code,
            preparation: tail[..split].join(" "),
            tokens: tail[split..].iter().map(|t| t.to_string()).collect(),
        })
    }
}

// ── Tests ──
