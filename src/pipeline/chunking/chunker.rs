//! Boundary-aware splitting of one page into budget-bounded pieces.
//!
//! Blocks are table regions and blank-line separated paragraphs. A block is
//! kept whole when it fits, otherwise it is packed line by line. Lines are
//! never split unless a single line exceeds the whole budget, in which case
//! it is cut at whitespace.

use super::tokens::{estimate_from_chars, max_chars_for};
use crate::pipeline::structure::TableRegion;

/// One line of chunk text and whether it sits inside a table region.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkLine {
    pub text: String,
    pub in_table: bool,
}

/// A packed piece of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedChunk {
    pub lines: Vec<ChunkLine>,
    /// Leading lines repeated from the previous piece.
    pub overlap_lines: usize,
}

impl PackedChunk {
    pub fn text(&self) -> String {
        join_lines(&self.lines)
    }

    pub fn table_line_count(&self) -> usize {
        self.lines.iter().filter(|l| l.in_table).count()
    }

    /// Trailing lines whose joined estimate stays within `overlap_tokens`.
    pub fn tail(&self, overlap_tokens: usize) -> Vec<ChunkLine> {
        tail_within(&self.lines, overlap_tokens)
    }
}

struct Block {
    lines: Vec<ChunkLine>,
}

/// Split a page into blocks: table regions first, then paragraphs.
fn page_blocks(text: &str, regions: &[TableRegion]) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Vec<ChunkLine> = Vec::new();
    let mut current_is_table = false;

    for (idx, line) in text.lines().enumerate() {
        let in_table = regions.iter().any(|r| r.contains(idx));
        let blank = line.trim().is_empty();

        let boundary = (blank && !in_table) || (in_table != current_is_table && !current.is_empty());
        if boundary && !current.is_empty() {
            blocks.push(Block {
                lines: std::mem::take(&mut current),
            });
        }
        if blank {
            continue;
        }
        current_is_table = in_table;
        current.push(ChunkLine {
            text: line.to_string(),
            in_table,
        });
    }
    if !current.is_empty() {
        blocks.push(Block { lines: current });
    }
    blocks
}

fn joined_chars(lines: &[ChunkLine]) -> usize {
    let text: usize = lines.iter().map(|l| l.text.chars().count()).sum();
    text + lines.len().saturating_sub(1)
}

fn join_lines(lines: &[ChunkLine]) -> String {
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn tail_within(lines: &[ChunkLine], overlap_tokens: usize) -> Vec<ChunkLine> {
    if overlap_tokens == 0 {
        return Vec::new();
    }
    let mut start = lines.len();
    while start > 0 && estimate_from_chars(joined_chars(&lines[start - 1..])) <= overlap_tokens {
        start -= 1;
    }
    lines[start..].to_vec()
}

/// Cut an over-long line at whitespace into pieces of at most `max_chars`.
/// A single word longer than `max_chars` is cut mid-word.
fn split_long_line(line: &ChunkLine, max_chars: usize) -> Vec<ChunkLine> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for word in line.text.split_whitespace() {
        let word_chars = word.chars().count();
        let needed = if current.is_empty() { word_chars } else { current_chars + 1 + word_chars };
        if needed <= max_chars {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_chars = needed;
            continue;
        }
        if !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        if word_chars <= max_chars {
            current.push_str(word);
            current_chars = word_chars;
        } else {
            let chars: Vec<char> = word.chars().collect();
            let mut slices = chars.chunks(max_chars).map(|c| c.iter().collect::<String>()).peekable();
            while let Some(slice) = slices.next() {
                if slices.peek().is_some() {
                    pieces.push(slice);
                } else {
                    current_chars = slice.chars().count();
                    current = slice;
                }
            }
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
        .into_iter()
        .map(|text| ChunkLine {
            text,
            in_table: line.in_table,
        })
        .collect()
}

/// Greedy packer holding the piece under construction.
struct Packer {
    max_chars: usize,
    overlap_tokens: usize,
    current: Vec<ChunkLine>,
    overlap_lines: usize,
    out: Vec<PackedChunk>,
}

impl Packer {
    fn new(budget_tokens: usize, overlap_tokens: usize, carry: Vec<ChunkLine>) -> Self {
        let max_chars = max_chars_for(budget_tokens).max(1);
        let carry = tail_within(&carry, overlap_tokens);
        Self {
            max_chars,
            overlap_tokens,
            overlap_lines: carry.len(),
            current: carry,
            out: Vec::new(),
        }
    }

    fn has_fresh_content(&self) -> bool {
        self.current.len() > self.overlap_lines
    }

    fn fits(&self, lines: &[ChunkLine]) -> bool {
        let extra = joined_chars(lines);
        let total = if self.current.is_empty() {
            extra
        } else {
            joined_chars(&self.current) + 1 + extra
        };
        total <= self.max_chars
    }

    fn flush(&mut self) {
        if !self.has_fresh_content() {
            return;
        }
        let lines = std::mem::take(&mut self.current);
        let tail = tail_within(&lines, self.overlap_tokens);
        self.out.push(PackedChunk {
            lines,
            overlap_lines: self.overlap_lines,
        });
        self.overlap_lines = tail.len();
        self.current = tail;
    }

    fn push_block(&mut self, block: Block) {
        if self.fits(&block.lines) {
            self.current.extend(block.lines);
            return;
        }
        // Start the block on a fresh piece when that keeps it whole
        self.flush();
        if self.fits(&block.lines) {
            self.current.extend(block.lines);
            return;
        }
        for line in block.lines {
            self.push_line(line);
        }
    }

    fn push_line(&mut self, line: ChunkLine) {
        let line_chars = line.text.chars().count();
        if line_chars > self.max_chars {
            for piece in split_long_line(&line, self.max_chars) {
                self.push_line(piece);
            }
            return;
        }
        let single = std::slice::from_ref(&line);
        if !self.fits(single) {
            self.flush();
        }
        if !self.fits(single) {
            // Overlap leaves no room for this line
            self.current.clear();
            self.overlap_lines = 0;
        }
        self.current.push(line);
    }

    fn finish(mut self) -> Vec<PackedChunk> {
        self.flush();
        self.out
    }
}

/// Split one page into pieces whose token estimate never exceeds
/// `budget_tokens`. `carry` lines (the tail of the previous page's last
/// piece) open the first piece when a table continues across the break.
pub fn split_page(
    text: &str,
    regions: &[TableRegion],
    budget_tokens: usize,
    overlap_tokens: usize,
    carry: Vec<ChunkLine>,
) -> Vec<PackedChunk> {
    let mut packer = Packer::new(budget_tokens, overlap_tokens, carry);
    for block in page_blocks(text, regions) {
        packer.push_block(block);
    }
    packer.finish()
}
