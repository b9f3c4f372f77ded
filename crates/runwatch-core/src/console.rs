//! Assembles raw console output into display lines.
//!
//! Handles the subset of terminal behaviour training scripts rely on:
//! carriage-return overwrites (progress bars), cursor-up rewrites of recent
//! lines, erase-line, backspace and tabs. Everything else in an escape
//! sequence is dropped.

use crate::{ConsoleStream, ConsoleText};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

pub const MAX_LINE_CHARS: usize = 4096;
pub const DEFAULT_MAX_LINES: usize = 10_000;
const REWRITE_WINDOW: usize = 64;
const TAB_WIDTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    /// Position since the start of the run; survives eviction of older lines.
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub is_stderr: bool,
}

impl ConsoleLine {
    pub fn text(&self) -> &str {
        self.content.trim_end()
    }
}

#[derive(Debug, Default)]
struct StreamCursor {
    current: Option<usize>,
    col: usize,
    recent: VecDeque<RecentLine>,
    escape: EscapeState,
}

/// A line still reachable by cursor movement, edited as chars and copied
/// back into its `ConsoleLine` when the write finishes.
#[derive(Debug)]
struct RecentLine {
    index: usize,
    chars: Vec<char>,
    dirty: bool,
}

impl StreamCursor {
    fn position(&self, index: usize) -> Option<usize> {
        self.recent.iter().position(|line| line.index == index)
    }

    fn editing(&mut self) -> Option<&mut RecentLine> {
        let current = self.current?;
        self.recent.iter_mut().rev().find(|line| line.index == current)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
enum EscapeState {
    #[default]
    Ground,
    Escape,
    Csi(String),
    Osc { saw_esc: bool },
}

#[derive(Debug)]
pub struct ConsoleAssembler {
    lines: VecDeque<ConsoleLine>,
    first_index: usize,
    max_lines: usize,
    stdout: StreamCursor,
    stderr: StreamCursor,
    revision: u64,
}

impl Default for ConsoleAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}

impl ConsoleAssembler {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            first_index: 0,
            max_lines: max_lines.max(1),
            stdout: StreamCursor::default(),
            stderr: StreamCursor::default(),
            revision: 0,
        }
    }

    pub fn lines(&self) -> impl ExactSizeIterator<Item = &ConsoleLine> + '_ {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Absolute index of the oldest retained line.
    pub fn first_index(&self) -> usize {
        self.first_index
    }

    /// Bumped whenever any line is added or rewritten.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn push(&mut self, text: &ConsoleText) {
        self.write(text.stream, text.timestamp, &text.text);
    }

    pub fn write(&mut self, stream: ConsoleStream, timestamp: DateTime<Utc>, text: &str) {
        if text.is_empty() {
            return;
        }
        let is_stderr = stream == ConsoleStream::Stderr;
        let mut cursor = std::mem::take(self.cursor_mut(stream));
        for ch in text.chars() {
            self.feed(&mut cursor, ch, timestamp, is_stderr);
        }
        for recent in cursor.recent.iter_mut() {
            self.store(recent);
        }
        *self.cursor_mut(stream) = cursor;
        self.revision += 1;
    }

    fn cursor_mut(&mut self, stream: ConsoleStream) -> &mut StreamCursor {
        match stream {
            ConsoleStream::Stdout => &mut self.stdout,
            ConsoleStream::Stderr => &mut self.stderr,
        }
    }

    fn feed(&mut self, cursor: &mut StreamCursor, ch: char, ts: DateTime<Utc>, is_stderr: bool) {
        match std::mem::take(&mut cursor.escape) {
            EscapeState::Ground => {}
            EscapeState::Escape => {
                cursor.escape = match ch {
                    '[' => EscapeState::Csi(String::new()),
                    ']' => EscapeState::Osc { saw_esc: false },
                    _ => EscapeState::Ground,
                };
                return;
            }
            EscapeState::Csi(mut params) => {
                if ('\u{40}'..='\u{7e}').contains(&ch) {
                    self.apply_csi(cursor, &params, ch);
                } else {
                    params.push(ch);
                    cursor.escape = EscapeState::Csi(params);
                }
                return;
            }
            EscapeState::Osc { saw_esc } => {
                let done = ch == '\u{7}' || (saw_esc && ch == '\\');
                if !done {
                    cursor.escape = EscapeState::Osc {
                        saw_esc: ch == '\u{1b}',
                    };
                }
                return;
            }
        }

        match ch {
            '\u{1b}' => cursor.escape = EscapeState::Escape,
            '\n' => {
                let below = match cursor.current {
                    Some(current) => cursor
                        .position(current)
                        .and_then(|position| cursor.recent.get(position + 1))
                        .map(|line| line.index),
                    None => {
                        // an empty line still occupies a row
                        self.start_line(cursor, ts, is_stderr);
                        None
                    }
                };
                // after a cursor-up rewrite the next row is the recent line below
                cursor.current = below;
                cursor.col = 0;
            }
            '\r' => cursor.col = 0,
            '\u{8}' => cursor.col = cursor.col.saturating_sub(1),
            '\t' => {
                let spaces = TAB_WIDTH - (cursor.col % TAB_WIDTH);
                for _ in 0..spaces {
                    self.put(cursor, ' ', ts, is_stderr);
                }
            }
            c if c.is_control() => {}
            c => self.put(cursor, c, ts, is_stderr),
        }
    }

    fn apply_csi(&mut self, cursor: &mut StreamCursor, params: &str, action: char) {
        let first = params
            .split(';')
            .next()
            .and_then(|value| value.trim_start_matches('?').parse::<usize>().ok());
        match action {
            'A' => {
                let count = first.unwrap_or(1).max(1);
                let position = cursor
                    .current
                    .and_then(|current| cursor.position(current))
                    .unwrap_or(cursor.recent.len());
                if position == 0 && cursor.current.is_none() {
                    return;
                }
                let target = position.saturating_sub(count);
                cursor.current = cursor.recent.get(target).map(|line| line.index);
            }
            'B' => {
                let count = first.unwrap_or(1).max(1);
                if let Some(position) = cursor.current.and_then(|current| cursor.position(current)) {
                    cursor.current = cursor.recent.get(position + count).map(|line| line.index);
                }
            }
            'G' => cursor.col = first.unwrap_or(1).saturating_sub(1),
            'K' => {
                let col = cursor.col;
                let Some(line) = cursor.editing() else {
                    return;
                };
                match first.unwrap_or(0) {
                    0 => line.chars.truncate(col),
                    1 => {
                        if line.chars.len() < col {
                            line.chars.resize(col, ' ');
                        }
                        line.chars[..col].fill(' ');
                    }
                    _ => line.chars.clear(),
                }
                line.dirty = true;
            }
            _ => {}
        }
    }

    fn put(&mut self, cursor: &mut StreamCursor, ch: char, ts: DateTime<Utc>, is_stderr: bool) {
        if cursor.col >= MAX_LINE_CHARS {
            return;
        }
        let retained = cursor.current.is_some_and(|idx| self.line_mut(idx).is_some());
        if !retained {
            self.start_line(cursor, ts, is_stderr);
        }
        let col = cursor.col;
        if let Some(line) = cursor.editing() {
            if col >= line.chars.len() {
                line.chars.resize(col, ' ');
                line.chars.push(ch);
            } else {
                line.chars[col] = ch;
            }
            line.dirty = true;
        }
        cursor.col += 1;
    }

    fn start_line(&mut self, cursor: &mut StreamCursor, ts: DateTime<Utc>, is_stderr: bool) -> usize {
        let index = self.first_index + self.lines.len();
        self.lines.push_back(ConsoleLine {
            index,
            timestamp: ts,
            content: String::new(),
            is_stderr,
        });
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
            self.first_index += 1;
        }
        cursor.recent.push_back(RecentLine {
            index,
            chars: Vec::new(),
            dirty: false,
        });
        while cursor.recent.len() > REWRITE_WINDOW {
            if let Some(mut oldest) = cursor.recent.pop_front() {
                self.store(&mut oldest);
            }
        }
        cursor.current = Some(index);
        index
    }

    fn store(&mut self, recent: &mut RecentLine) {
        if !std::mem::take(&mut recent.dirty) {
            return;
        }
        if let Some(line) = self.line_mut(recent.index) {
            line.content = recent.chars.iter().collect();
        }
    }

    fn line_mut(&mut self, index: usize) -> Option<&mut ConsoleLine> {
        index
            .checked_sub(self.first_index)
            .and_then(|offset| self.lines.get_mut(offset))
    }
}
