//! Memoizing, backtracking match engine.
//!
//! The engine matches a [`Grammar`] against text and produces one
//! top-level [`ParseMatch`] per terminator-delimited statement. Every rule
//! result is memoized per `(offset, rule)` in a [`MemoCache`] that lives for
//! exactly one [`Matcher::parse_matches`] call. Left recursion is resolved
//! by growing a seed: the recursive rule is re-evaluated with its previous
//! result in the memo until the match stops getting longer.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use jel_types::{Diagnostic, ErrorCode, SourceFile};
use thiserror::Error;
use tracing::{debug, trace};

use crate::grammar::{Element, Grammar, RuleId};
use crate::matches::{MatchError, MatchKind, ParseMatch};

/// Why text could not be matched.
#[derive(Debug, Clone, Error)]
pub enum MatchFailure {
    #[error("{0}")]
    Syntax(Diagnostic),
    /// The text is a valid prefix; more input is needed.
    #[error("{0}")]
    Incomplete(Diagnostic),
}

impl MatchFailure {
    pub fn diagnostic(&self) -> &Diagnostic {
        match self {
            Self::Syntax(d) | Self::Incomplete(d) => d,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete(_))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Memo cache
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum MemoEntry {
    /// Evaluation in progress; `recursed` is set when the rule was
    /// re-entered at the same offset.
    Running { recursed: bool },
    Done(Rc<ParseMatch>),
}

/// Per-parse memo of rule results keyed by offset and rule.
#[derive(Debug, Default)]
pub struct MemoCache {
    entries: HashMap<usize, HashMap<RuleId, MemoEntry>>,
}

impl MemoCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, pos: usize, rule: RuleId) -> Option<&MemoEntry> {
        self.entries.get(&pos)?.get(&rule)
    }

    fn get_mut(&mut self, pos: usize, rule: RuleId) -> Option<&mut MemoEntry> {
        self.entries.get_mut(&pos)?.get_mut(&rule)
    }

    fn insert(&mut self, pos: usize, rule: RuleId, entry: MemoEntry) {
        self.entries.entry(pos).or_default().insert(rule, entry);
    }

    /// Drop finished results at `pos` other than `keep`; running markers stay.
    fn clear_done_at(&mut self, pos: usize, keep: RuleId) {
        if let Some(row) = self.entries.get_mut(&pos) {
            row.retain(|id, entry| *id == keep || matches!(entry, MemoEntry::Running { .. }));
        }
    }

    /// Number of memoized `(offset, rule)` pairs.
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Matcher
// ══════════════════════════════════════════════════════════════════════════════

/// Matches text against a shared, immutable grammar.
#[derive(Debug, Clone)]
pub struct Matcher {
    grammar: Arc<Grammar>,
}

impl Matcher {
    pub fn new(grammar: Arc<Grammar>) -> Self {
        Self { grammar }
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    /// Split `text` into top-level statement matches.
    ///
    /// The concatenated texts of the returned matches equal `text`.
    pub fn parse_matches(&self, text: &str) -> Result<Vec<ParseMatch>, MatchFailure> {
        let mut run = Run::new(&self.grammar, text);
        let trimmed_end = text.trim_end().len();
        let mut statements: Vec<ParseMatch> = Vec::new();
        let mut pos = 0;

        while pos < text.len() {
            let start = pos;
            let mut children = Vec::new();
            loop {
                let (trivia, after) = run.skip_trivia(pos);
                children.extend(trivia);
                pos = after;
                match run.terminator_at(pos) {
                    Some(t) => {
                        pos = t.end();
                        children.push(t);
                    }
                    None => break,
                }
            }

            if pos >= text.len() {
                match statements.pop() {
                    Some(last) => {
                        let mut all = last.children.unwrap_or_default();
                        all.extend(children);
                        statements.push(ParseMatch::node(
                            MatchKind::Statement,
                            last.offset,
                            all,
                            true,
                            last.furthest,
                        ));
                    }
                    None => statements.push(ParseMatch::node(
                        MatchKind::Statement,
                        start,
                        children,
                        true,
                        None,
                    )),
                }
                break;
            }

            let root = run.match_rule(self.grammar.root(), pos);
            if !root.complete {
                let error = root
                    .furthest
                    .clone()
                    .unwrap_or_else(|| {
                        MatchError::new(pos, &self.grammar.rule(self.grammar.root()).name)
                    });
                return Err(run.failure(error, trimmed_end, ErrorCode::UNEXPECTED_INPUT));
            }
            pos = root.end();
            let furthest = root.furthest.clone();
            let root_text = root.text(text);
            let self_terminated = root_text.ends_with('}') || root_text.ends_with(';');
            children.push(root);

            let (trailing, after) = run.skip_inline(pos);
            children.extend(trailing);
            pos = after;
            if let Some(t) = run.terminator_at(pos) {
                pos = t.end();
                children.push(t);
            } else if pos < text.len() && !self_terminated {
                let expected = MatchError::new(pos, "terminator");
                let code = match &furthest {
                    Some(f) if f.offset > pos => ErrorCode::UNEXPECTED_INPUT,
                    _ => ErrorCode::EXPECTED_TERMINATOR,
                };
                let error = MatchError::merge(furthest, Some(expected))
                    .unwrap_or_else(|| MatchError::new(pos, "terminator"));
                return Err(run.failure(error, trimmed_end, code));
            }

            trace!(offset = start, len = pos - start, "matched statement");
            statements.push(ParseMatch::node(
                MatchKind::Statement,
                start,
                children,
                true,
                furthest,
            ));
        }

        debug!(statements = statements.len(), memo = run.memo.len(), "parsed matches");
        Ok(statements)
    }

    /// Match exactly one occurrence of `rule` covering all of `text`
    /// (surrounding whitespace allowed).
    pub fn match_rule(&self, text: &str, rule: RuleId) -> Result<ParseMatch, MatchFailure> {
        let mut run = Run::new(&self.grammar, text);
        let trimmed_end = text.trim_end().len();
        let (_, start) = run.skip_trivia(0);
        let m = run.match_rule(rule, start);
        if !m.complete {
            let error = m
                .furthest
                .clone()
                .unwrap_or_else(|| MatchError::new(start, &self.grammar.rule(rule).name));
            return Err(run.failure(error, trimmed_end, ErrorCode::UNEXPECTED_INPUT));
        }
        let (_, end) = run.skip_trivia(m.end());
        if end < text.len() {
            let error = MatchError::new(end, "end of input");
            return Err(run.failure(error, trimmed_end, ErrorCode::UNEXPECTED_INPUT));
        }
        Ok((*m).clone())
    }
}

/// Result of matching an element sequence.
struct Seq {
    children: Vec<Rc<ParseMatch>>,
    end: usize,
    complete: bool,
    furthest: Option<MatchError>,
}

/// State of one top-level matching call.
struct Run<'a> {
    grammar: &'a Grammar,
    text: &'a str,
    memo: MemoCache,
}

impl<'a> Run<'a> {
    fn new(grammar: &'a Grammar, text: &'a str) -> Self {
        Self {
            grammar,
            text,
            memo: MemoCache::new(),
        }
    }

    fn failure(&self, error: MatchError, trimmed_end: usize, code: ErrorCode) -> MatchFailure {
        let source = SourceFile::new("input", self.text);
        let offset = error.offset.min(self.text.len());
        let len = self.text[offset..].chars().next().map(char::len_utf8).unwrap_or(0);
        let span = source.span(offset, len);
        let line = source.line(span.start_line).unwrap_or("").to_string();
        if error.offset >= trimmed_end {
            let message = format!("more input needed: {}", error.message());
            MatchFailure::Incomplete(Diagnostic::new(
                ErrorCode::MORE_INPUT_NEEDED,
                message,
                span,
                line,
            ))
        } else {
            MatchFailure::Syntax(Diagnostic::new(code, error.message(), span, line))
        }
    }

    // ── Rules ──

    fn match_rule(&mut self, id: RuleId, pos: usize) -> Rc<ParseMatch> {
        match self.memo.get_mut(pos, id) {
            Some(MemoEntry::Done(m)) => return m.clone(),
            Some(MemoEntry::Running { recursed }) => {
                *recursed = true;
                let name = &self.grammar.rule(id).name;
                let error = MatchError::new(pos, name);
                return Rc::new(ParseMatch::failed(MatchKind::Rule(id), pos, error));
            }
            None => {}
        }

        self.memo.insert(pos, id, MemoEntry::Running { recursed: false });
        let mut result = Rc::new(self.eval_rule(id, pos));
        let recursed = matches!(
            self.memo.get(pos, id),
            Some(MemoEntry::Running { recursed: true })
        );

        if recursed && result.complete {
            loop {
                self.memo.insert(pos, id, MemoEntry::Done(result.clone()));
                self.memo.clear_done_at(pos, id);
                let next = self.eval_rule(id, pos);
                if !next.complete || next.len <= result.len {
                    break;
                }
                debug!(
                    rule = %self.grammar.rule(id).name,
                    pos,
                    len = next.len,
                    "grew left-recursive seed"
                );
                result = Rc::new(next);
            }
        }

        self.memo.insert(pos, id, MemoEntry::Done(result.clone()));
        result
    }

    fn eval_rule(&mut self, id: RuleId, pos: usize) -> ParseMatch {
        let grammar = self.grammar;
        let rule = grammar.rule(id);
        let seq = self.match_sequence(&rule.elements, pos, rule.contiguous, false);
        let mut m = ParseMatch::node(
            MatchKind::Rule(id),
            pos,
            seq.children,
            seq.complete,
            seq.furthest,
        );
        m.tag = rule.store_as.clone();
        if rule.ignorable {
            m.trivia = true;
            m.weight = 0;
        }
        if !m.complete {
            // A rule that fails where it starts reports itself, not its internals.
            if let Some(err) = m.furthest.as_mut().filter(|e| e.offset == pos) {
                err.expected = vec![rule.name.clone()];
            }
            m.error = m.furthest.clone();
        }
        m
    }

    // ── Sequences ──

    fn match_sequence(
        &mut self,
        elements: &'a [Element],
        pos: usize,
        contiguous: bool,
        leading_skip: bool,
    ) -> Seq {
        let mut children = Vec::new();
        let mut furthest = None;
        let mut at = pos;

        for (i, element) in elements.iter().enumerate() {
            let (trivia, after) = if !contiguous && (i > 0 || leading_skip) {
                self.skip_trivia(at)
            } else {
                (Vec::new(), at)
            };
            let m = self.match_element(element, after, contiguous);
            furthest = MatchError::merge(furthest, m.furthest.clone());

            if !m.complete {
                if m.len > 0 {
                    children.extend(trivia);
                    children.push(m);
                } else {
                    children.push(Self::placed(m, at));
                }
                return Seq {
                    end: children.last().map(|c| c.end()).unwrap_or(pos),
                    children,
                    complete: false,
                    furthest,
                };
            }

            if m.len == 0 {
                // Nothing consumed: leave the skipped trivia for the next element.
                if matches!(m.kind, MatchKind::Rule(_)) {
                    children.push(Self::placed(m, at));
                }
            } else {
                children.extend(trivia);
                at = m.end();
                children.push(m);
            }
        }

        Seq {
            children,
            end: at,
            complete: true,
            furthest,
        }
    }

    /// Move a zero-length match to `at` so sibling offsets stay contiguous.
    fn placed(m: Rc<ParseMatch>, at: usize) -> Rc<ParseMatch> {
        if m.offset == at {
            return m;
        }
        let mut moved = (*m).clone();
        moved.offset = at;
        Rc::new(moved)
    }

    // ── Elements ──

    fn match_element(
        &mut self,
        element: &'a Element,
        pos: usize,
        contiguous: bool,
    ) -> Rc<ParseMatch> {
        match element {
            Element::Literal(lit) => Rc::new(self.match_literal(lit, pos)),
            Element::Chars { set, min, max } => {
                let rest = &self.text[pos..];
                let mut count = 0u32;
                let mut len = 0;
                for c in rest.chars() {
                    if max.is_some_and(|m| count >= m) || !set.contains(c) {
                        break;
                    }
                    count += 1;
                    len += c.len_utf8();
                }
                if count < *min {
                    let error = MatchError::new(pos + len, element.describe());
                    Rc::new(ParseMatch::failed(MatchKind::Chars, pos, error))
                } else {
                    Rc::new(ParseMatch::leaf(MatchKind::Chars, pos, len, false))
                }
            }
            Element::Whitespace => {
                let len = self.whitespace_len(pos, |_| true);
                if len == 0 {
                    let error = MatchError::new(pos, "whitespace");
                    Rc::new(ParseMatch::failed(MatchKind::Whitespace, pos, error))
                } else {
                    Rc::new(ParseMatch::leaf(MatchKind::Whitespace, pos, len, true))
                }
            }
            Element::Option { elements, min, max } => {
                Rc::new(self.match_repeat(elements, *min, *max, pos, contiguous))
            }
            Element::Forbid { elements, min, max } => {
                let need = (*min).max(1);
                let limit = max.map(|m| m + 1).unwrap_or(need);
                let count = self.count_occurrences(elements, pos, contiguous, limit);
                if count >= need && max.map_or(true, |m| count <= m) {
                    let error = MatchError::new(pos, format!("not {}", element.describe()));
                    Rc::new(ParseMatch::failed(MatchKind::Group, pos, error))
                } else {
                    Rc::new(ParseMatch::node(MatchKind::Group, pos, Vec::new(), true, None))
                }
            }
            Element::Select(alternatives) => self.match_select(alternatives, pos, contiguous),
            Element::Rule(r) => match r.id {
                Some(id) => self.match_rule(id, pos),
                None => {
                    let error = MatchError::new(pos, r.name.clone());
                    Rc::new(ParseMatch::failed(MatchKind::Group, pos, error))
                }
            },
        }
    }

    fn match_literal(&self, lit: &str, pos: usize) -> ParseMatch {
        let rest = &self.text[pos..];
        if rest.starts_with(lit) {
            return ParseMatch::leaf(MatchKind::Literal, pos, lit.len(), false);
        }
        // Running out of text part-way through a literal is a failure at the end.
        let offset = if lit.starts_with(rest) { self.text.len() } else { pos };
        let expected = format!("'{}'", lit.escape_debug());
        ParseMatch::failed(MatchKind::Literal, pos, MatchError::new(offset, expected))
    }

    fn match_repeat(
        &mut self,
        elements: &'a [Element],
        min: u32,
        max: Option<u32>,
        pos: usize,
        contiguous: bool,
    ) -> ParseMatch {
        let mut children = Vec::new();
        let mut furthest = None;
        let mut count = 0u32;
        let mut at = pos;

        loop {
            if max.is_some_and(|m| count >= m) {
                break;
            }
            let seq = self.match_sequence(elements, at, contiguous, count > 0 && !contiguous);
            furthest = MatchError::merge(furthest, seq.furthest);
            if !seq.complete {
                if count < min {
                    children.extend(seq.children);
                    let furthest =
                        furthest.or_else(|| Some(MatchError::new(at, elements[0].describe())));
                    return ParseMatch::node(MatchKind::Group, pos, children, false, furthest);
                }
                break;
            }
            if seq.end == at {
                // Empty iteration: stop instead of looping forever.
                count += 1;
                children.extend(seq.children.into_iter().filter(|c| c.offset == at && c.len == 0));
                break;
            }
            children.extend(seq.children);
            at = seq.end;
            count += 1;
        }

        if count < min {
            let expected = MatchError::new(at, elements[0].describe());
            let furthest = MatchError::merge(furthest, Some(expected));
            return ParseMatch::node(MatchKind::Group, pos, children, false, furthest);
        }
        ParseMatch::node(MatchKind::Group, pos, children, true, furthest)
    }

    fn count_occurrences(
        &mut self,
        elements: &'a [Element],
        pos: usize,
        contiguous: bool,
        limit: u32,
    ) -> u32 {
        let mut count = 0;
        let mut at = pos;
        while count < limit {
            let seq = self.match_sequence(elements, at, contiguous, count > 0 && !contiguous);
            if !seq.complete {
                break;
            }
            count += 1;
            if seq.end == at {
                break;
            }
            at = seq.end;
        }
        count
    }

    fn match_select(
        &mut self,
        alternatives: &'a [Element],
        pos: usize,
        contiguous: bool,
    ) -> Rc<ParseMatch> {
        let mut best: Option<Rc<ParseMatch>> = None;
        let mut furthest = None;
        for alternative in alternatives {
            let m = self.match_element(alternative, pos, contiguous);
            furthest = MatchError::merge(furthest, m.furthest.clone());
            best = match best {
                Some(current) if !Self::better(&m, &current) => Some(current),
                _ => Some(m),
            };
        }
        let Some(best) = best else {
            let error = MatchError::new(pos, "alternative");
            return Rc::new(ParseMatch::failed(MatchKind::Group, pos, error));
        };
        if best.furthest == furthest {
            return best;
        }
        let mut chosen = (*best).clone();
        if !chosen.complete {
            chosen.error = furthest.clone();
        }
        chosen.furthest = furthest;
        Rc::new(chosen)
    }

    /// Candidate ranking: completeness, then significant length, then the
    /// deepest failure. Ties keep the earlier candidate.
    fn better(candidate: &ParseMatch, current: &ParseMatch) -> bool {
        match (candidate.complete, current.complete) {
            (true, false) => true,
            (false, true) => false,
            (true, true) => candidate.weight > current.weight,
            (false, false) => {
                let depth =
                    |m: &ParseMatch| m.furthest.as_ref().map(|e| e.offset).unwrap_or(m.offset);
                depth(candidate) > depth(current)
            }
        }
    }

    // ── Trivia ──

    fn whitespace_len(&self, pos: usize, accept: impl Fn(char) -> bool) -> usize {
        self.text[pos..]
            .chars()
            .take_while(|c| c.is_whitespace() && accept(*c))
            .map(char::len_utf8)
            .sum()
    }

    /// Consume whitespace and ignorable rules (comments).
    fn skip_trivia(&mut self, pos: usize) -> (Vec<Rc<ParseMatch>>, usize) {
        self.skip_where(pos, |_| true)
    }

    /// Like [`Run::skip_trivia`] but stops at characters that begin a terminator.
    fn skip_inline(&mut self, pos: usize) -> (Vec<Rc<ParseMatch>>, usize) {
        let grammar = self.grammar;
        self.skip_where(pos, |c| !grammar.terminators().iter().any(|t| t.starts_with(c)))
    }

    fn skip_where(
        &mut self,
        pos: usize,
        accept: impl Fn(char) -> bool,
    ) -> (Vec<Rc<ParseMatch>>, usize) {
        let grammar = self.grammar;
        let mut out = Vec::new();
        let mut at = pos;
        loop {
            let ws = self.whitespace_len(at, &accept);
            if ws > 0 {
                out.push(Rc::new(ParseMatch::leaf(MatchKind::Whitespace, at, ws, true)));
                at += ws;
                continue;
            }
            let mut advanced = false;
            for &id in grammar.ignorables() {
                let m = self.match_rule(id, at);
                if m.complete && m.len > 0 {
                    at = m.end();
                    out.push(m);
                    advanced = true;
                    break;
                }
            }
            if !advanced {
                return (out, at);
            }
        }
    }

    fn terminator_at(&self, pos: usize) -> Option<Rc<ParseMatch>> {
        let rest = &self.text[pos..];
        self.grammar
            .terminators()
            .iter()
            .find(|t| rest.starts_with(t.as_str()))
            .map(|t| Rc::new(ParseMatch::leaf(MatchKind::Terminator, pos, t.len(), true)))
    }
}
