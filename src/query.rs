//! Index-driven candidate matching.
//!
//! Every query term becomes one ordered scan over the property or value
//! index. Ids are credited term by term: an id survives a term only if it
//! matched every earlier term, so candidates shrink as the scans proceed and
//! matching stops as soon as none are left.

use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    ops::Bound,
};

use crate::{
    codec,
    derive::{IndexEntry, QueryTerm, TermLeaf, encode_path},
    error::{Error, Result},
    keys::{self, KeyPart},
    matching,
    pattern::{Pattern, Verdict},
    select::{self, Projection},
    store::{IndexTable, Scan, Store, StoredRecord},
    value::Value,
};

/// Full-text matching for index queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FullText {
    /// Any shared term makes a record a match.
    Any,
    /// A record must share at least this fraction (`0..=1`) of the query's
    /// terms.
    Threshold(f64),
}

/// Options of [`crate::IndexDb::get_range_from_index`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexQuery {
    /// Only match records of this type.
    pub type_name: Option<String>,
    pub fulltext: Option<FullText>,
    /// Yield partial matches too, best score first.
    pub sortable: bool,
    pub min_score: Option<usize>,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Scan every record of the type when the pattern has no indexed term.
    pub scan_fallback: bool,
}

impl IndexQuery {
    pub fn of_type(type_name: &str) -> Self {
        Self {
            type_name: Some(type_name.to_string()),
            ..Self::default()
        }
    }

    pub fn fulltext(mut self, fulltext: FullText) -> Self {
        self.fulltext = Some(fulltext);
        self
    }

    pub fn sortable(mut self, sortable: bool) -> Self {
        self.sortable = sortable;
        self
    }

    pub fn min_score(mut self, score: usize) -> Self {
        self.min_score = Some(score);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn scan_fallback(mut self, fallback: bool) -> Self {
        self.scan_fallback = fallback;
        self
    }

    /// Ranked queries yield partial matches with their score.
    pub fn ranked(&self) -> bool {
        self.sortable || self.fulltext.is_some()
    }

    /// Reject malformed options before any scan begins.
    pub fn validate(&self) -> Result<()> {
        if let Some(FullText::Threshold(t)) = self.fulltext
            && !(0.0..=1.0).contains(&t)
        {
            return Err(Error::InvalidOption(format!(
                "fulltext threshold {t} is outside 0..=1"
            )));
        }
        Ok(())
    }

    /// Lowest score a match needs, given the number of query terms.
    pub fn required_score(&self, terms: usize) -> usize {
        let fulltext = match self.fulltext {
            Some(FullText::Threshold(t)) => (terms as f64 * t).ceil() as usize,
            _ => 0,
        };
        self.min_score.unwrap_or(0).max(fulltext)
    }
}

/// A candidate record id and the number of query terms it satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMatch {
    pub id: String,
    pub score: usize,
}

struct TermScan<'s> {
    term: QueryTerm,
    rows: Scan<'s, Vec<u8>, u64>,
    table: IndexTable,
    /// Leaves of the scanned path are contiguous and ordered, so a `Done`
    /// verdict ends the scan.
    stop_on_done: bool,
    /// String leaves are full-text tokens rather than whole values.
    tokenized: bool,
}

impl TermScan<'_> {
    /// The next record id satisfying the term, or `None` when exhausted.
    fn next_id(&mut self, type_prefix: Option<&str>) -> Option<Result<String>> {
        loop {
            let (key, _count) = match self.rows.next()? {
                Ok(row) => row,
                Err(err) => return Some(Err(err)),
            };
            let entry = match self.table {
                IndexTable::Property => IndexEntry::from_property_key(&key),
                IndexTable::Value => IndexEntry::from_value_key(&key),
            };
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err)),
            };
            if !self.term.path_matches(&entry.path) {
                continue;
            }
            match test_leaf(&self.term.leaf, &entry.leaf, self.tokenized) {
                Verdict::Match => {}
                Verdict::NoMatch => continue,
                Verdict::Done if self.stop_on_done => return None,
                Verdict::Done => continue,
            }
            if type_prefix.is_some_and(|p| !entry.id.starts_with(p)) {
                continue;
            }
            return Some(Ok(entry.id));
        }
    }
}

/// Test one stored leaf against a term leaf.
fn test_leaf(leaf: &TermLeaf, stored: &KeyPart, tokenized: bool) -> Verdict {
    match leaf {
        TermLeaf::Exact(expected) => Verdict::from(expected == stored),
        TermLeaf::Regex(re) => test_decoded(stored, tokenized, |v| {
            Verdict::from(v.coerce_str().is_some_and(|s| re.is_match(&s)))
        }),
        TermLeaf::Predicate(f) => test_decoded(stored, tokenized, |v| f(v)),
        TermLeaf::Operator(op) => test_decoded(stored, tokenized, |v| op.test(v)),
    }
}

/// A token is only a piece of the stored string, so with `tokenized` every
/// string leaf passes and the record check decides.
fn test_decoded(
    stored: &KeyPart,
    tokenized: bool,
    test: impl FnOnce(&Value) -> Verdict,
) -> Verdict {
    let value = codec::leaf_value(stored);
    if tokenized && matches!(value, Value::String(_)) {
        Verdict::Match
    } else {
        test(&value)
    }
}

/// Pick the index and key range answering one term.
fn open_scan<'s>(
    store: &'s Store,
    term: QueryTerm,
    tokenized: bool,
) -> TermScan<'s> {
    let literal = term.literal_path().is_some();
    let prefix_range = |prefix: Vec<u8>| {
        let end = keys::prefix_end(&prefix)
            .map_or(Bound::Unbounded, Bound::Excluded);
        (Bound::Included(prefix), end)
    };

    let (table, (start, end), stop_on_done) = match &term.leaf {
        TermLeaf::Exact(leaf) if literal => {
            let mut prefix = encode_path(&term.literal_prefix());
            leaf.encode_into(&mut prefix);
            (IndexTable::Property, prefix_range(prefix), false)
        }
        TermLeaf::Exact(leaf) => {
            let mut prefix = Vec::new();
            leaf.encode_into(&mut prefix);
            prefix.extend(encode_path(&term.literal_prefix()));
            (IndexTable::Value, prefix_range(prefix), false)
        }
        TermLeaf::Operator(op) if literal && op.number_range().is_some() => {
            let range = op
                .number_range()
                .map(number_bounds)
                .unwrap_or((Bound::Unbounded, Bound::Unbounded));
            (IndexTable::Value, range, false)
        }
        _ => {
            let prefix = encode_path(&term.literal_prefix());
            // Numbers sort before tokens on the same path, so a number past
            // the bound says nothing about the tokens.
            (IndexTable::Property, prefix_range(prefix), literal && !tokenized)
        }
    };
    tracing::trace!(?term, ?table, "scanning index term");
    TermScan {
        rows: store.index_entries(table, start, end),
        term,
        table,
        stop_on_done,
        tokenized,
    }
}

/// Value-index key bounds covering the numbers within `range`.
fn number_bounds(
    (low, high): (Bound<f64>, Bound<f64>),
) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let encoded = |n: f64| keys::encode([&KeyPart::Number(n)]);
    let numbers = KeyPart::Number(0.0);
    let start = match low {
        Bound::Included(n) => Bound::Included(encoded(n)),
        Bound::Excluded(n) => keys::prefix_end(&encoded(n))
            .map_or(Bound::Unbounded, Bound::Included),
        Bound::Unbounded => Bound::Included(keys::type_start(&numbers)),
    };
    let end = match high {
        Bound::Included(n) => keys::prefix_end(&encoded(n))
            .map_or(Bound::Unbounded, Bound::Excluded),
        Bound::Excluded(n) => Bound::Excluded(encoded(n)),
        Bound::Unbounded => Bound::Excluded(keys::type_end(&numbers)),
    };
    (start, end)
}

/// Lazily yields the ids matching a list of query terms.
pub(crate) struct IndexMatches<'s> {
    store: &'s Store,
    terms: Vec<QueryTerm>,
    type_prefix: Option<String>,
    ranked: bool,
    min_score: usize,
    phase: usize,
    scan: Option<TermScan<'s>>,
    credited: HashSet<String>,
    counts: BTreeMap<String, usize>,
    yielded: HashSet<String>,
    pending: VecDeque<IndexMatch>,
    fallback: Option<Scan<'s, String, StoredRecord>>,
    tokenized: bool,
    done: bool,
}

impl<'s> IndexMatches<'s> {
    pub fn new(
        store: &'s Store,
        terms: Vec<QueryTerm>,
        options: &IndexQuery,
        tokenized: bool,
    ) -> Self {
        let type_prefix = options.type_name.as_ref().map(|t| format!("{t}@"));
        let fallback = (terms.is_empty() && options.scan_fallback).then(|| {
            let (start, end) = match &options.type_name {
                Some(t) => (
                    Bound::Included(format!("{t}@")),
                    Bound::Excluded(format!("{t}A")),
                ),
                None => (Bound::Unbounded, Bound::Unbounded),
            };
            tracing::trace!(type_name = ?options.type_name, "falling back to record scan");
            store.records(start, end)
        });
        Self {
            store,
            min_score: options.required_score(terms.len()),
            done: terms.is_empty() && fallback.is_none(),
            terms,
            type_prefix,
            ranked: options.ranked(),
            tokenized,
            phase: 0,
            scan: None,
            credited: HashSet::new(),
            counts: BTreeMap::new(),
            yielded: HashSet::new(),
            pending: VecDeque::new(),
            fallback,
        }
    }

    fn emit(&mut self, id: String, score: usize) {
        if score >= self.min_score && self.yielded.insert(id.clone()) {
            self.pending.push_back(IndexMatch { id, score });
        }
    }

    fn credit(&mut self, id: String) {
        if !self.credited.insert(id.clone()) {
            return;
        }
        let last = self.phase + 1 == self.terms.len();
        if self.phase == 0 {
            self.counts.insert(id.clone(), 1);
            if last {
                self.emit(id, 1);
            }
            return;
        }
        let Some(count) = self.counts.get_mut(&id) else {
            return;
        };
        if *count != self.phase {
            return;
        }
        *count += 1;
        let score = *count;
        if last {
            self.emit(id, score);
        }
    }

    fn end_phase(&mut self) {
        self.scan = None;
        if self.terms.len() > 1 {
            let phase = self.phase;
            let dropped: Vec<(String, usize)> = self
                .counts
                .iter()
                .filter(|(_, count)| **count <= phase)
                .map(|(id, count)| (id.clone(), *count))
                .collect();
            for (id, count) in dropped {
                self.counts.remove(&id);
                if self.ranked {
                    self.emit(id, count);
                }
            }
        }
        tracing::trace!(
            phase = self.phase,
            candidates = self.counts.len(),
            "index term done"
        );
        self.credited.clear();
        self.phase += 1;
        if self.phase >= self.terms.len() || self.counts.is_empty() {
            self.done = true;
        }
    }
}

impl Iterator for IndexMatches<'_> {
    type Item = Result<IndexMatch>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(found) = self.pending.pop_front() {
                return Some(Ok(found));
            }
            if self.done {
                return None;
            }
            if let Some(records) = &mut self.fallback {
                match records.next() {
                    Some(Ok((id, _))) => {
                        if self.min_score == 0 {
                            return Some(Ok(IndexMatch { id, score: 0 }));
                        }
                    }
                    Some(Err(err)) => {
                        self.done = true;
                        return Some(Err(err));
                    }
                    None => self.done = true,
                }
                continue;
            }
            if self.scan.is_none() {
                let term = self.terms[self.phase].clone();
                self.scan = Some(open_scan(self.store, term, self.tokenized));
            }
            let Some(scan) = self.scan.as_mut() else {
                continue;
            };
            match scan.next_id(self.type_prefix.as_deref()) {
                Some(Ok(id)) => self.credit(id),
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => self.end_phase(),
            }
        }
    }
}

/// A matched record.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub key: String,
    pub value: Value,
    pub version: u64,
    /// Query terms the record satisfied; 0 for fallback scans.
    pub score: usize,
}

enum Candidates<'s> {
    Streaming(IndexMatches<'s>),
    Ranked(std::vec::IntoIter<IndexMatch>),
}

/// The tail shared by index and vector ranges: load each candidate, verify
/// it against the value pattern, page and project it.
pub(crate) struct Finish {
    value_match: Option<Pattern>,
    select: Option<Projection>,
    offset: usize,
    remaining: Option<usize>,
}

impl Finish {
    pub fn new(
        value_match: Option<Pattern>,
        select: Option<Projection>,
        offset: usize,
        limit: Option<usize>,
    ) -> Self {
        Self {
            value_match,
            select,
            offset,
            remaining: limit,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// The projected value and version of `id`, or `None` when the record is
    /// gone, fails the value pattern or falls inside the offset.
    pub fn apply(&mut self, store: &Store, id: &str) -> Result<Option<(Value, u64)>> {
        let Some(record) = store.get_record(id)? else {
            tracing::warn!(id, "index entry without record");
            return Ok(None);
        };
        let value = codec::decode(record.value);
        if let Some(pattern) = &self.value_match
            && !matching::match_value(pattern, &value)
        {
            return Ok(None);
        }
        if self.offset > 0 {
            self.offset -= 1;
            return Ok(None);
        }
        if let Some(remaining) = &mut self.remaining {
            *remaining -= 1;
        }
        let value = match &self.select {
            Some(projection) => {
                select::select(&value, projection).unwrap_or_default()
            }
            None => value,
        };
        Ok(Some((value, record.version)))
    }
}

/// Lazy result of [`crate::IndexDb::get_range_from_index`].
pub struct IndexRange<'s> {
    store: &'s Store,
    candidates: Candidates<'s>,
    finish: Finish,
}

impl<'s> IndexRange<'s> {
    pub(crate) fn new(
        store: &'s Store,
        matches: IndexMatches<'s>,
        finish: Finish,
        options: &IndexQuery,
    ) -> Result<Self> {
        let candidates = if options.ranked() {
            // Partial matches only settle once every term is scanned.
            let mut all = matches.collect::<Result<Vec<_>>>()?;
            if options.sortable {
                all.sort_by(|a, b| b.score.cmp(&a.score));
            }
            Candidates::Ranked(all.into_iter())
        } else {
            Candidates::Streaming(matches)
        };
        Ok(Self {
            store,
            candidates,
            finish,
        })
    }

    fn next_candidate(&mut self) -> Option<Result<IndexMatch>> {
        match &mut self.candidates {
            Candidates::Streaming(matches) => matches.next(),
            Candidates::Ranked(matches) => matches.next().map(Ok),
        }
    }
}

impl Iterator for IndexRange<'_> {
    type Item = Result<Hit>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finish.exhausted() {
            let candidate = match self.next_candidate()? {
                Ok(candidate) => candidate,
                Err(err) => return Some(Err(err)),
            };
            match self.finish.apply(self.store, &candidate.id) {
                Ok(Some((value, version))) => {
                    return Some(Ok(Hit {
                        key: candidate.id,
                        value,
                        version,
                        score: candidate.score,
                    }));
                }
                Ok(None) => {}
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }
}
