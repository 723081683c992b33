//! Derivation of path-terms from records and query patterns.
//!
//! A path-term is a property path ending in a leaf. Records yield concrete
//! terms that are stored in both indexes; patterns yield query terms whose
//! leaves may still be regexes, predicates or operators, resolved during the
//! index scan.

use std::collections::BTreeMap;

use regex::Regex;

use crate::{
    codec,
    error::{Error, Result},
    keys::{self, KeyPart},
    ops::Operator,
    pattern::{Pattern, PatternKey, Predicate},
    text::Tokenizer,
    value::Value,
};

/// A concrete (path, leaf) pair taken from a stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct PathTerm {
    pub path: Vec<String>,
    pub leaf: KeyPart,
}

impl PathTerm {
    /// Encoded path followed by the leaf, without a record id.
    pub fn encoded(&self) -> Vec<u8> {
        let mut out = encode_path(&self.path);
        self.leaf.encode_into(&mut out);
        out
    }

    /// Property index key: path ++ leaf ++ id.
    pub fn property_key(&self, id: &str) -> Vec<u8> {
        let mut out = self.encoded();
        KeyPart::Text(id.to_string()).encode_into(&mut out);
        out
    }

    /// Value index key: leaf ++ path ++ id.
    pub fn value_key(&self, id: &str) -> Vec<u8> {
        let mut out = Vec::new();
        self.leaf.encode_into(&mut out);
        out.extend(encode_path(&self.path));
        KeyPart::Text(id.to_string()).encode_into(&mut out);
        out
    }
}

pub fn encode_path<S: AsRef<str>>(path: &[S]) -> Vec<u8> {
    let mut out = Vec::new();
    for segment in path {
        KeyPart::Segment(segment.as_ref().to_string()).encode_into(&mut out);
    }
    out
}

/// Occurrences of one distinct term within a record.
#[derive(Debug, Clone, PartialEq)]
pub struct TermCount {
    pub term: PathTerm,
    pub count: u64,
}

/// Distinct terms of a record keyed by their encoding.
pub type TermCounts = BTreeMap<Vec<u8>, TermCount>;

pub fn count_terms(terms: impl IntoIterator<Item = PathTerm>) -> TermCounts {
    let mut counts = TermCounts::new();
    for term in terms {
        counts
            .entry(term.encoded())
            .and_modify(|c| c.count += 1)
            .or_insert(TermCount { term, count: 1 });
    }
    counts
}

/// An index entry split back into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub path: Vec<String>,
    pub leaf: KeyPart,
    pub id: String,
}

impl IndexEntry {
    pub fn from_property_key(key: &[u8]) -> Result<Self> {
        let mut parts = keys::decode(key)?;
        let split = parts.iter().take_while(|p| p.is_segment()).count();
        let rest = parts.split_off(split);
        Self::assemble(parts, rest)
    }

    pub fn from_value_key(key: &[u8]) -> Result<Self> {
        let mut parts = keys::decode(key)?;
        if parts.is_empty() {
            return Err(Error::CorruptKey);
        }
        let leaf = parts.remove(0);
        let split = parts.iter().take_while(|p| p.is_segment()).count();
        let id = parts.split_off(split);
        let mut rest = vec![leaf];
        rest.extend(id);
        Self::assemble(parts, rest)
    }

    fn assemble(path: Vec<KeyPart>, rest: Vec<KeyPart>) -> Result<Self> {
        let [leaf, KeyPart::Text(id)] = <[KeyPart; 2]>::try_from(rest)
            .map_err(|_| Error::CorruptKey)?
        else {
            return Err(Error::CorruptKey);
        };
        let path = path
            .into_iter()
            .filter_map(|p| match p {
                KeyPart::Segment(s) => Some(s),
                _ => None,
            })
            .collect();
        Ok(Self { path, leaf, id })
    }
}

/// One segment of a query path.
#[derive(Debug, Clone)]
pub enum PathSeg {
    Name(String),
    Dynamic(Regex),
}

impl PathSeg {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Name(n) => n == name,
            Self::Dynamic(re) => re.is_match(name),
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(n) => Some(n),
            Self::Dynamic(_) => None,
        }
    }
}

/// How a query term's leaf is resolved against index entries.
#[derive(Clone)]
pub enum TermLeaf {
    Exact(KeyPart),
    Regex(Regex),
    Predicate(Predicate),
    Operator(Operator),
}

impl std::fmt::Debug for TermLeaf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(part) => f.debug_tuple("Exact").field(part).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(re).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
            Self::Operator(op) => f.debug_tuple("Operator").field(op).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryTerm {
    pub path: Vec<PathSeg>,
    pub leaf: TermLeaf,
}

impl QueryTerm {
    /// The path as plain names, when it has no dynamic segment.
    pub fn literal_path(&self) -> Option<Vec<&str>> {
        self.path.iter().map(PathSeg::as_name).collect()
    }

    /// Does a stored path fit this term's path?
    pub fn path_matches<S: AsRef<str>>(&self, path: &[S]) -> bool {
        path.len() == self.path.len()
            && self
                .path
                .iter()
                .zip(path)
                .all(|(seg, name)| seg.matches(name.as_ref()))
    }

    /// The longest run of leading literal segments.
    pub fn literal_prefix(&self) -> Vec<&str> {
        self.path.iter().map_while(PathSeg::as_name).collect()
    }
}

/// Walks records and patterns, pruning paths outside a schema's indexed set.
#[derive(Debug, Clone, Copy)]
pub struct Deriver<'a> {
    pub indexed_paths: Option<&'a [Vec<String>]>,
    pub tokenizer: Option<&'a Tokenizer>,
}

impl<'a> Deriver<'a> {
    pub fn new(
        indexed_paths: Option<&'a [Vec<String>]>,
        tokenizer: Option<&'a Tokenizer>,
    ) -> Self {
        Self {
            indexed_paths,
            tokenizer,
        }
    }

    /// Terms of a stored record, in walk order, duplicates included.
    pub fn record_terms(&self, value: &Value) -> Vec<PathTerm> {
        let mut out = Vec::new();
        if value.is_container() {
            self.walk_record(value, &mut Vec::new(), &mut out);
        }
        out
    }

    pub fn record_counts(&self, value: &Value) -> TermCounts {
        count_terms(self.record_terms(value))
    }

    fn walk_record(
        &self,
        value: &Value,
        path: &mut Vec<String>,
        out: &mut Vec<PathTerm>,
    ) {
        if value.is_container() {
            for (name, child) in value.children() {
                path.push(name);
                if self.leads_to_indexed(path.as_slice(), |seg, declared| {
                    seg == declared
                }) {
                    self.walk_record(child, path, out);
                }
                path.pop();
            }
            return;
        }
        if path.is_empty()
            || !self.within_indexed(path.as_slice(), |seg, declared| {
                seg == declared
            })
        {
            return;
        }
        match value {
            Value::String(s) => match self.tokenizer {
                Some(tokenizer) => {
                    out.extend(tokenizer.terms(s).into_iter().map(|token| {
                        PathTerm {
                            path: path.clone(),
                            leaf: KeyPart::Text(token),
                        }
                    }))
                }
                None => out.push(PathTerm {
                    path: path.clone(),
                    leaf: KeyPart::Text(s.clone()),
                }),
            },
            scalar => {
                if let Some(leaf) = codec::leaf_part(scalar) {
                    out.push(PathTerm {
                        path: path.clone(),
                        leaf,
                    });
                }
            }
        }
    }

    /// Terms of a query pattern, in pattern order. Regex, predicate and
    /// operator leaves are kept as they are.
    pub fn query_terms(&self, pattern: &Pattern) -> Vec<QueryTerm> {
        let mut out = Vec::new();
        if let Pattern::Nested(fields) = pattern {
            self.walk_fields(fields, &mut Vec::new(), &mut out);
        }
        out
    }

    fn walk_fields(
        &self,
        fields: &[(PatternKey, Pattern)],
        path: &mut Vec<PathSeg>,
        out: &mut Vec<QueryTerm>,
    ) {
        for (key, pattern) in fields {
            path.push(match key {
                PatternKey::Name(n) => PathSeg::Name(n.clone()),
                PatternKey::Dynamic(re) => PathSeg::Dynamic(re.clone()),
            });
            if self.leads_to_indexed(path.as_slice(), seg_admits) {
                self.walk_pattern(pattern, path, out);
            }
            path.pop();
        }
    }

    fn walk_pattern(
        &self,
        pattern: &Pattern,
        path: &mut Vec<PathSeg>,
        out: &mut Vec<QueryTerm>,
    ) {
        if let Pattern::Nested(fields) = pattern {
            self.walk_fields(fields, path, out);
            return;
        }
        if !self.within_indexed(path.as_slice(), seg_admits) {
            return;
        }
        let term = |leaf| QueryTerm {
            path: path.clone(),
            leaf,
        };
        match pattern {
            Pattern::Regex(re) => out.push(term(TermLeaf::Regex(re.clone()))),
            Pattern::Predicate(f) => {
                out.push(term(TermLeaf::Predicate(f.clone())))
            }
            Pattern::Operator(op) => {
                out.push(term(TermLeaf::Operator(op.clone())))
            }
            Pattern::Literal(Value::RegExp { source, flags }) => {
                match codec::build_regex(source, flags) {
                    Ok(re) => out.push(term(TermLeaf::Regex(re))),
                    Err(_) => {
                        let literal = Value::RegExp {
                            source: source.clone(),
                            flags: flags.clone(),
                        };
                        if let Some(leaf) = codec::leaf_part(&literal) {
                            out.push(term(TermLeaf::Exact(leaf)));
                        }
                    }
                }
            }
            Pattern::Literal(Value::String(s)) => match self.tokenizer {
                Some(tokenizer) => out.extend(
                    tokenizer
                        .terms(s)
                        .into_iter()
                        .map(|t| term(TermLeaf::Exact(KeyPart::Text(t)))),
                ),
                None => {
                    out.push(term(TermLeaf::Exact(KeyPart::Text(s.clone()))))
                }
            },
            Pattern::Literal(scalar) => {
                // Undefined and empty containers carry no term.
                if let Some(leaf) = codec::leaf_part(scalar) {
                    out.push(term(TermLeaf::Exact(leaf)));
                }
            }
            Pattern::Nested(_) => {}
        }
    }

    /// May `path` still reach an indexed path (or lie beneath one)?
    fn leads_to_indexed<T>(
        &self,
        path: &[T],
        admits: impl Fn(&T, &str) -> bool,
    ) -> bool {
        let Some(declared) = self.indexed_paths else {
            return true;
        };
        declared.iter().any(|d| {
            path.iter()
                .zip(d)
                .all(|(seg, name)| admits(seg, name))
        })
    }

    /// Does `path` lie at or beneath an indexed path?
    fn within_indexed<T>(
        &self,
        path: &[T],
        admits: impl Fn(&T, &str) -> bool,
    ) -> bool {
        let Some(declared) = self.indexed_paths else {
            return true;
        };
        declared.iter().any(|d| {
            d.len() <= path.len()
                && path.iter().zip(d).all(|(seg, name)| admits(seg, name))
        })
    }
}

/// A dynamic query segment may stand for any declared name.
fn seg_admits(seg: &PathSeg, declared: &str) -> bool {
    match seg {
        PathSeg::Name(n) => n == declared,
        PathSeg::Dynamic(_) => true,
    }
}
