//! Feature vectors and similarity ranges.
//!
//! A schema's vector features map each record to a fixed-order vector of
//! values in `[0, 1]`. Features a record lacks stay as `None` so positions
//! line up across records; distance computations skip any position missing
//! on either side.

use std::{fmt, ops::Bound, sync::Arc};

use rayon::prelude::*;

use crate::{
    error::{Error, Result},
    query::Finish,
    schema::{FeatureKind, Schema, VectorFeature},
    store::{Scan, Store},
    value::Value,
};

pub type DistanceFn = Arc<dyn Fn(&[f32], &[f32]) -> f32 + Send + Sync>;

/// Distance metric for vector ranges. Lower is more similar.
#[derive(Clone, Default)]
pub enum Distance {
    /// `sqrt(sum((a[i] - b[i])^2))`
    #[default]
    Euclidean,
    /// `sum(|a[i] - b[i]|)`
    Manhattan,
    /// `1 - (a . b) / (|a| * |b|)`
    Cosine,
    Custom(DistanceFn),
}

impl Distance {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[f32], &[f32]) -> f32 + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn compute(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Euclidean => euclidean_distance(a, b),
            Self::Manhattan => manhattan_distance(a, b),
            Self::Cosine => cosine_distance(a, b),
            Self::Custom(f) => f(a, b),
        }
    }

    /// Distance over the positions present in both vectors, or `None` when
    /// they share none.
    pub fn between(&self, a: &[Option<f32>], b: &[Option<f32>]) -> Option<f32> {
        let (xs, ys): (Vec<f32>, Vec<f32>) = a
            .iter()
            .zip(b)
            .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
            .unzip();
        if xs.is_empty() {
            return None;
        }
        Some(self.compute(&xs, &ys))
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Euclidean => f.write_str("Euclidean"),
            Self::Manhattan => f.write_str("Manhattan"),
            Self::Cosine => f.write_str("Cosine"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum::<f32>()
        .sqrt()
}

pub fn manhattan_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    let denominator = norm_a * norm_b;
    if denominator == 0.0 {
        return 1.0;
    }
    1.0 - (dot / denominator)
}

/// The normalized value of one feature, if the record has a usable one.
pub fn feature_value(feature: &VectorFeature, value: &Value) -> Option<f32> {
    let found = value.get_path(&feature.path)?;
    match &feature.kind {
        FeatureKind::Numeric { min, max, .. } => {
            let n = found.as_f64().filter(|n| n.is_finite())?;
            let (min, max) = ((*min)?, (*max)?);
            if max <= min {
                return Some(0.0);
            }
            Some(((n - min) / (max - min)).clamp(0.0, 1.0) as f32)
        }
        FeatureKind::Categorical { values, .. } => {
            let category = found.coerce_str()?;
            let index = values.iter().position(|v| *v == category)?;
            Some((index + 1) as f32 / values.len() as f32)
        }
    }
}

/// The feature vector of `value` under `schema`. Empty when the schema
/// declares no vector features.
pub fn get_vector(schema: &Schema, value: &Value) -> Vec<Option<f32>> {
    schema
        .vector_paths
        .iter()
        .map(|feature| feature_value(feature, value))
        .collect()
}

/// Widen learned numeric bounds and add unseen categories from `value`.
/// Returns whether any feature changed.
pub(crate) fn learn(features: &mut [VectorFeature], value: &Value) -> bool {
    let mut changed = false;
    for feature in features {
        let Some(found) = value.get_path(&feature.path) else {
            continue;
        };
        match &mut feature.kind {
            FeatureKind::Numeric {
                min,
                max,
                fixed: false,
            } => {
                let Some(n) = found.as_f64().filter(|n| n.is_finite()) else {
                    continue;
                };
                if min.is_none_or(|m| n < m) {
                    *min = Some(n);
                    changed = true;
                }
                if max.is_none_or(|m| n > m) {
                    *max = Some(n);
                    changed = true;
                }
            }
            FeatureKind::Categorical {
                values,
                fixed: false,
            } => {
                if let Some(category) = found.coerce_str()
                    && !values.contains(&category)
                {
                    values.push(category);
                    changed = true;
                }
            }
            _ => {}
        }
    }
    changed
}

/// What to measure distances from.
#[derive(Debug, Clone)]
pub enum VectorQuery {
    /// A record-shaped value, turned into a vector by the type's schema.
    Value(Value),
    Vector(Vec<Option<f32>>),
}

impl From<Value> for VectorQuery {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Vec<f32>> for VectorQuery {
    fn from(vector: Vec<f32>) -> Self {
        Self::Vector(vector.into_iter().map(Some).collect())
    }
}

impl From<Vec<Option<f32>>> for VectorQuery {
    fn from(vector: Vec<Option<f32>>) -> Self {
        Self::Vector(vector)
    }
}

/// Options of [`crate::IndexDb::get_range_from_vector`].
#[derive(Debug, Clone, Default)]
pub struct VectorOptions {
    pub type_name: Option<String>,
    pub distance: Distance,
    pub max_distance: Option<f32>,
    /// Buffer all matches and yield them nearest first.
    pub sort: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl VectorOptions {
    pub fn of_type(type_name: &str) -> Self {
        Self {
            type_name: Some(type_name.to_string()),
            ..Self::default()
        }
    }

    pub fn distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
        self
    }

    pub fn max_distance(mut self, max: f32) -> Self {
        self.max_distance = Some(max);
        self
    }

    pub fn sort(mut self, sort: bool) -> Self {
        self.sort = sort;
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

    pub fn validate(&self) -> Result<()> {
        if let Some(max) = self.max_distance
            && !(max >= 0.0)
        {
            return Err(Error::InvalidOption(format!(
                "max_distance {max} must be a non-negative number"
            )));
        }
        Ok(())
    }

    fn admits(&self, distance: f32) -> bool {
        !distance.is_nan() && self.max_distance.is_none_or(|max| distance <= max)
    }

    /// Key range of the vectors to scan.
    pub(crate) fn key_range(&self) -> (Bound<String>, Bound<String>) {
        match &self.type_name {
            Some(t) => (
                Bound::Included(format!("{t}@")),
                Bound::Excluded(format!("{t}A")),
            ),
            None => (Bound::Unbounded, Bound::Unbounded),
        }
    }
}

/// A record near the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub key: String,
    pub value: Value,
    pub version: u64,
    pub distance: f32,
}

enum Nearby<'s> {
    Streaming(Scan<'s, String, Vec<Option<f32>>>),
    Sorted(std::vec::IntoIter<(String, f32)>),
}

/// Lazy result of [`crate::IndexDb::get_range_from_vector`].
pub struct VectorRange<'s> {
    store: &'s Store,
    query: Vec<Option<f32>>,
    options: VectorOptions,
    nearby: Nearby<'s>,
    finish: Finish,
}

impl<'s> VectorRange<'s> {
    pub(crate) fn new(
        store: &'s Store,
        query: Vec<Option<f32>>,
        options: VectorOptions,
        finish: Finish,
    ) -> Result<Self> {
        let (start, end) = options.key_range();
        let scan = store.vectors(start, end);
        let nearby = if options.sort {
            let stored = scan.collect::<Result<Vec<_>>>()?;
            let mut ranked: Vec<(String, f32)> = stored
                .par_iter()
                .filter_map(|(id, vector)| {
                    let distance = options.distance.between(&query, vector)?;
                    options
                        .admits(distance)
                        .then(|| (id.clone(), distance))
                })
                .collect();
            // Sort by distance ascending.
            ranked.sort_by(|a, b| {
                a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
            });
            Nearby::Sorted(ranked.into_iter())
        } else {
            Nearby::Streaming(scan)
        };
        Ok(Self {
            store,
            query,
            options,
            nearby,
            finish,
        })
    }

    fn next_candidate(&mut self) -> Option<Result<(String, f32)>> {
        match &mut self.nearby {
            Nearby::Sorted(ranked) => ranked.next().map(Ok),
            Nearby::Streaming(scan) => loop {
                let (id, vector) = match scan.next()? {
                    Ok(row) => row,
                    Err(err) => return Some(Err(err)),
                };
                let Some(distance) =
                    self.options.distance.between(&self.query, &vector)
                else {
                    continue;
                };
                if self.options.admits(distance) {
                    return Some(Ok((id, distance)));
                }
            },
        }
    }
}

impl Iterator for VectorRange<'_> {
    type Item = Result<VectorHit>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finish.exhausted() {
            let (id, distance) = match self.next_candidate()? {
                Ok(candidate) => candidate,
                Err(err) => return Some(Err(err)),
            };
            match self.finish.apply(self.store, &id) {
                Ok(Some((value, version))) => {
                    return Some(Ok(VectorHit {
                        key: id,
                        value,
                        version,
                        distance,
                    }));
                }
                Ok(None) => {}
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }
}
