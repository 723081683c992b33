use kvdex::{
    Config,
    CopyOptions,
    Distance,
    FullText,
    IndexDb,
    IndexQuery,
    Pattern,
    Projection,
    PutOptions,
    SchemaOptions,
    Value,
    VectorFeature,
    VectorOptions,
    Verdict,
    ops,
};
use regex::Regex;
use serde_json::json;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("KVDEX_LOG"))
        .with_test_writer()
        .try_init();
}

fn open(config: Config) -> Result<(tempfile::TempDir, IndexDb), kvdex::Error> {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let db = IndexDb::open(&tmp.path().join("kvdex.redb"), config)?;
    Ok((tmp, db))
}

fn query(
    db: &IndexDb,
    pattern: impl Into<Pattern>,
    options: IndexQuery,
) -> kvdex::Result<Vec<kvdex::Hit>> {
    db.get_range_from_index(pattern, None, None, options)?
        .collect()
}

fn person(value: serde_json::Value) -> Value {
    Value::from(value)
}

#[test]
fn joe_matches_on_every_term() -> TestResult {
    let (_tmp, db) = open(Config::default())?;
    db.put(
        None,
        person(json!({"name": "joe", "age": 21, "address": {"city": "New York"}})),
        PutOptions::of_type("Person"),
    )?;
    db.put(
        None,
        person(json!({"name": "joe", "age": 40})),
        PutOptions::of_type("Person"),
    )?;

    let hits = query(
        &db,
        json!({"name": "joe", "age": 21}),
        IndexQuery::of_type("Person"),
    )?;
    assert_eq!(hits.len(), 1);
    assert_eq!(
        hits[0].value.get_path(&["address", "city"]),
        Some(&Value::from("New York"))
    );
    assert_eq!(hits[0].score, 2);

    let none = query(
        &db,
        json!({"name": "joe", "age": 22}),
        IndexQuery::of_type("Person"),
    )?;
    assert!(none.is_empty());
    Ok(())
}

#[test]
fn fulltext_matches_shared_tokens() -> TestResult {
    let (_tmp, db) = open(Config::default())?;
    for name in ["john jones", "john johnston", "john johnson"] {
        db.put(
            None,
            person(json!({"name": name})),
            PutOptions::of_type("Person"),
        )?;
    }
    let pattern = json!({"name": "john johnson"});

    let all = query(
        &db,
        pattern.clone(),
        IndexQuery::of_type("Person").fulltext(FullText::Any),
    )?;
    assert_eq!(all.len(), 3);

    let exact = query(&db, pattern.clone(), IndexQuery::of_type("Person"))?;
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].value.get("name"), Some(&Value::from("john johnson")));

    let ranked = query(
        &db,
        pattern.clone(),
        IndexQuery::of_type("Person")
            .fulltext(FullText::Any)
            .sortable(true),
    )?;
    assert_eq!(ranked[0].value.get("name"), Some(&Value::from("john johnson")));
    assert_eq!(ranked[0].score, 2);
    assert!(ranked[1..].iter().all(|hit| hit.score == 1));

    let strict = query(
        &db,
        pattern,
        IndexQuery::of_type("Person").fulltext(FullText::Threshold(1.0)),
    )?;
    assert_eq!(strict.len(), 1);
    Ok(())
}

#[test]
fn patch_moves_index_entries() -> TestResult {
    let (_tmp, db) = open(Config::default())?;
    let id = db
        .put(
            None,
            person(json!({"name": "joe", "age": 21})),
            PutOptions::of_type("Person"),
        )?
        .ok_or("put was skipped")?;

    assert!(db.patch(&id, Value::object().with("age", 22), None, None)?);

    let by_age = |age: u32| query(&db, json!({"age": age}), IndexQuery::of_type("Person"));
    assert!(by_age(21)?.is_empty());
    assert_eq!(by_age(22)?.len(), 1);
    assert!(db.check_integrity()?.is_empty());
    Ok(())
}

#[test]
fn operators_use_value_ranges() -> TestResult {
    let (_tmp, db) = open(Config::default())?;
    for age in [15, 18, 30, 65] {
        db.put(
            None,
            person(json!({"age": age})),
            PutOptions::of_type("Person"),
        )?;
    }
    let count = |pattern: Pattern| -> kvdex::Result<usize> {
        Ok(query(&db, pattern, IndexQuery::of_type("Person"))?.len())
    };
    assert_eq!(count(Pattern::object().with("age", ops::gte(18)))?, 3);
    assert_eq!(count(Pattern::object().with("age", ops::lt(18)))?, 1);
    assert_eq!(count(Pattern::object().with("age", ops::between(18, 30)))?, 2);
    assert_eq!(count(Pattern::object().with("age", ops::neq(30)))?, 3);
    Ok(())
}

#[test]
fn infinite_numbers_sit_at_the_ends_of_ranges() -> TestResult {
    let (_tmp, db) = open(Config::default())?;
    for age in [3.0, 10.0, f64::INFINITY, f64::NEG_INFINITY] {
        db.put(
            None,
            Value::object().with("age", Value::Number(age)),
            PutOptions::of_type("Person"),
        )?;
    }
    let count = |pattern: Pattern| -> kvdex::Result<usize> {
        Ok(query(&db, pattern, IndexQuery::of_type("Person"))?.len())
    };
    assert_eq!(count(Pattern::object().with("age", ops::gt(5)))?, 2);
    assert_eq!(count(Pattern::object().with("age", ops::lt(5)))?, 2);
    assert_eq!(
        count(Pattern::object().with("age", Value::Number(f64::INFINITY)))?,
        1
    );
    assert!(db.check_integrity()?.is_empty());
    Ok(())
}

/// Four people, opened with and without full-text indexing.
fn people(fulltext: bool) -> Result<(tempfile::TempDir, IndexDb), kvdex::Error> {
    let (tmp, db) = open(Config::default().with_fulltext(fulltext))?;
    for (name, age, born) in [
        ("Ann Lee", 25, 2000),
        ("Bob", 15, 3000),
        ("Jane Smith", 45, 5000),
        ("John Jones", 30, 1000),
    ] {
        let value = Value::object()
            .with("name", name)
            .with("age", age)
            .with("born", Value::Date(born));
        db.put(None, value, PutOptions::of_type("Person"))?;
    }
    Ok((tmp, db))
}

fn names(db: &IndexDb, pattern: Pattern) -> kvdex::Result<Vec<String>> {
    let mut names: Vec<String> = query(db, pattern, IndexQuery::of_type("Person"))?
        .into_iter()
        .filter_map(|hit| hit.value.get("name")?.as_str().map(str::to_string))
        .collect();
    names.sort();
    Ok(names)
}

#[test]
fn string_leaves_match_whole_values() -> TestResult {
    for fulltext in [true, false] {
        let (_tmp, db) = people(fulltext)?;
        let name = |pattern: Pattern| names(&db, Pattern::object().with("name", pattern));

        assert_eq!(name(Regex::new("^John Jones$")?.into())?, ["John Jones"]);
        assert_eq!(name(ops::eq("John Jones"))?, ["John Jones"]);
        assert_eq!(name(ops::lt("Jo"))?, ["Ann Lee", "Bob", "Jane Smith"]);
        assert_eq!(
            name(Pattern::test(|v| v.as_str().is_some_and(|s| s.ends_with("Smith"))))?,
            ["Jane Smith"]
        );
        assert!(name(Regex::new("^jones$")?.into())?.is_empty(), "fulltext={fulltext}");
    }
    Ok(())
}

#[test]
fn predicates_can_end_the_scan() -> TestResult {
    for fulltext in [true, false] {
        let (_tmp, db) = people(fulltext)?;
        let young = Pattern::verdict(|v| match v.as_f64() {
            Some(n) if n >= 30.0 => Verdict::Done,
            Some(_) => Verdict::Match,
            None => Verdict::NoMatch,
        });
        assert_eq!(
            names(&db, Pattern::object().with("age", young))?,
            ["Ann Lee", "Bob"]
        );
    }
    Ok(())
}

#[test]
fn dynamic_keys_match_any_property() -> TestResult {
    for fulltext in [true, false] {
        let (_tmp, db) = people(fulltext)?;
        assert_eq!(
            names(&db, Pattern::object().with(Regex::new("^na")?, "Bob"))?,
            ["Bob"]
        );
        assert_eq!(
            names(
                &db,
                Pattern::object().with(Regex::new("^na")?, Regex::new("Smith$")?)
            )?,
            ["Jane Smith"]
        );
    }
    Ok(())
}

#[test]
fn dates_are_indexed_leaves() -> TestResult {
    for fulltext in [true, false] {
        let (_tmp, db) = people(fulltext)?;
        assert_eq!(
            names(&db, Pattern::object().with("born", Value::Date(3000)))?,
            ["Bob"]
        );
        assert_eq!(
            names(&db, Pattern::object().with("born", ops::gt(Value::Date(2000))))?,
            ["Bob", "Jane Smith"]
        );
    }
    Ok(())
}

#[test]
fn select_projects_hits() -> TestResult {
    let (_tmp, db) = open(Config::default())?;
    db.put(
        None,
        person(json!({"name": "joe", "age": 21, "secret": "x"})),
        PutOptions::of_type("Person"),
    )?;
    let hits: Vec<_> = db
        .get_range_from_index(
            json!({"name": "joe"}),
            None,
            Some(Projection::object().with("name", true).with("age", true)),
            IndexQuery::of_type("Person"),
        )?
        .collect::<kvdex::Result<_>>()?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].value, person(json!({"name": "joe", "age": 21})));
    Ok(())
}

#[test]
fn paging_and_scan_fallback() -> TestResult {
    let (_tmp, db) = open(Config::default())?;
    for n in 0..5 {
        db.put(
            None,
            person(json!({"kind": "widget", "n": n})),
            PutOptions::of_type("Part"),
        )?;
    }
    let page = query(
        &db,
        json!({"kind": "widget"}),
        IndexQuery::of_type("Part").offset(1).limit(2),
    )?;
    assert_eq!(page.len(), 2);

    assert!(query(&db, Pattern::object(), IndexQuery::of_type("Part"))?.is_empty());
    let scanned = query(
        &db,
        Pattern::object(),
        IndexQuery::of_type("Part").scan_fallback(true),
    )?;
    assert_eq!(scanned.len(), 5);
    assert!(scanned.iter().all(|hit| hit.score == 0));
    Ok(())
}

#[test]
fn indexed_paths_limit_the_index() -> TestResult {
    let (_tmp, db) = open(Config::default())?;
    db.define_schema(
        "Person",
        SchemaOptions::default().indexed_paths(&["name"]),
    )?;
    db.put(
        None,
        person(json!({"name": "joe", "age": 21})),
        PutOptions::of_type("Person"),
    )?;
    assert_eq!(
        query(&db, json!({"name": "joe"}), IndexQuery::of_type("Person"))?.len(),
        1
    );
    assert!(query(&db, json!({"age": 21}), IndexQuery::of_type("Person"))?.is_empty());
    assert_eq!(
        query(
            &db,
            json!({"age": 21}),
            IndexQuery::of_type("Person").scan_fallback(true),
        )?
        .len(),
        1
    );
    Ok(())
}

#[test]
fn remove_is_idempotent() -> TestResult {
    let (_tmp, db) = open(Config::default())?;
    let id = db
        .put(None, person(json!({"name": "joe"})), PutOptions::of_type("Person"))?
        .ok_or("put was skipped")?;
    assert_eq!(db.remove(&id, None)?, Some(id.clone()));
    assert_eq!(db.remove(&id, None)?, None);
    assert_eq!(db.remove("Person@never", None)?, None);
    assert!(query(&db, json!({"name": "joe"}), IndexQuery::of_type("Person"))?.is_empty());
    assert!(db.check_integrity()?.is_empty());
    Ok(())
}

#[test]
fn stale_versions_leave_records_untouched() -> TestResult {
    let (_tmp, db) = open(Config::default())?;
    let id = db
        .put(None, person(json!({"age": 21})), PutOptions::of_type("Person"))?
        .ok_or("put was skipped")?;
    assert!(!db.patch(&id, Value::object().with("age", 30), None, Some(7))?);
    assert_eq!(db.remove(&id, Some(7))?, None);
    assert_eq!(
        db.copy(&id, None, CopyOptions::default().if_version(7))?,
        None
    );
    let entry = db.get(&id)?.ok_or("record vanished")?;
    assert_eq!(entry.version, 1);
    assert_eq!(entry.value.get("age"), Some(&Value::from(21)));
    Ok(())
}

#[test]
fn identity_conflict_is_an_error() -> TestResult {
    let (_tmp, db) = open(Config::default())?;
    let result = db.put(
        Some("Person@a"),
        person(json!({"#": "Person@b"})),
        PutOptions::of_type("Person"),
    );
    assert!(matches!(result, Err(kvdex::Error::Conflict { .. })));
    assert!(db.get("Person@a")?.is_none());
    Ok(())
}

#[test]
fn move_reindexes_under_the_new_key() -> TestResult {
    let (_tmp, db) = open(Config::default())?;
    let id = db
        .put(None, person(json!({"name": "joe"})), PutOptions::of_type("Person"))?
        .ok_or("put was skipped")?;
    let moved = db
        .move_key(&id, None, CopyOptions::default())?
        .ok_or("move was skipped")?;
    assert_ne!(moved, id);
    let hits = query(&db, json!({"name": "joe"}), IndexQuery::of_type("Person"))?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].key, moved);
    assert!(db.check_integrity()?.is_empty());
    Ok(())
}

fn point_db() -> Result<(tempfile::TempDir, IndexDb), kvdex::Error> {
    let (tmp, db) = open(Config::default().with_vectors(true))?;
    db.define_schema(
        "Point",
        SchemaOptions::default().vector_paths(vec![
            VectorFeature::numeric_range("x", 0.0, 1.0),
            VectorFeature::numeric_range("y", 0.0, 1.0),
        ]),
    )?;
    Ok((tmp, db))
}

#[test]
fn nearest_vectors_come_first() -> TestResult {
    let (_tmp, db) = point_db()?;
    let far = db
        .put(None, person(json!({"x": 1, "y": 1})), PutOptions::of_type("Point"))?
        .ok_or("put was skipped")?;
    let near = db
        .put(None, person(json!({"x": 0, "y": 1})), PutOptions::of_type("Point"))?
        .ok_or("put was skipped")?;

    let hits: Vec<_> = db
        .get_range_from_vector(
            vec![0.0f32, 1.0],
            None,
            None,
            VectorOptions::of_type("Point").sort(true),
        )?
        .collect::<kvdex::Result<_>>()?;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].key, near);
    assert!(hits[0].distance.abs() < 1e-6);
    assert_eq!(hits[1].key, far);
    assert!((hits[1].distance - 1.0).abs() < 1e-6);

    let within: Vec<_> = db
        .get_range_from_vector(
            person(json!({"x": 0.1, "y": 1})),
            None,
            None,
            VectorOptions::of_type("Point")
                .max_distance(0.5)
                .distance(Distance::Manhattan),
        )?
        .collect::<kvdex::Result<_>>()?;
    assert_eq!(within.len(), 1);
    assert_eq!(within[0].key, near);
    Ok(())
}

#[test]
fn learned_bounds_apply_after_reindex() -> TestResult {
    let (_tmp, db) = open(Config::default().with_vectors(true))?;
    db.define_schema(
        "Reading",
        SchemaOptions::default().vector_paths(vec![VectorFeature::numeric("temp")]),
    )?;
    let mut ids = Vec::new();
    for temp in [10, 20, 30] {
        ids.push(
            db.put(None, person(json!({"temp": temp})), PutOptions::of_type("Reading"))?
                .ok_or("put was skipped")?,
        );
    }
    let middle = || -> kvdex::Result<Vec<kvdex::VectorHit>> {
        db.get_range_from_vector(
            vec![0.5f32],
            None,
            None,
            VectorOptions::of_type("Reading").max_distance(0.01),
        )?
        .collect()
    };
    assert!(middle()?.is_empty());

    assert_eq!(db.reindex_vectors("Reading")?, 3);
    let hits = middle()?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].key, ids[1]);
    Ok(())
}

#[test]
fn vector_queries_are_rejected_when_disabled() -> TestResult {
    let (_tmp, db) = open(Config::default())?;
    let result = db.get_range_from_vector(
        vec![0.0f32],
        None,
        None,
        VectorOptions::default(),
    );
    assert!(matches!(result, Err(kvdex::Error::VectorsDisabled(_))));

    let (_tmp, db) = point_db()?;
    let result = db.get_range_from_vector(
        vec![0.0f32],
        None,
        None,
        VectorOptions::of_type("Person"),
    );
    assert!(matches!(result, Err(kvdex::Error::VectorsDisabled(_))));
    Ok(())
}

#[test]
fn settings_are_fixed_at_creation() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("kvdex.redb");
    drop(IndexDb::open(&path, Config::default())?);
    let reopened = IndexDb::open(&path, Config::default().with_fulltext(false));
    assert!(matches!(reopened, Err(kvdex::Error::Config(_))));
    assert!(IndexDb::open(&path, Config::default()).is_ok());
    Ok(())
}
