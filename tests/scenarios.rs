//! Black-box scenarios against the crate's public facade: a schema, a
//! doc table, and the query planner/executor wired together the way a
//! host would. Each test mirrors one of the engine's seed scenarios --
//! insert-and-find, delete visibility, numeric range, galloping
//! intersect, wildcard-minus-not, and a fork-GC commit race against a
//! live term reader.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use ftscore::doctable::{DocFlags, DocTable};
use ftscore::gc::{run_round, GcOutcome, GcSnapshot, PauseFlag};
use ftscore::index_tables::{NumericTree, TagIndex, TermIndex};
use ftscore::inverted_index::{IndexFlags, Posting};
use ftscore::iterator::{Deadline, IndexIterator, ReadResult, TermReader};
use ftscore::query::{QueryPlanner, Schema, SearchRequest};
use ftscore::{Config, ExecutionEngine};

/// Indexes `text` into `field_mask`'s postings for `doc_id`, one entry
/// per distinct token with per-token frequency and in-field offsets --
/// the minimum a host's tokenizer would hand this crate for a text field.
fn index_text(schema: &Schema, doc_id: u64, field_mask: u64, text: &str) {
    let mut per_token: std::collections::BTreeMap<&str, Vec<u32>> = std::collections::BTreeMap::new();
    for (pos, tok) in text.split_whitespace().enumerate() {
        per_token.entry(tok).or_default().push(pos as u32);
    }
    for (tok, offsets) in per_token {
        let (idx, _) = schema.terms().get_or_create(tok.as_bytes());
        let freq = offsets.len() as u32;
        idx.write()
            .write_entry(doc_id, &Posting { doc_id, freq, field_mask, offsets, numeric_value: None })
            .unwrap();
    }
}

fn put(table: &DocTable, key: &str) -> u64 {
    table.put(key.as_bytes(), 1.0, DocFlags::default(), None).unwrap().handle.id
}

fn search(schema: &Schema, query: &str, limit: usize) -> Vec<u64> {
    let planner = QueryPlanner::new(schema);
    let plan = planner.plan(&SearchRequest::new(query).with_limit(limit)).unwrap();
    ExecutionEngine::new().execute(plan).unwrap().into_iter().map(|r| r.doc_id).collect()
}

/// S1: insert two docs, each with distinct and shared text, and confirm
/// a single-term query finds exactly the right set in insertion order.
#[test]
fn s1_insert_and_find() {
    let doc_table = Arc::new(DocTable::new(1000));
    let mut schema = Schema::new(doc_table.clone());
    let body = schema.add_text_field("body").unwrap();

    let doc1 = put(&doc_table, "doc1");
    let doc2 = put(&doc_table, "doc2");
    index_text(&schema, doc1, body, "hello world");
    index_text(&schema, doc2, body, "hello there");

    assert_eq!(search(&schema, "hello", 10), vec![doc1, doc2]);
    assert_eq!(search(&schema, "world", 10), vec![doc1]);
}

/// S2: after deleting doc1, the same queries reflect its absence, and a
/// GC round observes the "world" posting list emptied out.
#[test]
fn s2_delete_visibility() {
    let doc_table = Arc::new(DocTable::new(1000));
    let mut schema = Schema::new(doc_table.clone());
    let body = schema.add_text_field("body").unwrap();

    let doc1 = put(&doc_table, "doc1");
    let doc2 = put(&doc_table, "doc2");
    index_text(&schema, doc1, body, "hello world");
    index_text(&schema, doc2, body, "hello there");

    doc_table.pop(b"doc1");

    assert_eq!(search(&schema, "hello", 10), vec![doc2]);
    assert_eq!(search(&schema, "world", 10), Vec::<u64>::new());

    let snapshot = GcSnapshot {
        doc_table: doc_table.clone(),
        terms: schema.terms().clone(),
        tags: Arc::new(TagIndex::new(IndexFlags::DOCIDS_ONLY)),
        numeric: Arc::new(NumericTree::new(1000)),
    };
    let pause = PauseFlag::new();
    let stop = AtomicBool::new(false);
    let outcome = run_round(&snapshot, &Config::for_testing(), &pause, &stop);
    assert_eq!(outcome, GcOutcome::Completed);

    let world_idx = schema.terms().get(b"world").unwrap();
    assert_eq!(world_idx.read().num_docs(), 0);
}

/// S3: a numeric range query returns only the docs whose value falls
/// inside the (inclusive) range, ascending by doc-id.
#[test]
fn s3_numeric_range() {
    let doc_table = Arc::new(DocTable::new(1000));
    let mut schema = Schema::new(doc_table.clone());
    let tree = schema.add_numeric_field("price", 10_000);

    let mut ids = Vec::new();
    for price in [10.0, 20.0, 30.0, 40.0] {
        let key = format!("doc-{price}");
        let id = put(&doc_table, &key);
        tree.insert(id, price).unwrap();
        ids.push(id);
    }

    let found = search(&schema, "@price:[15 35]", 10);
    assert_eq!(found, vec![ids[1], ids[2]]);
}

/// S4: with 1000 docs split across two tags and a 100-doc overlap, an
/// intersection of both tags returns exactly the overlap.
#[test]
fn s4_intersect_galloping() {
    let doc_table = Arc::new(DocTable::new(2000));
    let mut schema = Schema::new(doc_table.clone());
    let tags = schema.add_tag_field("tag");

    let a_idx = tags.get_or_create(b"a");
    let b_idx = tags.get_or_create(b"b");

    for i in 0..1000u64 {
        let key = format!("doc{i}");
        let id = put(&doc_table, &key);
        let has_a = i < 550;
        let has_b = i >= 450;
        if has_a {
            a_idx.write().write_entry(id, &Posting::doc_id_only(id)).unwrap();
        }
        if has_b {
            b_idx.write().write_entry(id, &Posting::doc_id_only(id)).unwrap();
        }
    }

    let found = search(&schema, "@tag:{a} @tag:{b}", 1000);
    assert_eq!(found.len(), 100);
}

/// S5: `-@color:{red}` over 10 docs where doc3 and doc7 are red returns
/// the remaining 8, ascending.
#[test]
fn s5_wildcard_and_not() {
    let doc_table = Arc::new(DocTable::new(100));
    let mut schema = Schema::new(doc_table.clone());
    let tags = schema.add_tag_field("color");
    let red_idx = tags.get_or_create(b"red");

    let mut ids = Vec::new();
    for i in 1..=10u64 {
        let key = format!("doc{i}");
        let id = put(&doc_table, &key);
        ids.push(id);
    }
    red_idx.write().write_entry(ids[2], &Posting::doc_id_only(ids[2])).unwrap();
    red_idx.write().write_entry(ids[6], &Posting::doc_id_only(ids[6])).unwrap();

    let expected: Vec<u64> = ids.iter().copied().filter(|id| *id != ids[2] && *id != ids[6]).collect();
    assert_eq!(search(&schema, "-@color:{red}", 10), expected);
}

/// S6: a `TermReader` opened before a burst of fresh inserts, and before
/// a GC round over an unrelated term, must still yield exactly its
/// original snapshot -- no duplicates, and none of the fresh ids it never
/// promised to see.
#[test]
fn s6_fork_gc_commit_race_does_not_disturb_a_live_reader() {
    let doc_table = Arc::new(DocTable::new(10_000));
    let terms = Arc::new(TermIndex::new(IndexFlags::DOCIDS_ONLY, false));

    let (hello_idx, _) = terms.get_or_create(b"hello");
    let mut pre_insert_ids = Vec::new();
    for i in 0..50u64 {
        let key = format!("doc{i}");
        let id = put(&doc_table, &key);
        hello_idx.write().write_entry(id, &Posting::doc_id_only(id)).unwrap();
        pre_insert_ids.push(id);
    }

    let mut reader = TermReader::new(hello_idx.clone(), Deadline::far_future()).unwrap();
    let mut seen = Vec::new();
    for _ in 0..10 {
        match reader.read().unwrap() {
            ReadResult::Found(p) => seen.push(p.doc_id),
            other => panic!("unexpected {other:?}"),
        }
    }

    // 200 fresh docs land in the SAME term after the reader snapshotted
    // it; this forces new blocks but must not bump the index's gc
    // marker (only GC/repair does that), so the live reader stays on
    // its original snapshot.
    for i in 50..250u64 {
        let key = format!("doc{i}");
        let id = put(&doc_table, &key);
        hello_idx.write().write_entry(id, &Posting::doc_id_only(id)).unwrap();
    }

    // GC runs, but only over an unrelated term -- "hello" is untouched.
    let (other_idx, _) = terms.get_or_create(b"unrelated");
    let unrelated_id = put(&doc_table, "unrelated-doc");
    other_idx.write().write_entry(unrelated_id, &Posting::doc_id_only(unrelated_id)).unwrap();
    doc_table.pop(b"unrelated-doc");

    let snapshot = GcSnapshot {
        doc_table: doc_table.clone(),
        terms: terms.clone(),
        tags: Arc::new(TagIndex::new(IndexFlags::DOCIDS_ONLY)),
        numeric: Arc::new(NumericTree::new(1000)),
    };
    let pause = PauseFlag::new();
    let stop = AtomicBool::new(false);
    let outcome = run_round(&snapshot, &Config::for_testing(), &pause, &stop);
    assert_eq!(outcome, GcOutcome::Completed);

    loop {
        match reader.read().unwrap() {
            ReadResult::Found(p) => seen.push(p.doc_id),
            ReadResult::Eof => break,
            other => panic!("unexpected {other:?}"),
        }
    }

    assert_eq!(seen, pre_insert_ids);
    let mut dedup = seen.clone();
    dedup.dedup();
    assert_eq!(dedup.len(), seen.len());
}
