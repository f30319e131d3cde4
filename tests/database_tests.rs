//! End-to-end tests for the database facades: the read contract, the
//! insert/delete protocols, flush semantics and the reader retry protocol.

use std::time::Duration;

use tempfile::TempDir;

use shale::{
    Database, DatabaseConfig, DocId, DocumentContents, PostingEntry, ShaleError, WritableDatabase,
};

fn doc1() -> DocumentContents {
    let mut doc = DocumentContents::new("hello");
    doc.add_key(1, "a");
    doc.add_term("cat", 2, vec![0, 3]);
    doc.add_term("dog", 1, vec![1]);
    doc
}

fn doc2() -> DocumentContents {
    let mut doc = DocumentContents::new("world");
    doc.add_term("cat", 1, vec![5]);
    doc
}

/// What `get_document` returns for an inserted document: the same
/// contents with each term's termfreq recomputed from the lexicon.
fn with_termfreqs(mut doc: DocumentContents, termfreqs: &[(&str, u64)]) -> DocumentContents {
    for (term, termfreq) in termfreqs {
        doc.terms
            .get_mut(*term)
            .expect("term present in document")
            .termfreq = *termfreq;
    }
    doc
}

fn postings(db: &Database, term: &str) -> Vec<PostingEntry> {
    db.open_post_list(term).unwrap().collect()
}

#[test]
fn test_empty_database() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());
    WritableDatabase::open(&config).unwrap();

    let db = Database::open(&config).unwrap();
    assert_eq!(db.get_doccount().unwrap(), 0);
    assert_eq!(db.get_avlength().unwrap(), 0.0);
    assert!(!db.term_exists("x").unwrap());
    assert_eq!(db.get_termfreq("x").unwrap(), 0);
    assert_eq!(db.get_collection_freq("x").unwrap(), 0);
    assert!(postings(&db, "x").is_empty());
}

#[test]
fn test_insert_flush_and_read_back() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    let writer = WritableDatabase::open(&config).unwrap();
    let did1 = writer.add_document(&doc1()).unwrap();
    assert_ne!(did1, 0);
    writer.flush().unwrap();

    let db = Database::open(&config).unwrap();
    assert_eq!(db.get_doccount().unwrap(), 1);
    assert_eq!(db.get_avlength().unwrap(), 3.0);
    assert_eq!(db.get_termfreq("cat").unwrap(), 1);
    assert!(db.term_exists("cat").unwrap());
    assert_eq!(
        postings(&db, "cat"),
        vec![PostingEntry {
            docid: did1,
            wdf: 2,
            doclen: 3
        }]
    );

    let fetched = db.get_document(did1).unwrap();
    assert_eq!(fetched, with_termfreqs(doc1(), &[("cat", 1), ("dog", 1)]));
}

#[test]
fn test_second_document_updates_statistics() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    let writer = WritableDatabase::open(&config).unwrap();
    writer.add_document(&doc1()).unwrap();
    writer.flush().unwrap();
    let did2 = writer.add_document(&doc2()).unwrap();
    writer.flush().unwrap();

    let db = Database::open(&config).unwrap();
    assert_eq!(db.get_doccount().unwrap(), 2);
    assert_eq!(db.get_avlength().unwrap(), 2.0);
    assert_eq!(db.get_termfreq("cat").unwrap(), 2);
    assert_eq!(db.get_collection_freq("cat").unwrap(), 3);

    let cat = postings(&db, "cat");
    assert_eq!(cat.len(), 2);
    assert_eq!(cat[1].docid, did2);
    assert_eq!(cat[1].wdf, 1);
    assert_eq!(cat[1].doclen, 1);
}

#[test]
fn test_delete_unindexes_document() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    let writer = WritableDatabase::open(&config).unwrap();
    let did1 = writer.add_document(&doc1()).unwrap();
    writer.flush().unwrap();
    let did2 = writer.add_document(&doc2()).unwrap();
    writer.flush().unwrap();

    writer.delete_document(did1).unwrap();
    writer.flush().unwrap();

    let db = Database::open(&config).unwrap();
    assert_eq!(db.get_doccount().unwrap(), 1);
    assert_eq!(db.get_avlength().unwrap(), 1.0);
    assert_eq!(db.get_termfreq("cat").unwrap(), 1);
    assert_eq!(db.get_termfreq("dog").unwrap(), 0);
    assert!(!db.term_exists("dog").unwrap());
    assert_eq!(
        postings(&db, "cat"),
        vec![PostingEntry {
            docid: did2,
            wdf: 1,
            doclen: 1
        }]
    );

    match db.get_document(did1) {
        Err(ShaleError::DocumentNotFound(did)) => assert_eq!(did, did1),
        other => panic!("expected DocumentNotFound, got {:?}", other),
    }
}

#[test]
fn test_reads_see_buffered_writes() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    {
        let writer = WritableDatabase::open(&config).unwrap();
        let did1 = writer.add_document(&doc1()).unwrap();

        // Nothing has been flushed, but the session's own reads see the
        // buffered document.
        assert_eq!(writer.get_doccount().unwrap(), 1);
        assert_eq!(writer.get_termfreq("cat").unwrap(), 1);
        let fetched = writer.get_document(did1).unwrap();
        assert_eq!(fetched, with_termfreqs(doc1(), &[("cat", 1), ("dog", 1)]));

        // Dropped without a flush: the buffer is discarded.
    }

    let db = Database::open(&config).unwrap();
    assert_eq!(db.get_doccount().unwrap(), 0);
    assert!(!db.term_exists("cat").unwrap());
}

#[test]
fn test_flush_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    let writer = WritableDatabase::open(&config).unwrap();
    writer.add_document(&doc1()).unwrap();
    writer.flush().unwrap();

    let snapshot = |dir: &std::path::Path| -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<(String, Vec<u8>)> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                (
                    entry.file_name().to_string_lossy().into_owned(),
                    std::fs::read(entry.path()).unwrap(),
                )
            })
            .collect();
        files.sort();
        files
    };

    let before = snapshot(tmp.path());
    writer.flush().unwrap();
    writer.flush().unwrap();
    assert_eq!(snapshot(tmp.path()), before);
}

#[test]
fn test_termfreq_zero_iff_term_absent() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    let writer = WritableDatabase::open(&config).unwrap();
    let did1 = writer.add_document(&doc1()).unwrap();
    writer.flush().unwrap();

    for term in ["cat", "dog", "ghost", ""] {
        let exists = writer.term_exists(term).unwrap();
        let termfreq = writer.get_termfreq(term).unwrap();
        assert_eq!(termfreq == 0, !exists, "term {:?}", term);
    }

    writer.delete_document(did1).unwrap();
    writer.flush().unwrap();
    for term in ["cat", "dog"] {
        assert!(!writer.term_exists(term).unwrap());
        assert_eq!(writer.get_termfreq(term).unwrap(), 0);
    }
}

#[test]
fn test_total_length_matches_documents() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    let writer = WritableDatabase::open(&config).unwrap();
    let mut docids = Vec::new();
    docids.push(writer.add_document(&doc1()).unwrap());
    docids.push(writer.add_document(&doc2()).unwrap());
    let mut doc3 = DocumentContents::new("third");
    doc3.add_term("emu", 7, vec![]);
    docids.push(writer.add_document(&doc3).unwrap());
    writer.flush().unwrap();

    let db = Database::open(&config).unwrap();
    let doccount = db.get_doccount().unwrap();
    assert_eq!(doccount, 3);

    let total: u64 = docids
        .iter()
        .map(|&did| db.open_term_list(did).unwrap().doclength())
        .sum();
    assert_eq!(total, 3 + 1 + 7);
    assert_eq!(db.get_avlength().unwrap(), total as f64 / doccount as f64);
}

#[test]
fn test_term_list_cursor() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    let writer = WritableDatabase::open(&config).unwrap();
    writer.add_document(&doc1()).unwrap();
    writer.add_document(&doc2()).unwrap();
    writer.flush().unwrap();

    let db = Database::open(&config).unwrap();
    let mut cursor = db.open_term_list(1).unwrap();
    assert_eq!(cursor.doclength(), 3);

    let first = cursor.next().unwrap();
    assert_eq!((first.term.as_str(), first.wdf, first.termfreq), ("cat", 2, 2));
    let second = cursor.next().unwrap();
    assert_eq!((second.term.as_str(), second.wdf, second.termfreq), ("dog", 1, 1));
    assert!(cursor.at_end());

    match db.open_term_list(42) {
        Err(ShaleError::DocumentNotFound(42)) => {}
        other => panic!("expected DocumentNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_posting_cursor_skip_to() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    let writer = WritableDatabase::open(&config).unwrap();
    let mut docids: Vec<DocId> = Vec::new();
    for i in 0..20u64 {
        let mut doc = DocumentContents::new(format!("doc {}", i));
        doc.add_term("common", 1, vec![0]);
        docids.push(writer.add_document(&doc).unwrap());
    }
    writer.flush().unwrap();

    let db = Database::open(&config).unwrap();
    let mut cursor = db.open_post_list("common").unwrap();
    assert_eq!(cursor.termfreq(), 20);
    assert_eq!(cursor.collection_freq(), 20);

    let target = docids[12];
    let hit = cursor.skip_to(target).unwrap();
    assert_eq!(hit.docid, target);
    assert_eq!(cursor.next().unwrap().docid, docids[13]);
    assert!(cursor.skip_to(docids[19] + 1).is_none());
}

#[test]
fn test_cursor_outlives_database() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    let writer = WritableDatabase::open(&config).unwrap();
    writer.add_document(&doc1()).unwrap();
    writer.flush().unwrap();

    let db = Database::open(&config).unwrap();
    let cursor = db.open_post_list("cat").unwrap();
    drop(db);

    let entries: Vec<PostingEntry> = cursor.collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].wdf, 2);
}

#[test]
fn test_lazy_document() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    let writer = WritableDatabase::open(&config).unwrap();
    let did1 = writer.add_document(&doc1()).unwrap();
    writer.flush().unwrap();

    let db = Database::open(&config).unwrap();
    let handle = db.open_document(did1).unwrap();
    assert_eq!(handle.docid(), did1);
    assert_eq!(handle.get_data().unwrap(), b"hello");
    assert_eq!(handle.get_attribute(1).unwrap(), Some(b"a".to_vec()));
    assert_eq!(handle.get_attribute(9).unwrap(), None);
    assert_eq!(handle.get_all_attributes().unwrap().len(), 1);
    assert_eq!(
        handle.get_full_contents().unwrap(),
        with_termfreqs(doc1(), &[("cat", 1), ("dog", 1)])
    );

    // The handle stays usable after the database itself is dropped.
    drop(db);
    assert_eq!(handle.get_data().unwrap(), b"hello");

    // Opening a handle on an absent docid succeeds; the reads fail.
    let writer_handle = writer.open_document(999).unwrap();
    assert!(writer_handle.get_data().is_err());
}

#[test]
fn test_read_only_database_rejects_mutations() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());
    WritableDatabase::open(&config).unwrap();

    let db = Database::open(&config).unwrap();
    let read_only = |result: std::result::Result<(), ShaleError>| match result {
        Err(ShaleError::InvalidOperation(message)) => {
            assert!(message.contains("read-only"), "message: {}", message)
        }
        other => panic!("expected InvalidOperation, got {:?}", other),
    };

    read_only(db.add_document(&doc1()).map(|_| ()));
    read_only(db.delete_document(1));
    read_only(db.replace_document(1, &doc1()));
    read_only(db.begin_session(Duration::ZERO));
    read_only(db.end_session());
    read_only(db.flush());
    read_only(db.begin_transaction());
    read_only(db.commit_transaction());
    read_only(db.cancel_transaction());
}

#[test]
fn test_unimplemented_surface() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    let writer = WritableDatabase::open(&config).unwrap();
    let did1 = writer.add_document(&doc1()).unwrap();
    writer.flush().unwrap();

    let unimplemented = |result: std::result::Result<(), ShaleError>| match result {
        Err(ShaleError::Unimplemented(_)) => {}
        other => panic!("expected Unimplemented, got {:?}", other),
    };

    unimplemented(writer.get_doclength(did1).map(|_| ()));
    unimplemented(writer.open_position_list(did1, "cat").map(|_| ()));
    unimplemented(writer.replace_document(did1, &doc2()));
    unimplemented(writer.begin_transaction());
    unimplemented(writer.commit_transaction());
    unimplemented(writer.cancel_transaction());

    let db = Database::open(&config).unwrap();
    unimplemented(db.get_doclength(did1).map(|_| ()));
    unimplemented(db.open_position_list(did1, "cat").map(|_| ()));
}

#[test]
fn test_session_lock_excludes_second_writer() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    let first = WritableDatabase::open(&config).unwrap();
    let second = WritableDatabase::open(&config).unwrap();

    first.begin_session(Duration::ZERO).unwrap();
    match second.begin_session(Duration::ZERO) {
        Err(ShaleError::DatabaseLocked) => {}
        other => panic!("expected DatabaseLocked, got {:?}", other),
    }
    match second.begin_session(Duration::from_millis(50)) {
        Err(ShaleError::DatabaseLocked) => {}
        other => panic!("expected DatabaseLocked, got {:?}", other),
    }

    first.end_session().unwrap();
    second.begin_session(Duration::ZERO).unwrap();
    second.end_session().unwrap();

    match second.end_session() {
        Err(ShaleError::InvalidOperation(_)) => {}
        other => panic!("expected InvalidOperation, got {:?}", other),
    }
}

#[test]
fn test_docids_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    let did1;
    {
        let writer = WritableDatabase::open(&config).unwrap();
        did1 = writer.add_document(&doc1()).unwrap();
        writer.flush().unwrap();
    }

    let writer = WritableDatabase::open(&config).unwrap();
    let did2 = writer.add_document(&doc2()).unwrap();
    writer.flush().unwrap();

    assert!(did2 > did1);
    assert_eq!(writer.get_doccount().unwrap(), 2);
}

#[test]
fn test_reader_retries_after_concurrent_commit() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path());

    let writer = WritableDatabase::open(&config).unwrap();
    let did1 = writer.add_document(&doc1()).unwrap();
    writer.flush().unwrap();

    // The reader opens the snapshot holding only doc1.
    let db = Database::open(&config).unwrap();
    assert_eq!(db.get_doccount().unwrap(), 1);

    // A concurrent commit replaces that snapshot.
    writer.add_document(&doc2()).unwrap();
    writer.flush().unwrap();

    // The multi-table read notices, reopens, and completes transparently
    // against the new snapshot.
    let fetched = db.get_document(did1).unwrap();
    assert_eq!(fetched, with_termfreqs(doc1(), &[("cat", 2), ("dog", 1)]));

    // Single-table reads surface the staleness to the caller instead.
    writer.delete_document(did1).unwrap();
    writer.flush().unwrap();
    match db.get_termfreq("cat") {
        Ok(_) | Err(ShaleError::DatabaseModified) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_modification_log_is_written() {
    let tmp = TempDir::new().unwrap();
    let config = DatabaseConfig::new(tmp.path()).logfile("access.log");

    let writer = WritableDatabase::open(&config).unwrap();
    writer.add_document(&doc1()).unwrap();
    writer.flush().unwrap();
    drop(writer);

    let log_path = tmp.path().join("access.log");
    let contents = std::fs::read(&log_path).unwrap();
    assert!(!contents.is_empty());

    let text = String::from_utf8_lossy(&contents);
    assert!(text.contains("add docid=1"));
    assert!(text.contains("commit revision=2"));
}
