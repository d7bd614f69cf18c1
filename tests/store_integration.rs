use std::fs;

use tempfile::TempDir;

use fragdex::config::StoreFormat;
use fragdex::index::{IndexBuilder, InvertedIndex};
use fragdex::store::IndexStore;
use fragdex::FragdexError;

fn build(docs: &[&str]) -> InvertedIndex {
    let mut builder = IndexBuilder::new();
    for doc in docs {
        builder.add_document(doc).unwrap();
    }
    builder.into_index()
}

fn setup(format: StoreFormat) -> (TempDir, IndexStore) {
    let tmp = TempDir::new().unwrap();
    let store = IndexStore::open(tmp.path().join("indexes"), format).unwrap();
    (tmp, store)
}

#[test]
fn update_is_idempotent() {
    for format in [StoreFormat::Text, StoreFormat::Compressed] {
        let (_tmp, store) = setup(format);
        store.save("global", &build(&["Hello world", "World of Java"])).unwrap();

        let mut delta = InvertedIndex::new();
        delta.insert_position("world", 7, 0);
        delta.insert_position("rust", 7, 1);
        delta.insert_position("hello", 0, 0);

        store.update("global", &delta).unwrap();
        let once = store.load("global").unwrap();
        store.update("global", &delta).unwrap();
        let twice = store.load("global").unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.doc_ids("world"), vec![0, 1, 7]);
        assert_eq!(twice.doc_ids("rust"), vec![7]);
        assert_eq!(twice.doc_ids("hello"), vec![0]);
    }
}

#[test]
fn update_unions_positions_of_the_same_document() {
    let (_tmp, store) = setup(StoreFormat::Text);
    store.save("global", &build(&["a b"])).unwrap();

    let mut delta = InvertedIndex::new();
    delta.insert_position("a", 0, 5);
    store.update("global", &delta).unwrap();

    let index = store.load("global").unwrap();
    assert_eq!(index.postings("a").unwrap().get(0).unwrap().positions(), &[0, 5]);
}

#[test]
fn absent_and_corrupt_are_distinguished() {
    let (_tmp, store) = setup(StoreFormat::Text);

    assert!(matches!(
        store.load("missing"),
        Err(FragdexError::IndexNotFound(name)) if name == "missing"
    ));

    fs::write(store.path_of("broken").unwrap(), "good:Doc 0 -> [0]\nbad line\n").unwrap();
    match store.load("broken") {
        Err(FragdexError::CorruptIndexFormat { location, line, .. }) => {
            assert_eq!(location, "broken");
            assert_eq!(line, 2);
        }
        other => panic!("expected corruption, got {:?}", other),
    }

    // A corrupt target is never silently replaced by update
    assert!(store.update("broken", &build(&["x"])).is_err());
    assert!(store.load("broken").is_err());
}

#[test]
fn corrupt_compressed_file_is_detected() {
    let (_tmp, store) = setup(StoreFormat::Compressed);
    store.save("frag", &build(&["search engine", "engine room"])).unwrap();

    let path = store.path_of("frag").unwrap();
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    assert!(matches!(
        store.load("frag"),
        Err(FragdexError::CorruptIndexFormat { .. })
    ));
}

#[test]
fn save_replaces_without_leaving_temporary_files() {
    let (_tmp, store) = setup(StoreFormat::Text);
    store.save("global", &build(&["first version"])).unwrap();
    store.save("global", &build(&["second version"])).unwrap();

    assert_eq!(store.list().unwrap(), vec!["global".to_string()]);
    let index = store.load("global").unwrap();
    assert_eq!(index.doc_ids("second"), vec![0]);
    assert!(index.doc_ids("first").is_empty());

    let leftovers: Vec<_> = fs::read_dir(store.dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn delete_then_exists() {
    let (_tmp, store) = setup(StoreFormat::Compressed);
    store.save("a", &build(&["x"])).unwrap();
    assert!(store.exists("a").unwrap());
    store.delete("a").unwrap();
    assert!(!store.exists("a").unwrap());
    assert!(store.list().unwrap().is_empty());
}
