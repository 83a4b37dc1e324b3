mod common;

use std::sync::Arc;

use narrate_core::manifest::CacheManifest;
use narrate_io::layout::manifest_path;
use narrate_io::storage::build_storage;
use narrate_io::{FsStorage, ManifestStore, Selections, Storage};

use common::temp_cache_dir;

#[test]
fn test_file_storage_builder_write_read() {
    let dir = temp_cache_dir("fs-builder");
    let storage = build_storage(&dir.to_string_lossy()).expect("fs storage");

    let bytes = b"hello world";
    storage.write("dev/segments/ab/seg.wav", bytes).expect("write");
    assert!(dir.join("dev/segments/ab/seg.wav").exists());
    assert_eq!(storage.read("dev/segments/ab/seg.wav").expect("read"), bytes);
    assert_eq!(storage.size("dev/segments/ab/seg.wav").unwrap(), 11);
}

#[test]
fn test_file_scheme_is_accepted() {
    let dir = temp_cache_dir("fs-scheme");
    let root = format!("file://{}", dir.to_string_lossy());
    let storage = build_storage(&root).expect("fs storage");
    storage.write("x", b"1").unwrap();
    assert!(dir.join("x").exists());
}

#[test]
fn test_invalid_scheme_errors() {
    let err = build_storage("ftp://example.com/cache")
        .err()
        .expect("should fail");
    assert!(err.to_string().contains("unsupported cache root scheme"));
}

#[test]
fn test_list_and_delete() {
    let dir = temp_cache_dir("fs-list");
    let storage = FsStorage::new(&dir);
    storage.write("dev/sfx/boom/b-0-v1.wav", b"b").unwrap();
    storage.write("dev/sfx/boom/a-0-v0.wav", b"a").unwrap();
    storage.write("dev/music/bed/c-0-v0.wav", b"c").unwrap();

    let listed = storage.list("dev/sfx/boom/").unwrap();
    assert_eq!(
        listed,
        vec!["dev/sfx/boom/a-0-v0.wav", "dev/sfx/boom/b-0-v1.wav"]
    );

    storage.delete("dev/sfx/boom/a-0-v0.wav").unwrap();
    storage.delete("dev/sfx/boom/a-0-v0.wav").unwrap();
    assert!(!storage.exists("dev/sfx/boom/a-0-v0.wav"));
}

#[test]
fn test_manifest_and_selections_survive_reopen() {
    let dir = temp_cache_dir("fs-reopen");
    {
        let storage: Arc<dyn Storage> = Arc::new(FsStorage::new(&dir));
        ManifestStore::new(Arc::clone(&storage))
            .save(&CacheManifest::new("prod"))
            .unwrap();
        let mut sel = Selections::default();
        sel.set("whoosh", 2);
        sel.save(storage.as_ref(), "prod").unwrap();
    }

    let storage: Arc<dyn Storage> = Arc::new(FsStorage::new(&dir));
    assert!(storage.exists(&manifest_path("prod")));
    let loaded = ManifestStore::new(Arc::clone(&storage))
        .load_existing("prod")
        .unwrap()
        .expect("manifest");
    assert_eq!(loaded.environment, "prod");
    assert!(loaded.is_empty());

    let sel = Selections::load(storage.as_ref(), "prod").unwrap();
    assert_eq!(sel.get("whoosh"), Some(2));
}
