//! Restart behavior: the index is rebuilt from the data file alone

use single_file_store::error::Result;
use single_file_store::{JsonMarshaller, SingleFileStore, StoreConfig, StoreEntry};
use std::path::PathBuf;

type StringStore = SingleFileStore<String, String>;

fn temp_location(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sfs_persist_{}_{}", tag, std::process::id()))
}

fn open_store(location: &PathBuf) -> Result<StringStore> {
    let config = StoreConfig::new().with_location(location.to_str().unwrap());
    let store = SingleFileStore::new("cache", config, Box::new(JsonMarshaller));
    store.start(None)?;
    Ok(store)
}

#[test]
fn test_entries_survive_restart() -> Result<()> {
    let location = temp_location("restart");

    {
        let store = open_store(&location)?;
        store.store(StoreEntry::new("a".to_string(), "1".to_string()))?;
        store.store(StoreEntry::new("b".to_string(), "2".to_string()))?;
        store.stop()?;
    }

    let store = open_store(&location)?;
    assert_eq!(store.load(&"a".to_string())?.unwrap().value, "1");
    assert_eq!(store.load(&"b".to_string())?.unwrap().value, "2");
    assert_eq!(store.stats()?.entries, 2);

    std::fs::remove_dir_all(location).ok();
    Ok(())
}

#[test]
fn test_same_instance_can_be_restarted() -> Result<()> {
    let location = temp_location("same_instance");

    let store = open_store(&location)?;
    store.store(StoreEntry::new("k".to_string(), "v".to_string()))?;
    store.stop()?;

    store.start(None)?;
    assert_eq!(store.load(&"k".to_string())?.unwrap().value, "v");

    std::fs::remove_dir_all(location).ok();
    Ok(())
}

#[test]
fn test_expiry_survives_restart() -> Result<()> {
    let location = temp_location("expiry");

    {
        let store = open_store(&location)?;
        store.store(StoreEntry::expiring_at(
            "short".to_string(),
            "v".to_string(),
            1, // long past
        ))?;
        store.store(StoreEntry::expiring_at(
            "long".to_string(),
            "v".to_string(),
            i64::MAX,
        ))?;
        store.stop()?;
    }

    let store = open_store(&location)?;
    assert!(store.load(&"short".to_string())?.is_none());
    assert_eq!(store.load(&"long".to_string())?.unwrap().value, "v");
    // the expired slot migrated to the free list
    assert_eq!(store.stats()?.free_slots, 1);

    std::fs::remove_dir_all(location).ok();
    Ok(())
}

#[test]
fn test_removals_survive_restart() -> Result<()> {
    let location = temp_location("removals");

    let end_before;
    {
        let store = open_store(&location)?;
        store.store(StoreEntry::new("keep".to_string(), "v".to_string()))?;
        store.store(StoreEntry::new("drop".to_string(), "v".to_string()))?;
        store.remove(&"drop".to_string())?;
        end_before = store.stats()?.file_end;
        store.stop()?;
    }

    let store = open_store(&location)?;
    let stats = store.stats()?;
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.free_slots, 1);
    assert_eq!(stats.file_end, end_before);
    assert!(store.load(&"drop".to_string())?.is_none());

    // the freed region is reused instead of growing the file
    store.store(StoreEntry::new("drop".to_string(), "v".to_string()))?;
    assert_eq!(store.stats()?.file_end, end_before);
    assert_eq!(store.stats()?.free_slots, 0);

    std::fs::remove_dir_all(location).ok();
    Ok(())
}

#[test]
fn test_unknown_file_format_is_reset() -> Result<()> {
    let location = temp_location("unknown_format");
    std::fs::create_dir_all(&location).unwrap();
    std::fs::write(location.join("cache.dat"), b"not a store file at all").unwrap();

    let store = open_store(&location)?;
    assert_eq!(store.stats()?.entries, 0);

    // the file was rewritten with a fresh header and is usable
    store.store(StoreEntry::new("a".to_string(), "1".to_string()))?;
    store.stop()?;

    let store = open_store(&location)?;
    assert_eq!(store.load(&"a".to_string())?.unwrap().value, "1");

    std::fs::remove_dir_all(location).ok();
    Ok(())
}

#[test]
fn test_clear_survives_restart() -> Result<()> {
    let location = temp_location("clear");

    {
        let store = open_store(&location)?;
        for i in 0..10 {
            store.store(StoreEntry::new(format!("k{}", i), format!("v{}", i)))?;
        }
        store.clear()?;
        store.stop()?;
    }

    let store = open_store(&location)?;
    let stats = store.stats()?;
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.free_slots, 0);

    std::fs::remove_dir_all(location).ok();
    Ok(())
}
