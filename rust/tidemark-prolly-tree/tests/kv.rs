use anyhow::Result;
use tidemark_prolly_tree::{HashBoundary, KvStore};
use tidemark_storage::{Blake3Hash, CborEncoder, MemoryBlockStore, Storage};

type TestStorage = Storage<CborEncoder, MemoryBlockStore<Blake3Hash, Vec<u8>>>;

fn storage() -> TestStorage {
    Storage {
        encoder: CborEncoder,
        backend: MemoryBlockStore::default(),
    }
}

fn bytes(s: &str) -> Vec<u8> {
    String::from(s).into_bytes()
}

#[tokio::test]
async fn basic_set_get_and_delete() -> Result<()> {
    let mut store = KvStore::<HashBoundary, _, _>::new(32, storage()).await?;

    store.set(bytes("a"), bytes("1")).await?;
    store.set(bytes("foo2"), bytes("bar2")).await?;
    store.set(bytes("foo3"), bytes("bar3")).await?;

    assert_eq!(store.get(&bytes("foo")).await?, None);
    assert_eq!(store.get(&bytes("a")).await?, Some(bytes("1")));
    assert_eq!(store.get(&bytes("foo2")).await?, Some(bytes("bar2")));
    assert_eq!(store.get(&bytes("foo3")).await?, Some(bytes("bar3")));

    store.set(bytes("foo2"), bytes("rewritten")).await?;
    assert_eq!(store.get(&bytes("foo2")).await?, Some(bytes("rewritten")));

    store.delete(&bytes("foo2")).await?;
    assert_eq!(store.get(&bytes("foo2")).await?, None);
    assert_eq!(store.get(&bytes("a")).await?, Some(bytes("1")));

    Ok(())
}

#[tokio::test]
async fn insertion_order_does_not_change_the_root() -> Result<()> {
    let storage = storage();

    let mut forward = KvStore::<HashBoundary, _, _>::new(32, storage.clone()).await?;
    let mut backward = KvStore::<HashBoundary, _, _>::new(32, storage).await?;

    let keys = (0..128)
        .map(|i| bytes(&format!("key-{i}")))
        .collect::<Vec<_>>();

    for key in &keys {
        forward.set(key.clone(), key.clone()).await?;
    }

    for key in keys.iter().rev() {
        backward.set(key.clone(), key.clone()).await?;
    }

    assert_eq!(
        forward.hash(),
        backward.hash(),
        "alternate insertion order results in same hash"
    );

    Ok(())
}

#[tokio::test]
async fn deleting_an_absent_key_changes_nothing() -> Result<()> {
    let mut store = KvStore::<HashBoundary, _, _>::new(32, storage()).await?;

    store.set(bytes("present"), bytes("value")).await?;
    let before = *store.hash();

    store.delete(&bytes("absent")).await?;

    assert_eq!(store.hash(), &before);

    Ok(())
}

#[tokio::test]
async fn reattaches_from_a_root_hash() -> Result<()> {
    let storage = storage();

    let mut store = KvStore::<HashBoundary, _, _>::new(32, storage.clone()).await?;
    for i in 0..256 {
        let key = bytes(&format!("key-{i}"));
        store.set(key.clone(), key).await?;
    }

    let root = *store.hash();
    let restored = KvStore::<HashBoundary, _, _>::from_hash(&root, storage).await?;

    assert_eq!(
        restored.get(&bytes("key-200")).await?,
        Some(bytes("key-200"))
    );
    assert_eq!(restored.get(&bytes("key-999")).await?, None);
    assert_eq!(restored.hash(), &root);

    Ok(())
}
