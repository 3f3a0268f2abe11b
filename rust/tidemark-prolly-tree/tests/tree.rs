extern crate alloc;

use anyhow::Result;
use futures_util::{StreamExt, pin_mut};
use nonempty::nonempty;
use tidemark_prolly_tree::{
    AddressedBucket, Boundary, Bucket, Change, Cursor, Entry, HashBoundary, Node, ProllyTree,
    SearchResult, TidemarkProllyTreeError, Tuple, mutate, search,
};
use tidemark_storage::{Blake3Hash, CborEncoder, MeasuredBlockStore, MemoryBlockStore, Storage};

const AVERAGE: u32 = 32;

type TestTree = ProllyTree<Vec<u8>, Vec<u8>, Blake3Hash>;
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

fn entry(seq: i64, key: &str, value: &str) -> Entry<Vec<u8>, Vec<u8>> {
    Entry::new(Tuple::new(seq, bytes(key)), bytes(value))
}

fn numbered_entries(count: usize) -> Vec<Entry<Vec<u8>, Vec<u8>>> {
    (0..count)
        .map(|i| {
            let key = (i as u64).to_be_bytes().to_vec();
            let value = blake3::hash(&key).as_bytes().to_vec();
            Entry::new(Tuple::new(0, key), value)
        })
        .collect()
}

async fn tree_of<S>(storage: &mut S, entries: Vec<Entry<Vec<u8>, Vec<u8>>>) -> Result<TestTree>
where
    S: tidemark_storage::ContentAddressedStorage<Hash = Blake3Hash>,
{
    let tree = ProllyTree::empty(AVERAGE, storage).await?;
    let changes = entries.into_iter().map(Change::Put).collect();

    Ok(mutate::<HashBoundary, _, _, _, _>(storage, &tree, vec![changes]).await?)
}

async fn search_one(
    storage: &TestStorage,
    tree: &TestTree,
    tuple: Tuple<Vec<u8>>,
) -> Result<Option<Vec<u8>>> {
    let results = search(storage, tree, vec![tuple]);
    pin_mut!(results);

    match results.next().await.transpose()? {
        Some(SearchResult::Found(entry)) => Ok(Some(entry.value)),
        _ => Ok(None),
    }
}

#[tokio::test]
async fn basic_mutate_and_search() -> Result<()> {
    let mut storage = storage();
    let tree = tree_of(
        &mut storage,
        vec![
            entry(1, "foo1", "bar1"),
            entry(1, "foo2", "bar2"),
            entry(1, "foo3", "bar3"),
        ],
    )
    .await?;

    assert_eq!(
        search_one(&storage, &tree, Tuple::new(1, bytes("foo2"))).await?,
        Some(bytes("bar2"))
    );
    assert_eq!(
        search_one(&storage, &tree, Tuple::new(1, bytes("bar"))).await?,
        None
    );
    assert_eq!(
        search_one(&storage, &tree, Tuple::new(2, bytes("foo1"))).await?,
        None
    );

    Ok(())
}

#[tokio::test]
async fn alternate_mutation_orders_converge() -> Result<()> {
    let mut storage = storage();
    let entries = numbered_entries(512);

    let all_at_once = tree_of(&mut storage, entries.clone()).await?;

    let mut one_at_a_time = ProllyTree::empty(AVERAGE, &mut storage).await?;
    for entry in entries.iter().rev() {
        one_at_a_time = mutate::<HashBoundary, _, _, _, _>(
            &mut storage,
            &one_at_a_time,
            vec![vec![Change::Put(entry.clone())]],
        )
        .await?;
    }

    assert_eq!(
        all_at_once.hash(),
        one_at_a_time.hash(),
        "alternate insertion order results in same hash"
    );

    Ok(())
}

#[tokio::test]
async fn deletion_converges_on_the_smaller_tree() -> Result<()> {
    let mut storage = storage();
    let entries = numbered_entries(256);

    let mut without = entries.clone();
    let removed = without.remove(100);

    let expected = tree_of(&mut storage, without).await?;
    let full = tree_of(&mut storage, entries).await?;

    let pruned = mutate::<HashBoundary, _, _, _, _>(
        &mut storage,
        &full,
        vec![vec![Change::Del(removed.tuple.clone())]],
    )
    .await?;

    assert_eq!(pruned.hash(), expected.hash());
    assert_eq!(search_one(&storage, &pruned, removed.tuple).await?, None);

    Ok(())
}

#[tokio::test]
async fn empty_mutations_leave_the_root_address_alone() -> Result<()> {
    let mut storage = storage();
    let tree = tree_of(&mut storage, numbered_entries(64)).await?;

    let unchanged =
        mutate::<HashBoundary, _, _, _, _>(&mut storage, &tree, vec![vec![], vec![]]).await?;
    assert_eq!(unchanged.hash(), tree.hash());

    // Deleting a tuple that was never there is also a no-op
    let unchanged = mutate::<HashBoundary, _, _, _, _>(
        &mut storage,
        &tree,
        vec![vec![Change::Del(Tuple::new(7, bytes("absent")))]],
    )
    .await?;
    assert_eq!(unchanged.hash(), tree.hash());

    Ok(())
}

#[tokio::test]
async fn deleting_everything_yields_the_empty_tree() -> Result<()> {
    let mut storage = storage();
    let entries = numbered_entries(128);
    let tree = tree_of(&mut storage, entries.clone()).await?;

    let deletions = entries
        .into_iter()
        .map(|entry| Change::Del(entry.tuple))
        .collect();
    let emptied = mutate::<HashBoundary, _, _, _, _>(&mut storage, &tree, vec![deletions]).await?;

    let pristine = ProllyTree::<Vec<u8>, Vec<u8>, Blake3Hash>::empty(AVERAGE, &mut storage).await?;

    assert!(emptied.is_empty());
    assert_eq!(emptied.hash(), pristine.hash());

    Ok(())
}

#[tokio::test]
async fn later_batches_override_earlier_ones() -> Result<()> {
    let mut storage = storage();
    let tree = ProllyTree::empty(AVERAGE, &mut storage).await?;

    let tree = mutate::<HashBoundary, _, _, _, _>(
        &mut storage,
        &tree,
        vec![
            vec![Change::Put(entry(1, "key", "first"))],
            vec![Change::Put(entry(1, "key", "second"))],
        ],
    )
    .await?;

    assert_eq!(
        search_one(&storage, &tree, Tuple::new(1, bytes("key"))).await?,
        Some(bytes("second"))
    );

    Ok(())
}

#[tokio::test]
async fn unsorted_input_is_rejected_up_front() -> Result<()> {
    let mut storage = storage();
    let tree = tree_of(&mut storage, numbered_entries(8)).await?;
    let before = *tree.hash();

    let result = mutate::<HashBoundary, _, _, _, _>(
        &mut storage,
        &tree,
        vec![vec![
            Change::Put(entry(1, "b", "value")),
            Change::Put(entry(1, "a", "value")),
        ]],
    )
    .await;
    assert!(matches!(
        result,
        Err(TidemarkProllyTreeError::UnsortedInput(_))
    ));
    assert_eq!(tree.hash(), &before, "failed mutation leaves the tree alone");

    // Batches that sort backwards relative to each other are just as bad
    let result = mutate::<HashBoundary, _, _, _, _>(
        &mut storage,
        &tree,
        vec![
            vec![Change::Put(entry(2, "a", "value"))],
            vec![Change::Put(entry(1, "a", "value"))],
        ],
    )
    .await;
    assert!(matches!(
        result,
        Err(TidemarkProllyTreeError::UnsortedInput(_))
    ));

    let results = search(
        &storage,
        &tree,
        vec![Tuple::new(1, bytes("b")), Tuple::new(1, bytes("a"))],
    );
    pin_mut!(results);

    let mut saw_error = false;
    while let Some(result) = results.next().await {
        if let Err(TidemarkProllyTreeError::UnsortedInput(_)) = result {
            saw_error = true;
        }
    }
    assert!(saw_error);

    Ok(())
}

#[tokio::test]
async fn streams_entries_in_tuple_order() -> Result<()> {
    let mut storage = storage();
    let entries = numbered_entries(200);
    let tree = tree_of(&mut storage, entries.clone()).await?;

    let streamed = tree.stream(&storage);
    pin_mut!(streamed);

    let mut collected = Vec::new();
    while let Some(entry) = streamed.next().await {
        collected.push(entry?);
    }

    assert_eq!(collected, entries);

    Ok(())
}

#[tokio::test]
async fn restores_a_tree_from_its_root_hash() -> Result<()> {
    let mut storage = storage();
    let tree = tree_of(&mut storage, numbered_entries(64)).await?;
    let root_hash = *tree.hash();

    let restored = TestTree::from_hash(&root_hash, &storage).await?;

    let key = 42u64.to_be_bytes().to_vec();
    assert_eq!(
        search_one(&storage, &restored, Tuple::new(0, key.clone())).await?,
        Some(blake3::hash(&key).as_bytes().to_vec())
    );

    Ok(())
}

#[tokio::test]
async fn missing_blocks_surface_as_bucket_not_found() -> Result<()> {
    let mut populated = storage();
    let tree = tree_of(&mut populated, numbered_entries(8)).await?;

    let vacant = storage();
    let result = TestTree::from_hash(tree.hash(), &vacant).await;

    assert!(matches!(
        result,
        Err(TidemarkProllyTreeError::BucketNotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn cursors_refuse_backwards_seeks() -> Result<()> {
    let mut storage = storage();
    let tree = tree_of(&mut storage, numbered_entries(64)).await?;

    let mut cursor = Cursor::new(&tree);

    // Reading before positioning is an error, not a panic
    assert!(matches!(
        cursor.current(),
        Err(TidemarkProllyTreeError::InvalidState(_))
    ));

    let ahead = Tuple::new(0, 40u64.to_be_bytes().to_vec());
    let behind = Tuple::new(0, 10u64.to_be_bytes().to_vec());

    cursor.next_tuple(&storage, &ahead, 0).await?;
    assert_eq!(cursor.current()?.tuple(), &ahead);

    // Seeking to the same target again is fine
    cursor.next_tuple(&storage, &ahead, 0).await?;

    let result = cursor.next_tuple(&storage, &behind, 0).await;
    assert!(matches!(
        result,
        Err(TidemarkProllyTreeError::OutOfOrderSeek(_))
    ));

    Ok(())
}

#[tokio::test]
async fn buckets_round_trip_through_storage() -> Result<()> {
    let mut storage = storage();
    let tree = tree_of(&mut storage, numbered_entries(100)).await?;

    let fetched = TestTree::from_hash(tree.hash(), &storage).await?;

    assert_eq!(fetched.root().bucket(), tree.root().bucket());
    assert_eq!(fetched.average(), AVERAGE);

    Ok(())
}

#[tokio::test]
async fn searching_an_empty_tree_reads_nothing() -> Result<()> {
    let mut plain = storage();
    let tree = ProllyTree::<Vec<u8>, Vec<u8>, Blake3Hash>::empty(AVERAGE, &mut plain).await?;

    let measured = MeasuredBlockStore::new(plain.backend.clone());
    let storage = Storage {
        encoder: CborEncoder,
        backend: measured.clone(),
    };

    let tuples = (0..10)
        .map(|i: u64| Tuple::new(0, i.to_be_bytes().to_vec()))
        .collect::<Vec<_>>();

    let results = search(&storage, &tree, tuples);
    pin_mut!(results);

    while let Some(result) = results.next().await {
        assert!(matches!(result?, SearchResult::NotFound(_)));
    }

    assert_eq!(measured.reads(), 0);

    Ok(())
}

#[tokio::test]
async fn search_reaches_across_widely_separated_subtrees() -> Result<()> {
    // A fixed three-level shape: the first branch holds a single leaf,
    // so moving from it to a tuple under the second branch has to climb
    // past a parent that is already on its last child
    let mut storage = storage();

    let node = |seq: i64| Node::Entry(entry(seq, "k", &format!("value-{seq}")));
    let tuple = |seq: i64| Tuple::new(seq, bytes("k"));

    let first_leaf =
        AddressedBucket::store(Bucket::new(AVERAGE, 0, nonempty![node(0), node(5)]), &mut storage)
            .await?;
    let second_leaf = AddressedBucket::store(
        Bucket::new(AVERAGE, 0, nonempty![node(11), node(50)]),
        &mut storage,
    )
    .await?;
    let third_leaf =
        AddressedBucket::store(Bucket::new(AVERAGE, 0, nonempty![node(61)]), &mut storage).await?;

    let first_branch = AddressedBucket::store(
        Bucket::new(AVERAGE, 1, nonempty![Node::<Vec<u8>, Vec<u8>, Blake3Hash>::Reference(
            first_leaf.reference()?
        )]),
        &mut storage,
    )
    .await?;
    let second_branch = AddressedBucket::store(
        Bucket::new(
            AVERAGE,
            1,
            nonempty![
                Node::<Vec<u8>, Vec<u8>, Blake3Hash>::Reference(second_leaf.reference()?),
                Node::Reference(third_leaf.reference()?)
            ],
        ),
        &mut storage,
    )
    .await?;

    let root = AddressedBucket::store(
        Bucket::new(
            AVERAGE,
            2,
            nonempty![
                Node::<Vec<u8>, Vec<u8>, Blake3Hash>::Reference(first_branch.reference()?),
                Node::Reference(second_branch.reference()?)
            ],
        ),
        &mut storage,
    )
    .await?;

    let tree = TestTree::from_hash(root.hash(), &storage).await?;

    let results = search(
        &storage,
        &tree,
        vec![tuple(5), tuple(12), tuple(50), tuple(61)],
    );
    pin_mut!(results);

    let mut collected = Vec::new();
    while let Some(result) = results.next().await {
        collected.push(result?);
    }

    assert_eq!(
        collected,
        vec![
            SearchResult::Found(entry(5, "k", "value-5")),
            SearchResult::NotFound(tuple(12)),
            SearchResult::Found(entry(50, "k", "value-50")),
            SearchResult::Found(entry(61, "k", "value-61")),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn sparse_batched_lookups_find_every_stored_entry() -> Result<()> {
    let mut storage = storage();
    let tree = tree_of(&mut storage, numbered_entries(4096)).await?;

    // Widely spaced targets, so each seek skips over whole subtrees
    let keys = [1u64, 700, 1500, 2900, 4000];
    let mut tuples = keys
        .iter()
        .map(|i| Tuple::new(0, i.to_be_bytes().to_vec()))
        .collect::<Vec<_>>();
    tuples.push(Tuple::new(0, 5000u64.to_be_bytes().to_vec()));

    let results = search(&storage, &tree, tuples);
    pin_mut!(results);

    let mut collected = Vec::new();
    while let Some(result) = results.next().await {
        collected.push(result?);
    }

    assert_eq!(collected.len(), keys.len() + 1);

    for (key, result) in keys.iter().zip(&collected) {
        let key = key.to_be_bytes();

        match result {
            SearchResult::Found(entry) => {
                assert_eq!(entry.value, blake3::hash(&key).as_bytes().to_vec());
            }
            SearchResult::NotFound(tuple) => panic!("{tuple} missing from the tree"),
        }
    }

    assert!(matches!(collected.last(), Some(SearchResult::NotFound(_))));

    Ok(())
}

struct SplitEverything;

impl Boundary<Vec<u8>> for SplitEverything {
    fn is_boundary(_average: u32, _level: u32, _key: &Vec<u8>) -> bool {
        true
    }
}

#[tokio::test]
async fn degenerate_chunking_fails_instead_of_spinning() -> Result<()> {
    // With every key a boundary, each level holds one reference per
    // bucket and chunking upward never narrows toward a single root
    let mut storage = storage();
    let tree = ProllyTree::empty(AVERAGE, &mut storage).await?;

    let changes = numbered_entries(4).into_iter().map(Change::Put).collect();
    let result =
        mutate::<SplitEverything, _, _, _, _>(&mut storage, &tree, vec![changes]).await;

    assert!(matches!(
        result,
        Err(TidemarkProllyTreeError::UnexpectedShape(_))
    ));

    Ok(())
}

#[tokio::test]
async fn a_full_sweep_reads_each_bucket_at_most_once() -> Result<()> {
    let mut plain = storage();
    let tree = tree_of(&mut plain, numbered_entries(1024)).await?;

    let measured = MeasuredBlockStore::new(plain.backend.clone());
    let storage = Storage {
        encoder: CborEncoder,
        backend: measured.clone(),
    };

    let tuples = numbered_entries(1024)
        .into_iter()
        .map(|entry| entry.tuple)
        .collect::<Vec<_>>();

    let results = search(&storage, &tree, tuples);
    pin_mut!(results);

    let mut found = 0;
    while let Some(result) = results.next().await {
        if let SearchResult::Found(_) = result? {
            found += 1;
        }
    }

    assert_eq!(found, 1024);
    assert!(
        measured.reads() <= measured.writes() + 1024 / AVERAGE as usize * 2,
        "a single forward pass should not refetch buckets"
    );

    Ok(())
}
