//! Unit tests for Table.
//!
//! Covers lookups, path-copying mutations and the generation history of
//! table versions.

use hmt::persistent::{Entry, HashError, KeyHasher, SeededHasher, Table};
use rstest::rstest;
use std::collections::{BTreeMap, HashMap};

fn value_of<H: KeyHasher>(table: &Table<i32, H>, key: &str) -> Option<i32> {
    table.get(key).unwrap().map(|entry| entry.value)
}

fn install_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Digests every key to the same value.
struct ConstantHasher;

impl KeyHasher for ConstantHasher {
    fn digest(&self, _key: &[u8]) -> Result<u64, HashError> {
        Ok(0x5eed)
    }
}

/// Digests keys to their first byte, spreading them over one trie level.
struct FirstByteHasher;

impl KeyHasher for FirstByteHasher {
    fn digest(&self, key: &[u8]) -> Result<u64, HashError> {
        Ok(key.first().copied().map_or(0, u64::from))
    }
}

/// Digests keys to the big-endian `u64` held in their first eight bytes.
struct PrefixHasher;

impl KeyHasher for PrefixHasher {
    fn digest(&self, key: &[u8]) -> Result<u64, HashError> {
        key.get(..8)
            .and_then(|prefix| <[u8; 8]>::try_from(prefix).ok())
            .map(u64::from_be_bytes)
            .ok_or_else(|| HashError::digest(key.len(), "key shorter than its digest"))
    }
}

/// Builds a key whose digest under `PrefixHasher` is `digest`.
fn prefixed(digest: u64, tag: &str) -> Vec<u8> {
    let mut key = digest.to_be_bytes().to_vec();
    key.extend_from_slice(tag.as_bytes());
    key
}

// =============================================================================
// Empty table
// =============================================================================

#[rstest]
fn test_new_creates_empty_table() {
    let table: Table<i32> = Table::new();
    assert!(table.is_empty());
    assert_eq!(table.len(), 0);
    assert_eq!(table.entries().count(), 0);
}

#[rstest]
fn test_get_on_empty_table_returns_none() {
    let table: Table<i32> = Table::new();
    assert_eq!(value_of(&table, "key"), None);
    assert_eq!(value_of(&table, ""), None);
}

#[rstest]
fn test_del_on_empty_table_is_noop() {
    let table: Table<i32> = Table::new();
    let deleted = table.del("key").unwrap();
    assert_eq!(deleted.generation(), 0);
    assert_eq!(deleted.history().count(), 1);
}

// =============================================================================
// Set and get
// =============================================================================

#[rstest]
fn test_set_and_get_single_entry() {
    let table = Table::new().set("message", "Hello Friend").unwrap();
    let entry = table.get("message").unwrap().unwrap();
    assert_eq!(entry.key.as_bytes(), b"message");
    assert_eq!(entry.value, "Hello Friend");
}

#[rstest]
#[case::empty_key(&b""[..])]
#[case::binary_key(&[0u8, 255, 0, 255][..])]
#[case::long_key(&[7u8; 4096][..])]
fn test_arbitrary_byte_keys(#[case] key: &[u8]) {
    let table = Table::new().set(key, 1).unwrap();
    assert_eq!(table.get(key).unwrap().map(|entry| entry.value), Some(1));
}

#[rstest]
fn test_set_does_not_modify_receiver() {
    let first = Table::new().set("key", 1).unwrap();
    let second = first.set("key2", 2).unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(value_of(&first, "key2"), None);
    assert_eq!(second.len(), 2);
    assert_eq!(value_of(&second, "key2"), Some(2));
}

#[rstest]
fn test_set_overwrites_in_new_version_only() {
    let first = Table::new().set("key", 1).unwrap();
    let second = first.set("key", 2).unwrap();

    assert_eq!(value_of(&first, "key"), Some(1));
    assert_eq!(value_of(&second, "key"), Some(2));
    assert_eq!(second.len(), 1);
    assert_eq!(second.generation(), 2);
}

#[rstest]
fn test_storing_complex_values() {
    #[derive(Debug, PartialEq)]
    struct Account {
        kind: i32,
        amount: i64,
    }

    let table = Table::new()
        .set("ebuckley", Account { kind: 1, amount: 89_889 })
        .unwrap()
        .set("jbezos", Account { kind: 2, amount: 1_337 })
        .unwrap();

    let account = &table.get("ebuckley").unwrap().unwrap().value;
    assert_eq!(account, &Account { kind: 1, amount: 89_889 });
    assert_eq!(table.entries().count(), 2);
}

#[rstest]
fn test_contains_key() {
    let table = Table::new().set("key", 42).unwrap();
    assert!(table.contains_key("key").unwrap());
    assert!(!table.contains_key("other").unwrap());
}

// =============================================================================
// Delete
// =============================================================================

#[rstest]
fn test_del_present_key_creates_version() {
    let table = Table::new().set("a", 1).unwrap().set("b", 2).unwrap();
    let removed = table.del("a").unwrap();

    assert_eq!(value_of(&removed, "a"), None);
    assert_eq!(value_of(&removed, "b"), Some(2));
    assert_eq!(value_of(&table, "a"), Some(1));
    assert_eq!(removed.len(), 1);
    assert_eq!(removed.generation(), 3);
}

#[rstest]
fn test_del_absent_key_keeps_entries_and_history() {
    let table = Table::new().set("a", 1).unwrap();
    let unchanged = table.del("never-set").unwrap();

    assert_eq!(unchanged.len(), table.len());
    assert_eq!(unchanged.history().count(), table.history().count());
    assert_eq!(value_of(&unchanged, "a"), Some(1));
}

#[rstest]
fn test_del_twice_second_is_noop() {
    let table = Table::new().set("a", 1).unwrap();
    let once = table.del("a").unwrap();
    let twice = once.del("a").unwrap();

    assert_eq!(once.generation(), 2);
    assert_eq!(twice.generation(), 2);
}

#[rstest]
fn test_reset_after_del() {
    let table = Table::new()
        .set("a", 1)
        .unwrap()
        .del("a")
        .unwrap()
        .set("a", 2)
        .unwrap();

    assert_eq!(value_of(&table, "a"), Some(2));
    assert_eq!(table.len(), 1);
}

// =============================================================================
// History
// =============================================================================

#[rstest]
#[case(0)]
#[case(1)]
#[case(25)]
fn test_history_has_one_version_per_set(#[case] count: usize) {
    let table = (0..count).fold(Table::new(), |table, index| {
        table.set(index.to_string(), index).unwrap()
    });

    assert_eq!(table.history().count(), count + 1);
    assert_eq!(table.history().len(), count + 1);
}

#[rstest]
fn test_history_is_newest_first() {
    let table = Table::new()
        .set("a", 1)
        .unwrap()
        .set("b", 2)
        .unwrap()
        .set("c", 3)
        .unwrap();

    let generations: Vec<usize> = table.history().map(Table::generation).collect();
    assert_eq!(generations, vec![3, 2, 1, 0]);

    let oldest = table.history().last().unwrap();
    assert!(oldest.is_empty());
    assert!(oldest.previous().is_none());
}

#[rstest]
fn test_history_versions_remain_readable() {
    let table = Table::new()
        .set("a", 1)
        .unwrap()
        .set("a", 2)
        .unwrap()
        .set("a", 3)
        .unwrap();

    let values: Vec<Option<i32>> = table
        .history()
        .map(|version| version.get("a").unwrap().map(|entry| entry.value))
        .collect();
    assert_eq!(values, vec![Some(3), Some(2), Some(1), None]);
}

#[rstest]
fn test_divergent_children_share_parent() {
    let parent = Table::new().set("shared", 0).unwrap();
    let left = parent.set("left", 1).unwrap();
    let right = parent.set("right", 2).unwrap();

    assert_eq!(value_of(&left, "right"), None);
    assert_eq!(value_of(&right, "left"), None);
    assert_eq!(left.generation(), right.generation());
    assert_eq!(value_of(left.previous().unwrap(), "shared"), Some(0));
    assert_eq!(value_of(right.previous().unwrap(), "shared"), Some(0));
}

// =============================================================================
// Entries
// =============================================================================

#[rstest]
fn test_entries_counts_distinct_live_keys() {
    let table = Table::new()
        .set("a", 1)
        .unwrap()
        .set("b", 2)
        .unwrap()
        .set("a", 3)
        .unwrap()
        .set("c", 4)
        .unwrap()
        .del("b")
        .unwrap();

    let mut keys: Vec<Vec<u8>> = table.keys().map(|key| key.to_vec()).collect();
    keys.sort();
    assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
    assert_eq!(table.values().sum::<i32>(), 7);
}

#[rstest]
fn test_entries_follow_digest_slot_order() {
    let table = Table::with_hasher(FirstByteHasher)
        .set("\u{0}root", 0)
        .unwrap()
        .set("z", 3)
        .unwrap()
        .set("b", 2)
        .unwrap()
        .set("a", 1)
        .unwrap();

    let order: Vec<i32> = table.entries().map(|entry| entry.value).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
}

#[rstest]
fn test_entries_after_deleting_node_holding_children() {
    let table = Table::with_hasher(FirstByteHasher)
        .set("\u{0}root", 0)
        .unwrap()
        .set("a", 1)
        .unwrap()
        .set("b", 2)
        .unwrap();

    let removed = table.del("\u{0}root").unwrap();
    let order: Vec<i32> = removed.entries().map(|entry| entry.value).collect();
    assert_eq!(order, vec![1, 2]);
}

#[rstest]
fn test_entries_iterate_by_reference() {
    let table = Table::new().set("a", 1).unwrap();
    let mut seen = Vec::new();
    for Entry { key, value } in &table {
        seen.push((key.to_vec(), *value));
    }
    assert_eq!(seen, vec![(b"a".to_vec(), 1)]);
    assert_eq!(table.iter().count(), table.entries().count());
}

// =============================================================================
// Digest collisions
// =============================================================================

#[rstest]
fn test_colliding_digests_keep_distinct_keys() {
    install_subscriber();
    let table = Table::with_hasher(ConstantHasher)
        .set("first", 1)
        .unwrap()
        .set("second", 2)
        .unwrap()
        .set("third", 3)
        .unwrap();

    assert_eq!(table.len(), 3);
    assert_eq!(value_of(&table, "first"), Some(1));
    assert_eq!(value_of(&table, "second"), Some(2));
    assert_eq!(value_of(&table, "third"), Some(3));
    assert_eq!(value_of(&table, "fourth"), None);
    assert_eq!(table.depth(), 1);

    let removed = table.del("second").unwrap();
    assert_eq!(value_of(&removed, "second"), None);
    assert_eq!(value_of(&removed, "first"), Some(1));
    assert_eq!(removed.entries().count(), 2);

    let unchanged = removed.del("second").unwrap();
    assert_eq!(unchanged.generation(), removed.generation());
}

#[rstest]
fn test_digests_exhausted_deep_in_the_trie() {
    install_subscriber();
    // Digests that share their low 60 bits part ways only at the top nibble.
    let tiers: Vec<Vec<u8>> = (0..13u64).map(|tier| prefixed(tier << 60, "tier")).collect();
    let twins = [prefixed(15 << 60, "twin-a"), prefixed(15 << 60, "twin-b")];
    let near = prefixed((1 << 60) | 64, "near");
    let ceiling = [prefixed(u64::MAX, "max-a"), prefixed(u64::MAX, "max-b")];
    let zero = prefixed(0, "zero");
    let absent = prefixed(15 << 60, "twin-c");

    let mut operations: Vec<(Vec<u8>, Option<i32>)> = Vec::new();
    for (value, key) in (0..).zip(&tiers) {
        operations.push((key.clone(), Some(value)));
    }
    operations.push((twins[0].clone(), Some(20)));
    operations.push((twins[1].clone(), Some(21)));
    operations.push((near.clone(), Some(30)));
    operations.push((ceiling[0].clone(), Some(40)));
    operations.push((ceiling[1].clone(), Some(41)));
    operations.push((zero.clone(), Some(50)));
    operations.push((tiers[0].clone(), None));
    operations.push((twins[0].clone(), None));
    operations.push((tiers[11].clone(), None));
    operations.push((absent.clone(), None));
    operations.push((ceiling[0].clone(), None));
    operations.push((near.clone(), None));
    operations.push((tiers[0].clone(), Some(100)));
    operations.push((twins[1].clone(), Some(121)));

    let mut versions = vec![Table::with_hasher(PrefixHasher)];
    let mut models = vec![BTreeMap::new()];
    for (key, value) in &operations {
        let current = versions.last().unwrap();
        let mut model: BTreeMap<Vec<u8>, i32> = models.last().unwrap().clone();
        let next = match value {
            Some(value) => {
                model.insert(key.clone(), *value);
                current.set(key.clone(), *value).unwrap()
            }
            None => {
                model.remove(key);
                current.del(key).unwrap()
            }
        };
        versions.push(next);
        models.push(model);
    }

    let probes: Vec<&Vec<u8>> = operations.iter().map(|(key, _)| key).collect();
    for (version, model) in versions.iter().zip(&models) {
        assert_eq!(version.len(), model.len());
        assert_eq!(version.entries().count(), model.len());
        assert!(version.depth() <= 12);
        let contents: BTreeMap<Vec<u8>, i32> = version
            .entries()
            .map(|entry| (entry.key.to_vec(), entry.value))
            .collect();
        assert_eq!(&contents, model);
        for key in &probes {
            let found = version.get(key).unwrap().map(|entry| entry.value);
            assert_eq!(found, model.get(*key).copied());
        }
    }

    // Tiers 11 and 12 sit one level below tier 10, at the deepest level.
    assert_eq!(versions[11].depth(), 11);
    assert_eq!(versions[12].depth(), 12);

    // Both twins share a full digest and live together at the deepest level.
    let twinned = &versions[15];
    assert_eq!(twinned.depth(), 12);
    assert_eq!(twinned.get(&twins[0]).unwrap().map(|entry| entry.value), Some(20));
    assert_eq!(twinned.get(&twins[1]).unwrap().map(|entry| entry.value), Some(21));
    assert!(twinned.get(&absent).unwrap().is_none());

    // The ceiling pair collides in a single level-one slot.
    let capped = &versions[18];
    assert_eq!(capped.get(&ceiling[0]).unwrap().map(|entry| entry.value), Some(40));
    assert_eq!(capped.get(&ceiling[1]).unwrap().map(|entry| entry.value), Some(41));

    // Deleting an absent twin leaves the generation alone.
    let before_absent = &versions[22];
    let after_absent = &versions[23];
    assert_eq!(after_absent.generation(), before_absent.generation());

    let last = versions.last().unwrap();
    assert_eq!(last.history().count(), versions.len() - 1);
    assert_eq!(last.depth(), 12);
}

#[rstest]
fn test_short_key_reports_digest_error() {
    let table: Table<i32, PrefixHasher> = Table::with_hasher(PrefixHasher);
    let error = table.set("short", 1).unwrap_err();
    assert_eq!(error, HashError::digest(5, "key shorter than its digest"));
}

// =============================================================================
// Scale
// =============================================================================

#[rstest]
fn test_public_interface_with_many_keys() {
    install_subscriber();
    let hasher = SeededHasher::with_seeds(1, 2, 3, 4);
    let mut expected = HashMap::new();
    let mut table = Table::with_hasher(hasher);

    for index in 0..1_000u64 {
        let key = format!("key-{:032x}", index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        let value = format!("value-{index}");
        table = table.set(key.as_str(), value.clone()).unwrap();
        expected.insert(key, value);
    }

    for (key, value) in &expected {
        let entry = table.get(key).unwrap().expect("value present");
        assert_eq!(&entry.value, value);
    }
    assert_eq!(table.len(), 1_000);
    assert_eq!(table.entries().count(), 1_000);
    assert_eq!(table.history().count(), 1_001);
    assert!(table.depth() <= 12);
}
