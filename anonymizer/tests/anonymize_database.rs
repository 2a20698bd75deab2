//! End-to-end anonymization against an on-disk SQLite database
//! Seeds users/comments, runs full passes, and checks what ends up stored.

use std::collections::BTreeSet;

use anonymizer::{
    anonymize_all, BatchIterator, BundledSource, Database, IdentityGenerator, LoginSuffix, RecordKind,
    TablePrefix, WordLists, MAX_BATCH_SIZE,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

fn open_db(dir: &TempDir, prefix: TablePrefix) -> Database {
    let db = Database::open(dir.path().join("site.sqlite"), prefix).unwrap();
    db.install_schema().unwrap();
    db
}

fn seed_users(db: &Database, count: usize) -> Vec<i64> {
    (0..count)
        .map(|i| {
            db.insert_user(&format!("person{}", i), &format!("person{}@corp.test", i), &format!("Person {}", i))
                .unwrap()
        })
        .collect()
}

fn generator(seed: u64) -> IdentityGenerator<StdRng> {
    let words = WordLists::load(&BundledSource).unwrap();
    let methods: &[&str] = &["aim", "yim", "jabber"];
    IdentityGenerator::new(words, methods, StdRng::seed_from_u64(seed))
}

#[test]
fn test_thirty_users_batch_of_ten() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, TablePrefix::default());
    let ids = seed_users(&db, 30);

    let mut gen = generator(1);
    let iter = BatchIterator::new(10).unwrap();
    let mut reported = Vec::new();
    let summary = anonymize_all(&db, &mut gen, &iter, RecordKind::User, false, |o| reported.push(o.id())).unwrap();

    assert_eq!(summary.pages, 4);
    assert_eq!(summary.visited, 30);
    assert_eq!(summary.failed, 0);
    assert_eq!(reported, ids);

    let mut logins = BTreeSet::new();
    for id in ids {
        let (login, email, display_name) = db.fetch_user(id).unwrap().unwrap();
        assert!(!login.starts_with("person"), "login not replaced: {}", login);
        assert!(email.ends_with("@example.com"));
        assert_eq!(email, format!("{}@example.com", login));
        assert!(!display_name.starts_with("Person"));
        assert_eq!(db.fetch_user_meta(id, "jabber").unwrap().as_deref(), Some(""));
        assert!(db.fetch_user_meta(id, "first_name").unwrap().is_some());
        logins.insert(login);
    }
    assert_eq!(logins.len(), 30);
}

#[test]
fn test_excluded_users_untouched() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, TablePrefix::default());
    let ids = seed_users(&db, 5);
    let excluded = [ids[0], ids[3]];

    let mut gen = generator(2);
    let iter = BatchIterator::new(2).unwrap().with_excluded(excluded);
    let summary = anonymize_all(&db, &mut gen, &iter, RecordKind::User, true, |_| {}).unwrap();
    assert_eq!(summary.visited, 3);

    for id in ids {
        let (login, _, _) = db.fetch_user(id).unwrap().unwrap();
        assert_eq!(excluded.contains(&id), login.starts_with("person"), "user {}", id);
    }
}

#[test]
fn test_collisions_are_per_record_failures() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, TablePrefix::default());
    seed_users(&db, 3);

    // One adjective and one noun without a suffix: every user wants the same login
    let words = WordLists::from_slices(&["hazy"], &["heron"]).unwrap();
    let methods: &[&str] = &[];
    let mut gen = IdentityGenerator::new(words, methods, StdRng::seed_from_u64(3)).with_login_suffix(LoginSuffix::None);
    let iter = BatchIterator::new(25).unwrap();

    let summary = anonymize_all(&db, &mut gen, &iter, RecordKind::User, false, |_| {}).unwrap();
    assert_eq!(summary.visited, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 2);
}

#[test]
fn test_comments_on_a_sub_site() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, TablePrefix::new("wp_", Some(2)).unwrap());
    let ids: Vec<i64> = (0..4)
        .map(|i| db.insert_comment(&format!("Commenter {}", i), "c@corp.test", "192.168.0.9").unwrap())
        .collect();

    let mut gen = generator(4);
    let iter = BatchIterator::new(3).unwrap();
    let summary = anonymize_all(&db, &mut gen, &iter, RecordKind::Comment, true, |_| {}).unwrap();
    assert_eq!(summary.visited, 4);

    for id in ids {
        let (author, email, url, ip) = db.fetch_comment(id).unwrap().unwrap();
        let mut words = author.split(' ');
        let first = words.next().unwrap().to_lowercase();
        let last = words.next().unwrap().to_lowercase();
        assert_eq!(first.chars().next(), last.chars().next());
        assert!(email.ends_with("@example.com"));
        assert!(url.starts_with("http://example.com/"));
        assert_eq!(ip, "");
    }
}

#[test]
fn test_count_matches_visits() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, TablePrefix::default());
    seed_users(&db, 12);
    let excluded: BTreeSet<i64> = [1, 12].into_iter().collect();

    let expected = db.count_records(RecordKind::User, &excluded).unwrap();
    let mut gen = generator(5);
    let iter = BatchIterator::new(5).unwrap().with_excluded(excluded);
    let summary = anonymize_all(&db, &mut gen, &iter, RecordKind::User, false, |_| {}).unwrap();
    assert_eq!(summary.visited, expected);
}

#[test]
fn test_huge_batch_visits_each_user_once() {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir, TablePrefix::default());
    seed_users(&db, 3);

    assert!(BatchIterator::new(1u64 << 63).is_err());

    let mut gen = generator(6);
    let iter = BatchIterator::new(MAX_BATCH_SIZE).unwrap();
    let mut visits = 0;
    let summary = anonymize_all(&db, &mut gen, &iter, RecordKind::User, false, |_| visits += 1).unwrap();
    assert_eq!(visits, 3);
    assert_eq!(summary.visited, 3);
    assert_eq!(summary.pages, 2);
}
