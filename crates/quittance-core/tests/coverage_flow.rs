use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use quittance_core::datastore::{DataStore, RentalStore};
use quittance_core::datetime::end_of_month;
use quittance_core::error::{CoverageError, StorageError};
use quittance_core::rental::{Rental, RentalKind, RentalRef};
use quittance_core::session::CoverageSession;
use tempfile::tempdir;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 9, 30, 0)
        .single()
        .expect("valid instant")
}

#[test]
fn pay_commit_and_undo_through_datastore() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let now = at(2024, 1, 3);
    let today = ymd(2024, 1, 3);

    let rental = Rental::new("Studio Bellecour".to_string(), ymd(2024, 1, 15), now, 1);
    let uuid = rental.uuid;
    store.add_rental(rental).expect("add rental");

    let mut session = CoverageSession::open(&store, &RentalRef::Id(1), today, 36, 12)
        .expect("open session");
    assert!(session.window().first_selected().is_none());

    session.toggle_visible(5).expect("toggle");
    let end = session.commit(&store, now).expect("commit");
    assert_eq!(end, ymd(2024, 6, 30));

    let stored = store.load_rental(&RentalRef::Uuid(uuid)).expect("reload");
    assert_eq!(stored.end_date, Some(ymd(2024, 6, 30)));
    assert!(stored.paid);

    // a fresh session picks the persisted coverage back up
    let mut reopened = CoverageSession::open(&store, &RentalRef::Uuid(uuid), today, 36, 12)
        .expect("reopen session");
    assert_eq!(reopened.window().last_selected(), Some(5));
    reopened.toggle_visible(6).expect("extend");
    assert_eq!(reopened.preview().expect("preview"), end_of_month(ymd(2024, 7, 1)));

    assert!(store.pop_undo_snapshot().expect("undo"));
    let restored = store.find(&RentalRef::Id(1)).expect("find");
    assert_eq!(restored.end_date, None);
    assert!(!restored.paid);
}

#[test]
fn missing_rental_is_not_found() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");

    let err = CoverageSession::open(&store, &RentalRef::Id(4), ymd(2024, 1, 3), 36, 12)
        .expect_err("no rentals stored");
    assert!(matches!(
        err,
        CoverageError::Storage(StorageError::NotFound { .. })
    ));
}

#[test]
fn sale_records_are_refused() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let now = at(2024, 3, 1);

    let mut sale = Rental::new("Maison Croix-Rousse".to_string(), ymd(2024, 3, 1), now, 1);
    sale.kind = RentalKind::Sale;
    store.add_rental(sale).expect("add sale");

    let err = CoverageSession::open(&store, &RentalRef::Id(1), ymd(2024, 3, 1), 36, 12)
        .expect_err("sale");
    assert!(matches!(err, CoverageError::NotARental { id: 1 }));
}

#[test]
fn next_id_and_empty_undo() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    assert!(!store.pop_undo_snapshot().expect("nothing to undo"));

    let now = at(2024, 1, 1);
    for label in ["T1", "T2", "T3"] {
        let rentals = store.load_rentals().expect("load");
        let id = store.next_id(&rentals);
        store
            .add_rental(Rental::new(label.to_string(), ymd(2024, 1, 1), now, id))
            .expect("add");
    }

    let rentals = store.load_rentals().expect("load");
    let ids: Vec<u64> = rentals.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}
