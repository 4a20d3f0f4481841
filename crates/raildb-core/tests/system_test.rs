//! End-to-end reservation scenarios against a real data directory.

use raildb_common::StorageConfig;
use raildb_core::train::AddTrainArgs;
use raildb_core::{BuyOutcome, RailDb};
use tempfile::tempdir;

fn open(dir: &std::path::Path) -> RailDb {
    RailDb::open(&StorageConfig::with_dir(dir)).unwrap()
}

fn login_fresh_user(db: &mut RailDb, username: &str) {
    // The first call creates the privileged root account; later calls
    // create normal accounts through it.
    if db.add_user("", username, "pw", username, "m@rail.db", 0).unwrap() {
        assert!(db.login(username, "pw").unwrap());
        return;
    }
    assert!(db.add_user("root", username, "pw", username, "m@rail.db", 1).unwrap());
    assert!(db.login(username, "pw").unwrap());
}

fn three_stop_train(seats: &'static str) -> AddTrainArgs<'static> {
    AddTrainArgs {
        train_id: "G1",
        station_count: "3",
        seat_count: seats,
        stations: "A|B|C",
        prices: "50|50",
        start_time: "10:00",
        travel_times: "60|60",
        stopover_times: "30",
        sale_dates: "06-01|06-10",
        train_type: "G",
    }
}

fn seats_on(db: &RailDb, from: &str, to: &str, date: &str) -> i32 {
    let out = db
        .query_ticket(from, to, date, raildb_core::SortPref::Time)
        .unwrap();
    let row = out.lines().nth(1).expect("expected one candidate");
    row.split_whitespace().last().unwrap().parse().unwrap()
}

#[test]
fn test_single_purchase_single_refund() {
    let dir = tempdir().unwrap();
    let mut db = open(dir.path());
    login_fresh_user(&mut db, "root");

    assert!(db.add_train(&three_stop_train("100")).unwrap());
    assert!(db.release_train("G1").unwrap());

    assert_eq!(
        db.buy_ticket(1, "root", "G1", "06-03", 2, "A", "C", false)
            .unwrap(),
        BuyOutcome::Booked(200)
    );
    assert_eq!(seats_on(&db, "A", "C", "06-03"), 98);

    assert!(db.refund_ticket("root", 1).unwrap());
    assert_eq!(seats_on(&db, "A", "C", "06-03"), 100);
}

#[test]
fn test_queue_then_promotion_on_refund() {
    let dir = tempdir().unwrap();
    let mut db = open(dir.path());
    login_fresh_user(&mut db, "root");
    login_fresh_user(&mut db, "user2");

    assert!(db.add_train(&three_stop_train("2")).unwrap());
    assert!(db.release_train("G1").unwrap());

    assert_eq!(
        db.buy_ticket(1, "root", "G1", "06-03", 2, "A", "B", false)
            .unwrap(),
        BuyOutcome::Booked(100)
    );
    assert_eq!(
        db.buy_ticket(2, "user2", "G1", "06-03", 1, "A", "B", true)
            .unwrap(),
        BuyOutcome::Queued
    );
    assert!(db
        .query_order("user2")
        .unwrap()
        .unwrap()
        .contains("[pending]"));

    assert!(db.refund_ticket("root", 1).unwrap());

    let listing = db.query_order("user2").unwrap().unwrap();
    assert!(
        listing.contains("[success]") && !listing.contains("[pending]"),
        "promotion should have upgraded the order: {}",
        listing
    );
}

#[test]
fn test_waitlist_skips_but_does_not_block() {
    let dir = tempdir().unwrap();
    let mut db = open(dir.path());
    for user in ["root", "u1", "u2", "u3", "u4"] {
        login_fresh_user(&mut db, user);
    }

    assert!(db.add_train(&three_stop_train("3")).unwrap());
    assert!(db.release_train("G1").unwrap());

    // Sell the train out, then queue four orders needing 2, 3, 1, 2.
    assert_eq!(
        db.buy_ticket(5, "root", "G1", "06-03", 3, "A", "C", false)
            .unwrap(),
        BuyOutcome::Booked(300)
    );
    for (ts, user, need) in [(10, "u1", 2), (11, "u2", 3), (12, "u3", 1), (13, "u4", 2)] {
        assert_eq!(
            db.buy_ticket(ts, user, "G1", "06-03", need, "A", "C", true)
                .unwrap(),
            BuyOutcome::Queued
        );
    }

    // Refund returns all 3 seats. Promotion in timestamp order: u1
    // takes 2, u2 needs 3 and is skipped, u3 takes the last seat, u4
    // is skipped.
    assert!(db.refund_ticket("root", 1).unwrap());

    let expect = [
        ("u1", "[success]"),
        ("u2", "[pending]"),
        ("u3", "[success]"),
        ("u4", "[pending]"),
    ];
    for (user, tag) in expect {
        let listing = db.query_order(user).unwrap().unwrap();
        assert!(
            listing.contains(tag),
            "{} should be {}: {}",
            user,
            tag,
            listing
        );
    }
    assert_eq!(seats_on(&db, "A", "C", "06-03"), 0);
}

#[test]
fn test_direct_versus_transfer_choice() {
    let dir = tempdir().unwrap();
    let mut db = open(dir.path());
    login_fresh_user(&mut db, "root");

    // Direct A -> C: 180 minutes, 200 yuan.
    assert!(db
        .add_train(&AddTrainArgs {
            train_id: "D1",
            station_count: "2",
            seat_count: "50",
            stations: "A|C",
            prices: "200",
            start_time: "09:00",
            travel_times: "180",
            stopover_times: "_",
            sale_dates: "06-01|06-10",
            train_type: "D",
        })
        .unwrap());
    // Leg 1 A -> B: leaves 08:00.
    assert!(db
        .add_train(&AddTrainArgs {
            train_id: "T1",
            station_count: "2",
            seat_count: "50",
            stations: "A|B",
            prices: "100",
            start_time: "08:00",
            travel_times: "60",
            stopover_times: "_",
            sale_dates: "06-01|06-10",
            train_type: "T",
        })
        .unwrap());
    // Fast but pricey leg 2: total journey 170 min, 300 yuan.
    assert!(db
        .add_train(&AddTrainArgs {
            train_id: "T2",
            station_count: "2",
            seat_count: "50",
            stations: "B|C",
            prices: "200",
            start_time: "09:30",
            travel_times: "80",
            stopover_times: "_",
            sale_dates: "06-01|06-10",
            train_type: "T",
        })
        .unwrap());
    // Slow but cheap leg 2: total journey 240 min, 150 yuan.
    assert!(db
        .add_train(&AddTrainArgs {
            train_id: "T3",
            station_count: "2",
            seat_count: "50",
            stations: "B|C",
            prices: "50",
            start_time: "10:00",
            travel_times: "120",
            stopover_times: "_",
            sale_dates: "06-01|06-10",
            train_type: "T",
        })
        .unwrap());
    for id in ["D1", "T1", "T2", "T3"] {
        assert!(db.release_train(id).unwrap());
    }

    // Direct search only sees the direct train.
    let direct = db
        .query_ticket("A", "C", "06-03", raildb_core::SortPref::Time)
        .unwrap();
    assert!(direct.starts_with("1\nD1 "));

    // Fastest transfer beats the direct train's 180 minutes.
    let by_time = db
        .query_transfer("A", "C", "06-03", raildb_core::SortPref::Time)
        .unwrap();
    assert!(by_time.starts_with("T1 "), "{}", by_time);
    assert!(by_time.contains("\nT2 "), "{}", by_time);

    // Cheapest transfer picks the slow leg instead.
    let by_cost = db
        .query_transfer("A", "C", "06-03", raildb_core::SortPref::Cost)
        .unwrap();
    assert!(by_cost.contains("\nT3 "), "{}", by_cost);
}

#[test]
fn test_state_survives_restart() {
    let dir = tempdir().unwrap();

    {
        let mut db = open(dir.path());
        login_fresh_user(&mut db, "alice");
        assert!(db.add_train(&three_stop_train("100")).unwrap());
        assert!(db.release_train("G1").unwrap());
        assert_eq!(
            db.buy_ticket(1, "alice", "G1", "06-03", 2, "A", "C", false)
                .unwrap(),
            BuyOutcome::Booked(200)
        );
        db.shutdown().unwrap();
    }

    {
        let mut db = open(dir.path());
        // Sessions do not survive restart.
        assert_eq!(db.query_order("alice").unwrap(), None);
        assert!(db.login("alice", "pw").unwrap());

        let listing = db.query_order("alice").unwrap().unwrap();
        assert_eq!(
            listing,
            "1\n[success] G1 A 06-03 10:00 -> C 06-03 12:30 100 2"
        );

        // Seat accounting survived too.
        assert_eq!(seats_on(&db, "A", "C", "06-03"), 98);
        assert_eq!(
            db.buy_ticket(2, "alice", "G1", "06-03", 99, "A", "C", false)
                .unwrap(),
            BuyOutcome::Refused
        );
        assert_eq!(
            db.buy_ticket(3, "alice", "G1", "06-03", 98, "A", "C", false)
                .unwrap(),
            BuyOutcome::Booked(9_800)
        );
    }
}

#[test]
fn test_refund_counts_refunded_orders_in_position() {
    let dir = tempdir().unwrap();
    let mut db = open(dir.path());
    login_fresh_user(&mut db, "root");
    assert!(db.add_train(&three_stop_train("100")).unwrap());
    assert!(db.release_train("G1").unwrap());

    for ts in [1, 2, 3] {
        assert_eq!(
            db.buy_ticket(ts, "root", "G1", "06-03", 1, "A", "B", false)
                .unwrap(),
            BuyOutcome::Booked(50)
        );
    }

    // Refund the middle order; it stays in the listing and keeps its
    // position for later refunds.
    assert!(db.refund_ticket("root", 2).unwrap());
    assert!(!db.refund_ticket("root", 2).unwrap());
    assert!(db.refund_ticket("root", 1).unwrap());
    assert!(db.refund_ticket("root", 3).unwrap());
    assert!(!db.refund_ticket("root", 4).unwrap());

    let listing = db.query_order("root").unwrap().unwrap();
    assert_eq!(listing.matches("[refunded]").count(), 3);
}
