use std::time::{Duration, SystemTime};

use crate::{LimitRecord, Rate};

fn rate(limit: u64) -> Rate {
    Rate::new(limit, Duration::from_secs(10)).unwrap()
}

#[test]
fn count_equal_to_limit_is_not_reached() {
    let reset = SystemTime::now() + Duration::from_secs(5);
    let record = LimitRecord::new(&rate(3), reset, 3);

    assert_eq!(record.limit(), 3);
    assert_eq!(record.remaining(), 0);
    assert_eq!(record.reset(), reset);
    assert!(!record.is_limit_reached());
}

#[test]
fn count_above_limit_is_reached() {
    let reset = SystemTime::now() + Duration::from_secs(5);
    let record = LimitRecord::new(&rate(3), reset, 4);

    assert_eq!(record.limit(), 3);
    assert_eq!(record.remaining(), 0);
    assert_eq!(record.reset(), reset);
    assert!(record.is_limit_reached());

    let far = LimitRecord::new(&rate(3), reset, u64::MAX);
    assert_eq!(far.remaining(), 0);
    assert!(far.is_limit_reached());
}

#[test]
fn zero_count_leaves_full_allowance() {
    let record = LimitRecord::new(&rate(7), SystemTime::now(), 0);

    assert_eq!(record.remaining(), 7);
    assert!(!record.is_limit_reached());
}

#[test]
fn remaining_counts_down() {
    let reset = SystemTime::now();
    let remaining: Vec<u64> = (1..=5)
        .map(|count| LimitRecord::new(&rate(5), reset, count).remaining())
        .collect();

    assert_eq!(remaining, vec![4, 3, 2, 1, 0]);
}

#[test]
fn seconds_remaining_truncates_and_never_goes_negative() {
    let now = SystemTime::now();
    let record = LimitRecord::new(&rate(1), now + Duration::from_millis(2_900), 1);

    assert_eq!(record.seconds_remaining_at(now), 2);
    assert_eq!(record.seconds_remaining_at(now + Duration::from_secs(10)), 0);

    let past = LimitRecord::new(&rate(1), now - Duration::from_secs(30), 1);
    assert_eq!(past.seconds_remaining(), 0);
}
