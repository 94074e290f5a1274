//! Property tests for leaderboard ranking, cooldown arithmetic, and record
//! serialization.

use proptest::prelude::*;
use raven_rush_types::{
    cooldown_remaining, rank_points, rank_referrals, ReferralRecord, UserPointsRecord,
    REFERRAL_LEADERBOARD_LIMIT,
};

fn arb_points_record() -> impl Strategy<Value = UserPointsRecord> {
    (
        "0x[0-9a-f]{8}",
        0u64..50,
        0u64..5,
        proptest::option::of(any::<u64>()),
        proptest::option::of(any::<u64>()),
    )
        .prop_map(|(address, points, boosts, last_check_in, last_boost)| UserPointsRecord {
            address,
            points,
            boosts,
            last_check_in,
            last_boost,
        })
}

fn arb_referral_record() -> impl Strategy<Value = ReferralRecord> {
    ("0x[0-9a-f]{12}", proptest::option::of("[A-Za-z-]{1,10}"), 0u64..20).prop_map(
        |(address, referrer, invites)| ReferralRecord {
            invites,
            ..ReferralRecord::new(address, referrer)
        },
    )
}

proptest! {
    #[test]
    fn points_board_is_sorted_dense_and_positive(
        records in prop::collection::vec(arb_points_record(), 0..40)
    ) {
        let board = rank_points(&records);
        let positive = records.iter().filter(|record| record.points > 0).count();
        prop_assert_eq!(board.len(), positive);
        for (index, entry) in board.iter().enumerate() {
            prop_assert_eq!(entry.rank as usize, index + 1);
            prop_assert!(entry.points > 0);
        }
        for pair in board.windows(2) {
            prop_assert!(pair[0].points >= pair[1].points);
        }
    }

    #[test]
    fn points_ties_keep_store_order(
        records in prop::collection::vec(arb_points_record(), 0..40).prop_map(|mut records| {
            for (index, record) in records.iter_mut().enumerate() {
                record.address = format!("0x{index:08x}");
            }
            records
        })
    ) {
        let board = rank_points(&records);
        let position = |address: &str| records.iter().position(|record| record.address == address);
        for pair in board.windows(2) {
            if pair[0].points == pair[1].points {
                prop_assert!(position(&pair[0].address) <= position(&pair[1].address));
            }
        }
    }

    #[test]
    fn referral_board_is_capped_and_positive(
        records in prop::collection::vec(arb_referral_record(), 0..120)
    ) {
        let board = rank_referrals(&records, REFERRAL_LEADERBOARD_LIMIT);
        prop_assert!(board.len() <= REFERRAL_LEADERBOARD_LIMIT);
        prop_assert!(board.iter().all(|entry| entry.invites > 0));
        for pair in board.windows(2) {
            prop_assert!(pair[0].invites >= pair[1].invites);
            prop_assert_eq!(pair[0].rank + 1, pair[1].rank);
        }
    }

    #[test]
    fn cooldown_never_exceeds_window(
        now in any::<u64>(),
        last in proptest::option::of(any::<u64>()),
        window in 0u64..=24 * 60 * 60 * 1000,
    ) {
        let remaining = cooldown_remaining(now, last, window);
        prop_assert!(remaining <= window);
        if last.is_none() {
            prop_assert_eq!(remaining, 0);
        }
        if let Some(last) = last {
            if now >= last && now - last >= window {
                prop_assert_eq!(remaining, 0);
            }
        }
    }

    #[test]
    fn records_survive_json(
        points in prop::collection::vec(arb_points_record(), 0..10),
        referrals in prop::collection::vec(arb_referral_record(), 0..10),
    ) {
        let encoded = serde_json::to_string(&points).unwrap();
        let decoded: Vec<UserPointsRecord> = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(decoded, points);

        let encoded = serde_json::to_string(&referrals).unwrap();
        let decoded: Vec<ReferralRecord> = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(decoded, referrals);
    }
}
