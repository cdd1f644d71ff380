mod common;

use std::collections::HashMap;

use common::msg;
use courier_models::Message;
use courier_sync::MessageStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_batch(rng: &mut StdRng) -> Vec<Message> {
    let len = rng.gen_range(0..12);
    (0..len)
        .map(|_| {
            let id = rng.gen_range(0..20u32);
            // Few distinct timestamps so ties on sent_at are common.
            let secs = rng.gen_range(0..6i64);
            let text = if rng.gen_bool(0.3) { "edited" } else { "original" };
            msg(&id.to_string(), secs, text)
        })
        .collect()
}

fn assert_sorted(messages: &[Message]) {
    for pair in messages.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let a_id: u32 = a.id.parse().unwrap();
        let b_id: u32 = b.id.parse().unwrap();
        assert!(
            (a.sent_at, a_id) < (b.sent_at, b_id),
            "{} @ {} must sort before {} @ {}",
            a.id,
            a.sent_at,
            b.id,
            b.sent_at
        );
    }
}

#[test]
fn test_incremental_merge_equals_deduplicated_union() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..200 {
        let batches: Vec<Vec<Message>> = (0..rng.gen_range(1..6)).map(|_| random_batch(&mut rng)).collect();

        let mut incremental = MessageStore::new();
        for batch in &batches {
            incremental.merge(batch);
            assert_sorted(&incremental.snapshot(None));
        }

        // Later copies of an id win.
        let mut latest: HashMap<String, Message> = HashMap::new();
        for message in batches.iter().flatten() {
            latest.insert(message.id.clone(), message.clone());
        }
        let union: Vec<Message> = latest.into_values().collect();
        let mut once = MessageStore::new();
        once.merge(&union);

        let a = incremental.snapshot(None);
        let b = once.snapshot(None);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert!(x.same_content(y), "{x:?} != {y:?}");
        }
    }
}

#[test]
fn test_remerging_any_batch_is_a_noop() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut store = MessageStore::new();

    for _ in 0..100 {
        let batch = random_batch(&mut rng);
        store.merge(&batch);

        let before = store.snapshot(None);
        assert!(!store.merge(&batch));
        assert_eq!(store.snapshot(None), before);
    }
}
