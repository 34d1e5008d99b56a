//! Concurrent bet placement.
//!
//! Bursts of placements run on a multi-threaded runtime against the shared
//! store. All rule checks happen inside the store transaction, so the bursts
//! must never admit a second bet per user, exceed the entry cap, or let pool
//! totals drift from the recorded bets.

#[cfg(test)]
mod tests {
    use crate::{
        mocks::{MemoryStore, MockChain},
        BetAccountingEngine, EngineConfig, Error, RaceLedger, RetryPolicy, StateError,
    };
    use futures::future::join_all;
    use paddock_types::{Address, Lamports, PoolId, RaceId};
    use std::sync::Arc;

    struct Setup {
        store: MemoryStore,
        ledger: RaceLedger<MemoryStore>,
        engine: Arc<BetAccountingEngine<MemoryStore, MockChain>>,
    }

    async fn setup(config: EngineConfig, users: usize) -> Setup {
        let store = MemoryStore::default();
        let chain = MockChain::default();
        let ledger = RaceLedger::new(store.clone(), config.clone());
        let engine = Arc::new(BetAccountingEngine::new(store.clone(), chain.clone(), config));
        for i in 0..users {
            let wallet = Address([i as u8 + 1; 32]);
            chain.set_balance(wallet, Lamports(1_000_000));
            engine.register_user(&format!("user{i:03}"), wallet).await.unwrap();
        }
        ledger.create_race("op", 0).await.unwrap();
        Setup {
            store,
            ledger,
            engine,
        }
    }

    fn assert_conserved(store: &MemoryStore, race_id: RaceId) {
        let race = store
            .races()
            .into_iter()
            .find(|race| race.id == race_id)
            .unwrap();
        let staked: Lamports = store
            .users()
            .iter()
            .filter_map(|user| user.bet_for(race_id))
            .map(|bet| bet.amount)
            .sum();
        assert_eq!(race.total_stake(), staked);
        let bets = store
            .users()
            .iter()
            .filter(|user| user.bet_for(race_id).is_some())
            .count();
        assert_eq!(race.total_entries(), bets);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn burst_from_one_user_admits_exactly_one_bet() {
        let s = setup(EngineConfig::default(), 1).await;
        let handles: Vec<_> = (0..32u16)
            .map(|i| {
                let engine = s.engine.clone();
                tokio::spawn(async move {
                    engine
                        .place_bet("user000", PoolId(i % 5 + 1), Lamports(100))
                        .await
                })
            })
            .collect();
        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let accepted = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(accepted, 1);
        for result in results.iter().filter(|result| result.is_err()) {
            assert_eq!(
                result.as_ref().unwrap_err(),
                &Error::State(StateError::DuplicateBet)
            );
        }
        let user = s.engine.user("user000").await.unwrap();
        assert_eq!(user.bets.len(), 1);
        assert_eq!(user.spent_funds, Lamports(100));
        assert_conserved(&s.store, RaceId::FIRST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn burst_for_the_last_slots_respects_the_cap() {
        let config = EngineConfig {
            max_entries: 5,
            ..EngineConfig::default()
        };
        let s = setup(config, 12).await;
        let handles: Vec<_> = (0..12)
            .map(|i| {
                let engine = s.engine.clone();
                tokio::spawn(async move {
                    engine
                        .place_bet(&format!("user{i:03}"), PoolId(1), Lamports(10 + i as u64))
                        .await
                })
            })
            .collect();
        let results: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|err| *err == Error::State(StateError::EntriesCapReached)));
        assert_conserved(&s.store, RaceId::FIRST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_bets_under_conflicts_keep_totals_consistent() {
        let config = EngineConfig {
            store_retry: RetryPolicy::immediate(50),
            ..EngineConfig::default()
        };
        let s = setup(config, 40).await;
        s.store.fail_next_commits(15);

        let handles: Vec<_> = (0..40)
            .map(|i| {
                let engine = s.engine.clone();
                tokio::spawn(async move {
                    engine
                        .place_bet(
                            &format!("user{i:03}"),
                            PoolId(i as u16 % 5 + 1),
                            Lamports(1_000 * (i as u64 + 1)),
                        )
                        .await
                })
            })
            .collect();
        for joined in join_all(handles).await {
            joined.unwrap().unwrap();
        }

        let race = s.ledger.race(RaceId::FIRST).await.unwrap();
        assert_eq!(race.total_entries(), 40);
        assert_eq!(race.total_stake(), Lamports(1_000 * (1..=40).sum::<u64>()));
        assert_conserved(&s.store, RaceId::FIRST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn bets_racing_the_start_either_land_or_see_no_active_race() {
        let s = setup(EngineConfig::default(), 20).await;
        let handles: Vec<_> = (0..20)
            .map(|i| {
                let engine = s.engine.clone();
                tokio::spawn(async move {
                    engine
                        .place_bet(&format!("user{i:03}"), PoolId(2), Lamports(5))
                        .await
                })
            })
            .collect();
        s.ledger.start_race(1).await.unwrap();

        for joined in join_all(handles).await {
            match joined.unwrap() {
                Ok(_) | Err(Error::State(StateError::NoActiveRace)) => {}
                Err(err) => panic!("unexpected error: {err}"),
            }
        }
        assert_conserved(&s.store, RaceId::FIRST);
    }
}
