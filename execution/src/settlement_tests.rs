//! End-to-end resolution: scheduler ticks driving payouts through the mock
//! chain, including lookup tables, timeouts, drops and rejections.

#[cfg(test)]
mod tests {
    use crate::{
        chain::TxStatus,
        mocks::{MemoryStore, MockChain, Scripted},
        BetAccountingEngine, ChainError, ChainSettlementBatcher, EngineConfig, Error,
        LookupTableSweeper, PayoutResolver, RaceLedger, ResolutionScheduler, RetryPolicy,
        SettleOutcome, StateError, TickOutcome,
    };
    use std::time::Duration;
    use paddock_types::{
        constants::LAMPORTS_PER_SOL, Address, GameSnapshot, Lamports, PoolId, RaceId, RaceState,
        SettlementStatus, Signature,
    };

    const SOL: u64 = LAMPORTS_PER_SOL;
    const DURATION_MS: u64 = 60_000;
    const ALICE: Address = Address([1; 32]);
    const BOB: Address = Address([2; 32]);
    const CAROL: Address = Address([3; 32]);

    struct Harness {
        store: MemoryStore,
        chain: MockChain,
        config: EngineConfig,
        ledger: RaceLedger<MemoryStore>,
        engine: BetAccountingEngine<MemoryStore, MockChain>,
        scheduler: ResolutionScheduler<MemoryStore, MockChain>,
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            store_retry: RetryPolicy::immediate(5),
            chain_retry: RetryPolicy::immediate(3),
            ..EngineConfig::default()
        }
    }

    fn harness(config: EngineConfig) -> Harness {
        let store = MemoryStore::default();
        let chain = MockChain::default();
        Harness {
            ledger: RaceLedger::new(store.clone(), config.clone()),
            engine: BetAccountingEngine::new(store.clone(), chain.clone(), config.clone()),
            scheduler: ResolutionScheduler::new(store.clone(), chain.clone(), config.clone()),
            store,
            chain,
            config,
        }
    }

    impl Harness {
        /// Register each bettor with a funded wallet, place their bet and
        /// start the race at t=0.
        async fn run_race(&self, bets: &[(&str, u16, u64)]) {
            self.ledger.create_race("op", 0).await.unwrap();
            for (i, (handle, pool, amount)) in bets.iter().enumerate() {
                let wallet = Address([i as u8 + 1; 32]);
                self.chain.set_balance(wallet, Lamports(100 * SOL));
                self.engine.register_user(handle, wallet).await.unwrap();
                self.engine
                    .place_bet(handle, PoolId(*pool), Lamports(*amount))
                    .await
                    .unwrap();
            }
            self.ledger.start_race(0).await.unwrap();
        }

        fn declare_winner(&self, pool: u16) {
            self.chain.set_snapshot(GameSnapshot {
                winning_pool: Some(PoolId(pool)),
                ..GameSnapshot::default()
            });
        }

        /// What `handle`'s bet on the first race paid, once it settled.
        fn paid(&self, handle: &str) -> Option<Lamports> {
            let user = self
                .store
                .users()
                .into_iter()
                .find(|user| user.handle == handle)
                .unwrap();
            user.bet_for(RaceId::FIRST).unwrap().payout
        }

        fn settlement(&self) -> SettlementStatus {
            self.store.races()[0].settlement.clone()
        }
    }

    fn three_bettors() -> Vec<(&'static str, u16, u64)> {
        vec![("alice", 1, SOL), ("bob", 1, 2 * SOL), ("carol", 2, SOL)]
    }

    #[tokio::test]
    async fn race_is_settled_once_it_ends() {
        let h = harness(test_config());
        h.run_race(&three_bettors()).await;
        h.declare_winner(1);

        let outcome = h.scheduler.tick(DURATION_MS - 1).await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Racing {
                race_id: RaceId::FIRST,
                ends_at_ms: DURATION_MS,
            }
        );
        assert_eq!(h.chain.attempts(), 0);

        let outcome = h.scheduler.tick(DURATION_MS).await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Settled {
                race_id: RaceId::FIRST,
                winning_pool: PoolId(1),
                signature: Some(Signature("sig1".into())),
            }
        );
        assert_eq!(h.paid("alice"), Some(Lamports(1_333_333_333)));
        assert_eq!(h.paid("bob"), Some(Lamports(2_666_666_667)));
        assert_eq!(h.paid("carol"), Some(Lamports::ZERO));
        assert_eq!(h.chain.settlements(), 1);
        assert_eq!(h.chain.lookup_table_creates(), 0);
        assert_eq!(h.chain.balance(&ALICE), Lamports(100 * SOL + 1_333_333_333));
        assert_eq!(h.chain.balance(&CAROL), Lamports(100 * SOL));

        // Further ticks find nothing left to do.
        assert_eq!(h.scheduler.tick(DURATION_MS + 1).await.unwrap(), TickOutcome::Idle);
        assert_eq!(h.chain.attempts(), 1);
        assert_eq!(h.chain.balance(&ALICE), Lamports(100 * SOL + 1_333_333_333));
    }

    #[tokio::test]
    async fn winnings_are_spendable_in_the_next_race() {
        let h = harness(test_config());
        h.run_race(&three_bettors()).await;
        h.declare_winner(1);
        h.scheduler.tick(DURATION_MS).await.unwrap();

        // alice staked 1 SOL of 100 and was paid 1.333... back.
        let available = h.engine.available_balance("alice").await.unwrap();
        assert_eq!(available, Lamports(100 * SOL - SOL + 1_333_333_333));

        h.ledger.create_race("op", DURATION_MS).await.unwrap();
        let receipt = h.engine.place_bet("alice", PoolId(3), available).await.unwrap();
        assert_eq!(receipt.race_id, RaceId(2));
        assert_eq!(receipt.remaining, Lamports::ZERO);
    }

    #[tokio::test]
    async fn race_without_bets_settles_without_touching_the_chain() {
        let h = harness(test_config());
        h.run_race(&[]).await;

        let outcome = h.scheduler.tick(DURATION_MS).await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Settled {
                race_id: RaceId::FIRST,
                winning_pool: PoolId(1),
                signature: None,
            }
        );
        let race = h.ledger.race(RaceId::FIRST).await.unwrap();
        assert_eq!(race.state, RaceState::Finished);
        assert_eq!(race.settlement, SettlementStatus::Settled { signature: None });
        assert_eq!(h.chain.attempts(), 0);
    }

    #[tokio::test]
    async fn created_race_is_left_alone() {
        let h = harness(test_config());
        assert_eq!(h.scheduler.tick(0).await.unwrap(), TickOutcome::Idle);
        h.ledger.create_race("op", 0).await.unwrap();
        assert_eq!(h.scheduler.tick(u64::MAX).await.unwrap(), TickOutcome::Idle);
        assert_eq!(h.store.commits(), 1);
    }

    #[tokio::test]
    async fn chain_winner_without_bets_falls_back_to_a_pool_with_bets() {
        let h = harness(test_config());
        h.run_race(&[("alice", 2, SOL), ("bob", 2, SOL)]).await;
        h.declare_winner(4);

        match h.scheduler.tick(DURATION_MS).await.unwrap() {
            TickOutcome::Settled { winning_pool, .. } => assert_eq!(winning_pool, PoolId(2)),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(h.paid("alice"), Some(Lamports(SOL)));
        assert_eq!(h.paid("bob"), Some(Lamports(SOL)));
    }

    #[tokio::test]
    async fn overlapping_ticks_are_skipped() {
        let h = harness(test_config());
        h.run_race(&three_bettors()).await;
        h.declare_winner(1);

        let (first, second) = tokio::join!(
            h.scheduler.tick(DURATION_MS),
            h.scheduler.tick(DURATION_MS)
        );
        let mut outcomes = vec![first.unwrap(), second.unwrap()];
        outcomes.retain(|outcome| *outcome != TickOutcome::Skipped);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], TickOutcome::Settled { .. }));
        assert_eq!(h.chain.settlements(), 1);
    }

    #[tokio::test]
    async fn large_races_settle_through_a_lookup_table() {
        let h = harness(test_config());
        let handles: Vec<String> = (0..40).map(|i| format!("rider{i:02}")).collect();
        let bets: Vec<(&str, u16, u64)> = handles
            .iter()
            .enumerate()
            .map(|(i, handle)| (handle.as_str(), i as u16 % 5 + 1, SOL))
            .collect();
        h.run_race(&bets).await;
        h.declare_winner(3);

        let outcome = h.scheduler.tick(DURATION_MS).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Settled { .. }));
        assert_eq!(h.chain.lookup_table_creates(), 1);
        assert_eq!(h.chain.lookup_table_extends(), 3);
        assert_eq!(h.chain.settlements(), 1);

        // create, three extends, then the settlement itself
        let confirmed = h.chain.confirmed();
        assert_eq!(confirmed.len(), 5);
        let settlement = &confirmed[4];
        assert_eq!(settlement.lookup_tables.len(), 1);
        assert_eq!(settlement.lookup_tables[0].addresses.len(), 40);

        let tables = h.store.lookup_tables();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].address, settlement.lookup_tables[0].address);
        assert_eq!(tables[0].created_at_ms, DURATION_MS);

        // 8 winners of 1 SOL split 40 SOL evenly.
        let winners: Vec<Lamports> = h
            .store
            .users()
            .iter()
            .filter_map(|user| user.bet_for(RaceId::FIRST).and_then(|bet| bet.payout))
            .filter(|payout| !payout.is_zero())
            .collect();
        assert_eq!(winners, vec![Lamports(5 * SOL); 8]);
    }

    #[tokio::test]
    async fn small_races_skip_the_lookup_table() {
        let h = harness(test_config());
        let handles: Vec<String> = (0..25).map(|i| format!("rider{i:02}")).collect();
        let bets: Vec<(&str, u16, u64)> = handles
            .iter()
            .map(|handle| (handle.as_str(), 1, SOL))
            .collect();
        h.run_race(&bets).await;
        h.declare_winner(1);

        h.scheduler.tick(DURATION_MS).await.unwrap();
        assert_eq!(h.chain.lookup_table_creates(), 0);
        assert_eq!(h.chain.confirmed().len(), 1);
        assert!(h.store.lookup_tables().is_empty());
    }

    #[tokio::test]
    async fn timed_out_settlement_is_confirmed_without_resubmitting() {
        let h = harness(test_config());
        h.run_race(&three_bettors()).await;
        h.declare_winner(1);
        h.chain.script(Scripted::Timeout(TxStatus::Pending));

        let signature = Signature("sig1".into());
        let outcome = h.scheduler.tick(DURATION_MS).await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::InFlight {
                race_id: RaceId::FIRST,
                signature: signature.clone(),
            }
        );
        assert_eq!(
            h.settlement(),
            SettlementStatus::InFlight {
                signature: signature.clone(),
            }
        );
        assert_eq!(h.paid("bob"), None);
        assert_eq!(h.chain.balance(&BOB), Lamports(100 * SOL));

        // Still pending: nothing new is sent.
        let outcome = h.scheduler.tick(DURATION_MS + 1_000).await.unwrap();
        assert!(matches!(outcome, TickOutcome::InFlight { .. }));
        assert_eq!(h.chain.attempts(), 1);

        h.chain.set_status(&signature, TxStatus::Confirmed);
        let outcome = h.scheduler.tick(DURATION_MS + 2_000).await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Settled {
                race_id: RaceId::FIRST,
                winning_pool: PoolId(1),
                signature: Some(signature),
            }
        );
        assert_eq!(h.chain.attempts(), 1);
        assert_eq!(h.paid("bob"), Some(Lamports(2_666_666_667)));
        assert_eq!(h.chain.balance(&BOB), Lamports(100 * SOL + 2_666_666_667));
    }

    #[tokio::test]
    async fn dropped_settlement_is_resubmitted() {
        let h = harness(test_config());
        h.run_race(&three_bettors()).await;
        h.declare_winner(1);
        h.chain.script(Scripted::Timeout(TxStatus::Dropped));

        let outcome = h.scheduler.tick(DURATION_MS).await.unwrap();
        assert!(matches!(outcome, TickOutcome::InFlight { .. }));

        let outcome = h.scheduler.tick(DURATION_MS + 1_000).await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Settled {
                race_id: RaceId::FIRST,
                winning_pool: PoolId(1),
                signature: Some(Signature("sig2".into())),
            }
        );
        assert_eq!(h.chain.attempts(), 2);
        assert_eq!(h.chain.settlements(), 1);
        assert_eq!(h.paid("alice"), Some(Lamports(1_333_333_333)));
    }

    #[tokio::test]
    async fn failed_in_flight_settlement_is_resubmitted() {
        let h = harness(test_config());
        h.run_race(&three_bettors()).await;
        h.declare_winner(1);
        h.chain
            .script(Scripted::Timeout(TxStatus::Failed("blockhash not found".into())));

        h.scheduler.tick(DURATION_MS).await.unwrap();
        let outcome = h.scheduler.tick(DURATION_MS + 1_000).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Settled { .. }));
        assert_eq!(h.chain.attempts(), 2);
    }

    #[tokio::test]
    async fn rejected_settlement_waits_for_an_operator() {
        let h = harness(test_config());
        h.run_race(&three_bettors()).await;
        h.declare_winner(1);
        let reason = "custom program error: 0x1771".to_string();
        h.chain.script(Scripted::Fail(ChainError::Rejected {
            reason: reason.clone(),
        }));

        let err = h.scheduler.tick(DURATION_MS).await.unwrap_err();
        assert_eq!(
            err,
            Error::Chain(ChainError::Rejected {
                reason: reason.clone(),
            })
        );
        assert_eq!(
            h.settlement(),
            SettlementStatus::Rejected {
                reason: reason.clone(),
            }
        );

        // Later ticks report the rejection without resubmitting.
        let outcome = h.scheduler.tick(DURATION_MS + 1_000).await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Rejected {
                race_id: RaceId::FIRST,
                reason,
            }
        );
        assert_eq!(h.chain.attempts(), 1);
        assert_eq!(h.paid("alice"), None);

        assert!(h.ledger.retry_settlement(RaceId::FIRST).await.unwrap());
        let outcome = h.scheduler.tick(DURATION_MS + 2_000).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Settled { .. }));
        assert_eq!(h.paid("alice"), Some(Lamports(1_333_333_333)));
        assert_eq!(
            h.ledger.retry_settlement(RaceId::FIRST).await.unwrap_err(),
            Error::State(StateError::AlreadyResolved)
        );
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let h = harness(test_config());
        h.run_race(&three_bettors()).await;
        h.declare_winner(1);
        h.chain.script(Scripted::Fail(ChainError::Transport("connection reset".into())));
        h.chain.script(Scripted::Fail(ChainError::BlockhashExpired));

        let outcome = h.scheduler.tick(DURATION_MS).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Settled { .. }));
        assert_eq!(h.chain.attempts(), 3);
        assert_eq!(h.chain.settlements(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_leave_the_race_unsettled() {
        let h = harness(test_config());
        h.run_race(&three_bettors()).await;
        h.declare_winner(1);
        for _ in 0..3 {
            h.chain.script(Scripted::Fail(ChainError::Transport("down".into())));
        }

        let err = h.scheduler.tick(DURATION_MS).await.unwrap_err();
        assert_eq!(err, Error::RetriesExhausted { attempts: 3 });
        let race = h.ledger.race(RaceId::FIRST).await.unwrap();
        assert_eq!(race.state, RaceState::Finished);
        assert_eq!(race.settlement, SettlementStatus::Unsettled);
        assert_eq!(h.paid("bob"), None);

        let outcome = h.scheduler.tick(DURATION_MS + 1_000).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Settled { .. }));
        assert_eq!(h.chain.settlements(), 1);
    }

    #[tokio::test]
    async fn settling_twice_pays_once() {
        let h = harness(test_config());
        h.run_race(&three_bettors()).await;
        h.ledger.finish_race(PoolId(1)).await.unwrap();

        let race = h.ledger.race(RaceId::FIRST).await.unwrap();
        let bettors: Vec<_> = h.store.users();
        let payouts = PayoutResolver::new(h.config.unclaimed_pool_policy)
            .resolve(&race, &bettors)
            .unwrap();
        let batcher = ChainSettlementBatcher::new(h.store.clone(), h.chain.clone(), h.config.clone());

        let first = batcher.settle(&payouts, DURATION_MS).await.unwrap();
        assert_eq!(
            first,
            SettleOutcome::Settled {
                signature: Some(Signature("sig1".into())),
            }
        );
        let second = batcher.settle(&payouts, DURATION_MS).await.unwrap();
        assert_eq!(second, SettleOutcome::AlreadySettled);

        assert_eq!(h.chain.attempts(), 1);
        assert_eq!(h.paid("alice"), Some(Lamports(1_333_333_333)));
        assert_eq!(h.paid("bob"), Some(Lamports(2_666_666_667)));
        assert_eq!(h.chain.balance(&BOB), Lamports(100 * SOL + 2_666_666_667));
    }

    #[tokio::test]
    async fn unfinished_races_are_not_settled() {
        let h = harness(test_config());
        h.run_race(&three_bettors()).await;

        let mut race = h.ledger.race(RaceId::FIRST).await.unwrap();
        race.state = RaceState::Finished;
        race.winning_pool = Some(PoolId(1));
        let payouts = PayoutResolver::new(h.config.unclaimed_pool_policy)
            .resolve(&race, &h.store.users())
            .unwrap();

        let batcher = ChainSettlementBatcher::new(h.store.clone(), h.chain.clone(), h.config.clone());
        let err = batcher.settle(&payouts, DURATION_MS).await.unwrap_err();
        assert_eq!(
            err,
            Error::State(StateError::WrongState {
                expected: RaceState::Finished,
                actual: RaceState::Started,
            })
        );
        assert_eq!(h.chain.attempts(), 0);
    }

    #[tokio::test]
    async fn winnings_reach_the_balance_once() {
        let h = harness(test_config());
        h.ledger.create_race("op", 0).await.unwrap();
        for (handle, wallet, pool) in [("alice", ALICE, 1), ("bob", BOB, 2)] {
            h.chain.set_balance(wallet, Lamports(SOL));
            h.engine.register_user(handle, wallet).await.unwrap();
            h.engine.place_bet(handle, PoolId(pool), Lamports(SOL)).await.unwrap();
        }
        h.ledger.start_race(0).await.unwrap();
        h.declare_winner(1);

        h.scheduler.tick(DURATION_MS).await.unwrap();

        // The 2 SOL pot landed in alice's wallet; her stake is still held
        // against it in the ledger.
        assert_eq!(h.chain.balance(&ALICE), Lamports(3 * SOL));
        let user = h.engine.user("alice").await.unwrap();
        assert_eq!(user.earned_funds, Lamports::ZERO);
        assert_eq!(h.paid("alice"), Some(Lamports(2 * SOL)));
        assert_eq!(
            h.engine.available_balance("alice").await.unwrap(),
            Lamports(2 * SOL)
        );
        assert_eq!(h.engine.available_balance("bob").await.unwrap(), Lamports::ZERO);
    }

    #[tokio::test]
    async fn concurrent_settlers_submit_once() {
        let h = harness(test_config());
        h.run_race(&three_bettors()).await;
        let race = h.ledger.finish_race(PoolId(1)).await.unwrap();
        let operator = ResolutionScheduler::new(h.store.clone(), h.chain.clone(), h.config.clone());

        let (forced, ticked) = tokio::join!(
            operator.settle(race, DURATION_MS),
            h.scheduler.tick(DURATION_MS)
        );
        let outcomes = [forced.unwrap(), ticked.unwrap()];
        let settled = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, TickOutcome::Settled { .. }))
            .count();
        assert_eq!(settled, 1, "{outcomes:?}");
        assert!(outcomes.iter().all(|outcome| matches!(
            outcome,
            TickOutcome::Settled { .. }
                | TickOutcome::Submitting { .. }
                | TickOutcome::Idle
        )));
        assert_eq!(h.chain.attempts(), 1);
        assert_eq!(h.chain.settlements(), 1);
        assert_eq!(h.chain.balance(&BOB), Lamports(100 * SOL + 2_666_666_667));
    }

    #[tokio::test]
    async fn abandoned_claim_is_taken_over_after_the_lease() {
        let config = EngineConfig {
            settlement_lease: Duration::from_secs(30),
            ..test_config()
        };
        let h = harness(config);
        h.run_race(&three_bettors()).await;
        h.ledger.finish_race(PoolId(1)).await.unwrap();
        // A settler that claimed the race and then died.
        h.store.update_race(RaceId::FIRST, |race| {
            race.settlement = SettlementStatus::Submitting {
                claimed_at_ms: DURATION_MS,
            };
        });

        let outcome = h.scheduler.tick(DURATION_MS + 29_999).await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Submitting {
                race_id: RaceId::FIRST,
            }
        );
        assert_eq!(h.chain.attempts(), 0);

        let outcome = h.scheduler.tick(DURATION_MS + 30_000).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Settled { .. }));
        assert_eq!(h.chain.settlements(), 1);
    }

    fn forty_riders() -> Vec<(String, u16)> {
        (0..40)
            .map(|i| (format!("rider{i:02}"), i as u16 % 5 + 1))
            .collect()
    }

    async fn run_large_race(h: &Harness) {
        let riders = forty_riders();
        let bets: Vec<(&str, u16, u64)> = riders
            .iter()
            .map(|(handle, pool)| (handle.as_str(), *pool, SOL))
            .collect();
        h.run_race(&bets).await;
        h.declare_winner(3);
    }

    fn sweep_now(h: &Harness) -> LookupTableSweeper<MemoryStore, MockChain> {
        let config = EngineConfig {
            lookup_table_min_age: Duration::ZERO,
            ..h.config.clone()
        };
        LookupTableSweeper::new(h.store.clone(), h.chain.clone(), config)
    }

    #[tokio::test]
    async fn lookup_table_is_recorded_when_its_create_times_out() {
        let h = harness(test_config());
        run_large_race(&h).await;
        h.chain.script(Scripted::Timeout(TxStatus::Dropped));

        let err = h.scheduler.tick(DURATION_MS).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Chain(ChainError::ConfirmationTimeout { .. })
        ));
        let tables = h.store.lookup_tables();
        assert_eq!(tables.len(), 1);
        assert!(h.chain.lookup_tables().is_empty());
        assert_eq!(h.settlement(), SettlementStatus::Unsettled);

        // The table never landed, so the sweep just drops the record.
        let report = sweep_now(&h).sweep(DURATION_MS + 1).await.unwrap();
        assert_eq!(report.closed, vec![tables[0].address]);
        assert!(h.store.lookup_tables().is_empty());
        assert_eq!(h.chain.lookup_table_closes(), 0);

        let outcome = h.scheduler.tick(DURATION_MS + 2).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Settled { .. }));
        assert_eq!(h.chain.settlements(), 1);
    }

    #[tokio::test]
    async fn lookup_table_that_landed_after_a_timeout_is_closed() {
        let h = harness(test_config());
        run_large_race(&h).await;
        h.chain.script(Scripted::Timeout(TxStatus::Confirmed));

        assert!(h.scheduler.tick(DURATION_MS).await.is_err());
        let tables = h.store.lookup_tables();
        assert_eq!(tables.len(), 1);
        assert_eq!(h.chain.lookup_tables(), vec![tables[0].address]);

        let report = sweep_now(&h).sweep(DURATION_MS + 1).await.unwrap();
        assert_eq!(report.closed, vec![tables[0].address]);
        assert_eq!(h.chain.lookup_table_closes(), 1);
        assert!(h.chain.lookup_tables().is_empty());
    }
}
