#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    use crate::{
        executor::ImportExecutor,
        ledger,
        models::{AssetDraft, ImportAction, InstrumentEdit, MatchSource, ResolvedInstrument, TransactionType},
        parser,
        store::{MemoryStore, PortfolioStore},
        test::fixtures::{candidate, instrument, tx},
    };

    async fn setup() -> (Arc<MemoryStore>, ImportExecutor, i64) {
        let store = Arc::new(MemoryStore::new());
        let portfolio = store.create_portfolio("alice", "Main").await.unwrap();
        let executor = ImportExecutor::new(store.clone(), 4);
        (store, executor, *portfolio.id())
    }

    #[tokio::test]
    async fn add_over_existing_asset_updates_it() {
        let (store, executor, pid) = setup().await;
        store
            .upsert_asset(&AssetDraft {
                portfolio_id: pid,
                symbol: "AAPL".to_string(),
                name: "Apple".to_string(),
                quantity: dec!(2),
                buy_price: dec!(120),
                currency: "USD".to_string(),
                sector: Some("Technology".to_string()),
                ..AssetDraft::default()
            })
            .await
            .unwrap();

        let instruments = vec![instrument("AAPL", dec!(10), dec!(150), ImportAction::Add)];
        let result = executor.execute(&instruments, &[], pid).await;

        assert!(result.success);
        assert_eq!(result.added, 0);
        assert_eq!(result.updated, 1);

        let assets = store.list_assets(pid).await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(*assets[0].quantity(), dec!(10));
        assert_eq!(*assets[0].buy_price(), dec!(150));
        assert_eq!(assets[0].sector().as_deref(), Some("Technology"));
        assert_eq!(assets[0].platform().as_deref(), Some("Broker"));
    }

    #[tokio::test]
    async fn update_keeps_cost_basis_when_import_has_none() {
        let (store, executor, pid) = setup().await;
        store
            .upsert_asset(&AssetDraft {
                portfolio_id: pid,
                symbol: "MSFT".to_string(),
                name: "Microsoft".to_string(),
                quantity: dec!(1),
                buy_price: dec!(280),
                currency: "USD".to_string(),
                ..AssetDraft::default()
            })
            .await
            .unwrap();

        let mut msft = instrument("MSFT", dec!(4), dec!(0), ImportAction::Update);
        msft.apply_edit(InstrumentEdit {
            custom_group: Some("Core".to_string()),
            ..InstrumentEdit::default()
        });
        let result = executor.execute(&[msft], &[], pid).await;
        assert_eq!(result.updated, 1);

        let asset = store.find_asset(pid, "msft").await.unwrap().unwrap();
        assert_eq!(*asset.quantity(), dec!(4));
        assert_eq!(*asset.buy_price(), dec!(280));
        assert_eq!(asset.custom_group().as_deref(), Some("Core"));
    }

    #[tokio::test]
    async fn actions_and_history() {
        let (store, executor, pid) = setup().await;
        let instruments = vec![
            instrument("AAPL", dec!(5), dec!(100), ImportAction::Add),
            instrument("TSLA", dec!(0), dec!(200), ImportAction::Close),
            instrument("KO", dec!(3), dec!(60), ImportAction::Skip),
        ];
        let transactions = vec![
            tx(TransactionType::Buy, 1, "AAPL", dec!(5), dec!(100)),
            tx(TransactionType::Buy, 2, "TSLA", dec!(1), dec!(200)),
            tx(TransactionType::Sell, 3, "TSLA", dec!(1), dec!(250)),
            tx(TransactionType::Buy, 4, "KO", dec!(3), dec!(60)),
            tx(TransactionType::Deposit, 1, "USD", dec!(1000), dec!(1)),
        ];
        let result = executor.execute(&instruments, &transactions, pid).await;

        assert!(result.success);
        assert_eq!(result.added, 1);
        assert_eq!(result.closed, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.transactions_added, 5);
        assert!(result.errors.is_empty());

        let tsla = store.find_asset(pid, "TSLA").await.unwrap().unwrap();
        assert_eq!(*tsla.quantity(), dec!(0));
        assert!(store.find_asset(pid, "KO").await.unwrap().is_none());
        assert_eq!(store.list_transactions(pid, "KO").await.unwrap().len(), 1);
        assert_eq!(store.list_transactions(pid, "USD").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transactions_follow_the_resolved_symbol() {
        let (store, executor, pid) = setup().await;
        let mut resolved = instrument("US0378331005", dec!(2), dec!(150), ImportAction::Add);
        resolved.apply_candidate(&candidate("AAPL"), MatchSource::Searched, 95);

        let transactions = vec![tx(TransactionType::Buy, 1, "US0378331005", dec!(2), dec!(150))];
        executor.execute(&[resolved], &transactions, pid).await;

        let entries = store.list_transactions(pid, "AAPL").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].transaction().symbol(), "US0378331005");
        assert!(store.find_asset(pid, "AAPL").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reimport_is_idempotent() {
        let (store, executor, pid) = setup().await;
        let instruments = vec![instrument("AAPL", dec!(2), dec!(100), ImportAction::Add)];
        // Two identical fills in the same file are distinct events.
        let transactions = vec![
            tx(TransactionType::Buy, 1, "AAPL", dec!(1), dec!(100)),
            tx(TransactionType::Buy, 1, "AAPL", dec!(1), dec!(100)),
        ];

        let first = executor.execute(&instruments, &transactions, pid).await;
        assert_eq!(first.transactions_added, 2);

        let second = executor.execute(&instruments, &transactions, pid).await;
        assert!(second.success);
        assert_eq!(second.transactions_added, 0);
        assert_eq!(second.duplicates_ignored, 2);
        assert_eq!(second.updated, 1);
        assert_eq!(store.list_ledger(pid).await.unwrap().len(), 2);
        assert_eq!(store.list_assets(pid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn snapshot_reimport_days_later_is_idempotent() {
        let (store, executor, pid) = setup().await;
        let snapshot = b"Symbol,Quantity,Price,Currency\nAAPL,10,150,USD\n";

        for day in [1, 9] {
            let parsed = parser::parse_at(snapshot, None, Utc.with_ymd_and_hms(2024, 3, day, 8, 0, 0).unwrap());
            let instruments: Vec<ResolvedInstrument> = parsed
                .rows
                .iter()
                .map(|row| {
                    let mut instrument = ResolvedInstrument::from_row(row);
                    instrument.set_action(ImportAction::Add);
                    instrument
                })
                .collect();
            let result = executor.execute(&instruments, &parsed.transactions, pid).await;
            assert!(result.errors.is_empty());
        }

        assert_eq!(store.list_ledger(pid).await.unwrap().len(), 1);
        let positions = ledger::positions(&*store, pid).await.unwrap();
        assert_eq!(*positions[0].total_quantity_bought(), dec!(10));
        let asset = store.find_asset(pid, "AAPL").await.unwrap().unwrap();
        assert_eq!(*asset.quantity(), *positions[0].open_quantity());
    }

    #[tokio::test]
    async fn failing_unit_does_not_abort_the_others() {
        let (store, executor, pid) = setup().await;
        store.reject_symbol("TSLA").await;
        let instruments = vec![
            instrument("AAPL", dec!(1), dec!(100), ImportAction::Add),
            instrument("TSLA", dec!(1), dec!(200), ImportAction::Add),
        ];
        let transactions = vec![
            tx(TransactionType::Buy, 1, "AAPL", dec!(1), dec!(100)),
            tx(TransactionType::Buy, 1, "TSLA", dec!(1), dec!(200)),
        ];
        let result = executor.execute(&instruments, &transactions, pid).await;

        assert!(result.success);
        assert_eq!(result.added, 1);
        assert_eq!(result.transactions_added, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("TSLA"));

        // The rejected unit left nothing behind.
        assert!(store.find_asset(pid, "TSLA").await.unwrap().is_none());
        assert!(store.list_transactions(pid, "TSLA").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn progress_counts_units() {
        let (_store, executor, pid) = setup().await;
        let instruments = vec![
            instrument("A", dec!(1), dec!(1), ImportAction::Add),
            instrument("B", dec!(1), dec!(1), ImportAction::Add),
        ];
        let transactions = vec![tx(TransactionType::Deposit, 1, "EUR", dec!(10), dec!(1))];
        let mut seen = Vec::new();
        executor
            .execute_with_progress(&instruments, &transactions, pid, |done, total| seen.push((done, total)))
            .await;
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }
}
