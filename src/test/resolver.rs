#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use rust_decimal_macros::dec;

    use crate::{
        models::{Asset, AssetDraft, AssetType, ImportAction, MatchSource, ParsedRow},
        resolver::SymbolResolver,
        store::{MemoryStore, SymbolCache},
        test::fixtures::{FakeSource, row},
    };

    fn resolver(source: FakeSource, cache: Arc<MemoryStore>) -> SymbolResolver {
        SymbolResolver::new(Arc::new(source), cache, 5, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn timeouts_degrade_only_the_slow_rows() {
        let mut source = FakeSource::new();
        for slow in ["SYM3", "SYM11", "SYM17"] {
            source.slow.insert(slow.to_string());
        }
        let rows: Vec<ParsedRow> = (0..20)
            .map(|i| row(&format!("SYM{}", i), None, AssetType::Stock, dec!(1)))
            .collect();

        let result = resolver(source, Arc::new(MemoryStore::new())).resolve(&rows, &[]).await;

        assert!(result.success);
        assert_eq!(result.resolved.len(), 20);
        for (idx, instrument) in result.resolved.iter().enumerate() {
            assert_eq!(instrument.row().symbol(), &format!("SYM{}", idx));
        }

        let fallback: Vec<_> = result
            .resolved
            .iter()
            .filter(|inst| *inst.match_source() == MatchSource::Fallback)
            .collect();
        assert_eq!(fallback.len(), 3);
        assert!(fallback.iter().all(|inst| *inst.confidence() == 40 && !inst.warnings().is_empty()));
        assert!(fallback.iter().all(|inst| inst.resolved_symbol() == inst.row().symbol()));

        let confident = result.resolved.iter().filter(|inst| *inst.confidence() >= 85).count();
        assert_eq!(confident, 17);
    }

    #[tokio::test]
    async fn isin_matches_are_cached() {
        let cache = Arc::new(MemoryStore::new());
        let rows = vec![row("US0378331005", Some("US0378331005"), AssetType::Stock, dec!(2))];

        let first = resolver(FakeSource::new(), cache.clone()).resolve(&rows, &[]).await;
        let apple = &first.resolved[0];
        assert_eq!(apple.resolved_symbol(), "AAPL");
        assert_eq!(*apple.confidence(), 95);
        assert_eq!(*apple.match_source(), MatchSource::Searched);
        assert_eq!(apple.row().symbol(), "US0378331005");
        assert!(cache.lookup("US0378331005").await.unwrap().is_some());

        let mut offline = FakeSource::new();
        offline.available = false;
        let second = resolver(offline, cache).resolve(&rows, &[]).await;
        assert_eq!(*second.resolved[0].match_source(), MatchSource::Cached);
        assert_eq!(*second.resolved[0].confidence(), 100);
    }

    #[tokio::test]
    async fn no_match_keeps_the_parsed_symbol() {
        let rows = vec![row("NOPE", None, AssetType::Stock, dec!(1))];
        let result = resolver(FakeSource::new(), Arc::new(MemoryStore::new()))
            .resolve(&rows, &[])
            .await;
        let instrument = &result.resolved[0];
        assert_eq!(instrument.resolved_symbol(), "NOPE");
        assert_eq!(*instrument.confidence(), 50);
        assert_eq!(*instrument.match_source(), MatchSource::Fallback);
    }

    #[tokio::test]
    async fn unavailable_source_fails_the_batch_softly() {
        let mut source = FakeSource::new();
        source.available = false;
        let rows = vec![
            row("AAPL", None, AssetType::Stock, dec!(1)),
            row("EUR", None, AssetType::Cash, dec!(100)),
        ];
        let result = resolver(source, Arc::new(MemoryStore::new())).resolve(&rows, &[]).await;

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(*result.resolved[0].confidence(), 40);
        assert_eq!(*result.resolved[1].match_source(), MatchSource::Direct);
        assert_eq!(*result.resolved[1].confidence(), 100);
    }

    #[tokio::test]
    async fn default_actions() {
        let existing = Asset::from_draft(
            7,
            AssetDraft {
                portfolio_id: 1,
                symbol: "MSFT".to_string(),
                name: "Microsoft".to_string(),
                quantity: dec!(4),
                buy_price: dec!(300),
                currency: "USD".to_string(),
                ..AssetDraft::default()
            },
        );
        let rows = vec![
            row("AAPL", None, AssetType::Stock, dec!(3)),
            row("MSFT", None, AssetType::Stock, dec!(5)),
            row("TSLA", None, AssetType::Stock, dec!(0)),
            row("AAPL", None, AssetType::Dividend, dec!(1.2)),
            row("EUR", None, AssetType::Cash, dec!(50)),
        ];
        let result = resolver(FakeSource::new(), Arc::new(MemoryStore::new()))
            .resolve(&rows, &[existing])
            .await;

        let actions: Vec<ImportAction> = result.resolved.iter().map(|inst| *inst.action()).collect();
        assert_eq!(
            actions,
            vec![
                ImportAction::Add,
                ImportAction::Update,
                ImportAction::Close,
                ImportAction::Skip,
                ImportAction::Skip,
            ]
        );
        assert_eq!(result.resolved[1].existing_asset().as_ref().map(|a| *a.id()), Some(7));
        assert_eq!(result.resolved[0].country().as_deref(), Some("US"));
        assert_eq!(result.resolved[0].category().as_deref(), Some("Equity"));
    }

    #[tokio::test]
    async fn progress_is_reported_per_row() {
        let rows: Vec<ParsedRow> = (0..6)
            .map(|i| row(&format!("S{}", i), None, AssetType::Stock, dec!(1)))
            .collect();
        let mut seen = Vec::new();
        resolver(FakeSource::new(), Arc::new(MemoryStore::new()))
            .resolve_with_progress(&rows, &[], |done, total| seen.push((done, total)))
            .await;
        assert_eq!(seen, (1..=6).map(|done| (done, 6)).collect::<Vec<_>>());
    }
}
