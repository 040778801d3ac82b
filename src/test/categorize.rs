#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use strum::IntoEnumIterator;

    use crate::{
        categorize::{Category, categorize, counts_by_bucket, group},
        models::{AssetType, ParsedRow},
        test::fixtures::row,
    };

    #[test]
    fn cash_is_always_statement() {
        for quantity in [dec!(500), dec!(-500), dec!(0), dec!(1000000)] {
            assert_eq!(categorize(AssetType::Cash, quantity), Category::Statement);
        }
    }

    #[test]
    fn precedence_holds_for_every_type() {
        let quantities = [dec!(-3), dec!(0), dec!(0.0000001), dec!(0.01), dec!(12)];
        for asset_type in AssetType::iter() {
            for quantity in quantities {
                let expected = match asset_type {
                    AssetType::Cash => Category::Statement,
                    AssetType::Dividend => Category::Dividend,
                    AssetType::Deposit
                    | AssetType::Withdrawal
                    | AssetType::Interest
                    | AssetType::Fee
                    | AssetType::Coupon => Category::Statement,
                    _ if quantity > dec!(0.000001) => Category::Open,
                    _ => Category::Closed,
                };
                assert_eq!(categorize(asset_type, quantity), expected, "{} {}", asset_type, quantity);
            }
        }
    }

    #[test]
    fn dust_quantity_is_closed() {
        assert_eq!(categorize(AssetType::Stock, dec!(0.0000005)), Category::Closed);
        assert_eq!(categorize(AssetType::Crypto, dec!(0.00001)), Category::Open);
    }

    #[test]
    fn dividend_follows_its_open_position() {
        let rows = vec![
            row("EUR", None, AssetType::Cash, dec!(500)),
            row("AAPL", None, AssetType::Dividend, dec!(12)),
            row("MSFT", None, AssetType::Stock, dec!(0)),
            row("AAPL", None, AssetType::Stock, dec!(10)),
        ];
        let grouped = group(&rows);

        let order: Vec<usize> = grouped.iter().map(|g| g.index).collect();
        assert_eq!(order, vec![3, 1, 2, 0]);
        assert_eq!(grouped[1].category, Category::Dividend);
        assert_eq!(grouped[1].bucket, Category::Open);
        assert_eq!(grouped[1].attached_to, Some(3));

        let counts = counts_by_bucket(&rows);
        assert_eq!(counts.open, 2);
        assert_eq!(counts.closed, 1);
        assert_eq!(counts.statement, 1);
    }

    #[test]
    fn dividend_matches_by_isin_and_prefers_open() {
        let rows = vec![
            row("US0378331005", Some("US0378331005"), AssetType::Dividend, dec!(3)),
            row("AAPL", Some("US0378331005"), AssetType::Stock, dec!(0)),
            row("AAPL.DE", Some("US0378331005"), AssetType::Stock, dec!(4)),
        ];
        let grouped = group(&rows);
        let order: Vec<usize> = grouped.iter().map(|g| g.index).collect();
        assert_eq!(order, vec![2, 0, 1]);
        assert_eq!(grouped[1].attached_to, Some(2));
    }

    #[test]
    fn unmatched_dividend_lands_in_statements() {
        let rows = vec![
            row("KO", None, AssetType::Dividend, dec!(2)),
            row("AAPL", None, AssetType::Stock, dec!(1)),
        ];
        let grouped = group(&rows);
        assert_eq!(grouped.last().map(|g| g.index), Some(0));
        assert_eq!(grouped[1].bucket, Category::Statement);
        assert_eq!(counts_by_bucket(&rows).statement, 1);
    }

    #[test]
    fn empty_identifiers_never_match() {
        let mut rows = vec![row("", None, AssetType::Dividend, dec!(1))];
        rows.push(ParsedRow::new(
            String::new(),
            None,
            "Unknown".to_string(),
            dec!(5),
            Decimal::ONE,
            "USD".to_string(),
            AssetType::Stock,
            String::new(),
            None,
            50,
            Vec::new(),
        ));
        let grouped = group(&rows);
        assert_eq!(grouped[0].index, 1);
        assert_eq!(grouped[1].attached_to, None);
    }

    #[test]
    fn grouping_keeps_every_row_and_agrees_with_counts() {
        let types = [
            AssetType::Stock,
            AssetType::Dividend,
            AssetType::Cash,
            AssetType::Fee,
            AssetType::Crypto,
            AssetType::Dividend,
        ];
        let symbols = ["AAPL", "MSFT", "AAPL", "EUR"];
        let quantities = [dec!(0), dec!(5), dec!(-1)];

        for size in 0..12usize {
            let rows: Vec<ParsedRow> = (0..size)
                .map(|i| {
                    row(
                        symbols[(i * 7) % symbols.len()],
                        None,
                        types[(i * 5 + size) % types.len()],
                        quantities[(i + size) % quantities.len()],
                    )
                })
                .collect();
            let grouped = group(&rows);
            assert_eq!(grouped.len(), rows.len());

            let mut seen: Vec<usize> = grouped.iter().map(|g| g.index).collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..size).collect::<Vec<_>>());

            for (pos, entry) in grouped.iter().enumerate() {
                if let Some(parent) = entry.attached_to {
                    let parent_pos = grouped.iter().position(|g| g.index == parent).unwrap();
                    assert!(parent_pos < pos);
                    assert!(grouped[parent_pos + 1..=pos]
                        .iter()
                        .all(|g| g.category == Category::Dividend));
                }
            }

            let counts = counts_by_bucket(&rows);
            let open = grouped.iter().filter(|g| g.bucket == Category::Open).count();
            let closed = grouped.iter().filter(|g| g.bucket == Category::Closed).count();
            assert_eq!(counts.open, open);
            assert_eq!(counts.closed, closed);
            assert_eq!(counts.open + counts.closed + counts.statement, size);
        }
    }
}
