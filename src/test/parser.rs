#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use chrono::{Datelike, NaiveDate, TimeZone, Timelike, Utc};
    use rust_decimal_macros::dec;
    use zip::{ZipWriter, write::FileOptions};

    use crate::{
        models::{AssetType, TransactionType},
        parser::{
            DetectedFormat,
            columns::{Field, find_best_match, normalize},
            decode_text,
            kraken::normalize_asset,
            parse, parse_at,
            table::{Table, excel_serial_to_date},
            values::{looks_like_isin, normalize_currency, parse_date, parse_number},
        },
    };

    #[test]
    fn numbers_in_both_conventions() {
        assert_eq!(parse_number("1.234,56"), Some(dec!(1234.56)));
        assert_eq!(parse_number("1,234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_number("\"12,5\""), Some(dec!(12.5)));
        assert_eq!(parse_number("€ 1.000,00"), Some(dec!(1000.00)));
        assert_eq!(parse_number("-42"), Some(dec!(-42)));
        assert_eq!(parse_number("1,000,000"), Some(dec!(1000000)));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn dates_in_common_layouts() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(parse_date("2024-03-15"), Some(expected));
        assert_eq!(parse_date("15-03-2024"), Some(expected));
        assert_eq!(parse_date("15.03.2024"), Some(expected));
        assert_eq!(parse_date("15/03/2024"), Some(expected));

        let with_time = parse_date("15-03-2024 14:05").unwrap();
        assert_eq!((with_time.hour(), with_time.minute()), (14, 5));
        let rfc = parse_date("2024-03-15T10:00:00+02:00").unwrap();
        assert_eq!(rfc.hour(), 8);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn currency_and_isin_helpers() {
        assert_eq!(normalize_currency("eur").as_deref(), Some("EUR"));
        assert_eq!(normalize_currency("€").as_deref(), Some("EUR"));
        assert_eq!(normalize_currency("₺").as_deref(), Some("TRY"));
        assert_eq!(normalize_currency(""), None);
        assert!(looks_like_isin("US0378331005"));
        assert!(!looks_like_isin("AAPL"));
        assert!(!looks_like_isin("us0378331005"));
    }

    #[test]
    fn header_matching() {
        assert_eq!(normalize("Para Birimi"), "parabirimi");
        assert_eq!(normalize("Buy_Price"), "buyprice");

        let columns = ["Ticker Symbol", "Shares Held", "Avg Cost", "Cur"];
        assert_eq!(find_best_match(&columns, Field::Symbol), Some("Ticker Symbol"));
        assert_eq!(find_best_match(&columns, Field::Quantity), Some("Shares Held"));
        assert_eq!(find_best_match(&columns, Field::Price), Some("Avg Cost"));
        assert_eq!(find_best_match(&columns, Field::Currency), Some("Cur"));

        // Short aliases never match inside longer headers.
        assert_eq!(find_best_match(&["Curve"], Field::Currency), None);
    }

    #[test]
    fn kraken_asset_codes() {
        assert_eq!(normalize_asset("XXBT"), "BTC");
        assert_eq!(normalize_asset("ZEUR"), "EUR");
        assert_eq!(normalize_asset("ETH.S"), "ETH");
        assert_eq!(normalize_asset("XXDG"), "DOGE");
        assert_eq!(normalize_asset("SOL"), "SOL");
    }

    #[test]
    fn generic_snapshot_rows() {
        let csv = "Symbol,Name,Quantity,Price,Currency\n\
                   AAPL,Apple Inc,10,150.5,USD\n\
                   THYAO.IS,Turk Hava Yollari,100,,\n\
                   ,Nameless,5,1,USD\n";
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let result = parse_at(csv.as_bytes(), Some("Midas"), now);

        assert!(result.success);
        assert_eq!(result.detected_format, Some(DetectedFormat::Generic));
        assert_eq!(result.total_rows, 3);
        assert_eq!(result.skipped_rows, 1);
        assert_eq!(result.rows.len(), 2);

        let apple = &result.rows[0];
        assert_eq!(apple.symbol(), "AAPL");
        assert_eq!(*apple.quantity(), dec!(10));
        assert_eq!(*apple.price(), dec!(150.5));
        assert_eq!(*apple.confidence(), 100);
        assert_eq!(apple.platform(), "Midas");

        let thy = &result.rows[1];
        assert_eq!(thy.currency(), "TRY");
        assert_eq!(*thy.confidence(), 75);
        assert!(!thy.warnings().is_empty());

        assert_eq!(result.transactions.len(), 2);
        let opening = &result.transactions[0];
        assert_eq!(*opening.transaction_type(), TransactionType::Buy);
        assert_eq!(*opening.date(), now);
        assert_eq!(opening.external_id().as_deref(), Some("SNAPSHOT-AAPL-10-150.5"));
    }

    #[test]
    fn isin_only_rows_lose_confidence() {
        let csv = "ISIN;Quantity;Price;Currency\nUS0378331005;3;100;USD\n";
        let result = parse(csv.as_bytes(), None);
        assert!(result.success);
        assert_eq!(result.rows[0].symbol(), "US0378331005");
        assert_eq!(*result.rows[0].confidence(), 80);
    }

    #[test]
    fn generic_ledger_is_aggregated() {
        let csv = "Date,Type,Symbol,Quantity,Price,Currency\n\
                   2024-01-02,BUY,AAPL,10,100,USD\n\
                   2024-01-05,SELL,AAPL,10,150,USD\n\
                   2024-01-03,BUY,MSFT,2,300,USD\n\
                   2024-01-04,DIVIDEND,MSFT,1.5,,USD\n\
                   2024-01-01,DEPOSIT,,5000,,USD\n\
                   2024-01-06,TRANSFER,AAPL,1,1,USD\n";
        let result = parse(csv.as_bytes(), Some("IBKR"));

        assert!(result.success);
        assert_eq!(result.transactions.len(), 5);
        assert_eq!(result.skipped_rows, 1);
        assert_eq!(result.closed_position_count, 1);
        assert_eq!(*result.transactions[0].transaction_type(), TransactionType::Deposit);

        let kinds: Vec<(String, AssetType)> = result
            .rows
            .iter()
            .map(|row| (row.symbol().clone(), *row.asset_type()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("USD".to_string(), AssetType::Cash),
                ("AAPL".to_string(), AssetType::Stock),
                ("MSFT".to_string(), AssetType::Stock),
                ("MSFT".to_string(), AssetType::Dividend),
            ]
        );

        let apple = &result.rows[1];
        assert_eq!(*apple.quantity(), dec!(0));
        assert!(apple.warnings()[0].starts_with("Calculated from history"));
        assert_eq!(*result.rows[0].quantity(), dec!(5000));
    }

    #[test]
    fn missing_identifier_column_fails() {
        let csv = "Name,Quantity\nApple,1\n";
        let result = parse(csv.as_bytes(), None);
        assert!(!result.success);
        assert!(result.errors[0].contains("symbol or ISIN"));
        assert_eq!(result.skipped_rows, 1);
    }

    #[test]
    fn empty_input_fails_without_panicking() {
        let result = parse(b"", None);
        assert!(!result.success);
        assert!(!result.errors.is_empty());

        let header_only = parse(b"Symbol,Quantity\n", None);
        assert!(!header_only.success);
    }

    #[test]
    fn kraken_ledger() {
        let csv = "\"txid\",\"refid\",\"time\",\"type\",\"subtype\",\"aclass\",\"asset\",\"wallet\",\"amount\",\"fee\",\"balance\"\n\
            \"L1\",\"R1\",\"2024-01-02 10:00:00\",\"deposit\",\"\",\"currency\",\"ZEUR\",\"spot / main\",\"1000.0000\",\"0.0000\",\"1000.0000\"\n\
            \"L2\",\"T1\",\"2024-01-03 11:00:00\",\"trade\",\"tradespot\",\"currency\",\"ZEUR\",\"spot / main\",\"-500.0000\",\"2.0000\",\"498.0000\"\n\
            \"L3\",\"T1\",\"2024-01-03 11:00:00\",\"trade\",\"tradespot\",\"currency\",\"XXBT\",\"spot / main\",\"0.0100000000\",\"0\",\"0.0100000000\"\n\
            \"L4\",\"S1\",\"2024-02-01 00:00:00\",\"earn\",\"reward\",\"currency\",\"ETH.S\",\"earn / bonded\",\"0.0010\",\"0\",\"0.0010\"\n\
            \"L5\",\"S2\",\"2024-02-08 00:00:00\",\"earn\",\"reward\",\"currency\",\"ETH.S\",\"earn / bonded\",\"0.0020\",\"0\",\"0.0030\"\n\
            \"L6\",\"D2\",\"2024-02-09 00:00:00\",\"deposit\",\"\",\"currency\",\"ZEUR\",\"spot / main\",\"0.5000\",\"0\",\"498.5000\"\n";
        let result = parse(csv.as_bytes(), None);

        assert_eq!(result.detected_format, Some(DetectedFormat::Kraken));
        assert_eq!(result.transactions.len(), 3);
        assert_eq!(result.skipped_rows, 2);

        let buy = result
            .transactions
            .iter()
            .find(|tx| *tx.transaction_type() == TransactionType::Buy)
            .unwrap();
        assert_eq!(buy.symbol(), "BTC");
        assert_eq!(*buy.price(), dec!(50000));
        assert_eq!(*buy.fee(), dec!(2));
        assert_eq!(buy.external_id().as_deref(), Some("T1"));

        let reward = result
            .transactions
            .iter()
            .find(|tx| *tx.transaction_type() == TransactionType::Dividend)
            .unwrap();
        assert_eq!(*reward.quantity(), dec!(0.0030));
        assert_eq!(reward.external_id().as_deref(), Some("AGG-ETH-2024-02"));
        assert_eq!(reward.date().month(), 2);

        let btc = result.rows.iter().find(|row| row.symbol() == "BTC").unwrap();
        assert_eq!(*btc.asset_type(), AssetType::Crypto);
        assert_eq!(*btc.quantity(), dec!(0.01));
    }

    #[test]
    fn degiro_transactions_export() {
        let csv = "Date,Time,Product,ISIN,Reference exchange,Venue,Quantity,Price,,Local value,,Value,,Order ID\n\
            10-01-2024,09:00,APPLE INC,US0378331005,NDQ,XNAS,5,180.00,USD,-900.00,USD,-830.00,EUR,abc-123456\n\
            12-01-2024,09:30,APPLE INC,US0378331005,NDQ,XNAS,-2,190.00,USD,380.00,USD,350.00,EUR,def-654321\n";
        let result = parse(csv.as_bytes(), None);

        assert_eq!(result.detected_format, Some(DetectedFormat::Degiro));
        assert_eq!(result.transactions.len(), 2);
        assert_eq!(*result.transactions[0].transaction_type(), TransactionType::Buy);
        assert_eq!(*result.transactions[1].transaction_type(), TransactionType::Sell);
        assert_eq!(*result.transactions[1].quantity(), dec!(2));
        assert_eq!(result.rows.len(), 1);
        assert_eq!(*result.rows[0].quantity(), dec!(3));
        assert_eq!(result.rows[0].isin().as_deref(), Some("US0378331005"));
    }

    #[test]
    fn platform_hint_overrides_sniffing() {
        let csv = "Symbol,Quantity\nBTC,1\n";
        let result = parse(csv.as_bytes(), Some("My Kraken account"));
        assert_eq!(result.detected_format, Some(DetectedFormat::Kraken));
    }

    #[test]
    fn windows_1254_fallback() {
        let (bytes, _, _) = encoding_rs::WINDOWS_1254.encode("Sembol;Şirket\nTHYAO;Türk Hava Yolları\n");
        let text = decode_text(&bytes);
        assert!(text.contains("Şirket"));
        assert!(text.contains("Yolları"));

        let with_bom = decode_text(b"\xEF\xBB\xBFSymbol\nAAPL\n");
        assert!(with_bom.starts_with("Symbol"));
    }

    #[test]
    fn degiro_account_statement() {
        let csv = "Date;Time;Product;ISIN;Description;FX;Change;;Balance;;Order Id\n\
            02-01-2024;09:30;APPLE INC;US0378331005;Koop 10 @ 150,5 USD;;USD;-1505,00;USD;0,00;abc-order-1\n\
            02-01-2024;09:30;APPLE INC;US0378331005;DEGIRO Transactiekosten en/of kosten van derden;;EUR;-2,00;EUR;98,00;abc-order-1\n\
            15-02-2024;07:00;APPLE INC;US0378331005;Dividend;;USD;2,40;USD;2,40;\n\
            01-03-2024;08:00;;;Rente;;EUR;-0,50;EUR;97,50;\n\
            05-03-2024;10:00;;;Reservation iDEAL;;EUR;100,00;EUR;97,50;\n\
            10-03-2024;08:00;BOND X;XS1234567890;Coupon;;EUR;12,50;EUR;110,00;\n";
        let result = parse(csv.as_bytes(), None);

        assert_eq!(result.detected_format, Some(DetectedFormat::DegiroStatement));
        assert_eq!(result.skipped_rows, 1);
        let kinds: Vec<TransactionType> = result
            .transactions
            .iter()
            .map(|tx| *tx.transaction_type())
            .collect();
        assert_eq!(
            kinds,
            vec![
                TransactionType::Buy,
                TransactionType::Fee,
                TransactionType::Dividend,
                TransactionType::Fee,
                TransactionType::Coupon,
            ]
        );

        let buy = &result.transactions[0];
        assert_eq!(buy.symbol(), "US0378331005");
        assert_eq!(*buy.quantity(), dec!(10));
        assert_eq!(*buy.price(), dec!(150.5));
        assert_eq!(buy.currency(), "USD");
        assert_eq!(buy.external_id().as_deref(), Some("abc-order-1"));
        assert_eq!(*result.transactions[2].quantity(), dec!(2.4));
        // Negative interest is booked as a charge.
        assert_eq!(*result.transactions[3].quantity(), dec!(0.5));
        assert_eq!(result.transactions[4].isin().as_deref(), Some("XS1234567890"));

        let fees = result
            .rows
            .iter()
            .find(|row| *row.asset_type() == AssetType::Fee)
            .unwrap();
        assert_eq!(*fees.quantity(), dec!(2.5));
        assert_eq!(fees.currency(), "EUR");
    }

    fn workbook(sheet_rows: &str) -> Vec<u8> {
        let files = [
            (
                "[Content_Types].xml",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#
                    .to_string(),
            ),
            (
                "_rels/.rels",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
                    .to_string(),
            ),
            (
                "xl/workbook.xml",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Portfolio" sheetId="1" r:id="rId1"/></sheets></workbook>"#
                    .to_string(),
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#
                    .to_string(),
            ),
            (
                "xl/styles.xml",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="14" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs></styleSheet>"#
                    .to_string(),
            ),
            (
                "xl/worksheets/sheet1.xml",
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
                    sheet_rows
                ),
            ),
        ];

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::<()>::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in files {
            zip.start_file(name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn text_cell(reference: &str, value: &str) -> String {
        format!(r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#, reference, value)
    }

    #[test]
    fn spreadsheet_ledger_with_serial_dates() {
        let header = ["Date", "Type", "Symbol", "Quantity", "Price", "Currency"]
            .iter()
            .zip(["A1", "B1", "C1", "D1", "E1", "F1"])
            .map(|(value, reference)| text_cell(reference, value))
            .collect::<String>();
        let line = format!(
            r#"<c r="A2" s="1"><v>45293</v></c>{}{}<c r="D2"><v>10</v></c><c r="E2"><v>150.5</v></c>{}"#,
            text_cell("B2", "Buy"),
            text_cell("C2", "AAPL"),
            text_cell("F2", "USD"),
        );
        let bytes = workbook(&format!(r#"<row r="1">{}</row><row r="2">{}</row>"#, header, line));

        let table = Table::from_spreadsheet(&bytes).unwrap();
        assert_eq!(table.headers, vec!["Date", "Type", "Symbol", "Quantity", "Price", "Currency"]);
        assert_eq!(table.records[0][0], "2024-01-02");
        assert_eq!(table.records[0][3], "10");

        let result = parse(&bytes, None);
        assert!(result.success);
        assert_eq!(result.transactions.len(), 1);
        let buy = &result.transactions[0];
        assert_eq!(*buy.transaction_type(), TransactionType::Buy);
        assert_eq!(buy.date().date_naive(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(*buy.price(), dec!(150.5));
        assert_eq!(*result.rows[0].quantity(), dec!(10));
    }

    #[test]
    fn serial_dates_out_of_range_are_dropped() {
        assert_eq!(excel_serial_to_date(45292.75), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(excel_serial_to_date(1e300), None);
        assert_eq!(excel_serial_to_date(-1e18), None);
        assert_eq!(excel_serial_to_date(f64::NAN), None);
    }

    #[test]
    fn oversized_amounts_become_row_errors() {
        let csv = "Date,Type,Symbol,Quantity,Price,Currency\n\
                   2024-01-01,Buy,AAPL,90000000000000000000,9000000000,USD\n\
                   2024-01-02,Buy,MSFT,2,300,USD\n\
                   2024-01-03,Deposit,,90000000000000000000,9000000000,USD\n";
        let result = parse(csv.as_bytes(), None);

        assert!(result.success);
        assert_eq!(result.transactions.len(), 1);
        assert_eq!(result.transactions[0].symbol(), "MSFT");
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.skipped_rows, 2);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors.iter().all(|err| err.contains("out of range")));
    }

    #[test]
    fn oversized_snapshot_line_is_skipped() {
        let csv = "Symbol,Quantity,Price\nAAPL,90000000000000000000,9000000000\nMSFT,1,300\n";
        let result = parse(csv.as_bytes(), None);

        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.transactions.len(), 1);
        assert!(result.errors[0].contains("out of range"));
    }
}
