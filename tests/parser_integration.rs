use rust_decimal::Decimal;
use std::str::FromStr;

use utility_debt_report::{
    build_calc_rows, format_date, normalize_lines, parse_date, verify_totals, Category, Charge,
    Fraction, Payment, Statement, StatementBuilder,
};

fn load_fixture(name: &str) -> Vec<String> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let text = std::fs::read_to_string(path).expect("read fixture");
    normalize_lines(text.lines())
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn parse_basic() -> Statement {
    let lines = load_fixture("statement_basic.txt");
    StatementBuilder::new(parse_date("01.04.2024").unwrap(), 9.5)
        .category("УК")
        .overdue_start_day(10)
        .parse(&lines, "statement_basic.pdf")
        .expect("parse basic fixture")
}

#[test]
fn parses_basic_fixture() {
    let stmt = parse_basic();
    assert_eq!(stmt.schema_version, "1.2");
    assert_eq!(stmt.meta.generated_at, "2025-12-11T11:47:00Z");

    let body = &stmt.statement;
    assert_eq!(body.debtor.inn, "7701234567");
    assert_eq!(body.debtor.name, "Общество с ограниченной ответственностью «Ромашка»");
    assert_eq!(body.contract.number, "01.000178 ТЭ");
    assert_eq!(format_date(body.contract.date), "27.09.2023");
    assert_eq!(format_date(body.period.from), "01.08.2019");
    assert_eq!(format_date(body.period.to), "31.12.2023");

    // реестр: два месяца, корректировка учтена в итоге декабря
    let monthly: Vec<_> = body
        .charges
        .iter()
        .filter_map(|c| match c {
            Charge::Monthly(c) => Some((c.period.to_string(), c.amount)),
            Charge::Adjustment(_) => None,
        })
        .collect();
    assert_eq!(
        monthly,
        vec![
            ("11.2023".to_string(), dec("301863.83")),
            ("12.2023".to_string(), dec("495000.00")),
        ]
    );

    let payments: Vec<_> = body
        .payments
        .iter()
        .filter_map(|p| match p {
            Payment::Ordinary(p) => {
                Some((format_date(p.date), p.amount, p.period.to_string()))
            }
            Payment::Adjustment(_) => None,
        })
        .collect();
    assert_eq!(
        payments,
        vec![
            ("10.12.2023".to_string(), dec("14515.80"), "11.2023".to_string()),
            ("15.01.2024".to_string(), dec("495000.00"), "12.2023".to_string()),
        ]
    );
}

#[test]
fn round_trip_totals_invariant() {
    let stmt = parse_basic();
    let body = &stmt.statement;
    assert_eq!(body.totals.charged, dec("796863.83"));
    assert_eq!(body.totals.paid, dec("509515.80"));
    assert_eq!(body.totals.debt, dec("287348.03"));
    assert!(verify_totals(&stmt));
}

#[test]
fn parse_is_idempotent_and_json_round_trips() {
    let lines = load_fixture("statement_basic.txt");
    let builder = StatementBuilder::new(parse_date("01.04.2024").unwrap(), 9.5).category("УК");
    let a = builder.parse(&lines, "x.pdf").unwrap();
    let b = builder.parse(&lines, "x.pdf").unwrap();
    assert_eq!(a, b);

    let json = serde_json::to_string(&a).unwrap();
    let back: Statement = serde_json::from_str(&json).unwrap();
    assert_eq!(back, a);
    assert_eq!(serde_json::to_string(&back).unwrap(), json);
}

#[test]
fn money_and_date_fields_match_string_contracts() {
    let stmt = parse_basic();
    let json = serde_json::to_value(&stmt).unwrap();
    let body = &json["statement"];

    let money_re = regex::Regex::new(r"^-?\d+\.\d{2}$").unwrap();
    let date_re = regex::Regex::new(r"^\d{2}\.\d{2}\.\d{4}$").unwrap();
    let period_re = regex::Regex::new(r"^(0[1-9]|1[0-2])\.\d{4}$").unwrap();

    for key in ["charged", "paid", "debt"] {
        assert!(money_re.is_match(body["totals"][key].as_str().unwrap()));
    }
    for charge in body["charges"].as_array().unwrap() {
        assert!(money_re.is_match(charge["amount"].as_str().unwrap()));
        assert!(period_re.is_match(charge["period"].as_str().unwrap()));
    }
    for payment in body["payments"].as_array().unwrap() {
        assert!(money_re.is_match(payment["amount"].as_str().unwrap()));
        assert!(date_re.is_match(payment["date"].as_str().unwrap()));
    }
    assert!(date_re.is_match(body["calc_date"].as_str().unwrap()));
}

#[test]
fn calc_rows_follow_block_structure() {
    let stmt = parse_basic();
    let (rows, params) = build_calc_rows(&stmt);
    assert_eq!(params.category, Category::ManagingOrganization);
    assert_eq!(params.overdue_start_day, 10);

    // ровно одна открывающая строка на блок, у остальных пустая метка
    let blocks: Vec<&str> = rows
        .iter()
        .filter(|r| r.is_charge_row())
        .map(|r| r.period_label.as_str())
        .collect();
    assert_eq!(blocks, vec!["Ноябрь 2023", "Декабрь 2023"]);
    for row in &rows {
        if !row.is_charge_row() {
            assert!(row.period_label.is_empty());
            assert!(row.charged.is_none());
        }
        // монотонность и запрет нулевых интервалов
        if let Some(days) = row.overdue_days() {
            assert!(days >= 1);
        }
    }
}

#[test]
fn zero_debt_period_is_excluded_from_calc_rows() {
    // Декабрь оплачен копейка в копейку: с флагом исключения его блока нет.
    let lines = load_fixture("statement_basic.txt");
    let stmt = StatementBuilder::new(parse_date("01.04.2024").unwrap(), 9.5)
        .category("Прочие")
        .exclude_zero_debt_periods(true)
        .parse(&lines, "x.pdf")
        .unwrap();
    let (rows, _params) = build_calc_rows(&stmt);

    assert!(rows.iter().any(|r| r.period_label == "Ноябрь 2023"));
    assert!(rows.iter().all(|r| r.period_label != "Декабрь 2023"));
}

#[test]
fn flat_category_interval_spans_overdue_range() {
    // Категория «Прочие»: доля постоянна 1/130 на всём интервале.
    let lines = load_fixture("statement_basic.txt");
    let stmt = StatementBuilder::new(parse_date("01.04.2024").unwrap(), 9.5)
        .category("Прочие")
        .parse(&lines, "x.pdf")
        .unwrap();
    let (rows, _params) = build_calc_rows(&stmt);

    for row in rows {
        if let Some(fraction) = row.fraction {
            assert!(fraction == Fraction::ZERO || fraction == Fraction::new(1, 130));
        }
    }
}

#[test]
fn parses_adjustment_fixture() {
    let lines = load_fixture("statement_adjustment.txt");
    let stmt = StatementBuilder::new(parse_date("01.02.2025").unwrap(), 9.5)
        .category("ТСЖ")
        .parse(&lines, "statement_adjustment.pdf")
        .unwrap();

    let body = &stmt.statement;
    assert_eq!(body.debtor.name, "Товарищество собственников жилья «Восход»");
    assert_eq!(body.contract.number, "44039");

    let aa_charges: Vec<_> = body
        .charges
        .iter()
        .filter_map(|c| match c {
            Charge::Adjustment(c) => Some(c),
            Charge::Monthly(_) => None,
        })
        .collect();
    assert_eq!(aa_charges.len(), 1);
    assert_eq!(aa_charges[0].adjustment_year, 2023);
    assert_eq!(aa_charges[0].payable_month.to_string(), "11.2024");
    assert_eq!(aa_charges[0].amount, dec("50000.00"));

    assert_eq!(body.totals.charged, dec("150000.00"));
    assert_eq!(body.totals.paid, dec("20000.00"));
    assert_eq!(body.totals.debt, dec("130000.00"));

    // блок доли идёт сразу после блока месяца оплаты и несёт полную подпись
    let (rows, params) = build_calc_rows(&stmt);
    assert_eq!(params.category, Category::HousingCoop);
    let blocks: Vec<&str> = rows
        .iter()
        .filter(|r| r.is_charge_row())
        .map(|r| r.period_label.as_str())
        .collect();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0], "Ноябрь 2024");
    assert_eq!(
        blocks[1],
        "Доля от размера годовой корректировки платы за тепловую энергию \
         по итогам 2023 года, подлежащая оплате в ноябре 2024"
    );
}

#[test]
fn adjustment_payment_is_keyed_not_ordinary() {
    let lines = load_fixture("statement_adjustment.txt");
    let stmt = StatementBuilder::new(parse_date("01.02.2025").unwrap(), 9.5)
        .parse(&lines, "x.pdf")
        .unwrap();

    let aa_payments: Vec<_> = stmt
        .statement
        .payments
        .iter()
        .filter_map(|p| match p {
            Payment::Adjustment(p) => Some(p),
            Payment::Ordinary(_) => None,
        })
        .collect();
    assert_eq!(aa_payments.len(), 1);
    assert_eq!(format_date(aa_payments[0].date), "15.11.2024");
    assert_eq!(aa_payments[0].amount, dec("20000.00"));
    assert_eq!(aa_payments[0].adjustment_key().adjustment_year, 2023);
}
