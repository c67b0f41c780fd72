//! Пример CLI: читает текстовый дамп справки (по строке на строку
//! текстового слоя PDF) и выводит разобранную справку с расчётом.

use std::env;
use std::fs;

use utility_debt_report::{
    build_calc_rows, format_date, format_money, parse_date, rate_share_footnote, StatementBuilder,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let (Some(path), Some(calc_date)) = (args.next(), args.next()) else {
        println!(
            "Usage: utility-debt-report <statement.txt> <calc-date DD.MM.YYYY> \
             [rate-percent] [category]"
        );
        return Ok(());
    };
    let rate_percent: f64 = args.next().map_or(Ok(9.5), |s| s.parse())?;
    let category = args.next();

    let text = fs::read_to_string(&path)?;
    let mut builder = StatementBuilder::new(parse_date(&calc_date)?, rate_percent);
    if let Some(category) = category {
        builder = builder.category(category);
    }

    let stmt = match builder.parse_text(&text, &path) {
        Ok(stmt) => stmt,
        Err(err) => {
            eprintln!("[{}] {err}", err.code());
            eprintln!("{}", serde_json::to_string_pretty(&err.details())?);
            return Err(err.into());
        }
    };

    let body = &stmt.statement;
    println!("Должник: {} (ИНН {})", body.debtor.name, body.debtor.inn);
    println!(
        "Договор: {} от {}",
        body.contract.number,
        format_date(body.contract.date)
    );
    println!(
        "Период: {} — {}, начислено {}, оплачено {}, долг {}",
        format_date(body.period.from),
        format_date(body.period.to),
        format_money(body.totals.charged),
        format_money(body.totals.paid),
        format_money(body.totals.debt),
    );

    let (rows, params) = build_calc_rows(&stmt);
    println!(
        "Расчёт на {}: категория «{}», строк {}",
        format_date(params.calc_date),
        params.category.canonical_name(),
        rows.len()
    );
    println!("{}", rate_share_footnote(&body.contract.number, params.category));

    println!("{}", serde_json::to_string_pretty(&stmt)?);
    Ok(())
}
