//! Ядро расчёта: построение строк расчёта неустойки из провалидированной
//! справки — по одному визуальному блоку на период начисления (и на каждую
//! долю годовой корректировки), с разбиением интервалов по графику долей.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

use crate::schedule::{split_by_boundaries, Category, Fraction};
use crate::types::{money_eq, quantize, AdjustmentKey, Charge, Money, Payment, Period, Statement};

/// Параметры расчёта, передаваемые рендереру вместе со строками.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalcParams {
    /// Эффективная категория должника.
    pub category: Category,
    /// День месяца (1–31), выбранный пользователем для начала просрочки.
    pub overdue_start_day: u32,
    /// Дата окончания расчёта.
    pub calc_date: NaiveDate,
}

/// Одна строка расчёта: открывающая строка начисления, строка платежа
/// или техническая строка смены доли. Пересчитывается заново при каждом
/// рендере, между рендерами не кэшируется.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalcRow {
    /// Заголовок блока; непустой ровно у первой строки блока.
    pub period_label: String,
    /// Примечание.
    pub note: String,
    /// Сумма начисления (только в открывающей строке блока).
    pub charged: Option<Money>,
    /// Сумма платежа.
    pub paid: Option<Money>,
    /// Дата платежа.
    pub pay_date: Option<NaiveDate>,
    /// Начало интервала просрочки.
    pub overdue_from: Option<NaiveDate>,
    /// Конец интервала просрочки (включительно).
    pub overdue_to: Option<NaiveDate>,
    /// Доля ставки на интервале.
    pub fraction: Option<Fraction>,
    /// Текст формулы; заполняется рендерером.
    pub formula_text: String,
    /// База отсчёта дней просрочки блока (служебное).
    pub base_overdue_start: Option<NaiveDate>,
}

impl CalcRow {
    /// Открывает ли строка новый визуальный блок.
    pub fn is_charge_row(&self) -> bool {
        !self.period_label.is_empty() && self.charged.is_some()
    }

    /// Число дней интервала (включительно), если интервал задан.
    pub fn overdue_days(&self) -> Option<i64> {
        match (self.overdue_from, self.overdue_to) {
            (Some(from), Some(to)) => Some((to - from).num_days() + 1),
            _ => None,
        }
    }
}

/// Заголовок блока доли годовой корректировки.
fn adjustment_label(adjustment_year: i32, payable_month: Period) -> String {
    format!(
        "Доля от размера годовой корректировки платы за тепловую энергию \
         по итогам {adjustment_year} года, подлежащая оплате в {}",
        payable_month.prepositional()
    )
}

/// Категория по наименованию должника, когда пользователь её не задал.
fn infer_category_from_debtor_name(name: &str) -> Category {
    let n = name.to_lowercase();
    if n.contains("управляющ") || n.contains("ук") {
        Category::ManagingOrganization
    } else if n.contains("тсж") || n.contains("жск") || n.contains("жилищный кооператив") {
        Category::HousingCoop
    } else {
        Category::Other
    }
}

/// Строит упорядоченную последовательность строк расчёта по справке.
pub fn build_calc_rows(stmt: &Statement) -> (Vec<CalcRow>, CalcParams) {
    let body = &stmt.statement;

    let category = body.category.as_deref().map_or_else(
        || infer_category_from_debtor_name(&body.debtor.name),
        Category::normalize,
    );
    let params = CalcParams {
        category,
        overdue_start_day: body.overdue_start_day.clamp(1, 31),
        calc_date: body.calc_date,
    };

    // 1) Начисления: суммирование по ключу (дубликаты складываются).
    let mut month_charges: BTreeMap<Period, Money> = BTreeMap::new();
    let mut aa_charges: BTreeMap<AdjustmentKey, Money> = BTreeMap::new();
    for ch in &body.charges {
        let amount = quantize(ch.amount());
        match ch {
            Charge::Adjustment(c) => {
                let key = AdjustmentKey {
                    payable_month: c.payable_month,
                    adjustment_year: c.adjustment_year,
                    base_period: c.base_period,
                };
                *aa_charges.entry(key).or_insert(Decimal::ZERO) += amount;
            }
            Charge::Monthly(c) => {
                *month_charges.entry(c.period).or_insert(Decimal::ZERO) += amount;
            }
        }
    }

    // 2) Оплаты по периодам начислений; оплаты периодов без начислений
    // в расчёт не попадают.
    let mut payments_by_period: BTreeMap<Period, Vec<(NaiveDate, Money)>> =
        month_charges.keys().map(|&p| (p, Vec::new())).collect();
    let mut aa_payments: BTreeMap<AdjustmentKey, Vec<(NaiveDate, Money)>> = BTreeMap::new();
    for p in &body.payments {
        let amount = quantize(p.amount());
        match p {
            Payment::Adjustment(ap) => {
                aa_payments.entry(ap.adjustment_key()).or_default().push((ap.date, amount));
            }
            Payment::Ordinary(op) => {
                if let Some(list) = payments_by_period.get_mut(&op.period) {
                    list.push((op.date, amount));
                }
            }
        }
    }
    for list in payments_by_period.values_mut() {
        list.sort_by_key(|&(d, _)| d);
    }
    for list in aa_payments.values_mut() {
        list.sort_by_key(|&(d, _)| d);
    }

    // 3) Опциональное исключение периодов с нулевой задолженностью.
    if body.exclude_zero_debt_periods {
        month_charges.retain(|period, &mut charged| {
            let paid: Money =
                payments_by_period.get(period).map_or(Decimal::ZERO, |l| {
                    l.iter().map(|&(_, amt)| amt).sum()
                });
            !money_eq(quantize(charged - paid), Decimal::ZERO)
        });
        payments_by_period.retain(|period, _| month_charges.contains_key(period));

        aa_charges.retain(|key, &mut charged| {
            let paid: Money = aa_payments
                .get(key)
                .map_or(Decimal::ZERO, |l| l.iter().map(|&(_, amt)| amt).sum());
            !money_eq(quantize(charged - paid), Decimal::ZERO)
        });
        aa_payments.retain(|key, _| aa_charges.contains_key(key));
    }

    // 4) Блоки по месяцам; блоки долей корректировки — сразу после блока
    // месяца, в котором доля подлежит оплате.
    let mut rows: Vec<CalcRow> = Vec::new();
    for (&period, &charged) in &month_charges {
        let debt_start = period.last_day();
        let overdue_start = period.overdue_start(params.overdue_start_day);

        push_block(
            &mut rows,
            period.label(),
            charged,
            payments_by_period.get(&period).cloned().unwrap_or_default(),
            debt_start,
            overdue_start,
            category,
            params.calc_date,
        );

        for (key, &aa_amount) in aa_charges.iter().filter(|(k, _)| k.payable_month == period) {
            push_block(
                &mut rows,
                adjustment_label(key.adjustment_year, key.payable_month),
                aa_amount,
                aa_payments.get(key).cloned().unwrap_or_default(),
                debt_start,
                overdue_start,
                category,
                params.calc_date,
            );
        }
    }

    (rows, params)
}

/// Один блок: открывающая строка начисления и строки платежей/интервалов.
#[allow(clippy::too_many_arguments)]
fn push_block(
    rows: &mut Vec<CalcRow>,
    label: String,
    charged: Money,
    mut pays: Vec<(NaiveDate, Money)>,
    debt_start: NaiveDate,
    overdue_start: NaiveDate,
    category: Category,
    calc_date: NaiveDate,
) {
    let mut charge_row = CalcRow {
        period_label: label,
        note: "-".to_string(),
        charged: Some(charged),
        ..CalcRow::default()
    };

    // Платёж точно в дату возникновения долга складывается в строку
    // начисления, отдельная строка события не создаётся.
    if pays.first().is_some_and(|&(d, _)| d == debt_start) {
        let (d, amt) = pays.remove(0);
        charge_row.paid = Some(amt);
        charge_row.pay_date = Some(d);
    }

    let event_dates: Vec<NaiveDate> =
        std::iter::once(debt_start).chain(pays.iter().map(|&(d, _)| d)).collect();

    let mut segs = make_segments(debt_start, interval_end(&event_dates, 0, calc_date), overdue_start, category);
    // Начальный информационный нулевой интервал (до даты начала просрочки)
    // в строке начисления не показывается, если в ней нет платежа.
    if charge_row.pay_date.is_none() {
        while segs.first().is_some_and(|&(_, end, f)| f.is_zero() && end < overdue_start) {
            segs.remove(0);
        }
    }
    attach_segments(rows, charge_row, &segs, overdue_start);

    for (idx, &(pay_date, pay_amount)) in pays.iter().enumerate() {
        let pay_row = CalcRow {
            paid: Some(pay_amount),
            pay_date: Some(pay_date),
            ..CalcRow::default()
        };
        let segs = make_segments(
            pay_date,
            interval_end(&event_dates, idx + 1, calc_date),
            overdue_start,
            category,
        );
        attach_segments(rows, pay_row, &segs, overdue_start);
    }
}

/// Интервалы постоянной доли на `[start..end]` с нулевым сегментом
/// до даты начала просрочки.
fn make_segments(
    start: NaiveDate,
    end: NaiveDate,
    overdue_start: NaiveDate,
    category: Category,
) -> Vec<(NaiveDate, NaiveDate, Fraction)> {
    if end < start {
        return Vec::new();
    }
    if end < overdue_start {
        return vec![(start, end, Fraction::ZERO)];
    }
    if start < overdue_start {
        let mut out = vec![(start, overdue_start - Duration::days(1), Fraction::ZERO)];
        out.extend(split_by_boundaries(category, overdue_start, end, overdue_start));
        return out;
    }
    split_by_boundaries(category, start, end, overdue_start)
}

/// Конец интервала события `i`: события одного дня всё равно дают
/// интервал длиной один день, нулевых интервалов не бывает.
fn interval_end(event_dates: &[NaiveDate], i: usize, calc_date: NaiveDate) -> NaiveDate {
    match event_dates.get(i + 1) {
        Some(&next) => event_dates[i].max(next - Duration::days(1)),
        None => calc_date,
    }
}

/// Первый сегмент кладётся в саму строку события, остальные —
/// отдельными техническими строками.
fn attach_segments(
    rows: &mut Vec<CalcRow>,
    event_row: CalcRow,
    segs: &[(NaiveDate, NaiveDate, Fraction)],
    overdue_start: NaiveDate,
) {
    let Some(&(s0, e0, f0)) = segs.first() else {
        rows.push(event_row);
        return;
    };
    rows.push(with_interval(event_row, s0, e0, f0, overdue_start));
    for &(s, e, f) in &segs[1..] {
        rows.push(with_interval(CalcRow::default(), s, e, f, overdue_start));
    }
}

fn with_interval(
    row: CalcRow,
    start: NaiveDate,
    end: NaiveDate,
    fraction: Fraction,
    base_overdue_start: NaiveDate,
) -> CalcRow {
    CalcRow {
        overdue_from: Some(start),
        overdue_to: Some(end),
        fraction: Some(fraction),
        base_overdue_start: Some(base_overdue_start),
        ..row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AdjustmentCharge, AdjustmentKind, Contract, Debtor, Meta, MonthlyCharge, OrdinaryPayment,
        StatementBody, StatementPeriod, Totals, SCHEMA_VERSION,
    };
    use std::str::FromStr;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%d.%m.%Y").unwrap()
    }

    fn dec(s: &str) -> Money {
        Decimal::from_str(s).unwrap()
    }

    fn statement(
        category: Option<&str>,
        calc_date: &str,
        overdue_start_day: u32,
        exclude_zero: bool,
        charges: Vec<Charge>,
        payments: Vec<Payment>,
    ) -> Statement {
        let charged: Money = charges.iter().map(Charge::amount).sum();
        let paid: Money = payments.iter().map(Payment::amount).sum();
        Statement {
            schema_version: SCHEMA_VERSION.to_string(),
            meta: Meta {
                source_pdf: "test.pdf".to_string(),
                generated_at: "2024-01-01T00:00:00Z".to_string(),
            },
            statement: StatementBody {
                debtor: Debtor {
                    name: "Общество с ограниченной ответственностью «Тест»".to_string(),
                    inn: "7701234567".to_string(),
                },
                contract: Contract { number: "01.000178 ТЭ".to_string(), date: d("27.09.2023") },
                period: StatementPeriod { from: d("01.01.2024"), to: d("31.12.2024") },
                category: category.map(str::to_string),
                calc_date: d(calc_date),
                rate_percent: 9.5,
                overdue_start_day,
                exclude_zero_debt_periods: exclude_zero,
                charges,
                payments,
                totals: Totals { charged, paid, debt: charged - paid },
            },
        }
    }

    fn monthly(period: &str, amount: &str) -> Charge {
        Charge::Monthly(MonthlyCharge { period: period.parse().unwrap(), amount: dec(amount) })
    }

    fn ordinary(date: &str, amount: &str, period: &str) -> Payment {
        Payment::Ordinary(OrdinaryPayment {
            date: d(date),
            amount: dec(amount),
            period: period.parse().unwrap(),
        })
    }

    #[test]
    fn flat_category_single_row_without_leading_zero_segment() {
        // Сценарий: «Прочие», одно начисление 01.2024, без оплат,
        // расчёт на 01.04.2024. Нулевой сегмент до начала просрочки
        // в строке начисления подавляется, остаётся один интервал 1/130.
        let stmt = statement(
            Some("Прочие"),
            "01.04.2024",
            1,
            false,
            vec![monthly("01.2024", "1000.00")],
            vec![],
        );
        let (rows, params) = build_calc_rows(&stmt);

        assert_eq!(params.category, Category::Other);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert!(row.is_charge_row());
        assert_eq!(row.period_label, "Январь 2024");
        assert_eq!(row.note, "-");
        assert_eq!(row.charged, Some(dec("1000.00")));
        assert_eq!(row.overdue_from, Some(d("01.02.2024")));
        assert_eq!(row.overdue_to, Some(d("01.04.2024")));
        assert_eq!(row.fraction, Some(Fraction::new(1, 130)));
        assert_eq!(row.overdue_days(), Some(61));
        assert_eq!(row.formula_text, "");
    }

    #[test]
    fn managing_organization_block_splits_at_boundaries() {
        let stmt = statement(
            Some("УК"),
            "31.12.2024",
            10,
            false,
            vec![monthly("01.2024", "1000.00")],
            vec![],
        );
        let (rows, params) = build_calc_rows(&stmt);
        assert_eq!(params.category, Category::ManagingOrganization);

        // overdue_start = 10.02.2024; день 61 — 10.04.2024, день 91 — 10.05.2024
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].overdue_from, Some(d("10.02.2024")));
        assert_eq!(rows[0].overdue_to, Some(d("09.04.2024")));
        assert_eq!(rows[0].fraction, Some(Fraction::new(1, 300)));
        assert!(rows[0].is_charge_row());

        assert_eq!(rows[1].overdue_from, Some(d("10.04.2024")));
        assert_eq!(rows[1].overdue_to, Some(d("09.05.2024")));
        assert_eq!(rows[1].fraction, Some(Fraction::new(1, 170)));
        assert!(rows[1].period_label.is_empty());
        assert!(rows[1].charged.is_none());

        assert_eq!(rows[2].overdue_from, Some(d("10.05.2024")));
        assert_eq!(rows[2].overdue_to, Some(d("31.12.2024")));
        assert_eq!(rows[2].fraction, Some(Fraction::new(1, 130)));

        // интервалы монотонны и не нулевой длины
        for row in &rows {
            assert!(row.overdue_days().unwrap() >= 1);
        }
    }

    #[test]
    fn payment_on_debt_start_folds_into_charge_row() {
        let stmt = statement(
            Some("Прочие"),
            "01.04.2024",
            1,
            false,
            vec![monthly("01.2024", "1000.00")],
            vec![ordinary("31.01.2024", "400.00", "01.2024")],
        );
        let (rows, _params) = build_calc_rows(&stmt);

        // Платёж в дату возникновения долга: отдельной строки события нет,
        // а начальный нулевой сегмент сохраняется (в строке есть платёж).
        assert_eq!(rows[0].paid, Some(dec("400.00")));
        assert_eq!(rows[0].pay_date, Some(d("31.01.2024")));
        assert_eq!(rows[0].overdue_from, Some(d("31.01.2024")));
        assert_eq!(rows[0].overdue_to, Some(d("31.01.2024")));
        assert_eq!(rows[0].fraction, Some(Fraction::ZERO));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].overdue_from, Some(d("01.02.2024")));
        assert_eq!(rows[1].fraction, Some(Fraction::new(1, 130)));
    }

    #[test]
    fn same_day_events_keep_one_day_interval() {
        let stmt = statement(
            Some("Прочие"),
            "01.06.2024",
            1,
            false,
            vec![monthly("01.2024", "1000.00")],
            vec![
                ordinary("15.03.2024", "100.00", "01.2024"),
                ordinary("15.03.2024", "200.00", "01.2024"),
            ],
        );
        let (rows, _params) = build_calc_rows(&stmt);

        let event_rows: Vec<&CalcRow> =
            rows.iter().filter(|r| r.pay_date == Some(d("15.03.2024"))).collect();
        assert_eq!(event_rows.len(), 2);
        // первое из событий одного дня даёт минимальный однодневный интервал
        assert_eq!(event_rows[0].overdue_from, Some(d("15.03.2024")));
        assert_eq!(event_rows[0].overdue_to, Some(d("15.03.2024")));
        assert_eq!(event_rows[0].overdue_days(), Some(1));

        for row in &rows {
            if let Some(days) = row.overdue_days() {
                assert!(days >= 1);
            }
        }
    }

    #[test]
    fn zero_debt_periods_are_excluded_when_requested() {
        let stmt = statement(
            Some("Прочие"),
            "01.06.2024",
            1,
            true,
            vec![monthly("01.2024", "500.00"), monthly("02.2024", "700.00")],
            vec![ordinary("10.02.2024", "500.00", "01.2024")],
        );
        let (rows, _params) = build_calc_rows(&stmt);

        // 01.2024 оплачен копейка в копейку — блока нет вовсе.
        assert!(rows.iter().all(|r| r.period_label != "Январь 2024"));
        assert!(rows.iter().any(|r| r.period_label == "Февраль 2024"));
    }

    #[test]
    fn adjustment_block_follows_payable_month_block() {
        let aa = Charge::Adjustment(AdjustmentCharge {
            period: "12.2023".parse().unwrap(),
            amount: dec("300.00"),
            kind: AdjustmentKind::AnnualAdjustmentShare,
            adjustment_year: 2023,
            payable_month: "01.2024".parse().unwrap(),
            base_period: Some("12.2023".parse().unwrap()),
        });
        let stmt = statement(
            Some("Прочие"),
            "01.06.2024",
            5,
            false,
            vec![monthly("01.2024", "1000.00"), monthly("02.2024", "800.00"), aa],
            vec![],
        );
        let (rows, _params) = build_calc_rows(&stmt);

        let blocks: Vec<&str> =
            rows.iter().filter(|r| r.is_charge_row()).map(|r| r.period_label.as_str()).collect();
        assert_eq!(
            blocks,
            vec![
                "Январь 2024",
                "Доля от размера годовой корректировки платы за тепловую энергию \
                 по итогам 2023 года, подлежащая оплате в январе 2024",
                "Февраль 2024",
            ]
        );

        // блок доли наследует debt_start/overdue_start месяца оплаты
        let aa_row = rows.iter().find(|r| r.period_label.starts_with("Доля")).unwrap();
        assert_eq!(aa_row.base_overdue_start, Some(d("05.02.2024")));
    }

    #[test]
    fn duplicate_charge_keys_are_summed() {
        let stmt = statement(
            Some("Прочие"),
            "01.04.2024",
            1,
            false,
            vec![monthly("01.2024", "600.00"), monthly("01.2024", "400.00")],
            vec![],
        );
        let (rows, _params) = build_calc_rows(&stmt);
        assert_eq!(rows[0].charged, Some(dec("1000.00")));
        assert_eq!(rows.iter().filter(|r| r.is_charge_row()).count(), 1);
    }

    #[test]
    fn category_inferred_from_debtor_name_when_absent() {
        let mut stmt = statement(
            None,
            "01.04.2024",
            1,
            false,
            vec![monthly("01.2024", "100.00")],
            vec![],
        );
        stmt.statement.debtor.name = "ТСЖ «Восход»".to_string();
        let (_rows, params) = build_calc_rows(&stmt);
        assert_eq!(params.category, Category::HousingCoop);
    }
}
