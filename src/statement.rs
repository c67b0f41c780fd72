//! Сборка справки: строки текстового слоя + параметры расчёта →
//! провалидированный [`Statement`].

use chrono::NaiveDate;

use crate::error::StatementError;
use crate::header::{
    ensure_text_layer, find_contract_date, find_generated_at_and_doc_date, find_inn,
    find_period_from, parse_bottom_block, OpfRegistry,
};
use crate::tables::parse_tables;
use crate::tokens::normalize_lines;
use crate::types::{
    quantize, Charge, Contract, Debtor, Meta, Money, Period, Statement, StatementBody,
    StatementPeriod, Totals, SCHEMA_VERSION,
};

/// Builder разбора справки с параметрами расчёта.
///
/// # Пример
///
/// ```
/// use utility_debt_report::{parse_date, StatementBuilder};
///
/// let builder = StatementBuilder::new(parse_date("01.04.2024")?, 9.5)
///     .category("УК")
///     .overdue_start_day(10)
///     .exclude_zero_debt_periods(true);
/// # Ok::<(), utility_debt_report::StatementError>(())
/// ```
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    category: Option<String>,
    calc_date: NaiveDate,
    rate_percent: f64,
    overdue_start_day: u32,
    exclude_zero_debt_periods: bool,
    opf: OpfRegistry,
}

impl StatementBuilder {
    /// Создаёт builder с обязательными параметрами: дата расчёта и ставка.
    pub fn new(calc_date: NaiveDate, rate_percent: f64) -> Self {
        Self {
            category: None,
            calc_date,
            rate_percent: rate_percent.max(0.0),
            overdue_start_day: 1,
            exclude_zero_debt_periods: false,
            opf: OpfRegistry::default(),
        }
    }

    /// Категория должника (свободный текст, нормализуется при расчёте).
    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// День месяца (1–31), с которого в следующем месяце начинается просрочка.
    #[must_use]
    pub fn overdue_start_day(mut self, day: u32) -> Self {
        self.overdue_start_day = day.clamp(1, 31);
        self
    }

    /// Исключать ли из расчёта периоды с нулевой задолженностью.
    #[must_use]
    pub fn exclude_zero_debt_periods(mut self, enabled: bool) -> Self {
        self.exclude_zero_debt_periods = enabled;
        self
    }

    /// Словарь ОПФ для приведения наименования должника.
    #[must_use]
    pub fn opf_registry(mut self, opf: OpfRegistry) -> Self {
        self.opf = opf;
        self
    }

    /// Разбирает нормализованные строки текстового слоя одной справки.
    pub fn parse(&self, lines: &[String], source_pdf: &str) -> Result<Statement, StatementError> {
        ensure_text_layer(lines)?;

        let (generated_at, _doc_date) = find_generated_at_and_doc_date(lines)?;
        let period_from = find_period_from(lines)?;
        let inn = find_inn(lines)?;
        let contract_date = find_contract_date(lines)?;

        let (charges, payments) = parse_tables(lines)?;

        let (contract_number, debtor_name) = parse_bottom_block(lines, &self.opf)?;

        let period_to = latest_charge_period(&charges)
            .map(Period::last_day)
            .ok_or(StatementError::ChargesTableNotFound)?;

        let charged: Money = quantize(charges.iter().map(Charge::amount).sum());
        let paid: Money = quantize(payments.iter().map(crate::types::Payment::amount).sum());
        let totals = Totals { charged, paid, debt: quantize(charged - paid) };

        Ok(Statement {
            schema_version: SCHEMA_VERSION.to_string(),
            meta: Meta { source_pdf: source_pdf.to_string(), generated_at },
            statement: StatementBody {
                debtor: Debtor { name: debtor_name, inn },
                contract: Contract { number: contract_number, date: contract_date },
                period: StatementPeriod { from: period_from, to: period_to },
                category: self.category.clone(),
                calc_date: self.calc_date,
                rate_percent: self.rate_percent,
                overdue_start_day: self.overdue_start_day,
                exclude_zero_debt_periods: self.exclude_zero_debt_periods,
                charges,
                payments,
                totals,
            },
        })
    }

    /// Удобный вариант: принимает сырой текст, нормализует строки сам.
    pub fn parse_text(&self, text: &str, source_pdf: &str) -> Result<Statement, StatementError> {
        let lines = normalize_lines(text.lines());
        self.parse(&lines, source_pdf)
    }
}

/// Конец периода справки: последний месяц обычных начислений;
/// если обычных нет — последний базовый период долей корректировки.
fn latest_charge_period(charges: &[Charge]) -> Option<Period> {
    let monthly = charges
        .iter()
        .filter_map(|c| match c {
            Charge::Monthly(c) => Some(c.period),
            Charge::Adjustment(_) => None,
        })
        .max();
    monthly.or_else(|| {
        charges
            .iter()
            .map(|c| match c {
                Charge::Monthly(c) => c.period,
                Charge::Adjustment(c) => c.period,
            })
            .max()
    })
}

/// Проверка тождеств итогов (инвариант схемы): суммы начислений и оплат
/// равны итогам, долг равен их разности.
pub fn verify_totals(stmt: &Statement) -> bool {
    let body = &stmt.statement;
    let charged: Money = quantize(body.charges.iter().map(Charge::amount).sum());
    let paid: Money = quantize(body.payments.iter().map(crate::types::Payment::amount).sum());
    charged == quantize(body.totals.charged)
        && paid == quantize(body.totals.paid)
        && quantize(charged - paid) == quantize(body.totals.debt)
}
