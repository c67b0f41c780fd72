//! Ошибки разбора справки и сверки итогов.
//!
//! Каждому режиму отказа соответствует свой вариант со структурированной
//! нагрузкой: короткое русское сообщение — в [`std::fmt::Display`],
//! машинный код, этап и подробности — в [`StatementError::code`],
//! [`StatementError::stage`] и [`StatementError::details`].

use serde_json::{json, Value};

use crate::types::{format_money, Money, Period};

/// Ошибка разбора или проверки справки о задолженности.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StatementError {
    /// В PDF нет текстового слоя (скан/изображение).
    #[error(
        "В PDF отсутствует текстовый слой (похоже на скан/изображение). \
         Сервис работает только с машиночитаемыми PDF. Для этого файла нужен OCR."
    )]
    NoTextLayer,

    /// Не найдена дата формирования справки.
    #[error("Ошибка разбора справки: не найдена дата формирования документа.")]
    CalcDateNotFound,

    /// Не найдено начало периода («Дата с: DD.MM.YYYY»).
    #[error("Ошибка разбора справки: не найдено начало периода (строка «Дата с: …»).")]
    PeriodFromNotFound,

    /// Не найден ИНН должника.
    #[error("Ошибка разбора справки: не найден ИНН должника.")]
    InnNotFound,

    /// Не найдена дата договора.
    #[error("Ошибка разбора справки: не найдена дата договора (строка «Дата : …»).")]
    ContractDateNotFound,

    /// Не найден заголовок «Справка о задолженности».
    #[error("Ошибка разбора справки: не найден заголовок «Справка о задолженности».")]
    DocHeaderNotFound,

    /// Не найден номер договора после заголовка документа.
    #[error("Ошибка разбора справки: не найден номер договора.")]
    ContractNumberNotFound,

    /// Не найдено наименование должника.
    #[error("Ошибка разбора справки: не найдено наименование должника.")]
    DebtorNameNotFound {
        /// Что именно не удалось (для диагностики).
        reason: String,
    },

    /// Некорректная дата `DD.MM.YYYY`.
    #[error("Некорректная дата: {value:?}")]
    InvalidDate {
        /// Исходное значение.
        value: String,
    },

    /// Некорректный период `MM.YYYY`.
    #[error("Некорректный период: {value:?}")]
    InvalidPeriod {
        /// Исходное значение.
        value: String,
    },

    /// Итог начислений месяца не найден среди напечатанных сумм блока.
    #[error(
        "Ошибка разбора справки: не найден итог начислений за {period}. \
         Сумма (начислено + корректировка) не найдена среди итогов за месяц в справке."
    )]
    MonthTotalNotFound {
        /// Период месяца.
        period: Period,
        /// Базовое начисление (строки с периодом, равным месяцу).
        base: Money,
        /// Сумма корректировок (строки с иными периодами).
        correction: Money,
        /// Ожидаемый итог `base + correction`.
        expected: Money,
        /// Напечатанные кандидаты блока.
        candidates: Vec<Money>,
    },

    /// Итог оплат месяца не найден.
    #[error(
        "Ошибка разбора справки: не найден итог оплат за {period}. \
         Сумма оплат по строкам рассчитана, но итог оплаты за месяц не найден среди итогов справки."
    )]
    MonthPaidTotalNotFound {
        /// Период месяца.
        period: Period,
        /// Сумма датированных строк оплат.
        payments_sum: Money,
        /// Напечатанные кандидаты блока.
        candidates: Vec<Money>,
    },

    /// Итог задолженности месяца не найден.
    #[error(
        "Ошибка разбора справки: не найден итог задолженности за {period}. \
         Задолженность рассчитана как (начислено − оплачено), но итог долга за месяц \
         не найден среди итогов справки."
    )]
    MonthDebtTotalNotFound {
        /// Период месяца.
        period: Period,
        /// Итог начислений месяца.
        charged: Money,
        /// Итог оплат месяца.
        paid: Money,
        /// Напечатанные кандидаты блока.
        candidates: Vec<Money>,
    },

    /// Итоги месяца не согласованы: `charged − paid ≠ debt`.
    #[error(
        "Ошибка проверки справки: итоги за {period} не согласованы \
         (начислено − оплачено не равно задолженности)."
    )]
    MonthTotalsIncoherent {
        /// Период месяца.
        period: Period,
        /// Итог начислений.
        charged: Money,
        /// Итог оплат.
        paid: Money,
        /// Напечатанный итог задолженности.
        debt: Money,
    },

    /// Сумма начислений по периодам не сошлась с «ИТОГО ПО ПЕРИОДУ».
    #[error(
        "Ошибка проверки справки: не сошлись итоги по начислению. \
         Сумма начислений по периодам не равна значению в строке «ИТОГО ПО ПЕРИОДУ»."
    )]
    DocTotalsMismatchCharged {
        /// Сумма итогов месяцев (с долями корректировок).
        sum_periods: Money,
        /// Значение из строки «ИТОГО ПО ПЕРИОДУ».
        doc_total: Money,
    },

    /// Сумма оплат по периодам не сошлась с «ИТОГО ПО ПЕРИОДУ».
    #[error(
        "Ошибка проверки справки: не сошлись итоги по оплатам. \
         Сумма оплат по периодам не равна значению в строке «ИТОГО ПО ПЕРИОДУ»."
    )]
    DocTotalsMismatchPaid {
        /// Сумма итогов месяцев (с долями корректировок).
        sum_periods: Money,
        /// Значение из строки «ИТОГО ПО ПЕРИОДУ».
        doc_total: Money,
        /// Расхождение.
        delta: Money,
        /// Помесячная диагностика для поиска источника расхождения.
        diagnostics: Vec<String>,
    },

    /// Сумма задолженности по периодам не сошлась с «ИТОГО ПО ПЕРИОДУ».
    #[error(
        "Ошибка проверки справки: не сошлись итоги по задолженности. \
         Сумма задолженности по периодам не равна значению в строке «ИТОГО ПО ПЕРИОДУ»."
    )]
    DocTotalsMismatchDebt {
        /// Сумма итогов месяцев (с долями корректировок).
        sum_periods: Money,
        /// Значение из строки «ИТОГО ПО ПЕРИОДУ».
        doc_total: Money,
    },

    /// Сумма строк оплат периода не равна напечатанному итогу оплат.
    #[error(
        "Ошибка проверки справки: не сходятся оплаты за период {period}. \
         Сумма платежей по строкам не равна итогу оплаты за период в справке."
    )]
    PaymentsPeriodSumMismatch {
        /// Период.
        period: Period,
        /// Сумма нормализованных строк оплат.
        sum_rows: Money,
        /// Напечатанный итог оплат периода.
        paid_total: Money,
        /// Расхождение.
        delta: Money,
        /// Строки оплат периода «дата сумма».
        rows: Vec<String>,
    },

    /// В документе не выделено ни одного начисления.
    #[error(
        "Ошибка разбора справки: не найдены начисления. \
         Сервис не смог выделить таблицу начислений из PDF."
    )]
    ChargesTableNotFound,
}

impl StatementError {
    /// Стабильный машинный код ошибки.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoTextLayer => "NO_TEXT_LAYER",
            Self::CalcDateNotFound => "CALC_DATE_NOT_FOUND",
            Self::PeriodFromNotFound => "PERIOD_FROM_NOT_FOUND",
            Self::InnNotFound => "INN_NOT_FOUND",
            Self::ContractDateNotFound => "CONTRACT_DATE_NOT_FOUND",
            Self::DocHeaderNotFound => "DOC_HEADER_NOT_FOUND",
            Self::ContractNumberNotFound => "CONTRACT_NUMBER_NOT_FOUND",
            Self::DebtorNameNotFound { .. } => "DEBTOR_NAME_NOT_FOUND",
            Self::InvalidDate { .. } => "INVALID_DATE",
            Self::InvalidPeriod { .. } => "INVALID_PERIOD",
            Self::MonthTotalNotFound { .. } => "MONTH_TOTAL_NOT_FOUND",
            Self::MonthPaidTotalNotFound { .. } => "MONTH_PAID_TOTAL_NOT_FOUND",
            Self::MonthDebtTotalNotFound { .. } => "MONTH_DEBT_TOTAL_NOT_FOUND",
            Self::MonthTotalsIncoherent { .. } => "MONTH_TOTALS_INCOHERENT",
            Self::DocTotalsMismatchCharged { .. } => "DOC_TOTALS_MISMATCH_CHARGED",
            Self::DocTotalsMismatchPaid { .. } => "DOC_TOTALS_MISMATCH_PAID",
            Self::DocTotalsMismatchDebt { .. } => "DOC_TOTALS_MISMATCH_DEBT",
            Self::PaymentsPeriodSumMismatch { .. } => "PAYMENTS_PERIOD_SUM_MISMATCH",
            Self::ChargesTableNotFound => "CHARGES_TABLE_NOT_FOUND",
        }
    }

    /// Этап, на котором возникла ошибка.
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::InvalidDate { .. } | Self::InvalidPeriod { .. } => "input",
            _ => "pdf_to_json",
        }
    }

    /// Структурированные подробности для UI/логов; не входят в основное сообщение.
    pub fn details(&self) -> Value {
        fn money_list(values: &[Money]) -> Vec<String> {
            values.iter().take(50).map(|v| format_money(*v)).collect()
        }

        match self {
            Self::MonthTotalNotFound { period, base, correction, expected, candidates } => json!({
                "period": period.to_string(),
                "charged_base": format_money(*base),
                "charged_correction": format_money(*correction),
                "expected_month_total": format_money(*expected),
                "block_total_candidates": money_list(candidates),
            }),
            Self::MonthPaidTotalNotFound { period, payments_sum, candidates } => json!({
                "period": period.to_string(),
                "payments_sum": format_money(*payments_sum),
                "block_total_candidates": money_list(candidates),
            }),
            Self::MonthDebtTotalNotFound { period, charged, paid, candidates } => json!({
                "period": period.to_string(),
                "charged_total": format_money(*charged),
                "paid_total": format_money(*paid),
                "block_total_candidates": money_list(candidates),
            }),
            Self::MonthTotalsIncoherent { period, charged, paid, debt } => json!({
                "period": period.to_string(),
                "charged_total": format_money(*charged),
                "paid_total": format_money(*paid),
                "debt_total": format_money(*debt),
            }),
            Self::DocTotalsMismatchCharged { sum_periods, doc_total } => json!({
                "sum_periods_charged": format_money(*sum_periods),
                "doc_total_charged": format_money(*doc_total),
                "hint": "Проверь таблицу начислений по периодам и строку «ИТОГО ПО ПЕРИОДУ» в PDF.",
            }),
            Self::DocTotalsMismatchPaid { sum_periods, doc_total, delta, diagnostics } => json!({
                "sum_periods_paid": format_money(*sum_periods),
                "doc_total_paid": format_money(*doc_total),
                "delta": format_money(*delta),
                "diagnostics": diagnostics.iter().take(80).collect::<Vec<_>>(),
            }),
            Self::DocTotalsMismatchDebt { sum_periods, doc_total } => json!({
                "sum_periods_debt": format_money(*sum_periods),
                "doc_total_debt": format_money(*doc_total),
            }),
            Self::PaymentsPeriodSumMismatch { period, sum_rows, paid_total, delta, rows } => {
                json!({
                    "period": period.to_string(),
                    "sum_payment_rows": format_money(*sum_rows),
                    "paid_total_printed": format_money(*paid_total),
                    "delta": format_money(*delta),
                    "payments_rows": rows.iter().take(40).collect::<Vec<_>>(),
                })
            }
            Self::DebtorNameNotFound { reason } => json!({ "reason": reason }),
            Self::InvalidDate { value } | Self::InvalidPeriod { value } => {
                json!({ "value": value })
            }
            _ => json!({}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr as _;

    #[test]
    fn message_is_short_and_russian_details_are_structured() {
        let err = StatementError::MonthTotalNotFound {
            period: "11.2023".parse().unwrap(),
            base: Money::from_str("700000.00").unwrap(),
            correction: Money::from_str("12954.13").unwrap(),
            expected: Money::from_str("712954.13").unwrap(),
            candidates: vec![Money::from_str("1.00").unwrap()],
        };
        assert_eq!(err.code(), "MONTH_TOTAL_NOT_FOUND");
        assert_eq!(err.stage(), "pdf_to_json");
        assert!(err.to_string().contains("11.2023"));
        let details = err.details();
        assert_eq!(details["expected_month_total"], "712954.13");
        assert_eq!(details["block_total_candidates"][0], "1.00");
    }
}
