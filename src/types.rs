//! Доменные типы и строковые контракты справки о задолженности.

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StatementError;

/// Денежное значение, используем `Decimal` для точных расчётов.
pub type Money = Decimal;

/// Допуск сравнения денежных сумм — одна копейка.
pub fn money_tolerance() -> Money {
    Decimal::new(1, 2)
}

/// Квантует сумму до копеек (округление половины от нуля, как в печатных формах).
pub fn quantize(v: Money) -> Money {
    v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Сравнивает суммы с допуском в одну копейку.
pub fn money_eq(a: Money, b: Money) -> bool {
    (a - b).abs() <= money_tolerance()
}

/// Канонический вид суммы: `"12345.67"`, всегда два знака, без разделителей.
pub fn format_money(v: Money) -> String {
    format!("{:.2}", quantize(v))
}

/// Названия месяцев в именительном падеже (заголовки блоков).
pub const MONTHS_NOMINATIVE: [&str; 12] = [
    "Январь",
    "Февраль",
    "Март",
    "Апрель",
    "Май",
    "Июнь",
    "Июль",
    "Август",
    "Сентябрь",
    "Октябрь",
    "Ноябрь",
    "Декабрь",
];

/// Названия месяцев в предложном падеже («подлежащая оплате в …»).
pub const MONTHS_PREPOSITIONAL: [&str; 12] = [
    "январе",
    "феврале",
    "марте",
    "апреле",
    "мае",
    "июне",
    "июле",
    "августе",
    "сентябре",
    "октябре",
    "ноябре",
    "декабре",
];

/// Последний день месяца.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .expect("valid month arithmetic")
}

/// Расчётный период `MM.YYYY`. Упорядочен хронологически.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    /// Год.
    pub year: i32,
    /// Месяц, 1–12.
    pub month: u32,
}

impl Period {
    /// Создаёт период, проверяя номер месяца.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        ((1..=12).contains(&month) && (1000..=9999).contains(&year)).then_some(Self { year, month })
    }

    /// Первый день месяца.
    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("valid period")
    }

    /// Последний день месяца — дата возникновения задолженности.
    pub fn last_day(self) -> NaiveDate {
        last_day_of_month(self.year, self.month)
    }

    /// Следующий календарный месяц.
    pub fn next(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    /// Дата начала просрочки: выбранный день следующего месяца
    /// (ограничен последним днём этого месяца).
    pub fn overdue_start(self, overdue_start_day: u32) -> NaiveDate {
        let next = self.next();
        let last = next.last_day();
        NaiveDate::from_ymd_opt(next.year, next.month, overdue_start_day.min(last.day()))
            .expect("clamped day is valid")
    }

    /// Заголовок блока: «Ноябрь 2023».
    pub fn label(self) -> String {
        format!("{} {}", MONTHS_NOMINATIVE[self.month as usize - 1], self.year)
    }

    /// Подпись в предложном падеже: «ноябре 2023».
    pub fn prepositional(self) -> String {
        format!("{} {}", MONTHS_PREPOSITIONAL[self.month as usize - 1], self.year)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}.{:04}", self.month, self.year)
    }
}

impl FromStr for Period {
    type Err = StatementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || StatementError::InvalidPeriod { value: s.trim().to_string() };
        let (mm, yyyy) = s.trim().split_once('.').ok_or_else(err)?;
        if mm.len() != 2 || yyyy.len() != 4 {
            return Err(err());
        }
        let month: u32 = mm.parse().map_err(|_| err())?;
        let year: i32 = yyyy.parse().map_err(|_| err())?;
        Self::new(year, month).ok_or_else(err)
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Разбирает дату формата `DD.MM.YYYY`.
pub fn parse_date(value: &str) -> Result<NaiveDate, StatementError> {
    NaiveDate::parse_from_str(value.trim(), "%d.%m.%Y").map_err(|_| StatementError::InvalidDate {
        value: value.trim().to_string(),
    })
}

/// Каноническая запись даты: `DD.MM.YYYY`.
pub fn format_date(d: NaiveDate) -> String {
    d.format("%d.%m.%Y").to_string()
}

pub(crate) mod money_str {
    //! Сериализация денег строкой `"12345.67"`.
    use super::{format_money, Money};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(v: &Money, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_money(*v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        let s = String::deserialize(deserializer)?;
        Money::from_str(s.trim()).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod date_str {
    //! Сериализация дат строкой `DD.MM.YYYY`.
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_date(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(s.trim(), "%d.%m.%Y").map_err(serde::de::Error::custom)
    }
}

/// Маркер строк блока годовой корректировки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentKind {
    /// Доля от размера годовой корректировки.
    #[serde(rename = "annual_adjustment_share")]
    AnnualAdjustmentShare,
}

/// Ключ обязательства по годовой корректировке.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AdjustmentKey {
    /// Месяц, в котором доля подлежит оплате.
    pub payable_month: Period,
    /// Год, по итогам которого выполнена корректировка.
    pub adjustment_year: i32,
    /// Базовый период начисления, если указан.
    pub base_period: Option<Period>,
}

/// Месячное начисление.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCharge {
    /// Период начисления `MM.YYYY`.
    pub period: Period,
    /// Сумма начисления.
    #[serde(with = "money_str")]
    pub amount: Money,
}

/// Начисление доли годовой корректировки.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentCharge {
    /// Базовый период доли (дублируется в `base_period`).
    pub period: Period,
    /// Сумма доли.
    #[serde(with = "money_str")]
    pub amount: Money,
    /// Маркер вида строки.
    pub kind: AdjustmentKind,
    /// Год корректировки.
    pub adjustment_year: i32,
    /// Месяц оплаты доли.
    pub payable_month: Period,
    /// Базовый период.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_period: Option<Period>,
}

/// Начисление: обычное месячное или доля годовой корректировки.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Charge {
    /// Доля годовой корректировки.
    Adjustment(AdjustmentCharge),
    /// Обычное начисление за месяц.
    Monthly(MonthlyCharge),
}

impl Charge {
    /// Сумма начисления.
    pub fn amount(&self) -> Money {
        match self {
            Self::Adjustment(c) => c.amount,
            Self::Monthly(c) => c.amount,
        }
    }

    /// Ключ корректировки, если это доля годовой корректировки.
    pub fn adjustment_key(&self) -> Option<AdjustmentKey> {
        match self {
            Self::Adjustment(c) => Some(AdjustmentKey {
                payable_month: c.payable_month,
                adjustment_year: c.adjustment_year,
                base_period: c.base_period,
            }),
            Self::Monthly(_) => None,
        }
    }
}

/// Обычная оплата: дата, сумма и период, в счёт которого она зачтена.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdinaryPayment {
    /// Дата платежа.
    #[serde(with = "date_str")]
    pub date: NaiveDate,
    /// Сумма платежа.
    #[serde(with = "money_str")]
    pub amount: Money,
    /// Период зачёта `MM.YYYY` — может отличаться от даты платежа.
    pub period: Period,
}

/// Оплата доли годовой корректировки.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentPayment {
    /// Дата платежа.
    #[serde(with = "date_str")]
    pub date: NaiveDate,
    /// Сумма платежа.
    #[serde(with = "money_str")]
    pub amount: Money,
    /// Маркер вида строки.
    pub kind: AdjustmentKind,
    /// Год корректировки.
    pub adjustment_year: i32,
    /// Месяц оплаты доли.
    pub payable_month: Period,
    /// Базовый период, если известен.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_period: Option<Period>,
}

impl AdjustmentPayment {
    /// Ключ обязательства, к которому относится платёж.
    pub fn adjustment_key(&self) -> AdjustmentKey {
        AdjustmentKey {
            payable_month: self.payable_month,
            adjustment_year: self.adjustment_year,
            base_period: self.base_period,
        }
    }
}

/// Оплата: обычная или по годовой корректировке.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payment {
    /// Оплата доли годовой корректировки.
    Adjustment(AdjustmentPayment),
    /// Обычная оплата с обязательным периодом зачёта.
    Ordinary(OrdinaryPayment),
}

impl Payment {
    /// Сумма платежа.
    pub fn amount(&self) -> Money {
        match self {
            Self::Adjustment(p) => p.amount,
            Self::Ordinary(p) => p.amount,
        }
    }

    /// Дата платежа.
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Adjustment(p) => p.date,
            Self::Ordinary(p) => p.date,
        }
    }
}

/// Должник из шапки справки.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debtor {
    /// Наименование, начинается с полной ОПФ.
    pub name: String,
    /// ИНН (10–12 цифр).
    pub inn: String,
}

/// Договор теплоснабжения/водоснабжения.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Номер договора.
    pub number: String,
    /// Дата договора.
    #[serde(with = "date_str")]
    pub date: NaiveDate,
}

/// Период, покрытый справкой.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementPeriod {
    /// Начало периода.
    #[serde(rename = "from", with = "date_str")]
    pub from: NaiveDate,
    /// Конец периода.
    #[serde(with = "date_str")]
    pub to: NaiveDate,
}

/// Итоги справки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    /// Всего начислено.
    #[serde(with = "money_str")]
    pub charged: Money,
    /// Всего оплачено.
    #[serde(with = "money_str")]
    pub paid: Money,
    /// Задолженность.
    #[serde(with = "money_str")]
    pub debt: Money,
}

/// Метаданные источника.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Путь/имя исходного PDF.
    pub source_pdf: String,
    /// Дата формирования документа, ISO 8601 UTC.
    pub generated_at: String,
}

/// Тело справки: реквизиты, параметры расчёта и реестр начислений/оплат.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementBody {
    /// Должник.
    pub debtor: Debtor,
    /// Договор.
    pub contract: Contract,
    /// Период справки.
    pub period: StatementPeriod,
    /// Категория должника (свободный текст из UI).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Дата, на которую выполняется расчёт неустойки.
    #[serde(with = "date_str")]
    pub calc_date: NaiveDate,
    /// Ключевая ставка, процентов.
    pub rate_percent: f64,
    /// День месяца (1–31), с которого в следующем месяце начинается просрочка.
    pub overdue_start_day: u32,
    /// Исключать ли периоды с нулевой задолженностью из расчёта.
    pub exclude_zero_debt_periods: bool,
    /// Начисления в хронологическом порядке.
    pub charges: Vec<Charge>,
    /// Оплаты.
    pub payments: Vec<Payment>,
    /// Итоги.
    pub totals: Totals,
}

/// Версия схемы выходного JSON.
pub const SCHEMA_VERSION: &str = "1.2";

/// Разобранная и провалидированная справка. Неизменяема после построения.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Версия схемы, всегда `"1.2"`.
    pub schema_version: String,
    /// Метаданные источника.
    pub meta: Meta,
    /// Тело справки.
    pub statement: StatementBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_parses_and_orders_chronologically() {
        let nov: Period = "11.2023".parse().unwrap();
        let jan: Period = "01.2024".parse().unwrap();
        assert!(nov < jan);
        assert_eq!(nov.to_string(), "11.2023");
        assert!("13.2023".parse::<Period>().is_err());
        assert!("11.23".parse::<Period>().is_err());
    }

    #[test]
    fn period_month_math() {
        let feb: Period = "02.2024".parse().unwrap();
        assert_eq!(format_date(feb.last_day()), "29.02.2024");
        let dec: Period = "12.2023".parse().unwrap();
        assert_eq!(dec.next(), "01.2024".parse().unwrap());
        // день 31 ограничивается последним днём февраля
        let jan: Period = "01.2024".parse().unwrap();
        assert_eq!(format_date(jan.overdue_start(31)), "29.02.2024");
        assert_eq!(format_date(jan.overdue_start(10)), "10.02.2024");
    }

    #[test]
    fn money_formatting_is_exact_two_decimals() {
        use std::str::FromStr as _;
        assert_eq!(format_money(Money::from_str("5").unwrap()), "5.00");
        assert_eq!(format_money(Money::from_str("-0.03").unwrap()), "-0.03");
        assert_eq!(format_money(Money::from_str("1.005").unwrap()), "1.01");
    }

    #[test]
    fn charge_json_shapes() {
        use std::str::FromStr as _;
        let monthly = Charge::Monthly(MonthlyCharge {
            period: "11.2023".parse().unwrap(),
            amount: Money::from_str("712954.13").unwrap(),
        });
        let json = serde_json::to_value(&monthly).unwrap();
        assert_eq!(json["period"], "11.2023");
        assert_eq!(json["amount"], "712954.13");
        assert!(json.get("kind").is_none());

        let adj = Charge::Adjustment(AdjustmentCharge {
            period: "12.2023".parse().unwrap(),
            amount: Money::from_str("100.50").unwrap(),
            kind: AdjustmentKind::AnnualAdjustmentShare,
            adjustment_year: 2023,
            payable_month: "01.2025".parse().unwrap(),
            base_period: Some("12.2023".parse().unwrap()),
        });
        let json = serde_json::to_value(&adj).unwrap();
        assert_eq!(json["kind"], "annual_adjustment_share");
        assert_eq!(json["payable_month"], "01.2025");

        let back: Charge = serde_json::from_value(json).unwrap();
        assert_eq!(back, adj);
    }
}
