//! Нормализация строк текстового слоя и распознавание токенов:
//! денежных сумм, дат, периодов и служебных заголовков таблиц.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

use crate::types::{Money, Period, MONTHS_NOMINATIVE, MONTHS_PREPOSITIONAL};

static WS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\x{00A0}]+").expect("valid whitespace regex"));

/// Схлопывает пробельный шум (включая NBSP) и обрезает края строки.
pub fn normalize_line(s: &str) -> String {
    let s = s.replace('\r', "");
    WS_RE.replace_all(&s, " ").trim().to_string()
}

/// Нормализует поток строк, отбрасывая пустые.
pub fn normalize_lines<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .map(|ln| normalize_line(ln.as_ref()))
        .filter(|ln| !ln.is_empty())
        .collect()
}

// Денежный токен: разделители тысяч пробелом/NBSP, запятая или точка
// как десятичный разделитель.
static MONEY_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?P<sign>-)?(?P<int>\d{1,3}(?:[ \x{00A0}\x{202F}]\d{3})+|\d+)(?:[.,](?P<frac>\d{1,2}))?",
    )
    .expect("valid money token regex")
});

// Полная дата в строке (подвал вида "2 14.01.2026") — не деньги.
static FULL_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{2}\.\d{2}\.\d{4}\b").expect("valid full date regex"));

// Время в строке (шапка вида "13.01.2026 14:41") — не деньги.
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}:\d{2}\b").expect("valid time regex"));

// Доменный инвариант: суммы в этом формате документов всегда печатаются
// с копейками (",dd" или ".dd"); "2026" — год или номер страницы, не сумма.
static CENTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,.]\d{2}\b").expect("valid cents regex"));

static SMALL_INT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}$").expect("valid small int regex"));

/// Извлекает ПЕРВЫЙ денежный токен из текста и приводит к виду `"12345.67"`.
///
/// Принимает `'909 962.70'`, `'909 962,70'`, `'-14 693.73'`, `'0.00'`;
/// окружающий текст игнорируется. `None`, если токена нет.
pub fn money_token(text: &str) -> Option<String> {
    let caps = MONEY_TOKEN_RE.captures(text.trim())?;
    let sign = if caps.name("sign").is_some() { "-" } else { "" };
    let int_part: String = caps
        .name("int")
        .map(|m| m.as_str())?
        .chars()
        .filter(|ch| !matches!(*ch, ' ' | '\u{a0}' | '\u{202f}'))
        .collect();
    let frac = match caps.name("frac").map(|m| m.as_str()) {
        None => "00".to_string(),
        Some(f) if f.len() == 1 => format!("{f}0"),
        Some(f) => f.to_string(),
    };
    let int_part = if int_part.is_empty() { "0" } else { &int_part };
    Some(format!("{sign}{int_part}.{frac}"))
}

/// Пытается разобрать строку как ОДНУ денежную сумму с учётом защит
/// от артефактов подвала/шапки. `None` — строка не является суммой.
pub fn try_money_line(line: &str) -> Option<Money> {
    let ln = line.trim();
    if ln.is_empty() {
        return None;
    }
    if FULL_DATE_RE.is_match(ln) || TIME_RE.is_match(ln) {
        return None;
    }
    if !CENTS_RE.is_match(ln) {
        return None;
    }

    let token = money_token(ln)?;
    let value = Decimal::from_str(&token).ok()?;

    // Защита от номеров страниц (1..8); суммы вида "3,00" сюда не попадают,
    // их отсекает проверка копеек выше.
    if SMALL_INT_RE.is_match(ln)
        && value.abs() > Decimal::ZERO
        && value.abs() < Decimal::from(9)
    {
        return None;
    }

    Some(value)
}

/// Извлекает ВСЕ денежные токены строки (для итоговых строк с 2–3 суммами).
/// Защиты те же, что у [`try_money_line`], но применяются к каждому токену.
pub fn try_money_values(line: &str) -> Vec<Money> {
    let ln = line.trim();
    if ln.is_empty() || FULL_DATE_RE.is_match(ln) || TIME_RE.is_match(ln) {
        return Vec::new();
    }

    let mut out = Vec::new();
    for m in MONEY_TOKEN_RE.find_iter(ln) {
        let token = m.as_str();
        if !CENTS_RE.is_match(token) {
            continue;
        }
        let Some(canonical) = money_token(token) else { continue };
        let Ok(value) = Decimal::from_str(&canonical) else { continue };
        if SMALL_INT_RE.is_match(token)
            && value.fract().is_zero()
            && value.abs() > Decimal::ZERO
            && value.abs() < Decimal::from(9)
        {
            continue;
        }
        out.push(value);
    }
    out
}

/// `Some(сумма)`, если строка состоит из РОВНО одного денежного токена
/// и пробельного шума. Нужна для распознавания разбитых итоговых строк.
pub fn money_only_value(line: &str) -> Option<Money> {
    let ln = line.trim();
    if ln.is_empty() {
        return None;
    }
    let vals = try_money_values(ln);
    if vals.len() != 1 {
        return None;
    }
    let rest = MONEY_TOKEN_RE.replace_all(ln, "");
    let rest: String = rest
        .chars()
        .filter(|ch| !matches!(*ch, ' ' | '\u{a0}' | '\u{202f}'))
        .collect();
    rest.is_empty().then(|| vals[0])
}

// Заголовок месяца: "Ноябрь 2023 года" / "Ноябрь 2023".
static MONTH_HDR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(Январь|Февраль|Март|Апрель|Май|Июнь|Июль|Август|Сентябрь|Октябрь|Ноябрь|Декабрь)\s+(\d{4})(?:\s+года)?$",
    )
    .expect("valid month header regex")
});

static PERIOD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2}\.\d{4})$").expect("valid period regex"));
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2}\.\d{2}\.\d{4})$").expect("valid date regex"));

static CHARGE_INLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2}\.\d{4})\s+(.+)$").expect("valid charge inline regex"));
static PAYMENT_INLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2}\.\d{2}\.\d{4})\s+(.+)$").expect("valid payment inline regex")
});

// Блок годовой корректировки.
static ADJ_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Доля от размера\b").expect("valid adjustment start regex"));
static ADJ_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)по итогам\s+(\d{4})\s+года\b").expect("valid adjustment year regex")
});
static ADJ_PAYABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)подлежащая оплате в\s+([а-яё]+)\s+(\d{4})")
        .expect("valid adjustment payable regex")
});

static TOTAL_HDR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^ИТОГО ПО ПЕРИОДУ\b").expect("valid totals header regex"));

/// Распознаёт заголовок месяца («Ноябрь 2023 года») → период.
pub fn month_header(line: &str) -> Option<Period> {
    let caps = MONTH_HDR_RE.captures(line.trim())?;
    let name = caps.get(1)?.as_str().to_lowercase();
    let month = MONTHS_NOMINATIVE
        .iter()
        .position(|m| m.to_lowercase() == name)?
        as u32
        + 1;
    let year: i32 = caps.get(2)?.as_str().parse().ok()?;
    Period::new(year, month)
}

/// Строка из одного периода `MM.YYYY`.
pub fn bare_period(line: &str) -> Option<Period> {
    let caps = PERIOD_RE.captures(line.trim())?;
    caps.get(1)?.as_str().parse().ok()
}

/// Строка из одной даты `DD.MM.YYYY`.
pub fn bare_date(line: &str) -> Option<NaiveDate> {
    let caps = DATE_RE.captures(line.trim())?;
    NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%d.%m.%Y").ok()
}

/// Строка вида `"MM.YYYY <сумма>"`: период проводки и хвост с суммой.
pub fn inline_posting(line: &str) -> Option<(Period, &str)> {
    let caps = CHARGE_INLINE_RE.captures(line.trim())?;
    let period: Period = caps.get(1)?.as_str().parse().ok()?;
    let rest = caps.get(2)?.as_str();
    Some((period, rest))
}

/// Строка вида `"DD.MM.YYYY <сумма>"`: дата платежа и хвост с суммой.
pub fn inline_payment(line: &str) -> Option<(NaiveDate, &str)> {
    let caps = PAYMENT_INLINE_RE.captures(line.trim())?;
    let date = NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%d.%m.%Y").ok()?;
    let rest = caps.get(2)?.as_str();
    Some((date, rest))
}

/// Начало блока годовой корректировки («Доля от размера …»).
pub fn is_adjustment_start(line: &str) -> bool {
    ADJ_START_RE.is_match(line.trim())
}

/// Год корректировки из хвоста заголовка («по итогам 2023 года»).
pub fn adjustment_year(text: &str) -> Option<i32> {
    ADJ_YEAR_RE.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Месяц оплаты доли («подлежащая оплате в январе 2025») → период.
pub fn adjustment_payable_month(text: &str) -> Option<Period> {
    let caps = ADJ_PAYABLE_RE.captures(text)?;
    let word = caps.get(1)?.as_str().to_lowercase();
    let month = MONTHS_PREPOSITIONAL.iter().position(|m| *m == word)? as u32 + 1;
    let year: i32 = caps.get(2)?.as_str().parse().ok()?;
    Period::new(year, month)
}

/// Строка «ИТОГО ПО ПЕРИОДУ».
pub fn is_totals_header(line: &str) -> bool {
    TOTAL_HDR_RE.is_match(line.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Money {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn normalizes_whitespace_noise() {
        assert_eq!(normalize_line("  a\u{a0}\u{a0}b\t c \r"), "a b c");
        assert_eq!(normalize_lines(["", "  ", "x "]), vec!["x".to_string()]);
    }

    #[test]
    fn money_token_canonical_forms() {
        assert_eq!(money_token("909 962.70").as_deref(), Some("909962.70"));
        assert_eq!(money_token("909\u{a0}962,70").as_deref(), Some("909962.70"));
        assert_eq!(money_token("-14 693.73").as_deref(), Some("-14693.73"));
        assert_eq!(money_token("итого 0,5 руб").as_deref(), Some("0.50"));
        assert_eq!(money_token("пусто"), None);
    }

    #[test]
    fn money_line_requires_visible_cents() {
        assert_eq!(try_money_line("712 954.13"), Some(dec("712954.13")));
        assert_eq!(try_money_line("3,00"), Some(dec("3.00")));
        // год/номер страницы без копеек — не сумма
        assert_eq!(try_money_line("2026"), None);
        assert_eq!(try_money_line("7"), None);
    }

    #[test]
    fn money_line_rejects_dates_and_times() {
        assert_eq!(try_money_line("2 14.01.2026"), None);
        assert_eq!(try_money_line("13.01.2026 14:41"), None);
    }

    #[test]
    fn multi_token_scan_keeps_column_order() {
        let vals = try_money_values("7 542 348.95 6 840 566.46 701 782.49");
        assert_eq!(vals, vec![dec("7542348.95"), dec("6840566.46"), dec("701782.49")]);
        assert_eq!(try_money_values("301 863.83 287 348.03").len(), 2);
    }

    #[test]
    fn money_only_line_detection() {
        assert_eq!(money_only_value("1 242 526.53"), Some(dec("1242526.53")));
        assert_eq!(money_only_value("0.00"), Some(dec("0.00")));
        assert_eq!(money_only_value("итого 1 242 526.53"), None);
        assert_eq!(money_only_value("1.00 2.00"), None);
    }

    #[test]
    fn month_headers() {
        let p = month_header("Ноябрь 2023 года").unwrap();
        assert_eq!(p.to_string(), "11.2023");
        assert_eq!(month_header("ноябрь 2023").unwrap().to_string(), "11.2023");
        assert!(month_header("Ноябрь 2023 г.").is_none());
    }

    #[test]
    fn period_and_date_tokens() {
        assert_eq!(bare_period("11.2023").unwrap().to_string(), "11.2023");
        assert!(bare_period("13.2023").is_none());
        assert!(bare_date("18.07.2019").is_some());
        assert!(bare_date("31.02.2019").is_none());

        let (p, rest) = inline_posting("11.2023 712 954.13").unwrap();
        assert_eq!(p.to_string(), "11.2023");
        assert_eq!(try_money_line(rest), Some(dec("712954.13")));

        let (d, rest) = inline_payment("18.07.2019 -5 088.06").unwrap();
        assert_eq!(crate::types::format_date(d), "18.07.2019");
        assert_eq!(try_money_line(rest), Some(dec("-5088.06")));
    }

    #[test]
    fn adjustment_markers() {
        assert!(is_adjustment_start("Доля от размера годовой корректировки"));
        let tail = "Доля от размера годовой корректировки платы за тепловую энергию \
                    по итогам 2023 года, подлежащая оплате в январе 2025";
        assert_eq!(adjustment_year(tail), Some(2023));
        assert_eq!(adjustment_payable_month(tail).unwrap().to_string(), "01.2025");
    }

    #[test]
    fn totals_header_marker() {
        assert!(is_totals_header("ИТОГО ПО ПЕРИОДУ"));
        assert!(is_totals_header("ИТОГО ПО ПЕРИОДУ с 01.08.2019"));
        assert!(!is_totals_header("итого"));
    }
}
