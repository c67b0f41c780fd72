//! Разбор шапки и реквизитов справки: даты, ИНН, номер договора,
//! наименование должника с приведением ОПФ к полной форме.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::error::StatementError;
use crate::types::parse_date;

// "11.12.2025 11:47"
static GEN_DT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2}\.\d{2}\.\d{4})\s+(\d{2}:\d{2})$").expect("valid generated-at regex")
});

// просто "11.12.2025"
static DATE_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2}\.\d{2}\.\d{4})$").expect("valid date-only regex"));

// "Дата с: 01.08.2025" (+варианты пробелов)
static FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Дата\s+с\s*:\s*(\d{2}\.\d{2}\.\d{4})$").expect("valid period-from regex")
});

static INN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bИНН\s+(\d{10,12})\b").expect("valid inn regex"));

// В шапке рядом с ИНН есть "Дата : 27.09.2023"; "Дата с:" сюда не попадает.
static CONTRACT_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Дата\s*:\s*(\d{2}\.\d{2}\.\d{4})$").expect("valid contract date regex")
});

static DOC_HDR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^Справка\s+о\s+задолженности").expect("valid doc header regex")
});

// Строки нижних таблиц часто начинаются так: "1 10.12.2025 ..." (№ строки + дата).
static ROWNO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s+\d{2}\.\d{2}\.\d{4}\b").expect("valid row-no regex"));
// Внутри строки имени иногда прилипает хвост " 1 10.12.2025" — отрезаем с первого паттерна.
static CUT_AFTER_ROWNO_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+\d+\s+\d{2}\.\d{2}\.\d{4}\b").expect("valid row-no cut regex")
});
// Иногда прилипает " 10.12.2025 14:04".
static CUT_AFTER_DATE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+\d{2}\.\d{2}\.\d{4}\s+\d{1,2}:\d{2}\b").expect("valid date-time cut regex")
});

static LEADING_JUNK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[\s"«»„“”()\[\]{}]+"#).expect("valid leading junk regex")
});

static HAS_LETTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-zА-Яа-яЁё]").expect("valid letter regex"));

static HYPHEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*-\s*").expect("valid hyphen regex"));

static WS_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid ws regex"));

// Обрезанная текстовым слоем ОПФ: "Общество с ограниченной ответстве…".
static OOO_TRUNCATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^Общество\s+с\s+ограниченной\s+ответств\S*").expect("valid ooo regex")
});

// Полные формы учреждений/органов, которые не обязаны быть в словаре ОПФ.
static INSTITUTION_OPF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(ФЕДЕРАЛЬНОЕ|ГОСУДАРСТВЕННОЕ|МУНИЦИПАЛЬНОЕ)\s+(КАЗЕННОЕ|КАЗЁННОЕ|БЮДЖЕТНОЕ|АВТОНОМНОЕ)\s+(ОБЩЕОБРАЗОВАТЕЛЬНОЕ\s+)?УЧРЕЖДЕНИЕ\b",
    )
    .expect("valid institution regex")
});

// "Г Б У ..." / "О О О ..."
static SPACED_ABBR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:[A-ZА-ЯЁ]\s+){2,}[A-ZА-ЯЁ])(\b.*)?$").expect("valid spaced abbr regex")
});
// "Г.Б.У." / "Ф.К.У"
static DOTTED_ABBR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:[A-ZА-ЯЁ]\.){2,}[A-ZА-ЯЁ]\.?)\b(.*)$").expect("valid dotted abbr regex")
});

static FIRST_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-zА-Яа-яЁё]+)\b(.*)$").expect("valid first token regex"));

const OPF_ABBR_TO_FULL: [(&str, &str); 14] = [
    ("ООО", "Общество с ограниченной ответственностью"),
    ("АО", "Акционерное общество"),
    ("ПАО", "Публичное акционерное общество"),
    ("ГУП", "Государственное унитарное предприятие"),
    ("МУП", "Муниципальное унитарное предприятие"),
    ("НКО", "Некоммерческая организация"),
    ("АНО", "Автономная некоммерческая организация"),
    ("ГБУ", "Государственное бюджетное учреждение"),
    ("ГАУ", "Государственное автономное учреждение"),
    ("МБУ", "Муниципальное бюджетное учреждение"),
    ("МАУ", "Муниципальное автономное учреждение"),
    ("ФГБУ", "Федеральное государственное бюджетное учреждение"),
    ("ФГАУ", "Федеральное государственное автономное учреждение"),
    ("ТСЖ", "Товарищество собственников жилья"),
];

const OPF_FULL: [&str; 40] = [
    "Общество с ограниченной ответственностью",
    "Акционерное общество",
    "Публичное акционерное общество",
    "Товарищество собственников жилья",
    "Жилищно-строительный кооператив",
    "Жилищный кооператив",
    "Государственное бюджетное учреждение",
    "Государственное автономное учреждение",
    "Муниципальное бюджетное учреждение",
    "Муниципальное автономное учреждение",
    "Федеральное государственное бюджетное учреждение",
    "Федеральное государственное автономное учреждение",
    "Государственное унитарное предприятие",
    "Муниципальное унитарное предприятие",
    "Некоммерческая организация",
    "Автономная некоммерческая организация",
    "Фонд",
    "Бюджетное учреждение",
    "Совет общественного самоуправления",
    "ДЕПАРТАМЕНТ",
    "КОМИТЕТ",
    "МИНИСТЕРСТВО",
    "УПРАВЛЕНИЕ",
    "ИНСПЕКЦИЯ",
    "АДМИНИСТРАЦИЯ",
    "ПРЕФЕКТУРА",
    "СЛУЖБА",
    "АГЕНТСТВО",
    "УФК",
    "ФКУ",
    "ФГБУ",
    "ФБУ",
    "ФКП",
    "ГБУ",
    "ГАУ",
    "ГАУЗ",
    "МБУ",
    "АУ",
    "БУ",
    "СНТ",
];

fn norm_for_opf(s: &str) -> String {
    let s = s.trim().replace('Ё', "Е").replace('ё', "е").to_uppercase();
    WS_RUN_RE.replace_all(&s, " ").into_owned()
}

/// Словарь организационно-правовых форм: полные формы и аббревиатуры.
///
/// Явная read-only конфигурация, создаётся один раз и передаётся ссылкой
/// в разбор реквизитов (никаких ленивых глобальных кэшей).
#[derive(Debug, Clone)]
pub struct OpfRegistry {
    full_norm: Vec<String>,
    abbr_to_full: HashMap<String, String>,
}

impl Default for OpfRegistry {
    fn default() -> Self {
        Self {
            full_norm: OPF_FULL.iter().map(|s| norm_for_opf(s)).collect(),
            abbr_to_full: OPF_ABBR_TO_FULL
                .iter()
                .map(|(abbr, full)| (norm_for_opf(abbr), (*full).to_string()))
                .collect(),
        }
    }
}

impl OpfRegistry {
    /// Строит словарь из внешнего списка форм. Короткие элементы без пробелов
    /// считаются аббревиатурами; для них выводится полная форма по акрониму.
    pub fn from_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items: Vec<String> =
            items.into_iter().map(|s| s.as_ref().trim().to_string()).filter(|s| !s.is_empty()).collect();

        let mut base = Self::default();

        let fulls: Vec<&String> = items
            .iter()
            .filter(|x| x.contains(' ') || x.contains('-') || x.contains('–') || x.contains('—'))
            .collect();
        let abbrs: Vec<&String> = items.iter().filter(|x| !x.contains(' ')).collect();

        let acronym = |full: &str| -> String {
            let spaced = full.replace(['-', '–', '—'], " ");
            let letters: String = spaced
                .split_whitespace()
                .filter(|p| HAS_LETTER_RE.is_match(p))
                .filter_map(|p| p.chars().next())
                .collect();
            norm_for_opf(&letters)
        };

        let mut ac_map: HashMap<String, &String> = HashMap::new();
        for f in &fulls {
            let ac = acronym(f);
            if !ac.is_empty() {
                ac_map.entry(ac).or_insert(f);
            }
        }

        for a in abbrs {
            let a_norm = norm_for_opf(a);
            if base.abbr_to_full.contains_key(&a_norm) {
                continue;
            }
            if let Some(full) = ac_map.get(&a_norm) {
                base.abbr_to_full.insert(a_norm, (*full).clone());
            }
        }

        base.full_norm = items.iter().map(|s| norm_for_opf(s)).collect();
        base
    }

    /// Заменяет ведущую аббревиатуру ОПФ на полную каноническую форму.
    pub fn canonicalize_prefix(&self, name: &str) -> String {
        let s = strip_leading_junk(name);
        if s.is_empty() {
            return s;
        }
        let Some(caps) = FIRST_TOKEN_RE.captures(&s) else { return s };
        let head = norm_for_opf(caps.get(1).map_or("", |m| m.as_str()));
        let tail = caps.get(2).map_or("", |m| m.as_str()).trim_start();
        match self.abbr_to_full.get(&head) {
            Some(full) => format!("{full} {tail}").trim().to_string(),
            None => s,
        }
    }

    fn starts_with_full_form(&self, norm: &str) -> bool {
        self.full_norm.iter().any(|opf| norm.starts_with(opf.as_str()))
    }

    fn has_abbr(&self, token: &str) -> bool {
        self.abbr_to_full.contains_key(token)
    }
}

fn strip_leading_junk(s: &str) -> String {
    LEADING_JUNK_RE.replace(s.trim(), "").into_owned()
}

// Чинит типовые дефекты текстового слоя в начале имени:
// "Г Б У ..." -> "ГБУ ...", "Г.Б.У." -> "ГБУ".
fn collapse_abbr_glitches(s: &str) -> String {
    let mut s0 = strip_leading_junk(s);

    if let Some(caps) = SPACED_ABBR_RE.captures(&s0) {
        let abbr = WS_RUN_RE.replace_all(caps.get(1).map_or("", |m| m.as_str()), "");
        let tail = caps.get(2).map_or("", |m| m.as_str());
        s0 = format!("{abbr}{tail}");
    }

    if let Some(caps) = DOTTED_ABBR_RE.captures(&s0) {
        let abbr = caps.get(1).map_or("", |m| m.as_str()).replace('.', "");
        let tail = caps.get(2).map_or("", |m| m.as_str());
        s0 = format!("{abbr}{tail}");
    }

    s0
}

fn cut_table_tail(s: &str) -> String {
    let s = CUT_AFTER_ROWNO_DATE_RE.splitn(s, 2).next().unwrap_or("");
    let s = CUT_AFTER_DATE_TIME_RE.splitn(s, 2).next().unwrap_or("");
    s.trim().to_string()
}

fn is_opf_start(line: &str, opf: &OpfRegistry) -> bool {
    let ln0 = collapse_abbr_glitches(line);
    // нормализуем дефисы до проверки («Жилищно - строительный…»)
    let ln0 = HYPHEN_RE.replace_all(&ln0, "-").into_owned();
    let ln0 = cut_table_tail(&ln0);
    if ln0.is_empty() {
        return false;
    }

    if OOO_TRUNCATED_RE.is_match(&ln0) {
        return true;
    }

    let ln_norm = norm_for_opf(&ln0);
    if opf.starts_with_full_form(&ln_norm) {
        return true;
    }

    let first_token = ln_norm.split(' ').next().unwrap_or("");
    if opf.has_abbr(first_token) {
        return true;
    }

    INSTITUTION_OPF_RE.is_match(&ln0)
}

/// Защита от сканов: машиночитаемая справка всегда даёт много строк текста.
pub fn ensure_text_layer(lines: &[String]) -> Result<(), StatementError> {
    let non_empty = lines.iter().filter(|ln| !ln.trim().is_empty()).count();
    if non_empty < 5 {
        return Err(StatementError::NoTextLayer);
    }
    Ok(())
}

/// Дата формирования документа: ISO 8601 UTC + дата `DD.MM.YYYY`.
///
/// Сначала ищем «DD.MM.YYYY HH:MM» в первых 60 строках, затем одиночную
/// дату; как fallback — наиболее частую дату по всему документу (типовой
/// подвал печати), исключая строки «Дата с: …».
pub fn find_generated_at_and_doc_date(
    lines: &[String],
) -> Result<(String, NaiveDate), StatementError> {
    let head = lines.iter().take(60);
    for ln in head.clone() {
        if let Some(caps) = GEN_DT_RE.captures(ln.trim()) {
            let d = parse_date(caps.get(1).map_or("", |m| m.as_str()))?;
            let t = caps.get(2).map_or("", |m| m.as_str());
            return Ok((iso_utc(d, t)?, d));
        }
    }
    for ln in head {
        if let Some(caps) = DATE_ONLY_RE.captures(ln.trim()) {
            let d = parse_date(caps.get(1).map_or("", |m| m.as_str()))?;
            return Ok((iso_midnight_utc(d), d));
        }
    }

    // Fallback: дата формирования в подвале. Считаем частоты по документу.
    let mut dt_counts: Vec<(String, String, usize)> = Vec::new(); // (дата, время, счётчик)
    let mut d_counts: Vec<(String, usize)> = Vec::new();

    for raw in lines {
        let ln = raw.trim();
        if ln.is_empty() || FROM_RE.is_match(ln) {
            continue;
        }
        if let Some(caps) = GEN_DT_RE.captures(ln) {
            let d = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let t = caps.get(2).map_or("", |m| m.as_str()).to_string();
            match dt_counts.iter_mut().find(|(dd, tt, _)| *dd == d && *tt == t) {
                Some(entry) => entry.2 += 1,
                None => dt_counts.push((d, t, 1)),
            }
            continue;
        }
        if let Some(caps) = DATE_ONLY_RE.captures(ln) {
            let d = caps.get(1).map_or("", |m| m.as_str()).to_string();
            match d_counts.iter_mut().find(|(dd, _)| *dd == d) {
                Some(entry) => entry.1 += 1,
                None => d_counts.push((d, 1)),
            }
        }
    }

    // Датавремя с повторами — типовой подвал, предпочитаем его.
    if let Some((d, t, _)) = dt_counts.iter().max_by_key(|(_, _, n)| *n) {
        let date = parse_date(d)?;
        return Ok((iso_utc(date, t)?, date));
    }
    if let Some((d, _)) = d_counts.iter().max_by_key(|(_, n)| *n) {
        let date = parse_date(d)?;
        return Ok((iso_midnight_utc(date), date));
    }

    Err(StatementError::CalcDateNotFound)
}

fn iso_utc(d: NaiveDate, hh_mm: &str) -> Result<String, StatementError> {
    let dt = NaiveDateTime::parse_from_str(
        &format!("{} {hh_mm}", d.format("%d.%m.%Y")),
        "%d.%m.%Y %H:%M",
    )
    .map_err(|_| StatementError::InvalidDate { value: hh_mm.to_string() })?;
    Ok(dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

fn iso_midnight_utc(d: NaiveDate) -> String {
    format!("{}T00:00:00Z", d.format("%Y-%m-%d"))
}

/// Начало периода справки: «Дата с: DD.MM.YYYY» в первых 120 строках.
pub fn find_period_from(lines: &[String]) -> Result<NaiveDate, StatementError> {
    for ln in lines.iter().take(120) {
        if let Some(caps) = FROM_RE.captures(ln.trim()) {
            return parse_date(caps.get(1).map_or("", |m| m.as_str()));
        }
    }
    Err(StatementError::PeriodFromNotFound)
}

/// ИНН должника из шапки.
pub fn find_inn(lines: &[String]) -> Result<String, StatementError> {
    for ln in lines.iter().take(120) {
        if let Some(caps) = INN_RE.captures(ln) {
            return Ok(caps.get(1).map_or("", |m| m.as_str()).to_string());
        }
    }
    Err(StatementError::InnNotFound)
}

/// Дата договора: «Дата : DD.MM.YYYY» из шапки.
pub fn find_contract_date(lines: &[String]) -> Result<NaiveDate, StatementError> {
    for ln in lines.iter().take(160) {
        if let Some(caps) = CONTRACT_DATE_RE.captures(ln.trim()) {
            return parse_date(caps.get(1).map_or("", |m| m.as_str()));
        }
    }
    Err(StatementError::ContractDateNotFound)
}

const STOP_NAME_MARKERS: [&str; 3] = ["Оплата", "ИТОГО ПО ПЕРИОДУ", "Выставленный счет"];

static CONTRACT_CANDIDATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\d[0-9A-Za-zА-Яа-яЁё./\-]*(?:\s+[0-9A-Za-zА-Яа-яЁё][0-9A-Za-zА-Яа-яЁё./\-]*)?$",
    )
    .expect("valid contract candidate regex")
});
static FRACTION_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\s*/\s*\d+$").expect("valid fraction line regex"));

fn norm_contract_line(s: &str) -> String {
    WS_RUN_RE.replace_all(s.trim(), " ").into_owned()
}

// Номер договора начинается с цифры: "01.000178 ТЭ", "09.346737кГВ", "44039".
// Отсекаем стоп-слова нижнего блока, строки таблиц и дроби вида "1/300".
fn is_contract_line(s: &str) -> bool {
    let s = norm_contract_line(s);
    if s.is_empty() {
        return false;
    }
    let low = s.to_lowercase();
    if matches!(low.as_str(), "оплата" | "выставленный счет" | "итого по периоду") {
        return false;
    }
    if low.starts_with("сз") {
        return false;
    }
    if ROWNO_DATE_RE.is_match(&s) || FRACTION_LINE_RE.is_match(&s) {
        return false;
    }
    if !s.starts_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    CONTRACT_CANDIDATE_RE.is_match(&s)
}

/// Извлекает номер договора и наименование должника из нижнего блока
/// после заголовка «Справка о задолженности».
///
/// Наименование всегда начинается с полной ОПФ (или аббревиатуры,
/// приводимой к полной форме словарём).
pub fn parse_bottom_block(
    lines: &[String],
    opf: &OpfRegistry,
) -> Result<(String, String), StatementError> {
    let start_idx = lines
        .iter()
        .position(|ln| DOC_HDR_RE.is_match(ln))
        .ok_or(StatementError::DocHeaderNotFound)?;

    // Номер договора: сначала в безопасном окне после заголовка, затем по всему хвосту.
    let scan_hi = lines.len().min(start_idx + 80);
    let mut contract_no = lines[start_idx + 1..scan_hi]
        .iter()
        .map(|ln| norm_contract_line(ln))
        .find(|ln| is_contract_line(ln));
    if contract_no.is_none() {
        contract_no = lines[start_idx + 1..]
            .iter()
            .map(|ln| norm_contract_line(ln))
            .find(|ln| is_contract_line(ln));
    }
    let contract_no = contract_no.ok_or(StatementError::ContractNumberNotFound)?;

    // Наименование: первая ОПФ-строка в пределах страницы 1 (~300 строк).
    let scan_limit = lines.len().min(start_idx + 300);
    let mut start_name_idx = None;
    for (j, raw) in lines.iter().enumerate().take(scan_limit).skip(start_idx + 1) {
        let ln = raw.trim();
        if ln.is_empty()
            || ln.starts_with("ККС ")
            || ln.starts_with("Дата с:")
            || ln.contains("ИНН")
            || ROWNO_DATE_RE.is_match(ln)
        {
            continue;
        }
        if is_opf_start(ln, opf) {
            start_name_idx = Some(j);
            break;
        }
    }

    let Some(start_name_idx) = start_name_idx else {
        // Fallback: имя может быть в строке шапки "Потребитель ...: ..."
        if let Some(name) = consumer_name_from_header(lines, start_idx) {
            return Ok((contract_no, finish_name(&name, opf)));
        }
        return Err(StatementError::DebtorNameNotFound {
            reason: "строка с ОПФ не найдена после номера договора".to_string(),
        });
    };

    // Собираем имя с строки ОПФ до маркера конца / табличной части.
    let mut name_parts: Vec<String> = Vec::new();
    for raw in &lines[start_name_idx..] {
        let ln = raw.trim();
        if ln.is_empty() {
            continue;
        }
        if STOP_NAME_MARKERS.iter().any(|m| ln.starts_with(m))
            || ln.starts_with("ККС ")
            || ln.starts_with("Дата с:")
            || ln.contains("ИНН")
            || ROWNO_DATE_RE.is_match(ln)
        {
            break;
        }
        let ln = cut_table_tail(ln);
        if ln.is_empty() {
            break;
        }
        name_parts.push(ln);
    }

    if name_parts.is_empty() {
        return Err(StatementError::DebtorNameNotFound {
            reason: "после строки ОПФ не нашлось текста имени".to_string(),
        });
    }

    let debtor_name = finish_name(&name_parts.join(" "), opf);

    if !HAS_LETTER_RE.is_match(&debtor_name) {
        if let Some(name) = consumer_name_from_header(lines, start_idx) {
            return Ok((contract_no, finish_name(&name, opf)));
        }
        return Err(StatementError::DebtorNameNotFound {
            reason: "в кандидате имени нет букв (похоже, захвачена строка таблицы)".to_string(),
        });
    }

    Ok((contract_no, debtor_name))
}

// Общая постобработка имени: дефекты аббревиатур, дефисы, обрезанная ОПФ,
// табличный хвост, словарь.
fn finish_name(name: &str, opf: &OpfRegistry) -> String {
    let name = collapse_abbr_glitches(name);
    let name = HYPHEN_RE.replace_all(name.trim(), "-").into_owned();
    let name = OOO_TRUNCATED_RE
        .replace(&name, "Общество с ограниченной ответственностью")
        .into_owned();
    let name = CUT_AFTER_ROWNO_DATE_RE.splitn(&name, 2).next().unwrap_or("").trim().to_string();
    opf.canonicalize_prefix(&name)
}

static CONSUMER_COLON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\s*(.+)$").expect("valid consumer colon regex"));
static CONSUMER_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bПотребитель\b").expect("valid consumer regex"));

/// Fallback-источник имени: «Потребитель [ТЭ|ГВС]: <имя>» (в той же или
/// следующей строке).
pub fn consumer_name_from_header(lines: &[String], start_from: usize) -> Option<String> {
    let mut i = start_from;
    while i < lines.len() {
        let ln = lines[i].trim();
        if ln.is_empty() {
            i += 1;
            continue;
        }

        if CONSUMER_WORD_RE.is_match(ln) {
            if let Some(caps) = CONSUMER_COLON_RE.captures(ln) {
                let name = caps.get(1).map_or("", |m| m.as_str()).trim();
                if HAS_LETTER_RE.is_match(name) {
                    return Some(name.to_string());
                }
            }
            for nxt in &lines[i + 1..] {
                let nxt = nxt.trim();
                if !nxt.is_empty() {
                    if HAS_LETTER_RE.is_match(nxt) {
                        return Some(nxt.to_string());
                    }
                    break;
                }
            }
        }
        i += 1;
    }
    None
}

/// Результат быстрой проверки справки для пакетной загрузки.
#[derive(Debug, Clone, Default)]
pub struct Inspect {
    /// Наименование должника, если нашлось.
    pub debtor_name: Option<String>,
    /// ИНН должника, если нашёлся.
    pub debtor_inn: Option<String>,
    /// Накопленные предупреждения.
    pub warnings: Vec<String>,
    /// Итоговая ошибка, если не найдено ни имя, ни ИНН.
    pub error: Option<String>,
}

static BAD_NAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^\s*Месяц,\s*год\b",
        r"(?i)^\s*Сумма\b",
        r"(?i)^\s*Дата\b",
        r"^\s*\d+(\s+\d+){2,}\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid bad-name regex"))
    .collect()
});

fn looks_like_table_header(name: &str) -> bool {
    let s = WS_RUN_RE.replace_all(name.trim(), " ").into_owned();
    if s.is_empty() {
        return true;
    }
    if BAD_NAME_PATTERNS.iter().any(|p| p.is_match(&s)) {
        return true;
    }
    let low = s.to_lowercase();
    s.chars().count() <= 20
        && (low.contains("месяц") || low.contains("год") || low.contains("сумма") || low.contains("дата"))
}

fn clean_name(s: &str) -> Option<String> {
    let s2 = WS_RUN_RE.replace_all(s.trim(), " ").into_owned();
    (!s2.is_empty()).then_some(s2)
}

/// Быстрая проверка: только имя и ИНН должника, без разбора таблиц.
/// Не возвращает ошибок — все проблемы копятся в `warnings`.
pub fn inspect(lines: &[String], opf: &OpfRegistry) -> Inspect {
    let mut out = Inspect::default();

    match find_inn(lines) {
        Ok(inn) => out.debtor_inn = Some(inn),
        Err(e) => out.warnings.push(e.to_string()),
    }

    // Имя: сначала «Потребитель …», но кандидата валидируем; затем нижний блок.
    let mut name = consumer_name_from_header(lines, 0).and_then(|n| clean_name(&n));
    if let Some(n) = &name {
        if looks_like_table_header(n) {
            out.warnings.push(format!(
                "кандидат имени отклонён (похоже на заголовок таблицы): {n:?}"
            ));
            name = None;
        }
    }
    if name.is_none() {
        match parse_bottom_block(lines, opf) {
            Ok((_contract, nm)) => name = clean_name(&nm),
            Err(e) => out.warnings.push(e.to_string()),
        }
    }

    match name {
        Some(n) => out.debtor_name = Some(n),
        None => out.warnings.push("наименование должника не найдено".to_string()),
    }

    if out.debtor_inn.is_none() && out.debtor_name.is_none() {
        out.error = Some("проверка не удалась: нет ни ИНН, ни наименования должника".to_string());
    }
    out
}
