//! Ядро разбора: восстановление реестра начислений и оплат из
//! линеаризованного текстового слоя таблиц справки.
//!
//! Работает в два прохода: сначала детерминированная склейка и
//! классификация строк в типизированный поток, затем сверка —
//! накопление помесячных сумм и разрешение неоднозначных колонок
//! тождеством `начислено = оплачено + долг`.
//!
//! Доменные правила формата:
//! - период начисления задаёт заголовок месяца («Ноябрь 2023 года»),
//!   внутренние строки `MM.YYYY` — месяцы проводки той же задолженности;
//! - внутри блока месяца напечатаны безымянные итоги «начислено»,
//!   «оплачено», «долг»;
//! - итог начислений месяца обязан совпасть с суммой проводок и
//!   найтись среди напечатанных значений, иначе разбор прерывается.

use std::collections::{BTreeMap, HashSet, VecDeque};

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::StatementError;
use crate::tokens::{
    adjustment_payable_month, adjustment_year, bare_date, bare_period, inline_payment,
    inline_posting, is_adjustment_start, is_totals_header, money_only_value, month_header,
    try_money_line, try_money_values,
};
use crate::types::{
    format_date, format_money, money_eq, quantize, AdjustmentCharge, AdjustmentKind,
    AdjustmentPayment, Charge, Money, MonthlyCharge, OrdinaryPayment, Payment, Period,
};

/// Извлекает `(начисления, оплаты)` из строк таблиц, сверяя восстановленные
/// суммы с напечатанными итогами месяца и документа.
pub fn parse_tables(lines: &[String]) -> Result<(Vec<Charge>, Vec<Payment>), StatementError> {
    let merged = premerge(lines);
    let rows = classify(&merged);
    Reconciler::new(rows).run()
}

// ---------------------------
// Проход 1: склейка и классификация
// ---------------------------

/// Детерминированная склейка разорванных колонок таблицы.
///
/// Часть PDF выводит колонки отдельными строками:
/// `05.2024` / `712 954.13` / `18.07.2019` / `-5 088.06`,
/// а итоги месяца — 2–3 подряд идущими «чисто денежными» строками.
/// Склеиваем только по строгим паттернам токенов, без эвристик:
/// `(период|дата) + денежная строка` и серии из 2–3 денежных строк.
fn premerge(lines: &[String]) -> Vec<String> {
    fn next_nonempty(lines: &[String], mut j: usize) -> Option<(usize, &str)> {
        while j < lines.len() {
            let s = lines[j].trim();
            if !s.is_empty() {
                return Some((j, s));
            }
            j += 1;
        }
        None
    }

    let n = lines.len();
    let mut out = Vec::new();
    let mut i = 0;
    while i < n {
        let s = lines[i].trim();
        if s.is_empty() {
            i += 1;
            continue;
        }

        if let Some((j, nxt)) = next_nonempty(lines, i + 1) {
            if (bare_date(s).is_some() || bare_period(s).is_some())
                && money_only_value(nxt).is_some()
            {
                out.push(format!("{s} {nxt}"));
                i = j + 1;
                continue;
            }
        }

        if money_only_value(s).is_some() {
            let mut run = vec![s.to_string()];
            let mut j = i + 1;
            while run.len() < 3 {
                let Some((k, nxt)) = next_nonempty(lines, j) else { break };
                if money_only_value(nxt).is_none() {
                    break;
                }
                run.push(nxt.to_string());
                j = k + 1;
            }
            if run.len() >= 2 {
                out.push(run.join(" "));
                i = j;
                continue;
            }
        }

        out.push(s.to_string());
        i += 1;
    }
    out
}

/// Классифицированная строка таблицы.
#[derive(Debug, Clone)]
enum LineClass {
    /// Заголовок месяца — начало нового блока начислений.
    MonthHeader(Period),
    /// Заголовок блока годовой корректировки с разрешёнными реквизитами.
    AdjustmentHeader { year: i32, payable: Period },
    /// Строка «ИТОГО ПО ПЕРИОДУ».
    TotalsHeader,
    /// Проводка `MM.YYYY сумма`.
    Posting { period: Period, amount: Money },
    /// Платёж `DD.MM.YYYY сумма`.
    Payment { date: NaiveDate, amount: Money },
    /// Одиночная дата (колонка дат или дата печати в подвале).
    BareDate(NaiveDate),
    /// Одиночный период (колонка периодов).
    BarePeriod(Period),
    /// Строка с денежными значениями.
    Amounts { values: Vec<Money>, only_money: bool },
    /// Прочий текст.
    Other,
}

#[derive(Debug, Clone)]
struct Row {
    class: LineClass,
    raw: String,
}

fn classify(lines: &[String]) -> Vec<Row> {
    let n = lines.len();
    let mut rows = Vec::with_capacity(n);

    for (i, raw) in lines.iter().enumerate() {
        let ln = raw.trim();

        let class = if let Some(period) = month_header(ln) {
            LineClass::MonthHeader(period)
        } else if is_adjustment_start(ln) {
            // Заголовок корректировки бывает разорван на несколько строк;
            // собираем хвост до данных (MM.YYYY) или следующего блока.
            let mut tail_parts = vec![ln.to_string()];
            for nxt in lines.iter().take(n).skip(i + 1) {
                if tail_parts.len() >= 20 {
                    break;
                }
                let nxt = nxt.trim();
                if nxt.is_empty() {
                    continue;
                }
                if bare_period(nxt).is_some() || month_header(nxt).is_some() || is_totals_header(nxt)
                {
                    break;
                }
                tail_parts.push(nxt.to_string());
            }
            let tail = tail_parts.join(" ");
            match (adjustment_year(&tail), adjustment_payable_month(&tail)) {
                (Some(year), Some(payable)) => LineClass::AdjustmentHeader { year, payable },
                _ => LineClass::Other,
            }
        } else if is_totals_header(ln) {
            LineClass::TotalsHeader
        } else if let Some((date, rest)) = inline_payment(ln) {
            match try_money_line(rest) {
                Some(amount) => LineClass::Payment { date, amount: quantize(amount) },
                None => LineClass::Other,
            }
        } else if let Some((period, rest)) = inline_posting(ln) {
            match try_money_line(rest) {
                Some(amount) => LineClass::Posting { period, amount: quantize(amount) },
                None => LineClass::Other,
            }
        } else if let Some(date) = bare_date(ln) {
            LineClass::BareDate(date)
        } else if let Some(period) = bare_period(ln) {
            LineClass::BarePeriod(period)
        } else {
            let values = try_money_values(ln);
            if values.is_empty() {
                LineClass::Other
            } else {
                let only_money = money_only_value(ln).is_some();
                LineClass::Amounts {
                    values: values.into_iter().map(quantize).collect(),
                    only_money,
                }
            }
        };

        rows.push(Row { class, raw: ln.to_string() });
    }
    rows
}

// ---------------------------
// Проход 2: сверка
// ---------------------------

/// Отложенная строка, встреченная до первого заголовка месяца.
#[derive(Debug, Clone)]
enum PendingRow {
    Payment { date: NaiveDate, amount: Money },
    Posting { period: Period, amount: Money },
}

/// Контекст блока годовой корректировки.
#[derive(Debug, Clone, Copy)]
struct AdjContext {
    year: i32,
    payable: Period,
    last_base: Option<Period>,
}

/// Помесячные накопители для выбора итогов «по совпадению чисел».
#[derive(Debug, Clone, Default)]
struct MonthAcc {
    base_posting: Money,
    corr_sum: Money,
    payments_sum: Money,
    candidates: Vec<Money>,
    groups: Vec<Vec<Money>>,
}

/// Разрешённые итоги месяца.
#[derive(Debug, Clone, Copy)]
struct MonthTotals {
    charged: Money,
    paid: Money,
    debt: Money,
    /// Сумма датированных строк оплат (после взаимозачёта пар).
    rows_sum: Money,
}

struct Reconciler {
    rows: Vec<Row>,
    charges: Vec<Charge>,
    payments: Vec<Payment>,
    current_month: Option<Period>,
    pending_rows: Vec<PendingRow>,
    pending_payment_dates: VecDeque<NaiveDate>,
    adj: Option<AdjContext>,
    accs: BTreeMap<Period, MonthAcc>,
    resolved: BTreeMap<Period, MonthTotals>,
    footer_date: Option<NaiveDate>,
    doc_totals: Option<(Money, Money, Money)>,
}

impl Reconciler {
    fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            charges: Vec::new(),
            payments: Vec::new(),
            current_month: None,
            pending_rows: Vec::new(),
            pending_payment_dates: VecDeque::new(),
            adj: None,
            accs: BTreeMap::new(),
            resolved: BTreeMap::new(),
            footer_date: None,
            doc_totals: None,
        }
    }

    fn run(mut self) -> Result<(Vec<Charge>, Vec<Payment>), StatementError> {
        self.footer_date = self.detect_footer_date();
        if let Some(d) = self.footer_date {
            log::debug!("повторяющаяся дата печати в подвале: {}", format_date(d));
        }

        self.scan()?;

        if let Some(prev) = self.current_month {
            let rows_sum = self.effective_paid_sum(prev);
            self.accs.entry(prev).or_default().payments_sum = rows_sum;
            self.finalize_month(prev)?;
        }

        // Обычные начисления: по одному на каждый заголовок месяца.
        for (&period, totals) in &self.resolved {
            self.charges.push(Charge::Monthly(MonthlyCharge { period, amount: totals.charged }));
        }

        if self.charges.is_empty() {
            return Err(StatementError::ChargesTableNotFound);
        }

        self.validate_doc_totals()?;
        self.normalize_and_validate_payments()?;

        Ok((self.charges, self.payments))
    }

    /// Дата печати в подвале: одиночная дата, повторяющаяся 3+ раз
    /// без денежной суммы рядом, исключается из кандидатов в платежи.
    fn detect_footer_date(&self) -> Option<NaiveDate> {
        let mut counts: Vec<(NaiveDate, usize)> = Vec::new();
        for (idx, row) in self.rows.iter().enumerate() {
            let LineClass::BareDate(date) = row.class else { continue };
            let looks_like_payment = self
                .rows
                .get(idx + 1)
                .is_some_and(|next| try_money_line(&next.raw).is_some());
            if !looks_like_payment {
                match counts.iter_mut().find(|(d, _)| *d == date) {
                    Some(entry) => entry.1 += 1,
                    None => counts.push((date, 1)),
                }
            }
        }
        let best = counts.iter().max_by_key(|(_, n)| *n)?;
        (best.1 >= 3).then_some(best.0)
    }

    fn scan(&mut self) -> Result<(), StatementError> {
        let n = self.rows.len();
        let mut i = 0;
        while i < n {
            match self.rows[i].class.clone() {
                LineClass::MonthHeader(period) => {
                    if let Some(prev) = self.current_month {
                        let rows_sum = self.effective_paid_sum(prev);
                        self.accs.entry(prev).or_default().payments_sum = rows_sum;
                        self.finalize_month(prev)?;
                    }
                    self.current_month = Some(period);

                    // Отложенные строки, встреченные до заголовка, теперь
                    // можно отнести к этому месяцу.
                    let pending = std::mem::take(&mut self.pending_rows);
                    for row in pending {
                        match row {
                            PendingRow::Payment { date, amount } => {
                                self.payments.push(Payment::Ordinary(OrdinaryPayment {
                                    date,
                                    amount,
                                    period,
                                }));
                                self.add_payment(amount);
                            }
                            PendingRow::Posting { period: src, amount } => {
                                self.add_posting(src, amount);
                                self.push_candidate(amount);
                            }
                        }
                    }

                    self.pending_payment_dates.clear();
                    self.adj = None;
                }

                LineClass::AdjustmentHeader { year, payable } => {
                    self.adj = Some(AdjContext { year, payable, last_base: None });
                }

                LineClass::TotalsHeader => {
                    self.doc_totals = self.parse_doc_totals_from(i + 1);
                }

                LineClass::Payment { date, amount } => self.take_payment(date, amount),

                LineClass::Posting { period, amount } => self.take_posting(period, amount),

                LineClass::BareDate(date) => {
                    if self.current_month.is_some() {
                        let amount = self.scan_column_payment_amount(i, date);
                        if self.footer_date == Some(date) && amount.is_none() {
                            i += 1;
                            continue;
                        }
                        if let Some(amount) = amount {
                            self.take_payment(date, amount);
                        }
                    }
                }

                LineClass::BarePeriod(period) => {
                    // Колонка периодов: сумма на одной из следующих строк.
                    let hi = (i + 10).min(n);
                    let amount = self.rows[i + 1..hi]
                        .iter()
                        .find_map(|row| try_money_line(&row.raw))
                        .map(quantize);
                    if let Some(amount) = amount {
                        self.take_posting(period, amount);
                    }
                }

                LineClass::Amounts { values, only_money } => {
                    if self.handle_amounts(i, &values, only_money) {
                        i += 1;
                        continue;
                    }
                    if values.len() >= 2 {
                        if let Some(month) = self.current_month {
                            self.accs.entry(month).or_default().groups.push(values.clone());
                        }
                    }
                    for v in &values {
                        self.push_candidate(*v);
                    }
                }

                LineClass::Other => {}
            }
            i += 1;
        }
        Ok(())
    }

    fn take_payment(&mut self, date: NaiveDate, amount: Money) {
        if let Some(adj) = self.adj {
            self.payments.push(Payment::Adjustment(AdjustmentPayment {
                date,
                amount,
                kind: AdjustmentKind::AnnualAdjustmentShare,
                adjustment_year: adj.year,
                payable_month: adj.payable,
                base_period: adj.last_base,
            }));
        } else if let Some(period) = self.current_month {
            self.payments.push(Payment::Ordinary(OrdinaryPayment { date, amount, period }));
            self.add_payment(amount);
        } else {
            self.pending_rows.push(PendingRow::Payment { date, amount });
        }
    }

    fn take_posting(&mut self, period: Period, amount: Money) {
        if let Some(adj) = &mut self.adj {
            adj.last_base = Some(period);
            let adj = *adj;
            self.charges.push(Charge::Adjustment(AdjustmentCharge {
                period,
                amount,
                kind: AdjustmentKind::AnnualAdjustmentShare,
                adjustment_year: adj.year,
                payable_month: adj.payable,
                base_period: Some(period),
            }));
        } else if self.current_month.is_some() {
            self.add_posting(period, amount);
            self.push_candidate(amount);
        } else {
            self.pending_rows.push(PendingRow::Posting { period, amount });
        }
    }

    /// Поиск суммы для одиночной даты: просмотр вперёд до логической границы.
    ///
    /// Строка с 2+ суммами — это итоги месяца, а не платёж; очередная
    /// одиночная дата переводит разбор в режим «колонки дат» (FIFO).
    fn scan_column_payment_amount(&mut self, i: usize, date: NaiveDate) -> Option<Money> {
        const MAX_LOOKAHEAD: usize = 200;
        let n = self.rows.len();
        let hi = n.min(i + 1 + MAX_LOOKAHEAD);

        for k in i + 1..hi {
            match &self.rows[k].class {
                LineClass::MonthHeader(_) | LineClass::BarePeriod(_) | LineClass::TotalsHeader => {
                    return None;
                }
                LineClass::BareDate(_) => {
                    // Колонка дат без сумм: ставим дату в очередь FIFO.
                    if self.footer_date != Some(date) {
                        self.pending_payment_dates.push_back(date);
                    }
                    return None;
                }
                _ => {}
            }

            let raw = &self.rows[k].raw;
            let vals = try_money_values(raw);
            if vals.len() >= 2 {
                return None;
            }

            let mut cand =
                if vals.len() == 1 { Some(vals[0]) } else { try_money_line(raw) };

            if let Some(c) = cand {
                // Разорванная строка итогов: «чисто денежная» строка, за которой
                // сразу идёт ещё одна денежная, — не платёж.
                if money_only_value(raw).is_some() {
                    if let Some(next) = self.rows.get(k + 1) {
                        let boundary = matches!(
                            next.class,
                            LineClass::MonthHeader(_)
                                | LineClass::BarePeriod(_)
                                | LineClass::TotalsHeader
                                | LineClass::BareDate(_)
                        );
                        if !boundary
                            && (try_money_values(&next.raw).len() >= 2
                                || money_only_value(&next.raw).is_some())
                        {
                            cand = None;
                        }
                    }
                    if cand.is_none() {
                        return None;
                    }
                }

                // Платёж не бывает нулевым; 0.00 рядом с датой — шум.
                if money_eq(quantize(c), Decimal::ZERO) {
                    return None;
                }
                return Some(quantize(c));
            }
        }
        None
    }

    /// Обработка одиночной суммы в режиме «колонки дат» (FIFO).
    /// Возвращает `true`, если строка израсходована как сумма платежа.
    fn handle_amounts(&mut self, i: usize, values: &[Money], only_money: bool) -> bool {
        let Some(month) = self.current_month else { return false };
        if self.adj.is_some()
            || self.pending_payment_dates.is_empty()
            || values.len() != 1
            || !only_money
        {
            return false;
        }
        let amount = values[0];
        if money_eq(amount, Decimal::ZERO) {
            return false;
        }

        // Если до границы блока впереди видна строка с 2+ суммами, мы уже
        // в зоне итогов месяца: одиночная сумма относится к итогам, а
        // очередь дат — дата печати/подвал, не платежи.
        const LOOKAHEAD: usize = 80;
        let hi = self.rows.len().min(i + 1 + LOOKAHEAD);
        let mut totals_ahead = false;
        for row in &self.rows[i + 1..hi] {
            match row.class {
                LineClass::MonthHeader(_)
                | LineClass::BarePeriod(_)
                | LineClass::TotalsHeader
                | LineClass::BareDate(_) => break,
                _ => {}
            }
            if try_money_values(&row.raw).len() >= 2 {
                totals_ahead = true;
                break;
            }
        }

        if totals_ahead {
            log::debug!(
                "очередь дат ({}) отброшена как шум: впереди итоги месяца {month}",
                self.pending_payment_dates.len()
            );
            self.pending_payment_dates.clear();
            return false;
        }

        if let Some(date) = self.pending_payment_dates.pop_front() {
            self.payments.push(Payment::Ordinary(OrdinaryPayment { date, amount, period: month }));
            self.add_payment(amount);
            return true;
        }
        false
    }

    fn push_candidate(&mut self, amount: Money) {
        if let Some(month) = self.current_month {
            self.accs.entry(month).or_default().candidates.push(amount);
        }
    }

    fn add_payment(&mut self, amount: Money) {
        let month = self.current_month.expect("payment outside month block");
        let acc = self.accs.entry(month).or_default();
        acc.payments_sum += amount;
    }

    fn add_posting(&mut self, period: Period, amount: Money) {
        let month = self.current_month.expect("posting outside month block");
        let acc = self.accs.entry(month).or_default();
        if period == month {
            acc.base_posting += amount;
        } else {
            acc.corr_sum += amount;
        }
    }

    /// Чистая сумма оплат месяца после взаимозачёта пар `+X/−X`
    /// с одинаковой датой и модулем суммы.
    fn effective_paid_sum(&self, month: Period) -> Money {
        let mut buckets: BTreeMap<(NaiveDate, Money), (usize, usize)> = BTreeMap::new();
        for p in &self.payments {
            let Payment::Ordinary(p) = p else { continue };
            if p.period != month {
                continue;
            }
            let amt = quantize(p.amount);
            let slot = buckets.entry((p.date, amt.abs())).or_default();
            if amt >= Decimal::ZERO {
                slot.0 += 1;
            } else {
                slot.1 += 1;
            }
        }

        let mut total = Decimal::ZERO;
        for ((_date, abs_amt), (pos, neg)) in buckets {
            let k = pos.min(neg);
            total += abs_amt * Decimal::from(pos - k);
            total -= abs_amt * Decimal::from(neg - k);
        }
        quantize(total)
    }

    /// Финализация месяца: выбор итогов из напечатанных кандидатов.
    fn finalize_month(&mut self, month: Period) -> Result<(), StatementError> {
        let acc = self.accs.get(&month).cloned().unwrap_or_default();
        let base = quantize(acc.base_posting);
        let corr = quantize(acc.corr_sum);
        let paid_rows = quantize(acc.payments_sum);

        let want_charged = quantize(base + corr);
        let want_debt = quantize(want_charged - paid_rows);

        let mut uniq: Vec<Money> = Vec::new();
        for &x in &acc.candidates {
            if uniq.iter().all(|&y| !money_eq(x, y)) {
                uniq.push(x);
            }
        }

        // 1) Итог начислений обязан найтись среди кандидатов блока (строго).
        let charged_total = uniq
            .iter()
            .copied()
            .filter(|&x| money_eq(x, want_charged))
            .min()
            .ok_or_else(|| StatementError::MonthTotalNotFound {
                period: month,
                base,
                correction: corr,
                expected: want_charged,
                candidates: uniq.clone(),
            })?;

        // 2) Итоги оплат и долга. Источник истины — напечатанные итоги блока:
        // датированные строки оплат в части PDF неполны.
        let mut paid_total: Option<Money> = None;
        let mut debt_total: Option<Money> = None;

        // Вариант формата A1: хвост месяца печатается как "X" и "X 0.00",
        // а склейка может породить синтетическую тройку [X, X, 0.00].
        // Если явная пара [X, 0.00] есть, предпочитаем её тройке.
        let has_pair_charged_zero = acc.groups.iter().any(|g| {
            g.len() == 2
                && ((money_eq(g[0], charged_total) && money_eq(g[1], Decimal::ZERO))
                    || (money_eq(g[1], charged_total) && money_eq(g[0], Decimal::ZERO)))
        });

        // 2.1) Явная тройка [начислено, оплачено, долг]; колонки не переставляем,
        // принимаем только при выполнении тождества.
        for g in &acc.groups {
            if g.len() == 3 && money_eq(g[0], charged_total) {
                if has_pair_charged_zero
                    && money_eq(g[1], charged_total)
                    && money_eq(g[2], Decimal::ZERO)
                {
                    continue;
                }
                if money_eq(quantize(g[1] + g[2]), charged_total) {
                    paid_total = Some(g[1]);
                    debt_total = Some(g[2]);
                    break;
                }
            }
        }

        // Пара [начислено, оплачено] неоднозначности не содержит.
        if paid_total.is_none() {
            for g in &acc.groups {
                if g.len() == 2 && money_eq(g[0], charged_total) {
                    paid_total = Some(g[1]);
                    debt_total = Some(quantize(charged_total - g[1]));
                    break;
                }
            }
        }

        // 2.2) Восстановление по тождеству: charged = a + b, оба числа
        // напечатаны среди кандидатов.
        if paid_total.is_none() || debt_total.is_none() {
            let mut valid_pairs: Vec<(Money, Money)> = Vec::new();
            for &a in &uniq {
                if a < Decimal::ZERO || a > charged_total {
                    continue;
                }
                let b = quantize(charged_total - a);
                if uniq.iter().any(|&x| money_eq(x, b)) {
                    valid_pairs.push((a, b));
                }
            }

            let mut pair_found: Option<(Money, Money)> = None;
            if paid_rows != Decimal::ZERO {
                // 1) ориентация, в которой долг совпадает с (начислено − оплаты по строкам)
                for &(a, b) in &valid_pairs {
                    if money_eq(b, want_debt) {
                        pair_found = Some((a, b));
                        break;
                    }
                    if money_eq(a, want_debt) {
                        pair_found = Some((b, a));
                        break;
                    }
                }
                // 2) иначе оплата == начислено − ожидаемый долг
                if pair_found.is_none() {
                    let target_paid = quantize(charged_total - want_debt);
                    for &(a, b) in &valid_pairs {
                        if money_eq(a, target_paid) {
                            pair_found = Some((a, b));
                            break;
                        }
                        if money_eq(b, target_paid) {
                            pair_found = Some((b, a));
                            break;
                        }
                    }
                }
                // 3) в крайнем случае — прямое совпадение с суммой строк
                if pair_found.is_none() {
                    for &(a, b) in &valid_pairs {
                        if money_eq(a, paid_rows) {
                            pair_found = Some((a, b));
                            break;
                        }
                        if money_eq(b, paid_rows) {
                            pair_found = Some((b, a));
                            break;
                        }
                    }
                }
            } else if !valid_pairs.is_empty() {
                // Нет датированных оплат. Доменное правило: необъяснённый 0.00
                // в таком месяце означает «оплачено 0, долг = начислено», а не
                // наоборот — оплаты месяца зачтены в другие обязательства.
                let has_zero = uniq.iter().any(|&x| money_eq(x, Decimal::ZERO));
                if has_zero {
                    for &(a, b) in &valid_pairs {
                        if money_eq(a, Decimal::ZERO) {
                            pair_found = Some((a, b));
                            break;
                        }
                        if money_eq(b, Decimal::ZERO) {
                            pair_found = Some((Decimal::ZERO, a));
                            break;
                        }
                    }
                }
                if pair_found.is_none() {
                    pair_found = Some(valid_pairs[0]);
                }
            }

            if let Some((p, d)) = pair_found {
                paid_total = Some(p);
                debt_total = Some(d);
            }
        }

        // 2.3) Подтверждение суммой датированных строк (не принуждение).
        if paid_rows != Decimal::ZERO {
            if let Some(p) = paid_total {
                if !money_eq(p, paid_rows)
                    && debt_total
                        .is_some_and(|d| money_eq(quantize(charged_total - d), paid_rows))
                {
                    paid_total = Some(paid_rows);
                }
            }
        }

        // 3) Долг: производный от оплат либо прямое совпадение с ожидаемым.
        if debt_total.is_none() {
            if let Some(p) = paid_total {
                debt_total = Some(quantize(charged_total - p));
            } else if paid_rows != Decimal::ZERO {
                debt_total =
                    uniq.iter().copied().filter(|&x| money_eq(x, want_debt)).min();
            }
        }

        // 4) Оба итога обязаны определиться — дальше тождества не гадаем.
        let paid_total = paid_total.ok_or_else(|| StatementError::MonthPaidTotalNotFound {
            period: month,
            payments_sum: paid_rows,
            candidates: uniq.clone(),
        })?;
        let debt_total = debt_total.ok_or_else(|| StatementError::MonthDebtTotalNotFound {
            period: month,
            charged: charged_total,
            paid: paid_total,
            candidates: uniq.clone(),
        })?;

        // 5) Согласованность напечатанных итогов между собой.
        let expected_debt = quantize(charged_total - paid_total);
        if !money_eq(expected_debt, debt_total) {
            return Err(StatementError::MonthTotalsIncoherent {
                period: month,
                charged: charged_total,
                paid: paid_total,
                debt: debt_total,
            });
        }

        self.resolved.insert(
            month,
            MonthTotals { charged: charged_total, paid: paid_total, debt: debt_total, rows_sum: paid_rows },
        );
        Ok(())
    }

    /// Итоги «ИТОГО ПО ПЕРИОДУ»: суммы разорваны по строкам и могут
    /// повторяться, поэтому выбираем тройку, минимизирующую
    /// `|начислено − оплачено − долг|`, а не первые три числа.
    fn parse_doc_totals_from(&self, i_start: usize) -> Option<(Money, Money, Money)> {
        const MAX_LINES: usize = 10;
        const MAX_VALS: usize = 10;

        let mut found: Vec<Money> = Vec::new();
        let mut j = i_start;
        let mut lines_seen = 0;
        while j < self.rows.len() && lines_seen < MAX_LINES && found.len() < MAX_VALS {
            for v in try_money_values(&self.rows[j].raw) {
                found.push(quantize(v));
                if found.len() >= MAX_VALS {
                    break;
                }
            }
            j += 1;
            lines_seen += 1;
        }

        if found.len() < 3 {
            return None;
        }

        let mut best: Option<(Money, Money, Money)> = None;
        let mut best_score: Option<(Money, Money, Money)> = None;
        for &a in &found {
            for &b in &found {
                for &c in &found {
                    let resid = quantize((a - b - c).abs());
                    let score = (resid, b.abs(), -a);
                    if best_score.is_none_or(|bs| score < bs) {
                        best = Some((a, b, c));
                        best_score = Some(score);
                    }
                }
            }
        }

        if let (Some(best), Some(score)) = (best, best_score) {
            if score.0 <= Decimal::new(2, 2) {
                return Some(best);
            }
        }
        // Fallback: первые три значения.
        Some((found[0], found[1], found[2]))
    }

    fn aa_sums(&self) -> (Money, Money) {
        let aa_charged: Money = self
            .charges
            .iter()
            .filter(|c| matches!(c, Charge::Adjustment(_)))
            .map(Charge::amount)
            .sum();
        let aa_paid: Money = self
            .payments
            .iter()
            .filter(|p| matches!(p, Payment::Adjustment(_)))
            .map(Payment::amount)
            .sum();
        (quantize(aa_charged), quantize(aa_paid))
    }

    /// Проверка документа: сумма итогов месяцев (с долями корректировок)
    /// против «ИТОГО ПО ПЕРИОДУ», с прозрачной перестановкой перепутанных
    /// колонок «оплачено»/«долг» и именованным ремонтом нулевых оплат.
    fn validate_doc_totals(&mut self) -> Result<(), StatementError> {
        let Some((doc_charged, mut doc_paid, mut doc_debt)) = self.doc_totals else {
            return Ok(());
        };

        let (aa_charged, aa_paid) = self.aa_sums();

        let sum_of = |f: fn(&MonthTotals) -> Money, resolved: &BTreeMap<Period, MonthTotals>| {
            resolved.values().map(f).sum::<Money>()
        };

        let sum_ch = quantize(sum_of(|t| t.charged, &self.resolved) + aa_charged);
        let mut sum_pd = quantize(sum_of(|t| t.paid, &self.resolved) + aa_paid);
        let mut sum_db =
            quantize(sum_of(|t| t.debt, &self.resolved) + (aa_charged - aa_paid));

        // Обе перестановки могут удовлетворять тождеству, и выбор тройки мог
        // взять «оплачено»/«долг» наоборот; если суммы периодов однозначно
        // указывают на обратное соответствие — переставляем.
        if (!money_eq(sum_pd, doc_paid) || !money_eq(sum_db, doc_debt))
            && money_eq(sum_pd, doc_debt)
            && money_eq(sum_db, doc_paid)
            && money_eq(quantize(doc_paid + doc_debt), doc_charged)
        {
            std::mem::swap(&mut doc_paid, &mut doc_debt);
        }

        if !money_eq(sum_ch, doc_charged) {
            return Err(StatementError::DocTotalsMismatchCharged {
                sum_periods: sum_ch,
                doc_total: doc_charged,
            });
        }

        if !money_eq(sum_pd, doc_paid) {
            let mut delta = quantize(sum_pd - doc_paid);

            // Именованный ремонт «нулевых оплат»: месяцы без датированных
            // строк оплат, разрешённые как [оплачено=начислено, долг=0]
            // (вариант A1), на деле означают [оплачено=0, долг=начислено].
            // Если точное подмножество таких месяцев объясняет расхождение,
            // переворачиваем их и пересчитываем суммы.
            if delta > Decimal::ZERO {
                let flipped = self.repair_zero_paid_reclassification(delta);
                if !flipped.is_empty() {
                    log::info!(
                        "итог оплат восстановлен переразметкой месяцев: {}",
                        flipped.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                    );
                    sum_pd = quantize(sum_of(|t| t.paid, &self.resolved) + aa_paid);
                    sum_db = quantize(
                        sum_of(|t| t.debt, &self.resolved) + (aa_charged - aa_paid),
                    );
                    delta = quantize(sum_pd - doc_paid);
                }
            }

            if !money_eq(sum_pd, doc_paid) {
                let diagnostics = self.paid_mismatch_diagnostics(sum_pd, doc_paid, delta);
                return Err(StatementError::DocTotalsMismatchPaid {
                    sum_periods: sum_pd,
                    doc_total: doc_paid,
                    delta,
                    diagnostics,
                });
            }
        }

        if !money_eq(sum_db, doc_debt) {
            return Err(StatementError::DocTotalsMismatchDebt {
                sum_periods: sum_db,
                doc_total: doc_debt,
            });
        }

        Ok(())
    }

    /// Поиск точного подмножества месяцев-кандидатов (рюкзак по копейкам),
    /// чьи начисления в сумме дают `delta`; найденные месяцы переворачиваются
    /// в `[оплачено=0, долг=начислено]`. Возвращает перевёрнутые месяцы.
    fn repair_zero_paid_reclassification(&mut self, delta: Money) -> Vec<Period> {
        let cents = |x: Money| -> i64 {
            (quantize(x) * Decimal::from(100)).to_i64().unwrap_or(i64::MAX)
        };

        let mut flip_candidates: Vec<(Period, Money)> = self
            .resolved
            .iter()
            .filter(|(_, t)| {
                money_eq(t.rows_sum, Decimal::ZERO)
                    && money_eq(t.paid, t.charged)
                    && money_eq(t.debt, Decimal::ZERO)
                    && t.charged > Decimal::ZERO
            })
            .map(|(&m, t)| (m, t.charged))
            .collect();
        // крупные суммы первыми, при равенстве — ранние месяцы
        flip_candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let target = cents(delta.abs());
        let mut dp: BTreeMap<i64, Vec<Period>> = BTreeMap::from([(0, Vec::new())]);
        for (m, ch) in flip_candidates {
            let val = cents(ch);
            let mut new = dp.clone();
            for (&s, picked) in &dp {
                let ns = s + val;
                if ns > target || new.contains_key(&ns) {
                    continue;
                }
                let mut next = picked.clone();
                next.push(m);
                new.insert(ns, next);
                if ns == target {
                    break;
                }
            }
            dp = new;
            if dp.contains_key(&target) {
                break;
            }
        }

        let Some(months) = dp.remove(&target).filter(|m| !m.is_empty()) else {
            return Vec::new();
        };
        for m in &months {
            if let Some(t) = self.resolved.get_mut(m) {
                t.paid = Decimal::ZERO;
                t.debt = t.charged;
            }
        }
        months
    }

    fn paid_mismatch_diagnostics(&self, sum_pd: Money, doc_paid: Money, delta: Money) -> Vec<String> {
        let rows: Vec<(Period, MonthTotals)> =
            self.resolved.iter().map(|(&m, &t)| (m, t)).collect();

        let score = |t: &MonthTotals| -> Money {
            let implied_debt = quantize(t.charged - t.paid);
            let mut s = (implied_debt - t.debt).abs();
            if t.rows_sum != Decimal::ZERO {
                s += (t.paid - t.rows_sum).abs();
            }
            s
        };
        let mut rows_sorted = rows.clone();
        rows_sorted.sort_by(|a, b| score(&b.1).cmp(&score(&a.1)));

        let mut out = vec![format!(
            "doc totals mismatch (paid): sum(months)={} vs 'ИТОГО ПО ПЕРИОДУ'={} (delta={})",
            format_money(sum_pd),
            format_money(doc_paid),
            format_money(delta)
        )];

        let suspects: Vec<String> = rows
            .iter()
            .filter(|(_, t)| money_eq(t.paid, delta.abs()))
            .map(|(m, _)| m.to_string())
            .collect();
        if !suspects.is_empty() {
            out.push(format!("Suspect month(s) where paid_total≈|delta|: {}", suspects.join(", ")));
        }

        let no_rows_nonzero: Vec<String> = rows
            .iter()
            .filter(|(_, t)| {
                money_eq(t.rows_sum, Decimal::ZERO) && !money_eq(t.paid, Decimal::ZERO)
            })
            .map(|(m, _)| m.to_string())
            .take(12)
            .collect();
        if !no_rows_nonzero.is_empty() {
            out.push(format!(
                "Months with paid_rows=0 but paid_total>0: {}",
                no_rows_nonzero.join(", ")
            ));
        }

        out.push("Top months by inconsistency:".to_string());
        for (m, t) in rows_sorted.iter().take(12) {
            out.push(format!(
                "  {m}: charged={} paid_total={} debt_total={} paid_rows={} (charged-paid_total={})",
                format_money(t.charged),
                format_money(t.paid),
                format_money(t.debt),
                format_money(t.rows_sum),
                format_money(quantize(t.charged - t.paid)),
            ));
        }
        out
    }

    /// Нормализация обычных оплат и итоговая проверка по периодам:
    /// нулевые строки — шум; пары `+X/−X` одной даты взаимно уничтожаются
    /// (минимальным числом, в исходном порядке); после этого сумма строк
    /// периода должна совпасть с напечатанным итогом оплат.
    fn normalize_and_validate_payments(&mut self) -> Result<(), StatementError> {
        let mut by_period: BTreeMap<Period, Vec<(usize, NaiveDate, Money)>> = BTreeMap::new();
        for (idx, p) in self.payments.iter().enumerate() {
            let Payment::Ordinary(p) = p else { continue };
            by_period.entry(p.period).or_default().push((idx, p.date, quantize(p.amount)));
        }

        let mut to_remove: HashSet<usize> = HashSet::new();

        // 1) нулевые суммы
        for rows in by_period.values() {
            for &(idx, _, amt) in rows {
                if money_eq(amt, Decimal::ZERO) {
                    to_remove.insert(idx);
                }
            }
        }

        // 2) взаимозачёт пар противоположного знака
        for rows in by_period.values() {
            let mut buckets: BTreeMap<(NaiveDate, Money), (Vec<usize>, Vec<usize>)> =
                BTreeMap::new();
            for &(idx, date, amt) in rows {
                if to_remove.contains(&idx) {
                    continue;
                }
                let slot = buckets.entry((date, amt.abs())).or_default();
                if amt >= Decimal::ZERO {
                    slot.0.push(idx);
                } else {
                    slot.1.push(idx);
                }
            }
            for (_, (pos, neg)) in buckets {
                let k = pos.len().min(neg.len());
                for idx in pos.into_iter().take(k).chain(neg.into_iter().take(k)) {
                    to_remove.insert(idx);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut idx = 0;
            self.payments.retain(|_| {
                let keep = !to_remove.contains(&idx);
                idx += 1;
                keep
            });
        }

        // 3) строгая проверка: сумма оставшихся строк == итог оплат периода
        let mut sum_rows: BTreeMap<Period, Money> = BTreeMap::new();
        for p in &self.payments {
            let Payment::Ordinary(p) = p else { continue };
            let entry = sum_rows.entry(p.period).or_insert(Decimal::ZERO);
            *entry = quantize(*entry + quantize(p.amount));
        }

        for (&period, totals) in &self.resolved {
            let paid_total = quantize(totals.paid);
            let s = quantize(sum_rows.get(&period).copied().unwrap_or(Decimal::ZERO));
            if money_eq(s, paid_total) {
                continue;
            }

            // Отрицательная чистая сумма строк — только сторнировочные
            // артефакты, обычные оплаты периода в справке не расписаны;
            // равенство с итогом здесь непроверяемо.
            if s < Decimal::ZERO {
                log::warn!(
                    "период {period}: строки оплат ({}) — сторно без росписи оплат, \
                     проверка суммы строк пропущена (итог {})",
                    format_money(s),
                    format_money(paid_total)
                );
                continue;
            }

            let delta = quantize(s - paid_total);
            let rows_dbg: Vec<String> = self
                .payments
                .iter()
                .filter_map(|p| match p {
                    Payment::Ordinary(p) if p.period == period => {
                        Some(format!("{} {}", format_date(p.date), format_money(p.amount)))
                    }
                    _ => None,
                })
                .collect();

            return Err(StatementError::PaymentsPeriodSumMismatch {
                period,
                sum_rows: s,
                paid_total,
                delta,
                rows: rows_dbg,
            });
        }

        Ok(())
    }
}
