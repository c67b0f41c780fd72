//! Категории должников и графики долей ключевой ставки по дням просрочки.

use std::fmt;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

/// Доля ключевой ставки — точная рациональная дробь (например, 1/130).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    /// Числитель.
    pub numer: u32,
    /// Знаменатель.
    pub denom: u32,
}

impl Fraction {
    /// Нулевая доля (просрочка ещё не началась).
    pub const ZERO: Self = Self { numer: 0, denom: 1 };

    /// Создаёт дробь `numer/denom`.
    pub const fn new(numer: u32, denom: u32) -> Self {
        Self { numer, denom }
    }

    /// Нулевая ли доля.
    pub const fn is_zero(self) -> bool {
        self.numer == 0
    }

    /// Десятичное значение доли для арифметики.
    pub fn to_decimal(self) -> Decimal {
        Decimal::from(self.numer) / Decimal::from(self.denom)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            write!(f, "0")
        } else {
            write!(f, "{}/{}", self.numer, self.denom)
        }
    }
}

const F_1_130: Fraction = Fraction::new(1, 130);
const F_1_170: Fraction = Fraction::new(1, 170);
const F_1_300: Fraction = Fraction::new(1, 300);

/// График долей: `(первый день, последний день включительно, доля)`.
/// `None` в конце сегмента — «и далее без ограничения».
#[derive(Debug, Clone, Copy)]
pub struct FractionSchedule {
    segments: &'static [(u32, Option<u32>, Fraction)],
}

impl FractionSchedule {
    /// Доля для дня просрочки `day_no` (день 1 — дата начала просрочки).
    pub fn fraction_for_day(&self, day_no: i64) -> Fraction {
        for &(start, end, frac) in self.segments {
            if day_no >= i64::from(start) && end.is_none_or(|e| day_no <= i64::from(e)) {
                return frac;
            }
        }
        Fraction::ZERO
    }

    /// Дни, в которые начинается новый сегмент (кроме первого).
    pub fn boundary_days(&self) -> Vec<u32> {
        let mut days: Vec<u32> =
            self.segments.iter().map(|&(start, _, _)| start).filter(|&d| d != 1).collect();
        days.sort_unstable();
        days.dedup();
        days
    }
}

// Прочие (и собственники нежилых помещений): всегда 1/130.
static SCHED_OTHER: FractionSchedule = FractionSchedule { segments: &[(1, None, F_1_130)] };

// ТСЖ/ЖСК/ЖК (и собственники жилых помещений):
// 1..30 — 0; 31..90 — 1/300; 91+ — 1/130.
static SCHED_HOUSING: FractionSchedule = FractionSchedule {
    segments: &[(1, Some(30), Fraction::ZERO), (31, Some(90), F_1_300), (91, None, F_1_130)],
};

// Управляющая организация: 1..60 — 1/300; 61..90 — 1/170; 91+ — 1/130.
static SCHED_MANAGING: FractionSchedule = FractionSchedule {
    segments: &[(1, Some(60), F_1_300), (61, Some(90), F_1_170), (91, None, F_1_130)],
};

/// Категория должника, определяющая график долей и сноску-обоснование.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Прочие потребители.
    Other,
    /// ТСЖ, ЖСК, жилищные кооперативы.
    HousingCoop,
    /// Управляющая организация.
    ManagingOrganization,
    /// Собственники жилых помещений в МКД.
    ResidentialOwners,
    /// Собственники нежилых помещений в МКД.
    NonResidentialOwners,
}

impl Category {
    /// Приводит свободный текст категории к канонической (без учёта регистра).
    /// Пустые и неизвестные значения считаются «Прочие».
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "тсж, жск, жк" | "тсж" | "жск" | "жк" | "жилищный кооператив" => Self::HousingCoop,
            "ук" | "управляющая организация" | "управляющие организации" => {
                Self::ManagingOrganization
            }
            "собственники жилых помещений в мкд" | "собственник жилого помещения в мкд" => {
                Self::ResidentialOwners
            }
            "собственники нежилых помещений в мкд" | "собственник нежилого помещения в мкд" => {
                Self::NonResidentialOwners
            }
            _ => Self::Other,
        }
    }

    /// Каноническое наименование категории.
    pub const fn canonical_name(self) -> &'static str {
        match self {
            Self::Other => "Прочие",
            Self::HousingCoop => "ТСЖ, ЖСК, ЖК",
            Self::ManagingOrganization => "Управляющая организация",
            Self::ResidentialOwners => "Собственники жилых помещений в МКД",
            Self::NonResidentialOwners => "Собственники нежилых помещений в МКД",
        }
    }

    /// График долей для категории.
    pub fn schedule(self) -> &'static FractionSchedule {
        match self {
            Self::Other | Self::NonResidentialOwners => &SCHED_OTHER,
            Self::HousingCoop | Self::ResidentialOwners => &SCHED_HOUSING,
            Self::ManagingOrganization => &SCHED_MANAGING,
        }
    }
}

/// Делит `[start..end]` на подынтервалы с постоянной долей.
///
/// `base_overdue_start` соответствует дню просрочки 1; границы сегментов
/// графика переводятся в абсолютные даты, внутри подынтервала доля
/// постоянна по построению.
pub fn split_by_boundaries(
    category: Category,
    start: NaiveDate,
    end: NaiveDate,
    base_overdue_start: NaiveDate,
) -> Vec<(NaiveDate, NaiveDate, Fraction)> {
    if end < start {
        return Vec::new();
    }
    let sched = category.schedule();

    let mut boundary_dates: Vec<NaiveDate> = sched
        .boundary_days()
        .into_iter()
        .map(|day| base_overdue_start + Duration::days(i64::from(day) - 1))
        .filter(|bd| (start..=end).contains(bd))
        .collect();
    boundary_dates.sort_unstable();

    let day_no = |d: NaiveDate| (d - base_overdue_start).num_days() + 1;

    let mut segments = Vec::new();
    let mut cur = start;
    for bd in boundary_dates {
        if bd > cur {
            segments.push((cur, bd - Duration::days(1), sched.fraction_for_day(day_no(cur))));
            cur = bd;
        }
    }
    if cur <= end {
        segments.push((cur, end, sched.fraction_for_day(day_no(cur))));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%d.%m.%Y").unwrap()
    }

    #[test]
    fn normalizes_aliases_case_insensitively() {
        assert_eq!(Category::normalize("УК"), Category::ManagingOrganization);
        assert_eq!(Category::normalize("тсж"), Category::HousingCoop);
        assert_eq!(Category::normalize("Прочие"), Category::Other);
        assert_eq!(
            Category::normalize("Собственники нежилых помещений в МКД"),
            Category::NonResidentialOwners
        );
        assert_eq!(Category::normalize(""), Category::Other);
        assert_eq!(Category::normalize("неизвестно"), Category::Other);
    }

    #[test]
    fn managing_schedule_boundaries() {
        let sched = Category::ManagingOrganization.schedule();
        assert_eq!(sched.fraction_for_day(1), Fraction::new(1, 300));
        assert_eq!(sched.fraction_for_day(60), Fraction::new(1, 300));
        assert_eq!(sched.fraction_for_day(61), Fraction::new(1, 170));
        assert_eq!(sched.fraction_for_day(90), Fraction::new(1, 170));
        assert_eq!(sched.fraction_for_day(91), Fraction::new(1, 130));
        assert_eq!(sched.boundary_days(), vec![61, 91]);
    }

    #[test]
    fn housing_schedule_starts_at_zero() {
        let sched = Category::HousingCoop.schedule();
        assert_eq!(sched.fraction_for_day(30), Fraction::ZERO);
        assert_eq!(sched.fraction_for_day(31), Fraction::new(1, 300));
        assert_eq!(sched.fraction_for_day(91), Fraction::new(1, 130));
    }

    #[test]
    fn other_is_flat_one_130th() {
        let segs =
            split_by_boundaries(Category::Other, d("01.02.2024"), d("01.04.2024"), d("01.02.2024"));
        assert_eq!(segs, vec![(d("01.02.2024"), d("01.04.2024"), Fraction::new(1, 130))]);
    }

    #[test]
    fn split_emits_contiguous_segments_at_schedule_breakpoints() {
        let base = d("10.01.2024");
        let segs = split_by_boundaries(
            Category::ManagingOrganization,
            base,
            d("30.06.2024"),
            base,
        );
        // день 61 — 10.03.2024, день 91 — 09.04.2024
        assert_eq!(
            segs,
            vec![
                (d("10.01.2024"), d("09.03.2024"), Fraction::new(1, 300)),
                (d("10.03.2024"), d("08.04.2024"), Fraction::new(1, 170)),
                (d("09.04.2024"), d("30.06.2024"), Fraction::new(1, 130)),
            ]
        );
        // сегменты смежны и без разрывов
        for pair in segs.windows(2) {
            assert_eq!(pair[0].1 + Duration::days(1), pair[1].0);
        }
    }

    #[test]
    fn fraction_display() {
        assert_eq!(Fraction::new(1, 130).to_string(), "1/130");
        assert_eq!(Fraction::ZERO.to_string(), "0");
    }
}
