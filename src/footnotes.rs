//! Сноски-обоснования доли ставки: ссылка на норму закона по виду ресурса
//! (из номера договора) и категории должника.

use crate::schedule::Category;

/// Вид ресурса по договору.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Тепловая энергия (суффикс «ТЭ» в номере договора).
    HeatEnergy,
    /// Горячее водоснабжение («ГВС»/«ГВ»).
    HotWater,
    /// Не определён — цитируются оба закона.
    Other,
}

/// Определяет вид ресурса по номеру договора.
pub fn detect_resource_kind(contract_number: &str) -> ResourceKind {
    let s = contract_number.to_uppercase();
    if s.contains("ТЭ") {
        ResourceKind::HeatEnergy
    } else if s.contains("ГВС") || s.contains("ГВ") {
        ResourceKind::HotWater
    } else {
        ResourceKind::Other
    }
}

fn p190(part: &str) -> String {
    format!("ч. {part} ст. 15 Федерального закона от 27.07.2010 № 190-ФЗ «О теплоснабжении»")
}

fn p416(part: &str) -> String {
    format!(
        "ч. {part} ст. 13 Федерального закона от 07.12.2011 № 416-ФЗ «О водоснабжении и водоотведении»"
    )
}

const P329_SUFFIX: &str = " с учетом ограничений величины ставки, предусмотренных \
постановлением Правительства РФ от 18.03.2025 № 329";

/// Строит сноску «* доля ставки определена …» для подвала отчёта.
///
/// ТЭ — только 190-ФЗ, ГВС — только 416-ФЗ, иначе оба закона; номер части
/// статьи и необходимость оговорки по ПП № 329 зависят от категории.
pub fn rate_share_footnote(contract_number: &str, category: Category) -> String {
    let kind = detect_resource_kind(contract_number);

    let (text, need_329) = match kind {
        ResourceKind::HeatEnergy => {
            let (part, need_329) = match category {
                Category::Other => ("9.1", false),
                Category::HousingCoop | Category::ManagingOrganization => ("9.2", true),
                Category::NonResidentialOwners => ("9.4", false),
                Category::ResidentialOwners => ("9.4", true),
            };
            (p190(part), need_329)
        }
        ResourceKind::HotWater => {
            let (part, need_329) = match category {
                Category::Other => ("6.2", false),
                Category::HousingCoop => ("6.3", true),
                Category::ManagingOrganization => ("6.4", true),
                Category::NonResidentialOwners => ("6.5", false),
                Category::ResidentialOwners => ("6.5", true),
            };
            (p416(part), need_329)
        }
        ResourceKind::Other => {
            let part_190 = match category {
                Category::Other => "9.1",
                Category::HousingCoop => "9.2",
                Category::ManagingOrganization => "9.3",
                Category::NonResidentialOwners | Category::ResidentialOwners => "9.4",
            };
            let part_416 = match category {
                Category::Other => "6.2",
                Category::HousingCoop => "6.3",
                Category::ManagingOrganization => "6.4",
                Category::NonResidentialOwners | Category::ResidentialOwners => "6.5",
            };
            let need_329 = matches!(
                category,
                Category::HousingCoop | Category::ManagingOrganization | Category::ResidentialOwners
            );
            (format!("{}, {}", p190(part_190), p416(part_416)), need_329)
        }
    };

    let suffix = if need_329 { P329_SUFFIX } else { "" };
    format!("* доля ставки определена в соответствии с {text}{suffix}.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_resource_kind_from_contract_number() {
        assert_eq!(detect_resource_kind("01.000178 ТЭ"), ResourceKind::HeatEnergy);
        assert_eq!(detect_resource_kind("09.346737кГВ"), ResourceKind::HotWater);
        assert_eq!(detect_resource_kind("44039"), ResourceKind::Other);
    }

    #[test]
    fn heat_energy_cites_190_fz_only() {
        let s = rate_share_footnote("01.000178 ТЭ", Category::Other);
        assert!(s.starts_with("* доля ставки определена в соответствии с ч. 9.1 ст. 15"));
        assert!(s.contains("190-ФЗ"));
        assert!(!s.contains("416-ФЗ"));
        assert!(!s.contains("№ 329"));
    }

    #[test]
    fn hot_water_managing_organization_gets_rate_cap_suffix() {
        let s = rate_share_footnote("09.346737кГВ", Category::ManagingOrganization);
        assert!(s.contains("ч. 6.4 ст. 13"));
        assert!(s.contains("416-ФЗ"));
        assert!(s.contains("№ 329"));
    }

    #[test]
    fn unknown_resource_cites_both_laws() {
        let s = rate_share_footnote("44039", Category::HousingCoop);
        assert!(s.contains("190-ФЗ"));
        assert!(s.contains("416-ФЗ"));
        assert!(s.contains("ч. 9.2 ст. 15"));
        assert!(s.contains("ч. 6.3 ст. 13"));
        assert!(s.contains("№ 329"));
    }
}
