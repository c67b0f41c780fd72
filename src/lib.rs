#![warn(missing_docs)]
//! Библиотека разбора справок о задолженности (текстовый слой PDF)
//! и расчёта неустойки по периодам.

mod calc;
mod error;
mod footnotes;
mod header;
mod schedule;
mod statement;
mod tables;
mod tokens;
mod types;

pub use crate::calc::{build_calc_rows, CalcParams, CalcRow};
pub use crate::error::StatementError;
pub use crate::footnotes::{detect_resource_kind, rate_share_footnote, ResourceKind};
pub use crate::header::{inspect, Inspect, OpfRegistry};
pub use crate::schedule::{split_by_boundaries, Category, Fraction, FractionSchedule};
pub use crate::statement::{verify_totals, StatementBuilder};
pub use crate::tables::parse_tables;
pub use crate::tokens::{
    money_token, normalize_line, normalize_lines, try_money_line, try_money_values,
};
pub use crate::types::*;
