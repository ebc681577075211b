//! External risk-score (REBOOT) feature
//!
//! Scores arrive as decimal-comma text. Rows sharing the full grouping key are
//! summed, then each entity keeps its most recent group; the retained raw score
//! is mapped to a probability with the logistic function.

use std::collections::HashMap;

use chrono::NaiveDate;
use polars::prelude::*;

use super::{add_nullable, KeyGroups};
use crate::error::PdoResult;
use crate::pipeline::columns::{key_values, require_columns, text_values};
use crate::pipeline::join::{FeatureTable, FeatureValues};
use crate::pipeline::scoring::sigmoid;

pub const REBOOT_TABLE: &str = "reboot";
pub const REBOOT_KEY: &str = "i_uniq_kpi";
pub const REBOOT_SCORE: &str = "q_score";
pub const REBOOT_DATE: &str = "d_histo";
pub const REBOOT_SCORE_OUTPUT: &str = "reboot_score";
pub const REBOOT_PROBA_OUTPUT: &str = "reboot_score2";

/// Grouping attributes besides the entity key; the date comes first.
pub const REBOOT_GROUP_COLUMNS: [&str; 6] = [
    REBOOT_DATE,
    "c_int_modele",
    "d_rev_notation",
    "c_not",
    "c_type_prsne",
    "b_bddf_gestionnaire",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a score written with a decimal comma (`"1,5"`).
///
/// Anything that is not a finite number after comma-to-point substitution
/// yields `None`.
pub fn parse_decimal_comma(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace(',', ".");
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok())
}

struct ScoreGroup {
    entity: String,
    date: Option<NaiveDate>,
    total: Option<f64>,
}

#[derive(Default)]
struct Latest {
    group: Option<usize>,
}

/// Reduce the score history to one raw score and probability per entity.
pub fn aggregate_reboot_scores(reboot: &DataFrame) -> PdoResult<FeatureTable> {
    let mut required = vec![REBOOT_KEY, REBOOT_SCORE];
    required.extend(REBOOT_GROUP_COLUMNS);
    require_columns(reboot, REBOOT_TABLE, &required)?;

    let keys = key_values(reboot, REBOOT_TABLE, REBOOT_KEY)?;
    let scores = text_values(reboot, REBOOT_TABLE, REBOOT_SCORE)?;
    let attributes = REBOOT_GROUP_COLUMNS
        .iter()
        .map(|c| text_values(reboot, REBOOT_TABLE, c))
        .collect::<PdoResult<Vec<_>>>()?;

    // Sum within identical (entity, attributes) groups, first-seen order.
    let mut index: HashMap<Vec<Option<String>>, usize> = HashMap::new();
    let mut groups: Vec<ScoreGroup> = Vec::new();
    for (row, key) in keys.iter().enumerate() {
        let Some(entity) = key else { continue };
        let mut group_key = Vec::with_capacity(REBOOT_GROUP_COLUMNS.len() + 1);
        group_key.push(Some(entity.clone()));
        group_key.extend(attributes.iter().map(|col| col[row].clone()));

        let score = scores[row].as_deref().and_then(parse_decimal_comma);
        let pos = *index.entry(group_key).or_insert_with(|| {
            groups.push(ScoreGroup {
                entity: entity.clone(),
                date: parse_date(attributes[0][row].as_deref()),
                total: None,
            });
            groups.len() - 1
        });
        add_nullable(&mut groups[pos].total, score);
    }

    // Most recent group per entity; an equal date keeps the earlier group.
    let mut latest: KeyGroups<Latest> = KeyGroups::new();
    for (pos, group) in groups.iter().enumerate() {
        let current = latest.entry(&group.entity);
        match current.group {
            Some(best) if groups[best].date >= group.date => {}
            _ => current.group = Some(pos),
        }
    }

    let (entities, picks) = latest.into_parts();
    let raw: Vec<Option<f64>> = picks
        .iter()
        .map(|p| p.group.and_then(|g| groups[g].total))
        .collect();
    let proba: Vec<Option<f64>> = raw.iter().map(|s| s.map(sigmoid)).collect();

    log::debug!(
        "{}: {} score group(s) reduced to {} entities",
        REBOOT_TABLE,
        groups.len(),
        entities.len()
    );

    Ok(FeatureTable::new(REBOOT_TABLE, REBOOT_KEY, entities)
        .with_values(REBOOT_SCORE_OUTPUT, FeatureValues::Float(raw))
        .with_values(REBOOT_PROBA_OUTPUT, FeatureValues::Float(proba)))
}

/// Attach `reboot_score` and `reboot_score2` to the main table.
pub fn add_reboot_features(main: DataFrame, reboot: &DataFrame) -> PdoResult<DataFrame> {
    aggregate_reboot_scores(reboot)?.left_join(main)
}
