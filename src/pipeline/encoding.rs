//! Categorical encoding of raw entity attributes into ordinal risk buckets
//!
//! An encoder is an ordered list of `(predicate, bucket)` rules followed by a
//! mandatory catch-all bucket. Rules are evaluated in order and the first match
//! wins; anything unmatched (null, empty, unknown code, out-of-range number)
//! lands in the catch-all.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::columns::{float_values, require_columns, text_values};
use crate::error::PdoResult;

/// Legal-form codes per bucket of `c_njur_prsne`.
const LEGAL_FORM_1_3: &[&str] = &["26", "27", "33", "30"];
const LEGAL_FORM_4_6: &[&str] = &["20", "21", "29", "55", "59", "64"];
const LEGAL_FORM_7: &[&str] = &["22", "25", "56", "57", "58"];

/// Sector codes per bucket of `c_sectrl_1`. The class-3 list holds the empty
/// string on purpose: a blank sector is a named member of class 3.
const SECTOR_1: &[&str] = &["420053", "420051", "460010"];
const SECTOR_2: &[&str] = &["360120", "500030", "470030"];
const SECTOR_3: &[&str] = &["380020", "380030", "450080", ""];
const SECTOR_4: &[&str] = &["010010", "140020", "300010"];

/// Control flag stamped on the main table once encoding has run.
pub const MAIN_CHECK_FLAG: &str = "flag_df_main_OK";

/// A single cell seen by a predicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Text(Option<&'a str>),
    Number(Option<f64>),
}

/// Condition of one encoding rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Text value is one of the listed strings (exact match, no trimming).
    OneOf(Vec<String>),
    /// Value is null.
    IsNull,
    /// Value is null, empty or whitespace only.
    IsNullOrBlank,
    /// Number is `<= bound`.
    AtMost(f64),
    /// Number is `< bound`.
    Below(f64),
    /// Number is `>= bound`.
    AtLeast(f64),
    /// Number is `> bound`.
    Above(f64),
}

impl Predicate {
    pub fn one_of(values: &[&str]) -> Self {
        Predicate::OneOf(values.iter().map(|v| v.to_string()).collect())
    }

    pub fn matches(&self, cell: Cell<'_>) -> bool {
        match (self, cell) {
            (Predicate::OneOf(set), Cell::Text(Some(v))) => set.iter().any(|s| s == v),
            (Predicate::IsNull, Cell::Text(v)) => v.is_none(),
            (Predicate::IsNull, Cell::Number(v)) => v.is_none(),
            (Predicate::IsNullOrBlank, Cell::Text(v)) => v.map_or(true, |s| s.trim().is_empty()),
            (Predicate::IsNullOrBlank, Cell::Number(v)) => v.is_none(),
            (Predicate::AtMost(b), Cell::Number(Some(x))) => x <= *b,
            (Predicate::Below(b), Cell::Number(Some(x))) => x < *b,
            (Predicate::AtLeast(b), Cell::Number(Some(x))) => x >= *b,
            (Predicate::Above(b), Cell::Number(Some(x))) => x > *b,
            _ => false,
        }
    }
}

/// One `(predicate, bucket)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub predicate: Predicate,
    pub bucket: String,
}

/// Ordered rule list with a mandatory catch-all bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalEncoder {
    name: String,
    rules: Vec<Rule>,
    default_bucket: String,
}

impl CategoricalEncoder {
    /// Create an encoder; the catch-all bucket is required up front.
    pub fn new(name: &str, default_bucket: &str) -> Self {
        Self {
            name: name.to_string(),
            rules: Vec::new(),
            default_bucket: default_bucket.to_string(),
        }
    }

    /// Append a rule; rules are evaluated in insertion order.
    pub fn rule(mut self, predicate: Predicate, bucket: &str) -> Self {
        self.rules.push(Rule {
            predicate,
            bucket: bucket.to_string(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_bucket(&self) -> &str {
        &self.default_bucket
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Bucket for one cell.
    pub fn encode(&self, cell: Cell<'_>) -> &str {
        self.rules
            .iter()
            .find(|r| r.predicate.matches(cell))
            .map(|r| r.bucket.as_str())
            .unwrap_or(&self.default_bucket)
    }

    pub fn encode_text(&self, value: Option<&str>) -> &str {
        self.encode(Cell::Text(value))
    }

    pub fn encode_number(&self, value: Option<f64>) -> &str {
        self.encode(Cell::Number(value))
    }

    /// Whether this encoder reads its input as numbers.
    fn is_numeric(&self) -> bool {
        self.rules.iter().any(|r| {
            matches!(
                r.predicate,
                Predicate::AtMost(_) | Predicate::Below(_) | Predicate::AtLeast(_) | Predicate::Above(_)
            )
        })
    }

    /// Encode column `source` of `df` into a new, never-null text column `target`.
    pub fn encode_column(
        &self,
        df: &DataFrame,
        table: &str,
        source: &str,
        target: &str,
    ) -> PdoResult<Column> {
        let buckets: Vec<&str> = if self.is_numeric() {
            float_values(df, table, source)?
                .into_iter()
                .map(|v| self.encode_number(v))
                .collect()
        } else {
            let values = text_values(df, table, source)?;
            values.iter().map(|v| self.encode_text(v.as_deref())).collect()
        };
        Ok(Column::new(target.into(), buckets))
    }
}

/// How an empty or whitespace-only business-group id is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AffiliationPolicy {
    /// Only a true null means "no group"; `""` encodes as affiliated.
    #[default]
    NullOnly,
    /// Null, empty and whitespace-only ids all mean "no group".
    BlankAsNone,
}

impl std::str::FromStr for AffiliationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "null-only" => Ok(AffiliationPolicy::NullOnly),
            "blank-as-none" => Ok(AffiliationPolicy::BlankAsNone),
            _ => Err(format!(
                "Unknown affiliation policy: '{}'. Use 'null-only' or 'blank-as-none'.",
                s
            )),
        }
    }
}

/// `c_njur_prsne` -> `1-3` / `4-6` / `7`; anything else is `7`.
pub fn legal_form_encoder() -> CategoricalEncoder {
    CategoricalEncoder::new("c_njur_prsne_enc", "7")
        .rule(Predicate::one_of(LEGAL_FORM_1_3), "1-3")
        .rule(Predicate::one_of(LEGAL_FORM_4_6), "4-6")
        .rule(Predicate::one_of(LEGAL_FORM_7), "7")
}

/// `c_sectrl_1` -> `1`..`4`; anything else is `3`.
pub fn sector_encoder() -> CategoricalEncoder {
    CategoricalEncoder::new("c_sectrl_1_enc", "3")
        .rule(Predicate::one_of(SECTOR_1), "1")
        .rule(Predicate::one_of(SECTOR_2), "2")
        .rule(Predicate::one_of(SECTOR_3), "3")
        .rule(Predicate::one_of(SECTOR_4), "4")
}

/// `i_g_affre_rmpm` -> `top_ga`: `0` when there is no business group, else `1`.
pub fn affiliation_encoder(policy: AffiliationPolicy) -> CategoricalEncoder {
    let no_group = match policy {
        AffiliationPolicy::NullOnly => Predicate::IsNull,
        AffiliationPolicy::BlankAsNone => Predicate::IsNullOrBlank,
    };
    CategoricalEncoder::new("top_ga", "1").rule(no_group, "0")
}

/// Encode the main-table attributes: legal form, sector and group affiliation.
///
/// Adds `c_njur_prsne_enc`, `c_sectrl_1_enc`, `top_ga` and the `check` flag;
/// the input columns are kept.
pub fn encode_main_attributes(df: DataFrame, policy: AffiliationPolicy) -> PdoResult<DataFrame> {
    require_columns(&df, "df_main", &["c_njur_prsne", "c_sectrl_1", "i_g_affre_rmpm"])?;

    let legal = legal_form_encoder().encode_column(&df, "df_main", "c_njur_prsne", "c_njur_prsne_enc")?;
    let sector = sector_encoder().encode_column(&df, "df_main", "c_sectrl_1", "c_sectrl_1_enc")?;
    let group = affiliation_encoder(policy).encode_column(&df, "df_main", "i_g_affre_rmpm", "top_ga")?;
    let check = Column::new("check".into(), vec![MAIN_CHECK_FLAG; df.height()]);

    let mut df = df;
    df.with_column(legal)?;
    df.with_column(sector)?;
    df.with_column(group)?;
    df.with_column(check)?;
    Ok(df)
}
