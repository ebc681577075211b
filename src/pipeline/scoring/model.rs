//! Static definition of the scoring model variables
//!
//! Each variable has a closed set of bucket labels. A bucket label is what the
//! formatting stage writes into the table (`">=7"`); its suffix is how the
//! coefficient table and the one-hot columns name it (`nat_jur_a_sup7`).

/// One bucket of a model variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub label: &'static str,
    pub suffix: &'static str,
}

/// A model variable, its buckets and its reference (catch-all) bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelVariable {
    pub name: &'static str,
    pub buckets: &'static [Bucket],
    pub reference: &'static str,
}

const fn b(label: &'static str, suffix: &'static str) -> Bucket {
    Bucket { label, suffix }
}

const ONE_TWO: &[Bucket] = &[b("1", "1"), b("2", "2")];
const ONE_TO_THREE: &[Bucket] = &[b("1", "1"), b("2", "2"), b("3", "3")];
const ONE_TO_FOUR: &[Bucket] = &[b("1", "1"), b("2", "2"), b("3", "3"), b("4", "4")];

pub static MODEL_VARIABLES: [ModelVariable; 15] = [
    ModelVariable {
        name: "nat_jur_a",
        buckets: &[b("1-3", "1_3"), b("4-6", "4_6"), b(">=7", "sup7")],
        reference: "1-3",
    },
    ModelVariable { name: "secto_b", buckets: ONE_TO_FOUR, reference: "4" },
    ModelVariable {
        name: "seg_nae",
        buckets: &[b("ME", "ME"), b("autres", "autres")],
        reference: "ME",
    },
    ModelVariable {
        name: "top_ga",
        buckets: &[b("0", "0"), b("1", "1")],
        reference: "0",
    },
    ModelVariable {
        name: "nbj",
        buckets: &[b("<=12", "inf_equal_12"), b(">12", "sup_12")],
        reference: ">12",
    },
    ModelVariable { name: "solde_cav_char", buckets: ONE_TO_FOUR, reference: "1" },
    ModelVariable {
        name: "reboot_score_char2",
        buckets: &[
            b("1", "1"),
            b("2", "2"),
            b("3", "3"),
            b("4", "4"),
            b("5", "5"),
            b("6", "6"),
            b("7", "7"),
            b("8", "8"),
            b("9", "9"),
        ],
        reference: "9",
    },
    ModelVariable { name: "remb_sepa_max", buckets: ONE_TWO, reference: "1" },
    ModelVariable { name: "pres_prlv_retourne", buckets: ONE_TWO, reference: "1" },
    ModelVariable { name: "pres_saisie", buckets: ONE_TWO, reference: "1" },
    ModelVariable { name: "net_int_turnover", buckets: ONE_TWO, reference: "1" },
    ModelVariable { name: "rn_ca_conso_023b", buckets: ONE_TO_THREE, reference: "1" },
    ModelVariable { name: "caf_dmlt_005", buckets: ONE_TWO, reference: "1" },
    ModelVariable { name: "res_total_passif_035", buckets: ONE_TO_FOUR, reference: "1" },
    ModelVariable { name: "immob_total_passif_055", buckets: ONE_TO_THREE, reference: "1" },
];

impl ModelVariable {
    /// Bucket carrying `label`, if it is one of this variable's labels.
    pub fn bucket(&self, label: &str) -> Option<&'static Bucket> {
        let buckets: &'static [Bucket] = self.buckets;
        buckets.iter().find(|b| b.label == label)
    }

    /// Bucket whose suffix is `suffix`.
    pub fn bucket_by_suffix(&self, suffix: &str) -> Option<&'static Bucket> {
        let buckets: &'static [Bucket] = self.buckets;
        buckets.iter().find(|b| b.suffix == suffix)
    }

    pub fn reference_bucket(&self) -> &'static Bucket {
        let buckets: &'static [Bucket] = self.buckets;
        self.bucket(self.reference).unwrap_or(&buckets[0])
    }

    /// Bucket used for scoring: the matching one, else the reference.
    pub fn resolve(&self, label: Option<&str>) -> &'static Bucket {
        label
            .and_then(|l| self.bucket(l))
            .unwrap_or_else(|| self.reference_bucket())
    }

    /// One-hot / coefficient name of a bucket.
    pub fn feature_name(&self, bucket: &Bucket) -> String {
        format!("{}_{}", self.name, bucket.suffix)
    }

    /// Name of the per-variable contribution column.
    pub fn coefficient_column(&self) -> String {
        format!("coeff_{}", self.name)
    }
}

/// Every one-hot feature name, in model order.
pub fn one_hot_feature_names() -> Vec<String> {
    MODEL_VARIABLES
        .iter()
        .flat_map(|v| v.buckets.iter().map(move |b| v.feature_name(b)))
        .collect()
}

/// Names of the model variables, in model order.
pub fn model_variable_names() -> Vec<&'static str> {
    MODEL_VARIABLES.iter().map(|v| v.name).collect()
}

/// Split a coefficient key into its variable and bucket.
///
/// The longest matching variable prefix wins, so `reboot_score_char2_1` is
/// never read as a bucket of a shorter variable name.
pub fn split_feature_name(key: &str) -> Option<(&'static ModelVariable, &'static Bucket)> {
    MODEL_VARIABLES
        .iter()
        .filter(|v| key.len() > v.name.len() + 1 && key.starts_with(v.name) && key.as_bytes()[v.name.len()] == b'_')
        .max_by_key(|v| v.name.len())
        .and_then(|v| v.bucket_by_suffix(&key[v.name.len() + 1..]).map(|bucket| (v, bucket)))
}
