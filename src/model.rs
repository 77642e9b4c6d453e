use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Controls how much semi-structured data is retained alongside the
/// normalized columns. See `catalog` for the columns this gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Standard,
    Full,
}

impl Profile {
    pub fn retained_comment_kinds(&self) -> &'static [&'static str] {
        match self {
            Profile::Standard => &["function", "disease", "subcellular location"],
            Profile::Full => &[],
        }
    }

    pub fn keep_side_payloads(&self) -> bool {
        matches!(self, Profile::Full)
    }
}

impl std::str::FromStr for Profile {
    type Err = crate::errors::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(Profile::Standard),
            "full" => Ok(Profile::Full),
            other => Err(crate::errors::ParseError::InvalidValue(format!("profile: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gene {
    pub name: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub id: String,
    pub label: String,
}

/// One fully-materialized UniProtKB `<entry>`, extracted by the XML parser
/// and immediately detached from its parent so the parser cannot retain it.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub primary_accession: String,
    pub secondary_accessions: Vec<String>,
    pub uniprot_id: String,
    pub ncbi_taxid: i64,
    pub organism_scientific_name: String,
    pub organism_lineage: String,
    pub sequence_length: i32,
    pub molecular_weight: Option<i64>,
    pub sequence: String,
    pub created_date: NaiveDate,
    pub modified_date: NaiveDate,
    pub genes: Vec<Gene>,
    pub keywords: Vec<Keyword>,
    pub go_terms: Vec<String>,
    /// JSON-encoded arrays, already masked per the active profile.
    pub comments: Option<String>,
    pub features: Option<String>,
    pub db_references: Option<String>,
    pub evidence: Option<String>,
}

impl Entry {
    /// At most one gene may be flagged primary (invariant 3).
    pub fn primary_gene(&self) -> Option<&Gene> {
        self.genes.iter().find(|g| g.is_primary)
    }
}
