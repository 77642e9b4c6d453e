//! Pure functions turning an `Entry` into one row per target table, in the
//! delimited text encoding the Postgres `COPY ... FORMAT text` protocol
//! expects (tab-separated, `\N` for null, backslash-escaped control bytes).
//!
//! Row order for a single entry is fixed: `genes`, `keywords`, `protein_to_go`
//! and `accessions` all pay out in the field order their `Entry` vectors
//! hold, making the round-trip in `tests` below deterministic.

use crate::catalog;
use crate::errors::Error;
use crate::model::Entry;

pub type Row = Vec<Option<String>>;

#[derive(Debug, Clone, Default)]
pub struct EncodedEntry {
    pub proteins: Row,
    pub sequences: Row,
    pub accessions: Vec<Row>,
    pub taxonomy: Row,
    pub genes: Vec<Row>,
    pub keywords: Vec<Row>,
    pub protein_to_go: Vec<Row>,
    pub protein_to_taxonomy: Row,
}

/// Escape a field for the Postgres text COPY format: backslash, tab and
/// newline become `\\`, `\t`, `\n`. Carriage returns are folded in too since
/// a bare `\r` would otherwise desynchronize a line-oriented reader.
pub fn escape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

pub fn unescape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('\\') => out.push('\\'),
                Some('t') => out.push('\t'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        else {
            out.push(ch);
        }
    }
    out
}

/// Render a row (a sequence of optional fields) as a single spool line,
/// `\N` standing in for null, tab-separated, terminated with `\n`.
pub fn render_row(row: &[Option<String>]) -> String {
    let mut line = String::new();
    for (idx, field) in row.iter().enumerate() {
        if idx > 0 {
            line.push('\t');
        }
        match field {
            Some(value) => line.push_str(&escape_field(value)),
            None => line.push_str("\\N"),
        }
    }
    line.push('\n');
    line
}

/// Parse a previously-rendered line back into its optional fields. Used by
/// the round-trip tests and by any tooling that wants to re-read a spool
/// file without going through the database.
pub fn parse_row(line: &str) -> Row {
    line.trim_end_matches('\n')
        .split('\t')
        .map(|field| if field == "\\N" { None } else { Some(unescape_field(field)) })
        .collect()
}

fn some(value: impl ToString) -> Option<String> {
    Some(value.to_string())
}

/// Turn an `Entry` into one row per target table. The caller (the PTC
/// writer) is responsible for fanning each `Row`/`Vec<Row>` out to the
/// correct per-table spool file.
pub fn encode(entry: &Entry) -> EncodedEntry {
    let accession = entry.primary_accession.clone();

    let proteins = vec![
        some(&accession),
        some(&entry.uniprot_id),
        some(entry.ncbi_taxid),
        some(entry.sequence_length),
        entry.molecular_weight.map(|w| w.to_string()),
        some(entry.created_date.format("%Y-%m-%d")),
        some(entry.modified_date.format("%Y-%m-%d")),
        entry.comments.clone(),
        entry.features.clone(),
        entry.db_references.clone(),
        entry.evidence.clone(),
    ];

    let sequences = vec![some(&accession), some(&entry.sequence)];

    let accessions = entry
        .secondary_accessions
        .iter()
        .filter(|secondary| *secondary != &accession)
        .map(|secondary| vec![some(&accession), some(secondary)])
        .collect();

    let taxonomy = vec![
        some(entry.ncbi_taxid),
        some(&entry.organism_scientific_name),
        some(&entry.organism_lineage),
    ];

    let genes = entry
        .genes
        .iter()
        .map(|gene| vec![some(&accession), some(&gene.name), some(gene.is_primary)])
        .collect();

    let keywords = entry
        .keywords
        .iter()
        .map(|keyword| vec![some(&accession), some(&keyword.id), some(&keyword.label)])
        .collect();

    let protein_to_go = entry
        .go_terms
        .iter()
        .map(|term| vec![some(&accession), some(term)])
        .collect();

    let protein_to_taxonomy = vec![some(&accession), some(entry.ncbi_taxid)];

    EncodedEntry {
        proteins,
        sequences,
        accessions,
        taxonomy,
        genes,
        keywords,
        protein_to_go,
        protein_to_taxonomy,
    }
}

impl EncodedEntry {
    /// Defensive check that every row this entry produced has the column
    /// count the catalog declares for its table. A mismatch means the
    /// encoder and the catalog have drifted apart; treated as a fatal
    /// transform error rather than silently writing a ragged row.
    pub fn validate_shapes(&self) -> Result<(), Error> {
        let check = |table: &str, row: &Row| -> Result<(), Error> {
            let expected = catalog::find(table)
                .unwrap_or_else(|| panic!("'{table}' is not a declared catalog table"))
                .columns
                .len();
            if row.len() != expected {
                return Err(Error::TransformFailure(format!(
                    "row for '{table}' has {} fields, catalog declares {expected}",
                    row.len()
                )));
            }
            Ok(())
        };

        check("proteins", &self.proteins)?;
        check("sequences", &self.sequences)?;
        check("taxonomy", &self.taxonomy)?;
        check("protein_to_taxonomy", &self.protein_to_taxonomy)?;
        for row in &self.accessions {
            check("accessions", row)?;
        }
        for row in &self.genes {
            check("genes", row)?;
        }
        for row in &self.keywords {
            check("keywords", row)?;
        }
        for row in &self.protein_to_go {
            check("protein_to_go", row)?;
        }
        Ok(())
    }

    /// Total row count across every table this entry pays into. Used to
    /// drive the writer's rows-spooled progress counter.
    pub fn row_count(&self) -> u64 {
        4 + self.accessions.len() as u64 + self.genes.len() as u64 + self.keywords.len() as u64 + self.protein_to_go.len() as u64
    }

    /// Fan this entry's rows out to their per-table spool files as one
    /// indivisible batch (per-entry atomicity).
    pub fn write_to(&self, spool: &mut crate::spool::Spool) -> Result<(), Error> {
        spool.write_row("proteins", &self.proteins)?;
        spool.write_row("sequences", &self.sequences)?;
        spool.write_row("taxonomy", &self.taxonomy)?;
        spool.write_row("protein_to_taxonomy", &self.protein_to_taxonomy)?;
        spool.write_rows("accessions", &self.accessions)?;
        spool.write_rows("genes", &self.genes)?;
        spool.write_rows("keywords", &self.keywords)?;
        spool.write_rows("protein_to_go", &self.protein_to_go)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::model::{Gene, Keyword};

    fn sample_entry() -> Entry {
        Entry {
            primary_accession: "P11111".into(),
            secondary_accessions: vec!["Q99999".into(), "P11111".into()],
            uniprot_id: "TEST_HUMAN".into(),
            ncbi_taxid: 9606,
            organism_scientific_name: "Homo sapiens".into(),
            organism_lineage: "Eukaryota; Metazoa; Chordata".into(),
            sequence_length: 4,
            molecular_weight: Some(512),
            sequence: "MKTI".into(),
            created_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            modified_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            genes: vec![Gene { name: "GENEA".into(), is_primary: true }],
            keywords: vec![Keyword { id: "KW-0002".into(), label: "3D-structure".into() }],
            go_terms: vec!["GO:0005515".into()],
            comments: Some("[]".into()),
            features: None,
            db_references: None,
            evidence: None,
        }
    }

    #[test]
    fn escapes_tabs_newlines_and_backslashes() {
        let escaped = escape_field("a\tb\nc\\d");
        assert_eq!(escaped, "a\\tb\\nc\\\\d");
        assert_eq!(unescape_field(&escaped), "a\tb\nc\\d");
    }

    #[test]
    fn null_round_trips_as_backslash_n() {
        let row = vec![Some("x".to_string()), None];
        let rendered = render_row(&row);
        assert_eq!(rendered, "x\t\\N\n");
        assert_eq!(parse_row(&rendered), row);
    }

    #[test]
    fn accessions_exclude_self_reference() {
        let entry = sample_entry();
        let encoded = encode(&entry);
        // invariant 4: secondary_accession never equals protein_accession
        assert_eq!(encoded.accessions.len(), 1);
        assert_eq!(encoded.accessions[0][1], Some("Q99999".to_string()));
    }

    #[test]
    fn row_encoding_round_trips_protein_row() {
        let entry = sample_entry();
        let encoded = encode(&entry);
        let rendered = render_row(&encoded.proteins);
        let parsed = parse_row(&rendered);
        assert_eq!(parsed, encoded.proteins);
        assert_eq!(parsed[0], Some("P11111".to_string()));
        assert_eq!(parsed[4], Some("512".to_string()));
    }

    #[test]
    fn genes_and_keywords_and_go_terms_each_emit_one_row_per_entry() {
        let entry = sample_entry();
        let encoded = encode(&entry);
        assert_eq!(encoded.genes.len(), 1);
        assert_eq!(encoded.genes[0][2], Some("true".to_string()));
        assert_eq!(encoded.keywords.len(), 1);
        assert_eq!(encoded.protein_to_go.len(), 1);
    }

    #[test]
    fn encoded_rows_pass_shape_validation_against_the_catalog() {
        let entry = sample_entry();
        let encoded = encode(&entry);
        encoded.validate_shapes().expect("row widths must match catalog column counts");
    }

    #[test]
    fn shape_validation_catches_a_short_row() {
        let entry = sample_entry();
        let mut encoded = encode(&entry);
        encoded.proteins.pop();
        match encoded.validate_shapes() {
            Err(Error::TransformFailure(_)) => {}
            other => panic!("expected TransformFailure, got {other:?}"),
        }
    }
}
