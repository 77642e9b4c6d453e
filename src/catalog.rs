//! Declarative definitions of the target tables. Nothing here talks to a
//! database; `database::postgres` turns a `Catalog` into DDL.

#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub columns: &'static [&'static str],
    pub references_table: &'static str,
    pub references_columns: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub enum IndexKind {
    BTree,
    Gin,
}

#[derive(Debug, Clone, Copy)]
pub struct IndexDef {
    pub column: &'static str,
    pub kind: IndexKind,
}

#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    /// Column order as emitted by the row encoder and expected by bulk ingest.
    pub columns: &'static [&'static str],
    pub primary_key: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],
    pub indexes: &'static [IndexDef],
}

/// The full set of target tables, in the parent-before-child order the
/// Database Adapter must apply definitions, ingest and merge them in.
pub type Catalog = &'static [TableDef];

/// Parent tables must be loaded, upserted and merged before their children
///: `taxonomy` and `proteins` first, then everything that hangs off
/// `proteins.primary_accession`.
pub const TABLES: &[TableDef] = &[
    TableDef {
        name: "taxonomy",
        columns: &["ncbi_taxid", "scientific_name", "lineage"],
        primary_key: &["ncbi_taxid"],
        foreign_keys: &[],
        indexes: &[],
    },
    TableDef {
        name: "proteins",
        columns: &[
            "primary_accession",
            "uniprot_id",
            "ncbi_taxid",
            "sequence_length",
            "molecular_weight",
            "created_date",
            "modified_date",
            "comments_data",
            "features_data",
            "db_references_data",
            "evidence_data",
        ],
        primary_key: &["primary_accession"],
        foreign_keys: &[ForeignKey {
            columns: &["ncbi_taxid"],
            references_table: "taxonomy",
            references_columns: &["ncbi_taxid"],
        }],
        indexes: &[
            IndexDef { column: "uniprot_id", kind: IndexKind::BTree },
            IndexDef { column: "comments_data", kind: IndexKind::Gin },
            IndexDef { column: "features_data", kind: IndexKind::Gin },
            IndexDef { column: "db_references_data", kind: IndexKind::Gin },
        ],
    },
    TableDef {
        name: "sequences",
        columns: &["primary_accession", "sequence"],
        primary_key: &["primary_accession"],
        foreign_keys: &[ForeignKey {
            columns: &["primary_accession"],
            references_table: "proteins",
            references_columns: &["primary_accession"],
        }],
        indexes: &[],
    },
    TableDef {
        name: "accessions",
        columns: &["protein_accession", "secondary_accession"],
        primary_key: &["protein_accession", "secondary_accession"],
        foreign_keys: &[ForeignKey {
            columns: &["protein_accession"],
            references_table: "proteins",
            references_columns: &["primary_accession"],
        }],
        indexes: &[IndexDef { column: "secondary_accession", kind: IndexKind::BTree }],
    },
    TableDef {
        name: "genes",
        columns: &["protein_accession", "gene_name", "is_primary"],
        primary_key: &["protein_accession", "gene_name"],
        foreign_keys: &[ForeignKey {
            columns: &["protein_accession"],
            references_table: "proteins",
            references_columns: &["primary_accession"],
        }],
        indexes: &[IndexDef { column: "gene_name", kind: IndexKind::BTree }],
    },
    TableDef {
        name: "keywords",
        columns: &["protein_accession", "keyword_id", "keyword_label"],
        primary_key: &["protein_accession", "keyword_id"],
        foreign_keys: &[ForeignKey {
            columns: &["protein_accession"],
            references_table: "proteins",
            references_columns: &["primary_accession"],
        }],
        indexes: &[IndexDef { column: "keyword_label", kind: IndexKind::BTree }],
    },
    TableDef {
        name: "protein_to_go",
        columns: &["protein_accession", "go_term_id"],
        primary_key: &["protein_accession", "go_term_id"],
        foreign_keys: &[ForeignKey {
            columns: &["protein_accession"],
            references_table: "proteins",
            references_columns: &["primary_accession"],
        }],
        indexes: &[IndexDef { column: "go_term_id", kind: IndexKind::BTree }],
    },
    TableDef {
        name: "protein_to_taxonomy",
        columns: &["protein_accession", "ncbi_taxid"],
        primary_key: &["protein_accession", "ncbi_taxid"],
        foreign_keys: &[
            ForeignKey {
                columns: &["protein_accession"],
                references_table: "proteins",
                references_columns: &["primary_accession"],
            },
            ForeignKey {
                columns: &["ncbi_taxid"],
                references_table: "taxonomy",
                references_columns: &["ncbi_taxid"],
            },
        ],
        indexes: &[IndexDef { column: "ncbi_taxid", kind: IndexKind::BTree }],
    },
];

/// Tables the Parallel Transform Coordinator produces spool files for. This
/// excludes the metadata tables, which the Metadata Registry owns directly.
pub fn spool_tables() -> impl Iterator<Item = &'static TableDef> {
    TABLES.iter()
}

pub fn find(name: &str) -> Option<&'static TableDef> {
    TABLES.iter().find(|t| t.name == name)
}

/// Tables that model "the current set of relations for this protein" and
/// therefore use delete-then-insert merge semantics on delta load, rather
/// than key-by-key upsert.
pub fn is_set_valued_child(table: &str) -> bool {
    matches!(table, "accessions" | "genes" | "keywords" | "protein_to_go" | "protein_to_taxonomy")
}

pub const METADATA_TABLE: &str = "py_load_uniprot_metadata";
pub const LOAD_HISTORY_TABLE: &str = "load_history";
