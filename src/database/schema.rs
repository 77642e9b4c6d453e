//! `diesel::table!` declarations for the bulk-ingest COPY path.
//!
//! These are declared once with unqualified names and reused for every
//! schema the adapter touches (production, staging, archive) by issuing
//! `SET search_path TO "<schema>"` on the connection before each statement —
//! diesel's typed DSL has no notion of a schema chosen at runtime, so the
//! table identity here is fixed and the schema is a connection-level detail
//! (see `postgres::with_schema`).

diesel::table! {
    taxonomy (ncbi_taxid) {
        ncbi_taxid -> BigInt,
        scientific_name -> Text,
        lineage -> Text,
    }
}

diesel::table! {
    proteins (primary_accession) {
        primary_accession -> Text,
        uniprot_id -> Text,
        ncbi_taxid -> BigInt,
        sequence_length -> Integer,
        molecular_weight -> Nullable<BigInt>,
        created_date -> Date,
        modified_date -> Date,
        comments_data -> Nullable<Text>,
        features_data -> Nullable<Text>,
        db_references_data -> Nullable<Text>,
        evidence_data -> Nullable<Text>,
    }
}

diesel::table! {
    sequences (primary_accession) {
        primary_accession -> Text,
        sequence -> Text,
    }
}

diesel::table! {
    accessions (protein_accession, secondary_accession) {
        protein_accession -> Text,
        secondary_accession -> Text,
    }
}

diesel::table! {
    genes (protein_accession, gene_name) {
        protein_accession -> Text,
        gene_name -> Text,
        is_primary -> Bool,
    }
}

diesel::table! {
    keywords (protein_accession, keyword_id) {
        protein_accession -> Text,
        keyword_id -> Text,
        keyword_label -> Text,
    }
}

diesel::table! {
    protein_to_go (protein_accession, go_term_id) {
        protein_accession -> Text,
        go_term_id -> Text,
    }
}

diesel::table! {
    protein_to_taxonomy (protein_accession, ncbi_taxid) {
        protein_accession -> Text,
        ncbi_taxid -> BigInt,
    }
}

diesel::table! {
    py_load_uniprot_metadata (version) {
        version -> Text,
        release_date -> Text,
        load_timestamp -> Text,
        swissprot_entry_count -> BigInt,
        trembl_entry_count -> BigInt,
    }
}

diesel::table! {
    load_history (id) {
        id -> BigInt,
        run_id -> Text,
        status -> Text,
        mode -> Text,
        dataset -> Text,
        start_time -> Text,
        end_time -> Nullable<Text>,
        error_message -> Nullable<Text>,
    }
}
