//! Per-table spool files: one gzip-compressed TSV per target table, written
//! once per run and handed to the bulk ingest stage as-is.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::catalog::{self, TableDef};
use crate::encoder::Row;
use crate::errors::Error;

pub struct SpoolWriter {
    dir: PathBuf,
    file: GzEncoder<BufWriter<File>>,
    pub table: &'static str,
    pub rows_written: u64,
}

impl SpoolWriter {
    fn open(dir: &Path, table: &TableDef) -> Result<Self, Error> {
        let path = dir.join(format!("{}.tsv.gz", table.name));
        let file = File::create(&path)?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        Ok(SpoolWriter { dir: dir.to_path_buf(), file: encoder, table: table.name, rows_written: 0 })
    }

    pub fn write_row(&mut self, row: &[Option<String>]) -> Result<(), Error> {
        self.file.write_all(crate::encoder::render_row(row).as_bytes())?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn write_rows(&mut self, rows: &[Row]) -> Result<(), Error> {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.tsv.gz", self.table))
    }

    pub fn finish(self) -> Result<PathBuf, Error> {
        let path = self.path();
        self.file.finish()?.flush()?;
        Ok(path)
    }
}

/// A spool file per catalog table, held open for the duration of a run.
/// Parent tables (`taxonomy`, `proteins`) are written before their children
/// arrive at the writer, but nothing here enforces ordering: that is the
/// Parallel Transform Coordinator's job, this just gives it somewhere to put
/// bytes.
pub struct Spool {
    writers: Vec<SpoolWriter>,
}

impl Spool {
    pub fn create(dir: &Path) -> Result<Self, Error> {
        std::fs::create_dir_all(dir)?;
        let mut writers = Vec::new();
        for table in catalog::spool_tables() {
            writers.push(SpoolWriter::open(dir, table)?);
        }
        Ok(Spool { writers })
    }

    fn writer_mut(&mut self, table: &str) -> &mut SpoolWriter {
        self.writers
            .iter_mut()
            .find(|w| w.table == table)
            .unwrap_or_else(|| panic!("no spool writer registered for table '{table}'"))
    }

    pub fn write_row(&mut self, table: &str, row: &Row) -> Result<(), Error> {
        self.writer_mut(table).write_row(row)
    }

    pub fn write_rows(&mut self, table: &str, rows: &[Row]) -> Result<(), Error> {
        self.writer_mut(table).write_rows(rows)
    }

    pub fn row_counts(&self) -> Vec<(&'static str, u64)> {
        self.writers.iter().map(|w| (w.table, w.rows_written)).collect()
    }

    /// Flush and close every spool file, returning the paths in catalog
    /// (parent-before-child) order for the bulk ingest stage to consume.
    pub fn finish(self) -> Result<Vec<(&'static str, PathBuf)>, Error> {
        let mut paths = Vec::with_capacity(self.writers.len());
        for writer in self.writers {
            let table = writer.table;
            paths.push((table, writer.finish()?));
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn writes_one_gzip_file_per_table_and_tracks_row_counts() {
        let dir = std::env::temp_dir().join(format!("spool-test-{}", std::process::id()));
        let mut spool = Spool::create(&dir).unwrap();

        spool.write_row("taxonomy", &vec![Some("9606".to_string()), Some("Homo sapiens".to_string()), None]).unwrap();
        spool
            .write_rows("genes", &[vec![Some("P11111".to_string()), Some("GENEA".to_string()), Some("true".to_string())]])
            .unwrap();

        let counts: std::collections::HashMap<_, _> = spool.row_counts().into_iter().collect();
        assert_eq!(counts["taxonomy"], 1);
        assert_eq!(counts["genes"], 1);
        assert_eq!(counts["proteins"], 0);

        let paths = spool.finish().unwrap();
        let taxonomy_path = paths.iter().find(|(name, _)| *name == "taxonomy").unwrap().1.clone();

        let mut contents = String::new();
        GzDecoder::new(File::open(&taxonomy_path).unwrap()).read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "9606\tHomo sapiens\t\\N\n");

        std::fs::remove_dir_all(&dir).ok();
    }
}
