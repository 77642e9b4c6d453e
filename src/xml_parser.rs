//! Streaming UniProtKB XML parser.
//!
//! Mirrors the incremental `read_event_into` loop used for Plazi treatment
//! documents: the reader advances element-by-element and each `<entry>` is
//! fully materialized, converted to an `Entry`, and dropped before the next
//! one is read, so memory use does not grow with file size.

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;

use crate::errors::{Error, ParseError};
use crate::model::{Entry, Gene, Keyword, Profile};
use crate::xml_value::{encode_array, XmlValue};

fn name_eq(name: QName, target: &str) -> bool {
    name.as_ref() == target.as_bytes()
}

fn start_eq(event: &BytesStart, name: &str) -> bool {
    name_eq(event.name(), name)
}

fn local_name(event: &BytesStart) -> String {
    String::from_utf8_lossy(event.name().as_ref()).into_owned()
}

fn attribute<R>(reader: &Reader<R>, event: &BytesStart, name: &str) -> Result<Option<String>, Error> {
    match event.try_get_attribute(name)? {
        Some(value) => Ok(Some(value.decode_and_unescape_value(reader.decoder())?.into_owned())),
        None => Ok(None),
    }
}

/// Pulls `Entry` records out of a UniProtKB XML document one at a time.
/// `Item::Err(Error::InvalidEntry(_))` is recoverable: the caller should
/// count it and continue. Every other `Err` aborts the stream.
pub struct EntryParser<R: BufRead> {
    reader: Reader<R>,
    profile: Profile,
    release_tag: Option<String>,
    buf: Vec<u8>,
}

impl<R: BufRead> EntryParser<R> {
    pub fn new(inner: R, profile: Profile) -> Self {
        let mut reader = Reader::from_reader(inner);
        reader.config_mut().trim_text(true);
        EntryParser { reader, profile, release_tag: None, buf: Vec::new() }
    }

    /// The `version` attribute on the root `<uniprot>` element, if present.
    /// Populated lazily on the first call to `next_entry`/`next`.
    pub fn release_tag(&self) -> Option<&str> {
        self.release_tag.as_deref()
    }

    fn ensure_root(&mut self) -> Result<(), Error> {
        if self.release_tag.is_some() {
            return Ok(());
        }
        loop {
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) if start_eq(&e, "uniprot") => {
                    let tag = attribute(&self.reader, &e, "version")?.unwrap_or_else(|| "unknown".to_string());
                    self.release_tag = Some(tag);
                    self.buf.clear();
                    return Ok(());
                }
                Event::Eof => {
                    return Err(ParseError::MissingField("uniprot".to_string(), "document root".to_string()).into());
                }
                _ => {
                    self.buf.clear();
                }
            }
        }
    }

    fn next_entry(&mut self) -> Result<Option<Entry>, Error> {
        self.ensure_root()?;

        loop {
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) if start_eq(&e, "entry") => {
                    let start = e.to_owned();
                    self.buf.clear();
                    let raw = parse_entry_body(&mut self.reader, &start)?;
                    return Ok(Some(build_entry(raw, self.profile)?));
                }
                Event::End(e) if name_eq(e.name(), "uniprot") => return Ok(None),
                Event::Eof => return Ok(None),
                _ => {}
            }
            self.buf.clear();
        }
    }
}

impl<R: BufRead> Iterator for EntryParser<R> {
    type Item = Result<Entry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

/// Everything pulled off one `<entry>...</entry>` subtree before it is
/// turned into a normalized `Entry`. Kept separate from `Entry` so that
/// validation (invariant 2: exactly one primary accession) happens in one
/// place, `build_entry`.
#[derive(Default)]
struct RawEntry {
    accessions: Vec<String>,
    uniprot_id: Option<String>,
    ncbi_taxid: Option<i64>,
    organism_scientific_name: Option<String>,
    organism_lineage: Option<String>,
    sequence: Option<String>,
    sequence_length: Option<i32>,
    molecular_weight: Option<i64>,
    created_date: Option<String>,
    modified_date: Option<String>,
    genes: Vec<Gene>,
    keywords: Vec<Keyword>,
    go_terms: Vec<String>,
    comments: Vec<XmlValue>,
    features: Vec<XmlValue>,
    db_references: Vec<XmlValue>,
    evidence: Vec<XmlValue>,
}

fn parse_entry_body<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<RawEntry, Error> {
    let mut raw = RawEntry::default();
    raw.created_date = attribute(reader, start, "created")?;
    raw.modified_date = attribute(reader, start, "modified")?;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if start_eq(&e, "accession") => {
                raw.accessions.push(read_text(reader, &e)?);
            }
            Event::Start(e) if start_eq(&e, "name") => {
                if raw.uniprot_id.is_none() {
                    raw.uniprot_id = Some(read_text(reader, &e)?);
                }
                else {
                    skip_element(reader, &e)?;
                }
            }
            Event::Start(e) if start_eq(&e, "organism") => {
                let organism = parse_element(reader, &e)?;
                raw.organism_scientific_name = organism
                    .children
                    .iter()
                    .find(|c| c.tag == "name" && c.attribute("type") == Some("scientific"))
                    .and_then(|c| c.text.clone());
                for reference in organism.children.iter().filter(|c| c.tag == "dbReference") {
                    if reference.attribute("type") == Some("NCBI Taxonomy") {
                        if let Some(id) = reference.attribute("id") {
                            raw.ncbi_taxid = id.parse::<i64>().ok();
                        }
                    }
                }
                raw.organism_lineage = organism
                    .children
                    .iter()
                    .find(|c| c.tag == "lineage")
                    .map(|lineage| {
                        lineage
                            .children
                            .iter()
                            .filter(|t| t.tag == "taxon")
                            .filter_map(|t| t.text.clone())
                            .collect::<Vec<_>>()
                            .join("; ")
                    });
            }
            Event::Start(e) if start_eq(&e, "gene") => {
                let gene = parse_element(reader, &e)?;
                for name in gene.children.iter().filter(|c| c.tag == "name") {
                    if let Some(text) = &name.text {
                        raw.genes.push(Gene {
                            name: text.clone(),
                            is_primary: name.attribute("type") == Some("primary"),
                        });
                    }
                }
            }
            Event::Start(e) if start_eq(&e, "sequence") => {
                raw.sequence_length = attribute(reader, &e, "length")?.and_then(|v| v.parse().ok());
                raw.molecular_weight = attribute(reader, &e, "mass")?.and_then(|v| v.parse().ok());
                let text = read_text(reader, &e)?;
                raw.sequence = Some(text.split_whitespace().collect::<String>());
            }
            Event::Start(e) if start_eq(&e, "keyword") => {
                let id = attribute(reader, &e, "id")?.unwrap_or_default();
                let label = read_text(reader, &e)?;
                raw.keywords.push(Keyword { id, label });
            }
            Event::Start(e) if start_eq(&e, "comment") => {
                raw.comments.push(parse_element(reader, &e)?);
            }
            Event::Start(e) if start_eq(&e, "feature") => {
                raw.features.push(parse_element(reader, &e)?);
            }
            Event::Start(e) if start_eq(&e, "evidence") => {
                raw.evidence.push(parse_element(reader, &e)?);
            }
            Event::Start(e) if start_eq(&e, "dbReference") => {
                let reference = parse_element(reader, &e)?;
                match reference.attribute("type") {
                    Some("GO") => {
                        if let Some(id) = reference.attribute("id") {
                            raw.go_terms.push(id.to_string());
                        }
                    }
                    Some("NCBI Taxonomy") => {}
                    _ => raw.db_references.push(reference),
                }
            }
            Event::Empty(e) if start_eq(&e, "dbReference") => {
                let reference = parse_empty(reader, &e)?;
                match reference.attribute("type") {
                    Some("GO") => {
                        if let Some(id) = reference.attribute("id") {
                            raw.go_terms.push(id.to_string());
                        }
                    }
                    Some("NCBI Taxonomy") => {}
                    _ => raw.db_references.push(reference),
                }
            }
            Event::End(e) if name_eq(e.name(), "entry") => break,
            Event::Eof => return Err(ParseError::Xml("unexpected end of file inside <entry>".to_string()).into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(raw)
}

fn build_entry(raw: RawEntry, profile: Profile) -> Result<Entry, Error> {
    let mut accessions = raw.accessions.into_iter();
    let primary_accession = accessions
        .next()
        .ok_or_else(|| Error::InvalidEntry("entry has no <accession> element".to_string()))?;
    let secondary_accessions: Vec<String> = accessions.collect();

    let uniprot_id = raw.uniprot_id.ok_or_else(|| Error::InvalidEntry(format!("{primary_accession}: missing <name>")))?;
    let ncbi_taxid = raw
        .ncbi_taxid
        .ok_or_else(|| Error::InvalidEntry(format!("{primary_accession}: missing NCBI Taxonomy dbReference")))?;
    let organism_scientific_name = raw
        .organism_scientific_name
        .ok_or_else(|| Error::InvalidEntry(format!("{primary_accession}: missing organism scientific name")))?;
    let sequence = raw.sequence.ok_or_else(|| Error::InvalidEntry(format!("{primary_accession}: missing <sequence>")))?;
    let sequence_length = raw
        .sequence_length
        .ok_or_else(|| Error::InvalidEntry(format!("{primary_accession}: sequence missing length attribute")))?;

    let created_date = parse_date(&primary_accession, raw.created_date, "created")?;
    let modified_date = parse_date(&primary_accession, raw.modified_date, "modified")?;

    // invariant 3: at most one gene may be flagged primary.
    let mut genes = raw.genes;
    let mut seen_primary = false;
    for gene in genes.iter_mut() {
        if gene.is_primary {
            if seen_primary {
                gene.is_primary = false;
            }
            seen_primary = true;
        }
    }

    let comments: Vec<XmlValue> = raw
        .comments
        .into_iter()
        .filter(|c| match profile {
            Profile::Full => true,
            Profile::Standard => {
                let kind = c.attribute("type").unwrap_or("");
                profile.retained_comment_kinds().contains(&kind)
            }
        })
        .collect();

    let keep_side_payloads = profile.keep_side_payloads();

    Ok(Entry {
        primary_accession,
        secondary_accessions,
        uniprot_id,
        ncbi_taxid,
        organism_scientific_name,
        organism_lineage: raw.organism_lineage.unwrap_or_default(),
        sequence_length,
        molecular_weight: raw.molecular_weight,
        sequence,
        created_date,
        modified_date,
        genes,
        keywords: raw.keywords,
        go_terms: raw.go_terms,
        comments: non_empty_json(&comments),
        features: if keep_side_payloads { non_empty_json(&raw.features) } else { None },
        db_references: non_empty_json(&raw.db_references),
        evidence: if keep_side_payloads { non_empty_json(&raw.evidence) } else { None },
    })
}

fn non_empty_json(values: &[XmlValue]) -> Option<String> {
    if values.is_empty() { None } else { Some(encode_array(values)) }
}

fn parse_date(accession: &str, value: Option<String>, field: &str) -> Result<chrono::NaiveDate, Error> {
    let value = value.ok_or_else(|| Error::InvalidEntry(format!("{accession}: missing {field} date")))?;
    chrono::NaiveDate::parse_from_str(&value, "%Y-%m-%d")
        .map_err(|err| Error::InvalidEntry(format!("{accession}: unparseable {field} date '{value}': {err}")))
}

/// Read the accumulated text of a simple leaf element and consume its `</tag>`.
fn read_text<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<String, Error> {
    let value = parse_element(reader, start)?;
    Ok(value.text.unwrap_or_default())
}

fn skip_element<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<(), Error> {
    parse_element(reader, start).map(|_| ())
}

fn parse_empty<R: BufRead>(reader: &Reader<R>, event: &BytesStart) -> Result<XmlValue, Error> {
    let mut value = XmlValue::new(local_name(event));
    for attr in event.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let val = attr.decode_and_unescape_value(reader.decoder())?.into_owned();
        value = value.with_attribute(key, val);
    }
    Ok(value)
}

/// Fully materialize one element and its descendants as an `XmlValue`,
/// consuming events up to and including the matching `</tag>`.
fn parse_element<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<XmlValue, Error> {
    let tag = local_name(start);
    let mut value = XmlValue::new(tag);
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let val = attr.decode_and_unescape_value(reader.decoder())?.into_owned();
        value = value.with_attribute(key, val);
    }

    let mut text = String::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let child = parse_element(reader, &e)?;
                value.children.push(child);
            }
            Event::Empty(e) => {
                value.children.push(parse_empty(reader, &e)?);
            }
            Event::Text(e) => {
                text.push_str(&e.unescape()?);
            }
            Event::CData(e) => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Event::End(_) => break,
            Event::Eof => return Err(ParseError::Xml(format!("unexpected end of file inside <{}>", value.tag)).into()),
            _ => {}
        }
        buf.clear();
    }

    let trimmed = text.trim();
    if !trimmed.is_empty() {
        value.text = Some(trimmed.to_string());
    }
    Ok(value)
}
