use std;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use crate::error::{MostWantedError, Result};

/// Sample id -> (mapping file column -> value)
pub type SampleMetadata = BTreeMap<String, BTreeMap<String, String>>;

const OTU_TABLE_HEADER: &str = "#OTU ID";
const MAPPING_FILE_HEADER: &str = "#SampleID";
const TAXONOMY_COLUMNS: [&str; 2] = ["taxonomy", "Consensus Lineage"];

/// Cluster by sample abundance matrix, with per-cluster taxonomy and
/// per-sample metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct AbundanceTable {
    cluster_ids: Vec<String>,
    sample_ids: Vec<String>,
    counts: Vec<Vec<f64>>,
    taxonomy: Vec<Option<String>>,
    sample_metadata: Vec<BTreeMap<String, String>>,
    cluster_index: HashMap<String, usize>,
}

impl AbundanceTable {
    /// `counts` has one row per cluster, each with one value per sample.
    pub fn new(
        cluster_ids: Vec<String>,
        sample_ids: Vec<String>,
        counts: Vec<Vec<f64>>,
    ) -> Result<AbundanceTable> {
        if counts.len() != cluster_ids.len() {
            return Err(MostWantedError::Configuration(format!(
                "Abundance table has {} cluster ids but {} rows of counts",
                cluster_ids.len(),
                counts.len()
            )));
        }
        for (cluster_id, row) in cluster_ids.iter().zip(counts.iter()) {
            if row.len() != sample_ids.len() {
                return Err(MostWantedError::Configuration(format!(
                    "Cluster {} has {} abundance values but the table has {} samples",
                    cluster_id,
                    row.len(),
                    sample_ids.len()
                )));
            }
            if row.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(MostWantedError::Configuration(format!(
                    "Cluster {} has negative or non-numeric abundances",
                    cluster_id
                )));
            }
        }

        let mut cluster_index = HashMap::new();
        for (i, cluster_id) in cluster_ids.iter().enumerate() {
            if cluster_index.insert(cluster_id.clone(), i).is_some() {
                return Err(MostWantedError::Configuration(format!(
                    "The cluster {} was found multiple times in the abundance table",
                    cluster_id
                )));
            }
        }
        let mut seen_samples = std::collections::HashSet::new();
        for sample_id in &sample_ids {
            if !seen_samples.insert(sample_id) {
                return Err(MostWantedError::Configuration(format!(
                    "The sample {} was found multiple times in the abundance table",
                    sample_id
                )));
            }
        }

        Ok(AbundanceTable {
            taxonomy: vec![None; cluster_ids.len()],
            sample_metadata: vec![BTreeMap::new(); sample_ids.len()],
            cluster_ids,
            sample_ids,
            counts,
            cluster_index,
        })
    }

    pub fn with_taxonomy(mut self, taxonomy: Vec<String>) -> Result<AbundanceTable> {
        if taxonomy.len() != self.cluster_ids.len() {
            return Err(MostWantedError::Configuration(format!(
                "Found {} taxonomy strings for {} clusters",
                taxonomy.len(),
                self.cluster_ids.len()
            )));
        }
        self.taxonomy = taxonomy.into_iter().map(Some).collect();
        Ok(self)
    }

    /// Attach mapping file metadata to each sample in the table. Mapping
    /// entries for samples not in the table are ignored.
    pub fn with_sample_metadata(mut self, metadata: &SampleMetadata) -> AbundanceTable {
        let mut attached = 0;
        for (i, sample_id) in self.sample_ids.iter().enumerate() {
            if let Some(columns) = metadata.get(sample_id) {
                self.sample_metadata[i].extend(columns.iter().map(|(k, v)| (k.clone(), v.clone())));
                attached += 1;
            }
        }
        debug!(
            "Attached metadata to {} of {} samples",
            attached,
            self.sample_ids.len()
        );
        self
    }

    /// For a table already collapsed by `category`, where each sample id is a
    /// category value: record each sample as belonging to its own group.
    pub fn collapsed_by(mut self, category: &str) -> AbundanceTable {
        for (i, sample_id) in self.sample_ids.iter().enumerate() {
            self.sample_metadata[i].insert(category.to_string(), sample_id.clone());
        }
        self
    }

    pub fn cluster_ids(&self) -> &[String] {
        &self.cluster_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn contains_cluster(&self, cluster_id: &str) -> bool {
        self.cluster_index.contains_key(cluster_id)
    }

    pub fn row(&self, cluster_id: &str) -> Option<&[f64]> {
        self.cluster_index
            .get(cluster_id)
            .map(|i| self.counts[*i].as_slice())
    }

    pub fn row_total(&self, cluster_id: &str) -> Option<f64> {
        self.row(cluster_id).map(|row| row.iter().sum())
    }

    pub fn taxonomy(&self, cluster_id: &str) -> Option<&str> {
        self.cluster_index
            .get(cluster_id)
            .and_then(|i| self.taxonomy[*i].as_deref())
    }

    /// Value of `category` for the sample at `sample_index`.
    pub fn sample_category(&self, sample_index: usize, category: &str) -> Option<&str> {
        self.sample_metadata
            .get(sample_index)
            .and_then(|m| m.get(category))
            .map(|s| s.as_str())
    }

    pub fn from_tsv_path(path: &str) -> Result<AbundanceTable> {
        let file = std::fs::File::open(path).map_err(|e| MostWantedError::io(path, e))?;
        let table = AbundanceTable::from_tsv_reader(file, path)?;
        info!(
            "Read abundance table {} with {} clusters and {} samples",
            path,
            table.cluster_ids.len(),
            table.sample_ids.len()
        );
        Ok(table)
    }

    /// Read a classic tab-separated OTU table: a `#OTU ID` header naming the
    /// samples and optionally a trailing taxonomy column. Other `#` lines are
    /// ignored.
    pub fn from_tsv_reader<R: Read>(reader: R, source_name: &str) -> Result<AbundanceTable> {
        let mut rdr = tsv_reader_builder().from_reader(reader);

        let mut sample_ids: Option<Vec<String>> = None;
        let mut has_taxonomy = false;
        let mut cluster_ids = vec![];
        let mut counts = vec![];
        let mut taxonomy = vec![];

        for record_res in rdr.records() {
            let record = record_res.map_err(|e| MostWantedError::Csv {
                path: source_name.to_string(),
                source: e,
            })?;
            let line_number = record_line_number(&record);
            let first = record.get(0).unwrap_or("");
            if first == OTU_TABLE_HEADER {
                let mut header: Vec<String> = record.iter().skip(1).map(|s| s.to_string()).collect();
                if let Some(last) = header.last() {
                    if TAXONOMY_COLUMNS.contains(&last.as_str()) {
                        has_taxonomy = true;
                        header.pop();
                    }
                }
                trace!("Found OTU table samples {:?}", header);
                sample_ids = Some(header);
                continue;
            }
            if first.starts_with('#') || (record.len() == 1 && first.trim().is_empty()) {
                continue;
            }

            let num_samples = match &sample_ids {
                Some(samples) => samples.len(),
                None => {
                    return Err(MostWantedError::malformed(
                        line_number,
                        &join_record(&record),
                        "abundance row found before the '#OTU ID' header",
                    ))
                }
            };
            let expected_fields = 1 + num_samples + if has_taxonomy { 1 } else { 0 };
            if record.len() != expected_fields {
                return Err(MostWantedError::malformed(
                    line_number,
                    &join_record(&record),
                    &format!("expected {} fields, found {}", expected_fields, record.len()),
                ));
            }
            let mut row = Vec::with_capacity(num_samples);
            for field in record.iter().skip(1).take(num_samples) {
                row.push(field.trim().parse::<f64>().map_err(|_| {
                    MostWantedError::malformed(
                        line_number,
                        &join_record(&record),
                        &format!("abundance '{}' is not a number", field),
                    )
                })?);
            }
            cluster_ids.push(first.to_string());
            counts.push(row);
            if has_taxonomy {
                taxonomy.push(record[expected_fields - 1].to_string());
            }
        }

        let sample_ids = match sample_ids {
            Some(s) => s,
            None => {
                return Err(MostWantedError::Configuration(format!(
                    "No '{}' header line found in abundance table {}",
                    OTU_TABLE_HEADER, source_name
                )))
            }
        };
        let table = AbundanceTable::new(cluster_ids, sample_ids, counts)?;
        if has_taxonomy {
            table.with_taxonomy(taxonomy)
        } else {
            Ok(table)
        }
    }
}

/// Read a QIIME mapping file: a `#SampleID` header naming the columns, then
/// one sample per line.
pub fn read_mapping_file(path: &str) -> Result<SampleMetadata> {
    let file = std::fs::File::open(path).map_err(|e| MostWantedError::io(path, e))?;
    let metadata = read_mapping(file, path)?;
    info!("Read metadata for {} samples from {}", metadata.len(), path);
    Ok(metadata)
}

pub fn read_mapping<R: Read>(reader: R, source_name: &str) -> Result<SampleMetadata> {
    let mut rdr = tsv_reader_builder().from_reader(reader);
    let mut columns: Option<Vec<String>> = None;
    let mut metadata = SampleMetadata::new();

    for record_res in rdr.records() {
        let record = record_res.map_err(|e| MostWantedError::Csv {
            path: source_name.to_string(),
            source: e,
        })?;
        let line_number = record_line_number(&record);
        let first = record.get(0).unwrap_or("");
        if first == MAPPING_FILE_HEADER {
            columns = Some(record.iter().skip(1).map(|s| s.to_string()).collect());
            continue;
        }
        if first.starts_with('#') || (record.len() == 1 && first.trim().is_empty()) {
            continue;
        }
        let column_names = match &columns {
            Some(c) => c,
            None => {
                return Err(MostWantedError::malformed(
                    line_number,
                    &join_record(&record),
                    "sample found before the '#SampleID' header",
                ))
            }
        };
        if record.len() != column_names.len() + 1 {
            return Err(MostWantedError::malformed(
                line_number,
                &join_record(&record),
                &format!(
                    "expected {} fields, found {}",
                    column_names.len() + 1,
                    record.len()
                ),
            ));
        }
        let values: BTreeMap<String, String> = column_names
            .iter()
            .cloned()
            .zip(record.iter().skip(1).map(|s| s.to_string()))
            .collect();
        if metadata.insert(first.to_string(), values).is_some() {
            return Err(MostWantedError::malformed(
                line_number,
                &join_record(&record),
                &format!("the sample {} was found multiple times", first),
            ));
        }
    }
    Ok(metadata)
}

fn tsv_reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false);
    builder
}

fn record_line_number(record: &csv::StringRecord) -> usize {
    record.position().map(|p| p.line() as usize).unwrap_or(0)
}

fn join_record(record: &csv::StringRecord) -> String {
    record.iter().collect::<Vec<_>>().join("\t")
}
