use std;
use std::collections::BTreeMap;
use std::iter::FromIterator;

use needletail::errors::ParseErrorKind;
use needletail::{parse_fastx_file, FastxReader};

use crate::error::{MostWantedError, Result};

/// Representative sequence of each cluster, keyed by cluster id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepSetLookup {
    sequences: BTreeMap<String, String>,
}

impl RepSetLookup {
    /// Parse FASTA formatted lines. Multi-line sequences are joined, keeping
    /// only letters.
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Result<RepSetLookup> {
        let mut sequences = BTreeMap::new();
        let mut current: Option<(String, String)> = None;

        for (i, raw_line) in lines.iter().enumerate() {
            let line = raw_line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            if let Some(header) = line.strip_prefix('>') {
                if let Some((id, seq)) = current.take() {
                    insert_unique(&mut sequences, id, seq, i + 1, line)?;
                }
                let id = match header.split_whitespace().next() {
                    Some(id) => id.to_string(),
                    None => {
                        return Err(MostWantedError::malformed(
                            i + 1,
                            line,
                            "sequence header without an identifier",
                        ))
                    }
                };
                current = Some((id, String::new()));
            } else {
                match current.as_mut() {
                    Some((_, seq)) => seq.extend(line.chars().filter(|c| c.is_ascii_alphabetic())),
                    None => {
                        return Err(MostWantedError::malformed(
                            i + 1,
                            line,
                            "sequence data found before the first '>' header",
                        ))
                    }
                }
            }
        }
        if let Some((id, seq)) = current.take() {
            insert_unique(&mut sequences, id, seq, lines.len(), "")?;
        }
        debug!("Read {} representative sequences", sequences.len());
        Ok(RepSetLookup { sequences })
    }

    /// Read a FASTA file of representative sequences.
    pub fn from_path(path: &str) -> Result<RepSetLookup> {
        let fasta_error = |message: String| MostWantedError::Fasta {
            path: path.to_string(),
            message,
        };
        let mut reader: Box<dyn FastxReader> = match parse_fastx_file(path) {
            Ok(reader) => reader,
            Err(e) if matches!(e.kind, ParseErrorKind::EmptyFile) => {
                warn!("No representative sequences found in empty file {}", path);
                return Ok(RepSetLookup::default());
            }
            Err(e) => return Err(fasta_error(e.to_string())),
        };

        let mut sequences = BTreeMap::new();
        while let Some(record) = reader.next() {
            let record = record.map_err(|e| fasta_error(e.to_string()))?;
            let header = String::from_utf8_lossy(record.id()).into_owned();
            let id = match header.split_whitespace().next() {
                Some(id) => id.to_string(),
                None => return Err(fasta_error("Found a record with an empty identifier".to_string())),
            };
            let seq: String = record
                .seq()
                .iter()
                .filter(|b| b.is_ascii_alphabetic())
                .map(|b| *b as char)
                .collect();
            trace!("Read representative sequence {} of length {}", id, seq.len());
            if sequences.insert(id.clone(), seq).is_some() {
                return Err(fasta_error(format!(
                    "The sequence {} was found multiple times",
                    id
                )));
            }
        }
        info!("Read {} representative sequences from {}", sequences.len(), path);
        Ok(RepSetLookup { sequences })
    }

    pub fn get(&self, cluster_id: &str) -> Option<&str> {
        self.sequences.get(cluster_id).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RepSetLookup {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RepSetLookup {
            sequences: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn insert_unique(
    sequences: &mut BTreeMap<String, String>,
    id: String,
    seq: String,
    line_number: usize,
    line: &str,
) -> Result<()> {
    if sequences.contains_key(&id) {
        return Err(MostWantedError::malformed(
            line_number,
            line,
            &format!("the sequence {} was found multiple times", id),
        ));
    }
    sequences.insert(id, seq);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    const REP_SET: &str = "
>New.CleanUp.ReferenceOTU999 S1_18210
ATACGGAGGGTGCAAGCGTTAATCGGAATTACTGGGCGTAAAGGGTGCGTAGGCGGATGTTTAAGTGGGATGTGAAATCCCCGGGCTTAACCTGGGGGCTGC
>10113 S1_88960
ATACGGAGGGTGCAAGCGTTAATCGGAATTACTGGGCGTAAAGCGCACGCAGGCGGTCTGTTAAGTCAGATGTGAAATCCCCGGGCTCCACCTGGGCACTGC
>102506 S1_46428
ATACGTATGGTGCAAGCGTTATCCGGATTTACTGGGTGTAAAGGGAGCGCAGGCGGTACGGCAAGTCTGATGTGAAAGTCCGGGGCTCAACCCCGGTACTGC
AAACGTAGGGTGCAAGCGTTGTCCGGAATTACTGGGTGTAAAGGGAGCGTAGACGGCTGTGCAAGTCTGAAGTGAAAGGCATGGGCTCAACCTGTGGACTGC
>New.CleanUp.ReferenceOTU969 S2_166346
ATACGTAGGTCCCGAGCGTTGTCCGGATTTACTGGGTGTAAAGGGAGCGTAGACGGCATGGCAAGTCTGAAGTGAAAACCCAGGGCTCAACCCTGGGACTGC
";

    #[test]
    fn test_rep_set_lookup() {
        init();
        let lines: Vec<&str> = REP_SET.split('\n').collect();
        let lookup = RepSetLookup::from_lines(&lines).unwrap();
        assert_eq!(4, lookup.len());
        assert_eq!(
            Some("ATACGGAGGGTGCAAGCGTTAATCGGAATTACTGGGCGTAAAGCGCACGCAGGCGGTCTGTTAAGTCAGATGTGAAATCCCCGGGCTCCACCTGGGCACTGC"),
            lookup.get("10113")
        );
        assert_eq!(
            Some("ATACGTATGGTGCAAGCGTTATCCGGATTTACTGGGTGTAAAGGGAGCGCAGGCGGTACGGCAAGTCTGATGTGAAAGTCCGGGGCTCAACCCCGGTACTGCAAACGTAGGGTGCAAGCGTTGTCCGGAATTACTGGGTGTAAAGGGAGCGTAGACGGCTGTGCAAGTCTGAAGTGAAAGGCATGGGCTCAACCTGTGGACTGC"),
            lookup.get("102506")
        );
        assert_eq!(None, lookup.get("S1_18210"));
    }

    #[test]
    fn test_rep_set_strips_non_letters() {
        init();
        let lookup = RepSetLookup::from_lines(&[">a desc", "AC GT", "-", "NN\r"]).unwrap();
        assert_eq!(Some("ACGTNN"), lookup.get("a"));
    }

    #[test]
    fn test_rep_set_malformed() {
        init();
        match RepSetLookup::from_lines(&["ACGT", ">a", "ACGT"]) {
            Err(MostWantedError::MalformedInput { line_number, .. }) => assert_eq!(1, line_number),
            other => panic!("Unexpected result {:?}", other),
        }
        assert!(RepSetLookup::from_lines(&[">a", "A", ">a", "C"]).is_err());
        assert!(RepSetLookup::from_lines(&[">", "A"]).is_err());
    }

    #[test]
    fn test_rep_set_from_path() {
        init();
        let lookup = RepSetLookup::from_path("tests/data/report/rep_set.fna").unwrap();
        assert_eq!(5, lookup.len());
        assert_eq!(Some("AGTCCA"), lookup.get("otu1"));
        assert_eq!(Some("AAGGTTCCAAGGTT"), lookup.get("otu2"));
    }

    #[test]
    fn test_rep_set_empty_inputs() {
        init();
        let td = tempfile::TempDir::new().unwrap();
        let empty = td.path().join("empty.fna");
        std::fs::write(&empty, "").unwrap();
        let from_file = RepSetLookup::from_path(empty.to_str().unwrap()).unwrap();
        assert!(from_file.is_empty());
        let no_lines: Vec<&str> = vec![];
        assert_eq!(from_file, RepSetLookup::from_lines(&no_lines).unwrap());
    }
}
