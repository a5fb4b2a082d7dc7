use std;
use std::path::Path;

use crate::abundance_table::{read_mapping_file, AbundanceTable};
use crate::blast_hit_reducer::{read_blast_results_file, top_n_blast_results};
use crate::error::{MostWantedError, Result};
use crate::pie_chart::PieChartRenderer;
use crate::rep_set::RepSetLookup;
use crate::report_renderer::{ReportArtifacts, ReportRenderer};

pub const REPORT_BASENAME: &str = "most_wanted_otus";

const HTML_HEADER: &str = r#"<html>
<head>
<meta http-equiv="Content-Type" content="text/html; charset=UTF-8">
<title>Most wanted OTUs</title>
<style type="text/css">
ul.most_wanted_otus_legend {
  list-style-type: none;
  font-size: 11px;
  padding-left: 5px;
}
ul.most_wanted_otus_legend li {
  margin-bottom: 3px;
}
ul.most_wanted_otus_legend div.key {
  display: inline-block;
  width: 10px;
  height: 10px;
  margin-right: 5px;
  border: 1px solid #000000;
}
</style>
</head>
<body>
"#;

const HTML_FOOTER: &str = "\n</body>\n</html>\n";

/// Inputs of the report step, run after the planned pipeline has produced
/// the BLAST results and the filtered master OTU table.
pub struct MostWantedReport<'a> {
    pub blast_results_path: &'a str,
    pub rep_set_path: &'a str,
    pub master_otu_table_path: &'a str,
    /// When absent, the master table is taken to be already collapsed by
    /// `category`, i.e. each sample is one category value.
    pub mapping_path: Option<&'a str>,
    pub category: &'a str,
    pub output_dir: &'a str,
    pub top_n: usize,
    /// Fraction, not percentage
    pub max_nt_similarity: f64,
    pub suppress_taxonomy: bool,
    pub max_pie_slices: usize,
}

#[derive(Debug)]
pub struct WrittenReport {
    pub text_path: String,
    pub html_path: String,
    pub fasta_path: String,
    pub artifacts: ReportArtifacts,
}

impl MostWantedReport<'_> {
    pub fn generate<R: PieChartRenderer>(&self, plotter: &R) -> Result<WrittenReport> {
        if !(0.0..=1.0).contains(&self.max_nt_similarity) {
            return Err(MostWantedError::Configuration(format!(
                "Maximum nt similarity must be a fraction between 0 and 1, found {}",
                self.max_nt_similarity
            )));
        }

        info!("Finding the top {} most wanted OTUs ..", self.top_n);
        let blast_lines = read_blast_results_file(self.blast_results_path)?;
        let ranked = top_n_blast_results(&blast_lines, self.top_n, self.max_nt_similarity)?;
        if ranked.is_empty() {
            warn!("No OTUs passed the nt similarity threshold, the report will be empty");
        }

        let rep_set = RepSetLookup::from_path(self.rep_set_path)?;
        let table = AbundanceTable::from_tsv_path(self.master_otu_table_path)?;
        let table = match self.mapping_path {
            Some(mapping_path) => table.with_sample_metadata(&read_mapping_file(mapping_path)?),
            None => {
                debug!(
                    "No mapping file given, treating samples of {} as {} values",
                    self.master_otu_table_path, self.category
                );
                table.collapsed_by(self.category)
            }
        };

        let plots_dir = output_path(self.output_dir, REPORT_BASENAME);
        create_dir(&plots_dir)?;
        let renderer = ReportRenderer {
            output_dir: &plots_dir,
            category: self.category,
            suppress_taxonomy: self.suppress_taxonomy,
            max_pie_slices: self.max_pie_slices,
        };
        let artifacts = renderer.render(&ranked, &rep_set, &table)?;

        let text_path = output_path(self.output_dir, &format!("{}.txt", REPORT_BASENAME));
        write_file(&text_path, &artifacts.text_table)?;
        let html_path = output_path(self.output_dir, &format!("{}.html", REPORT_BASENAME));
        write_file(
            &html_path,
            &format!("{}{}{}", HTML_HEADER, artifacts.html_table, HTML_FOOTER),
        )?;
        let fasta_path = output_path(self.output_dir, &format!("{}.fasta", REPORT_BASENAME));
        write_file(&fasta_path, &artifacts.fasta_sequences)?;

        info!("Writing abundance plot data for {} OTUs ..", artifacts.plot_requests.len());
        for request in &artifacts.plot_requests {
            plotter.render(request)?;
        }
        info!("Wrote most wanted OTU report to {}", html_path);

        Ok(WrittenReport {
            text_path,
            html_path,
            fasta_path,
            artifacts,
        })
    }
}

fn output_path(dir: &str, file_name: &str) -> String {
    Path::new(dir).join(file_name).to_string_lossy().into_owned()
}

fn create_dir(path: &str) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| MostWantedError::io(path, e))
}

fn write_file(path: &str, contents: &str) -> Result<()> {
    debug!("Writing {}", path);
    std::fs::write(path, contents).map_err(|e| MostWantedError::io(path, e))
}
