use std::path::Path;

use crate::abundance_table::AbundanceTable;
use crate::blast_hit_reducer::RankedClusterEntry;
use crate::category_abundance;
use crate::error::{MostWantedError, Result};
use crate::format_real;
use crate::pie_chart::{self, PlotRequest, PLOT_HEIGHT, PLOT_WIDTH};
use crate::rep_set::RepSetLookup;

const NCBI_NUCCORE_URL: &str = "http://www.ncbi.nlm.nih.gov/nuccore/";

/// Text, HTML and FASTA renderings of the same ranked clusters, plus the
/// pie charts the HTML refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportArtifacts {
    pub text_table: String,
    pub html_table: String,
    pub fasta_sequences: String,
    pub plot_image_paths: Vec<String>,
    pub plot_data_paths: Vec<String>,
    pub plot_requests: Vec<PlotRequest>,
}

pub struct ReportRenderer<'a> {
    /// Where plot images and data are to be written. The HTML refers to
    /// images relative to this directory's parent.
    pub output_dir: &'a str,
    pub category: &'a str,
    pub suppress_taxonomy: bool,
    pub max_pie_slices: usize,
}

impl ReportRenderer<'_> {
    /// Render the ranked clusters in rank order. Nothing is written to disk;
    /// the returned plot requests say what should be drawn where.
    pub fn render(
        &self,
        ranked: &[RankedClusterEntry],
        sequences: &RepSetLookup,
        table: &AbundanceTable,
    ) -> Result<ReportArtifacts> {
        let mut text_table = String::from("#\tOTU ID\tSequence\t");
        let mut html_table =
            String::from("<table id=\"most_wanted_otus_table\" border=\"border\"><tr><th>#</th><th>OTU</th>");
        if !self.suppress_taxonomy {
            text_table.push_str("Greengenes taxonomy\t");
            html_table.push_str("<th>Greengenes taxonomy</th>");
        }
        text_table.push_str("NCBI nt closest match\tNCBI nt % identity\n");
        html_table.push_str(&format!(
            "<th>NCBI nt closest match</th><th>Abundance by {}</th></tr>",
            self.category
        ));

        let mut fasta_sequences = String::new();
        let mut plot_requests = vec![];

        for (i, (cluster_id, subject_id, percent_identity)) in ranked.iter().enumerate() {
            let rank = i + 1;
            let sequence = sequences
                .get(cluster_id)
                .ok_or_else(|| MostWantedError::MissingSequence(cluster_id.clone()))?;
            let accession = accession(subject_id)?;
            let identity = format_real(*percent_identity);
            let taxonomy = if self.suppress_taxonomy {
                None
            } else {
                if !table.contains_cluster(cluster_id) {
                    return Err(MostWantedError::MissingCluster(cluster_id.clone()));
                }
                Some(table.taxonomy(cluster_id).ok_or_else(|| {
                    MostWantedError::Configuration(format!(
                        "Cluster {} has no taxonomy in the abundance table. Suppress taxonomy to report it without",
                        cluster_id
                    ))
                })?)
            };

            let distribution = category_abundance::aggregate(cluster_id, table, self.category)?;
            let slices = pie_chart::select_slices(
                &distribution.labels(),
                &distribution.counts(),
                self.max_pie_slices,
            )?;
            let plot_name = format!("abundance_by_{}_{}", self.category, cluster_id);
            let plot_request = PlotRequest {
                cluster_id: cluster_id.clone(),
                image_path: output_path(self.output_dir, &format!("{}.png", plot_name)),
                data_path: output_path(self.output_dir, &format!("{}.p", plot_name)),
                slices,
            };
            debug!(
                "Rank {}: {} best matches {} at {}%",
                rank, cluster_id, accession, identity
            );

            text_table.push_str(&format!("{}\t{}\t{}\t", rank, cluster_id, sequence));
            if let Some(taxonomy) = taxonomy {
                text_table.push_str(&format!("{}\t", taxonomy));
            }
            text_table.push_str(&format!("{}\t{}\n", accession, identity));

            html_table.push_str(&format!(
                "<tr><td>{}</td><td><pre>&gt;{}\n{}</pre></td>",
                rank, cluster_id, sequence
            ));
            if let Some(taxonomy) = taxonomy {
                html_table.push_str(&format!("<td>{}</td>", taxonomy));
            }
            html_table.push_str(&format!(
                "<td><a href=\"{}{}\" target=\"_blank\">{}</a> ({}% sim.)</td>",
                NCBI_NUCCORE_URL, accession, accession, identity
            ));
            // The outer cell is left open, as existing report consumers expect
            html_table.push_str(&format!(
                "<td><table><tr><td><img src=\"{}\" width=\"{}\" height=\"{}\" /></td><td>{}</td></tr></table></tr>",
                self.html_image_src(&plot_name),
                PLOT_WIDTH,
                PLOT_HEIGHT,
                pie_chart::format_legend_html(&plot_request.slices)
            ));

            fasta_sequences.push_str(&format!(">{}\n{}\n", cluster_id, sequence));
            plot_requests.push(plot_request);
        }
        html_table.push_str("</table>");

        Ok(ReportArtifacts {
            text_table,
            html_table,
            fasta_sequences,
            plot_image_paths: plot_requests.iter().map(|p| p.image_path.clone()).collect(),
            plot_data_paths: plot_requests.iter().map(|p| p.data_path.clone()).collect(),
            plot_requests,
        })
    }

    fn html_image_src(&self, plot_name: &str) -> String {
        let file_name = format!("{}.png", plot_name);
        match Path::new(self.output_dir).file_name().and_then(|s| s.to_str()) {
            Some(dir_name) => format!("{}/{}", dir_name, file_name),
            None => file_name,
        }
    }
}

/// The accession of a `gi|<num>|emb|<accession>|` subject id.
pub fn accession(subject_id: &str) -> Result<&str> {
    match subject_id.split('|').nth(3) {
        Some(acc) if !acc.is_empty() => Ok(acc),
        _ => Err(MostWantedError::InvalidSubjectId(subject_id.to_string())),
    }
}

fn output_path(dir: &str, file_name: &str) -> String {
    Path::new(dir).join(file_name).to_string_lossy().into_owned()
}
