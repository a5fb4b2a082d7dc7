use std;
use std::io::{BufReader, BufWriter};

use serde::{Deserialize, Serialize};

use crate::error::{MostWantedError, Result};

/// Slice colours. A slice's colour is chosen by the position of its label in
/// the input, not by its rank, so two kept slices can share a colour when
/// their input positions differ by a multiple of the palette length. Existing
/// reports rely on this, so it is kept.
pub const PALETTE: [&str; 29] = [
    "#ff0000", "#0000ff", "#f27304", "#008000", "#91278d", "#ffff00", "#7cecf4", "#f49ac2",
    "#5da09e", "#6b440b", "#808080", "#f79679", "#7da9d8", "#fcc688", "#80c99b", "#a287bf",
    "#fff899", "#c49c6b", "#c0c0c0", "#ed008a", "#00b6ff", "#a54700", "#808000", "#008080",
    "#800000", "#000080", "#ff00ff", "#00ff00", "#000000",
];

pub const PLOT_WIDTH: u32 = 300;
pub const PLOT_HEIGHT: u32 = 300;

/// Positionally aligned slice fractions, display labels and colours.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PieSliceSet {
    pub fractions: Vec<f64>,
    pub labels: Vec<String>,
    pub colors: Vec<String>,
}

impl PieSliceSet {
    pub fn len(&self) -> usize {
        self.fractions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fractions.is_empty()
    }
}

/// Keep the `max_slices` largest counts (ties in input order) and express each
/// as a fraction of the kept total.
pub fn select_slices<S: AsRef<str>>(
    labels: &[S],
    counts: &[f64],
    max_slices: usize,
) -> Result<PieSliceSet> {
    if labels.len() != counts.len() {
        return Err(MostWantedError::Configuration(format!(
            "Found {} pie chart labels but {} counts",
            labels.len(),
            counts.len()
        )));
    }
    if max_slices == 0 {
        return Err(MostWantedError::Configuration(
            "The maximum number of pie chart slices must be at least 1".to_string(),
        ));
    }
    if let Some(bad) = counts.iter().find(|c| !c.is_finite() || **c < 0.0) {
        return Err(MostWantedError::Configuration(format!(
            "Pie chart counts must be non-negative, found {}",
            bad
        )));
    }

    let mut indexed: Vec<(usize, f64)> = counts.iter().cloned().enumerate().collect();
    // sort_by is stable, so equal counts keep their input order
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed.truncate(max_slices);

    let total: f64 = indexed.iter().map(|(_, count)| count).sum();
    if total <= 0.0 {
        warn!("No abundance to plot among the {} largest groups", indexed.len());
        return Ok(PieSliceSet::default());
    }

    let mut slices = PieSliceSet::default();
    for (original_index, count) in indexed {
        let fraction = count / total;
        slices.fractions.push(fraction);
        slices.labels.push(format!(
            "{} ({:.2}%)",
            labels[original_index].as_ref(),
            fraction * 100.0
        ));
        slices
            .colors
            .push(PALETTE[original_index % PALETTE.len()].to_string());
    }
    Ok(slices)
}

/// HTML legend: one coloured key per slice.
pub fn format_legend_html(slices: &PieSliceSet) -> String {
    let mut html = String::from("<ul class=\"most_wanted_otus_legend\">");
    for (label, color) in slices.labels.iter().zip(slices.colors.iter()) {
        html.push_str(&format!(
            "<li><div class=\"key\" style=\"background-color:{}\"></div>{}</li>",
            color, label
        ));
    }
    html.push_str("</ul>");
    html
}

/// A pie chart to be drawn for one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotRequest {
    pub cluster_id: String,
    pub slices: PieSliceSet,
    pub image_path: String,
    pub data_path: String,
}

/// Draws pie charts. Image rendering happens outside this crate, so
/// implementations decide what to do with the image path.
pub trait PieChartRenderer {
    fn render(&self, request: &PlotRequest) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PlotData {
    pub width: u32,
    pub height: u32,
    pub image_path: String,
    pub slices: PieSliceSet,
}

/// Persists the data needed to regenerate each plot offline as JSON at the
/// request's data path. Does not draw the image itself.
pub struct PlotDataWriter;

impl PieChartRenderer for PlotDataWriter {
    fn render(&self, request: &PlotRequest) -> Result<()> {
        let path = &request.data_path;
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| MostWantedError::io(path, e))?;
        }
        let file = std::fs::File::create(path).map_err(|e| MostWantedError::io(path, e))?;
        let data = PlotData {
            width: PLOT_WIDTH,
            height: PLOT_HEIGHT,
            image_path: request.image_path.clone(),
            slices: request.slices.clone(),
        };
        serde_json::to_writer_pretty(BufWriter::new(file), &data).map_err(|e| {
            MostWantedError::Json {
                path: path.to_string(),
                source: e,
            }
        })?;
        debug!("Wrote plot data for {} to {}", request.cluster_id, path);
        Ok(())
    }
}

pub fn read_plot_data(path: &str) -> Result<PlotData> {
    let file = std::fs::File::open(path).map_err(|e| MostWantedError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| MostWantedError::Json {
        path: path.to_string(),
        source: e,
    })
}
