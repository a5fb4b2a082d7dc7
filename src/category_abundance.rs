use crate::abundance_table::AbundanceTable;
use crate::error::{MostWantedError, Result};

/// Abundance of one cluster summed within each value of a sample category.
/// Groups are in order of first appearance across the table's samples.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryDistribution {
    pub cluster_id: String,
    pub groups: Vec<(String, f64)>,
}

impl CategoryDistribution {
    pub fn labels(&self) -> Vec<&str> {
        self.groups.iter().map(|(label, _)| label.as_str()).collect()
    }

    pub fn counts(&self) -> Vec<f64> {
        self.groups.iter().map(|(_, count)| *count).collect()
    }

    pub fn total(&self) -> f64 {
        self.groups.iter().map(|(_, count)| count).sum()
    }
}

/// Sum the abundance of `cluster_id` over the samples of each `category`
/// value. Every sample must have a value for `category`.
pub fn aggregate(
    cluster_id: &str,
    table: &AbundanceTable,
    category: &str,
) -> Result<CategoryDistribution> {
    let row = table
        .row(cluster_id)
        .ok_or_else(|| MostWantedError::MissingCluster(cluster_id.to_string()))?;

    let mut groups: Vec<(String, f64)> = vec![];
    for (sample_index, abundance) in row.iter().enumerate() {
        let group = table.sample_category(sample_index, category).ok_or_else(|| {
            MostWantedError::Configuration(format!(
                "Sample {} has no value for category '{}'",
                table.sample_ids()[sample_index],
                category
            ))
        })?;
        match groups.iter_mut().find(|(label, _)| label == group) {
            Some((_, total)) => *total += abundance,
            None => groups.push((group.to_string(), *abundance)),
        }
    }
    trace!("Abundance of {} by {}: {:?}", cluster_id, category, groups);
    Ok(CategoryDistribution {
        cluster_id: cluster_id.to_string(),
        groups,
    })
}
