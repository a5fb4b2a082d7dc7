use std;
use std::path::Path;

use crate::error::{MostWantedError, Result};
use crate::format_real;

/// Which part of the pipeline a stage belongs to. Stages of a table branch
/// only consume files of the same branch, the merge branch consumes the last
/// output of every table branch, and the shared tail consumes the master
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Table(usize),
    Merge,
    Tail,
}

/// One external tool invocation. `inputs` and `outputs` list the paths the
/// command reads and writes, so the dependency chain can be inspected without
/// parsing command lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStage {
    pub branch: Branch,
    pub description: String,
    pub command: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Ordered list of stages. Execution order is the list order; every input of
/// a stage is either an external file or an output of an earlier stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandPlan {
    stages: Vec<CommandStage>,
}

impl CommandPlan {
    pub fn stages(&self) -> &[CommandStage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Consecutive stages grouped by branch, in execution order.
    pub fn branches(&self) -> Vec<(Branch, Vec<&CommandStage>)> {
        let mut to_return: Vec<(Branch, Vec<&CommandStage>)> = vec![];
        for stage in &self.stages {
            let continues_branch = matches!(to_return.last(), Some((branch, _)) if *branch == stage.branch);
            if continues_branch {
                if let Some((_, stages)) = to_return.last_mut() {
                    stages.push(stage);
                }
            } else {
                to_return.push((stage.branch, vec![stage]));
            }
        }
        to_return
    }

    /// Render as a shell script, each command preceded by its description.
    pub fn to_script(&self) -> String {
        let mut script = String::from("#!/bin/bash\nset -e\n");
        for stage in &self.stages {
            script.push_str(&format!("\n# {}\n{}\n", stage.description, stage.command));
        }
        script
    }

    fn push(
        &mut self,
        branch: Branch,
        description: String,
        command: String,
        inputs: Vec<String>,
        outputs: Vec<String>,
    ) {
        trace!("Planned stage '{}': {}", description, command);
        self.stages.push(CommandStage {
            branch,
            description,
            command,
            inputs,
            outputs,
        })
    }
}

/// The plan plus the files the report step needs once it has been run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPipeline {
    pub plan: CommandPlan,
    pub blast_results_path: String,
    pub candidate_fasta_path: String,
    pub master_otu_table_path: String,
}

pub struct MostWantedPlanner<'a> {
    pub output_dir: &'a str,
    pub otu_table_paths: Vec<&'a str>,
    pub rep_set_path: &'a str,
    pub reference_db_path: &'a str,
    pub nt_db_path: &'a str,
    pub mapping_path: &'a str,
    pub category: &'a str,
    pub min_abundance: u64,
    pub max_abundance: u64,
    pub min_groups: u32,
    /// Fraction, not percentage
    pub max_reference_similarity: f64,
    pub e_value: f64,
    pub word_size: u32,
    /// Use this table as the master table instead of building one from
    /// `otu_table_paths`.
    pub master_otu_table_path: Option<&'a str>,
    pub jobs: usize,
}

impl MostWantedPlanner<'_> {
    /// Build the filtering / alignment plan. Performs no I/O, and output file
    /// names depend only on the input names and parameters.
    pub fn plan(&self) -> Result<PlannedPipeline> {
        self.validate()?;
        let mut plan = CommandPlan::default();

        let master_otu_table = match self.master_otu_table_path {
            Some(master) => {
                debug!("Using pre-merged master OTU table {}", master);
                master.to_string()
            }
            None => {
                let mut collapsed_tables = vec![];
                for (i, otu_table) in self.otu_table_paths.iter().enumerate() {
                    collapsed_tables.push(self.plan_table_branch(&mut plan, i, otu_table)?);
                }
                self.plan_merge(&mut plan, &collapsed_tables)
            }
        };

        let master_stem = file_stem(&master_otu_table)?;
        let ms_table = output_path(
            self.output_dir,
            &format!("{}_ms{}.biom", master_stem, self.min_groups),
        );
        plan.push(
            Branch::Tail,
            format!(
                "Filtering OTU table to include only OTUs that appear in at least {} sample groups",
                self.min_groups
            ),
            format!(
                "filter_otus_from_otu_table.py -i {} -o {} -s {}",
                master_otu_table, ms_table, self.min_groups
            ),
            vec![master_otu_table.clone()],
            vec![ms_table.clone()],
        );

        let candidates_stem = format!("{}_candidates", file_stem(self.rep_set_path)?);
        let candidates = output_path(self.output_dir, &format!("{}.fna", candidates_stem));
        plan.push(
            Branch::Tail,
            "Filtering representative set to include only the latest candidate OTUs".to_string(),
            format!(
                "filter_fasta.py -f {} -o {} -b {}",
                self.rep_set_path, candidates, ms_table
            ),
            vec![self.rep_set_path.to_string(), ms_table.clone()],
            vec![candidates.clone()],
        );

        let similarity = format_real(self.max_reference_similarity);
        let uclust_dir = output_path(
            self.output_dir,
            &format!(
                "most_wanted_candidates_{}_{}",
                file_name(self.reference_db_path)?,
                similarity
            ),
        );
        let failures_list = output_path(&uclust_dir, &format!("{}_failures.txt", candidates_stem));
        plan.push(
            Branch::Tail,
            "Running uclust to get list of sequences that don't hit the maximum GG similarity threshold"
                .to_string(),
            format!(
                "parallel_pick_otus_uclust_ref.py -i {} -o {} -r {} -s {} -O {}",
                candidates, uclust_dir, self.reference_db_path, similarity, self.jobs
            ),
            vec![candidates.clone(), self.reference_db_path.to_string()],
            vec![uclust_dir.clone(), failures_list.clone()],
        );

        let failures_stem = format!("{}_failures", candidates_stem);
        let failures_fasta = output_path(self.output_dir, &format!("{}.fna", failures_stem));
        plan.push(
            Branch::Tail,
            "Filtering candidate sequences to only include uclust failures".to_string(),
            format!(
                "filter_fasta.py -f {} -s {} -o {}",
                candidates, failures_list, failures_fasta
            ),
            vec![candidates.clone(), failures_list],
            vec![failures_fasta.clone()],
        );

        let blast_dir = output_path(self.output_dir, "blast_output");
        let blast_results = output_path(&blast_dir, &format!("{}_blast_out.txt", failures_stem));
        plan.push(
            Branch::Tail,
            "BLASTing filtered candidate sequences against nt database".to_string(),
            format!(
                "parallel_blast.py -i {} -o {} -r {} -D -e {:.6} -w {} -O {}",
                failures_fasta, blast_dir, self.nt_db_path, self.e_value, self.word_size, self.jobs
            ),
            vec![failures_fasta.clone(), self.nt_db_path.to_string()],
            vec![blast_dir, blast_results.clone()],
        );

        debug!("Planned {} pipeline stages", plan.len());
        Ok(PlannedPipeline {
            plan,
            blast_results_path: blast_results,
            candidate_fasta_path: failures_fasta,
            master_otu_table_path: ms_table,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.master_otu_table_path.is_none() {
            if self.otu_table_paths.len() < 2 {
                return Err(MostWantedError::Configuration(format!(
                    "Merging OTU tables requires at least 2 input tables, but {} were given. \
                     Specify more tables or a pre-merged master OTU table",
                    self.otu_table_paths.len()
                )));
            }
        } else if !self.otu_table_paths.is_empty() {
            warn!(
                "A master OTU table was given, so the {} input OTU tables are ignored",
                self.otu_table_paths.len()
            );
        }
        if self.min_abundance > self.max_abundance {
            return Err(MostWantedError::Configuration(format!(
                "Minimum abundance {} is greater than maximum abundance {}",
                self.min_abundance, self.max_abundance
            )));
        }
        if !(0.0..=1.0).contains(&self.max_reference_similarity) {
            return Err(MostWantedError::Configuration(format!(
                "Maximum reference similarity must be a fraction between 0 and 1, found {}",
                self.max_reference_similarity
            )));
        }
        if self.jobs == 0 {
            return Err(MostWantedError::Configuration(
                "At least one parallel job is required".to_string(),
            ));
        }
        // The BLAST command carries the e-value with six decimal places.
        let printed_e_value: f64 = format!("{:.6}", self.e_value).parse().unwrap_or(0.0);
        if self.e_value.is_nan() || self.e_value <= 0.0 || printed_e_value == 0.0 {
            return Err(MostWantedError::Configuration(format!(
                "E-value must be at least 0.000001 to be passed to parallel_blast.py, found {}",
                self.e_value
            )));
        }
        Ok(())
    }

    /// Plan the four per-table stages, returning the collapsed table path.
    fn plan_table_branch(&self, plan: &mut CommandPlan, index: usize, otu_table: &str) -> Result<String> {
        let branch = Branch::Table(index);
        let stem = file_stem(otu_table)?;

        let novel = output_path(self.output_dir, &format!("{}_novel.biom", stem));
        plan.push(
            branch,
            "Filtering out all GG reference OTUs".to_string(),
            format!(
                "filter_otus_from_otu_table.py -i {} -o {} -e {}",
                otu_table, novel, self.reference_db_path
            ),
            vec![otu_table.to_string(), self.reference_db_path.to_string()],
            vec![novel.clone()],
        );

        let abundance_stem = format!(
            "{}_novel_min{}_max{}",
            stem, self.min_abundance, self.max_abundance
        );
        let abundance_filtered = output_path(self.output_dir, &format!("{}.biom", abundance_stem));
        plan.push(
            branch,
            "Filtering out all OTUs that do not fall within the specified abundance threshold"
                .to_string(),
            format!(
                "filter_otus_from_otu_table.py -i {} -o {} -n {} -x {}",
                novel, abundance_filtered, self.min_abundance, self.max_abundance
            ),
            vec![novel],
            vec![abundance_filtered.clone()],
        );

        let known_stem = format!("{}_known_samples", abundance_stem);
        let known_samples = output_path(self.output_dir, &format!("{}.biom", known_stem));
        plan.push(
            branch,
            "Filtering out samples that are not in the mapping file".to_string(),
            format!(
                "filter_samples_from_otu_table.py -i {} -o {} --sample_id_fp {}",
                abundance_filtered, known_samples, self.mapping_path
            ),
            vec![abundance_filtered, self.mapping_path.to_string()],
            vec![known_samples.clone()],
        );

        let collapsed = output_path(
            self.output_dir,
            &format!("{}_{}.biom", known_stem, self.category),
        );
        plan.push(
            branch,
            format!("Collapsing OTU table by {}", self.category),
            format!(
                "summarize_otu_by_cat.py -c {} -o {} -m {} -i {}",
                known_samples, collapsed, self.category, self.mapping_path
            ),
            vec![known_samples, self.mapping_path.to_string()],
            vec![collapsed.clone()],
        );

        Ok(collapsed)
    }

    fn plan_merge(&self, plan: &mut CommandPlan, collapsed_tables: &[String]) -> String {
        let master = output_path(
            self.output_dir,
            &format!(
                "master_otu_table_novel_min{}_max{}_{}.biom",
                self.min_abundance, self.max_abundance, self.category
            ),
        );
        plan.push(
            Branch::Merge,
            "Merging collapsed OTU tables".to_string(),
            format!(
                "merge_otu_tables.py -i {} -o {}",
                collapsed_tables.join(","),
                master
            ),
            collapsed_tables.to_vec(),
            vec![master.clone()],
        );
        master
    }
}

fn output_path(dir: &str, file_name: &str) -> String {
    Path::new(dir).join(file_name).to_string_lossy().into_owned()
}

fn file_stem(path: &str) -> Result<String> {
    match Path::new(path).file_stem().and_then(|s| s.to_str()) {
        Some(stem) => Ok(stem.to_string()),
        None => Err(MostWantedError::Configuration(format!(
            "Unable to derive a file name from path '{}'",
            path
        ))),
    }
}

fn file_name(path: &str) -> Result<String> {
    match Path::new(path).file_name().and_then(|s| s.to_str()) {
        Some(name) => Ok(name.to_string()),
        None => Err(MostWantedError::Configuration(format!(
            "Unable to derive a file name from path '{}'",
            path
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn planner<'a>(tables: Vec<&'a str>, master: Option<&'a str>) -> MostWantedPlanner<'a> {
        MostWantedPlanner {
            output_dir: "/foo",
            otu_table_paths: tables,
            rep_set_path: "/rs.fna",
            reference_db_path: "/gg.fasta",
            nt_db_path: "/nt",
            mapping_path: "/map.txt",
            category: "Env",
            min_abundance: 30,
            max_abundance: 100,
            min_groups: 5,
            max_reference_similarity: 0.70,
            e_value: 1e-4,
            word_size: 25,
            master_otu_table_path: master,
            jobs: 55,
        }
    }

    fn description_and_commands(plan: &CommandPlan) -> Vec<(&str, &str)> {
        plan.stages()
            .iter()
            .map(|s| (s.description.as_str(), s.command.as_str()))
            .collect()
    }

    const TAIL_AFTER_MS: [(&str, &str); 4] = [
        ("Filtering representative set to include only the latest candidate OTUs",
         "filter_fasta.py -f /rs.fna -o /foo/rs_candidates.fna -b MS_TABLE"),
        ("Running uclust to get list of sequences that don't hit the maximum GG similarity threshold",
         "parallel_pick_otus_uclust_ref.py -i /foo/rs_candidates.fna -o /foo/most_wanted_candidates_gg.fasta_0.7 -r /gg.fasta -s 0.7 -O 55"),
        ("Filtering candidate sequences to only include uclust failures",
         "filter_fasta.py -f /foo/rs_candidates.fna -s /foo/most_wanted_candidates_gg.fasta_0.7/rs_candidates_failures.txt -o /foo/rs_candidates_failures.fna"),
        ("BLASTing filtered candidate sequences against nt database",
         "parallel_blast.py -i /foo/rs_candidates_failures.fna -o /foo/blast_output -r /nt -D -e 0.000100 -w 25 -O 55"),
    ];

    #[test]
    fn test_plan_three_tables() {
        init();
        let planned = planner(vec!["/a.biom", "/b.biom", "/c.biom"], None)
            .plan()
            .unwrap();

        let mut expected = vec![];
        for t in &["a", "b", "c"] {
            expected.push((
                "Filtering out all GG reference OTUs".to_string(),
                format!("filter_otus_from_otu_table.py -i /{t}.biom -o /foo/{t}_novel.biom -e /gg.fasta", t = t),
            ));
            expected.push((
                "Filtering out all OTUs that do not fall within the specified abundance threshold".to_string(),
                format!("filter_otus_from_otu_table.py -i /foo/{t}_novel.biom -o /foo/{t}_novel_min30_max100.biom -n 30 -x 100", t = t),
            ));
            expected.push((
                "Filtering out samples that are not in the mapping file".to_string(),
                format!("filter_samples_from_otu_table.py -i /foo/{t}_novel_min30_max100.biom -o /foo/{t}_novel_min30_max100_known_samples.biom --sample_id_fp /map.txt", t = t),
            ));
            expected.push((
                "Collapsing OTU table by Env".to_string(),
                format!("summarize_otu_by_cat.py -c /foo/{t}_novel_min30_max100_known_samples.biom -o /foo/{t}_novel_min30_max100_known_samples_Env.biom -m Env -i /map.txt", t = t),
            ));
        }
        expected.push((
            "Merging collapsed OTU tables".to_string(),
            "merge_otu_tables.py -i /foo/a_novel_min30_max100_known_samples_Env.biom,/foo/b_novel_min30_max100_known_samples_Env.biom,/foo/c_novel_min30_max100_known_samples_Env.biom -o /foo/master_otu_table_novel_min30_max100_Env.biom".to_string(),
        ));
        expected.push((
            "Filtering OTU table to include only OTUs that appear in at least 5 sample groups".to_string(),
            "filter_otus_from_otu_table.py -i /foo/master_otu_table_novel_min30_max100_Env.biom -o /foo/master_otu_table_novel_min30_max100_Env_ms5.biom -s 5".to_string(),
        ));
        for (d, c) in TAIL_AFTER_MS.iter() {
            expected.push((
                d.to_string(),
                c.replace("MS_TABLE", "/foo/master_otu_table_novel_min30_max100_Env_ms5.biom"),
            ));
        }

        let observed: Vec<(String, String)> = description_and_commands(&planned.plan)
            .into_iter()
            .map(|(d, c)| (d.to_string(), c.to_string()))
            .collect();
        assert_eq!(expected, observed);
        assert_eq!(
            "/foo/blast_output/rs_candidates_failures_blast_out.txt",
            planned.blast_results_path
        );
        assert_eq!("/foo/rs_candidates_failures.fna", planned.candidate_fasta_path);
        assert_eq!(
            "/foo/master_otu_table_novel_min30_max100_Env_ms5.biom",
            planned.master_otu_table_path
        );
    }

    #[test]
    fn test_plan_merged_master_otu_table() {
        init();
        let planned = planner(vec!["/a.biom", "/b.biom", "/c.biom"], Some("/master.biom"))
            .plan()
            .unwrap();

        let mut expected = vec![(
            "Filtering OTU table to include only OTUs that appear in at least 5 sample groups".to_string(),
            "filter_otus_from_otu_table.py -i /master.biom -o /foo/master_ms5.biom -s 5".to_string(),
        )];
        for (d, c) in TAIL_AFTER_MS.iter() {
            expected.push((d.to_string(), c.replace("MS_TABLE", "/foo/master_ms5.biom")));
        }
        let observed: Vec<(String, String)> = description_and_commands(&planned.plan)
            .into_iter()
            .map(|(d, c)| (d.to_string(), c.to_string()))
            .collect();
        assert_eq!(expected, observed);
        assert_eq!("/foo/master_ms5.biom", planned.master_otu_table_path);
        assert_eq!(
            "/foo/blast_output/rs_candidates_failures_blast_out.txt",
            planned.blast_results_path
        );
    }

    #[test]
    fn test_stage_counts() {
        init();
        for n in 2..6 {
            let names: Vec<String> = (0..n).map(|i| format!("/t{}.biom", i)).collect();
            let tables: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
            let planned = planner(tables, None).plan().unwrap();
            assert_eq!(4 * n + 6, planned.plan.len());

            let branches = planned.plan.branches();
            assert_eq!(n + 2, branches.len());
            assert_eq!((Branch::Table(0), 4), (branches[0].0, branches[0].1.len()));
            assert_eq!((Branch::Merge, 1), (branches[n].0, branches[n].1.len()));
            assert_eq!((Branch::Tail, 5), (branches[n + 1].0, branches[n + 1].1.len()));
        }
        let planned = planner(vec![], Some("/master.biom")).plan().unwrap();
        assert_eq!(5, planned.plan.len());
        assert_eq!(1, planned.plan.branches().len());
    }

    #[test]
    fn test_plan_deterministic() {
        init();
        let p1 = planner(vec!["/a.biom", "/b.biom"], None).plan().unwrap();
        let p2 = planner(vec!["/a.biom", "/b.biom"], None).plan().unwrap();
        assert_eq!(p1, p2);
        assert_eq!(p1.plan.to_script(), p2.plan.to_script());
    }

    #[test]
    fn test_inputs_are_external_or_produced_earlier() {
        init();
        let planned = planner(vec!["/a.biom", "/b.biom"], None).plan().unwrap();
        let external = ["/a.biom", "/b.biom", "/rs.fna", "/gg.fasta", "/nt", "/map.txt"];
        let mut produced: Vec<&str> = vec![];
        for stage in planned.plan.stages() {
            for input in &stage.inputs {
                assert!(
                    external.contains(&input.as_str()) || produced.contains(&input.as_str()),
                    "Input {} of '{}' is not available",
                    input,
                    stage.description
                );
            }
            produced.extend(stage.outputs.iter().map(|s| s.as_str()));
        }
        assert!(produced.contains(&planned.blast_results_path.as_str()));
    }

    #[test]
    fn test_merge_requires_two_tables() {
        init();
        assert!(matches!(
            planner(vec!["/a.biom"], None).plan(),
            Err(MostWantedError::Configuration(_))
        ));
        assert!(matches!(
            planner(vec![], None).plan(),
            Err(MostWantedError::Configuration(_))
        ));
        assert!(planner(vec!["/a.biom"], Some("/master.biom")).plan().is_ok());
    }

    #[test]
    fn test_invalid_parameters() {
        init();
        let mut p = planner(vec!["/a.biom", "/b.biom"], None);
        p.min_abundance = 200;
        assert!(p.plan().is_err());

        let mut p = planner(vec!["/a.biom", "/b.biom"], None);
        p.max_reference_similarity = 97.0;
        assert!(p.plan().is_err());
    }

    #[test]
    fn test_e_value_must_survive_six_decimals() {
        init();
        for e_value in &[1e-10, 0.0, -1.0, f64::NAN] {
            let mut p = planner(vec!["/a.biom", "/b.biom"], None);
            p.e_value = *e_value;
            assert!(matches!(p.plan(), Err(MostWantedError::Configuration(_))));
        }

        let mut p = planner(vec!["/a.biom", "/b.biom"], None);
        p.e_value = crate::DEFAULT_E_VALUE.parse().unwrap();
        let planned = p.plan().unwrap();
        let blast = &planned.plan.stages()[planned.plan.len() - 1].command;
        assert!(!blast.contains("-e 0.000000"));
        assert!(blast.contains("-e 0.000100"));
    }

    #[test]
    fn test_script() {
        init();
        let planned = planner(vec![], Some("/master.biom")).plan().unwrap();
        let script = planned.plan.to_script();
        assert!(script.starts_with("#!/bin/bash\nset -e\n\n# Filtering OTU table"));
        assert!(script.contains(
            "\n# BLASTing filtered candidate sequences against nt database\nparallel_blast.py -i /foo/rs_candidates_failures.fna"
        ));
    }
}
