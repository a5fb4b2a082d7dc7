use std;
use std::io::Write;

use bird_tool_utils::clap_utils::add_clap_verbosity_flags;
use clap::*;

use crate::command_planner::MostWantedPlanner;
use crate::error::{MostWantedError, Result};
use crate::most_wanted::MostWantedReport;
use crate::most_wanted::REPORT_BASENAME;
use crate::pie_chart::PlotDataWriter;

/// Parse a similarity given either as a fraction (0-1) or a percentage
/// (1-100], returning a fraction.
pub fn parse_fraction(m: &ArgMatches, parameter: &str) -> Result<f64> {
    let mut value = match m.get_one::<f64>(parameter) {
        Some(v) => *v,
        None => {
            return Err(MostWantedError::Configuration(format!(
                "Missing value for --{}",
                parameter
            )))
        }
    };
    if value > 1.0 && value <= 100.0 {
        value /= 100.0;
    } else if !(0.0..=100.0).contains(&value) {
        error!("Invalid similarity: '{}'", value);
        return Err(MostWantedError::Configuration(format!(
            "Invalid similarity specified for --{}: '{}'",
            parameter, value
        )));
    }
    debug!("Using {} {}%", parameter, value * 100.0);
    Ok(value)
}

fn required_str<'a>(m: &'a ArgMatches, parameter: &str) -> Result<&'a str> {
    m.get_one::<String>(parameter)
        .map(|s| s.as_str())
        .ok_or_else(|| MostWantedError::Configuration(format!("Missing value for --{}", parameter)))
}

fn required_value<T: Clone + Send + Sync + 'static>(m: &ArgMatches, parameter: &str) -> Result<T> {
    m.get_one::<T>(parameter)
        .cloned()
        .ok_or_else(|| MostWantedError::Configuration(format!("Missing value for --{}", parameter)))
}

pub fn run_plan_subcommand(m: &ArgMatches) -> Result<()> {
    let otu_tables: Vec<&str> = match m.get_many::<String>("otu-tables") {
        Some(tables) => tables.map(|s| s.as_str()).collect(),
        None => vec![],
    };
    let planner = MostWantedPlanner {
        output_dir: required_str(m, "output-directory")?,
        otu_table_paths: otu_tables,
        rep_set_path: required_str(m, "rep-set")?,
        reference_db_path: required_str(m, "reference-database")?,
        nt_db_path: required_str(m, "nt-database")?,
        mapping_path: required_str(m, "mapping-file")?,
        category: required_str(m, "category")?,
        min_abundance: required_value(m, "min-abundance")?,
        max_abundance: required_value(m, "max-abundance")?,
        min_groups: required_value(m, "min-groups")?,
        max_reference_similarity: parse_fraction(m, "max-reference-similarity")?,
        e_value: required_value(m, "e-value")?,
        word_size: required_value(m, "word-size")?,
        master_otu_table_path: m.get_one::<String>("master-otu-table").map(|s| s.as_str()),
        jobs: required_value(m, "jobs")?,
    };

    let planned = planner.plan()?;
    let script = planned.plan.to_script();
    match m.get_one::<String>("output-script") {
        Some(path) => {
            std::fs::write(path, script).map_err(|e| MostWantedError::io(path, e))?;
            info!("Wrote {} pipeline commands to {}", planned.plan.len(), path);
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(script.as_bytes())
                .map_err(|e| MostWantedError::io("stdout", e))?;
        }
    }
    info!("Once run, the pipeline writes BLAST results to {}", planned.blast_results_path);
    info!("Candidate sequences will be in {}", planned.candidate_fasta_path);
    info!("The filtered master OTU table will be {}", planned.master_otu_table_path);
    Ok(())
}

pub fn run_report_subcommand(m: &ArgMatches) -> Result<()> {
    let report = MostWantedReport {
        blast_results_path: required_str(m, "blast-results")?,
        rep_set_path: required_str(m, "rep-set")?,
        master_otu_table_path: required_str(m, "master-otu-table")?,
        mapping_path: m.get_one::<String>("mapping-file").map(|s| s.as_str()),
        category: required_str(m, "category")?,
        output_dir: required_str(m, "output-directory")?,
        top_n: required_value(m, "top-n")?,
        max_nt_similarity: parse_fraction(m, "max-nt-similarity")?,
        suppress_taxonomy: m.get_flag("suppress-taxonomy"),
        max_pie_slices: required_value(m, "max-pie-slices")?,
    };
    let written = report.generate(&PlotDataWriter)?;
    info!(
        "Reported {} most wanted OTUs. Pie chart images are to be drawn from the plot data in {}",
        written.artifacts.plot_requests.len(),
        std::path::Path::new(report.output_dir)
            .join(REPORT_BASENAME)
            .display()
    );
    Ok(())
}

pub fn add_plan_subcommand(app: Command) -> Command {
    let plan_subcommand = add_clap_verbosity_flags(Command::new("plan"))
        .about("Print the commands which filter OTU tables and find candidate most wanted OTUs")
        .arg(
            Arg::new("output-directory")
                .long("output-directory")
                .short('o')
                .help("Directory the planned commands write into")
                .required(true),
        )
        .arg(
            Arg::new("otu-tables")
                .long("otu-tables")
                .short('i')
                .help("OTU tables to filter and merge")
                .num_args(1..)
                .required_unless_present("master-otu-table"),
        )
        .arg(
            Arg::new("master-otu-table")
                .long("master-otu-table")
                .help("Already merged and collapsed master OTU table. Skips per-table filtering"),
        )
        .arg(
            Arg::new("rep-set")
                .long("rep-set")
                .help("Representative sequence of each OTU in FASTA format")
                .required(true),
        )
        .arg(
            Arg::new("reference-database")
                .long("reference-database")
                .help("Reference sequences (e.g. Greengenes) in FASTA format")
                .required(true),
        )
        .arg(
            Arg::new("nt-database")
                .long("nt-database")
                .help("BLAST database of general nucleotide sequences")
                .required(true),
        )
        .arg(
            Arg::new("mapping-file")
                .long("mapping-file")
                .short('m')
                .help("Sample mapping file")
                .required(true),
        )
        .arg(
            Arg::new("category")
                .long("category")
                .short('c')
                .help("Mapping file column to collapse samples by")
                .default_value(crate::DEFAULT_CATEGORY),
        )
        .arg(
            Arg::new("min-abundance")
                .long("min-abundance")
                .help("OTUs with a total abundance below this are excluded")
                .value_parser(value_parser!(u64))
                .default_value(crate::DEFAULT_MIN_ABUNDANCE),
        )
        .arg(
            Arg::new("max-abundance")
                .long("max-abundance")
                .help("OTUs with a total abundance above this are excluded")
                .value_parser(value_parser!(u64))
                .default_value(crate::DEFAULT_MAX_ABUNDANCE),
        )
        .arg(
            Arg::new("min-groups")
                .long("min-groups")
                .help("OTUs must be present in at least this many sample groups")
                .value_parser(value_parser!(u32))
                .default_value(crate::DEFAULT_MIN_GROUPS),
        )
        .arg(
            Arg::new("max-reference-similarity")
                .long("max-reference-similarity")
                .help("OTUs at least this similar to a reference sequence are not candidates (fraction or percentage)")
                .value_parser(value_parser!(f64))
                .default_value(crate::DEFAULT_MAX_REFERENCE_SIMILARITY),
        )
        .arg(
            Arg::new("e-value")
                .long("e-value")
                .help("E-value threshold for BLAST against the nt database")
                .value_parser(value_parser!(f64))
                .default_value(crate::DEFAULT_E_VALUE),
        )
        .arg(
            Arg::new("word-size")
                .long("word-size")
                .help("Word size for BLAST against the nt database")
                .value_parser(value_parser!(u32))
                .default_value(crate::DEFAULT_WORD_SIZE),
        )
        .arg(
            Arg::new("jobs")
                .long("jobs")
                .short('O')
                .help("Number of parallel jobs the planned commands should use")
                .value_parser(value_parser!(usize))
                .default_value(crate::DEFAULT_JOBS),
        )
        .arg(
            Arg::new("output-script")
                .long("output-script")
                .help("Write the commands to this file instead of stdout"),
        );

    app.subcommand(plan_subcommand)
}

pub fn add_report_subcommand(app: Command) -> Command {
    let report_subcommand = add_clap_verbosity_flags(Command::new("report"))
        .about("Rank candidate OTUs by novelty and write text, HTML and FASTA reports")
        .arg(
            Arg::new("blast-results")
                .long("blast-results")
                .help("Tabular BLAST output (-m 9) of the candidate sequences against nt")
                .required(true),
        )
        .arg(
            Arg::new("rep-set")
                .long("rep-set")
                .help("Representative sequence of each OTU in FASTA format")
                .required(true),
        )
        .arg(
            Arg::new("master-otu-table")
                .long("master-otu-table")
                .help("Tab-separated master OTU table with a taxonomy column")
                .required(true),
        )
        .arg(
            Arg::new("mapping-file")
                .long("mapping-file")
                .short('m')
                .help("Sample mapping file. Without it the master OTU table's samples are taken to be category values"),
        )
        .arg(
            Arg::new("category")
                .long("category")
                .short('c')
                .help("Sample category to show abundance by")
                .default_value(crate::DEFAULT_CATEGORY),
        )
        .arg(
            Arg::new("output-directory")
                .long("output-directory")
                .short('o')
                .help("Directory to write the report into")
                .required(true),
        )
        .arg(
            Arg::new("top-n")
                .long("top-n")
                .short('n')
                .help("Number of most wanted OTUs to report")
                .value_parser(value_parser!(usize))
                .default_value(crate::DEFAULT_TOP_N),
        )
        .arg(
            Arg::new("max-nt-similarity")
                .long("max-nt-similarity")
                .help("OTUs with a best nt hit more similar than this are excluded (fraction or percentage)")
                .value_parser(value_parser!(f64))
                .default_value(crate::DEFAULT_MAX_NT_SIMILARITY),
        )
        .arg(
            Arg::new("suppress-taxonomy")
                .long("suppress-taxonomy")
                .help("Leave the taxonomy column out of the report")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max-pie-slices")
                .long("max-pie-slices")
                .help("Maximum number of category groups shown in each abundance pie chart")
                .value_parser(value_parser!(usize))
                .default_value(crate::DEFAULT_MAX_PIE_SLICES),
        );

    app.subcommand(report_subcommand)
}
