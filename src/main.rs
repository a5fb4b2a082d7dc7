extern crate mostwanted;

extern crate clap;
use clap::*;

#[macro_use]
extern crate log;

extern crate bird_tool_utils;
use bird_tool_utils::clap_utils::*;

static PROGRAM_NAME: &str = "mostwanted";

fn main() {
    let app = build_cli();
    let matches = app.clone().get_matches();
    set_log_level(&matches, false, PROGRAM_NAME, crate_version!());

    let result = match matches.subcommand() {
        Some(("plan", m)) => {
            set_log_level(m, true, PROGRAM_NAME, crate_version!());
            mostwanted::argument_parsing::run_plan_subcommand(m)
        }
        Some(("report", m)) => {
            set_log_level(m, true, PROGRAM_NAME, crate_version!());
            mostwanted::argument_parsing::run_report_subcommand(m)
        }
        _ => panic!("Programming error"),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn build_cli() -> Command {
    let mut app = add_clap_verbosity_flags(Command::new(PROGRAM_NAME))
        .version(crate_version!())
        .about("Find the most wanted OTUs: abundant OTUs poorly represented in reference databases")
        .arg_required_else_help(true);

    app = mostwanted::argument_parsing::add_plan_subcommand(app);
    app = mostwanted::argument_parsing::add_report_subcommand(app);
    app
}
