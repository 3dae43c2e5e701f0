use std::path::PathBuf;

use clap::Parser;
use log::{error, info};

use prodsched::solver::Backend;
use prodsched::{report, Problem, Result, RunConfig, ScheduleMilp};

/// Plans weekly production on parallel machines by solving a lexicographic multi-objective MILP
#[derive(Parser, Debug)]
#[clap(name = "prodsched", version)]
struct Args {
    /// Input workbook (.xlsx, .xls, .ods), directory of <Sheet>.csv files, or .json file
    input: PathBuf,

    /// JSON file with the model and solver configuration
    #[clap(long)]
    config: Option<PathBuf>,

    /// Directory the results are written to
    #[clap(long, default_value = "results")]
    output: PathBuf,

    /// Production gate constant (units)
    #[clap(long)]
    big_m: Option<f64>,

    /// Regular hours per machine and week
    #[clap(long)]
    regular_hours: Option<f64>,

    /// Contractual overtime hours per machine and week
    #[clap(long)]
    overtime_cap: Option<f64>,

    /// Solver time limit in seconds
    #[clap(long)]
    time_limit: Option<f64>,

    /// Relative MIP gap
    #[clap(long)]
    mip_gap: Option<f64>,

    /// Show the solver's own log
    #[clap(long)]
    verbose: bool,

    /// Solver backend: microlp or gurobi
    #[clap(long, default_value = "microlp")]
    solver: Backend,

    /// Write the built model in LP format to this file
    #[clap(long)]
    lp: Option<PathBuf>,
}

impl Args {
    /// The configuration file, or the defaults, with the command line overrides applied
    fn config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };

        if let Some(big_m) = self.big_m {
            config.model.big_m = big_m;
        }
        if let Some(hours) = self.regular_hours {
            config.model.regular_hours = hours;
        }
        if let Some(hours) = self.overtime_cap {
            config.model.overtime_cap = hours;
        }
        if self.time_limit.is_some() {
            config.solver.time_limit = self.time_limit;
        }
        if self.mip_gap.is_some() {
            config.solver.mip_gap = self.mip_gap;
        }
        config.solver.verbose |= self.verbose;

        config.validate()?;
        Ok(config)
    }
}

fn run(args: &Args) -> Result<()> {
    let config = args.config()?;
    let solver = args.solver.solver()?;
    let problem = Problem::load(&args.input)?;
    let milp = ScheduleMilp::build(&problem, &config.model)?;

    if let Some(path) = &args.lp {
        let file = std::fs::File::create(path).map_err(|e| prodsched::Error::output(path, e))?;
        milp.model
            .write_lp(std::io::BufWriter::new(file))
            .map_err(|e| prodsched::Error::output(path, e))?;
        info!("Wrote model to {}", path.display());
    }

    let result = milp.solve(solver.as_ref(), &config.solver)?;
    println!("{}", result);
    report::write_results(&result, &args.output)
}

pub fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}
