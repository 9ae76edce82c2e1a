use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use log::LevelFilter;
use std::path::PathBuf;

use omiclearn_cli::experiment::input::ExperimentConfig;
use omiclearn_cli::experiment::runner;
use omiclearn_cli::experiment::session::CsvSessionStore;
use omiclearn_cli::util::ensure_dir;

fn run_command() -> Command {
    let list_arg = |id: &'static str, long: &'static str, help: &'static str| {
        Arg::new(id)
            .long(long)
            .help(help)
            .value_parser(clap::builder::NonEmptyStringValueParser::new())
            .value_hint(ValueHint::Other)
    };

    Command::new("run")
        .about("Cross-validate a classification pipeline on a delimited data file")
        .arg(
            Arg::new("config")
                .help("Path to the experiment JSON configuration file. Defaults are used when omitted.")
                .required(false)
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("data")
                .short('d')
                .long("data")
                .help("Path to the data file (*.csv, *.tsv or *.txt). Overrides data.data_file.")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .help("Column holding the classification target")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .value_hint(ValueHint::Other),
        )
        .arg(list_arg("class0", "class0", "Comma separated target values forming Class 0"))
        .arg(list_arg("class1", "class1", "Comma separated target values forming Class 1"))
        .arg(
            Arg::new("cohort")
                .long("cohort")
                .help("Column with cohort labels; enables the cohort comparison")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .value_hint(ValueHint::Other),
        )
        .arg(list_arg(
            "additional",
            "additional",
            "Comma separated metadata columns used as additional features",
        ))
        .arg(list_arg(
            "features",
            "features",
            "Comma separated feature columns to use exclusively (before exclusions)",
        ))
        .arg(list_arg("exclude", "exclude", "Comma separated feature columns to leave out"))
        .arg(
            Arg::new("exclude_file")
                .long("exclude-file")
                .help("CSV file whose first column lists features to leave out (first row is a header)")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("subset_column")
                .long("subset-column")
                .help("Column used to restrict the samples")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .value_hint(ValueHint::Other),
        )
        .arg(list_arg(
            "subset_values",
            "subset-values",
            "Comma separated values of the subset column to keep",
        ))
        .arg(
            Arg::new("delimiter")
                .long("delimiter")
                .help("Field delimiter of the data file. Inferred from the extension when omitted.")
                .value_parser(["comma", "semicolon", "tab"]),
        )
        .arg(
            Arg::new("classifier")
                .short('c')
                .long("classifier")
                .help("Override the classifier from the JSON config.")
                .value_parser([
                    "AdaBoost",
                    "LogisticRegression",
                    "KNeighborsClassifier",
                    "RandomForest",
                    "DecisionTree",
                    "LinearSVC",
                    "XGBoost",
                ]),
        )
        .arg(
            Arg::new("feature_selection")
                .long("feature-selection")
                .help("Override the feature selection method from the JSON config.")
                .value_parser(["ExtraTrees", "KBestMutualInfo", "KBestFClassif", "KBestChi2", "None"]),
        )
        .arg(
            Arg::new("missing_values")
                .long("missing-values")
                .help("Override the missing value imputation from the JSON config.")
                .value_parser(["None", "Zero", "Mean", "Median", "KNNImputer"]),
        )
        .arg(
            Arg::new("cv_method")
                .long("cv-method")
                .help("Override the cross-validation scheme from the JSON config.")
                .value_parser(["RepeatedStratifiedKFold", "StratifiedKFold", "StratifiedShuffleSplit"]),
        )
        .arg(
            Arg::new("random_state")
                .long("random-state")
                .help("Seed for every random source of the run")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("workers")
                .short('j')
                .long("workers")
                .help("Fold worker threads; 0 uses every core")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Directory the results are written to. Overrides output_dir.")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("no_report")
                .long("no-report")
                .help("Disable HTML report generation.")
                .action(ArgAction::SetTrue),
        )
}

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("OMICLEARN_LOG", "error,omiclearn=info"))
        .init();

    let matches = Command::new("omiclearn")
        .version(clap::crate_version!())
        .about("OmicLearn CLI - Transparent cross-validation of biomarker classifiers on omics data")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(run_command())
        .subcommand(Command::new("default-config").about("Print the default experiment configuration as JSON"))
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    match matches.subcommand() {
        Some(("run", run_matches)) => handle_run(run_matches),
        Some(("default-config", _)) => {
            println!("{}", serde_json::to_string_pretty(&ExperimentConfig::default())?);
            Ok(())
        }
        _ => {
            log::error!("Unknown subcommand");
            std::process::exit(2)
        }
    }
}

fn handle_run(matches: &ArgMatches) -> Result<()> {
    let config_path = matches.get_one::<PathBuf>("config");
    match config_path {
        Some(path) => log::info!("[OmicLearn] Running experiment from config: {:?}", path),
        None => log::info!("[OmicLearn] No config provided; using defaults."),
    }

    let config = match ExperimentConfig::from_arguments(config_path, matches) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid experiment setup: {:#}", e);
            std::process::exit(1)
        }
    };

    let outcome = ensure_dir(&config.output_dir).and_then(|_| {
        let mut sessions = CsvSessionStore::new(config.session_history_path());
        runner::run(&config, &mut sessions)
    });
    match outcome {
        Ok(outputs) => {
            log::info!(
                "[OmicLearn] Completed. ROC-AUC {:.3}, PR-AUC {:.3}; results in {:?}",
                outputs.result.cross_validation.statistic("roc_auc_mean").unwrap_or(f64::NAN),
                outputs.result.cross_validation.statistic("pr_auc_mean").unwrap_or(f64::NAN),
                outputs.results_json
            );
            Ok(())
        }
        Err(e) => {
            log::error!("Experiment failed: {:#}", e);
            std::process::exit(1)
        }
    }
}
