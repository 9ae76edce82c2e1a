use anyhow::{Context, Result};
use maud::{html, Markup};
use omiclearn_core::aggregate::{FeatureImportance, LabeledConfusionMatrix, RunSummary, UnavailableReason};
use omiclearn_core::metrics::SCALAR_METRICS;
use omiclearn_core::{run_experiment, ExperimentResult};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

use crate::experiment::input::ExperimentConfig;
use crate::experiment::load_data::{load_experiment_data, LoadedData};
use crate::experiment::plot::{plot_feature_importance, plot_pr, plot_roc};
use crate::experiment::session::{SessionRecord, SessionStore};
use crate::experiment::summary::{methods_text, PR_BASELINE_NOTE};
use crate::report::{Report, ReportSection};
use crate::util::{ensure_dir, write_bytes_to_file};

/// Features shown in the importance bar chart.
const TOP_FEATURES: usize = 20;

#[derive(Debug, Clone)]
pub struct RunOutputs {
    pub results_json: PathBuf,
    pub summary_txt: PathBuf,
    pub report_html: Option<PathBuf>,
    pub result: ExperimentResult,
}

#[derive(Serialize)]
struct ResultsFile<'a> {
    config: &'a ExperimentConfig,
    warnings: &'a [String],
    result: &'a ExperimentResult,
}

/// Load the data, run the experiment and write `results.json`,
/// `summary.txt` and (unless disabled) `report.html` into the output
/// directory. The run is appended to `sessions`.
pub fn run(config: &ExperimentConfig, sessions: &mut dyn SessionStore) -> Result<RunOutputs> {
    let start_time = Instant::now();
    let LoadedData {
        dataset,
        cohorts,
        warnings,
    } = load_experiment_data(&config.data)?;
    for warning in &warnings {
        log::warn!("{}", warning);
    }

    log::info!(
        "Using Class 0 {:?}, Class 1 {:?}, classifier {} and {} features",
        config.data.class_0,
        config.data.class_1,
        config.run.pipeline.classifier.kind,
        dataset.n_features()
    );
    let result = run_experiment(&dataset, cohorts.as_ref(), &config.run)
        .context("Cross-validation run failed")?;
    log::info!("Experiment finished in {:?}", start_time.elapsed());

    ensure_dir(&config.output_dir)
        .with_context(|| format!("Failed to create output directory: {}", config.output_dir))?;

    let results_json = config.output_path("results.json");
    let bytes = serde_json::to_vec_pretty(&ResultsFile {
        config,
        warnings: &warnings,
        result: &result,
    })?;
    write_bytes_to_file(&results_json, &bytes)
        .with_context(|| format!("Failed to write {:?}", results_json))?;

    let text = methods_text(&config.data, &config.run, &result);
    let summary_txt = config.output_path("summary.txt");
    write_bytes_to_file(&summary_txt, format!("{}\n\n{}\n", text, PR_BASELINE_NOTE).as_bytes())
        .with_context(|| format!("Failed to write {:?}", summary_txt))?;

    let report_html = if config.report {
        let path = config.output_path("report.html");
        build_report(config, &result, &text, &warnings)?.save_to_file(&path)?;
        log::info!("Report written to {:?}", path);
        Some(path)
    } else {
        None
    };

    sessions.append(&SessionRecord::from_run(config, &result, chrono::Utc::now()))?;
    log::info!("Results written to {}", config.output_dir);

    Ok(RunOutputs {
        results_json,
        summary_txt,
        report_html,
        result,
    })
}

fn confusion_table(cm: &LabeledConfusionMatrix) -> Markup {
    html! {
        table {
            caption { (cm.label) }
            tr { th { "True \\ Predicted" } th { "Class 0" } th { "Class 1" } }
            @for (name, row) in [("Class 0", cm.matrix.counts[0]), ("Class 1", cm.matrix.counts[1])] {
                tr { th { (name) } td { (row[0]) } td { (row[1]) } }
            }
        }
    }
}

fn statistics_table(summary: &RunSummary) -> Markup {
    let fmt = |key: String| {
        summary
            .statistic(&key)
            .map(|v| format!("{:.3}", v))
            .unwrap_or_else(|| "-".to_string())
    };
    html! {
        table {
            tr { th { "Metric" } th { "Mean" } th { "Std" } }
            @for metric in SCALAR_METRICS {
                tr {
                    th { (metric) }
                    td { (fmt(format!("{}_mean", metric))) }
                    td { (fmt(format!("{}_std", metric))) }
                }
            }
        }
    }
}

fn summary_section(title: &str, summary: &RunSummary) -> ReportSection {
    let mut section = ReportSection::new(title);
    section.add_plot(plot_roc(summary, "Receiver operating characteristic"));
    section.add_plot(plot_pr(summary, "Precision-recall curve"));
    section.add_content(html! { p class="note" { (PR_BASELINE_NOTE) } });
    section.add_content(html! {
        h3 { "Confusion matrices" }
        @for cm in &summary.confusion_matrices {
            (confusion_table(cm))
        }
        h3 { "Summary statistics" }
        (statistics_table(summary))
    });
    section
}

fn build_report(
    config: &ExperimentConfig,
    result: &ExperimentResult,
    text: &str,
    warnings: &[String],
) -> Result<Report> {
    let mut report = Report::new("OmicLearn", &config.version, "OmicLearn Cross-Validation Report");

    /* Section 1: Overview */
    {
        let mut overview = ReportSection::new("Overview");
        overview.add_content(html! {
            p {
                "Classification of " (config.data.class_0.join(", ")) " (Class 0) vs. "
                (config.data.class_1.join(", ")) " (Class 1) in column " code { (config.data.target_column) }
                ". Results are exploratory estimates of how well the chosen pipeline separates the classes, "
                "not a production model."
            }
            p { (text) }
            @if !warnings.is_empty() {
                h3 { "Data warnings" }
                ul {
                    @for warning in warnings {
                        li { (warning) }
                    }
                }
            }
        });
        report.add_section(overview);
    }

    /* Section 2: Cross-validation */
    report.add_section(summary_section("Cross-validation", &result.cross_validation));

    /* Section 3: Feature importance */
    {
        let mut section = ReportSection::new("Feature importance");
        match &result.cross_validation.feature_importance {
            FeatureImportance::Ranked(ranked) => {
                section.add_content(html! {
                    p {
                        "Mean importance over all splits. A split in which a feature was not selected "
                        "counts as zero."
                    }
                });
                section.add_plot(plot_feature_importance(ranked, TOP_FEATURES));
            }
            FeatureImportance::NotAvailable(reason) => {
                let reason = match reason {
                    UnavailableReason::NotExposed => "the classifier does not expose feature importances",
                    UnavailableReason::AllZero => "every split reported zero importance for all features",
                };
                section.add_content(html! { p { "Feature importance is not available: " (reason) "." } });
            }
        }
        report.add_section(section);
    }

    /* Section 4: Cohort comparison */
    if let Some(comparison) = &result.cohort_comparison {
        let mut section = summary_section("Cohort comparison", &comparison.overall);
        section.add_content(html! {
            table {
                tr { th { "Train on" } th { "Test on" } th { "ROC AUC" } th { "PR AUC" } }
                @for combo in &comparison.results {
                    tr {
                        td { (combo.train_cohort) }
                        td { (combo.test_cohort) }
                        td { (format!("{:.3}", combo.summary.statistic("roc_auc_mean").unwrap_or(f64::NAN))) }
                        td { (format!("{:.3}", combo.summary.statistic("pr_auc_mean").unwrap_or(f64::NAN))) }
                    }
                }
            }
        });
        report.add_section(section);
    }

    /* Section 5: Configuration */
    {
        let mut config_section = ReportSection::new("Configuration");
        config_section.add_content(html! {
            div class="code-container" {
                pre {
                    code { (serde_json::to_string_pretty(&config)?) }
                }
            }
        });
        report.add_section(config_section);
    }

    Ok(report)
}
