use plotly::common::{ErrorData, ErrorType, Fill, Line, Mode};
use plotly::layout::{Axis, BarMode};
use plotly::{Bar, Layout, Plot, Scatter};

use omiclearn_core::aggregate::{MeanCurve, RankedFeature, RunSummary};

const MEAN_COLOR: &str = "rgba(31, 119, 180, 1.0)";
const BAND_COLOR: &str = "rgba(31, 119, 180, 0.2)";
const FOLD_COLOR: &str = "rgba(128, 128, 128, 0.35)";
const BASELINE_COLOR: &str = "rgba(214, 39, 40, 0.8)";

/// Closed polygon through `upper` and the reversed `lower`, for a fill band.
fn band(x: &[f64], upper: &[f64], lower: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut band_x = x.to_vec();
    band_x.extend(x.iter().rev());
    let mut band_y = upper.to_vec();
    band_y.extend(lower.iter().rev());
    (band_x, band_y)
}

fn add_mean_curve(plot: &mut Plot, curve: &MeanCurve, name: &str) {
    let (band_x, band_y) = band(&curve.grid, &curve.upper, &curve.lower);
    plot.add_trace(
        Scatter::new(band_x, band_y)
            .name("± 1 std. dev.")
            .mode(Mode::Lines)
            .fill(Fill::ToSelf)
            .line(Line::new().width(0.0))
            .fill_color(BAND_COLOR),
    );
    plot.add_trace(
        Scatter::new(curve.grid.clone(), curve.mean.clone())
            .name(format!("{} (AUC = {:.2})", name, curve.auc()))
            .mode(Mode::Lines)
            .line(Line::new().color(MEAN_COLOR).width(2.5)),
    );
}

/// Per-fold ROC curves, their mean with a one standard deviation band and the
/// chance diagonal.
pub fn plot_roc(summary: &RunSummary, title: &str) -> Plot {
    let mut plot = Plot::new();
    for fold in &summary.folds {
        plot.add_trace(
            Scatter::new(fold.roc.fpr.clone(), fold.roc.tpr.clone())
                .name(format!("{} (AUC = {:.2})", fold.label, fold.roc.auc))
                .mode(Mode::Lines)
                .line(Line::new().color(FOLD_COLOR).width(1.0))
                .show_legend(summary.folds.len() <= 10),
        );
    }
    add_mean_curve(&mut plot, &summary.mean_roc, "Mean ROC");
    plot.add_trace(
        Scatter::new(vec![0.0, 1.0], vec![0.0, 1.0])
            .name("Chance")
            .mode(Mode::Lines)
            .line(Line::new().color(BASELINE_COLOR).dash(plotly::common::DashType::Dash)),
    );
    plot.set_layout(
        Layout::new()
            .title(title)
            .x_axis(Axis::new().title("False Positive Rate").range(vec![0.0, 1.0]))
            .y_axis(Axis::new().title("True Positive Rate").range(vec![0.0, 1.05])),
    );
    plot
}

/// Per-fold PR curves and their mean. The dashed line marks the Class 0
/// prevalence over all evaluated samples.
pub fn plot_pr(summary: &RunSummary, title: &str) -> Plot {
    let mut plot = Plot::new();
    for fold in &summary.folds {
        plot.add_trace(
            Scatter::new(fold.pr.recall.clone(), fold.pr.precision.clone())
                .name(format!("{} (AUC = {:.2})", fold.label, fold.pr.auc))
                .mode(Mode::Lines)
                .line(Line::new().color(FOLD_COLOR).width(1.0))
                .show_legend(summary.folds.len() <= 10),
        );
    }
    add_mean_curve(&mut plot, &summary.mean_pr, "Mean PR");

    let summed = summary.summed_confusion_matrix();
    let prevalence = summed.counts[0].iter().sum::<usize>() as f64 / summed.total().max(1) as f64;
    plot.add_trace(
        Scatter::new(vec![0.0, 1.0], vec![prevalence, prevalence])
            .name(format!("Prevalence ({:.2})", prevalence))
            .mode(Mode::Lines)
            .line(Line::new().color(BASELINE_COLOR).dash(plotly::common::DashType::Dash)),
    );
    plot.set_layout(
        Layout::new()
            .title(title)
            .x_axis(Axis::new().title("Recall").range(vec![0.0, 1.0]))
            .y_axis(Axis::new().title("Precision").range(vec![0.0, 1.05])),
    );
    plot
}

/// Mean importance of the top `n` features with standard deviation error bars.
pub fn plot_feature_importance(ranked: &[RankedFeature], n: usize) -> Plot {
    let top: Vec<&RankedFeature> = ranked.iter().take(n).collect();
    let names: Vec<String> = top.iter().map(|f| f.name.clone()).collect();
    let means: Vec<f64> = top.iter().map(|f| f.mean).collect();
    let stds: Vec<f64> = top.iter().map(|f| f.std).collect();
    let hover: Vec<String> = top
        .iter()
        .map(|f| format!("selected in {} folds", f.n_folds_selected))
        .collect();

    let mut plot = Plot::new();
    plot.add_trace(
        Bar::new(names, means)
            .name("Mean importance")
            .hover_text_array(hover)
            .error_y(ErrorData::new(ErrorType::Data).array(stds)),
    );
    plot.set_layout(
        Layout::new()
            .title(format!("Top {} features by mean importance", top.len()).as_str())
            .bar_mode(BarMode::Group)
            .x_axis(Axis::new().title("Feature"))
            .y_axis(Axis::new().title("Mean importance")),
    );
    plot
}
