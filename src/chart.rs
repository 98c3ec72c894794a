/// Text Charts Module
///
/// Draws the answer of an insight as plain text. The first result column is
/// the label (or x value) and the second one is the plotted number.
use crate::core::db::QueryResult;
use crate::core::{DashError, Result};
use crate::insights::ChartView;

/// Rows of the line, area and scatter plots.
const PLOT_HEIGHT: usize = 10;
const MAX_LABEL_WIDTH: usize = 20;
const MAX_BINS: usize = 10;
const MIN_WIDTH: usize = 10;

/// Renders `result` as the given chart, at most `width` characters of plot.
pub fn render_chart(result: &QueryResult, view: ChartView, width: usize) -> Result<String> {
    if result.columns.len() < 2 {
        return Err(DashError::Command(format!(
            "a {} chart needs two columns, the query returned {}",
            view.name(),
            result.columns.len()
        )));
    }
    let width = width.max(MIN_WIDTH);
    let x_title = &result.columns[0];
    let y_title = &result.columns[1];

    let (caption, body) = match view {
        ChartView::Bar => {
            let points = labelled_points(result);
            (format!("{} by {}", y_title, x_title), bar_chart(&points, width))
        }
        ChartView::Line | ChartView::Area => {
            let points = labelled_points(result);
            (
                format!("{} over {}", y_title, x_title),
                trend_plot(&points, width, view == ChartView::Area),
            )
        }
        ChartView::Histogram => {
            let values: Vec<f64> = labelled_points(result).into_iter().map(|(_, v)| v).collect();
            (format!("distribution of {}", y_title), histogram(&values, width))
        }
        ChartView::Scatter => (
            format!("{} against {}", y_title, x_title),
            scatter_plot(&numeric_pairs(result), width),
        ),
    };

    Ok(match body {
        Some(body) => format!("{}\n{}", caption, body),
        None => format!("{}\n(no data to chart)", caption),
    })
}

fn labelled_points(result: &QueryResult) -> Vec<(String, f64)> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            let y = row.get(1)?.as_f64()?;
            let label = row.first().map(ToString::to_string).unwrap_or_default();
            Some((label, y))
        })
        .collect()
}

fn numeric_pairs(result: &QueryResult) -> Vec<(f64, f64)> {
    result
        .rows
        .iter()
        .filter_map(|row| Some((row.first()?.as_f64()?, row.get(1)?.as_f64()?)))
        .collect()
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn truncate_label(label: &str) -> String {
    if label.chars().count() <= MAX_LABEL_WIDTH {
        label.to_string()
    } else {
        let mut cut: String = label.chars().take(MAX_LABEL_WIDTH - 1).collect();
        cut.push('~');
        cut
    }
}

/// Horizontal bars scaled to the largest value; negative values get no bar.
fn bar_chart(points: &[(String, f64)], width: usize) -> Option<String> {
    if points.is_empty() {
        return None;
    }
    let labels: Vec<String> = points.iter().map(|(label, _)| truncate_label(label)).collect();
    let label_width = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let max = points.iter().map(|(_, v)| *v).fold(0.0, f64::max);

    let lines: Vec<String> = labels
        .iter()
        .zip(points)
        .map(|(label, (_, value))| {
            let len = if max > 0.0 && *value > 0.0 {
                ((value / max) * width as f64).round() as usize
            } else {
                0
            };
            format!(
                "{:<lw$} | {} {}",
                label,
                "#".repeat(len),
                format_number(*value),
                lw = label_width
            )
        })
        .collect();
    Some(lines.join("\n"))
}

/// Averages consecutive values so that at most `width` remain.
fn downsample(values: &[f64], width: usize) -> Vec<f64> {
    if values.len() <= width {
        return values.to_vec();
    }
    (0..width)
        .map(|i| {
            let start = i * values.len() / width;
            let end = ((i + 1) * values.len() / width).max(start + 1);
            let bucket = &values[start..end];
            bucket.iter().sum::<f64>() / bucket.len() as f64
        })
        .collect()
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

/// Maps `value` in `lo..=hi` onto `0..=steps`.
fn scale(value: f64, lo: f64, hi: f64, steps: usize) -> usize {
    if hi > lo {
        (((value - lo) / (hi - lo)) * steps as f64).round() as usize
    } else {
        steps
    }
}

/// Draws plot rows (top row first) with a y axis on the left and an x axis
/// underneath.
fn frame(rows: Vec<String>, y_range: (f64, f64), x_caption: &str) -> String {
    let top = format_number(y_range.1);
    let bottom = format_number(y_range.0);
    let axis_width = top.len().max(bottom.len());
    let plot_width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0);
    let last = rows.len().saturating_sub(1);

    let mut lines: Vec<String> = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            let tick = match i {
                0 => top.as_str(),
                i if i == last => bottom.as_str(),
                _ => "",
            };
            format!("{:>w$} |{}", tick, row, w = axis_width)
                .trim_end()
                .to_string()
        })
        .collect();
    lines.push(format!("{:>w$} +{}", "", "-".repeat(plot_width), w = axis_width));
    lines.push(format!("{:>w$}  {}", "", x_caption, w = axis_width));
    lines.join("\n")
}

fn trend_plot(points: &[(String, f64)], width: usize, filled: bool) -> Option<String> {
    let (first, last) = (points.first()?, points.last()?);
    let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
    let columns = downsample(&values, width);
    let (lo, hi) = min_max(columns.iter().copied());
    let levels: Vec<usize> = columns
        .iter()
        .map(|v| scale(*v, lo, hi, PLOT_HEIGHT - 1))
        .collect();

    let rows: Vec<String> = (0..PLOT_HEIGHT)
        .rev()
        .map(|row| {
            levels
                .iter()
                .map(|level| match (filled, *level) {
                    (true, level) if level >= row => '#',
                    (false, level) if level == row => '*',
                    _ => ' ',
                })
                .collect::<String>()
        })
        .collect();

    let x_caption = if points.len() == 1 {
        first.0.clone()
    } else {
        format!("{} .. {}", first.0, last.0)
    };
    Some(frame(rows, (lo, hi), &x_caption))
}

/// Equal-width bins over the value range: `(low, high, count)` per bin.
fn histogram_bins(values: &[f64]) -> Vec<(f64, f64, usize)> {
    if values.is_empty() {
        return Vec::new();
    }
    let (lo, hi) = min_max(values.iter().copied());
    let span = hi - lo;
    let bins = if span > 0.0 {
        ((values.len() as f64).sqrt().ceil() as usize).clamp(1, MAX_BINS)
    } else {
        1
    };
    let bin_width = span / bins as f64;

    let mut counts = vec![0usize; bins];
    for value in values {
        let index = if span > 0.0 {
            (((value - lo) / span) * bins as f64).floor() as usize
        } else {
            0
        };
        counts[index.min(bins - 1)] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            let low = lo + bin_width * i as f64;
            let high = if i + 1 == bins { hi } else { low + bin_width };
            (low, high, count)
        })
        .collect()
}

fn histogram(values: &[f64], width: usize) -> Option<String> {
    let bins: Vec<(String, f64)> = histogram_bins(values)
        .into_iter()
        .map(|(low, high, count)| {
            (
                format!("{}-{}", format_number(low), format_number(high)),
                count as f64,
            )
        })
        .collect();
    bar_chart(&bins, width)
}

fn scatter_plot(points: &[(f64, f64)], width: usize) -> Option<String> {
    if points.is_empty() {
        return None;
    }
    let (x_lo, x_hi) = min_max(points.iter().map(|(x, _)| *x));
    let (y_lo, y_hi) = min_max(points.iter().map(|(_, y)| *y));

    let mut grid = vec![vec![0u32; width]; PLOT_HEIGHT];
    for (x, y) in points {
        let column = if x_hi > x_lo { scale(*x, x_lo, x_hi, width - 1) } else { 0 };
        let row = scale(*y, y_lo, y_hi, PLOT_HEIGHT - 1);
        grid[row][column] += 1;
    }

    let rows: Vec<String> = grid
        .into_iter()
        .rev()
        .map(|row| {
            row.into_iter()
                .map(|hits| match hits {
                    0 => ' ',
                    1 => '*',
                    _ => '#',
                })
                .collect::<String>()
        })
        .collect();

    let x_caption = format!("{} .. {}", format_number(x_lo), format_number(x_hi));
    Some(frame(rows, (y_lo, y_hi), &x_caption))
}
