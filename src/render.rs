//! Chart rendering with plotters, one SVG per aggregate.
//!
//! The evolution chart is a bar chart of per-bucket deltas with a dashed
//! overall-change line; the heatmaps are bins × bins cell grids colored on
//! a fixed gradient between the aggregate's scale bounds.

use std::path::Path;

use anyhow::{Result, bail};
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use tracing::debug;

use crate::config;
use crate::features::types::{EvolutionAggregate, HeatmapAggregate};

const EVOLUTION_SIZE: (u32, u32) = (900, 500);
const HEATMAP_SIZE: (u32, u32) = (600, 600);
const BAR_COLOR: RGBColor = RGBColor(128, 128, 128);

/// Renders the evolution aggregate as a bar chart with a dashed line at
/// the overall delta.
pub fn render_evolution_chart(path: &Path, aggregate: &EvolutionAggregate) -> Result<()> {
    if aggregate.buckets.is_empty() {
        bail!("evolution aggregate has no buckets to render");
    }
    debug!(path = %path.display(), "rendering evolution chart");

    let max_bucket = aggregate.buckets.iter().map(|b| b.bucket).max().unwrap_or(0);
    let x_min = -0.6;
    let x_max = max_bucket as f64 + 0.6;

    let mut y_min = 0f64;
    let mut y_max = 0f64;
    for bucket in &aggregate.buckets {
        y_min = y_min.min(bucket.delta_pct);
        y_max = y_max.max(bucket.delta_pct);
    }
    y_min = y_min.min(aggregate.overall_delta_pct);
    y_max = y_max.max(aggregate.overall_delta_pct);
    let pad = ((y_max - y_min) * 0.05).max(1.0);

    let root = SVGBackend::new(path, EVOLUTION_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!(
                "Change in foreign born population by household income {} of census sections",
                aggregate.distribution
            ),
            ("sans-serif", 18),
        )
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, (y_min - pad)..(y_max + pad))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels((max_bucket + 2).min(21))
        .x_label_formatter(&|v| integer_label(*v))
        .x_desc(format!(
            "Household net income {} ({}-based)",
            aggregate.distribution,
            config::PERIOD_LATER
        ))
        .y_desc(format!(
            "Δ foreign born population ({} − {})",
            config::PERIOD_LATER,
            config::PERIOD_EARLIER
        ))
        .draw()?;

    for bucket in &aggregate.buckets {
        let x = bucket.bucket as f64;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x - 0.4, 0.0), (x + 0.4, bucket.delta_pct)],
            BAR_COLOR.filled(),
        )))?;
    }

    let overall = aggregate.overall_delta_pct;
    chart
        .draw_series(DashedLineSeries::new(
            vec![(x_min, overall), (x_max, overall)],
            8,
            6,
            BLACK.stroke_width(1),
        ))?
        .label("Overall Δ foreign born population")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK));
    chart.configure_series_labels().border_style(&BLACK).draw()?;

    root.present()?;
    Ok(())
}

/// Renders one heatmap aggregate. `palette` picks the gradient stops and
/// `label` is the human-readable target name used in the caption.
pub fn render_heatmap_chart(
    path: &Path,
    aggregate: &HeatmapAggregate,
    palette: &str,
    label: &str,
) -> Result<()> {
    let bins = aggregate.bins();
    if bins == 0 {
        bail!("heatmap aggregate has no cells to render");
    }
    debug!(path = %path.display(), target = %aggregate.target, "rendering heatmap");

    let stops = palette_stops(palette);
    let span = aggregate.v_max - aggregate.v_min;

    let root = SVGBackend::new(path, HEATMAP_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{label} by Income × Immigration"), ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(70)
        .build_cartesian_2d(0f64..bins as f64, 0f64..bins as f64)?;

    // labels sit at the cell boundaries; the offset pushes them under the
    // cell centers instead
    let half_cell = (500 / bins) as i32 / 2;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_labels(bins + 1)
        .y_labels(bins + 1)
        .x_label_offset(half_cell)
        .y_label_offset(-half_cell)
        .x_label_formatter(&|v| quantile_label(*v, bins))
        .y_label_formatter(&|v| quantile_label(*v, bins))
        .x_desc("Percentage of Immigrant Population (quantiles)")
        .y_desc("Household Net Income (quantiles)")
        .draw()?;

    for (income_bin, row) in aggregate.cells.iter().enumerate() {
        for (pct_bin, cell) in row.iter().enumerate() {
            let Some(value) = cell else { continue };
            let t = if span.abs() < f64::EPSILON {
                0.5
            } else {
                (value - aggregate.v_min) / span
            };
            chart.draw_series(std::iter::once(Rectangle::new(
                [
                    (pct_bin as f64, income_bin as f64),
                    (pct_bin as f64 + 1.0, income_bin as f64 + 1.0),
                ],
                palette_color(stops, t).filled(),
            )))?;
        }
    }

    // annotate small grids only, as bigger ones become unreadable
    if bins <= 5 {
        let style = ("sans-serif", 14)
            .into_font()
            .color(&BLACK)
            .pos(Pos::new(HPos::Center, VPos::Center));
        for (income_bin, row) in aggregate.cells.iter().enumerate() {
            for (pct_bin, cell) in row.iter().enumerate() {
                let Some(value) = cell else { continue };
                chart.draw_series(std::iter::once(Text::new(
                    format!("{value:.1}"),
                    (pct_bin as f64 + 0.5, income_bin as f64 + 0.5),
                    style.clone(),
                )))?;
            }
        }
    }

    root.present()?;
    Ok(())
}

/// Gradient stops per palette name, approximating the matplotlib Reds,
/// Blues and viridis colormaps.
fn palette_stops(name: &str) -> &'static [(u8, u8, u8)] {
    match name {
        "reds" => &[(255, 245, 240), (103, 0, 13)],
        "blues" => &[(247, 251, 255), (8, 48, 107)],
        _ => &[(68, 1, 84), (33, 145, 140), (253, 231, 37)],
    }
}

/// Linear interpolation through the palette stops at `t` in [0, 1];
/// out-of-range values clamp to the scale ends.
fn palette_color(stops: &[(u8, u8, u8)], t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    let scaled = t * (stops.len() - 1) as f64;
    let index = (scaled.floor() as usize).min(stops.len() - 2);
    let frac = scaled - index as f64;
    let (r0, g0, b0) = stops[index];
    let (r1, g1, b1) = stops[index + 1];
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
    RGBColor(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
}

fn integer_label(position: f64) -> String {
    if (position - position.round()).abs() > 1e-6 || position.round() < 0.0 {
        return String::new();
    }
    format!("{}", position.round() as i64)
}

fn quantile_label(position: f64, bins: usize) -> String {
    if (position - position.round()).abs() > 1e-6 {
        return String::new();
    }
    let index = position.round() as i64;
    if index < 0 || index >= bins as i64 {
        return String::new();
    }
    format!("Q{}", index + 1)
}
