// src/renderer.rs

//! WikiPride charts: one stacked bar per time bucket with a colored segment per
//! cohort, an optional percentage pane, and a colorbar strip on the right.
//!
//! Images carry no text. Titles, axis labels and tick labels are written to a
//! JSON sidecar next to every PNG.

use crate::cohort::{kind, CohortEngine};
use crate::config::RenderConfig;
use crate::error::CohortError;
use crate::model::{CohortDefinition, Matrix};
use ndarray::Axis;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartOptions {
    pub width: u32,
    pub height: u32,
    /// Draw absolute values
    pub normal: bool,
    /// Draw each bar scaled to its column total
    pub percentage: bool,
    /// Reverse the cohort order, first cohort on top
    pub flip: bool,
    /// Colors in the discretized colormap, one per cohort when `None`
    pub ncolors: Option<usize>,
}

impl ChartOptions {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            normal: true,
            percentage: true,
            flip: false,
            ncolors: config.ncolors,
        }
    }

    pub fn flipped(self, flip: bool) -> Self {
        Self { flip, ..self }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tick {
    pub position: f64,
    pub label: String,
}

/// Text that goes with a chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub title: String,
    pub ylabel: String,
    pub percentage_title: Option<String>,
    /// Cohort labels from bottom to top of the stack
    pub cohort_labels: Vec<String>,
    /// Time bucket positions and labels along the x axis
    pub xticks: Vec<Tick>,
    /// Colorbar positions in `[0, 1]`, bottom to top
    pub colorbar: Vec<Tick>,
    pub ncolors: usize,
}

/// Bottom and top of every bar segment, indexed `[cohort][time]`, with the
/// cohorts stacked in row order. Percentages divide by the column total plus one.
pub(crate) fn stack(data: &Matrix, percentage: bool) -> Vec<Vec<(f64, f64)>> {
    let totals = data.sum_axis(Axis(0));
    let mut running = vec![0.0; data.ncols()];
    data.outer_iter()
        .map(|cohort| {
            cohort
                .iter()
                .zip(running.iter_mut())
                .zip(totals.iter())
                .map(|((&value, bottom), &total)| {
                    let height = if percentage { value / (total + 1.0) } else { value };
                    let segment = (*bottom, *bottom + height);
                    *bottom += height;
                    segment
                })
                .collect()
        })
        .collect()
}

/// Value range covered by the segments, always including zero
pub(crate) fn value_range(segments: &[Vec<(f64, f64)>]) -> (f64, f64) {
    let (lo, hi) = segments
        .iter()
        .flatten()
        .fold((0.0f64, 0.0f64), |(lo, hi), &(a, b)| (lo.min(a).min(b), hi.max(a).max(b)));
    if hi > lo {
        (lo, hi)
    } else {
        (lo, lo + 1.0)
    }
}

fn flip_rows(data: &Matrix) -> Matrix {
    let mut flipped = data.clone();
    flipped.invert_axis(Axis(0));
    flipped
}

fn flip_definition(definition: &CohortDefinition) -> Result<CohortDefinition, CohortError> {
    CohortDefinition::new(
        definition.keys().iter().rev().cloned().collect(),
        definition.labels().iter().rev().cloned().collect(),
    )
}

/// One x tick per five buckets, labelled like the time index
fn xticks(engine: &CohortEngine) -> Vec<Tick> {
    let time = engine.time_index();
    let n = time.len();
    let count = (n.saturating_sub(1) / 5).max(1);
    let mut positions: Vec<usize> = kind::linspace(0.0, n.saturating_sub(1) as f64, count)
        .into_iter()
        .map(|v| v as usize)
        .collect();
    positions.dedup();
    positions
        .into_iter()
        .map(|i| Tick { position: i as f64, label: time.label(i).unwrap_or_default() })
        .collect()
}

/// Data and text of one chart: the (possibly flipped) matrix plus its legend
pub(crate) fn prepare(
    engine: &CohortEngine,
    metric: &str,
    options: &ChartOptions,
) -> Result<(Matrix, Legend), CohortError> {
    let snapshot = engine.snapshot()?;
    let data = snapshot
        .metric(metric)
        .ok_or_else(|| CohortError::NotAggregated(format!("{metric} of {}", snapshot.tag)))?;
    let ncolors = options.ncolors.unwrap_or(engine.definition().len()).max(1);

    let (data, definition) = if options.flip {
        (flip_rows(data), flip_definition(engine.definition())?)
    } else {
        (data.clone(), engine.definition().clone())
    };
    let colorbar = kind::colorbar(engine.kind().tick_style(), &definition, ncolors)
        .into_iter()
        .map(|(position, label)| Tick { position, label })
        .collect();

    let description = snapshot.descriptions.get(metric);
    let title = description.map(|d| d.title.clone()).unwrap_or_default();
    let legend = Legend {
        percentage_title: options.percentage.then(|| format!("Percentage - {title}")),
        title,
        ylabel: description.map(|d| d.ylabel.clone()).unwrap_or_default(),
        cohort_labels: definition.labels().to_vec(),
        xticks: xticks(engine),
        colorbar,
        ncolors,
    };
    Ok((data, legend))
}

#[cfg(feature = "render")]
pub use raster::{line_plot, wiki_pride};

#[cfg(not(feature = "render"))]
pub fn wiki_pride(engine: &CohortEngine, metric: &str, _: &ChartOptions, _: &Path) -> Result<PathBuf, CohortError> {
    Err(render_disabled(engine, metric))
}

#[cfg(not(feature = "render"))]
pub fn line_plot(engine: &CohortEngine, metric: &str, _: &ChartOptions, _: &Path) -> Result<PathBuf, CohortError> {
    Err(render_disabled(engine, metric))
}

#[cfg(not(feature = "render"))]
fn render_disabled(engine: &CohortEngine, metric: &str) -> CohortError {
    CohortError::MissingDependency {
        feature: "render",
        reason: format!("cannot draw {metric} of {}, built without chart support", engine.tag()),
    }
}

#[cfg(feature = "render")]
mod raster {
    use super::*;
    use crate::store;
    use image::{Rgb, RgbImage};
    use palette::{FromColor, Lch, LinSrgb, Srgb};
    use std::fs;
    use tracing::{debug, info};

    const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
    const AXIS: Rgb<u8> = Rgb([40, 40, 40]);

    /// Pixel rectangle
    #[derive(Debug, Clone, Copy)]
    struct Pane {
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    }

    impl Pane {
        /// Row of `value` inside the pane for the range `[lo, hi]`
        fn row(&self, value: f64, (lo, hi): (f64, f64)) -> u32 {
            let t = ((value - lo) / (hi - lo)).clamp(0.0, 1.0);
            self.y + ((1.0 - t) * self.h.saturating_sub(1) as f64).round() as u32
        }

        fn column(&self, index: usize, count: usize) -> (u32, u32) {
            let step = self.w as f64 / count.max(1) as f64;
            let x0 = self.x + (index as f64 * step).floor() as u32;
            let x1 = self.x + ((index + 1) as f64 * step).floor() as u32;
            (x0, x1.max(x0 + 1))
        }
    }

    /// Spectral-like gradient from red over yellow to blue and violet
    pub(super) fn colormap(position: f32) -> Rgb<u8> {
        let stops: Vec<LinSrgb<f32>> = [
            Lch::new(35.0f32, 60.0f32, 20.0f32),
            Lch::new(60.0f32, 75.0f32, 55.0f32),
            Lch::new(95.0f32, 40.0f32, 100.0f32),
            Lch::new(70.0f32, 55.0f32, 140.0f32),
            Lch::new(50.0f32, 45.0f32, 250.0f32),
            Lch::new(35.0f32, 50.0f32, 300.0f32),
        ]
        .into_iter()
        .map(LinSrgb::from_color)
        .collect();

        let scaled = position.clamp(0.0, 1.0) * (stops.len() - 1) as f32;
        let i1 = scaled.floor() as usize;
        let i2 = (i1 + 1).min(stops.len() - 1);
        let t = scaled.fract();
        let (c1, c2) = (stops[i1], stops[i2]);
        let mixed = LinSrgb::new(
            c1.red + (c2.red - c1.red) * t,
            c1.green + (c2.green - c1.green) * t,
            c1.blue + (c2.blue - c1.blue) * t,
        );

        let (r, g, b) = Srgb::<f32>::from_linear(mixed).into_components();
        Rgb([(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8])
    }

    /// The colormap cut into `ncolors` flat bands
    pub(super) fn discrete(position: f64, ncolors: usize) -> Rgb<u8> {
        let band = ((position.clamp(0.0, 1.0) * ncolors as f64) as usize).min(ncolors - 1);
        let center = if ncolors > 1 { band as f32 / (ncolors - 1) as f32 } else { 0.0 };
        colormap(center)
    }

    pub(super) fn cohort_colors(cohorts: usize, ncolors: usize) -> Vec<Rgb<u8>> {
        kind::linspace(0.0, 1.0, cohorts).into_iter().map(|p| discrete(p, ncolors)).collect()
    }

    fn fill(image: &mut RgbImage, x0: u32, x1: u32, y0: u32, y1: u32, color: Rgb<u8>) {
        let (top, bottom) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        for x in x0..x1.min(image.width()) {
            for y in top..=bottom.min(image.height().saturating_sub(1)) {
                image.put_pixel(x, y, color);
            }
        }
    }

    fn draw_line(image: &mut RgbImage, from: (u32, u32), to: (u32, u32), color: Rgb<u8>) {
        let (dx, dy) = (to.0 as f64 - from.0 as f64, to.1 as f64 - from.1 as f64);
        let steps = dx.abs().max(dy.abs()).max(1.0) as u32;
        for s in 0..=steps {
            let t = s as f64 / steps as f64;
            let x = (from.0 as f64 + dx * t).round() as u32;
            let y = (from.1 as f64 + dy * t).round() as u32;
            if x < image.width() && y < image.height() {
                image.put_pixel(x, y, color);
            }
        }
    }

    fn draw_bars(image: &mut RgbImage, pane: Pane, segments: &[Vec<(f64, f64)>], colors: &[Rgb<u8>], range: (f64, f64)) {
        for (cohort, color) in segments.iter().zip(colors) {
            for (t, &(bottom, top)) in cohort.iter().enumerate() {
                if bottom == top {
                    continue;
                }
                let (x0, x1) = pane.column(t, cohort.len());
                fill(image, x0, x1, pane.row(bottom, range), pane.row(top, range), *color);
            }
        }
        let zero = pane.row(0.0, range);
        draw_line(image, (pane.x, zero), (pane.x + pane.w.saturating_sub(1), zero), AXIS);
    }

    fn draw_colorbar(image: &mut RgbImage, pane: Pane, ncolors: usize, ticks: &[Tick]) {
        for y in 0..pane.h {
            let position = 1.0 - y as f64 / pane.h.saturating_sub(1).max(1) as f64;
            fill(image, pane.x, pane.x + pane.w, pane.y + y, pane.y + y, discrete(position, ncolors));
        }
        for tick in ticks {
            let y = pane.row(tick.position, (0.0, 1.0));
            draw_line(image, (pane.x + pane.w, y), (pane.x + pane.w + pane.w / 2, y), AXIS);
        }
    }

    /// Splits the canvas into chart panes and the colorbar strip
    fn layout(options: &ChartOptions, panes: u32) -> (Vec<Pane>, Pane) {
        let margin = (options.height / 20).max(1);
        let chart_w = options.width * 85 / 100;
        let pane_h = options.height.saturating_sub(margin * (panes + 1)) / panes.max(1);
        let charts = (0..panes)
            .map(|i| Pane { x: options.width / 20, y: margin + i * (pane_h + margin), w: chart_w, h: pane_h })
            .collect();
        let colorbar = Pane {
            x: options.width * 92 / 100,
            y: options.height / 10,
            w: (options.width / 50).max(1),
            h: options.height * 8 / 10,
        };
        (charts, colorbar)
    }

    fn output_paths(engine: &CohortEngine, metric: &str, dest: &Path) -> (PathBuf, PathBuf) {
        let stem = store::file_stem(metric, &engine.tag());
        (dest.join(format!("{stem}.png")), dest.join(format!("{stem}.json")))
    }

    fn save(image: &RgbImage, legend: &Legend, png: &Path, json: &Path) -> Result<(), CohortError> {
        if let Some(parent) = png.parent() {
            fs::create_dir_all(parent)?;
        }
        image.save(png).map_err(|e| CohortError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        let text = serde_json::to_string_pretty(legend)
            .map_err(|e| CohortError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        fs::write(json, text)?;
        Ok(())
    }

    /// Stacked bar chart of `metric`, absolute and/or percentage panes
    pub fn wiki_pride(
        engine: &CohortEngine,
        metric: &str,
        options: &ChartOptions,
        dest: &Path,
    ) -> Result<PathBuf, CohortError> {
        let (data, legend) = prepare(engine, metric, options)?;
        let mut panes_wanted = Vec::new();
        if options.normal {
            panes_wanted.push(false);
        }
        if options.percentage {
            panes_wanted.push(true);
        }
        if panes_wanted.is_empty() {
            return Err(CohortError::Configuration("chart needs the normal or the percentage pane".into()));
        }

        let mut image = RgbImage::from_pixel(options.width, options.height, BACKGROUND);
        let (panes, colorbar) = layout(options, panes_wanted.len() as u32);
        let colors = cohort_colors(data.nrows(), legend.ncolors);
        for (pane, percentage) in panes.into_iter().zip(panes_wanted) {
            let segments = stack(&data, percentage);
            let range = if percentage { (0.0, 1.0) } else { value_range(&segments) };
            debug!(metric, percentage, lo = range.0, hi = range.1, "Drawing pane");
            draw_bars(&mut image, pane, &segments, &colors, range);
        }
        draw_colorbar(&mut image, colorbar, legend.ncolors, &legend.colorbar);

        let (png, json) = output_paths(engine, metric, dest);
        save(&image, &legend, &png, &json)?;
        info!(path = %png.display(), "Saved WikiPride chart");
        Ok(png)
    }

    /// One line per cohort over time
    pub fn line_plot(
        engine: &CohortEngine,
        metric: &str,
        options: &ChartOptions,
        dest: &Path,
    ) -> Result<PathBuf, CohortError> {
        let options = ChartOptions { percentage: false, ..*options };
        let (data, legend) = prepare(engine, metric, &options)?;

        let mut image = RgbImage::from_pixel(options.width, options.height, BACKGROUND);
        let (panes, colorbar) = layout(&options, 1);
        let pane = panes[0];
        let points: Vec<Vec<(f64, f64)>> =
            data.outer_iter().map(|row| row.iter().map(|&v| (v, v)).collect()).collect();
        let range = value_range(&points);
        let colors = cohort_colors(data.nrows(), legend.ncolors);

        for (row, color) in data.outer_iter().zip(&colors) {
            let pixels: Vec<(u32, u32)> = row
                .iter()
                .enumerate()
                .map(|(t, &v)| {
                    let (x0, x1) = pane.column(t, row.len());
                    ((x0 + x1) / 2, pane.row(v, range))
                })
                .collect();
            for pair in pixels.windows(2) {
                draw_line(&mut image, pair[0], pair[1], *color);
            }
        }
        draw_colorbar(&mut image, colorbar, legend.ncolors, &legend.colorbar);

        let (png, json) = output_paths(engine, metric, dest);
        save(&image, &legend, &png, &json)?;
        info!(path = %png.display(), "Saved line plot");
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bots::BotFilter;
    use crate::cohort::CohortKind;
    use crate::config::EngineConfig;
    use crate::model::Row;
    use ndarray::array;
    use std::sync::Arc;

    fn aggregated(kind: CohortKind) -> CohortEngine {
        let mut engine =
            CohortEngine::new(kind, EngineConfig::new("200401", "200403"), Arc::new(BotFilter::disabled())).unwrap();
        engine.init_data();
        let row = |id, month, first, added| Row {
            contributor_id: Some(id),
            year: Some(2004),
            month: Some(month),
            first_edit_year: Some(2004),
            first_edit_month: Some(first),
            namespace: Some("0".into()),
            len_added: Some(added),
            add_edits: Some(1),
            total_edits: Some(20),
            ..Row::default()
        };
        engine
            .run_pass(vec![Ok(row(1, 1, 1, 100)), Ok(row(1, 2, 1, 50)), Ok(row(2, 2, 2, 30)), Ok(row(2, 3, 2, 10))])
            .unwrap();
        engine
    }

    fn options() -> ChartOptions {
        ChartOptions { width: 200, height: 120, normal: true, percentage: true, flip: false, ncolors: None }
    }

    #[test]
    fn segments_stack_in_cohort_order() {
        let data = array![[1.0, 2.0], [3.0, -1.0]];
        let segments = stack(&data, false);
        assert_eq!(segments[0], vec![(0.0, 1.0), (0.0, 2.0)]);
        assert_eq!(segments[1], vec![(1.0, 4.0), (2.0, 1.0)]);
        assert_eq!(value_range(&segments), (0.0, 4.0));

        let percent = stack(&data, true);
        assert_eq!(percent[1][0], (0.2, 0.8));
        assert_eq!(value_range(&stack(&Matrix::zeros((2, 2)), false)), (0.0, 1.0));
    }

    #[test]
    fn flipped_legends_reverse_the_cohorts() {
        let engine = aggregated(CohortKind::RelativeAge);
        let (data, legend) = prepare(&engine, "added", &options().flipped(true)).unwrap();
        assert_eq!(legend.cohort_labels, vec!["2 month old", "1 month old", "0 month old"]);
        assert_eq!(data.row(2).sum(), engine.metric("added").unwrap().row(0).sum());
        assert_eq!(legend.percentage_title.as_deref(), Some(format!("Percentage - {}", legend.title).as_str()));
        assert_eq!(legend.xticks[0].label, "01 / 2004");
    }

    #[test]
    fn one_x_tick_per_five_buckets() {
        let engine =
            CohortEngine::new(CohortKind::AbsoluteAge, EngineConfig::new("200101", "201012"), Arc::new(BotFilter::disabled()))
                .unwrap();
        let ticks = xticks(&engine);
        assert_eq!(ticks.len(), 23);
        assert_eq!(ticks[0].label, "01 / 2001");
        assert_eq!(ticks[22].label, "12 / 2010");
        assert!(ticks.windows(2).all(|w| w[0].position < w[1].position));
    }

    #[test]
    fn unknown_metrics_are_reported() {
        let engine = aggregated(CohortKind::AbsoluteAge);
        assert!(matches!(prepare(&engine, "reverts", &options()), Err(CohortError::NotAggregated(_))));
    }

    #[cfg(feature = "render")]
    #[test]
    fn charts_are_written_with_a_legend() {
        let dir = tempfile::tempdir().unwrap();
        let engine = aggregated(CohortKind::AbsoluteAge);

        let png = wiki_pride(&engine, "added", &options(), dir.path()).unwrap();
        assert_eq!(png, dir.path().join("added_AbsoluteAgePerMonth_bots.png"));
        let image = image::open(&png).unwrap();
        assert_eq!((image.width(), image.height()), (200, 120));

        let legend: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("added_AbsoluteAgePerMonth_bots.json")).unwrap())
                .unwrap();
        assert_eq!(legend["ncolors"], 3);
        assert_eq!(legend["cohort_labels"][0], "01 / 2004");

        let trends = aggregated(CohortKind::editor_trends());
        let line = line_plot(&trends, "editors", &options(), dir.path()).unwrap();
        assert!(line.exists());
    }

    #[cfg(feature = "render")]
    #[test]
    fn colormap_runs_from_red_to_violet() {
        let red = raster::colormap(0.0);
        let violet = raster::colormap(1.0);
        assert!(red.0[0] > red.0[2]);
        assert!(violet.0[2] > violet.0[1]);
        assert_eq!(raster::colormap(-1.0), red);
        assert_eq!(raster::colormap(2.0), violet);
    }

    #[cfg(feature = "render")]
    #[test]
    fn discrete_colors_repeat_within_a_band() {
        let colors = raster::cohort_colors(4, 2);
        assert_eq!(colors[0], colors[1]);
        assert_eq!(colors[2], colors[3]);
        assert_ne!(colors[0], colors[3]);
    }
}
