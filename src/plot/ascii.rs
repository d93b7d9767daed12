//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - recent history: `o`
//! - forecast mean: `-` line
//! - interval bounds: `.` lines
//! - exceedance threshold: `=` line

use chrono::NaiveDate;

use crate::forecast::ExceedanceSummary;

/// Render recent history followed by the forecast band and the threshold.
pub fn render_forecast_plot(
    history: &[(NaiveDate, f64)],
    exceedance: &ExceedanceSummary,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let Some((d_min, d_max)) = date_range(history, exceedance) else {
        return "Plot: nothing to draw\n".to_string();
    };
    let x_max = ((d_max - d_min).num_days() as f64).max(1.0);
    let offset = |d: NaiveDate| (d - d_min).num_days() as f64;

    let mean: Vec<(f64, f64)> = exceedance.days.iter().map(|d| (offset(d.date), d.mean)).collect();
    let lower: Vec<(f64, f64)> = exceedance
        .days
        .iter()
        .filter_map(|d| d.lower.map(|v| (offset(d.date), v)))
        .collect();
    let upper: Vec<(f64, f64)> = exceedance
        .days
        .iter()
        .filter_map(|d| d.upper.map(|v| (offset(d.date), v)))
        .collect();

    let values = history
        .iter()
        .map(|(_, v)| *v)
        .chain([&mean, &lower, &upper].into_iter().flatten().map(|(_, v)| *v))
        .chain(std::iter::once(exceedance.threshold));
    let (y_min, y_max) = y_range(values).unwrap_or((exceedance.threshold - 1.0, exceedance.threshold + 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Mean first so the band and threshold only fill blanks around it.
    draw_curve(&mut grid, &mean, x_max, y_min, y_max, '-');
    draw_curve(&mut grid, &lower, x_max, y_min, y_max, '.');
    draw_curve(&mut grid, &upper, x_max, y_min, y_max, '.');

    let ty = map_y(exceedance.threshold, y_min, y_max, height);
    draw_line(&mut grid, 0, ty, width - 1, ty, '=');

    for &(date, v) in history {
        let x = map_x(offset(date), x_max, width);
        let y = map_y(v, y_min, y_max, height);
        grid[y][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!("Plot: {d_min} .. {d_max} | y=[{y_min:.2}, {y_max:.2}]\n"));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn date_range(history: &[(NaiveDate, f64)], exceedance: &ExceedanceSummary) -> Option<(NaiveDate, NaiveDate)> {
    let dates = history.iter().map(|(d, _)| *d).chain(exceedance.days.iter().map(|d| d.date));
    let min = dates.clone().min()?;
    let max = dates.max()?;
    Some((min, max))
}

fn y_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for v in values.filter(|v| v.is_finite()) {
        min_y = min_y.min(v);
        max_y = max_y.max(v);
    }
    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = (t / t_max).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], x_max: f64, y_min: f64, y_max: f64, ch: char) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(t, y) in curve {
        let x = map_x(t, x_max, width);
        let yy = map_y(y, y_min, y_max, height);
        match prev {
            Some((x0, y0)) => draw_line(grid, x0, y0, x, yy, ch),
            None if grid[yy][x] == ' ' => grid[yy][x] = ch,
            None => {}
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham-ish). Only blank cells are written.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
