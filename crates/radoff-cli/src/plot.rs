//! Time-series plots of the ingested and solved history.

use std::error::Error;
use std::path::Path;

use plotters::prelude::*;
use radoff_core::dataset::{FloatValue, Time};

/// One labelled curve of (decimal year, value) points.
pub type Series<'a> = (&'a str, Vec<(Time, FloatValue)>);

/// Render one or more series against the decimal-year axis into a PNG.
pub fn plot_series(
    path: &Path,
    title: &str,
    y_label: &str,
    series: &[Series<'_>],
) -> Result<(), Box<dyn Error>> {
    let points = series.iter().flat_map(|(_, points)| points.iter());
    let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(x, y) in points {
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }
    if !x_min.is_finite() {
        return Err("nothing to plot: all series are empty".into());
    }
    // Pad degenerate axes so plotters gets a non-empty range.
    if x_min == x_max {
        x_max += 1.0;
    }
    if y_min == y_max {
        y_min -= 1.0;
        y_max += 1.0;
    }

    let root = BitMapBackend::new(path, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Time (yrs)")
        .y_desc(y_label)
        .draw()?;

    let colors = [BLUE, RED, GREEN, MAGENTA, CYAN, BLACK];
    for (i, (label, points)) in series.iter().enumerate() {
        let color = colors[i % colors.len()];
        chart
            .draw_series(LineSeries::new(
                points.iter().copied(),
                ShapeStyle::from(&color).stroke_width(2),
            ))?
            .label(*label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], &color));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // Rendering itself is only exercised manually; it needs a font backend
    // that CI images do not reliably provide.

    #[test]
    fn empty_series_set_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.png");
        assert!(plot_series(&path, "empty", "y", &[]).is_err());
    }
}
