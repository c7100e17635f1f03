use crate::error::{PodnnError, Result};
use plotters::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// 値をJSONとして書き出します。
pub fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

/// 学習過程の損失をグラフとしてPNGファイルに出力します。
pub fn plot_loss_history(loss_hist: &[f64], path: &Path) -> Result<()> {
    let log_loss: Vec<(usize, f64)> = loss_hist
        .iter()
        .enumerate()
        .filter(|(_, v)| **v > 0.0 && v.is_finite())
        .map(|(i, v)| (i + 1, v.log10()))
        .collect();
    if log_loss.is_empty() {
        return Err(PodnnError::config("描画できる損失の記録がありません"));
    }
    draw_loss_chart(&log_loss, loss_hist.len(), path).map_err(|e| PodnnError::Plot(e.to_string()))
}

fn draw_loss_chart(
    log_loss: &[(usize, f64)],
    steps: usize,
    path: &Path,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let max_log_loss = log_loss.iter().map(|p| p.1).fold(f64::MIN, f64::max) + 0.1;
    let min_log_loss = log_loss.iter().map(|p| p.1).fold(f64::MAX, f64::min) - 0.5;
    let mut chart = ChartBuilder::on(&root)
        .caption("Loss History", ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0..steps + 1, min_log_loss..max_log_loss)?;
    chart
        .configure_mesh()
        .y_desc("Loss (log10 scale)")
        .x_desc("Steps")
        .draw()?;
    chart
        .draw_series(LineSeries::new(log_loss.iter().copied(), &RED))?
        .label("Training Loss")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
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

    #[test]
    fn json_reports_are_pretty_printed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.json");
        write_json(&path, &vec![1.5, 2.0]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(serde_json::from_str::<Vec<f64>>(&text).unwrap(), vec![1.5, 2.0]);
        assert!(text.contains('\n'));
    }

    #[test]
    fn empty_or_non_finite_history_is_not_plotted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("loss.png");
        assert!(plot_loss_history(&[], &path).is_err());
        assert!(plot_loss_history(&[f64::NAN, 0.0], &path).is_err());
        assert!(!path.exists());
    }
}
