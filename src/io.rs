//! 数値配列のテキスト入出力。
//!
//! 空白区切りの1行1行ベクトル形式で、numpy の `savetxt` / `loadtxt` と
//! 相互に読み書きできます。

use crate::error::{PodnnError, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use nalgebra::DMatrix;
use std::path::Path;

/// 空白区切りのテキストファイルから矩形の行列を読み込みます。
///
/// `#` で始まる行はコメントとして読み飛ばします。連続した空白やタブは1つの区切りとして扱います。
pub fn load_matrix(path: impl AsRef<Path>) -> Result<DMatrix<f64>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_path(path)?;

    let mut values = Vec::new();
    let mut n_cols = None;
    let mut n_rows = 0;
    for record in reader.records() {
        let record = record?;
        let row_start = values.len();
        // 区切りは空白1文字なので、タブを含むフィールドはさらに分ける
        for field in record.iter().flat_map(str::split_whitespace) {
            let value = field.parse::<f64>().map_err(|e| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("{}: '{}' を数値として読めません ({})", path.display(), field, e),
                )
            })?;
            values.push(value);
        }
        let width = values.len() - row_start;
        if width == 0 {
            continue;
        }
        match n_cols {
            None => n_cols = Some(width),
            Some(expected) if expected != width => {
                return Err(PodnnError::shape("配列ファイルの列数", expected, width));
            }
            Some(_) => {}
        }
        n_rows += 1;
    }

    Ok(DMatrix::from_row_slice(n_rows, n_cols.unwrap_or(0), &values))
}

/// 行列を空白区切りのテキストとして保存します。
pub fn save_matrix(path: impl AsRef<Path>, matrix: &DMatrix<f64>) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .from_path(path)?;
    for row in matrix.row_iter() {
        writer.write_record(row.iter().map(|v| format!("{v:.18e}")))?;
    }
    writer.flush()?;
    Ok(())
}

/// 1次元配列を1行1要素で保存します。
pub fn save_vector(path: impl AsRef<Path>, values: &[f64]) -> Result<()> {
    save_matrix(path, &DMatrix::from_column_slice(values.len(), 1, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn reads_numpy_style_text_with_repeated_spaces_and_comments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "# header\n1.0   2.0 3.0\n 4e0 5.5  -6\n\n").unwrap();

        let m = load_matrix(&path).unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m[(0, 2)], 3.0);
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(m[(1, 2)], -6.0);
    }

    #[test]
    fn reads_tab_and_mixed_whitespace_delimiters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tabs.txt");
        fs::write(&path, "1.0\t2.0\n3.0 \t 4.0\n").unwrap();

        let m = load_matrix(&path).unwrap();
        assert_eq!(m, DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ragged.txt");
        fs::write(&path, "1 2 3\n4 5\n").unwrap();

        match load_matrix(&path) {
            Err(PodnnError::ShapeMismatch { expected, actual, .. }) => {
                assert_eq!((expected, actual), (3, 2));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn saved_matrix_loads_back_exactly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.txt");
        let m = DMatrix::from_row_slice(2, 2, &[0.1, -2.0 / 3.0, 1e-12, 12345.678]);

        save_matrix(&path, &m).unwrap();
        assert_eq!(load_matrix(&path).unwrap(), m);
    }

    #[test]
    fn vectors_are_written_as_a_single_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v.txt");
        save_vector(&path, &[1.0, 2.0, 3.0]).unwrap();

        let m = load_matrix(&path).unwrap();
        assert_eq!(m.shape(), (3, 1));
    }
}
