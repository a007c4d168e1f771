//! Dense matrix file I/O.
//!
//! Datasets are plain text: one point per line, fields separated by commas
//! (or whitespace). Output matrices are written comma-separated. Malformed
//! input is rejected with `InvalidData` before any search work starts.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::Array2;

/// Load a matrix; rows are points. Ragged rows, empty files, and
/// non-numeric fields are errors.
pub fn load_matrix(path: &Path) -> io::Result<Array2<f64>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let fields: Vec<&str> = if trimmed.contains(',') {
            trimmed.split(',').collect()
        } else {
            trimmed.split_whitespace().collect()
        };
        let mut row = Vec::with_capacity(fields.len());
        for field in &fields {
            let v: f64 = field.trim().parse().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line {}: invalid number '{}'", lineno + 1, field.trim()),
                )
            })?;
            row.push(v);
        }
        if let Some(first) = rows.first() {
            if row.len() != first.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "line {}: expected {} fields, found {}",
                        lineno + 1,
                        first.len(),
                        row.len()
                    ),
                ));
            }
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "no data rows in file",
        ));
    }

    let dim = rows[0].len();
    let mut out = Array2::zeros((rows.len(), dim));
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            out[[i, j]] = v;
        }
    }
    Ok(out)
}

/// Write a matrix of values, one comma-separated row per line.
pub fn save_matrix(path: &Path, matrix: &Array2<f64>) -> io::Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    for row in matrix.rows() {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(w, "{}", line.join(","))?;
    }
    w.flush()
}

/// Write a matrix of reference indices, one comma-separated row per line.
pub fn save_index_matrix(path: &Path, matrix: &Array2<usize>) -> io::Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    for row in matrix.rows() {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(w, "{}", line.join(","))?;
    }
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("proxima_test_{name}_{}.csv", std::process::id()))
    }

    #[test]
    fn round_trip() {
        let m = array![[1.0, 2.5, -3.0], [0.0, 4.25, 1e-3]];
        let path = temp_path("round_trip");
        save_matrix(&path, &m).unwrap();
        let loaded = load_matrix(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.dim(), (2, 3));
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(loaded[[i, j]], m[[i, j]]);
            }
        }
    }

    #[test]
    fn whitespace_separated_input() {
        let path = temp_path("whitespace");
        std::fs::write(&path, "1.0 2.0 3.0\n4.0 5.0 6.0\n").unwrap();
        let loaded = load_matrix(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.dim(), (2, 3));
        assert_eq!(loaded[[1, 2]], 6.0);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let path = temp_path("blank_lines");
        std::fs::write(&path, "1,2\n\n3,4\n\n").unwrap();
        let loaded = load_matrix(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.dim(), (2, 2));
    }

    #[test]
    fn ragged_rows_rejected() {
        let path = temp_path("ragged");
        std::fs::write(&path, "1,2,3\n4,5\n").unwrap();
        let err = load_matrix(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn bad_number_rejected() {
        let path = temp_path("bad_number");
        std::fs::write(&path, "1,2\n3,oops\n").unwrap();
        let err = load_matrix(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn empty_file_rejected() {
        let path = temp_path("empty");
        std::fs::write(&path, "").unwrap();
        let err = load_matrix(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn index_matrix_round_trip() {
        let m = array![[0usize, 7], [3, 1]];
        let path = temp_path("indices");
        save_index_matrix(&path, &m).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(text, "0,7\n3,1\n");
    }
}
