//! Rolling L×F feature window fed to the sequence model.

use common::{Error, Result};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

/// Fixed-shape window of recent observations, oldest row first.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureWindow {
    rows: Array2<f64>,
}

impl FeatureWindow {
    /// Wrap a matrix, requiring exactly `look_back` rows and `features` columns.
    pub fn new(rows: Array2<f64>, look_back: usize, features: usize) -> Result<Self> {
        if rows.nrows() != look_back || rows.ncols() != features {
            return Err(Error::shape(
                format!("{look_back}x{features}"),
                format!("{}x{}", rows.nrows(), rows.ncols()),
            ));
        }
        if look_back == 0 || features == 0 {
            return Err(Error::InvalidInput("feature window must be non-empty".into()));
        }
        Ok(Self { rows })
    }

    /// Build from nested rows as they come out of the persisted JSON.
    pub fn from_rows(rows: &[Vec<f64>], look_back: usize, features: usize) -> Result<Self> {
        if rows.len() != look_back {
            return Err(Error::shape(
                format!("{look_back} rows"),
                format!("{} rows", rows.len()),
            ));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != features) {
            return Err(Error::shape(
                format!("{features} features per row"),
                format!("{} features in row {i}", row.len()),
            ));
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let matrix = Array2::from_shape_vec((look_back, features), flat)
            .map_err(|e| Error::Other(e.to_string()))?;
        Self::new(matrix, look_back, features)
    }

    pub fn look_back(&self) -> usize {
        self.rows.nrows()
    }

    pub fn features(&self) -> usize {
        self.rows.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.rows.view()
    }

    /// Most recent observation.
    pub fn last_row(&self) -> ArrayView1<'_, f64> {
        self.rows.row(self.rows.nrows() - 1)
    }

    /// Last row with `trend` appended: the regressor's hybrid input.
    pub fn hybrid_input(&self, trend: f64) -> Array1<f64> {
        let last = self.last_row();
        let mut hybrid = Array1::zeros(last.len() + 1);
        hybrid.slice_mut(s![..last.len()]).assign(&last);
        hybrid[last.len()] = trend;
        hybrid
    }

    /// Drop the oldest row and append a copy of the last row with
    /// `column` set to `value`.
    pub fn slide(&mut self, column: usize, value: f64) -> Result<()> {
        let (n, f) = self.rows.dim();
        if column >= f {
            return Err(Error::InvalidInput(format!(
                "column {column} out of range for {f} features"
            )));
        }

        let mut new_row = self.last_row().to_owned();
        new_row[column] = value;

        let mut next = Array2::zeros((n, f));
        next.slice_mut(s![..n - 1, ..])
            .assign(&self.rows.slice(s![1.., ..]));
        next.row_mut(n - 1).assign(&new_row);
        self.rows = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> FeatureWindow {
        let rows = vec![
            vec![1.0, 10.0, 100.0],
            vec![2.0, 20.0, 200.0],
            vec![3.0, 30.0, 300.0],
            vec![4.0, 40.0, 400.0],
        ];
        FeatureWindow::from_rows(&rows, 4, 3).unwrap()
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert!(FeatureWindow::from_rows(&rows, 3, 2).is_err());
        assert!(FeatureWindow::from_rows(&rows, 2, 3).is_err());
        assert!(FeatureWindow::new(Array2::zeros((60, 4)), 60, 5).is_err());
    }

    #[test]
    fn test_hybrid_input_appends_trend() {
        let w = sample();
        assert_eq!(w.hybrid_input(0.5), array![4.0, 40.0, 400.0, 0.5]);
    }

    #[test]
    fn test_slide_keeps_shape_and_overwrites_one_column() {
        let mut w = sample();
        w.slide(1, -7.0).unwrap();

        assert_eq!(w.look_back(), 4);
        assert_eq!(w.features(), 3);
        assert_eq!(w.view().row(0), array![2.0, 20.0, 200.0]);
        assert_eq!(w.view().row(2), array![4.0, 40.0, 400.0]);
        assert_eq!(w.last_row(), array![4.0, -7.0, 400.0]);
    }

    #[test]
    fn test_slide_repeatedly_carries_forward() {
        let mut w = sample();
        w.slide(1, 0.1).unwrap();
        w.slide(1, 0.2).unwrap();
        assert_eq!(w.view().row(2), array![4.0, 0.1, 400.0]);
        assert_eq!(w.last_row(), array![4.0, 0.2, 400.0]);
    }

    #[test]
    fn test_slide_column_out_of_range() {
        let mut w = sample();
        assert!(w.slide(3, 1.0).is_err());
        assert_eq!(w, sample());
    }
}
