//! Scanning mode handling (GRIB2 Flag Table 3.4).

/// Scan mode flags for grid data ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanMode {
    /// +i direction: false = +x (east), true = -x (west)
    pub i_negative: bool,
    /// +j direction: false = -y (south), true = +y (north)
    pub j_positive: bool,
    /// Adjacent points: false = i direction, true = j direction
    pub j_consecutive: bool,
    /// Row scan direction alternates
    pub alternating_rows: bool,
}

impl ScanMode {
    pub fn from_grib2_flag(flag: u8) -> Self {
        Self {
            i_negative: (flag & 0x80) != 0,
            j_positive: (flag & 0x40) != 0,
            j_consecutive: (flag & 0x20) != 0,
            alternating_rows: (flag & 0x10) != 0,
        }
    }

    /// Reorder values stored in scan order into row-major (`rows × cols`)
    /// order. Only the adjacency flag changes memory layout; the direction
    /// flags are already reflected in the first/last grid point coordinates.
    pub fn to_row_major(&self, values: Vec<f32>, rows: usize, cols: usize) -> Vec<f32> {
        if !self.j_consecutive {
            return values;
        }

        // Column-major: value for (row, col) lives at col * rows + row
        let mut reordered = Vec::with_capacity(values.len());
        for row in 0..rows {
            for col in 0..cols {
                reordered.push(values[col * rows + row]);
            }
        }
        reordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_mode_from_grib2() {
        let mode = ScanMode::from_grib2_flag(0x40);
        assert!(!mode.i_negative);
        assert!(mode.j_positive);
        assert!(!mode.j_consecutive);
    }

    #[test]
    fn test_row_major_is_untouched() {
        let mode = ScanMode::from_grib2_flag(0x40);
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(mode.to_row_major(values.clone(), 2, 3), values);
    }

    #[test]
    fn test_column_major_is_transposed() {
        let mode = ScanMode::from_grib2_flag(0x60);
        // 2 rows x 3 cols stored column by column
        let values = vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0];
        assert_eq!(
            mode.to_row_major(values, 2, 3),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
    }
}
