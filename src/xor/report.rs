//! Evaluation of a finished comparison.

use std::fmt;

use crate::{
    db::Coord,
    xor::{LayerIdentity, MissingSide, ResultMap, ToleranceSchedule, XorMode},
};

const TOLERANCE_HEADER: &str = "Tolerance (um)";

/// Number of decimals that resolve one database unit in micrometers.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn decimals(dbu: f64) -> usize {
    if dbu <= 0.0 || !dbu.is_finite() {
        return 3;
    }
    (-dbu.log10() - 1e-9).ceil().clamp(0.0, 9.0) as usize
}

/// What was found for one `(tolerance, layer)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportValue {
    /// Number of differing polygons
    Count(u64),
    /// Polygons stored in the result hierarchy and after flattening it
    Hier {
        /// Hierarchical count
        hier: u64,
        /// Flat count
        flat: u64,
    },
    /// The layer exists in one input only
    Missing(MissingSide),
}

impl ReportValue {
    /// Returns `true` if nothing differs.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        match self {
            ReportValue::Count(count) => *count == 0,
            ReportValue::Hier { hier, flat } => *hier == 0 && *flat == 0,
            ReportValue::Missing(_) => false,
        }
    }
}

impl fmt::Display for ReportValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportValue::Count(count) => write!(f, "{count}"),
            ReportValue::Hier { hier, flat } => write!(f, "{hier}/{flat}"),
            ReportValue::Missing(side) => write!(f, "layer missing in {side}"),
        }
    }
}

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    /// Compared layer
    pub layer: LayerIdentity,
    /// Index into the tolerance schedule
    pub tolerance_index: usize,
    /// Tolerance in database units
    pub tolerance: Coord,
    /// Outcome
    pub value: ReportValue,
}

/// Summary of all results of a run.
///
/// # Examples
///
/// ```rust
/// use xorscope::xor::{ResultMap, ToleranceSchedule, XorMode, XorReport};
///
/// let tolerances = ToleranceSchedule::default();
/// let report = XorReport::from_results(&ResultMap::new(), &tolerances, 0.001, XorMode::Tiled);
/// assert!(report.layouts_match());
/// assert_eq!(report.to_string(), "No differences found\n");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct XorReport {
    mode: XorMode,
    dbu: f64,
    rows: Vec<ReportRow>,
    missing_layers: usize,
}

impl XorReport {
    /// Reads all results of `results`. `dbu` converts tolerances back to micrometers.
    #[must_use]
    pub fn from_results(
        results: &ResultMap,
        tolerances: &ToleranceSchedule,
        dbu: f64,
        mode: XorMode,
    ) -> Self {
        let mut rows = Vec::with_capacity(results.len());
        results.for_each(|key, descriptor| {
            let value = match (descriptor.missing, mode) {
                (Some(side), _) => ReportValue::Missing(side),
                (None, XorMode::Tiled) => ReportValue::Count(descriptor.shape_count),
                (None, XorMode::Deep) => ReportValue::Hier {
                    hier: descriptor.shape_count,
                    flat: descriptor.flat_shape_count,
                },
            };
            rows.push(ReportRow {
                layer: key.layer.clone(),
                tolerance_index: key.tolerance_index,
                tolerance: tolerances.get(key.tolerance_index).unwrap_or_default(),
                value,
            });
        });
        Self {
            mode,
            dbu,
            rows,
            missing_layers: results.missing_layers(),
        }
    }

    /// Returns `true` if no differences were found and no layer is missing.
    #[must_use]
    pub fn layouts_match(&self) -> bool {
        self.missing_layers == 0 && self.rows.iter().all(|r| r.value.is_zero())
    }

    /// All rows, ordered by tolerance and layer.
    #[must_use]
    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Rows reporting a difference.
    pub fn differences(&self) -> impl Iterator<Item = &ReportRow> + '_ {
        self.rows.iter().filter(|r| !r.value.is_zero())
    }

    /// Number of layers present in one input only.
    #[must_use]
    pub fn missing_layers(&self) -> usize {
        self.missing_layers
    }

    /// Tolerance of `row` in micrometers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn tolerance_micron(&self, row: &ReportRow) -> f64 {
        row.tolerance as f64 * self.dbu
    }

    /// The engine that produced the results.
    #[must_use]
    pub fn mode(&self) -> XorMode {
        self.mode
    }
}

impl fmt::Display for XorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.layouts_match() {
            return writeln!(f, "No differences found");
        }

        let count_header = match self.mode {
            XorMode::Tiled => "Differences",
            XorMode::Deep => "Differences (hier/flat)",
        };
        let layers: Vec<String> = self.differences().map(|r| r.layer.to_string()).collect();
        let width = layers.iter().map(String::len).chain([5]).max().unwrap_or(5);

        let decimals = decimals(self.dbu);
        writeln!(f, "{:<width$}  {TOLERANCE_HEADER}  {count_header}", "Layer")?;
        for (row, layer) in self.differences().zip(&layers) {
            let tolerance = self.tolerance_micron(row);
            writeln!(
                f,
                "{layer:<width$}  {tolerance:>tw$.decimals$}  {}",
                row.value,
                tw = TOLERANCE_HEADER.len()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xor::{LayerPair, ResultDescriptor, ResultKey};

    fn results() -> ResultMap {
        let results = ResultMap::new();
        let pair = LayerPair {
            a: Some(0),
            b: Some(0),
        };
        for (index, layer, count) in [(0, 1, 3), (1, 1, 0), (0, 2, 0), (1, 2, 0)] {
            let descriptor = ResultDescriptor {
                shape_count: count,
                flat_shape_count: count * 4,
                ..ResultDescriptor::for_pair(&pair)
            };
            results
                .publish(ResultKey::new(index, LayerIdentity::new(layer, 0)), descriptor)
                .unwrap();
        }
        results
    }

    #[test]
    fn test_tiled_table() {
        let tolerances = ToleranceSchedule::new(vec![0, 20]).unwrap();
        let report = XorReport::from_results(&results(), &tolerances, 0.001, XorMode::Tiled);

        assert!(!report.layouts_match());
        assert_eq!(report.rows().len(), 4);
        assert_eq!(report.differences().count(), 1);
        assert!((report.tolerance_micron(&report.rows()[2]) - 0.02).abs() < 1e-12);
        assert_eq!(
            report.to_string(),
            "Layer  Tolerance (um)  Differences\n1/0             0.000  3\n"
        );
        assert_eq!(decimals(0.001), 3);
        assert_eq!(decimals(0.0005), 4);
        assert_eq!(decimals(1.0), 0);
    }

    #[test]
    fn test_deep_table_and_missing_layers() {
        let results = results();
        results
            .record_missing(
                &LayerIdentity::new(7, 0),
                &LayerPair {
                    a: None,
                    b: Some(3),
                },
            )
            .unwrap();
        let report = XorReport::from_results(&results, &ToleranceSchedule::default(), 0.001, XorMode::Deep);

        assert_eq!(report.missing_layers(), 1);
        let rendered = report.to_string();
        assert!(rendered.contains("3/12"));
        assert!(rendered.contains("7/0  "));
        assert!(rendered.contains("layer missing in A"));
        assert!(!rendered.contains("2/0"));
    }

    #[test]
    fn test_matching_results() {
        let results = ResultMap::new();
        results
            .publish(
                ResultKey::new(0, LayerIdentity::new(1, 0)),
                ResultDescriptor::default(),
            )
            .unwrap();
        let report = XorReport::from_results(&results, &ToleranceSchedule::default(), 0.001, XorMode::Deep);
        assert!(report.layouts_match());
        assert_eq!(report.to_string(), "No differences found\n");
    }
}
